//! Content primitives exercised by the checks
//!
//! - **[`SwarmAddress`]**: 32 byte address shared by content references and node overlays
//! - **[`Chunk`]**: span prefixed, BMT addressed unit of storage
//! - **[`RandomFile`]**: seeded file payloads for multi-chunk uploads

mod address;
mod chunk;
mod file;

pub use address::{AddressError, SwarmAddress, ADDRESS_SIZE};
pub use chunk::{address_of, keccak256, Chunk, MAX_CHUNK_SIZE, SPAN_SIZE};
pub use file::RandomFile;
