use bytes::{BufMut, Bytes, BytesMut};
use rand::Rng;
use sha3::{Digest, Keccak256};

use super::address::{SwarmAddress, ADDRESS_SIZE};

/// Maximum payload carried by a single chunk
pub const MAX_CHUNK_SIZE: usize = 4096;
/// Length of the little-endian span prefix
pub const SPAN_SIZE: usize = 8;

const SEGMENT_SIZE: usize = ADDRESS_SIZE;

/// A content addressed chunk: an 8 byte span followed by up to 4KiB of payload.
///
/// The address is the Swarm binary merkle tree hash of the payload,
/// bound to its span, which is the same address a node returns on upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    address: SwarmAddress,
    data: Bytes,
}

impl Chunk {
    /// Build a chunk around `payload`, which must fit in a single chunk
    pub fn new(payload: &[u8]) -> Option<Self> {
        if payload.is_empty() || payload.len() > MAX_CHUNK_SIZE {
            return None;
        }
        Some(Self::from_payload(payload))
    }

    /// Generate a chunk with a random payload size and content drawn from `rng`
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let size = rng.random_range(1..=MAX_CHUNK_SIZE);
        let mut payload = vec![0u8; size];
        rng.fill(payload.as_mut_slice());
        Self::from_payload(&payload)
    }

    fn from_payload(payload: &[u8]) -> Self {
        let mut data = BytesMut::with_capacity(SPAN_SIZE + payload.len());
        data.put_u64_le(payload.len() as u64);
        data.put_slice(payload);
        let data = data.freeze();
        Self {
            address: address_of(&data),
            data,
        }
    }

    pub fn address(&self) -> SwarmAddress {
        self.address
    }

    /// Span prefixed chunk data, as uploaded to a node
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[SPAN_SIZE..]
    }

    /// Payload size in bytes
    pub fn size(&self) -> usize {
        self.data.len() - SPAN_SIZE
    }
}

/// Compute the chunk address of span prefixed chunk data
///
/// Returns the zero address for data shorter than a span.
pub fn address_of(data: &[u8]) -> SwarmAddress {
    if data.len() < SPAN_SIZE {
        return SwarmAddress::ZERO;
    }
    let (span, payload) = data.split_at(SPAN_SIZE);
    let root = bmt_root(payload);

    let mut hasher = Keccak256::new();
    hasher.update(span);
    hasher.update(root);
    let digest: [u8; ADDRESS_SIZE] = hasher.finalize().into();
    SwarmAddress::new(digest)
}

/// Keccak-256 digest of arbitrary content
pub fn keccak256(data: &[u8]) -> [u8; ADDRESS_SIZE] {
    Keccak256::digest(data).into()
}

fn bmt_root(payload: &[u8]) -> [u8; ADDRESS_SIZE] {
    let mut level = vec![0u8; MAX_CHUNK_SIZE];
    let len = payload.len().min(MAX_CHUNK_SIZE);
    level[..len].copy_from_slice(&payload[..len]);

    while level.len() > SEGMENT_SIZE {
        level = level
            .chunks(SEGMENT_SIZE * 2)
            .flat_map(|pair| keccak256(pair))
            .collect();
    }

    let mut root = [0u8; ADDRESS_SIZE];
    root.copy_from_slice(&level);
    root
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_span_prefix() {
        let chunk = Chunk::new(b"hello swarm").unwrap();
        assert_eq!(&chunk.data()[..SPAN_SIZE], &11u64.to_le_bytes());
        assert_eq!(chunk.payload(), b"hello swarm");
        assert_eq!(chunk.size(), 11);
    }

    #[test]
    fn test_rejects_oversized_and_empty_payloads() {
        assert!(Chunk::new(&[]).is_none());
        assert!(Chunk::new(&vec![1u8; MAX_CHUNK_SIZE + 1]).is_none());
        assert!(Chunk::new(&vec![1u8; MAX_CHUNK_SIZE]).is_some());
    }

    #[test]
    fn test_address_depends_on_span() {
        // identical padded payloads differ only by their span
        let short = Chunk::new(&[0u8; 1]).unwrap();
        let long = Chunk::new(&[0u8; 2]).unwrap();
        assert_ne!(short.address(), long.address());
    }

    #[test]
    fn test_address_is_deterministic() {
        let a = Chunk::new(b"foo").unwrap();
        let b = Chunk::new(b"foo").unwrap();
        assert_eq!(a.address(), b.address());
        assert_eq!(address_of(a.data()), a.address());
    }

    #[test]
    fn test_random_chunk_is_reproducible() {
        let mut r1 = ChaCha8Rng::seed_from_u64(42);
        let mut r2 = ChaCha8Rng::seed_from_u64(42);
        let a = Chunk::random(&mut r1);
        let b = Chunk::random(&mut r2);
        assert_eq!(a, b);
        assert!(a.size() >= 1 && a.size() <= MAX_CHUNK_SIZE);
    }
}
