pub mod check;
pub mod cluster;
pub mod version;

pub use check::Check;
pub use cluster::Cluster;
pub use version::Version;
