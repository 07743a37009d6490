use bytes::Bytes;
use rand::Rng;

use super::chunk::keccak256;

/// A generated file used by file retrieval checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomFile {
    name: String,
    data: Bytes,
    hash: [u8; 32],
}

impl RandomFile {
    /// Generate a file of exactly `size` bytes drawn from `rng`
    pub fn new<R: Rng>(rng: &mut R, name: impl Into<String>, size: usize) -> Self {
        let mut data = vec![0u8; size];
        rng.fill(data.as_mut_slice());
        let hash = keccak256(&data);
        Self {
            name: name.into(),
            data: data.into(),
            hash,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Keccak-256 digest of the file content
    pub fn hash(&self) -> [u8; 32] {
        self.hash
    }

    /// Whether `downloaded` has the same content digest as this file
    pub fn matches(&self, downloaded: &[u8]) -> bool {
        keccak256(downloaded) == self.hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_file_size_and_digest() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let file = RandomFile::new(&mut rng, "file-0", 10_000);
        assert_eq!(file.size(), 10_000);
        assert_eq!(file.name(), "file-0");
        assert!(file.matches(file.data()));
        assert!(!file.matches(&file.data()[1..]));
    }
}
