//! Content digests for rows.
//!
//! Uses BLAKE3 for all hashing operations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A BLAKE3 hash (256 bits / 32 bytes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hash([u8; 32]);

impl Hash {
    /// The number of bytes in a hash
    pub const LEN: usize = 32;

    /// Compute BLAKE3 hash of data
    #[must_use]
    pub fn compute(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    /// Digest of a row given as its rendered cells.
    ///
    /// Each cell is prefixed with its byte length, so distinct cell tuples
    /// never share an encoding even when cells contain commas.
    #[must_use]
    pub fn of_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut hasher = blake3::Hasher::new();
        for cell in cells {
            let bytes = cell.as_ref().as_bytes();
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        Self(*hasher.finalize().as_bytes())
    }

    /// Get as bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_compute() {
        let h1 = Hash::compute(b"hello");
        let h2 = Hash::compute(b"hello");
        assert_eq!(h1, h2);
        assert_ne!(h1, Hash::compute(b"world"));
    }

    #[test]
    fn test_of_cells_stable() {
        let h = Hash::of_cells(["1", "Steven", "King"]);
        assert_eq!(h, Hash::of_cells(vec!["1".to_string(), "Steven".into(), "King".into()]));
        assert_ne!(h, Hash::compute(b"1,Steven,King"));
    }

    #[test]
    fn test_of_cells_commas_inside_cells() {
        assert_ne!(Hash::of_cells(["a,b", "c"]), Hash::of_cells(["a", "b,c"]));
        assert_ne!(Hash::of_cells(["a,b"]), Hash::of_cells(["a", "b"]));
        assert_ne!(Hash::of_cells([""]), Hash::of_cells::<[&str; 0], &str>([]));
    }

    #[test]
    fn test_of_cells_order_matters() {
        assert_ne!(Hash::of_cells(["a", "b"]), Hash::of_cells(["b", "a"]));
    }

    #[test]
    fn test_hex_length() {
        let h = Hash::compute(b"row");
        assert_eq!(h.to_hex().len(), Hash::LEN * 2);
        assert_eq!(h.to_string(), h.to_hex());
    }
}
