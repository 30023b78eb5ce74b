//! Unit content hashing for drift detection.
//!
//! Unit files round-trip through the control plane, which may reflow
//! whitespace. Content is normalized before hashing so that only meaningful
//! changes register as drift.

use sha2::{Digest, Sha256};

/// Hasher for computing unit content hashes.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnitHasher;

impl UnitHasher {
    /// Creates a new unit hasher.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Normalizes unit text: trailing whitespace and blank lines are dropped,
    /// line endings become `\n`.
    #[must_use]
    pub fn normalize(content: &str) -> String {
        content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Computes the hash of normalized unit content.
    #[must_use]
    pub fn hash_content(&self, content: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(Self::normalize(content).as_bytes());
        hex::encode(hasher.finalize())
    }
}
