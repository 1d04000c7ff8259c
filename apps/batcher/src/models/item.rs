use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One printable design and how many physical copies of it are wanted.
///
/// Never mutated after construction. The packing controller consumes the
/// quantity through its own remaining-to-place counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRequest {
    identity: String,
    source: PathBuf,
    total_quantity: u32,
}

impl ItemRequest {
    pub fn new(identity: impl Into<String>, source: impl Into<PathBuf>, total_quantity: u32) -> Self {
        Self {
            identity: identity.into(),
            source: source.into(),
            total_quantity,
        }
    }

    /// Builds a request whose identity is the file name of `source`.
    pub fn from_file(source: impl Into<PathBuf>, total_quantity: u32) -> Self {
        let source = source.into();
        let identity = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        Self::new(identity, source, total_quantity)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// File reference handed to the oracle on every admission attempt.
    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn total_quantity(&self) -> u32 {
        self.total_quantity
    }
}
