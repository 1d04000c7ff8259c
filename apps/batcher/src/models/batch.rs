use std::fmt;

use serde::{Deserialize, Serialize};

/// Deterministic name of a persisted batch: `{order_id}_batch{index}`.
///
/// Used both as the artifact file stem and as the print job name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactName(String);

impl ArtifactName {
    pub fn for_batch(order_id: &str, batch_index: u32) -> Self {
        Self(format!("{order_id}_batch{batch_index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// File name of the saved job artifact.
    pub fn file_name(&self) -> String {
        format!("{}.form", self.0)
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Units of one item placed consecutively within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchLine {
    pub identity: String,
    pub count: u32,
}

/// The content of one workspace cycle between clears.
///
/// `placed_count` only grows while the batch is open. Once `persisted` is set
/// the batch is frozen and lives in the recorder's finished list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    pub index: u32,
    pub placed_count: u32,
    pub persisted: bool,
    pub artifact: Option<ArtifactName>,
    /// False when no print target was configured or the dispatch failed.
    pub dispatched: bool,
    pub contents: Vec<BatchLine>,
}

impl Batch {
    pub(crate) fn open(index: u32) -> Self {
        Self {
            index,
            placed_count: 0,
            persisted: false,
            artifact: None,
            dispatched: false,
            contents: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.placed_count == 0
    }

    /// Units of `identity` placed in this batch.
    pub fn count_of(&self, identity: &str) -> u32 {
        self.contents
            .iter()
            .filter(|line| line.identity == identity)
            .map(|line| line.count)
            .sum()
    }

    pub fn summary(&self) -> BatchSummary {
        BatchSummary {
            batch_index: self.index,
            placed_count: self.placed_count,
            artifact_name: self.artifact.as_ref().map(|a| a.to_string()),
        }
    }
}

/// `(batchIndex, placedCount, artifactName)` row of a session summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_index: u32,
    pub placed_count: u32,
    pub artifact_name: Option<String>,
}
