//! Batch Recorder: bookkeeping for the batches of one packing session.
//!
//! Pure and synchronous: no oracle calls, no filesystem. The controller drives
//! it through `start_new_batch` → `record_admission`* → `finalize_current`.
//!
//! Invariants:
//! - finished batch indices are exactly `1..=k`, no gaps
//! - an open batch's `placed_count` only increases
//! - a batch is finalized at most once and never while empty

use thiserror::Error;

use crate::models::{ArtifactName, Batch, BatchLine};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecorderError {
    #[error("No batch is open")]
    NoOpenBatch,

    #[error("Batch {0} has no admitted units and cannot be finalized")]
    EmptyBatch(u32),

    #[error("Batch {index} still holds {placed} unpersisted units")]
    UnpersistedContent { index: u32, placed: u32 },
}

#[derive(Debug, Clone)]
pub struct BatchRecorder {
    finished: Vec<Batch>,
    open: Option<Batch>,
    next_index: u32,
}

impl Default for BatchRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchRecorder {
    pub fn new() -> Self {
        Self {
            finished: Vec::new(),
            open: None,
            next_index: 1,
        }
    }

    pub fn current_batch(&self) -> Option<&Batch> {
        self.open.as_ref()
    }

    /// Index the next finalized batch will carry.
    pub fn current_index(&self) -> u32 {
        self.next_index
    }

    /// Opens the next batch. An already-open empty batch is reused so that
    /// no index is skipped.
    pub fn start_new_batch(&mut self) -> Result<&Batch, RecorderError> {
        if let Some(open) = &self.open {
            if !open.is_empty() {
                return Err(RecorderError::UnpersistedContent {
                    index: open.index,
                    placed: open.placed_count,
                });
            }
        }
        Ok(&*self.open.insert(Batch::open(self.next_index)))
    }

    /// Attributes one admitted unit of `identity` to the open batch.
    pub fn record_admission(&mut self, identity: &str) -> Result<&Batch, RecorderError> {
        let batch = self.open.as_mut().ok_or(RecorderError::NoOpenBatch)?;
        batch.placed_count += 1;
        match batch.contents.last_mut() {
            Some(line) if line.identity == identity => line.count += 1,
            _ => batch.contents.push(BatchLine {
                identity: identity.to_string(),
                count: 1,
            }),
        }
        Ok(&*batch)
    }

    /// Freezes the open batch as persisted under `artifact`.
    pub fn finalize_current(
        &mut self,
        artifact: ArtifactName,
        dispatched: bool,
    ) -> Result<Batch, RecorderError> {
        match &self.open {
            None => return Err(RecorderError::NoOpenBatch),
            Some(open) if open.is_empty() => return Err(RecorderError::EmptyBatch(open.index)),
            Some(_) => {}
        }
        let mut batch = self.open.take().ok_or(RecorderError::NoOpenBatch)?;
        batch.persisted = true;
        batch.artifact = Some(artifact);
        batch.dispatched = dispatched;
        self.finished.push(batch.clone());
        self.next_index += 1;
        Ok(batch)
    }

    /// Batches that have been persisted, in order.
    pub fn finished(&self) -> &[Batch] {
        &self.finished
    }

    /// Consumes the recorder. An open, unpersisted batch is not included.
    pub fn into_batches(self) -> Vec<Batch> {
        self.finished
    }
}
