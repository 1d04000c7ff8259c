//! Packing Controller: turns an order's item requests into persisted batches.
//!
//! # Algorithm
//! Items are placed depth-first in the order given: every unit of item A, then
//! every unit of item B. For each unit:
//! 1. `try_admit` → `Admitted`: record it, decrement the item's remaining count.
//! 2. `RejectedCapacity` against a plate that already holds units: remove the
//!    rejected model, persist the plate, clear, open the next batch and retry
//!    the *same* unit. The remaining count is untouched.
//! 3. `RejectedCapacity` against an empty plate: the unit can never fit
//!    (`SingleUnitInfeasible`).
//! 4. `RejectedFatal`: abort.
//!
//! When the queue is exhausted a dirty plate is flushed. Every persist is
//! followed by a `clear`, so a finished session leaves the workspace empty.
//!
//! Workspace state as seen from here: `Empty → Filling → Full → Empty`.
//! The session ends when the queue is exhausted, not on any workspace state.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::{PackingError, SessionFailure};
use crate::models::{ArtifactName, Batch, BatchSummary, ItemRequest};
use crate::oracle::{AdmissionOutcome, DispatchTarget, JobPersister, MaterialConfig, Oracle};
use crate::packing::recorder::BatchRecorder;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Per-session settings.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Order identity; prefixes every artifact name.
    pub order_id: String,
    pub material: MaterialConfig,
    /// Directory the layout service writes job artifacts into.
    pub output_dir: PathBuf,
    /// When set, every saved batch is also submitted for printing.
    pub dispatch: Option<DispatchTarget>,
}

/// Outcome of a completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionReport {
    pub order_id: String,
    pub session_id: Uuid,
    pub batches: Vec<Batch>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SessionReport {
    pub fn summaries(&self) -> Vec<BatchSummary> {
        self.batches.iter().map(Batch::summary).collect()
    }

    pub fn total_placed(&self) -> u32 {
        self.batches.iter().map(|b| b.placed_count).sum()
    }
}

/// What happened to the unit under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnitPlacement {
    Placed,
    /// The plate was full and has been persisted; retry the same unit.
    Split,
}

/// State of one order's packing run. Owned by the controller and passed into
/// each step, never shared.
#[derive(Debug)]
pub struct PackingSession {
    order_id: String,
    items: Vec<ItemRequest>,
    recorder: BatchRecorder,
    workspace_dirty: bool,
}

// ────────────────────────────────────────────────────────────────────────────
// Public entry point
// ────────────────────────────────────────────────────────────────────────────

/// Runs one packing session against an exclusively held workspace.
///
/// Returns every persisted batch in order. On failure the already-persisted
/// batches are carried in `SessionFailure::batches` unmodified.
pub async fn run_session(
    oracle: &dyn Oracle,
    persister: &dyn JobPersister,
    items: Vec<ItemRequest>,
    options: &SessionOptions,
) -> Result<SessionReport, SessionFailure> {
    let session_id = Uuid::new_v4();
    let span = info_span!("session", order_id = %options.order_id, %session_id);

    async move {
        let started_at = Utc::now();
        let mut session = PackingSession::new(&options.order_id, items);

        match session.run(oracle, persister, options).await {
            Ok(()) => {
                let batches = session.recorder.into_batches();
                info!(
                    batches = batches.len(),
                    parts = batches.iter().map(|b| b.placed_count).sum::<u32>(),
                    "Session complete"
                );
                Ok(SessionReport {
                    order_id: options.order_id.clone(),
                    session_id,
                    batches,
                    started_at,
                    finished_at: Utc::now(),
                })
            }
            Err(error) => {
                let batches = session.recorder.into_batches();
                error!(
                    code = error.code(),
                    persisted_batches = batches.len(),
                    "Session aborted: {error}"
                );
                Err(SessionFailure {
                    order_id: options.order_id.clone(),
                    error,
                    batches,
                })
            }
        }
    }
    .instrument(span)
    .await
}

// ────────────────────────────────────────────────────────────────────────────
// Session steps
// ────────────────────────────────────────────────────────────────────────────

impl PackingSession {
    pub fn new(order_id: &str, items: Vec<ItemRequest>) -> Self {
        Self {
            order_id: order_id.to_string(),
            items,
            recorder: BatchRecorder::new(),
            workspace_dirty: false,
        }
    }

    async fn run(
        &mut self,
        oracle: &dyn Oracle,
        persister: &dyn JobPersister,
        options: &SessionOptions,
    ) -> Result<(), PackingError> {
        if self.items.is_empty() {
            return Err(PackingError::EmptyOrder);
        }
        if self.items.iter().all(|item| item.total_quantity() == 0) {
            info!("All items have zero quantity; nothing to pack");
            return Ok(());
        }

        oracle
            .clear(&options.material)
            .await
            .map_err(|e| PackingError::service("clear", e))?;
        self.recorder.start_new_batch()?;

        for position in 0..self.items.len() {
            let item = self.items[position].clone();
            if item.total_quantity() == 0 {
                debug!(item = item.identity(), "Skipping item with zero quantity");
                continue;
            }

            let mut remaining = item.total_quantity();
            while remaining >= 1 {
                debug!(
                    item = item.identity(),
                    "Admitting unit {}/{}",
                    item.total_quantity() - remaining + 1,
                    item.total_quantity()
                );
                match self.admit_unit(oracle, persister, options, &item).await? {
                    UnitPlacement::Placed => remaining -= 1,
                    UnitPlacement::Split => {}
                }
            }
        }

        if self.workspace_dirty {
            self.persist_current(oracle, persister, options).await?;
            if let Err(e) = oracle.clear(&options.material).await {
                warn!("Failed to clear workspace after final batch: {e}");
            }
        }

        Ok(())
    }

    async fn admit_unit(
        &mut self,
        oracle: &dyn Oracle,
        persister: &dyn JobPersister,
        options: &SessionOptions,
        item: &ItemRequest,
    ) -> Result<UnitPlacement, PackingError> {
        match oracle.try_admit(item).await {
            AdmissionOutcome::Admitted(model) => {
                let batch = self.recorder.record_admission(item.identity())?;
                debug!(
                    item = item.identity(),
                    %model,
                    batch = batch.index,
                    placed = batch.placed_count,
                    "Unit admitted"
                );
                self.workspace_dirty = true;
                Ok(UnitPlacement::Placed)
            }

            AdmissionOutcome::RejectedCapacity(model) => {
                let plate_is_empty = self.recorder.current_batch().map_or(true, Batch::is_empty);
                if plate_is_empty {
                    if let Err(e) = oracle.remove_last(&model).await {
                        warn!(%model, "Failed to remove infeasible model: {e}");
                    }
                    return Err(PackingError::SingleUnitInfeasible {
                        identity: item.identity().to_string(),
                    });
                }

                info!(
                    item = item.identity(),
                    batch = self.recorder.current_index(),
                    "Plate full, starting a new batch"
                );
                oracle
                    .remove_last(&model)
                    .await
                    .map_err(|e| PackingError::service("remove_last", e))?;
                self.persist_current(oracle, persister, options).await?;
                oracle
                    .clear(&options.material)
                    .await
                    .map_err(|e| PackingError::service("clear", e))?;
                self.recorder.start_new_batch()?;
                Ok(UnitPlacement::Split)
            }

            AdmissionOutcome::RejectedFatal(reason) => Err(PackingError::AdmissionFailed {
                identity: item.identity().to_string(),
                reason,
            }),
        }
    }

    /// Saves the open batch, dispatches it if configured, and freezes it.
    async fn persist_current(
        &mut self,
        oracle: &dyn Oracle,
        persister: &dyn JobPersister,
        options: &SessionOptions,
    ) -> Result<Batch, PackingError> {
        let batch_index = self.recorder.current_index();
        let name = ArtifactName::for_batch(&self.order_id, batch_index);

        if let Some(estimate) = oracle.estimate_capacity_used().await {
            debug!(
                batch = batch_index,
                models = estimate.models_in_scene,
                "Workspace usage before save"
            );
        }

        let path = persister
            .save_batch(&name, &options.output_dir)
            .await
            .map_err(|source| PackingError::Persistence {
                batch_index,
                source,
            })?;
        info!(
            batch = batch_index,
            path = %path.display(),
            earlier_batches = self.recorder.finished().len(),
            "Batch saved"
        );

        let dispatched = match &options.dispatch {
            None => false,
            Some(target) => match persister.dispatch(&name, target).await {
                Ok(()) => {
                    info!(batch = batch_index, printer = %target.printer, "Batch dispatched");
                    true
                }
                Err(e) => {
                    warn!(batch = batch_index, "Dispatch failed, batch kept locally: {e}");
                    false
                }
            },
        };

        let batch = self.recorder.finalize_current(name, dispatched)?;
        self.workspace_dirty = false;
        Ok(batch)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
