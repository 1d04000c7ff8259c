//! Human-readable and JSON summaries of packing sessions.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::SessionFailure;
use crate::models::{Batch, BatchSummary};
use crate::packing::SessionReport;

/// Serialized form written next to the job artifacts.
#[derive(Debug, Serialize)]
struct SummaryFile<'a> {
    order_id: &'a str,
    session_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    total_parts: u32,
    batches: Vec<BatchSummary>,
}

/// Renders a batch table:
///
/// ```text
/// Order 1000385: 3 parts in 2 batches
///   batch  parts  artifact
///       1      2  1000385_batch1
///       2      1  1000385_batch2
/// ```
pub fn render_summary(report: &SessionReport) -> String {
    let mut out = format!(
        "Order {}: {} parts in {} batches\n",
        report.order_id,
        report.total_placed(),
        report.batches.len()
    );
    push_table(&mut out, &report.batches);
    out
}

/// Same table for a failed session, preceded by the failure reason.
pub fn render_failure(failure: &SessionFailure) -> String {
    let mut out = format!(
        "Order {} FAILED ({}): {}\n",
        failure.order_id,
        failure.error.code(),
        failure.error
    );
    if failure.batches.is_empty() {
        out.push_str("  no batches were persisted\n");
    } else {
        let _ = writeln!(out, "  {} batch(es) persisted before the failure:", failure.batches.len());
        push_table(&mut out, &failure.batches);
    }
    out
}

fn push_table(out: &mut String, batches: &[Batch]) {
    let _ = writeln!(out, "  {:>5}  {:>5}  artifact", "batch", "parts");
    for batch in batches {
        let summary = batch.summary();
        let _ = writeln!(
            out,
            "  {:>5}  {:>5}  {}{}",
            summary.batch_index,
            summary.placed_count,
            summary.artifact_name.as_deref().unwrap_or("-"),
            if batch.dispatched { "  (dispatched)" } else { "" }
        );
    }
}

/// Writes `{order_id}_summary.json` into `dir` and returns its path.
pub fn write_summary_json(report: &SessionReport, dir: &Path) -> Result<PathBuf> {
    let file = SummaryFile {
        order_id: &report.order_id,
        session_id: report.session_id.to_string(),
        started_at: report.started_at,
        finished_at: report.finished_at,
        total_parts: report.total_placed(),
        batches: report.summaries(),
    };

    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory '{}'", dir.display()))?;
    let path = dir.join(format!("{}_summary.json", report.order_id));
    let json = serde_json::to_string_pretty(&file).context("Failed to serialize summary")?;
    std::fs::write(&path, json)
        .with_context(|| format!("Failed to write summary '{}'", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::errors::PackingError;
    use crate::models::{ArtifactName, BatchLine};

    fn persisted(index: u32, placed: u32) -> Batch {
        Batch {
            index,
            placed_count: placed,
            persisted: true,
            artifact: Some(ArtifactName::for_batch("1000385", index)),
            dispatched: index == 1,
            contents: vec![BatchLine {
                identity: "crown.stl".to_string(),
                count: placed,
            }],
        }
    }

    fn report() -> SessionReport {
        SessionReport {
            order_id: "1000385".to_string(),
            session_id: Uuid::new_v4(),
            batches: vec![persisted(1, 2), persisted(2, 1)],
            started_at: Utc::now(),
            finished_at: Utc::now(),
        }
    }

    #[test]
    fn test_render_summary_lists_every_batch() {
        let text = render_summary(&report());
        assert!(text.starts_with("Order 1000385: 3 parts in 2 batches"));
        assert!(text.contains("1000385_batch1  (dispatched)"));
        assert!(text.contains("1000385_batch2\n"));
        assert_eq!(text.lines().count(), 4);
    }

    #[test]
    fn test_render_failure_without_batches() {
        let failure = SessionFailure {
            order_id: "9".to_string(),
            error: PackingError::SingleUnitInfeasible {
                identity: "base.stl".to_string(),
            },
            batches: vec![],
        };
        let text = render_failure(&failure);
        assert!(text.contains("SINGLE_UNIT_INFEASIBLE"));
        assert!(text.contains("no batches were persisted"));
    }

    #[test]
    fn test_render_failure_keeps_persisted_batches() {
        let failure = SessionFailure {
            order_id: "1000385".to_string(),
            error: PackingError::EmptyOrder,
            batches: vec![persisted(1, 2)],
        };
        let text = render_failure(&failure);
        assert!(text.contains("1 batch(es) persisted"));
        assert!(text.contains("1000385_batch1"));
    }

    #[test]
    fn test_write_summary_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_summary_json(&report(), dir.path()).unwrap();

        assert_eq!(path, dir.path().join("1000385_summary.json"));
        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["total_parts"], 3);
        assert_eq!(value["batches"][1]["batch_index"], 2);
        assert_eq!(value["batches"][1]["artifact_name"], "1000385_batch2");
    }
}
