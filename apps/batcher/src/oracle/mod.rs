//! Oracle Client: the only path to the external layout service.
//!
//! The packing controller never talks HTTP. It sees the workspace through two
//! seams: `Oracle` (clear / admit / remove) and `JobPersister` (save / dispatch).
//! `PreformClient` implements both against the local layout service.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ArtifactName, ItemRequest};

pub mod preform;
pub mod server;

pub use preform::PreformClient;
pub use server::OracleServer;

// ────────────────────────────────────────────────────────────────────────────
// Types
// ────────────────────────────────────────────────────────────────────────────

/// Reference to one model instance inside the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelRef(pub String);

impl fmt::Display for ModelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of one admission test.
///
/// "No room" and "service fault" are distinct on purpose: only
/// `RejectedCapacity` may trigger a batch split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionOutcome {
    Admitted(ModelRef),
    /// The unit did not fit. The carried reference is still in the workspace
    /// and must be removed with `Oracle::remove_last`.
    RejectedCapacity(ModelRef),
    RejectedFatal(String),
}

/// Material and process settings applied when the workspace is reset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialConfig {
    pub machine_type: String,
    pub material_code: String,
    pub layer_thickness_mm: f64,
    pub print_setting: String,
}

impl Default for MaterialConfig {
    fn default() -> Self {
        Self {
            machine_type: "FRMB-3-0".to_string(),
            material_code: "FLGPGR04".to_string(),
            layer_thickness_mm: 0.1,
            print_setting: "DEFAULT".to_string(),
        }
    }
}

/// Print-execution target a persisted batch is submitted to.
#[derive(Clone, PartialEq, Eq)]
pub struct DispatchTarget {
    pub printer: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for DispatchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTarget")
            .field("printer", &self.printer)
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Informational view of how full the workspace is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityEstimate {
    pub models_in_scene: u32,
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Layout service error (status {status}, code {code:?}): {message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
    },

    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definitions
// ────────────────────────────────────────────────────────────────────────────

/// Live workspace maintained by the layout service.
///
/// Every call is a suspension point and may time out. Implementations must
/// report transport failures of `try_admit` as `RejectedFatal`, never as a
/// capacity rejection.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Resets the workspace to empty. Idempotent.
    async fn clear(&self, material: &MaterialConfig) -> Result<(), OracleError>;

    /// Adds one unit of `item` and re-runs the layout over the whole workspace.
    /// On `RejectedFatal` the workspace holds no trace of the unit.
    async fn try_admit(&self, item: &ItemRequest) -> AdmissionOutcome;

    /// Removes a rejected model, restoring the pre-attempt workspace.
    async fn remove_last(&self, model: &ModelRef) -> Result<(), OracleError>;

    async fn estimate_capacity_used(&self) -> Option<CapacityEstimate> {
        None
    }
}

/// Durable storage and dispatch of the current workspace content.
#[async_trait]
pub trait JobPersister: Send + Sync {
    /// Saves the workspace as `{output_dir}/{name}.form` and returns that path.
    async fn save_batch(&self, name: &ArtifactName, output_dir: &Path)
        -> Result<PathBuf, OracleError>;

    /// Submits the saved artifact to a print target.
    async fn dispatch(&self, name: &ArtifactName, target: &DispatchTarget)
        -> Result<(), OracleError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_defaults_match_grey_resin_profile() {
        let material = MaterialConfig::default();
        assert_eq!(material.machine_type, "FRMB-3-0");
        assert_eq!(material.material_code, "FLGPGR04");
        assert!((material.layer_thickness_mm - 0.1).abs() < f64::EPSILON);
        assert_eq!(material.print_setting, "DEFAULT");
    }

    #[test]
    fn test_dispatch_target_debug_hides_password() {
        let target = DispatchTarget {
            printer: "printer-1".to_string(),
            username: "ops".to_string(),
            password: "secret".to_string(),
        };
        let rendered = format!("{target:?}");
        assert!(rendered.contains("printer-1"));
        assert!(!rendered.contains("secret"));
    }
}
