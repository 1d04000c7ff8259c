//! HTTP adapter for the local layout service.
//!
//! One admission test is import → auto-orient → auto-layout(ALL). The layout
//! call decides the outcome; a failed layout counts as "plate full" only when
//! the service declares one of `CAPACITY_ERROR_CODES`. Everything else,
//! including timeouts and unparseable error bodies, is fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::models::{ArtifactName, ItemRequest};
use crate::oracle::{
    AdmissionOutcome, CapacityEstimate, DispatchTarget, JobPersister, MaterialConfig, ModelRef,
    Oracle, OracleError,
};

pub const DEFAULT_BASE_URL: &str = "http://localhost:44388";

/// Error codes with which the layout service reports that the models in the
/// scene cannot all be placed.
const CAPACITY_ERROR_CODES: &[&str] = &["LAYOUT_FAILED", "MODELS_DO_NOT_FIT", "NOT_ENOUGH_SPACE"];

// ────────────────────────────────────────────────────────────────────────────
// Wire types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ImportModelRequest<'a> {
    file: &'a str,
    repair_behavior: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImportModelResponse {
    id: serde_json::Value,
}

#[derive(Debug, Serialize)]
struct AutoOrientRequest<'a> {
    models: [&'a str; 1],
    mode: &'a str,
    tilt: u32,
}

#[derive(Debug, Serialize)]
struct AutoLayoutRequest<'a> {
    models: &'a str,
}

#[derive(Debug, Serialize)]
struct SaveFormRequest<'a> {
    file: &'a str,
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct PrintRequest<'a> {
    printer: &'a str,
    job_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct SceneResponse {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    error: ServiceErrorBody,
}

#[derive(Debug, Deserialize)]
struct ServiceErrorBody {
    code: String,
    #[serde(default)]
    message: String,
}

// ────────────────────────────────────────────────────────────────────────────
// Client
// ────────────────────────────────────────────────────────────────────────────

/// Client for the layout service's scene API. Cheap to clone.
#[derive(Clone)]
pub struct PreformClient {
    client: Client,
    base_url: String,
}

impl PreformClient {
    /// `timeout` bounds every request; an elapsed timeout is a fatal error.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, OracleError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Succeeds as soon as the service answers HTTP at all.
    pub async fn ping(&self) -> Result<(), OracleError> {
        self.client.get(self.url("/")).send().await?;
        Ok(())
    }

    async fn post<B: Serialize + Sync + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, OracleError> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        check_status(response).await
    }

    async fn import_model(&self, source: &Path) -> Result<ModelRef, OracleError> {
        let file = source.to_string_lossy();
        let response = self
            .post(
                "/scene/import-model/",
                &ImportModelRequest {
                    file: &file,
                    repair_behavior: "IGNORE",
                },
            )
            .await?;
        let imported: ImportModelResponse = serde_json::from_str(&response.text().await?)?;
        let id = match imported.id {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        };
        Ok(ModelRef(id))
    }

    async fn auto_orient(&self, model: &ModelRef) -> Result<(), OracleError> {
        self.post(
            "/scene/auto-orient/",
            &AutoOrientRequest {
                models: [model.0.as_str()],
                mode: "DENTAL",
                tilt: 0,
            },
        )
        .await?;
        Ok(())
    }

    /// Removes a model imported by a failed admission. The caller only sees
    /// `RejectedFatal`, so nothing else can take it back out of the scene.
    async fn discard(&self, model: &ModelRef) {
        if let Err(e) = self.remove_last(model).await {
            warn!(%model, "Failed to remove model after a failed admission: {e}");
        }
    }

    async fn auto_layout_all(&self) -> Result<(), OracleError> {
        self.post("/scene/auto-layout/", &AutoLayoutRequest { models: "ALL" })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Oracle for PreformClient {
    async fn clear(&self, material: &MaterialConfig) -> Result<(), OracleError> {
        debug!(material = %material.material_code, "Clearing scene");
        self.post("/scene/", material).await?;
        Ok(())
    }

    async fn try_admit(&self, item: &ItemRequest) -> AdmissionOutcome {
        let model = match self.import_model(item.source()).await {
            Ok(model) => model,
            Err(e) => return AdmissionOutcome::RejectedFatal(format!("import failed: {e}")),
        };
        debug!(item = item.identity(), %model, "Model imported");

        if let Err(e) = self.auto_orient(&model).await {
            self.discard(&model).await;
            return AdmissionOutcome::RejectedFatal(format!("auto-orient failed: {e}"));
        }

        match self.auto_layout_all().await {
            Ok(()) => AdmissionOutcome::Admitted(model),
            Err(e) if is_capacity_rejection(&e) => {
                debug!(%model, "Auto-layout reports no room: {e}");
                AdmissionOutcome::RejectedCapacity(model)
            }
            Err(e) => {
                self.discard(&model).await;
                AdmissionOutcome::RejectedFatal(format!("auto-layout failed: {e}"))
            }
        }
    }

    async fn remove_last(&self, model: &ModelRef) -> Result<(), OracleError> {
        let response = self
            .client
            .delete(self.url(&format!("/scene/models/{model}/")))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn estimate_capacity_used(&self) -> Option<CapacityEstimate> {
        let response = self.client.get(self.url("/scene/")).send().await.ok()?;
        let scene: SceneResponse = check_status(response).await.ok()?.json().await.ok()?;
        Some(CapacityEstimate {
            models_in_scene: scene.models.len() as u32,
        })
    }
}

#[async_trait]
impl JobPersister for PreformClient {
    async fn save_batch(
        &self,
        name: &ArtifactName,
        output_dir: &Path,
    ) -> Result<PathBuf, OracleError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let path = output_dir.join(name.file_name());
        let file = path.to_string_lossy().into_owned();
        self.post("/scene/save-form/", &SaveFormRequest { file: &file })
            .await?;
        Ok(path)
    }

    async fn dispatch(&self, name: &ArtifactName, target: &DispatchTarget) -> Result<(), OracleError> {
        self.post(
            "/login/",
            &LoginRequest {
                username: &target.username,
                password: &target.password,
            },
        )
        .await?;
        self.post(
            "/scene/print/",
            &PrintRequest {
                printer: &target.printer,
                job_name: name.as_str(),
            },
        )
        .await?;
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn check_status(response: Response) -> Result<Response, OracleError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> OracleError {
    match serde_json::from_str::<ServiceError>(body) {
        Ok(e) => OracleError::Api {
            status,
            code: Some(e.error.code),
            message: e.error.message,
        },
        Err(_) => OracleError::Api {
            status,
            code: None,
            message: body.to_string(),
        },
    }
}

/// True only for a declared "does not fit" reason. A bare status code is
/// never enough.
fn is_capacity_rejection(error: &OracleError) -> bool {
    match error {
        OracleError::Api {
            code: Some(code), ..
        } => CAPACITY_ERROR_CODES.contains(&code.as_str()),
        _ => false,
    }
}
