use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::oracle::preform::DEFAULT_BASE_URL;
use crate::oracle::{DispatchTarget, MaterialConfig};

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub oracle_url: String,
    /// Layout service binary to launch. `None` means it is managed externally.
    pub oracle_server_path: Option<PathBuf>,
    pub oracle_timeout: Duration,
    pub oracle_startup_timeout: Duration,
    pub job_output_dir: PathBuf,
    pub material: MaterialConfig,
    pub dispatch: Option<DispatchTarget>,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = MaterialConfig::default();

        Ok(Config {
            oracle_url: lookup("ORACLE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            oracle_server_path: lookup("ORACLE_SERVER_PATH").map(PathBuf::from),
            oracle_timeout: seconds(&lookup, "ORACLE_TIMEOUT_SECS", 120)?,
            oracle_startup_timeout: seconds(&lookup, "ORACLE_STARTUP_TIMEOUT_SECS", 60)?,
            job_output_dir: require(&lookup, "JOB_OUTPUT_DIR")?.into(),
            material: MaterialConfig {
                machine_type: lookup("MACHINE_TYPE").unwrap_or(defaults.machine_type),
                material_code: lookup("MATERIAL_CODE").unwrap_or(defaults.material_code),
                layer_thickness_mm: match lookup("LAYER_THICKNESS_MM") {
                    Some(raw) => raw
                        .parse::<f64>()
                        .context("LAYER_THICKNESS_MM must be a number")?,
                    None => defaults.layer_thickness_mm,
                },
                print_setting: lookup("PRINT_SETTING").unwrap_or(defaults.print_setting),
            },
            dispatch: dispatch_target(&lookup)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
        })
    }
}

fn require(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    lookup(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn seconds(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs = match lookup(key) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds"))?,
        None => default,
    };
    Ok(Duration::from_secs(secs))
}

/// Dispatch is on only when printer and credentials are all present.
fn dispatch_target(lookup: &impl Fn(&str) -> Option<String>) -> Result<Option<DispatchTarget>> {
    match (
        lookup("DISPATCH_PRINTER"),
        lookup("DISPATCH_USERNAME"),
        lookup("DISPATCH_PASSWORD"),
    ) {
        (None, None, None) => Ok(None),
        (Some(printer), Some(username), Some(password)) => Ok(Some(DispatchTarget {
            printer,
            username,
            password,
        })),
        _ => bail!(
            "DISPATCH_PRINTER, DISPATCH_USERNAME and DISPATCH_PASSWORD must be set together"
        ),
    }
}
