//! Lifecycle of the layout service process.
//!
//! `OracleServer` is a scope guard: the child is spawned with `kill_on_drop`,
//! so leaving the scope by any path (error, early return, panic) stops it.
//! `shutdown` is the orderly path and also reaps the child.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::oracle::PreformClient;

const READY_POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct OracleServer {
    child: Child,
    binary: PathBuf,
}

impl OracleServer {
    /// Spawns `binary` and waits until `client` gets an HTTP answer.
    ///
    /// The process is killed if it exits early or is not ready within
    /// `startup_timeout`.
    pub async fn start(
        binary: &Path,
        client: &PreformClient,
        startup_timeout: Duration,
    ) -> Result<Self> {
        info!(binary = %binary.display(), "Starting layout service");

        let child = Command::new(binary)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to start layout service '{}'", binary.display()))?;

        let mut server = Self {
            child,
            binary: binary.to_path_buf(),
        };

        let ready = tokio::time::timeout(startup_timeout, server.wait_until_ready(client)).await;
        match ready {
            Ok(Ok(())) => {
                info!(url = client.base_url(), "Layout service ready");
                Ok(server)
            }
            Ok(Err(e)) => {
                server.shutdown().await;
                Err(e)
            }
            Err(_) => {
                let pid = server.child.id().unwrap_or_default();
                server.shutdown().await;
                bail!(
                    "Layout service (pid {pid}) did not become ready within {}ms",
                    startup_timeout.as_millis()
                )
            }
        }
    }

    async fn wait_until_ready(&mut self, client: &PreformClient) -> Result<()> {
        loop {
            if let Some(status) = self.child.try_wait()? {
                bail!("Layout service exited during startup with {status}");
            }
            match client.ping().await {
                Ok(()) => return Ok(()),
                Err(e) => debug!("Layout service not ready yet: {e}"),
            }
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }

    /// Stops the process and waits for it to exit.
    pub async fn shutdown(mut self) {
        info!(binary = %self.binary.display(), "Stopping layout service");
        if let Err(e) = self.child.kill().await {
            warn!("Failed to stop layout service: {e}");
        }
    }
}
