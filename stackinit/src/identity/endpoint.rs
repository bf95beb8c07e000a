//! Transient identity API process used while bootstrapping credentials.
//!
//! Supervised processes only start after every boot stage, so the
//! credential bootstrap runs its own short-lived identity endpoint and
//! stops it before returning.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use stackinit_shared::errors::{StackError, StackResult};
use tokio::process::{Child, Command};

use super::client::KeystoneClient;
use crate::util::{kill_process, resolve_program, terminate_process};

const PROGRAM: &str = "keystone-wsgi-public";
const STOP_GRACE: Duration = Duration::from_secs(10);

pub struct TransientIdentity {
    child: Child,
    client: KeystoneClient,
}

impl TransientIdentity {
    /// Start the identity API on `port` with the merged identity config.
    pub fn start(
        venv_dir: &Path,
        identity_config: &Path,
        port: u16,
        base_url: &str,
    ) -> StackResult<Self> {
        let program = resolve_program(venv_dir, PROGRAM);
        let mut cmd = Command::new(&program);
        cmd.arg("--port")
            .arg(port.to_string())
            .arg("--")
            .arg("--config-file")
            .arg(identity_config)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            let err_msg = format!(
                "Failed to spawn transient identity endpoint {}: {}",
                program.display(),
                e
            );
            tracing::error!("{}", err_msg);
            StackError::Process(err_msg)
        })?;

        tracing::info!(pid = ?child.id(), port, "Started transient identity endpoint");
        Ok(Self {
            child,
            client: KeystoneClient::new(base_url),
        })
    }

    pub fn client(&self) -> &KeystoneClient {
        &self.client
    }

    /// Poll until the endpoint answers, the process exits, or attempts run out.
    pub async fn wait_ready(&mut self, attempts: u32, delay: Duration) -> StackResult<()> {
        for attempt in 1..=attempts.max(1) {
            if let Some(status) = self.child.try_wait()? {
                return Err(StackError::Process(format!(
                    "transient identity endpoint exited before becoming ready: {}",
                    status
                )));
            }

            let client = self.client.clone();
            let ready = tokio::task::spawn_blocking(move || client.is_reachable())
                .await
                .map_err(|e| StackError::Internal(format!("readiness check panicked: {}", e)))?;
            if ready {
                tracing::info!(attempt, "Transient identity endpoint is ready");
                return Ok(());
            }

            tracing::debug!(attempt, attempts, "Identity endpoint not ready yet");
            tokio::time::sleep(delay).await;
        }

        Err(StackError::Identity(format!(
            "identity endpoint {} not ready after {} attempts",
            self.client.base_url(),
            attempts
        )))
    }

    /// Terminate the process, escalating to SIGKILL after a grace period.
    pub async fn stop(mut self) {
        let Some(pid) = self.child.id() else {
            return;
        };
        terminate_process(pid);
        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(pid, %status, "Stopped transient identity endpoint");
            }
            Ok(Err(e)) => {
                tracing::warn!(pid, error = %e, "Failed to reap transient identity endpoint");
            }
            Err(_) => {
                tracing::warn!(pid, "Transient identity endpoint ignored SIGTERM, killing");
                kill_process(pid);
                let _ = self.child.wait().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::set_mode;
    use tempfile::TempDir;

    fn fake_endpoint(dir: &Path, script: &str) -> std::path::PathBuf {
        let bin = dir.join("venv/bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join(PROGRAM), script).unwrap();
        set_mode(&bin.join(PROGRAM), 0o755).unwrap();
        dir.join("venv")
    }

    #[tokio::test]
    async fn test_early_exit_is_reported() {
        let dir = TempDir::new().unwrap();
        let venv = fake_endpoint(dir.path(), "#!/bin/sh\nexit 4\n");
        let mut endpoint = TransientIdentity::start(
            &venv,
            &dir.path().join("keystone.conf"),
            5999,
            "http://127.0.0.1:5999/v3",
        )
        .unwrap();

        let err = endpoint
            .wait_ready(5, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Process(_)));
    }

    #[tokio::test]
    async fn test_not_ready_after_attempts() {
        let dir = TempDir::new().unwrap();
        let venv = fake_endpoint(dir.path(), "#!/bin/sh\nexec sleep 30\n");
        let mut endpoint = TransientIdentity::start(
            &venv,
            &dir.path().join("keystone.conf"),
            1,
            "http://127.0.0.1:1/v3",
        )
        .unwrap();

        let err = endpoint
            .wait_ready(2, Duration::from_millis(10))
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Identity(_)));
        endpoint.stop().await;
    }
}
