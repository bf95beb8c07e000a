//! Process Supervisor.
//!
//! Launches every service process in a fixed order and polls their
//! liveness. The first process to exit ends supervision with an error:
//! there is no restart, recovery is left to whatever restarts the
//! container. On SIGTERM or SIGINT every process is asked to terminate and
//! the gateway glue is removed.

mod plan;

pub use plan::{GATEWAY_PROCESS, LaunchSpec, launch_plan};

use std::future::Future;
use std::process::Stdio;
use std::time::Duration;

use stackinit_shared::errors::{StackError, StackResult};
use tokio::process::{Child, Command};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;

use crate::gateway::GatewayGlue;
use crate::util::terminate_process;

/// A launched process.
#[derive(Debug)]
pub struct ManagedProcess {
    pub name: String,
    pub pid: u32,
    child: Child,
}

/// Why supervision ended without error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorExit {
    Shutdown,
}

pub struct ProcessSupervisor {
    processes: Vec<ManagedProcess>,
    poll_interval: Duration,
    glue: Option<GatewayGlue>,
}

impl ProcessSupervisor {
    pub fn new(poll_interval: Duration) -> Self {
        Self {
            processes: Vec::new(),
            poll_interval,
            glue: None,
        }
    }

    /// Hand over the gateway glue so it is removed on shutdown.
    pub fn with_gateway(mut self, glue: GatewayGlue) -> Self {
        self.glue = Some(glue);
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.processes.iter().map(|p| p.name.as_str()).collect()
    }

    /// Spawn one process. Names must be unique.
    pub fn launch(&mut self, spec: &LaunchSpec) -> StackResult<u32> {
        if self.processes.iter().any(|p| p.name == spec.name) {
            return Err(StackError::InvalidState(format!(
                "process {} is already running",
                spec.name
            )));
        }

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|e| {
                let err_msg = format!(
                    "Failed to spawn {} ({}): {}",
                    spec.name,
                    spec.program.display(),
                    e
                );
                tracing::error!("{}", err_msg);
                StackError::Process(err_msg)
            })?;
        let pid = child
            .id()
            .ok_or_else(|| StackError::Process(format!("{} exited during spawn", spec.name)))?;

        tracing::info!(
            process = %spec.name,
            pid,
            program = %spec.program.display(),
            "Launched process"
        );
        self.processes.push(ManagedProcess {
            name: spec.name.clone(),
            pid,
            child,
        });
        Ok(pid)
    }

    /// Launch every spec in order, stopping at the first failure.
    pub fn launch_all(&mut self, plan: &[LaunchSpec]) -> StackResult<()> {
        for spec in plan {
            self.launch(spec)?;
        }
        Ok(())
    }

    /// One liveness check. Returns an error naming the first exited process.
    pub fn check(&mut self) -> StackResult<()> {
        for process in &mut self.processes {
            if let Some(status) = process.child.try_wait()? {
                tracing::error!(
                    process = %process.name,
                    pid = process.pid,
                    %status,
                    "Managed process exited"
                );
                return Err(StackError::Process(format!(
                    "{} (pid {}) exited: {}",
                    process.name, process.pid, status
                )));
            }
        }
        Ok(())
    }

    /// Poll at the configured interval until a process exits.
    pub async fn monitor(&mut self) -> StackError {
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            processes = self.processes.len(),
            interval_secs = self.poll_interval.as_secs_f64(),
            "Supervising processes"
        );
        loop {
            ticker.tick().await;
            if let Err(e) = self.check() {
                return e;
            }
        }
    }

    /// Supervise until a process exits or `shutdown` resolves.
    ///
    /// Both paths terminate the remaining processes and remove the gateway
    /// glue before returning.
    pub async fn run<F>(mut self, shutdown: F) -> StackResult<SupervisorExit>
    where
        F: Future<Output = ()>,
    {
        let result = tokio::select! {
            err = self.monitor() => Err(err),
            () = shutdown => {
                tracing::info!("Shutdown requested");
                Ok(SupervisorExit::Shutdown)
            }
        };
        self.shutdown();
        result
    }

    /// Send SIGTERM to every process without waiting, then drop the glue.
    pub fn shutdown(&mut self) {
        for process in &mut self.processes {
            if matches!(process.child.try_wait(), Ok(Some(_))) {
                continue;
            }
            if terminate_process(process.pid) {
                tracing::debug!(process = %process.name, pid = process.pid, "Sent SIGTERM");
            } else {
                tracing::warn!(
                    process = %process.name,
                    pid = process.pid,
                    "Failed to signal process"
                );
            }
        }
        if let Some(glue) = self.glue.take() {
            glue.cleanup();
        }
    }
}

/// Resolves on the first SIGTERM or SIGINT.
pub async fn shutdown_signal() -> StackResult<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    tokio::select! {
        _ = sigterm.recv() => tracing::info!("Received SIGTERM"),
        _ = sigint.recv() => tracing::info!("Received SIGINT"),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn sh(name: &str, script: &str) -> LaunchSpec {
        LaunchSpec::new(name, "/bin/sh", vec!["-c".into(), script.into()])
    }

    #[tokio::test]
    async fn test_exit_ends_supervision() {
        let mut supervisor = ProcessSupervisor::new(Duration::from_millis(50));
        supervisor
            .launch_all(&[sh("steady", "exec sleep 30"), sh("flaky", "sleep 0.2; exit 3")])
            .unwrap();

        let started = Instant::now();
        let err = supervisor
            .run(std::future::pending())
            .await
            .unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        match err {
            StackError::Process(message) => assert!(message.starts_with("flaky")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_duplicate_name_rejected() {
        let mut supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        supervisor.launch(&sh("api", "exec sleep 30")).unwrap();
        let err = supervisor.launch(&sh("api", "exec sleep 30")).unwrap_err();
        assert!(matches!(err, StackError::InvalidState(_)));
        assert_eq!(supervisor.names(), vec!["api"]);
        supervisor.shutdown();
    }

    #[tokio::test]
    async fn test_missing_binary() {
        let mut supervisor = ProcessSupervisor::new(Duration::from_secs(1));
        let spec = LaunchSpec::new("ghost", "/nonexistent/ghost-api", vec![]);
        assert!(matches!(supervisor.launch(&spec), Err(StackError::Process(_))));
        assert!(supervisor.names().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_terminates_and_cleans_up() {
        let glue = GatewayGlue::prepare(std::iter::empty(), std::path::Path::new("/app/venv"))
            .unwrap();
        let glue_dir = glue.path().to_path_buf();
        let mut supervisor = ProcessSupervisor::new(Duration::from_secs(60)).with_gateway(glue);
        supervisor.launch(&sh("api", "exec sleep 30")).unwrap();

        let exit = supervisor
            .run(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(exit, SupervisorExit::Shutdown);
        assert!(!glue_dir.exists());
    }

    #[tokio::test]
    async fn test_terminated_process_is_detected() {
        let mut supervisor = ProcessSupervisor::new(Duration::from_millis(20));
        supervisor.launch(&sh("api", "exec sleep 30")).unwrap();
        assert!(supervisor.check().is_ok());

        supervisor.shutdown();
        let err = tokio::time::timeout(Duration::from_secs(5), supervisor.monitor())
            .await
            .unwrap();
        assert!(matches!(err, StackError::Process(_)));
    }
}
