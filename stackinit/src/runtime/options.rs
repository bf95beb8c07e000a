use std::path::PathBuf;

use super::constants::supervision;

/// Caller-provided options, usually parsed from the command line.
#[derive(Debug, Clone)]
pub struct BootOptions {
    /// Filesystem root every fixed path is resolved against.
    pub root: PathBuf,
    /// Application directory holding templates, schema bundles and the virtualenv.
    pub app_dir: PathBuf,
    pub poll_interval_secs: u64,
    pub gateway_port: u16,
    pub gateway_processes: u32,
}

impl Default for BootOptions {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
            app_dir: PathBuf::from("/app"),
            poll_interval_secs: supervision::POLL_INTERVAL_SECS,
            gateway_port: supervision::GATEWAY_PORT,
            gateway_processes: supervision::GATEWAY_PROCESSES,
        }
    }
}
