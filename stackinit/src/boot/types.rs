//! Type definitions for the boot pipeline.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::EffectiveConfig;
use crate::database::{DatabaseBackend, ResolvedDatabases};
use crate::env::Environment;
use crate::identity::{BootstrapReport, CredentialStore};
use crate::runtime::BootConfig;
use crate::services::ServiceCatalog;

/// Configuration state of one service after its config task.
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub config_path: PathBuf,
    pub config: EffectiveConfig,
    pub databases: Option<ResolvedDatabases>,
    /// Strategy that brought the schema to head; `None` when migration failed
    /// or the service has no database.
    pub migration: Option<DatabaseBackend>,
}

/// A service running in degraded mode and why.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Degradation {
    pub service: String,
    pub reason: String,
}

/// Shared state of one boot run.
pub struct BootContext {
    pub config: Arc<BootConfig>,
    pub env: Arc<Environment>,
    pub catalog: Arc<ServiceCatalog>,
    pub store: CredentialStore,
    pub services: BTreeMap<&'static str, ServiceState>,
    pub bootstrap: Option<BootstrapReport>,
    pub dashboard_settings: Option<PathBuf>,
    pub degraded: Vec<Degradation>,
}

impl BootContext {
    pub fn new(config: Arc<BootConfig>, env: Arc<Environment>) -> Self {
        let catalog = Arc::new(ServiceCatalog::new(&config));
        let store = CredentialStore::new(&config.credential_dir);
        Self {
            config,
            env,
            catalog,
            store,
            services: BTreeMap::new(),
            bootstrap: None,
            dashboard_settings: None,
            degraded: Vec::new(),
        }
    }

    pub fn degrade(&mut self, service: &str, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(service = %service, reason = %reason, "Service degraded");
        self.degraded.push(Degradation {
            service: service.to_string(),
            reason,
        });
    }
}
