//! Boot orchestration.
//!
//! ## Architecture
//!
//! Boot is a fixed sequence of named stages run against one shared context:
//!
//! ```text
//!   1. prepare       (state, credential and service directories)
//!   2. identity      (identity config, key repositories, schema + bootstrap)
//!   3. credentials   (transient identity endpoint, principals, app credentials)
//!   4. services      (merge, resolve, wire and migrate each dependent service)
//!   5. dashboard     (settings file, static assets)
//! ```
//!
//! A task returning `Err` aborts the boot. Failures a service can run
//! without are recorded as [`Degradation`]s by the task that observes them.

mod tasks;
mod types;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use stackinit_shared::errors::StackResult;
use tokio::sync::Mutex;

use crate::env::Environment;
use crate::identity::BootstrapReport;
use crate::pipeline::{BoxedTask, ExecutionPlan, PipelineExecutor, PipelineMetrics, Stage};
use crate::runtime::BootConfig;
use crate::services::ServiceCatalog;

pub use tasks::BootCtx;
pub use types::{BootContext, Degradation, ServiceState};

use tasks::{
    CredentialBootstrapTask, DashboardTask, IdentityConfigTask, IdentityKeysTask,
    IdentitySchemaTask, PrepareDirectoriesTask, ServiceConfigTask,
};

/// Stage plan for `catalog`.
pub fn execution_plan(catalog: &ServiceCatalog) -> ExecutionPlan<BootCtx> {
    let services: Vec<BoxedTask<BootCtx>> = catalog
        .dependents()
        .map(|s| Box::new(ServiceConfigTask::new(s.name)) as BoxedTask<BootCtx>)
        .collect();

    ExecutionPlan::new(vec![
        Stage::new("prepare", vec![Box::new(PrepareDirectoriesTask)]),
        Stage::new(
            "identity",
            vec![
                Box::new(IdentityConfigTask),
                Box::new(IdentityKeysTask),
                Box::new(IdentitySchemaTask),
            ],
        ),
        Stage::new("credentials", vec![Box::new(CredentialBootstrapTask)]),
        Stage::new("services", services),
        Stage::new("dashboard", vec![Box::new(DashboardTask)]),
    ])
}

/// Outcome of a completed boot, handed to the supervisor.
#[derive(Debug)]
pub struct BootReport {
    pub started_at: DateTime<Utc>,
    pub config: Arc<BootConfig>,
    pub catalog: Arc<ServiceCatalog>,
    pub services: BTreeMap<&'static str, ServiceState>,
    pub bootstrap: Option<BootstrapReport>,
    pub degraded: Vec<Degradation>,
    pub metrics: PipelineMetrics,
}

impl BootReport {
    pub fn is_degraded(&self, service: &str) -> bool {
        self.degraded.iter().any(|d| d.service == service)
    }
}

/// Run every boot stage.
///
/// # Errors
///
/// Returns the error of the first task that failed fatally.
pub async fn run_boot(config: Arc<BootConfig>, env: Arc<Environment>) -> StackResult<BootReport> {
    let started_at = Utc::now();
    let context = BootContext::new(config.clone(), env);
    let catalog = context.catalog.clone();
    let ctx: BootCtx = Arc::new(Mutex::new(context));

    tracing::info!(
        root = %config.root.display(),
        services = catalog.iter().count(),
        "Starting boot"
    );

    let plan = execution_plan(&catalog);
    let metrics = PipelineExecutor::execute(plan, ctx.clone()).await?;
    metrics.log_summary();

    let mut ctx = ctx.lock().await;
    for degradation in &ctx.degraded {
        tracing::warn!(
            service = %degradation.service,
            reason = %degradation.reason,
            "Running in degraded mode"
        );
    }

    Ok(BootReport {
        started_at,
        config,
        catalog,
        services: std::mem::take(&mut ctx.services),
        bootstrap: ctx.bootstrap.take(),
        degraded: std::mem::take(&mut ctx.degraded),
        metrics,
    })
}
