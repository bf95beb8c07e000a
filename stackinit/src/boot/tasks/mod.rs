//! Boot tasks.

mod credentials;
mod dashboard;
mod identity;
mod prepare;
mod service;

pub use credentials::CredentialBootstrapTask;
pub use dashboard::DashboardTask;
pub use identity::{IdentityConfigTask, IdentityKeysTask, IdentitySchemaTask};
pub use prepare::PrepareDirectoriesTask;
pub use service::ServiceConfigTask;

use std::sync::Arc;

use stackinit_shared::errors::{StackError, StackResult};
use tokio::sync::Mutex;

use super::types::{BootContext, ServiceState};
use crate::config::merge_config;
use crate::database::DatabaseResolver;
use crate::services::ServiceDescriptor;

pub type BootCtx = Arc<Mutex<BootContext>>;

async fn task_start(ctx: &BootCtx, task_name: &str) {
    let ctx = ctx.lock().await;
    tracing::debug!(
        task = task_name,
        root = %ctx.config.root.display(),
        "Starting boot task"
    );
}

fn log_task_error(task_name: &str, error: &StackError) {
    tracing::error!(task = task_name, error = %error, "Boot task failed");
}

/// Merge, resolve databases and apply static settings for one service.
///
/// The effective config is written to disk before returning.
fn configure_service(ctx: &BootContext, service: &ServiceDescriptor) -> StackResult<ServiceState> {
    let template = service.template.as_ref().ok_or_else(|| {
        StackError::InvalidState(format!("service {} has no template", service.name))
    })?;

    let merged = merge_config(template, service.name, &service.config_dir, &ctx.env)?;
    let mut config = merged.config;

    let resolver = DatabaseResolver::new(&ctx.env, &ctx.config.state_dir);
    let databases = resolver.apply(service, &mut config);

    for setting in service.profile.static_settings {
        if config.set_default(setting.section, setting.option, setting.value) {
            tracing::debug!(
                service = %service.name,
                section = setting.section,
                option = setting.option,
                "Applied static setting"
            );
        }
    }

    config.save(&merged.path)?;
    Ok(ServiceState {
        config_path: merged.path,
        config,
        databases,
        migration: None,
    })
}
