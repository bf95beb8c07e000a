//! Tasks: identity service configuration, key material and schema.
//!
//! Every failure here is fatal: no other service can authenticate without
//! a working identity service.

use async_trait::async_trait;
use stackinit_shared::errors::{StackError, StackResult};

use super::{BootCtx, configure_service, log_task_error, task_start};
use crate::database::{MigrationDispatcher, native_command};
use crate::identity::{KeyRepository, ensure_key_repository};
use crate::pipeline::PipelineTask;
use crate::services::IDENTITY_SERVICE;
use crate::util::run_command;

/// Merge the identity template, resolve its database and apply the settings
/// application credentials depend on.
pub struct IdentityConfigTask;

#[async_trait]
impl PipelineTask<BootCtx> for IdentityConfigTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let mut ctx = ctx.lock().await;
        let catalog = ctx.catalog.clone();
        let service = catalog
            .require(IDENTITY_SERVICE)
            .inspect_err(|e| log_task_error(task_name, e))?;
        let state = configure_service(&ctx, service).inspect_err(|e| log_task_error(task_name, e))?;
        ctx.services.insert(service.name, state);
        Ok(())
    }

    fn name(&self) -> &str {
        "identity_config"
    }
}

/// Initialise the token and credential key repositories.
pub struct IdentityKeysTask;

#[async_trait]
impl PipelineTask<BootCtx> for IdentityKeysTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let (config, catalog) = {
            let ctx = ctx.lock().await;
            (ctx.config.clone(), ctx.catalog.clone())
        };
        let service = catalog
            .require(IDENTITY_SERVICE)
            .inspect_err(|e| log_task_error(task_name, e))?;
        let config_path = service
            .require_config_path()
            .inspect_err(|e| log_task_error(task_name, e))?;

        for repository in KeyRepository::ALL {
            ensure_key_repository(repository, &service.config_dir, &config_path, &config.venv_dir)
                .await
                .inspect_err(|e| log_task_error(task_name, e))?;
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "identity_keys"
    }
}

/// Bring the identity schema to head, then register the administrator and
/// the identity endpoint.
pub struct IdentitySchemaTask;

#[async_trait]
impl PipelineTask<BootCtx> for IdentitySchemaTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let (config, catalog, state) = {
            let ctx = ctx.lock().await;
            let state = ctx.services.get(IDENTITY_SERVICE).cloned();
            (ctx.config.clone(), ctx.catalog.clone(), state)
        };
        let service = catalog
            .require(IDENTITY_SERVICE)
            .inspect_err(|e| log_task_error(task_name, e))?;
        let state = state
            .ok_or_else(|| {
                StackError::InvalidState("identity service has not been configured".into())
            })
            .inspect_err(|e| log_task_error(task_name, e))?;

        if let Some(databases) = &state.databases {
            let backend = MigrationDispatcher::new(&config)
                .dispatch(service, databases, &state.config)
                .await
                .inspect_err(|e| log_task_error(task_name, e))?;
            if let Some(entry) = ctx.lock().await.services.get_mut(IDENTITY_SERVICE) {
                entry.migration = Some(backend);
            }
        }

        let argv: Vec<String> = vec![
            "keystone-manage".into(),
            "bootstrap".into(),
            "--bootstrap-password".into(),
            config.admin_password.clone(),
            "--bootstrap-admin-url".into(),
            config.identity_url.clone(),
            "--bootstrap-internal-url".into(),
            config.identity_url.clone(),
            "--bootstrap-public-url".into(),
            config.identity_url.clone(),
            "--bootstrap-region-id".into(),
            config.region.clone(),
        ];
        let argv: Vec<&str> = argv.iter().map(String::as_str).collect();
        if let Some(spec) = native_command(&config.venv_dir, &argv, &state.config_path) {
            run_command(&spec)
                .await
                .inspect_err(|e| log_task_error(task_name, e))?;
        }

        tracing::info!(
            region = %config.region,
            url = %config.identity_url,
            "Identity service bootstrapped"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "identity_schema"
    }
}
