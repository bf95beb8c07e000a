//! Task: credential bootstrap.
//!
//! Starts a transient identity endpoint, provisions one principal and
//! application credential per service and stops the endpoint again,
//! whether or not the bootstrap succeeded.

use async_trait::async_trait;
use stackinit_shared::errors::{StackError, StackResult};

use super::{BootCtx, log_task_error, task_start};
use crate::identity::{
    AdminCredentials, BootstrapReport, CredentialBootstrap, CredentialStore, KeystoneClient,
    PrincipalRequest, TransientIdentity,
};
use crate::pipeline::PipelineTask;
use crate::runtime::constants::identity;
use crate::services::IDENTITY_SERVICE;

pub struct CredentialBootstrapTask;

#[async_trait]
impl PipelineTask<BootCtx> for CredentialBootstrapTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let (config, catalog, env, store) = {
            let ctx = ctx.lock().await;
            (
                ctx.config.clone(),
                ctx.catalog.clone(),
                ctx.env.clone(),
                ctx.store.clone(),
            )
        };
        let identity_config = catalog
            .require(IDENTITY_SERVICE)
            .and_then(|s| s.require_config_path())
            .inspect_err(|e| log_task_error(task_name, e))?;

        let requests: Vec<PrincipalRequest> = catalog
            .principals()
            .map(|s| PrincipalRequest::from_env(s.name, &env))
            .collect();

        let mut endpoint = TransientIdentity::start(
            &config.venv_dir,
            &identity_config,
            identity::BOOTSTRAP_PORT,
            &config.bootstrap_identity_url,
        )
        .inspect_err(|e| log_task_error(task_name, e))?;

        let result = match endpoint
            .wait_ready(config.identity_ready_attempts, config.identity_ready_delay)
            .await
        {
            Ok(()) => {
                let client = endpoint.client().clone();
                let admin = AdminCredentials::new(&config.admin_password);
                bootstrap(client, store, admin, requests).await
            }
            Err(e) => Err(e),
        };
        endpoint.stop().await;

        let report = result.inspect_err(|e| log_task_error(task_name, e))?;
        for (service, reason) in &report.skipped {
            tracing::warn!(
                service = %service,
                reason = %reason,
                "Service has no application credential"
            );
        }
        ctx.lock().await.bootstrap = Some(report);
        Ok(())
    }

    fn name(&self) -> &str {
        "credential_bootstrap"
    }
}

/// Run the blocking bootstrap off the async runtime.
async fn bootstrap(
    client: KeystoneClient,
    store: CredentialStore,
    admin: AdminCredentials,
    requests: Vec<PrincipalRequest>,
) -> StackResult<BootstrapReport> {
    tokio::task::spawn_blocking(move || {
        CredentialBootstrap::new(&client, &store, admin).run(&requests)
    })
    .await
    .map_err(|e| StackError::Internal(format!("credential bootstrap panicked: {}", e)))?
}
