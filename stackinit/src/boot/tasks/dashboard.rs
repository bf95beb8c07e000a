//! Task: dashboard settings and static assets.
//!
//! Writing the settings is fatal on failure; asset collection only
//! degrades the dashboard.

use async_trait::async_trait;
use stackinit_shared::errors::{StackError, StackResult};

use super::{BootCtx, log_task_error, task_start};
use crate::dashboard::{DashboardSettings, collect_static, dashboard_credential, find_manage_script};
use crate::pipeline::PipelineTask;
use crate::services::DASHBOARD_SERVICE;

pub struct DashboardTask;

#[async_trait]
impl PipelineTask<BootCtx> for DashboardTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let config = {
            let mut ctx = ctx.lock().await;
            let catalog = ctx.catalog.clone();
            let service = catalog
                .require(DASHBOARD_SERVICE)
                .inspect_err(|e| log_task_error(task_name, e))?;
            let webroot = service
                .profile
                .gateway_mount
                .map(|m| m.prefix)
                .unwrap_or("/");

            let credential = dashboard_credential(&ctx.store, service.name);
            let settings = DashboardSettings::new(&ctx.config, &ctx.env, webroot, credential);
            let path = settings
                .write(&service.config_dir)
                .inspect_err(|e| log_task_error(task_name, e))?;
            ctx.dashboard_settings = Some(path);
            ctx.config.clone()
        };

        let result = match find_manage_script(&config.venv_dir) {
            Some(manage) => collect_static(&config.venv_dir, &manage).await,
            None => Err(StackError::InvalidState(format!(
                "dashboard manage.py not found under {}",
                config.venv_dir.display()
            ))),
        };
        if let Err(e) = result {
            ctx.lock()
                .await
                .degrade(DASHBOARD_SERVICE, format!("static assets: {}", e));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "dashboard_settings"
    }
}
