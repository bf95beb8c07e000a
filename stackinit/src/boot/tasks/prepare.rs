//! Task: directory preparation.
//!
//! Creates the state and credential directories plus every service's config
//! and data directories. Safe to re-run.

use async_trait::async_trait;
use stackinit_shared::errors::StackResult;

use super::{BootCtx, log_task_error, task_start};
use crate::pipeline::PipelineTask;
use crate::runtime::BootConfig;
use crate::services::ServiceCatalog;
use crate::util::set_mode;

pub struct PrepareDirectoriesTask;

#[async_trait]
impl PipelineTask<BootCtx> for PrepareDirectoriesTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let (config, catalog) = {
            let ctx = ctx.lock().await;
            (ctx.config.clone(), ctx.catalog.clone())
        };

        prepare_directories(&config, &catalog).inspect_err(|e| log_task_error(task_name, e))
    }

    fn name(&self) -> &str {
        "prepare_directories"
    }
}

fn prepare_directories(config: &BootConfig, catalog: &ServiceCatalog) -> StackResult<()> {
    std::fs::create_dir_all(&config.state_dir)?;
    std::fs::create_dir_all(&config.credential_dir)?;
    set_mode(&config.credential_dir, 0o700)?;

    let mut created = 0;
    for service in catalog.iter() {
        std::fs::create_dir_all(&service.config_dir)?;
        for dir in &service.directories {
            std::fs::create_dir_all(dir)?;
            created += 1;
        }
        for (dir, mode) in service.profile.restricted_directories {
            set_mode(&config.path(dir), *mode)?;
        }
    }

    tracing::info!(
        state_dir = %config.state_dir.display(),
        directories = created,
        "Service directories ready"
    );
    Ok(())
}
