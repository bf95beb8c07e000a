//! Task: configure one dependent service.
//!
//! Merge, database resolution and credential wiring failures are fatal.
//! A failed schema migration only degrades the service: it is still
//! launched, and the failure is recorded in the boot report.

use async_trait::async_trait;
use stackinit_shared::errors::StackResult;

use super::{BootCtx, configure_service, log_task_error, task_start};
use crate::database::MigrationDispatcher;
use crate::pipeline::PipelineTask;
use crate::wiring::wire_service;

pub struct ServiceConfigTask {
    service: &'static str,
    task_name: String,
}

impl ServiceConfigTask {
    pub fn new(service: &'static str) -> Self {
        Self {
            service,
            task_name: format!("{}_config", service),
        }
    }
}

#[async_trait]
impl PipelineTask<BootCtx> for ServiceConfigTask {
    async fn run(self: Box<Self>, ctx: BootCtx) -> StackResult<()> {
        let task_name = self.name();
        task_start(&ctx, task_name).await;

        let (config, catalog, state) = {
            let mut guard = ctx.lock().await;
            let catalog = guard.catalog.clone();
            let service = catalog
                .require(self.service)
                .inspect_err(|e| log_task_error(task_name, e))?;

            let mut state =
                configure_service(&guard, service).inspect_err(|e| log_task_error(task_name, e))?;
            wire_service(
                &mut state.config,
                service,
                &guard.store,
                &guard.config.identity_url,
                &guard.env,
            );
            state
                .config
                .save(&state.config_path)
                .inspect_err(|e| log_task_error(task_name, e))?;

            guard.services.insert(service.name, state.clone());
            (guard.config.clone(), catalog, state)
        };

        let Some(databases) = &state.databases else {
            return Ok(());
        };
        let service = catalog.require(self.service)?;
        match MigrationDispatcher::new(&config)
            .dispatch(service, databases, &state.config)
            .await
        {
            Ok(backend) => {
                if let Some(entry) = ctx.lock().await.services.get_mut(service.name) {
                    entry.migration = Some(backend);
                }
            }
            Err(e) => {
                ctx.lock()
                    .await
                    .degrade(service.name, format!("schema migration failed: {}", e));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        &self.task_name
    }
}
