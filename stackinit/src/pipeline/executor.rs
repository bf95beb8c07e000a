use std::time::Instant;

use stackinit_shared::errors::StackResult;

use super::metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
use super::stage::Stage;

pub struct ExecutionPlan<Ctx> {
    stages: Vec<Stage<Ctx>>,
}

impl<Ctx> ExecutionPlan<Ctx> {
    pub fn new(stages: Vec<Stage<Ctx>>) -> Self {
        Self { stages }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|s| s.name).collect()
    }

    pub fn task_names(&self) -> Vec<String> {
        self.stages
            .iter()
            .flat_map(|s| s.tasks.iter().map(|t| t.name().to_string()))
            .collect()
    }
}

pub struct PipelineExecutor;

impl PipelineExecutor {
    /// Run every stage in order, stopping at the first failing task.
    ///
    /// `Ctx` is the shared pipeline context; use interior mutability for writes.
    pub async fn execute<Ctx>(plan: ExecutionPlan<Ctx>, ctx: Ctx) -> StackResult<PipelineMetrics>
    where
        Ctx: Clone,
    {
        let total_start = Instant::now();
        let mut stage_metrics = Vec::new();

        for stage in plan.stages {
            let stage_start = Instant::now();
            tracing::debug!(stage = stage.name, tasks = stage.tasks.len(), "Entering stage");

            let mut task_metrics = Vec::new();
            for task in stage.tasks {
                let name = task.name().to_string();
                let task_start = Instant::now();
                if let Err(e) = task.run(ctx.clone()).await {
                    tracing::error!(
                        stage = stage.name,
                        task = %name,
                        error = %e,
                        "Boot task failed"
                    );
                    return Err(e);
                }
                task_metrics.push(TaskMetrics {
                    name,
                    duration_ms: task_start.elapsed().as_millis(),
                });
            }

            stage_metrics.push(StageMetrics {
                name: stage.name,
                duration_ms: stage_start.elapsed().as_millis(),
                tasks: task_metrics,
            });
        }

        Ok(PipelineMetrics {
            total_duration_ms: total_start.elapsed().as_millis(),
            stages: stage_metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{BoxedTask, PipelineTask};
    use async_trait::async_trait;
    use stackinit_shared::errors::StackError;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<String>>>;

    struct Record(&'static str);

    #[async_trait]
    impl PipelineTask<Log> for Record {
        async fn run(self: Box<Self>, ctx: Log) -> StackResult<()> {
            ctx.lock().unwrap().push(self.0.to_string());
            Ok(())
        }

        fn name(&self) -> &str {
            self.0
        }
    }

    struct Fail;

    #[async_trait]
    impl PipelineTask<Log> for Fail {
        async fn run(self: Box<Self>, _ctx: Log) -> StackResult<()> {
            Err(StackError::InvalidState("boom".into()))
        }

        fn name(&self) -> &str {
            "fail"
        }
    }

    fn task(name: &'static str) -> BoxedTask<Log> {
        Box::new(Record(name))
    }

    #[tokio::test]
    async fn test_stages_run_in_order() {
        let log: Log = Arc::default();
        let plan = ExecutionPlan::new(vec![
            Stage::new("first", vec![task("a"), task("b")]),
            Stage::new("second", vec![task("c")]),
        ]);
        assert_eq!(plan.stage_names(), vec!["first", "second"]);

        let metrics = PipelineExecutor::execute(plan, log.clone()).await.unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(metrics.stages.len(), 2);
        assert!(metrics.task_duration_ms("c").is_some());
        assert!(metrics.task_duration_ms("missing").is_none());
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_tasks() {
        let log: Log = Arc::default();
        let plan = ExecutionPlan::new(vec![
            Stage::new("first", vec![task("a"), Box::new(Fail), task("b")]),
            Stage::new("second", vec![task("c")]),
        ]);

        let err = PipelineExecutor::execute(plan, log.clone()).await.unwrap_err();
        assert!(matches!(err, StackError::InvalidState(_)));
        assert_eq!(*log.lock().unwrap(), vec!["a"]);
    }
}
