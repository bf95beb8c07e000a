use async_trait::async_trait;
use stackinit_shared::errors::StackResult;

/// Unit of work run against a shared context, which is cloned per task.
#[async_trait]
pub trait PipelineTask<Ctx>: Send + Sync {
    async fn run(self: Box<Self>, ctx: Ctx) -> StackResult<()>;

    /// Human-readable task name for logging and metrics.
    fn name(&self) -> &str;
}

pub type BoxedTask<Ctx> = Box<dyn PipelineTask<Ctx>>;
