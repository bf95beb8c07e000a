//! Sequential staged task executor.
//!
//! ```text
//! ExecutionPlan → Stages → Tasks
//!
//! - Stage: named group of tasks, run in order
//! - Task: atomic unit of work; an Err stops the whole plan
//! ```
//!
//! Tasks decide for themselves whether a failure is fatal: a degraded
//! outcome is logged and the task returns `Ok`.

mod executor;
mod metrics;
mod stage;
mod task;

pub use executor::{ExecutionPlan, PipelineExecutor};
pub use metrics::{PipelineMetrics, StageMetrics, TaskMetrics};
pub use stage::Stage;
pub use task::{BoxedTask, PipelineTask};
