//! stackinit: container entrypoint for a single-container cloud deployment.
//!
//! Configures every platform service from its template and the
//! environment, prepares databases and identity credentials, then launches
//! and supervises the service processes.

pub mod boot;
pub mod config;
pub mod dashboard;
pub mod database;
pub mod env;
pub mod gateway;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod runtime;
pub mod services;
pub mod supervisor;
pub mod util;
pub mod wiring;

pub use boot::{BootReport, run_boot};
pub use env::Environment;
pub use runtime::{BootConfig, BootOptions};
pub use stackinit_shared::{StackError, StackResult};
pub use supervisor::{ProcessSupervisor, SupervisorExit};
