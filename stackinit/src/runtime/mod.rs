//! Boot-wide configuration and container layout.

mod config;
pub mod constants;
mod options;

pub use config::BootConfig;
pub use options::BootOptions;
