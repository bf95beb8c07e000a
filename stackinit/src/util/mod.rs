pub mod command;
pub mod process;

pub use command::{CommandOutput, CommandSpec, resolve_program, run_command};
pub use process::{is_process_alive, kill_process, terminate_process};

/// Restrict `path` to the given mode bits.
pub fn set_mode(path: &std::path::Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}
