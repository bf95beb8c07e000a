//! Web gateway glue.
//!
//! The identity and dashboard applications are mounted under path prefixes
//! of one multi-worker gateway process. Each mount gets an include file in a
//! scratch directory that lives as long as the gateway.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use stackinit_shared::errors::StackResult;
use tempfile::TempDir;

use crate::runtime::BootConfig;
use crate::runtime::constants::paths;
use crate::services::{GatewayMount, ServiceDescriptor};
use crate::util::resolve_program;

const GATEWAY_PROGRAM: &str = "mod_wsgi-express";

/// Scratch directory with one include file per mount.
#[derive(Debug)]
pub struct GatewayGlue {
    dir: TempDir,
    include_files: Vec<PathBuf>,
}

impl GatewayGlue {
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn include_files(&self) -> &[PathBuf] {
        &self.include_files
    }

    /// Write the include files for every mountable service.
    pub fn prepare<'a>(
        services: impl IntoIterator<Item = &'a ServiceDescriptor>,
        venv_dir: &Path,
    ) -> StackResult<Self> {
        let dir = tempfile::Builder::new().prefix("stackinit-gateway-").tempdir()?;
        let mut include_files = Vec::new();

        for service in services {
            let Some(mount) = service.profile.gateway_mount else {
                continue;
            };
            let path = dir.path().join(format!("{}.conf", service.name));
            std::fs::write(&path, render_mount(service.name, &mount, venv_dir))?;
            tracing::debug!(
                service = %service.name,
                prefix = %mount.prefix,
                include = %path.display(),
                "Gateway mount prepared"
            );
            include_files.push(path);
        }

        tracing::info!(
            dir = %dir.path().display(),
            mounts = include_files.len(),
            "Gateway glue prepared"
        );
        Ok(Self { dir, include_files })
    }

    /// Remove the scratch directory.
    pub fn cleanup(self) {
        let path = self.dir.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => tracing::debug!(dir = %path.display(), "Gateway glue removed"),
            Err(e) => tracing::warn!(
                dir = %path.display(),
                error = %e,
                "Failed to remove gateway glue"
            ),
        }
    }

    /// Gateway command line: program and arguments.
    pub fn command(&self, config: &BootConfig) -> (PathBuf, Vec<String>) {
        let program = resolve_program(&config.venv_dir, GATEWAY_PROGRAM);
        let mut args: Vec<String> = vec![
            "start-server".into(),
            "--port".into(),
            config.gateway_port.to_string(),
            "--processes".into(),
            config.gateway_processes.to_string(),
            "--log-to-terminal".into(),
            "--working-directory".into(),
            config.app_dir.display().to_string(),
            "--server-root".into(),
            config.path(paths::GATEWAY_SERVER_ROOT).display().to_string(),
        ];
        for include in &self.include_files {
            args.push("--include-file".into());
            args.push(include.display().to_string());
        }
        (program, args)
    }
}

fn render_mount(service: &str, mount: &GatewayMount, venv_dir: &Path) -> String {
    let bin = venv_dir.join("bin");
    let group = format!("{}-gateway", service);
    let mut out = String::new();
    let _ = writeln!(
        out,
        "WSGIDaemonProcess {} processes={} threads={}",
        group, mount.processes, mount.threads
    );
    let _ = writeln!(
        out,
        "WSGIScriptAlias {} {} process-group={} application-group=%{{GLOBAL}}",
        mount.prefix,
        bin.join(mount.script).display(),
        group
    );
    let _ = writeln!(out, "<Directory {}>", bin.display());
    let _ = writeln!(out, "    Require all granted");
    let _ = writeln!(out, "</Directory>");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::runtime::BootOptions;
    use crate::services::ServiceCatalog;

    fn boot() -> BootConfig {
        BootConfig::new(BootOptions::default(), &Environment::default()).unwrap()
    }

    #[test]
    fn test_mounts_identity_and_dashboard() {
        let config = boot();
        let catalog = ServiceCatalog::new(&config);
        let glue = GatewayGlue::prepare(catalog.iter(), &config.venv_dir).unwrap();

        let names: Vec<_> = glue
            .include_files()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["keystone.conf", "horizon.conf"]);

        let identity = std::fs::read_to_string(&glue.include_files()[0]).unwrap();
        assert!(identity.contains(
            "WSGIScriptAlias /identity /app/venv/bin/keystone-wsgi-public process-group=keystone-gateway"
        ));
        assert!(identity.contains("WSGIDaemonProcess keystone-gateway processes=5 threads=1"));
        let dashboard = std::fs::read_to_string(&glue.include_files()[1]).unwrap();
        assert!(dashboard.contains("WSGIScriptAlias /dashboard "));
    }

    #[test]
    fn test_command_lists_include_files() {
        let config = boot();
        let catalog = ServiceCatalog::new(&config);
        let glue = GatewayGlue::prepare(catalog.iter(), &config.venv_dir).unwrap();
        let (program, args) = glue.command(&config);

        assert_eq!(program, PathBuf::from("mod_wsgi-express"));
        assert_eq!(&args[..3], &["start-server", "--port", "80"]);
        assert!(args.windows(2).any(|w| w[0] == "--server-root" && w[1] == "/tmp/mod_wsgi-httpd"));
        assert_eq!(args.iter().filter(|a| *a == "--include-file").count(), 2);
    }

    #[test]
    fn test_cleanup_removes_dir() {
        let config = boot();
        let catalog = ServiceCatalog::new(&config);
        let glue = GatewayGlue::prepare(catalog.iter(), &config.venv_dir).unwrap();
        let path = glue.path().to_path_buf();
        assert!(path.is_dir());
        glue.cleanup();
        assert!(!path.exists());
    }
}
