//! Boot configuration, constructed once and shared read-only by all stages.

use std::path::{Path, PathBuf};
use std::time::Duration;

use stackinit_shared::errors::{StackError, StackResult};

use super::constants::{env_vars, identity, paths};
use super::options::BootOptions;
use crate::env::Environment;

#[derive(Debug, Clone)]
pub struct BootConfig {
    pub root: PathBuf,
    pub app_dir: PathBuf,
    pub state_dir: PathBuf,
    pub credential_dir: PathBuf,
    pub log_dir: PathBuf,
    pub template_dir: PathBuf,
    pub schema_dir: PathBuf,
    pub venv_dir: PathBuf,
    /// Identity endpoint wired into service configs.
    pub identity_url: String,
    /// Identity endpoint of the transient process used by credential bootstrap.
    pub bootstrap_identity_url: String,
    pub region: String,
    pub admin_password: String,
    pub poll_interval: Duration,
    pub gateway_port: u16,
    pub gateway_processes: u32,
    pub identity_ready_attempts: u32,
    pub identity_ready_delay: Duration,
}

impl BootConfig {
    /// Build the configuration from options and the environment snapshot.
    ///
    /// # Errors
    ///
    /// Returns error if `root` or `app_dir` is not absolute, or the poll
    /// interval is zero.
    pub fn new(options: BootOptions, env: &Environment) -> StackResult<Self> {
        if !options.root.is_absolute() {
            return Err(StackError::Config(format!(
                "root must be an absolute path, got: {}",
                options.root.display()
            )));
        }
        if !options.app_dir.is_absolute() {
            return Err(StackError::Config(format!(
                "app_dir must be an absolute path, got: {}",
                options.app_dir.display()
            )));
        }
        if options.poll_interval_secs == 0 {
            return Err(StackError::Config(
                "poll interval must be at least one second".into(),
            ));
        }

        let app_dir = rooted(&options.root, &options.app_dir);
        let state_dir = rooted(&options.root, Path::new(paths::STATE_DIR));

        Ok(Self {
            credential_dir: state_dir.join(paths::CREDENTIAL_DIR),
            log_dir: state_dir.join(paths::LOG_DIR),
            template_dir: app_dir.join(paths::TEMPLATE_DIR),
            schema_dir: app_dir.join(paths::SCHEMA_DIR),
            venv_dir: app_dir.join(paths::VENV_DIR),
            identity_url: env.get_or(env_vars::IDENTITY_URL, identity::PUBLIC_URL),
            bootstrap_identity_url: identity::BOOTSTRAP_URL.to_string(),
            region: env.get_or(env_vars::REGION, identity::DEFAULT_REGION),
            admin_password: env.get_or(env_vars::ADMIN_PASSWORD, identity::DEFAULT_ADMIN_PASSWORD),
            poll_interval: Duration::from_secs(options.poll_interval_secs),
            gateway_port: options.gateway_port,
            gateway_processes: options.gateway_processes.max(1),
            identity_ready_attempts: identity::READY_ATTEMPTS,
            identity_ready_delay: Duration::from_millis(identity::READY_DELAY_MS),
            root: options.root,
            app_dir,
            state_dir,
        })
    }

    /// Resolve a fixed container path against the configured root.
    pub fn path(&self, absolute: impl AsRef<Path>) -> PathBuf {
        rooted(&self.root, absolute.as_ref())
    }
}

fn rooted(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout_under_slash() {
        let config = BootConfig::new(BootOptions::default(), &Environment::default()).unwrap();
        assert_eq!(config.state_dir, PathBuf::from("/var/lib/openstack"));
        assert_eq!(
            config.credential_dir,
            PathBuf::from("/var/lib/openstack/app_credentials")
        );
        assert_eq!(config.template_dir, PathBuf::from("/app/config"));
        assert_eq!(config.poll_interval, Duration::from_secs(60));
        assert_eq!(config.admin_password, "admin");
    }

    #[test]
    fn test_paths_follow_root() {
        let options = BootOptions {
            root: PathBuf::from("/tmp/boot-root"),
            ..Default::default()
        };
        let config = BootConfig::new(options, &Environment::default()).unwrap();
        assert_eq!(
            config.path("/etc/glance"),
            PathBuf::from("/tmp/boot-root/etc/glance")
        );
        assert_eq!(config.venv_dir, PathBuf::from("/tmp/boot-root/app/venv"));
    }

    #[test]
    fn test_env_overrides() {
        let env = Environment::from_pairs([
            ("KEYSTONE_ADMIN_PASSWORD", "s3cret"),
            ("OPENSTACK_IDENTITY_URL", "http://id.example/v3"),
        ]);
        let config = BootConfig::new(BootOptions::default(), &env).unwrap();
        assert_eq!(config.admin_password, "s3cret");
        assert_eq!(config.identity_url, "http://id.example/v3");
    }

    #[test]
    fn test_relative_root_rejected() {
        let options = BootOptions {
            root: PathBuf::from("relative"),
            ..Default::default()
        };
        assert!(BootConfig::new(options, &Environment::default()).is_err());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let options = BootOptions {
            poll_interval_secs: 0,
            ..Default::default()
        };
        assert!(BootConfig::new(options, &Environment::default()).is_err());
    }
}
