//! Dashboard settings and static assets.

use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use stackinit_shared::errors::StackResult;
use walkdir::WalkDir;

use crate::env::Environment;
use crate::identity::{ApplicationCredential, CredentialStore};
use crate::runtime::BootConfig;
use crate::runtime::constants::env_vars;
use crate::util::{CommandSpec, resolve_program, run_command, set_mode};

pub const SETTINGS_FILE: &str = "local_settings.py";
const MANAGE_SCRIPT: &str = "manage.py";
const DEFAULT_HOST: &str = "localhost";

/// Values rendered into `local_settings.py`.
#[derive(Clone)]
pub struct DashboardSettings {
    pub secret_key: String,
    pub openstack_host: String,
    pub keystone_url: String,
    pub webroot: String,
    pub database_path: PathBuf,
    pub credential: Option<ApplicationCredential>,
}

impl DashboardSettings {
    pub fn new(
        config: &BootConfig,
        env: &Environment,
        webroot: &str,
        credential: Option<ApplicationCredential>,
    ) -> Self {
        let secret_key = match env.get(env_vars::DASHBOARD_SECRET_KEY) {
            Some(key) if !key.is_empty() => key.to_string(),
            _ => {
                tracing::warn!(
                    "{} is not set, sessions will not survive a restart",
                    env_vars::DASHBOARD_SECRET_KEY
                );
                crate::identity::generate_secret()
            }
        };
        let openstack_host = env.get_or(env_vars::OPENSTACK_HOST, DEFAULT_HOST);
        let keystone_url = match env.get(env_vars::IDENTITY_URL) {
            Some(url) => url.to_string(),
            None => format!("http://{}/identity/v3", openstack_host),
        };

        Self {
            secret_key,
            openstack_host,
            keystone_url,
            webroot: format!("{}/", webroot.trim_end_matches('/')),
            database_path: config.state_dir.join("horizon.sqlite3"),
            credential,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "DEBUG = False");
        let _ = writeln!(out, "ALLOWED_HOSTS = ['*']");
        let _ = writeln!(out, "SECRET_KEY = {}", quote(&self.secret_key));
        let _ = writeln!(out, "WEBROOT = {}", quote(&self.webroot));
        out.push('\n');
        let _ = writeln!(out, "OPENSTACK_HOST = {}", quote(&self.openstack_host));
        let _ = writeln!(out, "OPENSTACK_KEYSTONE_URL = {}", quote(&self.keystone_url));
        let _ = writeln!(out, "OPENSTACK_KEYSTONE_DEFAULT_ROLE = 'member'");
        let _ = writeln!(out, "OPENSTACK_KEYSTONE_MULTIDOMAIN_SUPPORT = True");
        out.push('\n');
        let _ = writeln!(out, "DATABASES = {{");
        let _ = writeln!(out, "    'default': {{");
        let _ = writeln!(out, "        'ENGINE': 'django.db.backends.sqlite3',");
        let _ = writeln!(
            out,
            "        'NAME': {},",
            quote(&self.database_path.display().to_string())
        );
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        out.push('\n');
        let _ = writeln!(out, "SESSION_ENGINE = 'django.contrib.sessions.backends.cache'");
        let _ = writeln!(out, "CACHES = {{");
        let _ = writeln!(out, "    'default': {{");
        let _ = writeln!(
            out,
            "        'BACKEND': 'django.core.cache.backends.locmem.LocMemCache',"
        );
        let _ = writeln!(out, "    }}");
        let _ = writeln!(out, "}}");
        out.push('\n');
        let _ = writeln!(
            out,
            "OPENSTACK_API_VERSIONS = {{'identity': 3, 'image': 2, 'volume': 3}}"
        );
        let _ = writeln!(out, "AUTHENTICATION_PLUGINS = [");
        let _ = writeln!(out, "    'openstack_auth.plugin.password.Password',");
        let _ = writeln!(
            out,
            "    'openstack_auth.plugin.application_credential.ApplicationCredential',"
        );
        let _ = writeln!(out, "]");

        if let Some(credential) = &self.credential {
            out.push('\n');
            let _ = writeln!(out, "APPLICATION_CREDENTIAL_SETTINGS = {{");
            let _ = writeln!(
                out,
                "    'application_credential_id': {},",
                quote(&credential.id)
            );
            let _ = writeln!(
                out,
                "    'application_credential_secret': {},",
                quote(&credential.secret)
            );
            let _ = writeln!(out, "}}");
        }
        out
    }

    /// Write the settings owner-only; they carry the secret key.
    pub fn write(&self, config_dir: &Path) -> StackResult<PathBuf> {
        std::fs::create_dir_all(config_dir)?;
        let path = config_dir.join(SETTINGS_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)?;
        set_mode(&path, 0o600)?;
        file.write_all(self.render().as_bytes())?;

        tracing::info!(
            path = %path.display(),
            credential = self.credential.is_some(),
            "Dashboard settings written"
        );
        Ok(path)
    }
}

/// Python string literal. JSON string escapes are a subset of Python's.
fn quote(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Load the dashboard's credential record, if any.
pub fn dashboard_credential(
    store: &CredentialStore,
    service: &str,
) -> Option<ApplicationCredential> {
    match store.load(service) {
        Ok(Some(credential)) => {
            tracing::info!(service = %service, "Using application credential for the dashboard");
            Some(credential)
        }
        Ok(None) => None,
        Err(e) => {
            tracing::warn!(service = %service, error = %e, "Ignoring unreadable credential record");
            None
        }
    }
}

/// Locate the dashboard's `manage.py` inside the virtualenv.
pub fn find_manage_script(venv_dir: &Path) -> Option<PathBuf> {
    WalkDir::new(venv_dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == MANAGE_SCRIPT)
        .map(|entry| entry.into_path())
        .find(|path| {
            let text = path.to_string_lossy();
            text.contains("horizon") || text.contains("openstack_dashboard")
        })
}

/// Collect and compress static assets, run from the project directory
/// holding `manage.py`.
pub async fn collect_static(venv_dir: &Path, manage_script: &Path) -> StackResult<()> {
    let python = resolve_program(venv_dir, "python");
    let project_dir = manage_script.parent().unwrap_or(venv_dir);
    for args in [["collectstatic", "--noinput"], ["compress", "--force"]] {
        let spec = CommandSpec::new(&python)
            .arg(manage_script.display().to_string())
            .args(args)
            .current_dir(project_dir);
        run_command(&spec).await?;
    }
    tracing::info!(manage = %manage_script.display(), "Dashboard static assets collected");
    Ok(())
}
