//! Fixed locations and defaults of the container image.
//!
//! Absolute paths here are interpreted relative to [`BootConfig::root`]
//! (`/` in a real container, a temp dir in tests).
//!
//! [`BootConfig::root`]: super::BootConfig

/// Filesystem locations inside the container.
pub mod paths {
    /// Persistent state shared by all services (embedded databases, credentials).
    pub const STATE_DIR: &str = "/var/lib/openstack";

    /// Credential store, relative to the state dir.
    pub const CREDENTIAL_DIR: &str = "app_credentials";

    /// Boot log directory, relative to the state dir.
    pub const LOG_DIR: &str = "logs";

    /// Template directory, relative to the application dir.
    pub const TEMPLATE_DIR: &str = "config";

    /// Schema bundle directory, relative to the application dir.
    pub const SCHEMA_DIR: &str = "schema";

    /// Python virtualenv, relative to the application dir.
    pub const VENV_DIR: &str = "venv";

    /// Gateway server root.
    pub const GATEWAY_SERVER_ROOT: &str = "/tmp/mod_wsgi-httpd";
}

/// Identity service defaults.
pub mod identity {
    /// Public identity endpoint as mounted on the gateway.
    pub const PUBLIC_URL: &str = "http://localhost/identity/v3";

    /// Endpoint of the transient identity process used during bootstrap.
    pub const BOOTSTRAP_URL: &str = "http://localhost:5000/v3";

    pub const BOOTSTRAP_PORT: u16 = 5000;

    pub const DEFAULT_REGION: &str = "RegionOne";

    pub const ADMIN_USER: &str = "admin";

    pub const ADMIN_PROJECT: &str = "admin";

    pub const DEFAULT_ADMIN_PASSWORD: &str = "admin";

    /// Shared project owning every service principal.
    pub const SERVICE_PROJECT: &str = "service";

    /// Role granted to every service principal on the service project.
    pub const SERVICE_ROLE: &str = "service";

    pub const DEFAULT_DOMAIN_ID: &str = "default";

    pub const DEFAULT_DOMAIN_NAME: &str = "Default";

    /// Readiness polling of the transient identity process.
    pub const READY_ATTEMPTS: u32 = 30;
    pub const READY_DELAY_MS: u64 = 2000;
}

/// Environment variable names that are not service-scoped.
pub mod env_vars {
    pub const DEFAULT_DB_TYPE: &str = "OPENSTACK_DEFAULT_DB_TYPE";
    pub const ADMIN_PASSWORD: &str = "KEYSTONE_ADMIN_PASSWORD";
    pub const IDENTITY_URL: &str = "OPENSTACK_IDENTITY_URL";
    pub const REGION: &str = "OPENSTACK_REGION";
    pub const DASHBOARD_SECRET_KEY: &str = "HORIZON_SECRET_KEY";
    pub const OPENSTACK_HOST: &str = "OPENSTACK_HOST";
}

/// Suffixes of service-scoped variables (`<SERVICE>_<suffix>`).
pub mod service_vars {
    pub const DB_HOST: &str = "DB_HOST";
    pub const DB_USER: &str = "DB_USER";
    pub const DB_PASSWORD: &str = "DB_PASSWORD";
    pub const DB_NAME: &str = "DB_NAME";
    pub const APP_CRED_SECRET: &str = "APP_CRED_SECRET";
    pub const SERVICE_PASSWORD: &str = "SERVICE_PASSWORD";
}

/// Supervision defaults.
pub mod supervision {
    pub const POLL_INTERVAL_SECS: u64 = 60;
    pub const GATEWAY_PORT: u16 = 80;
    pub const GATEWAY_PROCESSES: u32 = 3;
}
