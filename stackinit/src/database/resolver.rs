//! Database Resolver.
//!
//! Chooses between an embedded file database under the state dir and an
//! external relational server, then writes the connection string into the
//! service's effective config.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::EffectiveConfig;
use crate::env::Environment;
use crate::runtime::constants::{env_vars, service_vars};
use crate::services::{AuxiliaryDatabase, ServiceDescriptor};

/// Section and option receiving the primary connection string.
pub const DATABASE_SECTION: &str = "database";
pub const CONNECTION_OPTION: &str = "connection";

const EMBEDDED_SCHEME: &str = "sqlite:///";
const EXTERNAL_SCHEME: &str = "postgresql://";
const LOCALHOST: &str = "localhost";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Embedded,
    External,
}

impl fmt::Display for DatabaseBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackend::Embedded => write!(f, "embedded"),
            DatabaseBackend::External => write!(f, "external"),
        }
    }
}

/// Resolved target of one database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DatabaseDescriptor {
    Embedded {
        path: PathBuf,
    },
    External {
        user: String,
        password: String,
        host: String,
        name: String,
    },
}

impl DatabaseDescriptor {
    pub fn backend(&self) -> DatabaseBackend {
        match self {
            DatabaseDescriptor::Embedded { .. } => DatabaseBackend::Embedded,
            DatabaseDescriptor::External { .. } => DatabaseBackend::External,
        }
    }

    pub fn is_embedded(&self) -> bool {
        self.backend() == DatabaseBackend::Embedded
    }

    /// Connection string as the services expect it.
    pub fn connection(&self) -> String {
        match self {
            DatabaseDescriptor::Embedded { path } => {
                format!("{}{}", EMBEDDED_SCHEME, path.display())
            }
            DatabaseDescriptor::External {
                user,
                password,
                host,
                name,
            } => format!("{}{}:{}@{}/{}", EXTERNAL_SCHEME, user, password, host, name),
        }
    }

    /// Connection string with the password replaced, safe for logs.
    pub fn masked(&self) -> String {
        match self {
            DatabaseDescriptor::External {
                user, host, name, ..
            } => format!("{}{}:***@{}/{}", EXTERNAL_SCHEME, user, host, name),
            embedded => embedded.connection(),
        }
    }

    /// Same backend and credentials, different database.
    pub fn sibling(&self, name: &str, state_dir: &Path) -> Self {
        match self {
            DatabaseDescriptor::Embedded { .. } => embedded(state_dir, name),
            DatabaseDescriptor::External {
                user,
                password,
                host,
                ..
            } => DatabaseDescriptor::External {
                user: user.clone(),
                password: password.clone(),
                host: host.clone(),
                name: name.to_string(),
            },
        }
    }
}

fn embedded(state_dir: &Path, name: &str) -> DatabaseDescriptor {
    DatabaseDescriptor::Embedded {
        path: state_dir.join(format!("{}.sqlite", name)),
    }
}

/// Every database one service uses.
#[derive(Debug, Clone)]
pub struct ResolvedDatabases {
    pub primary: DatabaseDescriptor,
    pub auxiliary: Option<(AuxiliaryDatabase, DatabaseDescriptor)>,
    /// Seed database registered in the auxiliary's routing table.
    pub seed: Option<DatabaseDescriptor>,
}

impl ResolvedDatabases {
    pub fn backend(&self) -> DatabaseBackend {
        self.primary.backend()
    }
}

pub struct DatabaseResolver<'a> {
    env: &'a Environment,
    state_dir: &'a Path,
}

impl<'a> DatabaseResolver<'a> {
    pub fn new(env: &'a Environment, state_dir: &'a Path) -> Self {
        Self { env, state_dir }
    }

    /// Resolve the primary database of `service`. First matching rule wins:
    ///
    /// 1. `<SERVICE>_DB_HOST` unset: embedded
    /// 2. `OPENSTACK_DEFAULT_DB_TYPE=sqlite`: embedded
    /// 3. host is `localhost`: embedded
    /// 4. external, user/password/name defaulting to the service name
    pub fn resolve(&self, service: &str) -> DatabaseDescriptor {
        let default = service.to_lowercase();
        let host = self.env.service_var(service, service_vars::DB_HOST);
        self.decide(service, host, |suffix| {
            self.env
                .service_var(service, suffix)
                .unwrap_or(&default)
                .to_string()
        })
    }

    /// Resolve an auxiliary database. An embedded primary forces an embedded
    /// auxiliary; otherwise the same policy runs on `<AUX>_DB_*` variables,
    /// falling back to the primary's server and credentials.
    pub fn resolve_auxiliary(
        &self,
        primary: &DatabaseDescriptor,
        aux: &AuxiliaryDatabase,
    ) -> DatabaseDescriptor {
        let DatabaseDescriptor::External {
            user,
            password,
            host,
            ..
        } = primary
        else {
            tracing::info!(
                database = aux.name,
                strategy = "embedded",
                "Primary database is embedded, using embedded auxiliary database"
            );
            return embedded(self.state_dir, aux.name);
        };

        let host = self
            .env
            .service_var(aux.name, service_vars::DB_HOST)
            .filter(|h| !h.is_empty())
            .or(Some(host.as_str()));
        self.decide(aux.name, host, |suffix| {
            let inherited = match suffix {
                service_vars::DB_USER => user.as_str(),
                service_vars::DB_PASSWORD => password.as_str(),
                _ => aux.name,
            };
            self.env
                .service_var(aux.name, suffix)
                .unwrap_or(inherited)
                .to_string()
        })
    }

    fn decide(
        &self,
        name: &str,
        host: Option<&str>,
        var: impl Fn(&str) -> String,
    ) -> DatabaseDescriptor {
        let reason = match host {
            None | Some("") => Some("no database host configured"),
            Some(_)
                if self
                    .env
                    .get(env_vars::DEFAULT_DB_TYPE)
                    .is_some_and(|t| t.eq_ignore_ascii_case("sqlite")) =>
            {
                Some("default database type is sqlite")
            }
            Some(h) if h.eq_ignore_ascii_case(LOCALHOST) => {
                Some("database host is localhost")
            }
            Some(_) => None,
        };

        if let Some(reason) = reason {
            let descriptor = embedded(self.state_dir, &name.to_lowercase());
            tracing::info!(
                service = %name,
                strategy = "embedded",
                reason,
                connection = %descriptor.masked(),
                "Using embedded database"
            );
            return descriptor;
        }

        let descriptor = DatabaseDescriptor::External {
            user: var(service_vars::DB_USER),
            password: var(service_vars::DB_PASSWORD),
            host: host.unwrap_or_default().to_string(),
            name: var(service_vars::DB_NAME),
        };
        tracing::info!(
            service = %name,
            strategy = "external",
            connection = %descriptor.masked(),
            "Using external database"
        );
        descriptor
    }

    /// Resolve all databases of `service` and write their connection strings.
    ///
    /// Returns `None` for services without a database.
    pub fn apply(
        &self,
        service: &ServiceDescriptor,
        config: &mut EffectiveConfig,
    ) -> Option<ResolvedDatabases> {
        let profile = service.profile.database?;

        let primary = self.resolve(service.name);
        config.set(DATABASE_SECTION, CONNECTION_OPTION, primary.connection());

        let auxiliary = profile.auxiliary.map(|aux| {
            let descriptor = self.resolve_auxiliary(&primary, &aux);
            config.set(aux.section, CONNECTION_OPTION, descriptor.connection());
            (aux, descriptor)
        });

        let seed = profile
            .auxiliary
            .and_then(|aux| aux.seed)
            .map(|seed| primary.sibling(seed.name, self.state_dir));

        Some(ResolvedDatabases {
            primary,
            auxiliary,
            seed,
        })
    }
}
