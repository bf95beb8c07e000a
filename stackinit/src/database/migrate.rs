//! Schema Migration Dispatcher.
//!
//! Each database is handled on its own: embedded ones with a schema bundle
//! are created and stamped in process, the rest are brought to head by the
//! service's own migration tool.

use std::path::Path;

use stackinit_shared::errors::{StackError, StackResult};

use super::resolver::{DatabaseBackend, DatabaseDescriptor, ResolvedDatabases};
use super::schema::{EmbeddedDatabase, NULL_TRANSPORT, SchemaBundle};
use crate::config::EffectiveConfig;
use crate::runtime::BootConfig;
use crate::services::{DatabaseProfile, MigrationTarget, ServiceDescriptor};
use crate::util::{CommandSpec, resolve_program, run_command};

/// Native migration command with `--config-file <path>` after the program.
pub fn native_command(venv_dir: &Path, argv: &[&str], config_path: &Path) -> Option<CommandSpec> {
    let (program, args) = argv.split_first()?;
    Some(
        CommandSpec::new(resolve_program(venv_dir, program))
            .arg("--config-file")
            .arg(config_path.display().to_string())
            .args(args.iter().copied()),
    )
}

pub struct MigrationDispatcher<'a> {
    config: &'a BootConfig,
}

impl<'a> MigrationDispatcher<'a> {
    pub fn new(config: &'a BootConfig) -> Self {
        Self { config }
    }

    /// Bring every database of `service` to its head revision.
    ///
    /// Returns the primary database's backend. Errors are for the caller to
    /// classify; most services treat them as degraded, the identity service
    /// as fatal.
    pub async fn dispatch(
        &self,
        service: &ServiceDescriptor,
        databases: &ResolvedDatabases,
        effective: &EffectiveConfig,
    ) -> StackResult<DatabaseBackend> {
        let backend = databases.backend();
        let Some(profile) = service.profile.database else {
            return Ok(backend);
        };
        tracing::info!(
            service = %service.name,
            strategy = %backend,
            "Dispatching schema migration"
        );

        let mut native = Vec::new();
        if self
            .create_one(service, &databases.primary, profile.bundle)?
            .is_none()
        {
            native.push(MigrationTarget::Primary);
        }

        if let Some((aux, aux_db)) = &databases.auxiliary {
            match self.create_one(service, aux_db, aux.bundle)? {
                Some(mut handle) => {
                    if let (Some(seed), Some(seed_db)) = (aux.seed, &databases.seed) {
                        // The seed shares the primary's tool chain.
                        if self.create_one(service, seed_db, seed.bundle)?.is_none()
                            && !native.contains(&MigrationTarget::Primary)
                        {
                            native.push(MigrationTarget::Primary);
                        }
                        let transport = effective
                            .get("DEFAULT", "transport_url")
                            .filter(|t| !t.is_empty())
                            .unwrap_or(NULL_TRANSPORT);
                        handle.seed_cell_mappings(
                            &seed_db.connection(),
                            &databases.primary.connection(),
                            transport,
                        )?;
                    }
                }
                None => native.push(MigrationTarget::Auxiliary),
            }
        }

        self.run_native(service, &profile, &native).await?;
        Ok(backend)
    }

    /// Run the native commands for `targets` in declared order, continuing
    /// past failures so that later chains still get a chance to run.
    async fn run_native(
        &self,
        service: &ServiceDescriptor,
        profile: &DatabaseProfile,
        targets: &[MigrationTarget],
    ) -> StackResult<()> {
        if targets.is_empty() {
            return Ok(());
        }
        let config_path = service.require_config_path()?;

        let mut failed = Vec::new();
        for command in profile
            .migrations
            .iter()
            .filter(|c| targets.contains(&c.target))
        {
            let Some(spec) = native_command(&self.config.venv_dir, command.argv, &config_path)
            else {
                continue;
            };
            if let Err(e) = run_command(&spec).await {
                tracing::warn!(service = %service.name, error = %e, "Migration command failed");
                failed.push(spec.display());
            }
        }

        if failed.is_empty() {
            tracing::info!(service = %service.name, "Native migrations complete");
            Ok(())
        } else {
            Err(StackError::Command {
                command: failed.join(", "),
                message: format!("{} native migration(s) failed", failed.len()),
            })
        }
    }

    /// Create and stamp an embedded database from its bundle.
    ///
    /// `None` means the database is left to the native tool: it is external,
    /// or no bundle ships for it.
    fn create_one(
        &self,
        service: &ServiceDescriptor,
        descriptor: &DatabaseDescriptor,
        bundle: &str,
    ) -> StackResult<Option<EmbeddedDatabase>> {
        let DatabaseDescriptor::Embedded { path } = descriptor else {
            return Ok(None);
        };
        let schema_dir = &self.config.schema_dir;
        if !SchemaBundle::exists(schema_dir, bundle) {
            tracing::warn!(
                service = %service.name,
                bundle,
                "No schema bundle, using native migration"
            );
            return Ok(None);
        }
        let bundle = SchemaBundle::load(schema_dir, bundle)?;
        let mut db = EmbeddedDatabase::open(path)?;
        db.create_and_stamp(&bundle)?;
        Ok(Some(db))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseResolver;
    use crate::env::Environment;
    use crate::runtime::BootOptions;
    use crate::services::ServiceCatalog;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn boot(root: &Path) -> BootConfig {
        let options = BootOptions {
            root: root.to_path_buf(),
            ..Default::default()
        };
        BootConfig::new(options, &Environment::default()).unwrap()
    }

    fn write_bundle(config: &BootConfig, name: &str, ddl: &str) {
        std::fs::create_dir_all(&config.schema_dir).unwrap();
        std::fs::write(config.schema_dir.join(format!("{}.sql", name)), ddl).unwrap();
        std::fs::write(config.schema_dir.join(format!("{}.heads", name)), "head1\n").unwrap();
    }

    fn fake_tool(config: &BootConfig, name: &str, log: &Path, exit: i32) {
        let bin = config.venv_dir.join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        let path = bin.join(name);
        std::fs::write(
            &path,
            format!(
                "#!/bin/sh\necho \"{} $*\" >> {}\nexit {}\n",
                name,
                log.display(),
                exit
            ),
        )
        .unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }

    #[test]
    fn test_native_command_inserts_config_file() {
        let spec = native_command(
            Path::new("/nonexistent"),
            &["nova-manage", "cell_v2", "map_cell0"],
            Path::new("/etc/nova/nova.conf"),
        )
        .unwrap();
        assert_eq!(
            spec.display(),
            "nova-manage --config-file /etc/nova/nova.conf cell_v2 map_cell0"
        );
    }

    #[tokio::test]
    async fn test_embedded_creates_primary_schema() {
        let dir = TempDir::new().unwrap();
        let config = boot(dir.path());
        write_bundle(&config, "glance", "CREATE TABLE images (id TEXT);");

        let catalog = ServiceCatalog::new(&config);
        let glance = catalog.get("glance").unwrap();
        let env = Environment::default();
        let mut effective = EffectiveConfig::new();
        let databases = DatabaseResolver::new(&env, &config.state_dir)
            .apply(glance, &mut effective)
            .unwrap();

        let strategy = MigrationDispatcher::new(&config)
            .dispatch(glance, &databases, &effective)
            .await
            .unwrap();
        assert_eq!(strategy, DatabaseBackend::Embedded);

        let db = EmbeddedDatabase::open(&config.state_dir.join("glance.sqlite")).unwrap();
        assert_eq!(db.stamped_heads().unwrap(), vec!["head1".to_string()]);
    }

    #[tokio::test]
    async fn test_embedded_split_database_seeds_cells() {
        let dir = TempDir::new().unwrap();
        let config = boot(dir.path());
        write_bundle(&config, "nova", "CREATE TABLE instances (id INTEGER PRIMARY KEY);");
        write_bundle(&config, "nova_api", "CREATE TABLE flavors (id INTEGER PRIMARY KEY);");

        let catalog = ServiceCatalog::new(&config);
        let nova = catalog.get("nova").unwrap();
        let env = Environment::default();
        let mut effective = EffectiveConfig::new();
        let databases = DatabaseResolver::new(&env, &config.state_dir)
            .apply(nova, &mut effective)
            .unwrap();

        MigrationDispatcher::new(&config)
            .dispatch(nova, &databases, &effective)
            .await
            .unwrap();

        for name in ["nova", "nova_api", "nova_cell0"] {
            let db = EmbeddedDatabase::open(&config.state_dir.join(format!("{}.sqlite", name)))
                .unwrap();
            assert_eq!(db.stamped_heads().unwrap().len(), 1, "{} not stamped", name);
        }

        let mut api = EmbeddedDatabase::open(&config.state_dir.join("nova_api.sqlite")).unwrap();
        assert!(
            !api.seed_cell_mappings("a", "b", NULL_TRANSPORT).unwrap(),
            "cells should already be seeded"
        );
    }

    #[tokio::test]
    async fn test_missing_bundle_falls_back_to_native_tool() {
        let dir = TempDir::new().unwrap();
        let config = boot(dir.path());
        let log = dir.path().join("calls.log");
        fake_tool(&config, "cinder-manage", &log, 0);

        let catalog = ServiceCatalog::new(&config);
        let cinder = catalog.get("cinder").unwrap();
        let env = Environment::default();
        let mut effective = EffectiveConfig::new();
        let databases = DatabaseResolver::new(&env, &config.state_dir)
            .apply(cinder, &mut effective)
            .unwrap();

        let strategy = MigrationDispatcher::new(&config)
            .dispatch(cinder, &databases, &effective)
            .await
            .unwrap();
        assert_eq!(strategy, DatabaseBackend::Embedded);

        let calls = std::fs::read_to_string(&log).unwrap();
        let conf = cinder.config_path().unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            vec![format!("cinder-manage --config-file {} db sync", conf.display())]
        );
        assert!(!config.state_dir.join("cinder.sqlite").exists());
    }

    #[tokio::test]
    async fn test_embedded_auxiliary_with_external_primary() {
        let dir = TempDir::new().unwrap();
        let config = boot(dir.path());
        let log = dir.path().join("calls.log");
        fake_tool(&config, "nova-manage", &log, 0);
        write_bundle(&config, "nova_api", "CREATE TABLE flavors (id INTEGER PRIMARY KEY);");

        let catalog = ServiceCatalog::new(&config);
        let nova = catalog.get("nova").unwrap();
        let env = Environment::from_pairs([
            ("NOVA_DB_HOST", "db.example"),
            ("NOVA_DB_PASSWORD", "pw"),
            ("NOVA_API_DB_HOST", "localhost"),
        ]);
        let mut effective = EffectiveConfig::new();
        let databases = DatabaseResolver::new(&env, &config.state_dir)
            .apply(nova, &mut effective)
            .unwrap();
        assert!(
            effective
                .get("api_database", "connection")
                .unwrap()
                .starts_with("sqlite:///")
        );

        let strategy = MigrationDispatcher::new(&config)
            .dispatch(nova, &databases, &effective)
            .await
            .unwrap();
        assert_eq!(strategy, DatabaseBackend::External);

        let mut api = EmbeddedDatabase::open(&config.state_dir.join("nova_api.sqlite")).unwrap();
        assert_eq!(api.stamped_heads().unwrap(), vec!["head1".to_string()]);
        assert!(!api.seed_cell_mappings("a", "b", NULL_TRANSPORT).unwrap());
        assert!(!config.state_dir.join("nova_cell0.sqlite").exists());

        let calls = std::fs::read_to_string(&log).unwrap();
        let conf = nova.config_path().unwrap();
        assert_eq!(
            calls.lines().collect::<Vec<_>>(),
            vec![format!("nova-manage --config-file {} db sync", conf.display())]
        );
    }

    #[tokio::test]
    async fn test_external_runs_native_tools_in_order() {
        let dir = TempDir::new().unwrap();
        let config = boot(dir.path());
        let log = dir.path().join("calls.log");
        fake_tool(&config, "nova-manage", &log, 0);

        let catalog = ServiceCatalog::new(&config);
        let nova = catalog.get("nova").unwrap();
        let env = Environment::from_pairs([("NOVA_DB_HOST", "db.example")]);
        let mut effective = EffectiveConfig::new();
        let databases = DatabaseResolver::new(&env, &config.state_dir)
            .apply(nova, &mut effective)
            .unwrap();

        let strategy = MigrationDispatcher::new(&config)
            .dispatch(nova, &databases, &effective)
            .await
            .unwrap();
        assert_eq!(strategy, DatabaseBackend::External);

        let calls = std::fs::read_to_string(&log).unwrap();
        let conf = nova.config_path().unwrap();
        let expected: Vec<String> = [
            "api_db sync",
            "cell_v2 map_cell0",
            "cell_v2 create_cell --name=cell1 --verbose",
            "db sync",
        ]
        .iter()
        .map(|c| format!("nova-manage --config-file {} {}", conf.display(), c))
        .collect();
        assert_eq!(calls.lines().collect::<Vec<_>>(), expected);
    }

    #[tokio::test]
    async fn test_external_failure_still_runs_remaining_commands() {
        let dir = TempDir::new().unwrap();
        let config = boot(dir.path());
        let log = dir.path().join("calls.log");
        fake_tool(&config, "nova-manage", &log, 2);

        let catalog = ServiceCatalog::new(&config);
        let nova = catalog.get("nova").unwrap();
        let env = Environment::from_pairs([("NOVA_DB_HOST", "db.example")]);
        let mut effective = EffectiveConfig::new();
        let databases = DatabaseResolver::new(&env, &config.state_dir)
            .apply(nova, &mut effective)
            .unwrap();

        let err = MigrationDispatcher::new(&config)
            .dispatch(nova, &databases, &effective)
            .await
            .unwrap_err();
        assert!(matches!(err, StackError::Command { .. }));
        assert_eq!(std::fs::read_to_string(&log).unwrap().lines().count(), 4);
    }
}
