//! Service descriptors.
//!
//! [`catalog::SERVICES`] holds the static table; [`ServiceCatalog`] resolves
//! it against a [`BootConfig`] so that every path is rooted correctly.

pub mod catalog;

use std::path::PathBuf;

use stackinit_shared::errors::{StackError, StackResult};

pub use catalog::{
    AuthBinding, AuxiliaryDatabase, DASHBOARD_SERVICE, DatabaseProfile, GatewayMount,
    IDENTITY_SERVICE, MigrationCommand, MigrationTarget, SERVICES, SeedDatabase, ServiceProfile,
    StaticSetting,
};

use crate::runtime::BootConfig;

/// One platform service, resolved against the boot root.
#[derive(Debug, Clone)]
pub struct ServiceDescriptor {
    pub name: &'static str,
    pub config_dir: PathBuf,
    /// Base template; `None` for services configured without an ini file.
    pub template: Option<PathBuf>,
    pub directories: Vec<PathBuf>,
    pub profile: &'static ServiceProfile,
}

impl ServiceDescriptor {
    pub fn resolve(profile: &'static ServiceProfile, config: &BootConfig) -> Self {
        Self {
            name: profile.name,
            config_dir: config.path(profile.config_dir),
            template: profile.template.map(|t| config.template_dir.join(t)),
            directories: profile.directories.iter().map(|d| config.path(d)).collect(),
            profile,
        }
    }

    /// Path of the effective config written by the merge stage.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.profile.template.map(|t| self.config_dir.join(t))
    }

    /// Effective config path, or an error for services without one.
    pub fn require_config_path(&self) -> StackResult<PathBuf> {
        self.config_path().ok_or_else(|| {
            StackError::InvalidState(format!("service {} has no config file", self.name))
        })
    }
}

/// All services in boot order.
#[derive(Debug, Clone)]
pub struct ServiceCatalog {
    services: Vec<ServiceDescriptor>,
}

impl ServiceCatalog {
    pub fn new(config: &BootConfig) -> Self {
        Self::from_profiles(SERVICES, config)
    }

    pub fn from_profiles(profiles: &'static [ServiceProfile], config: &BootConfig) -> Self {
        Self {
            services: profiles
                .iter()
                .map(|p| ServiceDescriptor::resolve(p, config))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.iter().find(|s| s.name == name)
    }

    pub fn require(&self, name: &str) -> StackResult<&ServiceDescriptor> {
        self.get(name)
            .ok_or_else(|| StackError::Config(format!("unknown service: {}", name)))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter()
    }

    /// Services that receive an identity principal, in boot order.
    pub fn principals(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.iter().filter(|s| s.profile.principal)
    }

    /// Services configured from an ini template other than the identity service.
    pub fn dependents(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services
            .iter()
            .filter(|s| s.name != IDENTITY_SERVICE && s.template.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::Environment;
    use crate::runtime::BootOptions;

    fn config() -> BootConfig {
        let options = BootOptions {
            root: PathBuf::from("/tmp/root"),
            ..Default::default()
        };
        BootConfig::new(options, &Environment::default()).unwrap()
    }

    #[test]
    fn test_descriptor_paths_are_rooted() {
        let catalog = ServiceCatalog::new(&config());
        let glance = catalog.get("glance").unwrap();
        assert_eq!(glance.config_dir, PathBuf::from("/tmp/root/etc/glance"));
        assert_eq!(
            glance.template,
            Some(PathBuf::from("/tmp/root/app/config/glance-api.conf"))
        );
        assert_eq!(
            glance.config_path(),
            Some(PathBuf::from("/tmp/root/etc/glance/glance-api.conf"))
        );
        assert!(
            glance
                .directories
                .contains(&PathBuf::from("/tmp/root/var/lib/glance/images"))
        );
    }

    #[test]
    fn test_principals_exclude_identity() {
        let catalog = ServiceCatalog::new(&config());
        let names: Vec<_> = catalog.principals().map(|s| s.name).collect();
        assert_eq!(
            names,
            vec!["glance", "cinder", "neutron", "ironic", "nova", "horizon"]
        );
    }

    #[test]
    fn test_dependents_have_templates() {
        let catalog = ServiceCatalog::new(&config());
        let names: Vec<_> = catalog.dependents().map(|s| s.name).collect();
        assert_eq!(names, vec!["glance", "cinder", "neutron", "ironic", "nova"]);
    }

    #[test]
    fn test_peer_bindings_reference_principals() {
        let catalog = ServiceCatalog::new(&config());
        for service in catalog.iter() {
            for binding in service.profile.auth_bindings {
                let peer = catalog.require(binding.principal).unwrap();
                assert!(peer.profile.principal, "{} is not a principal", peer.name);
            }
        }
    }

    #[test]
    fn test_dashboard_has_no_config_file() {
        let catalog = ServiceCatalog::new(&config());
        let horizon = catalog.get(DASHBOARD_SERVICE).unwrap();
        assert!(horizon.config_path().is_none());
        assert!(horizon.require_config_path().is_err());
        assert!(horizon.profile.database.is_none());
    }
}
