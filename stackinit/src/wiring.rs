//! Service credential wiring.
//!
//! Each auth section of a service config authenticates either with the
//! persisted application credential of its principal or, when no record
//! exists, with password fields derived from the principal's name.

use crate::config::EffectiveConfig;
use crate::env::Environment;
use crate::identity::{ApplicationCredential, CredentialStore};
use crate::runtime::constants::{identity, service_vars};
use crate::services::{AuthBinding, ServiceDescriptor};

pub const APP_CREDENTIAL_AUTH_TYPE: &str = "v3applicationcredential";
pub const PASSWORD_AUTH_TYPE: &str = "password";

const PASSWORD_OPTIONS: [&str; 5] = [
    "username",
    "password",
    "project_name",
    "user_domain_name",
    "project_domain_name",
];
const CREDENTIAL_OPTIONS: [&str; 2] = [
    "application_credential_id",
    "application_credential_secret",
];

fn remove_options(config: &mut EffectiveConfig, section: &str, options: &[&str]) {
    let entries = config.section_mut(section);
    for option in options {
        entries.shift_remove(*option);
    }
}

/// How one section was wired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMode {
    ApplicationCredential { id: String },
    Password,
}

/// Wire one section with `credential`, or with password fields when `None`.
pub fn wire_section(
    config: &mut EffectiveConfig,
    section: &str,
    principal: &str,
    credential: Option<&ApplicationCredential>,
    identity_url: &str,
    env: &Environment,
) -> AuthMode {
    config.set(section, "auth_url", identity_url);

    let Some(credential) = credential else {
        let password = env
            .service_var(principal, service_vars::SERVICE_PASSWORD)
            .unwrap_or(principal);
        config.set(section, "auth_type", PASSWORD_AUTH_TYPE);
        config.set(section, "project_name", identity::SERVICE_PROJECT);
        config.set(section, "username", principal);
        config.set(section, "password", password);
        config.set(section, "user_domain_name", identity::DEFAULT_DOMAIN_NAME);
        config.set(section, "project_domain_name", identity::DEFAULT_DOMAIN_NAME);
        remove_options(config, section, &CREDENTIAL_OPTIONS);
        return AuthMode::Password;
    };

    config.set(section, "auth_type", APP_CREDENTIAL_AUTH_TYPE);
    config.set(section, "application_credential_id", &credential.id);
    config.set(section, "application_credential_secret", &credential.secret);
    remove_options(config, section, &PASSWORD_OPTIONS);
    AuthMode::ApplicationCredential {
        id: credential.id.clone(),
    }
}

/// Wire every auth binding of `service`.
pub fn wire_service(
    config: &mut EffectiveConfig,
    service: &ServiceDescriptor,
    store: &CredentialStore,
    identity_url: &str,
    env: &Environment,
) -> Vec<(AuthBinding, AuthMode)> {
    service
        .profile
        .auth_bindings
        .iter()
        .map(|binding| {
            let credential = match store.load(binding.principal) {
                Ok(credential) => credential,
                Err(e) => {
                    tracing::warn!(
                        service = %service.name,
                        principal = %binding.principal,
                        error = %e,
                        "Ignoring unreadable credential record"
                    );
                    None
                }
            };
            let mode = wire_section(
                config,
                binding.section,
                binding.principal,
                credential.as_ref(),
                identity_url,
                env,
            );
            match &mode {
                AuthMode::ApplicationCredential { id } => tracing::info!(
                    service = %service.name,
                    section = %binding.section,
                    credential = %id,
                    strategy = "application-credential",
                    "Using application credential"
                ),
                AuthMode::Password => tracing::info!(
                    service = %service.name,
                    section = %binding.section,
                    principal = %binding.principal,
                    strategy = "password",
                    "Using password fallback"
                ),
            }
            (*binding, mode)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::{BootConfig, BootOptions};
    use crate::services::ServiceCatalog;
    use tempfile::TempDir;

    const URL: &str = "http://localhost/identity/v3";

    fn credential() -> ApplicationCredential {
        ApplicationCredential {
            id: "cred-id".into(),
            name: "glance-0011aabb".into(),
            secret: "cred-secret".into(),
        }
    }

    #[test]
    fn test_credential_wiring() {
        let mut config = EffectiveConfig::new();
        let mode = wire_section(
            &mut config,
            "keystone_authtoken",
            "glance",
            Some(&credential()),
            URL,
            &Environment::default(),
        );

        assert_eq!(
            mode,
            AuthMode::ApplicationCredential {
                id: "cred-id".into()
            }
        );
        assert_eq!(
            config.get("keystone_authtoken", "auth_type"),
            Some("v3applicationcredential")
        );
        assert_eq!(
            config.get("keystone_authtoken", "application_credential_id"),
            Some("cred-id")
        );
        assert_eq!(
            config.get("keystone_authtoken", "application_credential_secret"),
            Some("cred-secret")
        );
        assert_eq!(config.get("keystone_authtoken", "password"), None);
    }

    #[test]
    fn test_credential_replaces_template_password_fields() {
        let mut config =
            EffectiveConfig::parse("[keystone_authtoken]\nusername = glance\npassword = x\n")
                .unwrap();
        wire_section(
            &mut config,
            "keystone_authtoken",
            "glance",
            Some(&credential()),
            URL,
            &Environment::default(),
        );
        assert_eq!(config.get("keystone_authtoken", "username"), None);
        assert_eq!(config.get("keystone_authtoken", "password"), None);
    }

    #[test]
    fn test_password_fallback_defaults() {
        let mut config = EffectiveConfig::new();
        let mode = wire_section(
            &mut config,
            "keystone_authtoken",
            "cinder",
            None,
            URL,
            &Environment::default(),
        );

        assert_eq!(mode, AuthMode::Password);
        assert_eq!(config.get("keystone_authtoken", "auth_type"), Some("password"));
        assert_eq!(config.get("keystone_authtoken", "username"), Some("cinder"));
        assert_eq!(config.get("keystone_authtoken", "password"), Some("cinder"));
        assert_eq!(config.get("keystone_authtoken", "project_name"), Some("service"));
        assert_eq!(
            config.get("keystone_authtoken", "user_domain_name"),
            Some("Default")
        );
        assert_eq!(config.get("keystone_authtoken", "auth_url"), Some(URL));
        assert_eq!(
            config.get("keystone_authtoken", "application_credential_id"),
            None
        );
    }

    #[test]
    fn test_password_override() {
        let mut config = EffectiveConfig::new();
        let env = Environment::from_pairs([("CINDER_SERVICE_PASSWORD", "volume-pass")]);
        wire_section(&mut config, "keystone_authtoken", "cinder", None, URL, &env);
        assert_eq!(
            config.get("keystone_authtoken", "password"),
            Some("volume-pass")
        );
    }

    #[test]
    fn test_compute_wires_peer_sections() {
        let dir = TempDir::new().unwrap();
        let options = BootOptions {
            root: dir.path().to_path_buf(),
            ..Default::default()
        };
        let boot = BootConfig::new(options, &Environment::default()).unwrap();
        let store = CredentialStore::new(&boot.credential_dir);
        let ironic = ApplicationCredential {
            id: "ironic-cred".into(),
            name: "ironic-1".into(),
            secret: "bm".into(),
        };
        store.save("ironic", &ironic).unwrap();

        let catalog = ServiceCatalog::new(&boot);
        let nova = catalog.get("nova").unwrap();
        let mut config = EffectiveConfig::new();
        let modes = wire_service(&mut config, nova, &store, URL, &Environment::default());

        let by_section: Vec<_> = modes.iter().map(|(b, m)| (b.section, m.clone())).collect();
        assert_eq!(
            by_section,
            vec![
                ("keystone_authtoken", AuthMode::Password),
                (
                    "ironic",
                    AuthMode::ApplicationCredential {
                        id: "ironic-cred".into()
                    }
                ),
                ("neutron", AuthMode::Password),
            ]
        );
        assert_eq!(config.get("ironic", "application_credential_secret"), Some("bm"));
        assert_eq!(config.get("neutron", "username"), Some("neutron"));
        assert_eq!(config.get("keystone_authtoken", "username"), Some("nova"));
    }
}
