//! Config Merge Engine.
//!
//! Layers `<SERVICE>_<SECTION>_<OPTION>=value` environment overrides onto a
//! service's base template and writes the result into the service's config
//! directory under the template's own file name.

use std::path::{Path, PathBuf};

use stackinit_shared::errors::{StackError, StackResult};

use super::ini::EffectiveConfig;
use crate::env::Environment;

/// Result of merging one service's template.
#[derive(Debug)]
pub struct MergedConfig {
    /// Where the effective config was written.
    pub path: PathBuf,
    pub config: EffectiveConfig,
    /// Number of overrides applied from the environment.
    pub overrides: usize,
}

/// Split an override variable into `(section, option)`.
///
/// Returns `None` when `key` does not carry the service prefix or when the
/// remainder does not split into two non-empty parts on the first `_`.
pub fn parse_override(service: &str, key: &str) -> Option<(String, String)> {
    let prefix = format!("{}_", service.to_uppercase());
    if key.len() <= prefix.len() || !key.is_char_boundary(prefix.len()) {
        return None;
    }
    let (head, remainder) = key.split_at(prefix.len());
    if !head.eq_ignore_ascii_case(&prefix) {
        return None;
    }
    let (section, option) = remainder.split_once('_')?;
    if section.is_empty() || option.is_empty() {
        return None;
    }
    Some((section.to_lowercase(), option.to_lowercase()))
}

/// Apply every matching environment override to `config`.
pub fn apply_overrides(config: &mut EffectiveConfig, service: &str, env: &Environment) -> usize {
    let mut applied = 0;
    for (key, value) in env.iter() {
        let Some((section, option)) = parse_override(service, key) else {
            continue;
        };
        tracing::info!(
            service = %service,
            section = %section,
            option = %option,
            "Applying config override"
        );
        config.set(&section, &option, value);
        applied += 1;
    }
    applied
}

/// Merge `template` with the environment and persist it under `config_dir`.
///
/// # Errors
///
/// A missing or unparsable template is a [`StackError::Template`]; callers
/// treat it as fatal to the boot.
pub fn merge_config(
    template: &Path,
    service: &str,
    config_dir: &Path,
    env: &Environment,
) -> StackResult<MergedConfig> {
    tracing::info!(service = %service, template = %template.display(), "Merging configuration");

    let mut config = EffectiveConfig::load(template).map_err(|e| {
        StackError::Template(format!(
            "cannot load template {} for {}: {}",
            template.display(),
            service,
            e
        ))
    })?;

    let file_name = template.file_name().ok_or_else(|| {
        StackError::Template(format!("template path has no file name: {}", template.display()))
    })?;
    let path = config_dir.join(file_name);

    let overrides = apply_overrides(&mut config, service, env);
    config.save(&path)?;

    tracing::info!(
        service = %service,
        path = %path.display(),
        overrides,
        "Configuration written"
    );

    Ok(MergedConfig {
        path,
        config,
        overrides,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_override_splits_on_first_delimiter() {
        assert_eq!(
            parse_override("nova", "NOVA_API_DATABASE_CONNECTION"),
            Some(("api".to_string(), "database_connection".to_string()))
        );
        assert_eq!(
            parse_override("glance", "GLANCE_DEFAULT_DEBUG"),
            Some(("default".to_string(), "debug".to_string()))
        );
    }

    #[test]
    fn test_parse_override_ignores_missing_delimiter() {
        assert_eq!(parse_override("foo", "FOO_NODELIMITER"), None);
        assert_eq!(parse_override("foo", "FOO_SECTION_"), None);
        assert_eq!(parse_override("foo", "FOO__OPTION"), None);
        assert_eq!(parse_override("foo", "FOO_"), None);
    }

    #[test]
    fn test_parse_override_requires_prefix() {
        assert_eq!(parse_override("foo", "FOOBAR_A_B"), None);
        assert_eq!(parse_override("foo", "BAR_A_B"), None);
        assert_eq!(
            parse_override("foo", "foo_a_b"),
            Some(("a".to_string(), "b".to_string()))
        );
    }

    #[test]
    fn test_merge_overrides_template_values() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("cinder.conf");
        std::fs::write(&template, "[DEFAULT]\ndebug = False\n\n[database]\n").unwrap();
        let target = dir.path().join("etc");

        let env = Environment::from_pairs([
            ("CINDER_DEFAULT_DEBUG", "True"),
            ("CINDER_OSLO_CONCURRENCY_LOCK_PATH", "/var/lib/cinder/tmp"),
            ("CINDER_IGNORED", "x"),
            ("GLANCE_DEFAULT_DEBUG", "True"),
        ]);
        let merged = merge_config(&template, "cinder", &target, &env).unwrap();

        assert_eq!(merged.path, target.join("cinder.conf"));
        assert_eq!(merged.overrides, 2);
        assert_eq!(merged.config.get("DEFAULT", "debug"), Some("True"));
        assert_eq!(
            merged.config.get("oslo", "concurrency_lock_path"),
            Some("/var/lib/cinder/tmp")
        );

        let on_disk = EffectiveConfig::load(&merged.path).unwrap();
        assert_eq!(on_disk, merged.config);
    }

    #[test]
    fn test_merge_overwrites_previous_output() {
        let dir = TempDir::new().unwrap();
        let template = dir.path().join("a.conf");
        std::fs::write(&template, "[a]\nx = 1\n").unwrap();
        let target = dir.path().join("out");
        std::fs::create_dir_all(&target).unwrap();
        std::fs::write(target.join("a.conf"), "[stale]\nold = yes\n").unwrap();

        merge_config(&template, "a", &target, &Environment::default()).unwrap();
        let on_disk = EffectiveConfig::load(&target.join("a.conf")).unwrap();
        assert!(!on_disk.has_section("stale"));
        assert_eq!(on_disk.get("a", "x"), Some("1"));
    }

    #[test]
    fn test_missing_template_is_template_error() {
        let dir = TempDir::new().unwrap();
        let err = merge_config(
            &dir.path().join("missing.conf"),
            "glance",
            dir.path(),
            &Environment::default(),
        )
        .unwrap_err();
        assert!(matches!(err, StackError::Template(_)));
    }
}
