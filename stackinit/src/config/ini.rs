//! Ini-style config files as consumed by the platform services.
//!
//! Follows the dialect the services' own config loader writes:
//! - `[section]` headers, `key = value` or `key: value` options
//! - full-line comments starting with `#` or `;`
//! - indented lines continue the previous value
//! - option names are case-insensitive and stored lower-cased
//!
//! Sections and options keep their insertion order so a rewritten file
//! stays diffable against its template.

use std::fmt::Write as _;
use std::path::Path;

use indexmap::IndexMap;
use stackinit_shared::errors::{StackError, StackResult};

pub type Section = IndexMap<String, String>;

/// Ordered section → option → value mapping for one service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveConfig {
    sections: IndexMap<String, Section>,
}

impl EffectiveConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and parse a config file.
    pub fn load(path: &Path) -> StackResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text).map_err(|e| match e {
            StackError::Config(msg) => {
                StackError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(text: &str) -> StackResult<Self> {
        let mut config = Self::new();
        let mut current: Option<String> = None;
        let mut last_key: Option<String> = None;

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let trimmed = raw.trim();

            if trimmed.is_empty() {
                last_key = None;
                continue;
            }
            if trimmed.starts_with('#') || trimmed.starts_with(';') {
                continue;
            }

            let indented = raw.starts_with(' ') || raw.starts_with('\t');
            if indented
                && let (Some(section), Some(key)) = (&current, &last_key)
            {
                if let Some(value) = config
                    .sections
                    .get_mut(section)
                    .and_then(|s| s.get_mut(key))
                {
                    value.push('\n');
                    value.push_str(trimmed);
                }
                continue;
            }

            if let Some(rest) = trimmed.strip_prefix('[') {
                let name = rest.strip_suffix(']').ok_or_else(|| {
                    StackError::Config(format!("line {}: unterminated section header", line_no))
                })?;
                let name = name.trim().to_string();
                config.sections.entry(name.clone()).or_default();
                current = Some(name);
                last_key = None;
                continue;
            }

            let section = current.as_ref().ok_or_else(|| {
                StackError::Config(format!("line {}: option outside of any section", line_no))
            })?;
            let split = trimmed.find(['=', ':']).ok_or_else(|| {
                StackError::Config(format!("line {}: expected `key = value`", line_no))
            })?;
            let key = trimmed[..split].trim().to_lowercase();
            let value = trimmed[split + 1..].trim().to_string();
            if key.is_empty() {
                return Err(StackError::Config(format!("line {}: empty option name", line_no)));
            }

            config
                .sections
                .entry(section.clone())
                .or_default()
                .insert(key.clone(), value);
            last_key = Some(key);
        }

        Ok(config)
    }

    /// Serialize in the services' dialect. Sections are separated by a blank line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, options) in &self.sections {
            let _ = writeln!(out, "[{}]", name);
            for (key, value) in options {
                let value = value.replace('\n', "\n\t");
                if value.is_empty() {
                    let _ = writeln!(out, "{} =", key);
                } else {
                    let _ = writeln!(out, "{} = {}", key, value);
                }
            }
            out.push('\n');
        }
        out
    }

    /// Overwrite `path` with the rendered config.
    pub fn save(&self, path: &Path) -> StackResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, self.render())?;
        Ok(())
    }

    /// Section names are matched case-insensitively so that `default`
    /// addresses an existing `[DEFAULT]`.
    fn section_key(&self, name: &str) -> Option<String> {
        if self.sections.contains_key(name) {
            return Some(name.to_string());
        }
        self.sections
            .keys()
            .find(|k| k.eq_ignore_ascii_case(name))
            .cloned()
    }

    pub fn has_section(&self, name: &str) -> bool {
        self.section_key(name).is_some()
    }

    pub fn section(&self, name: &str) -> Option<&Section> {
        self.section_key(name).and_then(|k| self.sections.get(&k))
    }

    /// Get a section, creating it (with the given spelling) if absent.
    pub fn section_mut(&mut self, name: &str) -> &mut Section {
        let key = self.section_key(name).unwrap_or_else(|| name.to_string());
        self.sections.entry(key).or_default()
    }

    pub fn get(&self, section: &str, option: &str) -> Option<&str> {
        self.section(section)?
            .get(&option.to_lowercase())
            .map(String::as_str)
    }

    /// Set `section.option`, overwriting any existing value.
    pub fn set(&mut self, section: &str, option: &str, value: impl Into<String>) {
        self.section_mut(section)
            .insert(option.to_lowercase(), value.into());
    }

    /// Set `section.option` only when absent. Returns whether a value was written.
    pub fn set_default(&mut self, section: &str, option: &str, value: impl Into<String>) -> bool {
        let entry = self.section_mut(section);
        let key = option.to_lowercase();
        if entry.contains_key(&key) {
            return false;
        }
        entry.insert(key, value.into());
        true
    }

    pub fn sections(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }
}
