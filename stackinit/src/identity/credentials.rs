//! Durable application credential store.
//!
//! One JSON record `{id, name, secret}` per service, named
//! `<service>_app_cred.json`. A record, once written, is the authority for
//! that service's authentication wiring.

use std::io::Write;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use stackinit_shared::errors::{StackError, StackResult};
use tempfile::NamedTempFile;

use super::client::IssuedCredential;
use crate::util::set_mode;

const RECORD_SUFFIX: &str = "_app_cred.json";

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationCredential {
    pub id: String,
    pub name: String,
    pub secret: String,
}

impl std::fmt::Debug for ApplicationCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApplicationCredential")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("secret", &"***")
            .finish()
    }
}

impl From<IssuedCredential> for ApplicationCredential {
    fn from(issued: IssuedCredential) -> Self {
        Self {
            id: issued.id,
            name: issued.name,
            secret: issued.secret,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, service: &str) -> PathBuf {
        self.dir.join(format!("{}{}", service, RECORD_SUFFIX))
    }

    pub fn exists(&self, service: &str) -> bool {
        self.path(service).is_file()
    }

    /// Read the record of `service`; `Ok(None)` when there is none.
    pub fn load(&self, service: &str) -> StackResult<Option<ApplicationCredential>> {
        let path = self.path(service);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map(Some).map_err(|e| {
            StackError::Storage(format!("corrupt credential record {}: {}", path.display(), e))
        })
    }

    /// Atomically write the record of `service` with owner-only permissions.
    pub fn save(&self, service: &str, credential: &ApplicationCredential) -> StackResult<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        set_mode(&self.dir, 0o700)?;

        let path = self.path(service);
        let mut file = NamedTempFile::new_in(&self.dir)?;
        set_mode(file.path(), 0o600)?;
        serde_json::to_writer_pretty(&mut file, credential)?;
        file.write_all(b"\n")?;
        file.as_file().sync_all()?;
        file.persist(&path)
            .map_err(|e| StackError::Storage(format!("cannot persist {}: {}", path.display(), e)))?;

        tracing::info!(
            service = %service,
            credential = %credential.id,
            path = %path.display(),
            "Persisted application credential"
        );
        Ok(path)
    }
}
