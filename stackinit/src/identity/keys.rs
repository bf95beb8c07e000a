//! Identity key repositories (token encryption and credential encryption).

use std::fs::OpenOptions;
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE;
use stackinit_shared::errors::StackResult;

use crate::database::native_command;
use crate::util::{run_command, set_mode};

/// Owner passed to the key setup tool.
const KEY_OWNER: &str = "root";

/// First (primary) key of a fresh repository.
const PRIMARY_KEY: &str = "0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRepository {
    Fernet,
    Credential,
}

impl KeyRepository {
    pub const ALL: [KeyRepository; 2] = [KeyRepository::Fernet, KeyRepository::Credential];

    pub fn dir_name(self) -> &'static str {
        match self {
            KeyRepository::Fernet => "fernet-keys",
            KeyRepository::Credential => "credential-keys",
        }
    }

    fn setup_command(self) -> &'static str {
        match self {
            KeyRepository::Fernet => "fernet_setup",
            KeyRepository::Credential => "credential_setup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
    Existing,
    SetupTool,
    Generated,
}

/// Ensure `repository` under `identity_config_dir` holds a primary key and
/// that every key file is owner-only.
pub async fn ensure_key_repository(
    repository: KeyRepository,
    identity_config_dir: &Path,
    identity_config: &Path,
    venv_dir: &Path,
) -> StackResult<KeySource> {
    let dir = identity_config_dir.join(repository.dir_name());
    std::fs::create_dir_all(&dir)?;

    let source = if dir.join(PRIMARY_KEY).is_file() {
        tracing::debug!(repository = ?repository, "Key repository already initialised");
        KeySource::Existing
    } else {
        let argv = [
            "keystone-manage",
            repository.setup_command(),
            "--keystone-user",
            KEY_OWNER,
            "--keystone-group",
            KEY_OWNER,
        ];
        let tool = match native_command(venv_dir, &argv, identity_config) {
            Some(spec) => run_command(&spec).await.map(|_| ()),
            None => Ok(()),
        };
        match tool {
            Ok(()) if dir.join(PRIMARY_KEY).is_file() => KeySource::SetupTool,
            result => {
                if let Err(e) = result {
                    tracing::warn!(
                        repository = ?repository,
                        error = %e,
                        "Key setup tool failed, generating key in process"
                    );
                }
                write_key(&dir.join(PRIMARY_KEY))?;
                KeySource::Generated
            }
        }
    };

    let secured = restrict_keys(&dir)?;
    tracing::info!(
        repository = ?repository,
        source = ?source,
        files = secured,
        "Key repository ready"
    );
    Ok(source)
}

/// 32 random bytes, url-safe base64, the format the token provider reads.
pub fn generate_key() -> String {
    let bytes: [u8; 32] = rand::random();
    URL_SAFE.encode(bytes)
}

/// Create the key file owner-only before any key material is written.
fn write_key(path: &Path) -> StackResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    set_mode(path, 0o600)?;
    file.write_all(generate_key().as_bytes())?;
    Ok(())
}

/// Set every file in `dir` to 0600 and the directory to 0700.
fn restrict_keys(dir: &Path) -> StackResult<usize> {
    set_mode(dir, 0o700)?;
    let mut files: Vec<PathBuf> = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.push(entry.path());
        }
    }
    for file in &files {
        set_mode(file, 0o600)?;
    }
    Ok(files.len())
}
