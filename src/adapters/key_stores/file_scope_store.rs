use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, info};
use zeroize::Zeroizing;

use crate::adapters::cipher::aes_key::AesKey;
use crate::adapters::create_file_atomic;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::Scope;
use crate::core::traits::cipher::ResolvedKey;
use crate::core::traits::key_store::ScopeKeyStore;

const SCOPE_KEY_LEN: usize = 32;

/// File-backed scope keys for platforms without DPAPI.
///
/// Each scope owns one random 256-bit AES key, stored Base64-encoded:
///
/// ```text
/// <user_dir>/current-user.key
/// <machine_dir>/local-machine.key
/// ```
///
/// Access control comes from the file system: the user key is created
/// owner-only, and the machine directory is expected to be shared by
/// the accounts that should read it.
#[derive(Debug, Clone)]
pub struct FileScopeKeyStore {
    user_dir: PathBuf,
    machine_dir: PathBuf,
}

impl FileScopeKeyStore {
    pub fn new(user_dir: PathBuf, machine_dir: PathBuf) -> Self {
        Self {
            user_dir,
            machine_dir,
        }
    }

    /// Location of the key file for a scope.
    pub fn key_path(&self, scope: Scope) -> PathBuf {
        let dir = match scope {
            Scope::CurrentUser => &self.user_dir,
            Scope::LocalMachine => &self.machine_dir,
        };
        dir.join(format!("{}.key", scope.key_name()))
    }

    /// Create the scope key, or adopt the one another process created first.
    fn create_key(path: &Path, scope: Scope) -> Result<Zeroizing<Vec<u8>>> {
        let bytes = AesKey::generate_bytes(SCOPE_KEY_LEN);
        let encoded = Zeroizing::new(STANDARD.encode(bytes.as_slice()));
        // Machine keys must stay readable by every account sharing the directory.
        match create_file_atomic(path, encoded.as_bytes(), scope == Scope::CurrentUser) {
            Ok(()) => {
                info!(%scope, path = %path.display(), "created scope key");
                Ok(bytes)
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                debug!(%scope, path = %path.display(), "scope key created concurrently");
                Self::read_key(path)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn read_key(path: &Path) -> Result<Zeroizing<Vec<u8>>> {
        let text = Zeroizing::new(std::fs::read_to_string(path)?);
        let bytes = STANDARD
            .decode(text.trim())
            .map_err(|e| ScopeSealError::InvalidKeyFile {
                path: path.to_path_buf(),
                detail: format!("scope key is not Base64: {e}"),
            })?;
        let bytes = Zeroizing::new(bytes);
        if bytes.len() != SCOPE_KEY_LEN {
            return Err(ScopeSealError::InvalidKeyFile {
                path: path.to_path_buf(),
                detail: format!("expected {SCOPE_KEY_LEN} bytes, got {}", bytes.len()),
            });
        }
        Ok(bytes)
    }
}

impl ScopeKeyStore for FileScopeKeyStore {
    fn scope_key(&self, scope: Scope, create: bool) -> Result<ResolvedKey> {
        let path = self.key_path(scope);
        let bytes = if path.is_file() {
            debug!(%scope, path = %path.display(), "loading scope key");
            Self::read_key(&path)?
        } else if create {
            Self::create_key(&path, scope)?
        } else {
            return Err(ScopeSealError::PathNotFound { path });
        };
        Ok(Box::new(AesKey::new(bytes, scope.to_string())?))
    }
}
