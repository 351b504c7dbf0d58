use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use rand::RngCore;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::adapters::cipher::aes_key::AesKey;
use crate::adapters::create_file_atomic;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::Credential;
use crate::core::traits::cipher::ResolvedKey;
use crate::core::traits::key_store::CredentialKeyResolver;

/// PBKDF2-HMAC-SHA256 rounds used for new enrollments.
pub const DEFAULT_KDF_ITERATIONS: u32 = 210_000;

const USER_KEY_LEN: usize = 32;
const SALT_LEN: usize = 16;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._@\\-]{1,64}$").expect("valid username regex"));

/// On-disk enrollment record. The user key is only stored wrapped.
#[derive(Debug, Serialize, Deserialize)]
struct UserRecord {
    username: String,
    salt: String,
    iterations: u32,
    nonce: String,
    wrapped_key: String,
    enrolled_at: DateTime<Utc>,
}

/// An enrolled user, as reported by [`CredentialKeyStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrolledUser {
    pub username: String,
    pub enrolled_at: DateTime<Utc>,
}

/// Local stand-in for "run as another user" on platforms without
/// impersonation.
///
/// Every enrolled user owns a random 256-bit key, wrapped under a key
/// derived from their secret. Resolving a credential opens a
/// [`UserSession`], unwraps the user key inside it, and closes the
/// session before the key is handed back.
#[derive(Debug, Clone)]
pub struct CredentialKeyStore {
    root: PathBuf,
    iterations: u32,
}

impl CredentialKeyStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            iterations: DEFAULT_KDF_ITERATIONS,
        }
    }

    /// Override the KDF cost for new enrollments.
    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations.max(1);
        self
    }

    fn record_path(&self, username: &str) -> Result<PathBuf> {
        validate_username(username)?;
        // Backslashes from DOMAIN\user forms cannot appear in file names.
        let file_stem = username.replace('\\', "+");
        Ok(self.root.join(format!("{file_stem}.json")))
    }

    /// Enroll a user with a fresh key.
    pub fn enroll(&self, credential: &Credential) -> Result<()> {
        let path = self.record_path(credential.username())?;
        if path.exists() {
            return Err(ScopeSealError::UserAlreadyEnrolled {
                username: credential.username().to_string(),
            });
        }

        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let kek = derive_kek(credential.secret(), &salt, self.iterations);
        let user_key = AesKey::generate_bytes(USER_KEY_LEN);

        let cipher = Aes256Gcm::new_from_slice(kek.as_slice()).map_err(|e| {
            ScopeSealError::EncryptionFailed {
                reason: format!("cipher init failed: {e}"),
            }
        })?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let wrapped = cipher
            .encrypt(&nonce, user_key.as_slice())
            .map_err(|e| ScopeSealError::EncryptionFailed {
                reason: format!("wrapping user key failed: {e}"),
            })?;

        let record = UserRecord {
            username: credential.username().to_string(),
            salt: STANDARD.encode(salt),
            iterations: self.iterations,
            nonce: STANDARD.encode(nonce.as_slice()),
            wrapped_key: STANDARD.encode(wrapped),
            enrolled_at: Utc::now(),
        };
        let json = serde_json::to_vec_pretty(&record).map_err(|e| ScopeSealError::EncryptionFailed {
            reason: format!("serializing user record failed: {e}"),
        })?;
        create_file_atomic(&path, &json, true).map_err(|e| match e.kind() {
            std::io::ErrorKind::AlreadyExists => ScopeSealError::UserAlreadyEnrolled {
                username: credential.username().to_string(),
            },
            _ => e.into(),
        })?;

        info!(username = credential.username(), "user enrolled");
        Ok(())
    }

    /// Remove an enrolled user. Their protected strings become unrecoverable.
    pub fn remove(&self, username: &str) -> Result<()> {
        let path = self.record_path(username)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                info!(username, "user removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ScopeSealError::LogonFailed {
                username: username.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// All enrolled users, sorted by name.
    pub fn list(&self) -> Result<Vec<EnrolledUser>> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Ok(Vec::new());
        };
        let mut users = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match read_record(&path) {
                Ok(record) => users.push(EnrolledUser {
                    username: record.username,
                    enrolled_at: record.enrolled_at,
                }),
                Err(e) => warn!(file = %path.display(), error = %e, "skipping unreadable user record"),
            }
        }
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    /// Open a session for the credential. Unknown users and bad secrets
    /// fail the same way.
    fn logon(&self, credential: &Credential) -> Result<UserSession> {
        let logon_failed = || ScopeSealError::LogonFailed {
            username: credential.username().to_string(),
        };
        let path = self.record_path(credential.username())?;
        if !path.is_file() {
            return Err(logon_failed());
        }
        let record = read_record(&path)?;

        let salt = decode_field(&path, "salt", &record.salt)?;
        let nonce = decode_field(&path, "nonce", &record.nonce)?;
        let wrapped = decode_field(&path, "wrapped_key", &record.wrapped_key)?;
        if nonce.len() != 12 {
            return Err(ScopeSealError::InvalidKeyFile {
                path,
                detail: "nonce must be 12 bytes".into(),
            });
        }

        let kek = derive_kek(credential.secret(), &salt, record.iterations);
        let cipher = Aes256Gcm::new_from_slice(kek.as_slice()).map_err(|_| logon_failed())?;
        let user_key = cipher
            .decrypt(Nonce::from_slice(&nonce), wrapped.as_slice())
            .map_err(|_| logon_failed())?;

        debug!(username = credential.username(), "user session opened");
        Ok(UserSession {
            username: credential.username().to_string(),
            user_key: Zeroizing::new(user_key),
        })
    }
}

impl CredentialKeyResolver for CredentialKeyStore {
    fn resolve_key_for_user(&self, credential: &Credential) -> Result<ResolvedKey> {
        let session = self.logon(credential)?;
        let key = session.user_key()?;
        // `session` drops here and scrubs its copy on every path.
        Ok(Box::new(key))
    }
}

/// A logged-on user. Holds the unwrapped user key until dropped.
struct UserSession {
    username: String,
    user_key: Zeroizing<Vec<u8>>,
}

impl UserSession {
    fn user_key(&self) -> Result<AesKey> {
        AesKey::new(self.user_key.clone(), format!("user {}", self.username))
    }
}

impl Drop for UserSession {
    fn drop(&mut self) {
        debug!(username = %self.username, "user session closed");
    }
}

fn validate_username(username: &str) -> Result<()> {
    if USERNAME_RE.is_match(username) && !username.contains("..") {
        Ok(())
    } else {
        Err(ScopeSealError::InvalidConfig {
            detail: format!(
                "Invalid user name '{username}'. Use letters, digits, '.', '_', '-', '@' or DOMAIN\\user (max 64 characters)."
            ),
        })
    }
}

fn derive_kek(secret: &str, salt: &[u8], iterations: u32) -> Zeroizing<[u8; 32]> {
    let mut kek = Zeroizing::new([0u8; 32]);
    pbkdf2::pbkdf2_hmac::<Sha256>(secret.as_bytes(), salt, iterations, &mut kek[..]);
    kek
}

fn read_record(path: &Path) -> Result<UserRecord> {
    let bytes = std::fs::read(path)?;
    serde_json::from_slice(&bytes).map_err(|e| ScopeSealError::InvalidKeyFile {
        path: path.to_path_buf(),
        detail: format!("unreadable user record: {e}"),
    })
}

fn decode_field(path: &Path, field: &str, value: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(value)
        .map_err(|e| ScopeSealError::InvalidKeyFile {
            path: path.to_path_buf(),
            detail: format!("field '{field}' is not Base64: {e}"),
        })
}
