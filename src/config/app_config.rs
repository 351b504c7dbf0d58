use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::adapters::cert_stores::directory_store::StorePath;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::PaddingMode;

/// Smallest PBKDF2 iteration count accepted from a config file.
pub const MIN_KDF_ITERATIONS: u32 = 1_000;

/// Top-level scopeseal configuration read from `config.toml`.
///
/// Every section is optional. Directory settings left unset fall back to
/// locations under the `--home` directory when one is given, otherwise
/// to the platform data directories.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub keystore: KeystoreSection,
    pub certificates: CertificatesSection,
    pub protect: ProtectSection,
    pub log: LogSection,

    #[serde(skip)]
    home: Option<PathBuf>,
}

impl AppConfig {
    /// Load the configuration.
    ///
    /// `explicit` is a `--config` path and must exist. Without it the
    /// default location is tried, and a missing file means defaults.
    pub fn load(explicit: Option<&Path>, home: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) if !path.is_file() => {
                return Err(ScopeSealError::InvalidConfig {
                    detail: format!("config file {} not found", path.display()),
                });
            }
            Some(path) => Some(path.to_path_buf()),
            None => default_config_path(home).filter(|p| p.is_file()),
        };

        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path)?;
                let config: Self =
                    toml::from_str(&content).map_err(|e| ScopeSealError::InvalidConfig {
                        detail: format!("Failed to parse {}: {e}", path.display()),
                    })?;
                config
            }
            None => Self::default(),
        };
        config.home = home.map(Path::to_path_buf);
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.keystore.kdf_iterations < MIN_KDF_ITERATIONS {
            return Err(ScopeSealError::InvalidConfig {
                detail: format!(
                    "keystore.kdf_iterations must be at least {MIN_KDF_ITERATIONS}, got {}",
                    self.keystore.kdf_iterations
                ),
            });
        }
        if self.keystore.provider() == Provider::Dpapi && !cfg!(windows) {
            return Err(ScopeSealError::InvalidConfig {
                detail: "keystore.provider = \"dpapi\" is only available on Windows".into(),
            });
        }
        StorePath::parse(&self.certificates.default_store)?;
        Ok(())
    }

    /// Directory holding the current-user scope key.
    pub fn user_dir(&self) -> PathBuf {
        self.keystore
            .user_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("user"))
    }

    /// Directory holding the local-machine scope key.
    pub fn machine_dir(&self) -> PathBuf {
        if let Some(dir) = &self.keystore.machine_dir {
            return dir.clone();
        }
        match &self.home {
            Some(home) => home.join("machine"),
            None => default_machine_dir(),
        }
    }

    /// Directory holding enrolled user records.
    pub fn users_dir(&self) -> PathBuf {
        self.keystore
            .users_dir
            .clone()
            .unwrap_or_else(|| self.data_dir().join("users"))
    }

    /// Root of the certificate store.
    pub fn store_root(&self) -> PathBuf {
        self.certificates
            .store_root
            .clone()
            .unwrap_or_else(|| self.data_dir().join("certs"))
    }

    fn data_dir(&self) -> PathBuf {
        match &self.home {
            Some(home) => home.clone(),
            None => dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("scopeseal"),
        }
    }
}

/// Where `config.toml` is looked up when `--config` is not given.
pub fn default_config_path(home: Option<&Path>) -> Option<PathBuf> {
    match home {
        Some(home) => Some(home.join("config.toml")),
        None => dirs::config_dir().map(|d| d.join("scopeseal").join("config.toml")),
    }
}

fn default_machine_dir() -> PathBuf {
    if cfg!(windows) {
        std::env::var_os("ProgramData")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(r"C:\ProgramData"))
            .join("scopeseal")
    } else {
        PathBuf::from("/var/lib/scopeseal")
    }
}

/// Backend for scope and credential keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    File,
    Dpapi,
}

/// The `[keystore]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KeystoreSection {
    provider: Option<Provider>,
    pub user_dir: Option<PathBuf>,
    pub machine_dir: Option<PathBuf>,
    pub users_dir: Option<PathBuf>,
    pub kdf_iterations: u32,
}

impl KeystoreSection {
    /// Configured provider, or DPAPI on Windows and files elsewhere.
    pub fn provider(&self) -> Provider {
        self.provider.unwrap_or(if cfg!(windows) {
            Provider::Dpapi
        } else {
            Provider::File
        })
    }
}

impl Default for KeystoreSection {
    fn default() -> Self {
        Self {
            provider: None,
            user_dir: None,
            machine_dir: None,
            users_dir: None,
            kdf_iterations: crate::adapters::key_stores::credential_store::DEFAULT_KDF_ITERATIONS,
        }
    }
}

/// The `[certificates]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CertificatesSection {
    pub store_root: Option<PathBuf>,
    /// Store used by `certs import` and `certs list` without `--store`.
    pub default_store: String,
}

impl Default for CertificatesSection {
    fn default() -> Self {
        Self {
            store_root: None,
            default_store: r"CurrentUser\My".into(),
        }
    }
}

/// The `[protect]` section.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtectSection {
    pub padding: PaddingMode,
}

/// The `[log]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogSection {
    /// `tracing` filter used when neither `RUST_LOG` nor `-v`/`-q` is set.
    pub level: String,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: "warn".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_default_file_means_defaults() {
        let home = tempfile::tempdir().unwrap();
        let config = AppConfig::load(None, Some(home.path())).unwrap();
        assert_eq!(config.user_dir(), home.path().join("user"));
        assert_eq!(config.machine_dir(), home.path().join("machine"));
        assert_eq!(config.users_dir(), home.path().join("users"));
        assert_eq!(config.store_root(), home.path().join("certs"));
        assert_eq!(config.protect.padding, PaddingMode::Oaep);
        assert_eq!(config.log.level, "warn");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let err = AppConfig::load(Some(&home.path().join("nope.toml")), None).unwrap_err();
        assert!(matches!(err, ScopeSealError::InvalidConfig { .. }));
    }

    #[test]
    fn file_values_override_defaults() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            r#"
[keystore]
provider = "file"
machine_dir = "/srv/shared-keys"
kdf_iterations = 5000

[certificates]
default_store = "LocalMachine\\Root"

[protect]
padding = "pkcs1"

[log]
level = "debug"
"#,
        )
        .unwrap();

        let config = AppConfig::load(None, Some(home.path())).unwrap();
        assert_eq!(config.keystore.provider(), Provider::File);
        assert_eq!(config.machine_dir(), PathBuf::from("/srv/shared-keys"));
        assert_eq!(config.keystore.kdf_iterations, 5000);
        assert_eq!(config.certificates.default_store, r"LocalMachine\Root");
        assert_eq!(config.protect.padding, PaddingMode::Pkcs1);
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn rejects_unknown_keys_and_weak_kdf() {
        let home = tempfile::tempdir().unwrap();
        let path = home.path().join("config.toml");

        std::fs::write(&path, "[keystore]\nkdf_iterations = 10\n").unwrap();
        assert!(AppConfig::load(Some(&path), None).is_err());

        std::fs::write(&path, "[keystore]\nbogus = true\n").unwrap();
        assert!(AppConfig::load(Some(&path), None).is_err());
    }
}
