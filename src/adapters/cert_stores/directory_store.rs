use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::adapters::cert_stores::pem_loader::load_certificate_file;
use crate::adapters::write_file_atomic;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::certificate::{Certificate, normalize_thumbprint};
use crate::core::traits::cert_store::CertificateStore;

/// Certificate store location, mirroring the Windows system store split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreLocation {
    CurrentUser,
    LocalMachine,
}

impl StoreLocation {
    pub const ALL: [StoreLocation; 2] = [StoreLocation::CurrentUser, StoreLocation::LocalMachine];

    /// Parse "CurrentUser", "LocalMachine" or their short aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "currentuser" | "current_user" | "user" => Some(Self::CurrentUser),
            "localmachine" | "local_machine" | "machine" => Some(Self::LocalMachine),
            _ => None,
        }
    }
}

impl fmt::Display for StoreLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentUser => write!(f, "CurrentUser"),
            Self::LocalMachine => write!(f, "LocalMachine"),
        }
    }
}

/// A parsed `cert:\Location\Store[\Thumbprint]` path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePath {
    pub location: StoreLocation,
    pub store: String,
    pub thumbprint: Option<String>,
}

impl StorePath {
    /// Parse a store path. The `cert:` prefix is optional and either
    /// slash direction separates components.
    pub fn parse(path: &str) -> Result<Self> {
        let trimmed = path.trim();
        let rest = match trimmed.get(..5) {
            Some(prefix) if prefix.eq_ignore_ascii_case("cert:") => &trimmed[5..],
            _ => trimmed,
        };
        let parts: Vec<&str> = rest
            .split(['\\', '/'])
            .filter(|p| !p.is_empty())
            .collect();

        let invalid = || ScopeSealError::InvalidConfig {
            detail: format!(
                "Invalid certificate store path '{path}'. Expected cert:\\<CurrentUser|LocalMachine>\\<Store>[\\<Thumbprint>]"
            ),
        };

        let (location, store, thumbprint) = match parts.as_slice() {
            [location, store] => (*location, *store, None),
            [location, store, thumbprint] => (*location, *store, Some(normalize_thumbprint(thumbprint)?)),
            _ => return Err(invalid()),
        };
        if store.contains("..") {
            return Err(invalid());
        }

        Ok(Self {
            location: StoreLocation::parse(location).ok_or_else(invalid)?,
            store: store.to_string(),
            thumbprint,
        })
    }

    /// True when `path` looks like a store path rather than a file path.
    pub fn is_store_path(path: &str) -> bool {
        path.trim()
            .get(..5)
            .is_some_and(|p| p.eq_ignore_ascii_case("cert:"))
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cert:\\{}\\{}", self.location, self.store)?;
        if let Some(t) = &self.thumbprint {
            write!(f, "\\{t}")?;
        }
        Ok(())
    }
}

/// Certificate store kept on disk as `<root>/<Location>/<Store>/<THUMBPRINT>.pem`.
///
/// Each file holds the certificate followed by its private key, if any.
#[derive(Debug, Clone)]
pub struct DirectoryCertStore {
    root: PathBuf,
}

impl DirectoryCertStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory for a store, matching an existing store name case-insensitively.
    fn store_dir(&self, location: StoreLocation, store: &str) -> PathBuf {
        let location_dir = self.root.join(location.to_string());
        if let Ok(entries) = std::fs::read_dir(&location_dir) {
            for entry in entries.flatten() {
                if entry
                    .file_name()
                    .to_str()
                    .is_some_and(|n| n.eq_ignore_ascii_case(store))
                {
                    return entry.path();
                }
            }
        }
        location_dir.join(store)
    }

    /// Every existing store directory under the root.
    fn all_store_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        for location in StoreLocation::ALL {
            let Ok(entries) = std::fs::read_dir(self.root.join(location.to_string())) else {
                continue;
            };
            let mut found: Vec<PathBuf> = entries
                .flatten()
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            found.sort();
            dirs.extend(found);
        }
        dirs
    }
}

impl CertificateStore for DirectoryCertStore {
    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Certificate> {
        let thumbprint = normalize_thumbprint(thumbprint)?;
        let file_name = format!("{thumbprint}.pem");

        for dir in self.all_store_dirs() {
            let candidate = dir.join(&file_name);
            if candidate.is_file() {
                debug!(store = %dir.display(), %thumbprint, "certificate found");
                return load_certificate_file(&candidate);
            }
        }
        Err(ScopeSealError::CertificateNotFound { locator: thumbprint })
    }

    fn open_path(&self, store_path: &str) -> Result<Certificate> {
        let not_found = || ScopeSealError::CertificateNotFound {
            locator: store_path.to_string(),
        };
        // A locator that names no store or no valid thumbprint resolves to nothing.
        let parsed = StorePath::parse(store_path).map_err(|e| {
            debug!(%store_path, error = %e, "unresolvable store path");
            not_found()
        })?;
        let thumbprint = parsed.thumbprint.as_deref().ok_or_else(not_found)?;

        let file = self
            .store_dir(parsed.location, &parsed.store)
            .join(format!("{thumbprint}.pem"));
        if !file.is_file() {
            return Err(not_found());
        }
        load_certificate_file(&file)
    }

    fn import(&self, file: &Path, store: &str) -> Result<String> {
        let parsed = StorePath::parse(store)?;
        let cert = load_certificate_file(file)?;
        let dest = self
            .store_dir(parsed.location, &parsed.store)
            .join(format!("{}.pem", cert.thumbprint()));

        write_file_atomic(&dest, cert.to_pem_bundle()?.as_bytes(), cert.has_private_key())?;

        info!(
            thumbprint = cert.thumbprint(),
            store = %parsed,
            has_private_key = cert.has_private_key(),
            "certificate imported"
        );
        Ok(cert.thumbprint().to_string())
    }

    fn list(&self, store: &str) -> Result<Vec<Certificate>> {
        let parsed = StorePath::parse(store)?;
        let dir = self.store_dir(parsed.location, &parsed.store);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            return Ok(Vec::new());
        };

        let mut files: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|e| e == "pem"))
            .collect();
        files.sort();

        let mut certs = Vec::new();
        for file in files {
            match load_certificate_file(&file) {
                Ok(cert) => certs.push(cert),
                Err(e) => warn!(file = %file.display(), error = %e, "skipping unreadable certificate"),
            }
        }
        Ok(certs)
    }

    fn remove(&self, thumbprint: &str) -> Result<usize> {
        let thumbprint = normalize_thumbprint(thumbprint)?;
        let file_name = format!("{thumbprint}.pem");
        let mut removed = 0;
        for dir in self.all_store_dirs() {
            let candidate = dir.join(&file_name);
            match std::fs::remove_file(&candidate) {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        if removed == 0 {
            return Err(ScopeSealError::CertificateNotFound { locator: thumbprint });
        }
        info!(%thumbprint, removed, "certificate removed");
        Ok(removed)
    }
}
