use std::fmt;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::core::models::certificate::Certificate;

/// Where the key for a protect/unprotect call comes from.
///
/// Exactly one source is active per request; the resolver dispatches on it
/// so the protect and unprotect paths never care which one was picked.
#[derive(Debug, Clone)]
pub enum KeySourceRef {
    /// The calling user's protection key.
    CurrentUserScope,
    /// The machine-wide protection key.
    LocalMachineScope,
    /// The protection key of another user, unlocked with their secret.
    ImpersonatedCredential(Credential),
    /// A `cert:\Location\Store\Thumbprint` path or a PEM/DER file.
    CertificateByPath(String),
    /// A thumbprint searched across every certificate store.
    CertificateByThumbprint(String),
    /// An already loaded certificate.
    CertificateByObject(Box<Certificate>),
    /// A key file: PEM RSA key or raw AES key bytes.
    RawKeyFilePath(PathBuf),
}

impl fmt::Display for KeySourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CurrentUserScope => write!(f, "current-user scope"),
            Self::LocalMachineScope => write!(f, "local-machine scope"),
            Self::ImpersonatedCredential(c) => write!(f, "credential of '{}'", c.username()),
            Self::CertificateByPath(p) => write!(f, "certificate {p}"),
            Self::CertificateByThumbprint(t) => write!(f, "certificate thumbprint {t}"),
            Self::CertificateByObject(c) => write!(f, "certificate {}", c.thumbprint()),
            Self::RawKeyFilePath(p) => write!(f, "key file {}", p.display()),
        }
    }
}

/// Protection scope for the OS-furnished symmetric keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    CurrentUser,
    LocalMachine,
}

impl Scope {
    /// File stem used by file-backed key stores.
    pub fn key_name(self) -> &'static str {
        match self {
            Self::CurrentUser => "current-user",
            Self::LocalMachine => "local-machine",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_name())
    }
}

/// A user name and its secret. The secret is scrubbed on drop and never printed.
#[derive(Clone)]
pub struct Credential {
    username: String,
    secret: Zeroizing<String>,
}

impl Credential {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Zeroizing::new(secret.into()),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

/// RSA padding scheme. Not recorded in the ciphertext, so decryption must
/// be told the same mode that encryption used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaddingMode {
    /// RSA-OAEP with SHA-1.
    #[default]
    Oaep,
    /// RSAES-PKCS1-v1_5.
    Pkcs1,
}

impl PaddingMode {
    /// Bytes of a modulus consumed by the padding itself.
    pub fn overhead(self) -> usize {
        match self {
            // 2 * SHA-1 output + 2
            Self::Oaep => 2 * 20 + 2,
            Self::Pkcs1 => 11,
        }
    }
}

impl fmt::Display for PaddingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oaep => write!(f, "OAEP"),
            Self::Pkcs1 => write!(f, "PKCS#1 v1.5"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_debug_hides_secret() {
        let cred = Credential::new("svc_deploy", "hunter2");
        let debug = format!("{cred:?}");
        assert!(debug.contains("svc_deploy"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn oaep_costs_more_than_pkcs1() {
        assert_eq!(PaddingMode::Oaep.overhead(), 42);
        assert_eq!(PaddingMode::Pkcs1.overhead(), 11);
        assert_eq!(PaddingMode::default(), PaddingMode::Oaep);
    }
}
