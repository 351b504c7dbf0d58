use std::path::Path;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rsa::RsaPublicKey;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use tracing::debug;
use zeroize::Zeroizing;

use crate::adapters::cert_stores::directory_store::StorePath;
use crate::adapters::cert_stores::pem_loader::{
    load_certificate_file, parse_pem_blocks, private_key_from_block,
};
use crate::adapters::cipher::aes_key::{AesKey, VALID_KEY_LENGTHS};
use crate::adapters::cipher::rsa_key::RsaKey;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::certificate::Certificate;
use crate::core::models::key_source::{KeySourceRef, Scope};
use crate::core::models::protection_request::Mode;
use crate::core::traits::cert_store::CertificateStore;
use crate::core::traits::cipher::ResolvedKey;
use crate::core::traits::key_store::{CredentialKeyResolver, ScopeKeyStore};

/// Turns a [`KeySourceRef`] into a usable key.
///
/// Every call resolves afresh; nothing is cached between requests.
pub struct KeyResolver {
    scopes: Box<dyn ScopeKeyStore>,
    credentials: Box<dyn CredentialKeyResolver>,
    certificates: Box<dyn CertificateStore>,
}

impl KeyResolver {
    pub fn new(
        scopes: Box<dyn ScopeKeyStore>,
        credentials: Box<dyn CredentialKeyResolver>,
        certificates: Box<dyn CertificateStore>,
    ) -> Self {
        Self {
            scopes,
            credentials,
            certificates,
        }
    }

    /// Resolve the key for `source`. Scope keys are only created when
    /// encrypting; decrypting with a missing one is an error.
    pub fn resolve(&self, source: &KeySourceRef, mode: Mode) -> Result<ResolvedKey> {
        debug!(%source, ?mode, "resolving key");
        let key = match source {
            KeySourceRef::CurrentUserScope => {
                self.scopes.scope_key(Scope::CurrentUser, mode == Mode::Encrypt)?
            }
            KeySourceRef::LocalMachineScope => {
                self.scopes.scope_key(Scope::LocalMachine, mode == Mode::Encrypt)?
            }
            KeySourceRef::ImpersonatedCredential(credential) => {
                self.credentials.resolve_key_for_user(credential)?
            }
            KeySourceRef::CertificateByPath(path) => {
                let cert = if StorePath::is_store_path(path) {
                    self.certificates.open_path(path)?
                } else {
                    load_certificate_file(Path::new(path))?
                };
                certificate_key(&cert)?
            }
            KeySourceRef::CertificateByThumbprint(thumbprint) => {
                certificate_key(&self.certificates.find_by_thumbprint(thumbprint)?)?
            }
            KeySourceRef::CertificateByObject(cert) => certificate_key(cert)?,
            KeySourceRef::RawKeyFilePath(path) => load_key_file(path)?,
        };
        debug!(key = %key.name(), "key resolved");
        Ok(key)
    }
}

fn certificate_key(cert: &Certificate) -> Result<ResolvedKey> {
    debug!(
        thumbprint = cert.thumbprint(),
        algorithm = %cert.public_key_algorithm(),
        "using certificate"
    );
    Ok(Box::new(RsaKey::from_certificate(cert)?))
}

/// Load a key file: a PEM RSA key, or 128/192/256-bit AES key bytes
/// stored raw or as Base64.
pub fn load_key_file(path: &Path) -> Result<ResolvedKey> {
    if !path.is_file() {
        return Err(ScopeSealError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    let bytes = Zeroizing::new(std::fs::read(path)?);
    let label = path.display().to_string();
    let invalid = |detail: String| ScopeSealError::InvalidKeyFile {
        path: path.to_path_buf(),
        detail,
    };

    if let Ok(text) = std::str::from_utf8(&bytes) {
        if text.contains("-----BEGIN ") {
            return load_pem_key(text, &label).map_err(|e| match e {
                ScopeSealError::InvalidCertificate { detail, .. } => invalid(detail),
                other => other,
            });
        }
    }

    // Base64 first: a Base64 text of a 128-bit key is itself 24 bytes long.
    let decoded = std::str::from_utf8(&bytes)
        .ok()
        .and_then(|text| STANDARD.decode(text.trim()).ok())
        .map(Zeroizing::new);
    if let Some(key) = decoded.filter(|k| VALID_KEY_LENGTHS.contains(&k.len())) {
        debug!(path = %label, bits = key.len() * 8, "Base64 AES key file");
        return Ok(Box::new(AesKey::new(key, label)?));
    }

    if VALID_KEY_LENGTHS.contains(&bytes.len()) {
        debug!(path = %label, bits = bytes.len() * 8, "raw AES key file");
        return Ok(Box::new(AesKey::new(bytes, label)?));
    }

    Err(invalid(format!(
        "{} bytes that are neither PEM, a raw key nor a Base64 key of 16, 24 or 32 bytes",
        bytes.len()
    )))
}

fn load_pem_key(text: &str, label: &str) -> Result<ResolvedKey> {
    let blocks = parse_pem_blocks(text, label)?;

    if let Some(private) = blocks.iter().find_map(private_key_from_block) {
        debug!(path = label, "PEM private key file");
        return Ok(Box::new(RsaKey::from_key_material(&private, label)?));
    }

    for block in &blocks {
        let public = match block.label.as_str() {
            "PUBLIC KEY" => RsaPublicKey::from_public_key_der(&block.der).map_err(|e| e.to_string()),
            "RSA PUBLIC KEY" => RsaPublicKey::from_pkcs1_der(&block.der).map_err(|e| e.to_string()),
            _ => continue,
        };
        let public = public.map_err(|detail| ScopeSealError::InvalidCertificate {
            source_name: label.to_string(),
            detail: format!("unreadable RSA public key: {detail}"),
        })?;
        debug!(path = label, "PEM public key file");
        return Ok(Box::new(RsaKey::from_public(public, label)));
    }

    Err(ScopeSealError::InvalidCertificate {
        source_name: label.to_string(),
        detail: "no PUBLIC KEY, PRIVATE KEY or RSA PRIVATE KEY block".into(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::adapters::cert_stores::directory_store::DirectoryCertStore;
    use crate::adapters::key_stores::credential_store::CredentialKeyStore;
    use crate::adapters::key_stores::file_scope_store::FileScopeKeyStore;
    use crate::core::models::key_source::PaddingMode;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    fn resolver(dir: &Path) -> KeyResolver {
        KeyResolver::new(
            Box::new(FileScopeKeyStore::new(dir.join("user"), dir.join("machine"))),
            Box::new(CredentialKeyStore::new(dir.join("users")).with_iterations(1_000)),
            Box::new(DirectoryCertStore::new(dir.join("certs"))),
        )
    }

    #[test]
    fn scope_key_is_not_created_for_decrypt() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(dir.path())
            .resolve(&KeySourceRef::CurrentUserScope, Mode::Decrypt)
            .err()
            .unwrap();
        assert!(matches!(err, ScopeSealError::PathNotFound { .. }));
    }

    #[test]
    fn certificate_file_path_resolves_to_rsa() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture("rsa4096.crt.pem").display().to_string();
        let key = resolver(dir.path())
            .resolve(&KeySourceRef::CertificateByPath(path), Mode::Encrypt)
            .unwrap();
        assert_eq!(key.name(), "rsa-4096");
        assert_eq!(key.max_payload(PaddingMode::Oaep), Some(470));
    }

    #[test]
    fn missing_certificate_file_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.pem").display().to_string();
        let err = resolver(dir.path())
            .resolve(&KeySourceRef::CertificateByPath(path), Mode::Encrypt)
            .err()
            .unwrap();
        assert!(matches!(err, ScopeSealError::PathNotFound { .. }));
    }

    #[test]
    fn dsa_certificate_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture("dsa.crt.pem").display().to_string();
        let err = resolver(dir.path())
            .resolve(&KeySourceRef::CertificateByPath(path), Mode::Encrypt)
            .err()
            .unwrap();
        assert!(matches!(err, ScopeSealError::UnsupportedKeyAlgorithm { .. }));
        assert!(err.to_string().contains("not an RSA key"));
    }

    #[test]
    fn public_key_file_encrypts_and_bundle_decrypts() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());
        let public = resolver
            .resolve(
                &KeySourceRef::RawKeyFilePath(fixture("rsa2048.pub.pem")),
                Mode::Encrypt,
            )
            .unwrap();
        let ct = public.encrypt(b"Foo", PaddingMode::Oaep).unwrap();

        let private = resolver
            .resolve(
                &KeySourceRef::RawKeyFilePath(fixture("rsa2048-bundle.pem")),
                Mode::Decrypt,
            )
            .unwrap();
        assert_eq!(private.decrypt(&ct, PaddingMode::Oaep).unwrap(), b"Foo");
    }

    #[test]
    fn raw_and_base64_aes_key_files() {
        let dir = tempfile::tempdir().unwrap();
        let raw = dir.path().join("raw.key");
        let b64 = dir.path().join("b64.key");
        std::fs::write(&raw, [7u8; 24]).unwrap();
        std::fs::write(&b64, format!("{}\n", STANDARD.encode([7u8; 24]))).unwrap();

        let resolver = resolver(dir.path());
        let a = resolver
            .resolve(&KeySourceRef::RawKeyFilePath(raw), Mode::Encrypt)
            .unwrap();
        let b = resolver
            .resolve(&KeySourceRef::RawKeyFilePath(b64), Mode::Decrypt)
            .unwrap();
        assert_eq!(a.name(), "aes-192-gcm");
        let ct = a.encrypt(b"same key", PaddingMode::Oaep).unwrap();
        assert_eq!(b.decrypt(&ct, PaddingMode::Oaep).unwrap(), b"same key");
    }

    #[test]
    fn odd_sized_key_file_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.key");
        std::fs::write(&path, [1u8; 5]).unwrap();
        let err = resolver(dir.path())
            .resolve(&KeySourceRef::RawKeyFilePath(path), Mode::Encrypt)
            .err()
            .unwrap();
        assert!(matches!(err, ScopeSealError::InvalidKeyFile { .. }));
    }

    #[test]
    fn missing_key_file_is_path_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolver(dir.path())
            .resolve(
                &KeySourceRef::RawKeyFilePath(dir.path().join("none.key")),
                Mode::Encrypt,
            )
            .err()
            .unwrap();
        assert!(matches!(err, ScopeSealError::PathNotFound { .. }));
    }
}
