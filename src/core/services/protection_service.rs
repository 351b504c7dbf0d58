use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};

use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::{KeySourceRef, PaddingMode};
use crate::core::models::protection_request::{Mode, ProtectionRequest};
use crate::core::services::key_resolver::KeyResolver;
use crate::core::traits::cipher::{ProtectionKey, ResolvedKey};

/// Protects and unprotects strings with keys from a [`KeyResolver`].
///
/// Ciphertext is standard padded Base64. The padding mode only affects
/// RSA keys and is not recorded in the output.
pub struct ProtectionService {
    resolver: KeyResolver,
}

impl ProtectionService {
    pub fn new(resolver: KeyResolver) -> Self {
        Self { resolver }
    }

    /// Encrypt one string.
    pub fn protect(
        &self,
        plaintext: &str,
        source: &KeySourceRef,
        padding: PaddingMode,
    ) -> Result<String> {
        let key = self.resolve(source, Mode::Encrypt, padding)?;
        seal(key.as_ref(), plaintext, padding)
    }

    /// Decrypt one Base64 string.
    pub fn unprotect(
        &self,
        ciphertext: &str,
        source: &KeySourceRef,
        padding: PaddingMode,
    ) -> Result<String> {
        let key = self.resolve(source, Mode::Decrypt, padding)?;
        open(key.as_ref(), ciphertext, padding)
    }

    /// Encrypt a sequence of strings against one resolved key.
    ///
    /// Items are processed as the returned iterator is advanced; a failed
    /// item yields its error and the next item still runs.
    pub fn protect_all<I>(
        &self,
        plaintexts: I,
        source: &KeySourceRef,
        padding: PaddingMode,
    ) -> Result<Batch<I::IntoIter>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.batch(plaintexts, source, Mode::Encrypt, padding)
    }

    /// Decrypt a sequence of Base64 strings against one resolved key.
    pub fn unprotect_all<I>(
        &self,
        ciphertexts: I,
        source: &KeySourceRef,
        padding: PaddingMode,
    ) -> Result<Batch<I::IntoIter>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.batch(ciphertexts, source, Mode::Decrypt, padding)
    }

    /// Run a single request in the direction it names.
    pub fn process(&self, request: &ProtectionRequest) -> Result<String> {
        match request.mode {
            Mode::Encrypt => self.protect(&request.payload, &request.key_source, request.padding),
            Mode::Decrypt => self.unprotect(&request.payload, &request.key_source, request.padding),
        }
    }

    fn batch<I>(
        &self,
        items: I,
        source: &KeySourceRef,
        mode: Mode,
        padding: PaddingMode,
    ) -> Result<Batch<I::IntoIter>>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let key = self.resolve(source, mode, padding)?;
        Ok(Batch {
            key,
            mode,
            padding,
            items: items.into_iter(),
        })
    }

    fn resolve(
        &self,
        source: &KeySourceRef,
        mode: Mode,
        padding: PaddingMode,
    ) -> Result<ResolvedKey> {
        let key = self.resolver.resolve(source, mode)?;
        if padding != PaddingMode::default() && key.max_payload(padding).is_none() {
            warn!(key = %key.name(), %padding, "padding mode ignored for non-RSA key");
        }
        Ok(key)
    }
}

/// Lazy batch of protect or unprotect results, in input order.
///
/// Holds the resolved key until dropped.
pub struct Batch<I> {
    key: ResolvedKey,
    mode: Mode,
    padding: PaddingMode,
    items: I,
}

impl<I> Iterator for Batch<I>
where
    I: Iterator,
    I::Item: AsRef<str>,
{
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.items.next()?;
        let result = match self.mode {
            Mode::Encrypt => seal(self.key.as_ref(), item.as_ref(), self.padding),
            Mode::Decrypt => open(self.key.as_ref(), item.as_ref(), self.padding),
        };
        if let Err(e) = &result {
            debug!(error = %e, "batch item failed");
        }
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

fn seal(key: &dyn ProtectionKey, plaintext: &str, padding: PaddingMode) -> Result<String> {
    let ciphertext = key.encrypt(plaintext.as_bytes(), padding)?;
    Ok(STANDARD.encode(ciphertext))
}

fn open(key: &dyn ProtectionKey, ciphertext: &str, padding: PaddingMode) -> Result<String> {
    let raw = STANDARD
        .decode(ciphertext.trim())
        .map_err(|e| ScopeSealError::InvalidCiphertextEncoding {
            reason: e.to_string(),
        })?;
    let plaintext = key.decrypt(&raw, padding)?;
    String::from_utf8(plaintext).map_err(|_| ScopeSealError::DecryptionFailed {
        reason: "recovered bytes are not valid UTF-8".into(),
    })
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use super::*;
    use crate::adapters::cert_stores::directory_store::DirectoryCertStore;
    use crate::adapters::cert_stores::pem_loader::load_certificate_file;
    use crate::adapters::key_stores::credential_store::CredentialKeyStore;
    use crate::adapters::key_stores::file_scope_store::FileScopeKeyStore;
    use crate::core::models::key_source::Credential;
    use crate::core::traits::cert_store::CertificateStore;

    const THUMB_4096: &str = "897ABEED2393FF0BF226B5D4CF963F8FA84676E9";

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("tests")
            .join("fixtures")
            .join(name)
    }

    fn service(dir: &Path) -> ProtectionService {
        ProtectionService::new(KeyResolver::new(
            Box::new(FileScopeKeyStore::new(dir.join("user"), dir.join("machine"))),
            Box::new(CredentialKeyStore::new(dir.join("users")).with_iterations(1_000)),
            Box::new(DirectoryCertStore::new(dir.join("certs"))),
        ))
    }

    fn cert_4096() -> KeySourceRef {
        KeySourceRef::CertificateByPath(fixture("rsa4096.crt.pem").display().to_string())
    }

    #[test]
    fn current_user_round_trip_is_randomized() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let source = KeySourceRef::CurrentUserScope;

        let a = svc.protect("Foo", &source, PaddingMode::Oaep).unwrap();
        let b = svc.protect("Foo", &source, PaddingMode::Oaep).unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.unprotect(&a, &source, PaddingMode::Oaep).unwrap(), "Foo");
        assert_eq!(svc.unprotect(&b, &source, PaddingMode::Oaep).unwrap(), "Foo");
    }

    #[test]
    fn scopes_are_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let user = KeySourceRef::CurrentUserScope;
        let machine = KeySourceRef::LocalMachineScope;

        let by_user = svc.protect("Foo", &user, PaddingMode::Oaep).unwrap();
        let by_machine = svc.protect("Foo", &machine, PaddingMode::Oaep).unwrap();
        assert_ne!(by_user, by_machine);

        let err = svc.unprotect(&by_user, &machine, PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
        let err = svc.unprotect(&by_machine, &user, PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
    }

    #[test]
    fn batch_items_are_independent() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let source = cert_4096();
        let inputs = ["Foo", "Fizz", "Buzz", "Bar"];

        let protected: Vec<String> = svc
            .protect_all(inputs, &source, PaddingMode::Oaep)
            .unwrap()
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(protected.len(), 4);

        for (ciphertext, expected) in protected.iter().zip(inputs) {
            assert_eq!(svc.unprotect(ciphertext, &source, PaddingMode::Oaep).unwrap(), expected);
        }
    }

    #[test]
    fn one_bad_item_does_not_stop_the_batch() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let source = KeySourceRef::CurrentUserScope;
        let good = svc.protect("Fizz", &source, PaddingMode::Oaep).unwrap();

        let results: Vec<Result<String>> = svc
            .unprotect_all(vec!["***".to_string(), good], &source, PaddingMode::Oaep)
            .unwrap()
            .collect();
        assert!(matches!(
            results[0],
            Err(ScopeSealError::InvalidCiphertextEncoding { .. })
        ));
        assert_eq!(results[1].as_deref().unwrap(), "Fizz");
    }

    #[test]
    fn oaep_4096_length_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let source = cert_4096();

        let ok = svc.protect(&"a".repeat(470), &source, PaddingMode::Oaep).unwrap();
        assert_eq!(
            svc.unprotect(&ok, &source, PaddingMode::Oaep).unwrap().len(),
            470
        );

        for length in [471, 472] {
            let err = svc
                .protect(&"a".repeat(length), &source, PaddingMode::Oaep)
                .unwrap_err();
            match &err {
                ScopeSealError::PayloadTooLong { limit, .. } => assert_eq!(*limit, 470),
                other => panic!("unexpected error: {other}"),
            }
            assert!(err.to_string().contains("470"));
        }
    }

    #[test]
    fn padding_mismatch_fails_generically() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let source = cert_4096();
        let ct = svc.protect("Bar", &source, PaddingMode::Pkcs1).unwrap();
        assert_eq!(svc.unprotect(&ct, &source, PaddingMode::Pkcs1).unwrap(), "Bar");

        let err = svc.unprotect(&ct, &source, PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
    }

    #[test]
    fn dsa_certificate_is_not_rsa() {
        let dir = tempfile::tempdir().unwrap();
        let source = KeySourceRef::CertificateByPath(fixture("dsa.crt.pem").display().to_string());
        let err = service(dir.path())
            .protect("Foo", &source, PaddingMode::Oaep)
            .unwrap_err();
        assert!(err.to_string().contains("not an RSA key"));
    }

    #[test]
    fn unknown_thumbprint_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let source = KeySourceRef::CertificateByThumbprint("0123456789ABCDEF0123456789ABCDEF01234567".into());
        let err = service(dir.path())
            .protect("Foo", &source, PaddingMode::Oaep)
            .unwrap_err();
        assert!(matches!(err, ScopeSealError::CertificateNotFound { .. }));
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn imported_certificate_by_thumbprint_and_store_path() {
        let dir = tempfile::tempdir().unwrap();
        DirectoryCertStore::new(dir.path().join("certs"))
            .import(&fixture("rsa4096.crt.pem"), r"CurrentUser\My")
            .unwrap();
        let svc = service(dir.path());

        let by_thumb = KeySourceRef::CertificateByThumbprint(THUMB_4096.to_lowercase());
        let by_path = KeySourceRef::CertificateByPath(format!(r"cert:\CurrentUser\My\{THUMB_4096}"));
        let ct = svc.protect("Buzz", &by_thumb, PaddingMode::Oaep).unwrap();
        assert_eq!(svc.unprotect(&ct, &by_path, PaddingMode::Oaep).unwrap(), "Buzz");
    }

    #[test]
    fn certificate_object_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cert = load_certificate_file(&fixture("rsa2048-bundle.pem")).unwrap();
        let source = KeySourceRef::CertificateByObject(Box::new(cert));
        let svc = service(dir.path());

        let ct = svc.protect("Foo", &source, PaddingMode::Oaep).unwrap();
        assert_eq!(svc.unprotect(&ct, &source, PaddingMode::Oaep).unwrap(), "Foo");
    }

    #[test]
    fn credential_round_trip_and_wrong_secret() {
        let dir = tempfile::tempdir().unwrap();
        CredentialKeyStore::new(dir.path().join("users"))
            .with_iterations(1_000)
            .enroll(&Credential::new("svc_app", "s3cret"))
            .unwrap();
        let svc = service(dir.path());
        let source = KeySourceRef::ImpersonatedCredential(Credential::new("svc_app", "s3cret"));

        let ct = svc.protect("Fizz", &source, PaddingMode::Oaep).unwrap();
        assert_eq!(svc.unprotect(&ct, &source, PaddingMode::Oaep).unwrap(), "Fizz");

        let wrong = KeySourceRef::ImpersonatedCredential(Credential::new("svc_app", "guess"));
        let err = svc.unprotect(&ct, &wrong, PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::LogonFailed { .. }));
    }

    #[test]
    fn process_dispatches_on_mode() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let ct = svc
            .process(&ProtectionRequest::encrypt("Bar", KeySourceRef::LocalMachineScope))
            .unwrap();
        let pt = svc
            .process(&ProtectionRequest::decrypt(ct, KeySourceRef::LocalMachineScope))
            .unwrap();
        assert_eq!(pt, "Bar");
    }

    #[test]
    fn invalid_base64_is_reported_as_encoding_error() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        svc.protect("seed", &KeySourceRef::CurrentUserScope, PaddingMode::Oaep)
            .unwrap();
        let err = svc
            .unprotect("not base64!", &KeySourceRef::CurrentUserScope, PaddingMode::Oaep)
            .unwrap_err();
        assert!(matches!(err, ScopeSealError::InvalidCiphertextEncoding { .. }));
    }

    #[test]
    fn non_utf8_plaintext_is_a_decryption_failure() {
        use crate::adapters::cipher::aes_key::AesKey;

        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let bytes = AesKey::generate_bytes(32);
        let key_file = dir.path().join("data.key");
        std::fs::write(&key_file, STANDARD.encode(bytes.as_slice())).unwrap();

        let key = AesKey::new(bytes, "data.key").unwrap();
        let raw = key.encrypt(&[0xff, 0xfe], PaddingMode::Oaep).unwrap();
        let err = svc
            .unprotect(
                &STANDARD.encode(raw),
                &KeySourceRef::RawKeyFilePath(key_file),
                PaddingMode::Oaep,
            )
            .unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
    }
}
