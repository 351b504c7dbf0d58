use std::path::{Path, PathBuf};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, Utc};
use rcgen::{
    CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, KeyPair,
    KeyUsagePurpose, date_time_ymd,
};
use rsa::RsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use tracing::info;
use zeroize::Zeroizing;

use crate::adapters::cipher::aes_key::AesKey;
use crate::adapters::write_file_atomic;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::certificate::thumbprint_of;

/// RSA modulus sizes offered for new key pairs.
pub const RSA_KEY_SIZES: [usize; 3] = [2048, 3072, 4096];

/// AES key sizes offered for new key files.
pub const AES_KEY_SIZES: [usize; 3] = [128, 192, 256];

/// How long generated certificates stay valid.
pub const CERT_VALIDITY_YEARS: i32 = 100;

/// Microsoft "Document Encryption" extended key usage.
const DOCUMENT_ENCRYPTION_EKU: [u64; 9] = [1, 3, 6, 1, 4, 1, 311, 80, 1];

/// Files written by [`generate_rsa_key_pair`].
#[derive(Debug, Clone)]
pub struct GeneratedKeyPair {
    pub certificate: PathBuf,
    pub private_key: PathBuf,
    pub thumbprint: String,
}

/// Create an RSA key and a self-signed `CN=<subject>` certificate for it.
///
/// Writes `<out_dir>/<name>.crt.pem` and `<out_dir>/<name>.key.pem`.
/// The key file is owner-only on Unix. Neither file may exist yet.
pub fn generate_rsa_key_pair(
    subject: &str,
    bits: usize,
    out_dir: &Path,
    name: &str,
) -> Result<GeneratedKeyPair> {
    if !RSA_KEY_SIZES.contains(&bits) {
        return Err(ScopeSealError::InvalidConfig {
            detail: format!("RSA key size must be 2048, 3072 or 4096 bits, got {bits}"),
        });
    }
    if subject.trim().is_empty() {
        return Err(ScopeSealError::InvalidConfig {
            detail: "certificate subject must not be empty".into(),
        });
    }

    let certificate = out_dir.join(format!("{name}.crt.pem"));
    let private_key = out_dir.join(format!("{name}.key.pem"));
    refuse_overwrite(&certificate)?;
    refuse_overwrite(&private_key)?;

    let rsa_key = RsaPrivateKey::new(&mut rand::thread_rng(), bits).map_err(|e| {
        ScopeSealError::EncryptionFailed {
            reason: format!("RSA key generation failed: {e}"),
        }
    })?;
    let key_pem = rsa_key
        .to_pkcs8_pem(LineEnding::LF)
        .map_err(|e| ScopeSealError::EncryptionFailed {
            reason: format!("PKCS#8 encoding failed: {e}"),
        })?;

    let cert = self_signed(subject, &key_pem)?;
    let thumbprint = thumbprint_of(cert.der());

    write_file_atomic(&private_key, key_pem.as_bytes(), true)?;
    write_file_atomic(&certificate, cert.pem().as_bytes(), false)?;

    info!(%thumbprint, bits, cert = %certificate.display(), "generated RSA key pair");
    Ok(GeneratedKeyPair {
        certificate,
        private_key,
        thumbprint,
    })
}

/// Write a random AES key as Base64 text. The file must not exist yet.
pub fn generate_aes_key_file(path: &Path, bits: usize) -> Result<()> {
    if !AES_KEY_SIZES.contains(&bits) {
        return Err(ScopeSealError::InvalidConfig {
            detail: format!("AES key size must be 128, 192 or 256 bits, got {bits}"),
        });
    }
    refuse_overwrite(path)?;

    let bytes = AesKey::generate_bytes(bits / 8);
    let mut encoded = Zeroizing::new(STANDARD.encode(bytes.as_slice()));
    encoded.push('\n');
    write_file_atomic(path, encoded.as_bytes(), true)?;

    info!(path = %path.display(), bits, "generated AES key file");
    Ok(())
}

fn self_signed(subject: &str, key_pem: &str) -> Result<rcgen::Certificate> {
    let cert_err = |e: rcgen::Error| ScopeSealError::EncryptionFailed {
        reason: format!("certificate generation failed: {e}"),
    };

    let key_pair = KeyPair::from_pem(key_pem).map_err(cert_err)?;
    let mut params = CertificateParams::new(Vec::<String>::new()).map_err(cert_err)?;

    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, subject);
    params.distinguished_name = dn;

    let today = Utc::now().date_naive();
    let month = today.month() as u8;
    let day = today.day() as u8;
    params.not_before = date_time_ymd(today.year(), month, day);
    // Feb 29 does not exist in every target year.
    params.not_after = date_time_ymd(today.year() + CERT_VALIDITY_YEARS, month, day.min(28));

    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyEncipherment,
        KeyUsagePurpose::DataEncipherment,
    ];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::Other(
        DOCUMENT_ENCRYPTION_EKU.to_vec(),
    )];

    params.self_signed(&key_pair).map_err(cert_err)
}

fn refuse_overwrite(path: &Path) -> Result<()> {
    if path.exists() {
        return Err(ScopeSealError::OutputExists {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::cert_stores::pem_loader::load_certificate_file;
    use crate::adapters::cipher::rsa_key::RsaKey;
    use crate::core::models::key_source::PaddingMode;
    use crate::core::traits::cipher::ProtectionKey;

    #[test]
    fn rsa_pair_is_usable_and_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let generated = generate_rsa_key_pair("unit-test", 2048, dir.path(), "unit").unwrap();
        assert_eq!(generated.thumbprint.len(), 40);

        let cert = load_certificate_file(&generated.certificate).unwrap();
        assert_eq!(cert.thumbprint(), generated.thumbprint);
        assert!(cert.subject().contains("unit-test"));
        assert!(cert.has_private_key());

        let key = RsaKey::from_certificate(&cert).unwrap();
        let ct = key.encrypt(b"Foo", PaddingMode::Oaep).unwrap();
        assert_eq!(key.decrypt(&ct, PaddingMode::Oaep).unwrap(), b"Foo");

        let not_after = cert.not_after().unwrap();
        assert!(not_after.year() >= Utc::now().year() + 99);

        let err = generate_rsa_key_pair("unit-test", 2048, dir.path(), "unit").unwrap_err();
        assert!(matches!(err, ScopeSealError::OutputExists { .. }));
    }

    #[test]
    fn rejects_unsupported_rsa_size() {
        let dir = tempfile::tempdir().unwrap();
        let err = generate_rsa_key_pair("x", 1024, dir.path(), "x").unwrap_err();
        assert!(matches!(err, ScopeSealError::InvalidConfig { .. }));
    }

    #[test]
    fn aes_key_file_is_base64_of_requested_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.key");
        generate_aes_key_file(&path, 192).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(STANDARD.decode(text.trim()).unwrap().len(), 24);
        assert!(generate_aes_key_file(&path, 192).is_err());
        assert!(generate_aes_key_file(&dir.path().join("odd.key"), 100).is_err());
    }
}
