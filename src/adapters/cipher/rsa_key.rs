use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha1::Sha1;

use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::certificate::{Certificate, PrivateKeyMaterial};
use crate::core::models::key_source::PaddingMode;
use crate::core::traits::cipher::ProtectionKey;

/// RSA key backend using OAEP (SHA-1) or PKCS#1 v1.5 padding.
///
/// Encryption only needs the public half; decryption needs the private
/// half and fails with `MissingPrivateKey` without it.
pub struct RsaKey {
    public: RsaPublicKey,
    private: Option<RsaPrivateKey>,
    /// Subject or file name, used in error messages.
    label: String,
}

impl RsaKey {
    /// Build a key from a certificate, rejecting anything that is not RSA.
    pub fn from_certificate(cert: &Certificate) -> Result<Self> {
        if !cert.is_rsa() {
            return Err(ScopeSealError::UnsupportedKeyAlgorithm {
                subject: cert.subject(),
                algorithm: cert.public_key_algorithm(),
            });
        }

        let spki = cert.public_key_der()?;
        let public = RsaPublicKey::from_public_key_der(&spki).map_err(|e| {
            ScopeSealError::InvalidCertificate {
                source_name: cert.subject(),
                detail: format!("unreadable RSA public key: {e}"),
            }
        })?;

        let private = cert
            .private_key()
            .map(|key| decode_private_key(key, &cert.subject()))
            .transpose()?;

        if let Some(private) = &private {
            if private.to_public_key() != public {
                return Err(ScopeSealError::InvalidCertificate {
                    source_name: cert.subject(),
                    detail: "private key does not match the certificate".into(),
                });
            }
        }

        Ok(Self {
            public,
            private,
            label: cert.subject(),
        })
    }

    /// Build a key from a bare public key.
    pub fn from_public(public: RsaPublicKey, label: impl Into<String>) -> Self {
        Self {
            public,
            private: None,
            label: label.into(),
        }
    }

    /// Build a key from a private key; the public half is derived from it.
    pub fn from_private(private: RsaPrivateKey, label: impl Into<String>) -> Self {
        Self {
            public: private.to_public_key(),
            private: Some(private),
            label: label.into(),
        }
    }

    /// Build a key from PKCS#8 or PKCS#1 private key material.
    pub fn from_key_material(key: &PrivateKeyMaterial, label: impl Into<String>) -> Result<Self> {
        let label = label.into();
        let private = decode_private_key(key, &label)?;
        Ok(Self::from_private(private, label))
    }

    /// Modulus size in bytes.
    pub fn size_bytes(&self) -> usize {
        self.public.size()
    }
}

impl ProtectionKey for RsaKey {
    fn encrypt(&self, plaintext: &[u8], padding: PaddingMode) -> Result<Vec<u8>> {
        let limit = self.size_bytes().saturating_sub(padding.overhead());
        if plaintext.len() > limit {
            return Err(ScopeSealError::PayloadTooLong {
                length: plaintext.len(),
                limit,
                key_bits: self.size_bytes() * 8,
                padding: padding.to_string(),
            });
        }

        let mut rng = rand::thread_rng();
        let result = match padding {
            PaddingMode::Oaep => self.public.encrypt(&mut rng, Oaep::new::<Sha1>(), plaintext),
            PaddingMode::Pkcs1 => self.public.encrypt(&mut rng, Pkcs1v15Encrypt, plaintext),
        };
        result.map_err(|e| ScopeSealError::EncryptionFailed {
            reason: format!("RSA encryption with '{}' failed: {e}", self.label),
        })
    }

    fn decrypt(&self, ciphertext: &[u8], padding: PaddingMode) -> Result<Vec<u8>> {
        let private = self
            .private
            .as_ref()
            .ok_or_else(|| ScopeSealError::MissingPrivateKey {
                subject: self.label.clone(),
            })?;

        let result = match padding {
            PaddingMode::Oaep => private.decrypt(Oaep::new::<Sha1>(), ciphertext),
            PaddingMode::Pkcs1 => private.decrypt(Pkcs1v15Encrypt, ciphertext),
        };
        // rsa's error text is deliberately vague; keep it that way.
        result.map_err(|_| ScopeSealError::DecryptionFailed {
            reason: format!("RSA {padding} decryption with '{}' failed", self.label),
        })
    }

    fn max_payload(&self, padding: PaddingMode) -> Option<usize> {
        Some(self.size_bytes().saturating_sub(padding.overhead()))
    }

    fn name(&self) -> String {
        format!("rsa-{}", self.size_bytes() * 8)
    }
}

fn decode_private_key(key: &PrivateKeyMaterial, subject: &str) -> Result<RsaPrivateKey> {
    let decoded = match key {
        PrivateKeyMaterial::Pkcs8(der) => {
            RsaPrivateKey::from_pkcs8_der(der).map_err(|e| e.to_string())
        }
        PrivateKeyMaterial::Pkcs1(der) => {
            RsaPrivateKey::from_pkcs1_der(der).map_err(|e| e.to_string())
        }
    };
    decoded.map_err(|detail| ScopeSealError::InvalidCertificate {
        source_name: subject.to_string(),
        detail: format!("unreadable RSA private key: {detail}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(bits: usize) -> RsaKey {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), bits).unwrap();
        RsaKey::from_private(private, "test")
    }

    #[test]
    fn oaep_round_trip() {
        let key = test_key(1024);
        let ct = key.encrypt(b"Foo", PaddingMode::Oaep).unwrap();
        assert_eq!(ct.len(), 128);
        assert_eq!(key.decrypt(&ct, PaddingMode::Oaep).unwrap(), b"Foo");
    }

    #[test]
    fn oaep_is_not_deterministic() {
        let key = test_key(1024);
        let a = key.encrypt(b"same", PaddingMode::Oaep).unwrap();
        let b = key.encrypt(b"same", PaddingMode::Oaep).unwrap();
        assert_ne!(a, b);
        assert_eq!(key.decrypt(&a, PaddingMode::Oaep).unwrap(), b"same");
        assert_eq!(key.decrypt(&b, PaddingMode::Oaep).unwrap(), b"same");
    }

    #[test]
    fn pkcs1_allows_longer_payloads_than_oaep() {
        let key = test_key(1024);
        assert_eq!(key.max_payload(PaddingMode::Oaep), Some(128 - 42));
        assert_eq!(key.max_payload(PaddingMode::Pkcs1), Some(128 - 11));

        let text = vec![b'x'; 128 - 11];
        assert!(key.encrypt(&text, PaddingMode::Oaep).is_err());
        let ct = key.encrypt(&text, PaddingMode::Pkcs1).unwrap();
        assert_eq!(key.decrypt(&ct, PaddingMode::Pkcs1).unwrap(), text);
    }

    #[test]
    fn padding_mismatch_is_a_generic_failure() {
        let key = test_key(1024);
        let ct = key.encrypt(b"secret", PaddingMode::Oaep).unwrap();
        let err = key.decrypt(&ct, PaddingMode::Pkcs1).unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
    }

    #[test]
    fn too_long_reports_exact_limit() {
        let key = test_key(1024);
        let text = vec![b'a'; 87];
        let err = key.encrypt(&text, PaddingMode::Oaep).unwrap_err();
        match err {
            ScopeSealError::PayloadTooLong { length, limit, key_bits, .. } => {
                assert_eq!(length, 87);
                assert_eq!(limit, 86);
                assert_eq!(key_bits, 1024);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn public_only_key_cannot_decrypt() {
        let full = test_key(1024);
        let public_only = RsaKey::from_public(full.public.clone(), "CN=public");
        let ct = public_only.encrypt(b"x", PaddingMode::Oaep).unwrap();
        let err = public_only.decrypt(&ct, PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::MissingPrivateKey { .. }));
        assert_eq!(full.decrypt(&ct, PaddingMode::Oaep).unwrap(), b"x");
    }
}
