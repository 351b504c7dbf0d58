use aes_gcm::aead::consts::U12;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::aes::Aes192;
use aes_gcm::{Aes128Gcm, Aes256Gcm, AesGcm, Nonce};
use rand::RngCore;
use zeroize::Zeroizing;

use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::PaddingMode;
use crate::core::traits::cipher::ProtectionKey;

type Aes192Gcm = AesGcm<Aes192, U12>;

/// AES-GCM nonce size in bytes (96 bits).
pub const NONCE_SIZE: usize = 12;

/// AES-GCM authentication tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Key lengths accepted for raw AES keys, in bytes.
pub const VALID_KEY_LENGTHS: [usize; 3] = [16, 24, 32];

/// Symmetric key backend: AES-GCM with a random nonce per message.
///
/// Ciphertext layout is `nonce ‖ ciphertext ‖ tag`. Used for scope keys,
/// enrolled user keys and raw key files.
pub struct AesKey {
    bytes: Zeroizing<Vec<u8>>,
    label: String,
}

impl AesKey {
    /// Wrap raw key bytes. Only 128, 192 and 256-bit keys are accepted.
    pub fn new(bytes: Zeroizing<Vec<u8>>, label: impl Into<String>) -> Result<Self> {
        if !VALID_KEY_LENGTHS.contains(&bytes.len()) {
            return Err(ScopeSealError::InvalidConfig {
                detail: format!(
                    "AES key must be 16, 24 or 32 bytes, got {}",
                    bytes.len()
                ),
            });
        }
        Ok(Self {
            bytes,
            label: label.into(),
        })
    }

    /// Generate fresh random key bytes of the given length.
    pub fn generate_bytes(len: usize) -> Zeroizing<Vec<u8>> {
        let mut bytes = Zeroizing::new(vec![0u8; len]);
        OsRng.fill_bytes(&mut bytes);
        bytes
    }

    fn seal<C: KeyInit + Aead + AeadCore<NonceSize = U12>>(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let cipher = C::new_from_slice(&self.bytes).map_err(|e| ScopeSealError::EncryptionFailed {
            reason: format!("cipher init failed: {e}"),
        })?;
        let nonce = C::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| ScopeSealError::EncryptionFailed {
                reason: format!("AES-GCM encryption with '{}' failed: {e}", self.label),
            })?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open<C: KeyInit + Aead + AeadCore<NonceSize = U12>>(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(ScopeSealError::DecryptionFailed {
                reason: format!("ciphertext is only {} bytes", data.len()),
            });
        }
        let cipher = C::new_from_slice(&self.bytes).map_err(|e| ScopeSealError::DecryptionFailed {
            reason: format!("cipher init failed: {e}"),
        })?;
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| ScopeSealError::DecryptionFailed {
                reason: format!("AES-GCM authentication with '{}' failed", self.label),
            })
    }
}

impl ProtectionKey for AesKey {
    fn encrypt(&self, plaintext: &[u8], _padding: PaddingMode) -> Result<Vec<u8>> {
        match self.bytes.len() {
            16 => self.seal::<Aes128Gcm>(plaintext),
            24 => self.seal::<Aes192Gcm>(plaintext),
            _ => self.seal::<Aes256Gcm>(plaintext),
        }
    }

    fn decrypt(&self, ciphertext: &[u8], _padding: PaddingMode) -> Result<Vec<u8>> {
        match self.bytes.len() {
            16 => self.open::<Aes128Gcm>(ciphertext),
            24 => self.open::<Aes192Gcm>(ciphertext),
            _ => self.open::<Aes256Gcm>(ciphertext),
        }
    }

    fn max_payload(&self, _padding: PaddingMode) -> Option<usize> {
        None
    }

    fn name(&self) -> String {
        format!("aes-{}-gcm", self.bytes.len() * 8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(len: usize) -> AesKey {
        AesKey::new(AesKey::generate_bytes(len), "test").unwrap()
    }

    #[test]
    fn round_trip_every_key_size() {
        for len in VALID_KEY_LENGTHS {
            let k = key(len);
            let ct = k.encrypt(b"Fizz", PaddingMode::Oaep).unwrap();
            assert_eq!(ct.len(), NONCE_SIZE + 4 + TAG_SIZE);
            assert_eq!(k.decrypt(&ct, PaddingMode::Oaep).unwrap(), b"Fizz");
            assert_eq!(k.name(), format!("aes-{}-gcm", len * 8));
        }
    }

    #[test]
    fn random_nonce_changes_ciphertext() {
        let k = key(32);
        let a = k.encrypt(b"Buzz", PaddingMode::Oaep).unwrap();
        let b = k.encrypt(b"Buzz", PaddingMode::Oaep).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn wrong_key_fails() {
        let ct = key(32).encrypt(b"Bar", PaddingMode::Oaep).unwrap();
        let err = key(32).decrypt(&ct, PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
    }

    #[test]
    fn truncated_ciphertext_fails() {
        let err = key(16).decrypt(&[0u8; 10], PaddingMode::Oaep).unwrap_err();
        assert!(matches!(err, ScopeSealError::DecryptionFailed { .. }));
    }

    #[test]
    fn rejects_odd_key_length() {
        assert!(AesKey::new(Zeroizing::new(vec![0u8; 20]), "bad").is_err());
    }
}
