use crate::core::errors::Result;
use crate::core::models::key_source::PaddingMode;

/// A resolved key handle that can encrypt and decrypt raw bytes.
///
/// Implementations live in `adapters::cipher` (RSA, AES-GCM, DPAPI).
/// The service layer only depends on this trait, never on a concrete key.
/// Handles are built per request and dropped after use; dropping one
/// releases whatever OS resources or key material it holds.
pub trait ProtectionKey {
    /// Encrypt plaintext bytes. `padding` only matters for RSA keys.
    fn encrypt(&self, plaintext: &[u8], padding: PaddingMode) -> Result<Vec<u8>>;

    /// Decrypt ciphertext bytes produced by [`ProtectionKey::encrypt`].
    fn decrypt(&self, ciphertext: &[u8], padding: PaddingMode) -> Result<Vec<u8>>;

    /// Largest plaintext this key accepts, or `None` when unbounded.
    fn max_payload(&self, padding: PaddingMode) -> Option<usize>;

    /// Human-readable name of this key (e.g. "rsa-4096", "aes-256-gcm").
    fn name(&self) -> String;
}

/// Boxed key handle returned by the resolver.
pub type ResolvedKey = Box<dyn ProtectionKey>;
