use crate::core::models::key_source::{KeySourceRef, PaddingMode};

/// Direction of a protection call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Encrypt,
    Decrypt,
}

/// One protect or unprotect call, built per invocation and never persisted.
///
/// `payload` is UTF-8 plaintext when encrypting and Base64 ciphertext
/// when decrypting.
#[derive(Debug, Clone)]
pub struct ProtectionRequest {
    pub payload: String,
    pub mode: Mode,
    pub key_source: KeySourceRef,
    pub padding: PaddingMode,
}

impl ProtectionRequest {
    pub fn encrypt(plaintext: impl Into<String>, key_source: KeySourceRef) -> Self {
        Self {
            payload: plaintext.into(),
            mode: Mode::Encrypt,
            key_source,
            padding: PaddingMode::default(),
        }
    }

    pub fn decrypt(ciphertext: impl Into<String>, key_source: KeySourceRef) -> Self {
        Self {
            payload: ciphertext.into(),
            mode: Mode::Decrypt,
            key_source,
            padding: PaddingMode::default(),
        }
    }

    pub fn with_padding(mut self, padding: PaddingMode) -> Self {
        self.padding = padding;
        self
    }
}
