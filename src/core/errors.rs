use std::path::PathBuf;

/// All domain errors for scopeseal.
///
/// Each variant provides enough context to diagnose the issue
/// without needing a debugger. None of them carry key bytes,
/// secrets, or plaintext.
#[derive(Debug, thiserror::Error)]
pub enum ScopeSealError {
    #[error(
        "Certificate '{locator}' not found\n\n  \
         Check the thumbprint or certificate store path.\n  \
         Run 'scopeseal certs list' to see imported certificates."
    )]
    CertificateNotFound { locator: String },

    #[error("Path not found: {path}")]
    PathNotFound { path: PathBuf },

    #[error(
        "Certificate '{subject}' is not an RSA key. Found a public key of type '{algorithm}'\n\n  \
         Only RSA certificates can protect strings.\n  \
         Generate one with: scopeseal keys new-rsa --subject <name>"
    )]
    UnsupportedKeyAlgorithm { subject: String, algorithm: String },

    #[error(
        "String is too long: {length} bytes. A {key_bits}-bit RSA key with {padding} padding \
         can only encrypt up to {limit} bytes."
    )]
    PayloadTooLong {
        length: usize,
        limit: usize,
        key_bits: usize,
        padding: String,
    },

    #[error("Ciphertext is not valid Base64: {reason}")]
    InvalidCiphertextEncoding { reason: String },

    #[error(
        "Decryption failed: {reason}\n\n  \
         Check that the key source and padding mode match the ones used to encrypt."
    )]
    DecryptionFailed { reason: String },

    #[error("Encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    #[error(
        "Certificate '{subject}' has no private key\n\n  \
         Decryption needs the private key. Put it in the same PEM file,\n  \
         or next to the certificate as <name>.key or <name>.key.pem."
    )]
    MissingPrivateKey { subject: String },

    #[error("Invalid thumbprint '{thumbprint}': expected 40 hexadecimal characters")]
    InvalidThumbprint { thumbprint: String },

    #[error(
        "Invalid key file {path}: {detail}\n\n  \
         Expected a PEM RSA key, or a 128, 192 or 256-bit AES key (raw or Base64).\n  \
         Generate one with: scopeseal keys new-aes <path>"
    )]
    InvalidKeyFile { path: PathBuf, detail: String },

    #[error("Invalid certificate {source_name}: {detail}")]
    InvalidCertificate { source_name: String, detail: String },

    #[error("Logon failed for user '{username}': unknown user name or bad password")]
    LogonFailed { username: String },

    #[error("User '{username}' is already enrolled")]
    UserAlreadyEnrolled { username: String },

    #[error("Refusing to overwrite existing file: {path}")]
    OutputExists { path: PathBuf },

    #[error("Invalid configuration: {detail}")]
    InvalidConfig { detail: String },

    #[error("{failed} of {total} items failed")]
    BatchFailed { failed: usize, total: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScopeSealError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_too_long_states_the_limit() {
        let err = ScopeSealError::PayloadTooLong {
            length: 472,
            limit: 470,
            key_bits: 4096,
            padding: "OAEP".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("472 bytes"));
        assert!(msg.contains("up to 470 bytes"));
    }

    #[test]
    fn unsupported_algorithm_names_the_algorithm() {
        let err = ScopeSealError::UnsupportedKeyAlgorithm {
            subject: "CN=test".into(),
            algorithm: "DSA".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("not an RSA key"));
        assert!(msg.contains("DSA"));
    }
}
