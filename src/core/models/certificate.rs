use std::fmt;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use const_oid::ObjectIdentifier;
use const_oid::db::{rfc5912, rfc8410};
use der::pem::LineEnding;
use der::{Decode, Encode, EncodePem};
use regex::Regex;
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

use crate::core::errors::{Result, ScopeSealError};

static THUMBPRINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9A-F]{40}$").expect("valid thumbprint regex"));

/// Private key bytes attached to a certificate, scrubbed on drop.
#[derive(Clone)]
pub enum PrivateKeyMaterial {
    /// `PRIVATE KEY` (PKCS#8 PrivateKeyInfo) DER.
    Pkcs8(Zeroizing<Vec<u8>>),
    /// `RSA PRIVATE KEY` (PKCS#1 RSAPrivateKey) DER.
    Pkcs1(Zeroizing<Vec<u8>>),
}

impl PrivateKeyMaterial {
    pub(crate) fn pem_label(&self) -> &'static str {
        match self {
            Self::Pkcs8(_) => "PRIVATE KEY",
            Self::Pkcs1(_) => "RSA PRIVATE KEY",
        }
    }

    pub(crate) fn der(&self) -> &[u8] {
        match self {
            Self::Pkcs8(d) | Self::Pkcs1(d) => d,
        }
    }
}

impl fmt::Debug for PrivateKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PrivateKeyMaterial({}, [REDACTED])", self.pem_label())
    }
}

/// An X.509 certificate, optionally paired with its private key.
#[derive(Clone)]
pub struct Certificate {
    inner: x509_cert::Certificate,
    der: Vec<u8>,
    thumbprint: String,
    private_key: Option<PrivateKeyMaterial>,
}

impl Certificate {
    /// Parse a DER-encoded certificate.
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner =
            x509_cert::Certificate::from_der(der).map_err(|e| ScopeSealError::InvalidCertificate {
                source_name: "(DER input)".into(),
                detail: e.to_string(),
            })?;
        Ok(Self {
            inner,
            der: der.to_vec(),
            thumbprint: thumbprint_of(der),
            private_key: None,
        })
    }

    /// Attach the private key that belongs to this certificate.
    pub fn with_private_key(mut self, key: PrivateKeyMaterial) -> Self {
        self.private_key = Some(key);
        self
    }

    /// Upper-case SHA-1 thumbprint of the DER encoding.
    pub fn thumbprint(&self) -> &str {
        &self.thumbprint
    }

    pub fn subject(&self) -> String {
        self.inner.tbs_certificate.subject.to_string()
    }

    pub fn not_after(&self) -> Option<DateTime<Utc>> {
        let secs = self
            .inner
            .tbs_certificate
            .validity
            .not_after
            .to_unix_duration()
            .as_secs();
        DateTime::from_timestamp(i64::try_from(secs).ok()?, 0)
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    pub fn private_key(&self) -> Option<&PrivateKeyMaterial> {
        self.private_key.as_ref()
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    pub fn public_key_oid(&self) -> ObjectIdentifier {
        self.inner.tbs_certificate.subject_public_key_info.algorithm.oid
    }

    pub fn is_rsa(&self) -> bool {
        self.public_key_oid() == rfc5912::RSA_ENCRYPTION
    }

    /// Human-readable name of the public key algorithm.
    pub fn public_key_algorithm(&self) -> String {
        algorithm_name(self.public_key_oid())
    }

    /// DER SubjectPublicKeyInfo of the certificate's key.
    pub fn public_key_der(&self) -> Result<Vec<u8>> {
        self.inner
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| ScopeSealError::InvalidCertificate {
                source_name: self.thumbprint.clone(),
                detail: format!("public key encoding failed: {e}"),
            })
    }

    /// PEM text: the certificate, then the private key if one is attached.
    pub fn to_pem_bundle(&self) -> Result<String> {
        let pem_err = |e: der::Error| ScopeSealError::InvalidCertificate {
            source_name: self.thumbprint.clone(),
            detail: format!("PEM encoding failed: {e}"),
        };
        let mut out = self.inner.to_pem(LineEnding::LF).map_err(pem_err)?;
        if let Some(key) = &self.private_key {
            let block = der::pem::encode_string(key.pem_label(), LineEnding::LF, key.der())
                .map_err(|e| pem_err(e.into()))?;
            out.push_str(&block);
        }
        Ok(out)
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject())
            .field("thumbprint", &self.thumbprint)
            .field("has_private_key", &self.has_private_key())
            .finish()
    }
}

/// SHA-1 over the DER bytes, as 40 upper-case hex characters.
pub fn thumbprint_of(der: &[u8]) -> String {
    Sha1::digest(der)
        .iter()
        .map(|b| format!("{b:02X}"))
        .collect()
}

/// Canonicalize a user-supplied thumbprint: drop spaces and colons, upper-case.
pub fn normalize_thumbprint(input: &str) -> Result<String> {
    let cleaned: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':')
        .collect::<String>()
        .to_ascii_uppercase();
    if THUMBPRINT_RE.is_match(&cleaned) {
        Ok(cleaned)
    } else {
        Err(ScopeSealError::InvalidThumbprint {
            thumbprint: input.to_string(),
        })
    }
}

fn algorithm_name(oid: ObjectIdentifier) -> String {
    if oid == rfc5912::RSA_ENCRYPTION {
        "RSA".into()
    } else if oid == rfc5912::ID_DSA {
        "DSA".into()
    } else if oid == rfc5912::ID_EC_PUBLIC_KEY {
        "EC".into()
    } else if oid == rfc8410::ID_ED_25519 {
        "Ed25519".into()
    } else {
        oid.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_accepts_colons_and_lowercase() {
        let t = normalize_thumbprint("89:7a:be:ed:23:93:ff:0b:f2:26:b5:d4:cf:96:3f:8f:a8:46:76:e9")
            .unwrap();
        assert_eq!(t, "897ABEED2393FF0BF226B5D4CF963F8FA84676E9");
    }

    #[test]
    fn normalize_rejects_wrong_length() {
        let err = normalize_thumbprint("ABCDEF").unwrap_err();
        assert!(matches!(err, ScopeSealError::InvalidThumbprint { .. }));
    }

    #[test]
    fn normalize_rejects_non_hex() {
        let err = normalize_thumbprint(&"Z".repeat(40)).unwrap_err();
        assert!(matches!(err, ScopeSealError::InvalidThumbprint { .. }));
    }

    #[test]
    fn thumbprint_is_sha1_of_der() {
        // SHA-1 of the empty string
        assert_eq!(thumbprint_of(b""), "DA39A3EE5E6B4B0D3255BFEF95601890AFD80709");
    }
}
