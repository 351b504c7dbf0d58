//! Loading certificates and keys from PEM or DER files.

use std::path::{Path, PathBuf};

use tracing::debug;
use zeroize::Zeroizing;

use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::certificate::{Certificate, PrivateKeyMaterial};

/// One `-----BEGIN <label>----- … -----END <label>-----` block.
pub struct PemBlock {
    pub label: String,
    pub der: Zeroizing<Vec<u8>>,
}

/// Split PEM text into its blocks, skipping anything between them.
pub fn parse_pem_blocks(text: &str, source_name: &str) -> Result<Vec<PemBlock>> {
    let mut blocks = Vec::new();
    let mut current: Option<(String, String)> = None;

    for line in text.lines() {
        let trimmed = line.trim();
        if current.is_none() {
            if let Some(label) = trimmed
                .strip_prefix("-----BEGIN ")
                .and_then(|rest| rest.strip_suffix("-----"))
            {
                current = Some((label.to_string(), format!("{trimmed}\n")));
            }
            continue;
        }

        let mut finished = false;
        if let Some((label, body)) = current.as_mut() {
            body.push_str(trimmed);
            body.push('\n');
            finished = trimmed == format!("-----END {label}-----");
        }
        if !finished {
            continue;
        }

        let Some((label, body)) = current.take() else {
            continue;
        };
        let (doc_label, doc) =
            der::Document::from_pem(&body).map_err(|e| ScopeSealError::InvalidCertificate {
                source_name: source_name.to_string(),
                detail: format!("bad PEM block '{label}': {e}"),
            })?;
        blocks.push(PemBlock {
            label: doc_label.to_string(),
            der: Zeroizing::new(doc.as_bytes().to_vec()),
        });
    }

    if let Some((label, _)) = current {
        return Err(ScopeSealError::InvalidCertificate {
            source_name: source_name.to_string(),
            detail: format!("unterminated PEM block '{label}'"),
        });
    }
    Ok(blocks)
}

/// Map a PEM private key block to key material.
pub fn private_key_from_block(block: &PemBlock) -> Option<PrivateKeyMaterial> {
    match block.label.as_str() {
        "PRIVATE KEY" => Some(PrivateKeyMaterial::Pkcs8(block.der.clone())),
        "RSA PRIVATE KEY" => Some(PrivateKeyMaterial::Pkcs1(block.der.clone())),
        _ => None,
    }
}

/// Load a certificate file (PEM or DER) and attach its private key when one
/// is found inside the file or in a sibling `<base>.key` / `<base>.key.pem`.
///
/// Fails with `PathNotFound` when the file does not exist.
pub fn load_certificate_file(path: &Path) -> Result<Certificate> {
    if !path.is_file() {
        return Err(ScopeSealError::PathNotFound {
            path: path.to_path_buf(),
        });
    }
    let source_name = path.display().to_string();
    let bytes = std::fs::read(path)?;

    let (cert, mut key) = match std::str::from_utf8(&bytes) {
        Ok(text) if text.contains("-----BEGIN ") => {
            let blocks = parse_pem_blocks(text, &source_name)?;
            let cert_block = blocks
                .iter()
                .find(|b| b.label == "CERTIFICATE")
                .ok_or_else(|| ScopeSealError::InvalidCertificate {
                    source_name: source_name.clone(),
                    detail: "no CERTIFICATE block".into(),
                })?;
            let cert = Certificate::from_der(&cert_block.der)?;
            let key = blocks.iter().find_map(private_key_from_block);
            (cert, key)
        }
        _ => (Certificate::from_der(&bytes)?, None),
    };

    if key.is_none() {
        key = load_sibling_key(path)?;
    }

    debug!(
        thumbprint = cert.thumbprint(),
        has_private_key = key.is_some(),
        "loaded certificate file"
    );
    Ok(match key {
        Some(key) => cert.with_private_key(key),
        None => cert,
    })
}

/// Candidate private key files for a certificate at `path`.
pub fn sibling_key_paths(path: &Path) -> Vec<PathBuf> {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return Vec::new();
    };
    let base = file_name.split('.').next().unwrap_or(file_name);
    let dir = path.parent().unwrap_or(Path::new(""));
    vec![
        dir.join(format!("{base}.key")),
        dir.join(format!("{base}.key.pem")),
    ]
}

fn load_sibling_key(path: &Path) -> Result<Option<PrivateKeyMaterial>> {
    for candidate in sibling_key_paths(path) {
        if !candidate.is_file() {
            continue;
        }
        let text = std::fs::read_to_string(&candidate)?;
        let blocks = parse_pem_blocks(&text, &candidate.display().to_string())?;
        if let Some(key) = blocks.iter().find_map(private_key_from_block) {
            debug!(key_file = %candidate.display(), "found private key next to certificate");
            return Ok(Some(key));
        }
    }
    Ok(None)
}
