//! DPAPI-backed scope keys (Windows only).
//!
//! `CryptProtectData` binds ciphertext to the calling user, or to the
//! machine with `CRYPTPROTECT_LOCAL_MACHINE`. For another user's key the
//! calls run while impersonating that user's logon token.

use windows::Win32::Foundation::{HLOCAL, LocalFree};
use windows::Win32::Security::Cryptography::{
    CRYPT_INTEGER_BLOB, CRYPTPROTECT_LOCAL_MACHINE, CRYPTPROTECT_UI_FORBIDDEN, CryptProtectData,
    CryptUnprotectData,
};
use windows::core::PCWSTR;

use crate::adapters::key_stores::windows_key_store::LogonSession;
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::PaddingMode;
use crate::core::traits::cipher::ProtectionKey;

/// Whose DPAPI master key protects the data.
pub enum DpapiScope {
    CurrentUser,
    LocalMachine,
    /// Another user; the session is closed when the key is dropped.
    User(LogonSession),
}

pub struct DpapiKey {
    scope: DpapiScope,
}

impl DpapiKey {
    pub fn new(scope: DpapiScope) -> Self {
        Self { scope }
    }

    fn flags(&self) -> u32 {
        match self.scope {
            DpapiScope::LocalMachine => CRYPTPROTECT_UI_FORBIDDEN | CRYPTPROTECT_LOCAL_MACHINE,
            _ => CRYPTPROTECT_UI_FORBIDDEN,
        }
    }
}

impl ProtectionKey for DpapiKey {
    fn encrypt(&self, plaintext: &[u8], _padding: PaddingMode) -> Result<Vec<u8>> {
        let _guard = match &self.scope {
            DpapiScope::User(session) => Some(session.impersonate()?),
            _ => None,
        };
        protect(plaintext, self.flags())
    }

    fn decrypt(&self, ciphertext: &[u8], _padding: PaddingMode) -> Result<Vec<u8>> {
        let _guard = match &self.scope {
            DpapiScope::User(session) => Some(session.impersonate()?),
            _ => None,
        };
        unprotect(ciphertext, CRYPTPROTECT_UI_FORBIDDEN)
    }

    fn max_payload(&self, _padding: PaddingMode) -> Option<usize> {
        None
    }

    fn name(&self) -> String {
        match &self.scope {
            DpapiScope::CurrentUser => "dpapi-current-user".into(),
            DpapiScope::LocalMachine => "dpapi-local-machine".into(),
            DpapiScope::User(session) => format!("dpapi-user-{}", session.username()),
        }
    }
}

fn protect(plain: &[u8], flags: u32) -> Result<Vec<u8>> {
    // SAFETY: the input blob points at `plain`, which outlives the call.
    // The output buffer is allocated by the API and released with LocalFree.
    unsafe {
        let in_blob = CRYPT_INTEGER_BLOB {
            cbData: plain.len() as u32,
            pbData: plain.as_ptr() as *mut u8,
        };
        let mut out_blob = CRYPT_INTEGER_BLOB::default();
        CryptProtectData(&in_blob, PCWSTR::null(), None, None, None, flags, &mut out_blob)
            .map_err(|e| ScopeSealError::EncryptionFailed {
                reason: format!("CryptProtectData failed: {e}"),
            })?;
        Ok(take_blob(out_blob))
    }
}

fn unprotect(cipher: &[u8], flags: u32) -> Result<Vec<u8>> {
    // SAFETY: see `protect`.
    unsafe {
        let in_blob = CRYPT_INTEGER_BLOB {
            cbData: cipher.len() as u32,
            pbData: cipher.as_ptr() as *mut u8,
        };
        let mut out_blob = CRYPT_INTEGER_BLOB::default();
        CryptUnprotectData(&in_blob, None, None, None, None, flags, &mut out_blob).map_err(|e| {
            ScopeSealError::DecryptionFailed {
                reason: format!("CryptUnprotectData failed: {e}"),
            }
        })?;
        Ok(take_blob(out_blob))
    }
}

/// Copy a system-allocated blob into a Vec and free the original.
unsafe fn take_blob(blob: CRYPT_INTEGER_BLOB) -> Vec<u8> {
    unsafe {
        let bytes =
            std::slice::from_raw_parts(blob.pbData as *const u8, blob.cbData as usize).to_vec();
        let _ = LocalFree(HLOCAL(blob.pbData as *mut std::ffi::c_void));
        bytes
    }
}
