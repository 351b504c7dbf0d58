//! Scope and credential keys furnished by Windows DPAPI.

use tracing::{debug, warn};
use windows::Win32::Foundation::{CloseHandle, HANDLE};
use windows::Win32::Security::{
    ImpersonateLoggedOnUser, LOGON32_LOGON_INTERACTIVE, LOGON32_PROVIDER_DEFAULT, LogonUserW,
    RevertToSelf,
};
use windows::core::{HSTRING, PCWSTR};
use zeroize::Zeroizing;

use crate::adapters::cipher::dpapi_key::{DpapiKey, DpapiScope};
use crate::core::errors::{Result, ScopeSealError};
use crate::core::models::key_source::{Credential, Scope};
use crate::core::traits::cipher::ResolvedKey;
use crate::core::traits::key_store::{CredentialKeyResolver, ScopeKeyStore};

/// DPAPI owns the key material, so there is nothing to create or load.
#[derive(Debug, Default, Clone, Copy)]
pub struct WindowsKeyStore;

impl ScopeKeyStore for WindowsKeyStore {
    fn scope_key(&self, scope: Scope, _create: bool) -> Result<ResolvedKey> {
        let dpapi = match scope {
            Scope::CurrentUser => DpapiScope::CurrentUser,
            Scope::LocalMachine => DpapiScope::LocalMachine,
        };
        Ok(Box::new(DpapiKey::new(dpapi)))
    }
}

impl CredentialKeyResolver for WindowsKeyStore {
    fn resolve_key_for_user(&self, credential: &Credential) -> Result<ResolvedKey> {
        let session = LogonSession::logon(credential)?;
        Ok(Box::new(DpapiKey::new(DpapiScope::User(session))))
    }
}

/// A logon token for another user. The token is closed on drop.
pub struct LogonSession {
    username: String,
    token: HANDLE,
}

impl LogonSession {
    /// Log the user on interactively. `DOMAIN\user` and `user@domain`
    /// forms are accepted; a bare name is looked up on this machine.
    pub fn logon(credential: &Credential) -> Result<Self> {
        let (domain, user) = split_account(credential.username());
        let user = HSTRING::from(user);
        let domain = domain.map(HSTRING::from);
        let password = Zeroizing::new(credential.secret().encode_utf16().chain([0]).collect::<Vec<u16>>());

        let domain_ptr = match &domain {
            Some(d) => PCWSTR::from_raw(d.as_ptr()),
            None => PCWSTR::null(),
        };

        let mut token = HANDLE::default();
        // SAFETY: every string pointer refers to a NUL-terminated buffer
        // that outlives the call, and `token` is a valid out pointer.
        unsafe {
            LogonUserW(
                PCWSTR::from_raw(user.as_ptr()),
                domain_ptr,
                PCWSTR::from_raw(password.as_ptr()),
                LOGON32_LOGON_INTERACTIVE,
                LOGON32_PROVIDER_DEFAULT,
                &mut token,
            )
        }
        .map_err(|e| {
            debug!(username = credential.username(), error = %e, "LogonUserW failed");
            ScopeSealError::LogonFailed {
                username: credential.username().to_string(),
            }
        })?;

        debug!(username = credential.username(), "logon session opened");
        Ok(Self {
            username: credential.username().to_string(),
            token,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Impersonate the user on this thread until the guard is dropped.
    pub fn impersonate(&self) -> Result<ImpersonationGuard<'_>> {
        // SAFETY: the token is open for as long as `self` lives.
        unsafe { ImpersonateLoggedOnUser(self.token) }.map_err(|e| {
            ScopeSealError::EncryptionFailed {
                reason: format!("could not impersonate '{}': {e}", self.username),
            }
        })?;
        Ok(ImpersonationGuard { _session: self })
    }
}

impl Drop for LogonSession {
    fn drop(&mut self) {
        // SAFETY: the token came from LogonUserW and is closed once.
        if let Err(e) = unsafe { CloseHandle(self.token) } {
            warn!(username = %self.username, error = %e, "failed to close logon token");
        } else {
            debug!(username = %self.username, "logon session closed");
        }
    }
}

/// Reverts the thread to its own identity on drop.
pub struct ImpersonationGuard<'a> {
    _session: &'a LogonSession,
}

impl Drop for ImpersonationGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: only reached after a successful ImpersonateLoggedOnUser.
        if let Err(e) = unsafe { RevertToSelf() } {
            warn!(error = %e, "RevertToSelf failed");
        }
    }
}

/// Split an account name into its domain and user parts.
fn split_account(account: &str) -> (Option<&str>, &str) {
    if let Some((domain, user)) = account.split_once('\\') {
        (Some(domain), user)
    } else if account.contains('@') {
        // UPN form: the domain is part of the user name.
        (None, account)
    } else {
        (Some("."), account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_forms() {
        assert_eq!(split_account(r"CORP\amy"), (Some("CORP"), "amy"));
        assert_eq!(split_account("amy@corp.example"), (None, "amy@corp.example"));
        assert_eq!(split_account("amy"), (Some("."), "amy"));
    }

    #[test]
    fn unknown_user_fails_logon() {
        let err = WindowsKeyStore
            .resolve_key_for_user(&Credential::new("no-such-user-scopeseal", "x"))
            .err()
            .unwrap();
        assert!(matches!(err, ScopeSealError::LogonFailed { .. }));
    }
}
