use crate::core::errors::Result;
use crate::core::models::key_source::{Credential, Scope};
use crate::core::traits::cipher::ResolvedKey;

/// Port for the per-user and per-machine protection keys.
pub trait ScopeKeyStore {
    /// Resolve the key for `scope`. When `create` is set a missing key is
    /// generated; otherwise a missing key is an error.
    fn scope_key(&self, scope: Scope, create: bool) -> Result<ResolvedKey>;
}

/// Port for keys that belong to another user's security context.
///
/// Implementations open a session for the credential and release it on
/// every path: on error before returning, otherwise no later than when
/// the returned key is dropped.
pub trait CredentialKeyResolver {
    fn resolve_key_for_user(&self, credential: &Credential) -> Result<ResolvedKey>;
}
