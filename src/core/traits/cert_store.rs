use std::path::Path;

use crate::core::errors::Result;
use crate::core::models::certificate::Certificate;

/// Port for locating X.509 certificates.
pub trait CertificateStore {
    /// Find a certificate by thumbprint in any store.
    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Certificate>;

    /// Resolve a `cert:\Location\Store\Thumbprint` path.
    fn open_path(&self, store_path: &str) -> Result<Certificate>;

    /// Import a certificate file into a store and return its thumbprint.
    fn import(&self, file: &Path, store: &str) -> Result<String>;

    /// List the certificates in one store.
    fn list(&self, store: &str) -> Result<Vec<Certificate>>;

    /// Remove a certificate from every store that holds it.
    /// Returns how many copies were deleted.
    fn remove(&self, thumbprint: &str) -> Result<usize>;
}
