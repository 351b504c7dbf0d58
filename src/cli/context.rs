use crate::adapters::cert_stores::directory_store::DirectoryCertStore;
use crate::adapters::key_stores::credential_store::CredentialKeyStore;
use crate::adapters::key_stores::file_scope_store::FileScopeKeyStore;
use crate::config::app_config::{AppConfig, Provider};
use crate::core::errors::{Result, ScopeSealError};
use crate::core::services::key_resolver::KeyResolver;
use crate::core::services::protection_service::ProtectionService;
use crate::core::traits::key_store::{CredentialKeyResolver, ScopeKeyStore};

/// Loaded configuration plus constructors for the stores it points at.
pub struct Context {
    pub config: AppConfig,
}

impl Context {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    pub fn cert_store(&self) -> DirectoryCertStore {
        DirectoryCertStore::new(self.config.store_root())
    }

    /// The enrolled-user keystore. Only the file provider uses one.
    pub fn credential_store(&self) -> Result<CredentialKeyStore> {
        if self.config.keystore.provider() != Provider::File {
            return Err(ScopeSealError::InvalidConfig {
                detail: "user enrollment only applies to keystore.provider = \"file\"; \
                         the dpapi provider logs users on directly"
                    .into(),
            });
        }
        Ok(self.enrolled_users())
    }

    pub fn protection_service(&self) -> ProtectionService {
        let (scopes, credentials) = self.key_stores();
        ProtectionService::new(KeyResolver::new(
            scopes,
            credentials,
            Box::new(self.cert_store()),
        ))
    }

    fn enrolled_users(&self) -> CredentialKeyStore {
        CredentialKeyStore::new(self.config.users_dir())
            .with_iterations(self.config.keystore.kdf_iterations)
    }

    fn key_stores(&self) -> (Box<dyn ScopeKeyStore>, Box<dyn CredentialKeyResolver>) {
        match self.config.keystore.provider() {
            #[cfg(windows)]
            Provider::Dpapi => {
                use crate::adapters::key_stores::windows_key_store::WindowsKeyStore;
                let scopes: Box<dyn ScopeKeyStore> = Box::new(WindowsKeyStore);
                let credentials: Box<dyn CredentialKeyResolver> = Box::new(WindowsKeyStore);
                (scopes, credentials)
            }
            // Rejected while loading the config on other platforms.
            #[cfg(not(windows))]
            Provider::Dpapi => self.file_key_stores(),
            Provider::File => self.file_key_stores(),
        }
    }

    fn file_key_stores(&self) -> (Box<dyn ScopeKeyStore>, Box<dyn CredentialKeyResolver>) {
        (
            Box::new(FileScopeKeyStore::new(
                self.config.user_dir(),
                self.config.machine_dir(),
            )),
            Box::new(self.enrolled_users()),
        )
    }
}
