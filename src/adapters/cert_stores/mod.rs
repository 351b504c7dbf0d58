pub mod directory_store;
pub mod pem_loader;
