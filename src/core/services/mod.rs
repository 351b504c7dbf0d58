pub mod key_generator;
pub mod key_resolver;
pub mod protection_service;
