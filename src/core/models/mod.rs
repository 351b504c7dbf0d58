pub mod certificate;
pub mod key_source;
pub mod protection_request;
