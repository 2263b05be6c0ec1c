pub mod service;
pub mod token_issuer;
pub mod token_validator;

pub use service::ServiceError;
pub use token_validator::{ScanMetadata, ScanOutcome};
