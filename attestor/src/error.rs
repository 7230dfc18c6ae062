// Re-export common error types for the attestor crate
pub use iid_attestor_common::{AttestorError, Result};
