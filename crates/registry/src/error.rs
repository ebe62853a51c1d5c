//! Error taxonomy for registry operations.

use fleet_core::CoreError;
use thiserror::Error;

/// Registry error type.
///
/// Client errors (`MalformedPayload`, `Validation`, `MissingCountry`) are raised before
/// the store is touched; `NotFound` is a condition, not a failure; `Store` wraps any
/// storage failure with the operation that hit it.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// Heartbeat body is not valid JSON or lacks a required field.
    #[error("Malformed heartbeat payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// Heartbeat parsed but failed validation.
    #[error(transparent)]
    Validation(#[from] CoreError),

    /// Country filter was missing or blank.
    #[error("country parameter required")]
    MissingCountry,

    /// The live set is empty where one node was required.
    #[error("no nodes available")]
    NotFound,

    /// Underlying storage failure.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl RegistryError {
    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            RegistryError::MalformedPayload(_)
                | RegistryError::Validation(_)
                | RegistryError::MissingCountry
        )
    }
}

/// Result type alias for RegistryError.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_classification() {
        assert!(RegistryError::MissingCountry.is_client_error());
        assert!(RegistryError::Validation(CoreError::EmptyIp).is_client_error());
        assert!(!RegistryError::NotFound.is_client_error());
        assert!(!RegistryError::Store(anyhow::anyhow!("disk full")).is_client_error());
    }

    #[test]
    fn test_store_error_keeps_context() {
        let err: RegistryError = anyhow::anyhow!("locked")
            .context("Failed to upsert node 1.2.3.4:1080")
            .into();
        assert_eq!(err.to_string(), "Failed to upsert node 1.2.3.4:1080");
    }
}
