use pricewatch_core::{ServiceError, StoreError, ValidationError, VaultError, WarehouseError};
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("command error: {0}")]
    Command(String),

    #[error("{}: {source}", .source.code())]
    Service {
        #[from]
        source: ServiceError,
    },

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for CliError {
    fn from(error: StoreError) -> Self {
        Self::from(ServiceError::from(error))
    }
}

impl From<VaultError> for CliError {
    fn from(error: VaultError) -> Self {
        Self::from(ServiceError::from(error))
    }
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_) | Self::Command(_) => 2,
            Self::Service {
                source: ServiceError::Store(StoreError::Validation(_)),
            } => 2,
            Self::Service {
                source: ServiceError::Vault(_),
            } => 6,
            Self::Service { .. } | Self::Warehouse(_) => 7,
            Self::Serialization(_) => 4,
            Self::Io(_) => 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vault_failures_have_their_own_exit_code() {
        let error = CliError::from(VaultError::WrongPassword);
        assert_eq!(error.exit_code(), 6);
        assert!(error.to_string().starts_with("vault.wrong_password"));
    }

    #[test]
    fn store_validation_maps_to_usage_code() {
        let error = CliError::from(StoreError::from(ValidationError::EmptySymbol));
        assert_eq!(error.exit_code(), 2);
    }
}
