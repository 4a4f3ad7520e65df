use crate::vault::VaultError;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("error on {path}: {source}")]
    Vault {
        path: String,
        #[source]
        source: VaultError,
    },

    #[error("invalid configuration: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("missing required field {0:?}")]
    MissingField(String),

    #[error("{feature} requires Vault {required} or newer, server is {actual}")]
    UnsupportedVersion {
        feature: String,
        required: String,
        actual: String,
    },

    #[error("unknown resource type {0:?}")]
    UnknownResourceType(String),

    #[error("invalid ID {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    #[error("unexpected response from {path}: {reason}")]
    UnexpectedResponse { path: String, reason: String },

    #[error(transparent)]
    Client(#[from] VaultError),
}

impl ProviderError {
    /// Wraps a client failure with the path that was being accessed.
    pub fn vault(path: impl Into<String>, source: VaultError) -> Self {
        ProviderError::Vault {
            path: path.into(),
            source,
        }
    }

    pub fn unexpected(path: impl Into<String>, reason: impl Into<String>) -> Self {
        ProviderError::UnexpectedResponse {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// `map_err` helper: `client.read(&path).await.map_err(on(&path))?`.
pub fn on(path: &str) -> impl FnOnce(VaultError) -> ProviderError + '_ {
    move |source| ProviderError::vault(path, source)
}
