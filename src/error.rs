//! Error types for drivehouse.
//!
//! Hard failures (configuration, authentication, listing, join sources) are
//! reported through [`WarehouseError`]. Files that simply cannot be turned
//! into a table are not errors; see [`crate::TableLoad`].

use thiserror::Error;

/// The primary error type for warehouse operations.
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Missing or invalid configuration (folder id, credentials path)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Credentials could not be loaded or were rejected
    #[error("Authentication error: {message}")]
    Authentication { message: String },

    /// Failure reported by the remote store
    #[error("Gateway error: {message}")]
    Gateway { message: String },

    /// Column missing or of an unexpected type
    #[error("Schema error: {message}")]
    Schema { message: String },

    /// A join could not be performed
    #[error("Join error: {message}")]
    Join { message: String },

    /// Invalid argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    /// Arrow error
    #[error("Arrow error: {message}")]
    Arrow { message: String },

    /// JSON error
    #[error("JSON error: {message}")]
    Json { message: String },

    /// Internal error (bug in the warehouse)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl WarehouseError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an authentication error.
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    /// Create a gateway error.
    pub fn gateway(message: impl Into<String>) -> Self {
        Self::Gateway {
            message: message.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    /// Create a join error.
    pub fn join(message: impl Into<String>) -> Self {
        Self::Join {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<arrow::error::ArrowError> for WarehouseError {
    fn from(err: arrow::error::ArrowError) -> Self {
        Self::Arrow {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for WarehouseError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(err: reqwest::Error) -> Self {
        Self::Gateway {
            message: err.to_string(),
        }
    }
}

/// Result type alias for warehouse operations.
pub type Result<T> = std::result::Result<T, WarehouseError>;
