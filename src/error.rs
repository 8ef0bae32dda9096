//! Error types for Rustadmin.

use thiserror::Error;

/// Errors raised while declaring, constructing or resolving resources.
#[derive(Error, Debug, Clone)]
pub enum ResourceError {
    /// Resource instances must carry a non-empty name
    #[error("{type_name} resource requires a name")]
    MissingName { type_name: String },

    /// Attribute key has no matching setter on the resource type
    #[error("invalid attribute for {type_name}: {attribute}")]
    InvalidAttribute {
        type_name: String,
        attribute: String,
    },

    /// Name collision within one scope for one type
    #[error("duplicate {type_name} resource {name:?} in {scope}")]
    DuplicateResource {
        type_name: String,
        name: String,
        scope: String,
    },

    /// Referenced provider name is not registered for the type
    #[error("no such provider for {type_name}: {provider}")]
    UnknownProvider { type_name: String, provider: String },

    /// Unrecognized option passed to a provider declaration
    #[error("invalid provider option(s): {0}")]
    InvalidProviderOption(String),

    /// Unrecognized option passed to a pattern declaration
    #[error("invalid pattern option(s): {0}")]
    InvalidPatternOption(String),

    /// Pattern source failed to compile
    #[error("invalid pattern {pattern}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A pattern generator returned a resource of the wrong type
    #[error("resource returned for pattern {pattern} is not a {expected}: {actual}")]
    PatternResultTypeMismatch {
        pattern: String,
        expected: String,
        actual: String,
    },

    /// Fail-fast lookup found nothing
    #[error("{type_name} resource not found: {name}")]
    ResourceNotFound { type_name: String, name: String },

    /// Provider-related errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Errors that can occur in provider operations.
#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    /// Neither the resource nor its provider implements the operation
    #[error("{target} does not support operation: {operation}")]
    UnsupportedOperation { target: String, operation: String },

    /// Operation was called with arguments it cannot use
    #[error("invalid argument for {operation}: {message}")]
    InvalidArgument { operation: String, message: String },

    /// The resource a provider is bound to no longer exists
    #[error("resource released: {0}")]
    ResourceReleased(String),

    /// Provider execution failed
    #[error("Provider execution failed: {0}")]
    ExecutionFailed(String),

    /// Provider initialization failed
    #[error("Provider initialization failed: {0}")]
    InitializationFailed(String),

    /// Provider configuration error
    #[error("Provider configuration error: {0}")]
    ConfigurationError(String),

    /// IO error during provider operation
    #[error("IO error: {0}")]
    IoError(String),

    /// Timeout during provider operation
    #[error("Operation timed out after {0}ms")]
    Timeout(u64),
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        ProviderError::IoError(err.to_string())
    }
}

impl From<String> for ProviderError {
    fn from(msg: String) -> Self {
        ProviderError::ExecutionFailed(msg)
    }
}

impl From<&str> for ProviderError {
    fn from(msg: &str) -> Self {
        ProviderError::ExecutionFailed(msg.to_string())
    }
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Result type alias for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
