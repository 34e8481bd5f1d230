//! Error handling for modflow
//!
//! This module defines the crate-level error type and a Result alias.
//! Connector protocol failures live in [`crate::kernel::ConnectorError`] and
//! convert into [`KernelError`] through `?`.

use crate::kernel::error::ConnectorError;
use thiserror::Error;

/// Main error type for modflow operations
#[derive(Error, Debug)]
pub enum KernelError {
    /// Errors raised by the connector protocol
    #[error("Connector error: {0}")]
    Connector(#[from] ConnectorError),

    /// A module does not provide the requested connector
    #[error("The connector \"{connector}\" does not exist in the module \"{module}\"")]
    ConnectorNotFound { module: String, connector: String },

    /// Connector names must be unique within a module
    #[error("Could not add the connector {0} since names must be unique")]
    NameNotUnique(String),

    /// A container does not hold the requested module
    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    /// The module already belongs to a container
    #[error("Module {module} is already associated with container {container}")]
    ModuleAlreadyAssociated { module: String, container: String },

    /// No input filter of a data module accepts the given input
    #[error("Module {module} does not accept input {input}")]
    UnsupportedInput { module: String, input: String },

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<KernelError>,
    },
}

impl KernelError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        KernelError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The connector error at the root of this error, if any
    pub fn as_connector_error(&self) -> Option<&ConnectorError> {
        match self {
            KernelError::Connector(e) => Some(e),
            KernelError::WithContext { source, .. } => source.as_connector_error(),
            _ => None,
        }
    }
}

/// Result type alias for modflow operations
pub type Result<T> = std::result::Result<T, KernelError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, ConnectorError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| KernelError::from(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| KernelError::from(e).with_context(f()))
    }
}
