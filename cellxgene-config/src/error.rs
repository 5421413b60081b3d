//! Configuration error types

use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading or writing a configuration file
    #[error("Failed to read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    /// YAML parsing error
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Validation error
    #[error("Invalid configuration: {0}")]
    ValidationError(String),

    /// Domain-specific configuration error
    #[error("Domain configuration error in {domain}: {message}")]
    DomainError { domain: String, message: String },

    /// Option name that is not part of the scope's schema
    #[error("unknown config parameter in {context}: {name}")]
    UnknownOption { context: String, name: String },

    /// Value that does not fit the option's type
    #[error("invalid value in {context}: {message}")]
    InvalidValue { context: String, message: String },

    /// The configuration has not been completed
    #[error("The configuration has not been completed")]
    NotCompleted,

    #[error("dataroot config already exists: {0}")]
    DuplicateDataroot(String),

    #[error("The server__multi_dataset__dataroot must be a dictionary")]
    DatarootNotMapping,

    #[error("The dataroot_tag ({0}) not found in server__multi_dataset__dataroot")]
    DatarootNotFound(String),
}

impl ConfigError {
    pub(crate) fn domain(domain: impl Into<String>, message: impl Into<String>) -> Self {
        ConfigError::DomainError {
            domain: domain.into(),
            message: message.into(),
        }
    }
}
