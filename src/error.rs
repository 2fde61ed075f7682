use thiserror::Error;

/// Errors raised while parsing or evaluating a rule condition expression
///
/// These never propagate out of alert evaluation: the engine logs them and
/// treats the offending rule as not matched for the cycle.
#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Failed to parse condition at offset {offset}: {message}")]
    Parse { offset: usize, message: String },

    #[error("Unknown identifier in condition: {0}")]
    UnknownIdentifier(String),

    #[error("No trend supplied but condition references {0}")]
    TrendUnavailable(String),

    #[error("Type mismatch: {operation} not supported between {left} and {right}")]
    TypeMismatch {
        operation: String,
        left: String,
        right: String,
    },

    #[error("Condition evaluated to {0}, expected a boolean")]
    NotBoolean(String),
}

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Invalid configuration value: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),
}
