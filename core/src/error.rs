//! Error types for Monte Carlo localization

use thiserror::Error;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum MclError {
    /// Bad input rejected at the boundary of the call that received it.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The weight vector carries no usable mass (empty wheel or all weights zero).
    /// Signals that localization has diverged; recovery is left to the caller.
    #[error("Degenerate weights: {0}")]
    DegenerateWeights(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<serde_json::Error> for MclError {
    fn from(e: serde_json::Error) -> Self {
        MclError::Config(e.to_string())
    }
}

impl From<serde_yaml::Error> for MclError {
    fn from(e: serde_yaml::Error) -> Self {
        MclError::Config(e.to_string())
    }
}

impl From<toml::de::Error> for MclError {
    fn from(e: toml::de::Error) -> Self {
        MclError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for MclError {
    fn from(e: toml::ser::Error) -> Self {
        MclError::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MclError>;
