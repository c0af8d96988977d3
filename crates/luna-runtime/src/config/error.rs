//! Configuration errors.

use std::path::PathBuf;
use thiserror::Error;

/// Configuration error type.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config script.
    #[error("failed to read config script '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config script raised an error.
    #[error("error loading config script '{path}': {source}")]
    Evaluate {
        path: PathBuf,
        #[source]
        source: mlua::Error,
    },

    /// A config global had the wrong type.
    #[error("invalid value in config script '{path}': {source}")]
    Deserialize {
        path: PathBuf,
        #[source]
        source: mlua::Error,
    },

    /// Invalid environment variable value.
    #[error("invalid value for environment variable '{name}': {message}")]
    InvalidEnvVar { name: String, message: String },
}

impl ConfigError {
    /// Creates a read file error.
    pub fn read_file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFile {
            path: path.into(),
            source,
        }
    }

    /// Creates a script evaluation error.
    pub fn evaluate(path: impl Into<PathBuf>, source: mlua::Error) -> Self {
        Self::Evaluate {
            path: path.into(),
            source,
        }
    }

    /// Creates a deserialization error.
    pub fn deserialize(path: impl Into<PathBuf>, source: mlua::Error) -> Self {
        Self::Deserialize {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid env var error.
    pub fn invalid_env_var(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidEnvVar {
            name: name.into(),
            message: message.into(),
        }
    }
}
