//! Error types for module runtime operations.

use crate::bindings::BindError;
use crate::config::ConfigError;
use crate::events::EventError;
use thiserror::Error;

/// Errors that can occur while loading or driving modules.
#[derive(Debug, Error)]
pub enum LunaError {
    /// Lua runtime error.
    #[error("lua error: {0}")]
    Lua(#[from] mlua::Error),

    /// Module directory not found under the modules root.
    #[error("module {0} either doesn't exist or is invalid")]
    ModuleNotFound(String),

    /// Module directory exists but has no entry script.
    #[error("module {name} requires a {entry}")]
    MissingEntry {
        /// Module name.
        name: String,
        /// Expected entry script file name.
        entry: String,
    },

    /// Module name is not a single path component.
    #[error("invalid module name: {0:?}")]
    InvalidModuleName(String),

    /// Entry script ran but did not produce a hook table.
    #[error("invalid script: {0}")]
    InvalidScript(String),

    /// Command binding rejected.
    #[error(transparent)]
    Bind(#[from] BindError),

    /// Event pattern rejected.
    #[error(transparent)]
    Event(#[from] EventError),

    /// Configuration failed to load.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl LunaError {
    /// Converts into an error raised back into the calling script.
    pub(crate) fn into_lua(self) -> mlua::Error {
        match self {
            Self::Lua(e) => e,
            other => mlua::Error::RuntimeError(other.to_string()),
        }
    }
}
