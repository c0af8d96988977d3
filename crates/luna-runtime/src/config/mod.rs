//! Runtime configuration with layered loading.
//!
//! ```text
//! Priority (highest to lowest):
//!
//! ┌──────────────────────────────────────────────┐
//! │  1. Caller overrides (CLI flags)              │
//! ├──────────────────────────────────────────────┤
//! │  2. Environment variables (LUNA_*)            │
//! ├──────────────────────────────────────────────┤
//! │  3. Config script (<modules>/luna_config.lua) │
//! ├──────────────────────────────────────────────┤
//! │  4. Default values (compile-time)             │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! # Config script
//!
//! ```lua
//! -- luna/luna_config.lua
//! debug = true
//! event_matching = "lazy"
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Config Field | Type |
//! |----------|--------------|------|
//! | `LUNA_DEBUG` | `debug` | bool |
//! | `LUNA_MODULES_DIR` | `modules_dir` | PathBuf |
//! | `LUNA_EVENT_MATCHING` | `event_matching` | `eager` / `lazy` |

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::{ConfigLoader, CONFIG_SCRIPT};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default modules root, relative to the working directory.
pub const DEFAULT_MODULES_DIR: &str = "luna";

/// Default per-module entry script.
pub const DEFAULT_ENTRY_SCRIPT: &str = "module.lua";

/// When incoming chat lines are matched against event patterns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventMatching {
    /// Test on receipt; queue only lines some module matches.
    #[default]
    Eager,
    /// Queue every line; match when the queue drains.
    Lazy,
}

impl EventMatching {
    /// Parses `eager` / `lazy` (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "eager" => Some(Self::Eager),
            "lazy" => Some(Self::Lazy),
            _ => None,
        }
    }
}

/// Runtime configuration after all layers are merged.
///
/// # Example
///
/// ```
/// use luna_runtime::config::LunaConfig;
///
/// let config = LunaConfig::default();
/// assert!(!config.debug);
/// assert_eq!(config.entry_script, "module.lua");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LunaConfig {
    /// Verbose diagnostic logging.
    pub debug: bool,
    /// Directory holding one subdirectory per module.
    pub modules_dir: PathBuf,
    /// Entry script looked up inside each module directory.
    pub entry_script: String,
    /// Event-line matching policy for host chat lines.
    pub event_matching: EventMatching,
}

impl Default for LunaConfig {
    fn default() -> Self {
        Self {
            debug: false,
            modules_dir: PathBuf::from(DEFAULT_MODULES_DIR),
            entry_script: DEFAULT_ENTRY_SCRIPT.to_string(),
            event_matching: EventMatching::default(),
        }
    }
}

impl LunaConfig {
    /// Creates a config rooted at `modules_dir` with defaults elsewhere.
    #[must_use]
    pub fn with_modules_dir(modules_dir: impl Into<PathBuf>) -> Self {
        Self {
            modules_dir: modules_dir.into(),
            ..Self::default()
        }
    }

    /// Overlays the fields present in `overlay`.
    pub fn merge(&mut self, overlay: &ConfigOverlay) {
        if let Some(debug) = overlay.debug {
            self.debug = debug;
        }
        if let Some(ref entry) = overlay.entry_script {
            self.entry_script.clone_from(entry);
        }
        if let Some(matching) = overlay.event_matching {
            self.event_matching = matching;
        }
    }
}

/// Fields a config script may set. Absent fields keep the lower layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConfigOverlay {
    pub debug: Option<bool>,
    pub entry_script: Option<String>,
    pub event_matching: Option<EventMatching>,
}
