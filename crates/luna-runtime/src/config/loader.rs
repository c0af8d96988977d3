//! Configuration loader with layered merging.
//!
//! # Load Order
//!
//! 1. Default values (compile-time)
//! 2. Config script (`<modules_dir>/luna_config.lua`)
//! 3. Environment variables (`LUNA_*`)
//!
//! Each layer overrides the previous. The modules directory itself is
//! resolved first (explicit > `LUNA_MODULES_DIR` > default) because the
//! config script lives inside it.

use super::{ConfigError, ConfigOverlay, EventMatching, LunaConfig};
use mlua::{Lua, LuaSerdeExt, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config script file name inside the modules root.
pub const CONFIG_SCRIPT: &str = "luna_config.lua";

/// Globals read from the config script.
const SCRIPT_FIELDS: [&str; 3] = ["debug", "entry_script", "event_matching"];

/// Helper macro for parsing boolean environment variables.
macro_rules! parse_env_bool {
    ($field:expr, $var:literal) => {
        if let Ok(val) = std::env::var($var) {
            $field = parse_bool(&val)
                .ok_or_else(|| ConfigError::invalid_env_var($var, "expected bool"))?;
        }
    };
}

/// Configuration loader with builder pattern.
///
/// # Example
///
/// ```ignore
/// use luna_runtime::config::ConfigLoader;
///
/// let config = ConfigLoader::new()
///     .with_modules_dir("/opt/host/luna")
///     .skip_env_vars()  // For testing
///     .load()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    /// Explicit modules root; beats `LUNA_MODULES_DIR`.
    modules_dir: Option<PathBuf>,

    /// Skip environment variable loading.
    skip_env: bool,

    /// Skip the config script.
    skip_script: bool,
}

impl ConfigLoader {
    /// Creates a new loader with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the modules root.
    #[must_use]
    pub fn with_modules_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.modules_dir = Some(path.into());
        self
    }

    /// Skips environment variable loading.
    ///
    /// Useful for testing with deterministic config.
    #[must_use]
    pub fn skip_env_vars(mut self) -> Self {
        self.skip_env = true;
        self
    }

    /// Skips the config script.
    #[must_use]
    pub fn skip_config_script(mut self) -> Self {
        self.skip_script = true;
        self
    }

    /// Loads and merges configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config script exists but fails to run
    /// or sets a field to the wrong type, or if an environment variable is
    /// malformed. A missing config script is not an error.
    pub fn load(&self) -> Result<LunaConfig, ConfigError> {
        let mut config = LunaConfig::default();

        if let Some(ref dir) = self.modules_dir {
            config.modules_dir.clone_from(dir);
        } else if !self.skip_env {
            if let Ok(dir) = std::env::var("LUNA_MODULES_DIR") {
                config.modules_dir = PathBuf::from(dir);
            }
        }

        if !self.skip_script {
            let script_path = config.modules_dir.join(CONFIG_SCRIPT);
            if let Some(overlay) = load_script(&script_path)? {
                debug!(path = %script_path.display(), "Loaded config script");
                config.merge(&overlay);
            }
        }

        if !self.skip_env {
            apply_env_vars(&mut config)?;
        }

        Ok(config)
    }
}

/// Runs a config script in a throwaway interpreter and reads its globals.
///
/// Returns `None` if the file doesn't exist.
fn load_script(path: &Path) -> Result<Option<ConfigOverlay>, ConfigError> {
    if !path.is_file() {
        return Ok(None);
    }
    let source = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    let lua = Lua::new();
    lua.load(source.as_str())
        .set_name(format!("@{}", path.display()))
        .exec()
        .map_err(|e| ConfigError::evaluate(path, e))?;

    let picked = lua
        .create_table()
        .map_err(|e| ConfigError::evaluate(path, e))?;
    let globals = lua.globals();
    for field in SCRIPT_FIELDS {
        let value: Value = globals
            .get(field)
            .map_err(|e| ConfigError::evaluate(path, e))?;
        // `debug` shadows the standard library table; only a boolean counts.
        if field == "debug" && !matches!(value, Value::Boolean(_)) {
            continue;
        }
        picked
            .set(field, value)
            .map_err(|e| ConfigError::evaluate(path, e))?;
    }

    let overlay: ConfigOverlay = lua
        .from_value(Value::Table(picked))
        .map_err(|e| ConfigError::deserialize(path, e))?;
    Ok(Some(overlay))
}

/// Applies environment variable overrides.
fn apply_env_vars(config: &mut LunaConfig) -> Result<(), ConfigError> {
    parse_env_bool!(config.debug, "LUNA_DEBUG");

    if let Ok(val) = std::env::var("LUNA_EVENT_MATCHING") {
        config.event_matching = EventMatching::parse(&val).ok_or_else(|| {
            ConfigError::invalid_env_var("LUNA_EVENT_MATCHING", "expected eager or lazy")
        })?;
    }

    Ok(())
}

/// Parses a boolean from string.
///
/// Accepts: "true", "false", "1", "0", "yes", "no", "on", "off" (case-insensitive).
fn parse_bool(s: &str) -> Option<bool> {
    match s.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_script(dir: &Path, content: &str) {
        std::fs::write(dir.join(CONFIG_SCRIPT), content).expect("write config script");
    }

    #[test]
    fn load_defaults_only() {
        let config = ConfigLoader::new()
            .skip_config_script()
            .skip_env_vars()
            .load()
            .expect("defaults");

        assert_eq!(config, LunaConfig::default());
    }

    #[test]
    fn missing_script_is_ok() {
        let temp = TempDir::new().expect("tempdir");
        let config = ConfigLoader::new()
            .with_modules_dir(temp.path())
            .skip_env_vars()
            .load()
            .expect("no script");

        assert!(!config.debug);
        assert_eq!(config.modules_dir, temp.path());
    }

    #[test]
    fn script_sets_debug_and_matching() {
        let temp = TempDir::new().expect("tempdir");
        write_script(
            temp.path(),
            r#"
debug = true
event_matching = "lazy"
"#,
        );

        let config = ConfigLoader::new()
            .with_modules_dir(temp.path())
            .skip_env_vars()
            .load()
            .expect("load");

        assert!(config.debug);
        assert_eq!(config.event_matching, EventMatching::Lazy);
        assert_eq!(config.entry_script, "module.lua");
    }

    #[test]
    fn non_boolean_debug_is_ignored() {
        let temp = TempDir::new().expect("tempdir");
        write_script(temp.path(), r#"debug = "yes please""#);

        let config = ConfigLoader::new()
            .with_modules_dir(temp.path())
            .skip_env_vars()
            .load()
            .expect("load");

        assert!(!config.debug);
    }

    #[test]
    fn failing_script_is_an_error() {
        let temp = TempDir::new().expect("tempdir");
        write_script(temp.path(), "error('nope')");

        let err = ConfigLoader::new()
            .with_modules_dir(temp.path())
            .skip_env_vars()
            .load()
            .expect_err("script error");

        assert!(matches!(err, ConfigError::Evaluate { .. }));
    }

    #[test]
    fn wrong_type_is_a_deserialize_error() {
        let temp = TempDir::new().expect("tempdir");
        write_script(temp.path(), r#"event_matching = "sometimes""#);

        let err = ConfigLoader::new()
            .with_modules_dir(temp.path())
            .skip_env_vars()
            .load()
            .expect_err("bad enum value");

        assert!(matches!(err, ConfigError::Deserialize { .. }));
    }

    #[test]
    fn parse_bool_values() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("1"), Some(true));
        assert_eq!(parse_bool("yes"), Some(true));
        assert_eq!(parse_bool("on"), Some(true));

        assert_eq!(parse_bool("false"), Some(false));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("no"), Some(false));
        assert_eq!(parse_bool("off"), Some(false));

        assert_eq!(parse_bool("invalid"), None);
    }
}
