//! Module discovery under the modules root.
//!
//! A module is a directory `<root>/<name>/` holding the entry script
//! (`module.lua` by default). Shared libraries may live in `<root>/lib/`
//! and per-module ones in `<root>/<name>/lib/`.

use crate::error::LunaError;
use std::path::{Component, Path, PathBuf};

/// Resolved on-disk locations for one module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModulePaths {
    /// Modules root.
    pub root: PathBuf,
    /// Module directory.
    pub dir: PathBuf,
    /// Entry script.
    pub entry: PathBuf,
}

impl ModulePaths {
    /// `package.path` value for this module's interpreter.
    #[must_use]
    pub fn search_path(&self) -> String {
        let dir = self.dir.display();
        let root = self.root.display();
        [
            format!("{dir}/?.lua"),
            format!("{dir}/lib/?.lua"),
            format!("{dir}/lib/?/init.lua"),
            format!("{root}/lib/?.lua"),
            format!("{root}/lib/?/init.lua"),
        ]
        .join(";")
    }
}

/// Finds modules under a root directory.
#[derive(Debug, Clone)]
pub struct ModuleLoader {
    root: PathBuf,
    entry_script: String,
}

impl ModuleLoader {
    /// Creates a loader for `root` whose modules use `entry_script`.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>, entry_script: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            entry_script: entry_script.into(),
        }
    }

    /// Modules root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a module name to its directory and entry script.
    ///
    /// # Errors
    ///
    /// - [`LunaError::InvalidModuleName`] unless `name` is one normal path component
    /// - [`LunaError::ModuleNotFound`] if the directory doesn't exist
    /// - [`LunaError::MissingEntry`] if the entry script is absent
    pub fn resolve(&self, name: &str) -> Result<ModulePaths, LunaError> {
        validate_module_name(name)?;

        let dir = self.root.join(name);
        if !dir.is_dir() {
            return Err(LunaError::ModuleNotFound(name.to_string()));
        }
        let entry = dir.join(&self.entry_script);
        if !entry.is_file() {
            return Err(LunaError::MissingEntry {
                name: name.to_string(),
                entry: self.entry_script.clone(),
            });
        }

        Ok(ModulePaths {
            root: self.root.clone(),
            dir,
            entry,
        })
    }

    /// Lists module names (directories holding the entry script), sorted.
    ///
    /// An unreadable root yields an empty list.
    #[must_use]
    pub fn list_available(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.root) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir() && path.join(&self.entry_script).is_file())
            .filter_map(|path| {
                path.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
            })
            .collect();
        names.sort();
        names
    }
}

/// Accepts exactly one normal path component.
fn validate_module_name(name: &str) -> Result<(), LunaError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(part)), None) if part == name => Ok(()),
        _ => Err(LunaError::InvalidModuleName(name.to_string())),
    }
}
