//! Test helpers: a recording host and on-disk module fixtures.
//!
//! ```ignore
//! let fixture = ModuleFixture::new();
//! fixture.add_module("hello", "return { zoned = function() luna.echo('hi') end }");
//! let host = Rc::new(RecordingHost::default());
//! let mut runtime = Runtime::new(fixture.config(), host.clone());
//! runtime.run("hello")?;
//! runtime.on_zoned();
//! assert_eq!(host.echoes(), vec!["hi"]);
//! ```

use crate::config::{LunaConfig, DEFAULT_ENTRY_SCRIPT};
use crate::host::{Host, HostValue};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A [`Host`] that records every call.
#[derive(Debug, Default)]
pub struct RecordingHost {
    echoes: RefCell<Vec<String>>,
    commands: RefCell<Vec<String>>,
    data: RefCell<HashMap<String, HostValue>>,
}

impl RecordingHost {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers `query` with `value` from now on.
    pub fn set_data(&self, query: &str, value: HostValue) {
        self.data.borrow_mut().insert(query.to_string(), value);
    }

    /// Every echoed line so far.
    #[must_use]
    pub fn echoes(&self) -> Vec<String> {
        self.echoes.borrow().clone()
    }

    /// Every host command so far.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.borrow().clone()
    }

    /// Forgets recorded echoes and commands.
    pub fn clear(&self) {
        self.echoes.borrow_mut().clear();
        self.commands.borrow_mut().clear();
    }
}

impl Host for RecordingHost {
    fn echo(&self, message: &str) {
        self.echoes.borrow_mut().push(message.to_string());
    }

    fn do_command(&self, command: &str) {
        self.commands.borrow_mut().push(command.to_string());
    }

    fn data(&self, query: &str) -> HostValue {
        self.data
            .borrow()
            .get(query)
            .cloned()
            .unwrap_or(HostValue::Nil)
    }
}

/// A temporary modules root.
///
/// The directory is removed when the fixture is dropped.
#[derive(Debug)]
pub struct ModuleFixture {
    dir: TempDir,
}

impl ModuleFixture {
    /// Creates an empty modules root.
    ///
    /// # Panics
    ///
    /// If a temporary directory can't be created.
    #[must_use]
    pub fn new() -> Self {
        #[allow(clippy::expect_used)]
        let dir = TempDir::new().expect("create temporary modules root");
        Self { dir }
    }

    /// Modules root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `<root>/<name>/module.lua`.
    ///
    /// # Panics
    ///
    /// If the file can't be written.
    pub fn add_module(&self, name: &str, script: &str) -> PathBuf {
        self.write(&[name, DEFAULT_ENTRY_SCRIPT], script)
    }

    /// Writes `<root>/<module>/lib/<file>`.
    ///
    /// # Panics
    ///
    /// If the file can't be written.
    pub fn add_lib(&self, module: &str, file: &str, source: &str) -> PathBuf {
        self.write(&[module, "lib", file], source)
    }

    /// Writes `<root>/lib/<file>`.
    ///
    /// # Panics
    ///
    /// If the file can't be written.
    pub fn add_shared_lib(&self, file: &str, source: &str) -> PathBuf {
        self.write(&["lib", file], source)
    }

    /// Writes `<root>/<relative>` with arbitrary content.
    ///
    /// # Panics
    ///
    /// If the file can't be written.
    pub fn add_file(&self, relative: &str, content: &str) -> PathBuf {
        self.write(&[relative], content)
    }

    /// Default config rooted at this fixture.
    #[must_use]
    pub fn config(&self) -> LunaConfig {
        LunaConfig::with_modules_dir(self.root())
    }

    #[allow(clippy::expect_used)]
    fn write(&self, parts: &[&str], content: &str) -> PathBuf {
        let path = parts
            .iter()
            .fold(self.root().to_path_buf(), |acc, part| acc.join(part));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }
        std::fs::write(&path, content).expect("write fixture file");
        path
    }
}

impl Default for ModuleFixture {
    fn default() -> Self {
        Self::new()
    }
}
