//! Named hooks a module may export from its entry script.

use mlua::{Function, Lua, RegistryKey, Table, Value};
use std::collections::BTreeMap;
use std::fmt;

/// The fixed set of hook names recognized in a module's returned table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HookKind {
    Pulse,
    Zoned,
    Clean,
    Reload,
    Draw,
    GamestateChanged,
    WriteChat,
    IncomingChat,
    BeginZone,
    EndZone,
    AtExit,
}

impl HookKind {
    /// Every hook, in capture order.
    pub const ALL: [HookKind; 11] = [
        Self::Pulse,
        Self::Zoned,
        Self::Clean,
        Self::Reload,
        Self::Draw,
        Self::GamestateChanged,
        Self::WriteChat,
        Self::IncomingChat,
        Self::BeginZone,
        Self::EndZone,
        Self::AtExit,
    ];

    /// Field name in the module table.
    #[must_use]
    pub fn field_name(self) -> &'static str {
        match self {
            Self::Pulse => "pulse",
            Self::Zoned => "zoned",
            Self::Clean => "clean",
            Self::Reload => "reload",
            Self::Draw => "draw",
            Self::GamestateChanged => "gamestate_changed",
            Self::WriteChat => "write_chat",
            Self::IncomingChat => "incoming_chat",
            Self::BeginZone => "begin_zone",
            Self::EndZone => "end_zone",
            Self::AtExit => "at_exit",
        }
    }
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field_name())
    }
}

/// Hook callables captured from a module table.
///
/// Each handle lives in the owning interpreter's registry and is released
/// with it. Absent names have no entry and are skipped by every dispatch.
#[derive(Debug, Default)]
pub struct Hooks {
    keys: BTreeMap<HookKind, RegistryKey>,
}

impl Hooks {
    /// Captures every recognized hook present in `table`.
    ///
    /// Fields holding something other than a function are ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if reading the table or storing a reference fails.
    pub fn capture(lua: &Lua, table: &Table) -> mlua::Result<Self> {
        let mut keys = BTreeMap::new();
        for kind in HookKind::ALL {
            match table.get::<Value>(kind.field_name())? {
                Value::Function(f) => {
                    keys.insert(kind, lua.create_registry_value(f)?);
                }
                Value::Nil => {}
                other => {
                    tracing::debug!(
                        hook = %kind,
                        found = other.type_name(),
                        "hook field is not a function, ignoring"
                    );
                }
            }
        }
        Ok(Self { keys })
    }

    /// Returns `true` if the module exports `kind`.
    #[must_use]
    pub fn has(&self, kind: HookKind) -> bool {
        self.keys.contains_key(&kind)
    }

    /// Resolves the hook to a callable.
    ///
    /// `Ok(None)` means the module does not export it.
    ///
    /// # Errors
    ///
    /// The stored reference no longer resolves to a function.
    pub fn resolve(&self, lua: &Lua, kind: HookKind) -> mlua::Result<Option<Function>> {
        self.keys
            .get(&kind)
            .map(|key| lua.registry_value::<Function>(key))
            .transpose()
    }

    /// Names of the exported hooks.
    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.keys.keys().map(|k| k.field_name()).collect()
    }
}
