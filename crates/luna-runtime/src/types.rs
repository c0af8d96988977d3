//! Small shared types: module identity, lifecycle state, host game state.

use std::fmt;

/// Identity of one loaded module instance.
///
/// Allocated by the [`Runtime`](crate::Runtime) at load time and never
/// reused, so a binding owned by a stopped module can never be mistaken for
/// one owned by a later module with the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(u64);

impl ModuleId {
    /// Wraps a raw id.
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw id.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleState {
    /// Entry script is executing; hooks not yet captured.
    Loading,
    /// Pulsed every tick.
    Running,
    /// Skipped by the pulse phase; other hooks still fire.
    Paused,
    /// Marked for teardown at the next tick.
    Exiting,
    /// `at_exit` has fired and the interpreter is being released.
    Closed,
}

impl ModuleState {
    /// Returns the lowercase name used in logs and `info` output.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loading => "loading",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Exiting => "exiting",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ModuleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host game state, passed to the `gamestate_changed` hook as its code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameState {
    CharSelect,
    CharCreate,
    Something,
    InGame,
    PreCharSelect,
    PostFrontLoad,
    LoggingIn,
    Unloading,
    /// A code the runtime does not know about.
    Other(u32),
}

impl GameState {
    /// Returns the host's numeric code for this state.
    #[must_use]
    pub fn code(self) -> u32 {
        match self {
            Self::CharSelect => 1,
            Self::CharCreate => 2,
            Self::Something => 4,
            Self::InGame => 5,
            Self::PreCharSelect => u32::MAX,
            Self::PostFrontLoad => 500,
            Self::LoggingIn => 253,
            Self::Unloading => 255,
            Self::Other(code) => code,
        }
    }
}

impl From<u32> for GameState {
    fn from(code: u32) -> Self {
        match code {
            1 => Self::CharSelect,
            2 => Self::CharCreate,
            4 => Self::Something,
            5 => Self::InGame,
            u32::MAX => Self::PreCharSelect,
            500 => Self::PostFrontLoad,
            253 => Self::LoggingIn,
            255 => Self::Unloading,
            other => Self::Other(other),
        }
    }
}
