//! Cooperative Lua module runtime for a host application.
//!
//! Each module is a directory holding a `module.lua` that returns a table of
//! optional hooks. The [`Runtime`] loads modules into isolated interpreters
//! and drives them from the host's update loop.
//!
//! # Architecture
//!
//! ```text
//!   host callbacks                        Runtime
//!  ───────────────                ┌──────────────────────────┐
//!   tick ──────────────────────▶  │ commands → events → binds │
//!   /luna run|stop|... ──queue──▶ │ → reap → pulse            │
//!   /ldo cmd args ──────queue──▶  └────────────┬─────────────┘
//!   chat line ──────────queue──▶               │
//!   zone / draw / ... ─ hooks ─▶   ┌───────────┴───────────┐
//!                                  ▼                       ▼
//!                           ModuleContext ...       BindingRegistry
//!                           (one Lua each)          (global, per-owner release)
//! ```
//!
//! # Example Module
//!
//! ```lua
//! -- luna/greeter/module.lua
//! luna.bind(function(who) luna.echo("hello " .. (who or "you")) end, "greet")
//! luna.add_event(function(name) luna.do_command("/wave " .. name) end, "(\\w+) waves at you\\.")
//!
//! return {
//!     pulse = function()
//!         luna.log("debug", "tick " .. luna.cur_time())
//!         luna.yield({ sec = 5 })
//!     end,
//!     at_exit = function() luna.echo("bye") end,
//! }
//! ```

pub mod bindings;
pub mod command;
pub mod config;
mod context;
pub mod error;
pub mod events;
pub mod hooks;
pub mod host;
pub mod loader;
mod luna_lib;
pub mod pulse;
mod runtime;
pub mod testing;
pub mod types;

pub use bindings::{BindError, BindingRegistry};
pub use command::AdminCommand;
pub use config::{ConfigError, ConfigLoader, EventMatching, LunaConfig};
pub use context::{ModuleContext, ModuleInfo, MODULE_GLOBAL, MODULE_NAME_KEY};
pub use error::LunaError;
pub use events::{EventError, EventMatcher};
pub use hooks::HookKind;
pub use host::{Host, HostValue, NullHost};
pub use luna_lib::LUNA_TABLE_NAME;
pub use pulse::{PulseOutcome, PulseState, YieldRequest};
pub use runtime::{BindOutcome, Runtime, TickReport};
pub use types::{GameState, ModuleId, ModuleState};
