//! Module context: one loaded script's interpreter, hooks and registrations.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                ModuleContext (Rust)                  │
//! │  ┌────────────────────────────────────────────────┐  │
//! │  │  lua: Lua (mlua)          hooks: Hooks         │  │
//! │  │  pulse: PulseScheduler    state: ContextState  │  │
//! │  └────────────────────────────────────────────────┘  │
//! │                         │                            │
//! │        lanes sharing one global registry             │
//! │    ┌───────────┬────────┴─────┬───────────┐          │
//! │    ▼           ▼              ▼           ▼          │
//! │   main       pulse          event        bind        │
//! │ (load,     (coroutine,   (event lines,  (bound       │
//! │  at_exit)   may yield)    host hooks)    commands)   │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Each of the pulse, event and bind lanes owns one coroutine created with the
//! interpreter and reused for every callable it runs. Only the pulse lane may
//! stay suspended between calls; event and bind callables run to completion.

use crate::bindings::BindingRegistry;
use crate::error::LunaError;
use crate::events::EventMatcher;
use crate::hooks::{HookKind, Hooks};
use crate::host::Host;
use crate::loader::ModulePaths;
use crate::luna_lib;
use crate::pulse::{PulseOutcome, PulseScheduler, PulseState, TickClock, YieldCall};
use crate::types::{ModuleId, ModuleState};
use mlua::{Function, IntoLuaMulti, Lua, RegistryKey, Table, Thread, ThreadStatus, Value, Variadic};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Registry key holding the owning module's name.
pub const MODULE_NAME_KEY: &str = "luna_module_name";

/// Global the module's returned hook table is stored under.
pub const MODULE_GLOBAL: &str = "luna_module";

/// Execution lane a callable is currently running on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lane {
    Main,
    Pulse,
    Event,
    Bind,
}

/// Sets a lane for the guard's lifetime and restores the previous one.
struct LaneGuard<'a> {
    cell: &'a Cell<Lane>,
    prev: Lane,
}

impl<'a> LaneGuard<'a> {
    fn enter(cell: &'a Cell<Lane>, lane: Lane) -> Self {
        let prev = cell.replace(lane);
        Self { cell, prev }
    }
}

impl Drop for LaneGuard<'_> {
    fn drop(&mut self) {
        self.cell.set(self.prev);
    }
}

/// Runtime-wide state reachable from every module's `luna.*` functions.
pub(crate) struct RuntimeShared {
    pub(crate) bindings: RefCell<BindingRegistry>,
    pub(crate) queues: RefCell<PendingQueues>,
    pub(crate) host: Rc<dyn Host>,
    pub(crate) started: Instant,
    pub(crate) clock: Cell<TickClock>,
}

impl RuntimeShared {
    pub(crate) fn new(host: Rc<dyn Host>) -> Self {
        Self {
            bindings: RefCell::new(BindingRegistry::new()),
            queues: RefCell::new(PendingQueues::default()),
            host,
            started: Instant::now(),
            clock: Cell::new(TickClock::start(Instant::now())),
        }
    }
}

/// Inputs waiting for the next tick.
#[derive(Debug, Default)]
pub(crate) struct PendingQueues {
    pub(crate) commands: Vec<String>,
    pub(crate) events: Vec<String>,
    pub(crate) binds: Vec<String>,
}

/// Per-module state touched from inside Lua callbacks.
pub(crate) struct ContextState {
    pub(crate) id: ModuleId,
    pub(crate) name: String,
    lane: Cell<Lane>,
    yield_call: Cell<Option<YieldCall>>,
    pub(crate) events: RefCell<EventMatcher>,
}

impl ContextState {
    pub(crate) fn lane(&self) -> Lane {
        self.lane.get()
    }

    pub(crate) fn request_yield(&self, call: YieldCall) {
        self.yield_call.set(Some(call));
    }
}

/// What a `luna.*` function needs to find its owner; stored as app data.
#[derive(Clone)]
pub(crate) struct ModuleEnv {
    pub(crate) shared: Rc<RuntimeShared>,
    pub(crate) state: Rc<ContextState>,
}

/// The coroutines backing the pulse, event and bind lanes.
struct LaneThreads {
    pulse: Thread,
    event: Thread,
    bind: Thread,
}

impl LaneThreads {
    fn new(lua: &Lua) -> mlua::Result<Self> {
        let idle = lua.create_function(|_, ()| Ok(()))?;
        Ok(Self {
            pulse: lua.create_thread(idle.clone())?,
            event: lua.create_thread(idle.clone())?,
            bind: lua.create_thread(idle)?,
        })
    }
}

/// Loads `func` as the next body of a reusable coroutine.
///
/// Closing a coroutine that stopped on an error reports that error again;
/// the thread is clean afterwards, so the second reset succeeds.
fn prime(thread: &Thread, func: Function) -> mlua::Result<()> {
    match thread.reset(func.clone()) {
        Ok(()) => Ok(()),
        Err(_) => thread.reset(func),
    }
}

/// One loaded module.
pub struct ModuleContext {
    lua: Lua,
    threads: LaneThreads,
    shared: Rc<RuntimeShared>,
    state: Rc<ContextState>,
    module_state: ModuleState,
    hooks: Hooks,
    pulse: PulseScheduler,
    exit_fired: bool,
    paths: ModulePaths,
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("id", &self.state.id)
            .field("name", &self.state.name)
            .field("state", &self.module_state)
            .field("pulse", &self.pulse)
            .finish()
    }
}

impl ModuleContext {
    /// Creates the interpreter for `name` without running any script.
    ///
    /// The module name is stored in the registry under
    /// [`MODULE_NAME_KEY`], the module's shared state is attached as app
    /// data, the `luna` table is installed and the lane coroutines are
    /// created.
    pub(crate) fn new(
        id: ModuleId,
        name: &str,
        paths: ModulePaths,
        shared: Rc<RuntimeShared>,
    ) -> Result<Self, LunaError> {
        let lua = Lua::new();
        lua.set_named_registry_value(MODULE_NAME_KEY, name)?;

        let state = Rc::new(ContextState {
            id,
            name: name.to_string(),
            lane: Cell::new(Lane::Main),
            yield_call: Cell::new(None),
            events: RefCell::new(EventMatcher::new()),
        });
        lua.set_app_data(ModuleEnv {
            shared: Rc::clone(&shared),
            state: Rc::clone(&state),
        });
        luna_lib::register(&lua)?;
        let threads = LaneThreads::new(&lua)?;

        Ok(Self {
            lua,
            threads,
            shared,
            state,
            module_state: ModuleState::Loading,
            hooks: Hooks::default(),
            pulse: PulseScheduler::new(),
            exit_fired: false,
            paths,
        })
    }

    /// Creates the interpreter, runs the entry script and captures hooks.
    ///
    /// # Errors
    ///
    /// The entry script can't be read, raises an error, or doesn't return a
    /// table. The half-built context is dropped.
    pub(crate) fn load(
        id: ModuleId,
        name: &str,
        paths: ModulePaths,
        shared: Rc<RuntimeShared>,
    ) -> Result<Self, LunaError> {
        let mut ctx = Self::new(id, name, paths, shared)?;
        ctx.set_search_path(&ctx.paths.search_path())?;

        let source = std::fs::read_to_string(&ctx.paths.entry)?;
        debug!(module = %name, path = %ctx.paths.entry.display(), "running module script");
        let returned: Value = ctx
            .lua
            .load(source.as_str())
            .set_name(format!("@{}", ctx.paths.entry.display()))
            .eval()?;
        let table = match returned {
            Value::Table(table) => table,
            other => {
                return Err(LunaError::InvalidScript(format!(
                    "{name}: module script must return a table of hooks, got {}",
                    other.type_name()
                )))
            }
        };
        ctx.lua.globals().set(MODULE_GLOBAL, table)?;
        ctx.create_indices()?;
        Ok(ctx)
    }

    /// Sets `package.path` for `require`.
    fn set_search_path(&self, path: &str) -> Result<(), LunaError> {
        let package: Table = self.lua.globals().get("package")?;
        package.set("path", path)?;
        Ok(())
    }

    /// Captures a callable reference for every hook in the module table.
    ///
    /// # Errors
    ///
    /// The module global isn't a table, or a reference can't be stored.
    pub(crate) fn create_indices(&mut self) -> Result<(), LunaError> {
        let table = match self.lua.globals().get::<Value>(MODULE_GLOBAL)? {
            Value::Table(t) => t,
            other => {
                return Err(LunaError::InvalidScript(format!(
                    "{}: expected a hook table, got {}",
                    self.state.name,
                    other.type_name()
                )))
            }
        };
        self.hooks = Hooks::capture(&self.lua, &table)?;
        Ok(())
    }

    /// Module identity.
    #[must_use]
    pub fn id(&self) -> ModuleId {
        self.state.id
    }

    /// Module name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Lifecycle state.
    #[must_use]
    pub fn state(&self) -> ModuleState {
        self.module_state
    }

    /// Pulse scheduler state.
    #[must_use]
    pub fn pulse_state(&self) -> PulseState {
        self.pulse.state()
    }

    /// Returns `true` if the module exports `kind`.
    #[must_use]
    pub fn has_hook(&self, kind: HookKind) -> bool {
        self.hooks.has(kind)
    }

    /// Commands this module owns, sorted.
    #[must_use]
    pub fn bound_commands(&self) -> Vec<String> {
        self.shared.bindings.borrow().owned_by(self.id())
    }

    /// Number of registered event patterns.
    #[must_use]
    pub fn event_pattern_count(&self) -> usize {
        self.state.events.borrow().len()
    }

    /// Returns `true` while the module is neither exiting nor closed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(
            self.module_state,
            ModuleState::Loading | ModuleState::Running | ModuleState::Paused
        )
    }

    /// Snapshot for `info` output.
    #[must_use]
    pub fn info(&self) -> ModuleInfo {
        ModuleInfo {
            id: self.id(),
            name: self.name().to_string(),
            state: self.module_state,
            pulse: self.pulse.state(),
            hooks: self.hooks.names(),
            bound_commands: self.bound_commands(),
            event_patterns: self.event_pattern_count(),
        }
    }

    pub(crate) fn set_running(&mut self) {
        self.module_state = ModuleState::Running;
    }

    /// Flips Running ↔ Paused. Other states are left alone.
    pub(crate) fn toggle_pause(&mut self) -> ModuleState {
        self.module_state = match self.module_state {
            ModuleState::Running => ModuleState::Paused,
            ModuleState::Paused => ModuleState::Running,
            other => other,
        };
        self.module_state
    }

    /// Runs one scheduler step for the `pulse` hook.
    pub fn pulse(&mut self, now: Instant) -> PulseOutcome {
        if self.module_state != ModuleState::Running || !self.has_hook(HookKind::Pulse) {
            return PulseOutcome::Skipped;
        }
        if self.pulse.is_asleep(now) {
            return PulseOutcome::Asleep;
        }

        if !self.pulse.state().is_suspended() {
            if let Err(e) = self.restart_pulse() {
                error!(module = %self.name(), error = %e, "pulse hook unavailable, stopping module");
                self.pulse.fault();
                self.module_state = ModuleState::Exiting;
                return PulseOutcome::Faulted(e.to_string());
            }
        }

        self.state.yield_call.set(None);
        let resumed = {
            let _lane = LaneGuard::enter(&self.state.lane, Lane::Pulse);
            self.threads.pulse.resume::<()>(())
        };
        let call = self.state.yield_call.take();

        let outcome = self
            .pulse
            .settle(resumed, self.threads.pulse.status(), call);
        if let PulseOutcome::Faulted(ref message) = outcome {
            error!(module = %self.name(), error = %message, "lua error in pulse, stopping module");
            self.module_state = ModuleState::Exiting;
        }
        outcome
    }

    /// Puts the `pulse` hook back at the start of the pulse coroutine.
    fn restart_pulse(&self) -> mlua::Result<()> {
        let func = self
            .hooks
            .resolve(&self.lua, HookKind::Pulse)?
            .ok_or_else(|| mlua::Error::RuntimeError("pulse hook missing".into()))?;
        prime(&self.threads.pulse, func)
    }

    /// Runs `func` to completion on one of the run-to-completion lanes.
    fn run_on(
        &self,
        thread: &Thread,
        lane: Lane,
        func: Function,
        args: impl IntoLuaMulti,
    ) -> mlua::Result<()> {
        prime(thread, func)?;
        let _lane = LaneGuard::enter(&self.state.lane, lane);
        thread.resume::<()>(args)?;
        if thread.status() == ThreadStatus::Resumable {
            return Err(mlua::Error::RuntimeError(
                "yielding is not supported outside the pulse hook".into(),
            ));
        }
        Ok(())
    }

    /// Calls a run-to-completion hook on the event coroutine.
    ///
    /// Returns `Ok(false)` if the module doesn't export the hook or is no
    /// longer live. Errors are logged and returned.
    pub fn call_hook(&self, kind: HookKind, args: impl IntoLuaMulti) -> mlua::Result<bool> {
        if !self.is_live() {
            return Ok(false);
        }
        let func = match self.hooks.resolve(&self.lua, kind) {
            Ok(Some(func)) => func,
            Ok(None) => return Ok(false),
            Err(e) => {
                warn!(module = %self.name(), hook = %kind, error = %e, "hook is set but not callable");
                return Err(e);
            }
        };
        self.run_on(&self.threads.event, Lane::Event, func, args)
            .map(|()| true)
            .inspect_err(|e| {
                warn!(module = %self.name(), hook = %kind, error = %e, "hook handler had an error");
            })
    }

    /// Returns `true` if any event pattern matches `line`.
    #[must_use]
    pub fn matches_event(&self, line: &str) -> bool {
        self.is_live() && self.state.events.borrow().matches_any(line)
    }

    /// Runs every matching event handler for `line`, in registration order.
    ///
    /// Returns the number of handlers invoked. Handler errors are logged and
    /// don't stop later patterns.
    pub fn dispatch_event(&self, line: &str) -> usize {
        if !self.is_live() {
            return 0;
        }
        let hits = self.state.events.borrow().matches(line);
        let mut invoked = 0;
        for (index, args) in hits {
            let handler = {
                let events = self.state.events.borrow();
                let Some(pattern) = events.get(index) else {
                    continue;
                };
                match self.lua.registry_value::<Function>(pattern.handler()) {
                    Ok(func) => func,
                    Err(e) => {
                        warn!(module = %self.name(), pattern = %pattern.source(), error = %e, "event handler not callable");
                        continue;
                    }
                }
            };
            invoked += 1;
            let args: Variadic<String> = args.into_iter().collect();
            if let Err(e) = self.run_on(&self.threads.event, Lane::Event, handler, args) {
                warn!(module = %self.name(), line = %line, error = %e, "event handler had an error");
            }
        }
        invoked
    }

    /// Resolves a bind handle against this module's interpreter.
    pub(crate) fn resolve_handle(&self, key: &RegistryKey) -> mlua::Result<Function> {
        self.lua.registry_value::<Function>(key)
    }

    /// Calls a bound command on the bind coroutine.
    pub(crate) fn call_bind(
        &self,
        command: &str,
        func: Function,
        args: Vec<String>,
    ) -> mlua::Result<()> {
        let args: Variadic<String> = args.into_iter().collect();
        self.run_on(&self.threads.bind, Lane::Bind, func, args)
            .inspect_err(|e| {
                warn!(module = %self.name(), command = %command, error = %e, "bind command had an error");
            })
    }

    /// Fires `at_exit` at most once.
    fn fire_at_exit(&mut self) {
        if self.exit_fired {
            return;
        }
        self.exit_fired = true;

        let func = match self.hooks.resolve(&self.lua, HookKind::AtExit) {
            Ok(Some(func)) => func,
            Ok(None) => return,
            Err(e) => {
                warn!(module = %self.name(), error = %e, "at_exit is set but not callable");
                return;
            }
        };
        let _lane = LaneGuard::enter(&self.state.lane, Lane::Main);
        if let Err(e) = func.call::<()>(()) {
            warn!(module = %self.name(), error = %e, "at_exit handler had an error");
        }
    }

    /// Fires `at_exit` and drops any suspended pulse.
    pub(crate) fn close(&mut self) {
        self.fire_at_exit();
        self.pulse.fault();
        self.module_state = ModuleState::Closed;
    }
}

impl Drop for ModuleContext {
    fn drop(&mut self) {
        self.fire_at_exit();
    }
}

/// Read-only snapshot of a module.
#[derive(Debug, Clone, PartialEq)]
pub struct ModuleInfo {
    pub id: ModuleId,
    pub name: String,
    pub state: ModuleState,
    pub pulse: PulseState,
    pub hooks: Vec<&'static str>,
    pub bound_commands: Vec<String>,
    pub event_patterns: usize,
}

impl fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} (pulse {}), hooks [{}], binds [{}], {} event pattern(s)",
            self.name,
            self.id,
            self.state,
            self.pulse,
            self.hooks.join(", "),
            self.bound_commands.join(", "),
            self.event_patterns
        )
    }
}
