//! The runtime manager: live modules, pending queues and the tick pipeline.
//!
//! # Tick Order
//!
//! ```text
//! tick_at(now)
//!   ├─ (a) admin commands      run / stop / pause / info / list / help
//!   ├─ (b) event lines         every live module's patterns
//!   ├─ (c) bind invocations    global binding registry
//!   ├─ (d) reap                modules flagged Exiting
//!   └─ (e) pulse               Running modules, insertion order
//! ```
//!
//! Each queue is swapped out when its phase starts. Anything a script
//! queues during the tick (for example through `luna.ldo`) runs on the
//! next tick.

use crate::bindings::BindInvocation;
use crate::command::{AdminCommand, HELP_LINES};
use crate::config::{EventMatching, LunaConfig};
use crate::context::{ModuleContext, ModuleInfo, RuntimeShared};
use crate::error::LunaError;
use crate::hooks::HookKind;
use crate::host::Host;
use crate::loader::ModuleLoader;
use crate::pulse::{PulseOutcome, TickClock};
use crate::types::{GameState, ModuleId, ModuleState};
use mlua::{Function, IntoLuaMulti};
use std::fmt;
use std::rc::Rc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Counts from one pass of the tick pipeline.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Admin commands processed.
    pub commands: usize,
    /// Event lines processed.
    pub event_lines: usize,
    /// Event handlers invoked across all modules.
    pub event_handlers: usize,
    /// Bind invocations processed.
    pub binds: usize,
    /// Modules removed because they were exiting.
    pub reaped: usize,
    /// Modules whose pulse hook was resumed.
    pub pulsed: usize,
}

/// Result of dispatching one bind invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindOutcome {
    /// Blank line.
    Blank,
    /// No module has bound this command.
    Unknown(String),
    /// The entry pointed at a module or function that no longer exists; it
    /// was removed.
    Stale(String),
    /// Owner is exiting.
    Skipped(String),
    /// Handler ran to completion.
    Invoked(String),
    /// Handler raised an error.
    Failed { command: String, error: String },
}

enum BindLookup {
    Ready(usize, Function),
    Exiting,
    Stale(String),
}

/// Owns every loaded module and drives them from host callbacks.
///
/// # Example
///
/// ```ignore
/// use luna_runtime::{LunaConfig, NullHost, Runtime};
/// use std::rc::Rc;
///
/// let mut runtime = Runtime::new(LunaConfig::default(), Rc::new(NullHost));
/// runtime.submit_command("run autoloot");
/// runtime.tick();
/// ```
pub struct Runtime {
    config: LunaConfig,
    loader: ModuleLoader,
    shared: Rc<RuntimeShared>,
    modules: Vec<ModuleContext>,
    next_id: u64,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("modules", &self.modules)
            .field("bindings", &self.shared.bindings.borrow().len())
            .finish()
    }
}

impl Runtime {
    /// Creates an empty runtime.
    #[must_use]
    pub fn new(config: LunaConfig, host: Rc<dyn Host>) -> Self {
        let loader = ModuleLoader::new(config.modules_dir.clone(), config.entry_script.clone());
        debug!(
            modules_dir = %config.modules_dir.display(),
            event_matching = ?config.event_matching,
            "runtime created"
        );
        Self {
            config,
            loader,
            shared: Rc::new(RuntimeShared::new(host)),
            modules: Vec::new(),
            next_id: 1,
        }
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &LunaConfig {
        &self.config
    }

    // === Queues ===

    /// Queues an admin command (`run x`, `stop all`, ...).
    pub fn submit_command(&self, text: &str) {
        self.shared.queues.borrow_mut().commands.push(text.to_string());
    }

    /// Queues a bind invocation (`name arg1 arg2 ...`).
    pub fn submit_bind_invocation(&self, text: &str) {
        self.shared.queues.borrow_mut().binds.push(text.to_string());
    }

    /// Queues an event line for matching on the next tick.
    pub fn submit_event_line(&self, text: &str) {
        self.shared.queues.borrow_mut().events.push(text.to_string());
    }

    /// Runs one pass of the pipeline at the current time.
    pub fn tick(&mut self) -> TickReport {
        self.tick_at(Instant::now())
    }

    /// Runs one pass of the pipeline with `now` as the tick timestamp.
    ///
    /// Scripts calling `luna.yield` during the pass see `now` advanced by the
    /// wall time the pass has taken so far.
    pub fn tick_at(&mut self, now: Instant) -> TickReport {
        let mut report = TickReport::default();
        self.shared.clock.set(TickClock::start(now));

        let commands = std::mem::take(&mut self.shared.queues.borrow_mut().commands);
        for command in &commands {
            self.execute(command);
        }
        report.commands = commands.len();

        let lines = std::mem::take(&mut self.shared.queues.borrow_mut().events);
        for line in &lines {
            report.event_handlers += self.dispatch_event_line(line);
        }
        report.event_lines = lines.len();

        let binds = std::mem::take(&mut self.shared.queues.borrow_mut().binds);
        for line in &binds {
            self.dispatch_bind(line);
        }
        report.binds = binds.len();

        report.reaped = self.reap_exiting();

        for module in &mut self.modules {
            match module.pulse(now) {
                PulseOutcome::Skipped | PulseOutcome::Asleep => {}
                _ => report.pulsed += 1,
            }
        }

        report
    }

    // === Admin commands ===

    /// Executes one admin command immediately.
    pub fn execute(&mut self, text: &str) {
        debug!(command = %text, "admin command");
        match AdminCommand::parse(text) {
            AdminCommand::Run(name) => {
                if let Err(e) = self.run(&name) {
                    error!(module = %name, error = %e, "failed to run module");
                }
            }
            AdminCommand::Stop(name) => {
                self.stop(&name);
            }
            AdminCommand::StopAll => {
                self.stop_all();
            }
            AdminCommand::Pause(name) => {
                self.pause(&name);
            }
            AdminCommand::Info => {
                let infos = self.info();
                if infos.is_empty() {
                    self.echo("no modules running");
                }
                for info in infos {
                    self.echo(&info.to_string());
                }
            }
            AdminCommand::List => {
                let names = self.list_available();
                if names.is_empty() {
                    self.echo(&format!(
                        "no modules found in {}",
                        self.loader.root().display()
                    ));
                } else {
                    self.echo(&format!("available modules: {}", names.join(", ")));
                }
            }
            AdminCommand::Help => self.help(),
            AdminCommand::Unrecognized(text) => {
                info!(command = %text, "unrecognized command");
                self.help();
            }
        }
    }

    fn echo(&self, line: &str) {
        self.shared.host.echo(line);
    }

    /// Prints the help text to the host console.
    pub fn help(&self) {
        for line in HELP_LINES {
            self.echo(line);
        }
    }

    /// Loads and starts a module.
    ///
    /// Running a module that is already live is a no-op that returns the
    /// existing id. A module still flagged Exiting is torn down first and
    /// loaded again.
    ///
    /// # Errors
    ///
    /// The name is invalid, the module can't be found, or its entry script
    /// fails. Any commands the script bound before failing are released.
    pub fn run(&mut self, name: &str) -> Result<ModuleId, LunaError> {
        if let Some(index) = self.position(name) {
            let existing = &self.modules[index];
            if existing.is_live() {
                info!(module = %name, "module is already running");
                return Ok(existing.id());
            }
            info!(module = %name, "module is exiting, restarting it");
            self.teardown(index);
        }

        let paths = self.loader.resolve(name)?;
        let id = ModuleId::new(self.next_id);
        self.next_id += 1;

        match ModuleContext::load(id, name, paths, Rc::clone(&self.shared)) {
            Ok(mut ctx) => {
                ctx.set_running();
                info!(module = %name, id = %id, "module started");
                self.modules.push(ctx);
                Ok(id)
            }
            Err(e) => {
                let released = self.shared.bindings.borrow_mut().release_all(id);
                if !released.is_empty() {
                    debug!(module = %name, commands = ?released, "released binds of failed load");
                }
                Err(e)
            }
        }
    }

    /// Stops `target`, or every module if `target` is `"all"`.
    ///
    /// Returns the number of modules stopped.
    pub fn stop(&mut self, target: &str) -> usize {
        if target == "all" {
            return self.stop_all();
        }
        match self.position(target) {
            Some(index) => {
                self.teardown(index);
                1
            }
            None => {
                info!(module = %target, "module is not running");
                0
            }
        }
    }

    /// Stops every module in insertion order.
    pub fn stop_all(&mut self) -> usize {
        let count = self.modules.len();
        while !self.modules.is_empty() {
            self.teardown(0);
        }
        count
    }

    /// Toggles Running ↔ Paused for `name`.
    ///
    /// Returns the new state, or `None` if no such module is live.
    pub fn pause(&mut self, name: &str) -> Option<ModuleState> {
        let Some(index) = self.position(name) else {
            error!(module = %name, "cannot pause, module is not running");
            return None;
        };
        let state = self.modules[index].toggle_pause();
        info!(module = %name, state = %state, "module pause toggled");
        Some(state)
    }

    /// Snapshots of every live module, in insertion order.
    #[must_use]
    pub fn info(&self) -> Vec<ModuleInfo> {
        self.modules.iter().map(ModuleContext::info).collect()
    }

    /// Module directories under the modules root, sorted.
    #[must_use]
    pub fn list_available(&self) -> Vec<String> {
        self.loader.list_available()
    }

    // === Queries ===

    /// Looks up a live module.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<&ModuleContext> {
        self.modules.iter().find(|m| m.name() == name)
    }

    /// Returns `true` if `name` is loaded (in any state).
    #[must_use]
    pub fn is_running(&self, name: &str) -> bool {
        self.module(name).is_some()
    }

    /// Names of loaded modules, in insertion order.
    #[must_use]
    pub fn module_names(&self) -> Vec<String> {
        self.modules.iter().map(|m| m.name().to_string()).collect()
    }

    /// Name of the module owning `command`, if bound.
    #[must_use]
    pub fn binding_owner(&self, command: &str) -> Option<String> {
        let owner = self.shared.bindings.borrow().get(command)?.owner;
        self.modules
            .iter()
            .find(|m| m.id() == owner)
            .map(|m| m.name().to_string())
    }

    /// Number of bound commands across all modules.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.shared.bindings.borrow().len()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.name() == name)
    }

    // === Dispatch ===

    /// Runs `line` against every live module's event patterns.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch_event_line(&self, line: &str) -> usize {
        self.modules.iter().map(|m| m.dispatch_event(line)).sum()
    }

    /// Invokes a bound command immediately.
    pub fn dispatch_bind(&mut self, line: &str) -> BindOutcome {
        let Some(BindInvocation { name, args }) = BindInvocation::parse(line) else {
            return BindOutcome::Blank;
        };

        let lookup = {
            let registry = self.shared.bindings.borrow();
            registry.get(&name).map(|entry| {
                match self.modules.iter().position(|m| m.id() == entry.owner) {
                    None => BindLookup::Stale(format!("owner {} is gone", entry.owner)),
                    Some(index) if !self.modules[index].is_live() => BindLookup::Exiting,
                    Some(index) => match self.modules[index].resolve_handle(&entry.handle) {
                        Ok(func) => BindLookup::Ready(index, func),
                        Err(e) => BindLookup::Stale(e.to_string()),
                    },
                }
            })
        };

        match lookup {
            None => {
                info!(command = %name, "no bind command found");
                BindOutcome::Unknown(name)
            }
            Some(BindLookup::Stale(reason)) => {
                error!(command = %name, reason = %reason, "stale bind entry, removing");
                self.shared.bindings.borrow_mut().remove(&name);
                BindOutcome::Stale(name)
            }
            Some(BindLookup::Exiting) => {
                debug!(command = %name, "bind owner is exiting, skipped");
                BindOutcome::Skipped(name)
            }
            Some(BindLookup::Ready(index, func)) => {
                match self.modules[index].call_bind(&name, func, args) {
                    Ok(()) => BindOutcome::Invoked(name),
                    Err(e) => BindOutcome::Failed {
                        command: name,
                        error: e.to_string(),
                    },
                }
            }
        }
    }

    /// Removes every module flagged Exiting. Returns how many were removed.
    fn reap_exiting(&mut self) -> usize {
        let mut reaped = 0;
        let mut index = 0;
        while index < self.modules.len() {
            if self.modules[index].state() == ModuleState::Exiting {
                self.teardown(index);
                reaped += 1;
            } else {
                index += 1;
            }
        }
        reaped
    }

    /// Fires `at_exit`, releases bindings, then drops the interpreter.
    fn teardown(&mut self, index: usize) {
        let mut ctx = self.modules.remove(index);
        ctx.close();
        let released = self.shared.bindings.borrow_mut().release_all(ctx.id());
        info!(module = %ctx.name(), released = released.len(), "module stopped");
    }

    // === Host entry points ===

    fn broadcast<A>(&self, kind: HookKind, args: A)
    where
        A: IntoLuaMulti + Clone,
    {
        for module in &self.modules {
            if let Err(e) = module.call_hook(kind, args.clone()) {
                debug!(module = %module.name(), hook = %kind, error = %e, "hook call failed");
            }
        }
    }

    /// Zone changed.
    pub fn on_zoned(&self) {
        self.broadcast(HookKind::Zoned, ());
    }

    /// UI reloaded.
    pub fn on_reload_ui(&self) {
        self.broadcast(HookKind::Reload, ());
    }

    /// UI cleaned.
    pub fn on_clean_ui(&self) {
        self.broadcast(HookKind::Clean, ());
    }

    /// HUD draw frame.
    pub fn on_draw_hud(&self) {
        self.broadcast(HookKind::Draw, ());
    }

    /// Host game state changed; hooks receive the numeric code.
    pub fn on_game_state(&self, state: GameState) {
        self.broadcast(HookKind::GamestateChanged, state.code());
    }

    /// A line was written to the host's chat window.
    pub fn on_write_chat(&self, line: &str, color: i64, filter: i64) {
        self.broadcast(HookKind::WriteChat, (line.to_string(), color, filter));
    }

    /// A chat line arrived from the server.
    ///
    /// Fires `incoming_chat`, then queues the line for event matching. With
    /// [`EventMatching::Eager`] the line is queued only if some live module
    /// has a matching pattern right now.
    pub fn on_incoming_chat(&self, line: &str, color: i64) {
        self.broadcast(HookKind::IncomingChat, (line.to_string(), color));

        let queue = match self.config.event_matching {
            EventMatching::Lazy => true,
            EventMatching::Eager => self.modules.iter().any(|m| m.matches_event(line)),
        };
        if queue {
            self.submit_event_line(line);
        }
    }

    /// Zoning started.
    pub fn on_begin_zone(&self) {
        self.broadcast(HookKind::BeginZone, ());
    }

    /// Zoning finished.
    pub fn on_end_zone(&self) {
        self.broadcast(HookKind::EndZone, ());
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if !self.modules.is_empty() {
            warn!(count = self.modules.len(), "runtime dropped with live modules, stopping them");
            self.stop_all();
        }
    }
}
