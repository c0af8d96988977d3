//! The `luna` global table installed into every module interpreter.
//!
//! # Available Functions
//!
//! | Function | Description |
//! |----------|-------------|
//! | `luna.yield([spec])` | Suspend the pulse hook (next tick, ms, or `{min,sec,ms}`) |
//! | `luna.bind(fn, name)` | Bind a console command name to `fn` |
//! | `luna.add_event(fn, pattern)` | Call `fn(captures...)` for lines matching `pattern` |
//! | `luna.do_command(cmd)` | Run a host command |
//! | `luna.data(query)` | Query host data |
//! | `luna.echo(msg)` | Print to the host console |
//! | `luna.cur_time()` | Monotonic seconds since the runtime started |
//! | `luna.ldo(cmdline)` | Queue a bind invocation for the next tick |
//! | `luna.log(level, msg)` | Log through the runtime's tracing pipeline |
//! | `luna.module_name()` | Name of the calling module |
//!
//! Every function recovers its owning module from the interpreter's app
//! data, so the same function table works from any lane.

use crate::bindings::validate_command_name;
use crate::context::{Lane, ModuleEnv};
use crate::error::LunaError;
use crate::events::compile_pattern;
use crate::host::HostValue;
use crate::pulse::{YieldCall, YieldRequest};
use mlua::{Function, Lua, Table, Value, Variadic};

/// Global table name for luna functions in Lua.
pub const LUNA_TABLE_NAME: &str = "luna";

/// Wraps the native yield preparation so the actual suspension happens in
/// Lua, where a coroutine can always yield.
const YIELD_WRAPPER: &str = r#"
local prepare, co_yield = ...
return function(...)
    prepare(...)
    return co_yield()
end
"#;

fn module_env(lua: &Lua) -> mlua::Result<ModuleEnv> {
    lua.app_data_ref::<ModuleEnv>()
        .map(|env| ModuleEnv::clone(&env))
        .ok_or_else(|| mlua::Error::RuntimeError("no module registered for this interpreter".into()))
}

fn script_error(err: impl Into<LunaError>) -> mlua::Error {
    err.into().into_lua()
}

/// Creates the `luna` table and sets it as a global.
///
/// # Errors
///
/// Returns error if function registration fails.
pub(crate) fn register(lua: &Lua) -> mlua::Result<()> {
    let luna = lua.create_table()?;

    luna.set("yield", create_yield(lua)?)?;

    // luna.bind(fn, name)
    let bind_fn = lua.create_function(|lua, (func, name): (Function, String)| {
        let env = module_env(lua)?;
        validate_command_name(&name).map_err(script_error)?;
        if env.shared.bindings.borrow().contains(&name) {
            return Err(script_error(crate::bindings::BindError::Conflict { name }));
        }
        let key = lua.create_registry_value(func)?;
        env.shared
            .bindings
            .borrow_mut()
            .register(&name, env.state.id, key)
            .map_err(script_error)?;
        tracing::debug!(module = %env.state.name, command = %name, "added bind command");
        Ok(())
    })?;
    luna.set("bind", bind_fn)?;

    // luna.add_event(fn, pattern)
    let add_event_fn = lua.create_function(|lua, (func, pattern): (Function, String)| {
        let env = module_env(lua)?;
        // Compile before allocating a registry slot so a bad pattern leaves no trace.
        let regex = compile_pattern(&pattern).map_err(script_error)?;
        let key = lua.create_registry_value(func)?;
        env.state.events.borrow_mut().add_compiled(&pattern, regex, key);
        tracing::debug!(module = %env.state.name, pattern = %pattern, "added event");
        Ok(())
    })?;
    luna.set("add_event", add_event_fn)?;

    // luna.do_command(cmd)
    let do_command_fn = lua.create_function(|lua, cmd: String| {
        let env = module_env(lua)?;
        env.shared.host.do_command(&cmd);
        Ok(())
    })?;
    luna.set("do_command", do_command_fn)?;

    // luna.data(query) -> nil | integer | number | string | boolean
    let data_fn = lua.create_function(|lua, query: String| -> mlua::Result<HostValue> {
        let env = module_env(lua)?;
        Ok(env.shared.host.data(&query))
    })?;
    luna.set("data", data_fn)?;

    // luna.echo(msg)
    let echo_fn = lua.create_function(|lua, msg: String| {
        let env = module_env(lua)?;
        env.shared.host.echo(&msg);
        Ok(())
    })?;
    luna.set("echo", echo_fn)?;

    // luna.cur_time() -> seconds
    let cur_time_fn = lua.create_function(|lua, ()| {
        let env = module_env(lua)?;
        Ok(env.shared.started.elapsed().as_secs_f64())
    })?;
    luna.set("cur_time", cur_time_fn)?;

    // luna.ldo(cmdline)
    let ldo_fn = lua.create_function(|lua, line: String| {
        let env = module_env(lua)?;
        env.shared.queues.borrow_mut().binds.push(line);
        Ok(())
    })?;
    luna.set("ldo", ldo_fn)?;

    // luna.log(level, msg)
    let log_fn = lua.create_function(|lua, (level, msg): (String, String)| {
        let env = module_env(lua)?;
        let module = env.state.name.as_str();
        match level.to_lowercase().as_str() {
            "debug" => tracing::debug!(module = %module, "[lua] {}", msg),
            "warn" => tracing::warn!(module = %module, "[lua] {}", msg),
            "error" => tracing::error!(module = %module, "[lua] {}", msg),
            _ => tracing::info!(module = %module, "[lua] {}", msg),
        }
        Ok(())
    })?;
    luna.set("log", log_fn)?;

    // luna.module_name()
    let name_fn = lua.create_function(|lua, ()| {
        let env = module_env(lua)?;
        Ok(env.state.name.clone())
    })?;
    luna.set("module_name", name_fn)?;

    lua.globals().set(LUNA_TABLE_NAME, luna)?;
    Ok(())
}

/// Builds `luna.yield`.
///
/// The native half validates the lane and the duration spec and records the
/// request, stamped with the time of the call, on the module; the Lua half
/// performs `coroutine.yield()`.
fn create_yield(lua: &Lua) -> mlua::Result<Function> {
    let prepare = lua.create_function(|lua, args: Variadic<Value>| {
        let env = module_env(lua)?;
        if env.state.lane() != Lane::Pulse {
            return Err(mlua::Error::RuntimeError(
                "yielding is not supported outside the pulse hook".into(),
            ));
        }
        let request = YieldRequest::from_value(args.first())?;
        let at = env.shared.clock.get().now();
        env.state.request_yield(YieldCall { request, at });
        Ok(())
    })?;

    let coroutine: Table = lua.globals().get("coroutine")?;
    let co_yield: Function = coroutine.get("yield")?;

    lua.load(YIELD_WRAPPER)
        .set_name("=luna.yield")
        .call((prepare, co_yield))
}
