//! The host application as seen from module scripts.
//!
//! The runtime never talks to the host directly except through this trait:
//! `luna.echo`, `luna.do_command` and `luna.data` forward here.

use mlua::{IntoLua, Lua, Value};

/// Value returned by a host data query.
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Nil,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl IntoLua for HostValue {
    fn into_lua(self, lua: &Lua) -> mlua::Result<Value> {
        Ok(match self {
            Self::Nil => Value::Nil,
            Self::Int(i) => Value::Integer(i),
            Self::Float(f) => Value::Number(f),
            Self::Str(s) => Value::String(lua.create_string(&s)?),
            Self::Bool(b) => Value::Boolean(b),
        })
    }
}

/// Callbacks into the host application.
pub trait Host {
    /// Writes a line to the host's console.
    fn echo(&self, message: &str);

    /// Executes a host command.
    fn do_command(&self, command: &str);

    /// Evaluates a host data query. Unknown queries return [`HostValue::Nil`].
    fn data(&self, query: &str) -> HostValue;
}

/// A host that logs echoes and commands and knows no data.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHost;

impl Host for NullHost {
    fn echo(&self, message: &str) {
        tracing::info!(target: "luna::echo", "{}", message);
    }

    fn do_command(&self, command: &str) {
        tracing::debug!(command = %command, "host command dropped (no host attached)");
    }

    fn data(&self, _query: &str) -> HostValue {
        HostValue::Nil
    }
}
