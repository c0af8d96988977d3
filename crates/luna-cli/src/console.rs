//! Console host: stdin routing and the [`Host`] the binary hands the runtime.

use luna_runtime::{Host, HostValue};
use tracing::info;

/// One stdin line, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleInput {
    /// `/luna <args>`
    Admin(String),
    /// `/ldo <args>`
    Bind(String),
    /// `/zone`
    Zone,
    /// `/quit`
    Quit,
    /// Anything else, treated as an incoming chat line.
    Chat(String),
    /// Blank line.
    Empty,
}

impl ConsoleInput {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line.trim().is_empty() {
            return Self::Empty;
        }
        let trimmed = line.trim_start();
        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest.trim()),
            None => (trimmed, ""),
        };
        match head {
            "/luna" => Self::Admin(rest.to_string()),
            "/ldo" => Self::Bind(rest.to_string()),
            "/zone" => Self::Zone,
            "/quit" => Self::Quit,
            _ => Self::Chat(line.to_string()),
        }
    }
}

/// Prints echoes to stdout and logs host commands.
#[derive(Debug, Default)]
pub struct ConsoleHost;

impl Host for ConsoleHost {
    fn echo(&self, message: &str) {
        println!("{message}");
    }

    fn do_command(&self, command: &str) {
        info!(command = %command, "host command");
    }

    fn data(&self, _query: &str) -> HostValue {
        HostValue::Nil
    }
}
