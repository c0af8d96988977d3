//! Administrative commands (`/luna ...`).

/// Help text, one line per entry.
pub const HELP_LINES: [&str; 7] = [
    "luna usage:",
    "  run <module>    load and start a module",
    "  stop <module>   stop a module",
    "  stop all        stop every module",
    "  pause <module>  toggle pulsing for a module",
    "  info            show running modules",
    "  list            show modules available to run",
];

/// A parsed administrative command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminCommand {
    Run(String),
    Stop(String),
    StopAll,
    Pause(String),
    Info,
    List,
    Help,
    /// Anything else; answered with the help text.
    Unrecognized(String),
}

impl AdminCommand {
    /// Parses one command line. Surrounding whitespace is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        let (verb, arg) = match text.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (text, ""),
        };

        match (verb, arg) {
            ("run", name) if !name.is_empty() => Self::Run(name.to_string()),
            ("stop", "all") => Self::StopAll,
            ("stop", name) if !name.is_empty() => Self::Stop(name.to_string()),
            ("pause", name) if !name.is_empty() => Self::Pause(name.to_string()),
            ("info", "") => Self::Info,
            ("list", "") => Self::List,
            ("help", "") => Self::Help,
            _ => Self::Unrecognized(text.to_string()),
        }
    }
}
