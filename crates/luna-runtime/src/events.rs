//! Event matcher: regex patterns tested against incoming text lines.
//!
//! Patterns match the whole line. On a match, every capture group after the
//! whole-match group becomes one string argument of the handler; groups that
//! did not participate are passed as empty strings so positions stay stable.

use mlua::RegistryKey;
use regex::Regex;
use thiserror::Error;

/// Marker for host-data interpolation inside a pattern (not supported).
const INTERPOLATION_MARKER: &str = "$[";

/// Reasons an event pattern is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    #[error("host data interpolation in event patterns is not implemented: {pattern}")]
    InterpolationUnsupported { pattern: String },

    #[error("invalid event pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },
}

/// One registered pattern and its handler.
#[derive(Debug)]
pub struct EventPattern {
    source: String,
    regex: Regex,
    handler: RegistryKey,
}

impl EventPattern {
    /// The pattern text as registered.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Handler callable, valid only inside the owning interpreter.
    #[must_use]
    pub fn handler(&self) -> &RegistryKey {
        &self.handler
    }

    /// Returns the capture arguments if `line` matches.
    #[must_use]
    pub fn captures(&self, line: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(line)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
                .collect(),
        )
    }
}

/// Compiles pattern text with whole-line semantics.
///
/// # Errors
///
/// Rejects interpolation syntax and invalid regular expressions.
pub fn compile_pattern(pattern: &str) -> Result<Regex, EventError> {
    if pattern.contains(INTERPOLATION_MARKER) {
        return Err(EventError::InterpolationUnsupported {
            pattern: pattern.into(),
        });
    }
    Regex::new(&format!("^(?:{pattern})$")).map_err(|e| EventError::InvalidPattern {
        pattern: pattern.into(),
        message: e.to_string(),
    })
}

/// Ordered pattern table for one module.
#[derive(Debug, Default)]
pub struct EventMatcher {
    patterns: Vec<EventPattern>,
}

impl EventMatcher {
    /// Creates an empty matcher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compiles and appends a pattern.
    ///
    /// # Errors
    ///
    /// See [`compile_pattern`]. Nothing is stored on failure.
    pub fn add_pattern(&mut self, pattern: &str, handler: RegistryKey) -> Result<(), EventError> {
        let regex = compile_pattern(pattern)?;
        self.add_compiled(pattern, regex, handler);
        Ok(())
    }

    /// Appends a pattern already built by [`compile_pattern`].
    pub fn add_compiled(&mut self, source: &str, regex: Regex, handler: RegistryKey) {
        self.patterns.push(EventPattern {
            source: source.to_string(),
            regex,
            handler,
        });
    }

    /// Returns `(index, arguments)` for every pattern matching `line`, in
    /// registration order.
    #[must_use]
    pub fn matches(&self, line: &str) -> Vec<(usize, Vec<String>)> {
        self.patterns
            .iter()
            .enumerate()
            .filter_map(|(i, p)| p.captures(line).map(|args| (i, args)))
            .collect()
    }

    /// Returns `true` if any pattern matches `line`.
    #[must_use]
    pub fn matches_any(&self, line: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(line))
    }

    /// Pattern at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&EventPattern> {
        self.patterns.get(index)
    }

    /// Number of registered patterns.
    #[must_use]
    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    /// Returns `true` if no pattern is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mlua::Lua;

    fn key(lua: &Lua) -> RegistryKey {
        let f = lua
            .create_function(|_, ()| Ok(()))
            .expect("create function");
        lua.create_registry_value(f).expect("registry value")
    }

    #[test]
    fn captures_exclude_whole_match() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        matcher
            .add_pattern(r"^hello (\w+)$", key(&lua))
            .expect("valid pattern");

        assert_eq!(
            matcher.matches("hello world"),
            vec![(0, vec!["world".to_string()])]
        );
        assert!(matcher.matches("goodbye world").is_empty());
    }

    #[test]
    fn patterns_match_whole_line() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        matcher
            .add_pattern(r"(\w+) tells you, '(.*)'", key(&lua))
            .expect("valid pattern");

        assert!(matcher.matches_any("Bob tells you, 'hi'"));
        assert!(!matcher.matches_any("Bob tells you, 'hi' and more"));
    }

    #[test]
    fn unmatched_optional_group_is_empty_string() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        matcher
            .add_pattern(r"(\w+)(?: x(\d+))?", key(&lua))
            .expect("valid pattern");

        assert_eq!(
            matcher.matches("potion"),
            vec![(0, vec!["potion".to_string(), String::new()])]
        );
    }

    #[test]
    fn registration_order_is_kept() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        matcher.add_pattern("a.*", key(&lua)).expect("first");
        matcher.add_pattern("ab", key(&lua)).expect("second");
        matcher.add_pattern("zz", key(&lua)).expect("third");

        let hits: Vec<usize> = matcher.matches("ab").into_iter().map(|(i, _)| i).collect();
        assert_eq!(hits, vec![0, 1]);
    }

    #[test]
    fn precompiled_pattern_keeps_source() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        let regex = compile_pattern(r"(\d+) coins").expect("valid pattern");
        matcher.add_compiled(r"(\d+) coins", regex, key(&lua));

        assert_eq!(matcher.get(0).map(EventPattern::source), Some(r"(\d+) coins"));
        assert_eq!(matcher.matches("12 coins"), vec![(0, vec!["12".to_string()])]);
        assert!(!matcher.matches_any("12 coins here"));
    }

    #[test]
    fn interpolation_is_rejected() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        let err = matcher
            .add_pattern("You have $[Me.PctHPs] hp", key(&lua))
            .expect_err("interpolation unsupported");
        assert!(matches!(err, EventError::InterpolationUnsupported { .. }));
        assert!(matcher.is_empty());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let lua = Lua::new();
        let mut matcher = EventMatcher::new();
        let err = matcher
            .add_pattern("(unclosed", key(&lua))
            .expect_err("invalid regex");
        assert!(matches!(err, EventError::InvalidPattern { .. }));
        assert!(matcher.is_empty());
    }
}
