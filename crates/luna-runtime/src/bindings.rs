//! Binding registry: user-typed command names mapped to module callables.
//!
//! One registry is owned by the [`Runtime`](crate::Runtime) and shared with
//! every module's `luna.bind`. A name appears at most once across all modules;
//! ownership is released in bulk when the owning module is torn down.

use crate::types::ModuleId;
use mlua::RegistryKey;
use std::collections::BTreeMap;
use thiserror::Error;

/// Minimum length of a bind command name.
pub const MIN_COMMAND_LEN: usize = 4;

/// Maximum length in bytes of a single bind argument; longer tokens are cut.
pub const MAX_BIND_ARG_LEN: usize = 2047;

/// Reasons a bind registration is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BindError {
    #[error("bind command {name:?} is too short (minimum 4 characters)")]
    TooShort { name: String },

    #[error("first character of bind command {name:?} must be a-Z")]
    InvalidFirstChar { name: String },

    #[error("bind command {name:?} may only contain a-Z, 0-9, _")]
    InvalidChar { name: String },

    #[error("conflicting bind {name} already exists")]
    Conflict { name: String },
}

/// Checks a command name: at least four characters, leading letter, then
/// letters, digits or underscores.
///
/// # Errors
///
/// Returns the first rule the name violates.
pub fn validate_command_name(name: &str) -> Result<(), BindError> {
    if name.chars().count() < MIN_COMMAND_LEN {
        return Err(BindError::TooShort { name: name.into() });
    }
    let mut chars = name.chars();
    if !chars.next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Err(BindError::InvalidFirstChar { name: name.into() });
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(BindError::InvalidChar { name: name.into() });
    }
    Ok(())
}

/// A registered binding.
#[derive(Debug)]
pub struct BindEntry {
    /// Module that registered the command.
    pub owner: ModuleId,
    /// Callable, valid only inside the owner's interpreter.
    pub handle: RegistryKey,
}

/// Global command-name registry.
#[derive(Debug, Default)]
pub struct BindingRegistry {
    entries: BTreeMap<String, BindEntry>,
}

impl BindingRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name` for `owner`.
    ///
    /// # Errors
    ///
    /// Fails without mutating anything if the name is malformed or already
    /// bound (by any module, including `owner`).
    pub fn register(
        &mut self,
        name: &str,
        owner: ModuleId,
        handle: RegistryKey,
    ) -> Result<(), BindError> {
        validate_command_name(name)?;
        if self.entries.contains_key(name) {
            return Err(BindError::Conflict { name: name.into() });
        }
        self.entries
            .insert(name.to_string(), BindEntry { owner, handle });
        Ok(())
    }

    /// Looks up a binding.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&BindEntry> {
        self.entries.get(name)
    }

    /// Returns true if `name` is bound.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Removes one binding, returning it if present.
    pub fn remove(&mut self, name: &str) -> Option<BindEntry> {
        self.entries.remove(name)
    }

    /// Removes every binding owned by `owner`. Returns the released names.
    pub fn release_all(&mut self, owner: ModuleId) -> Vec<String> {
        let released: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(name, _)| name.clone())
            .collect();
        for name in &released {
            self.entries.remove(name);
        }
        released
    }

    /// Names owned by `owner`, sorted.
    #[must_use]
    pub fn owned_by(&self, owner: ModuleId) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.owner == owner)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A bind invocation split into command name and argument tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindInvocation {
    pub name: String,
    pub args: Vec<String>,
}

impl BindInvocation {
    /// Tokenizes a command line on whitespace. Blank tokens are dropped and
    /// each argument is truncated to [`MAX_BIND_ARG_LEN`] bytes.
    ///
    /// Returns `None` for a blank line.
    #[must_use]
    pub fn parse(line: &str) -> Option<Self> {
        let mut tokens = line.split_whitespace();
        let name = tokens.next()?.to_string();
        let args = tokens
            .map(|t| truncate_to_boundary(t, MAX_BIND_ARG_LEN).to_string())
            .collect();
        Some(Self { name, args })
    }
}

fn truncate_to_boundary(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
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
    fn name_rules() {
        assert!(validate_command_name("heal").is_ok());
        assert!(validate_command_name("buff_2").is_ok());
        assert!(matches!(
            validate_command_name("abc"),
            Err(BindError::TooShort { .. })
        ));
        assert!(matches!(
            validate_command_name("1abc"),
            Err(BindError::InvalidFirstChar { .. })
        ));
        assert!(matches!(
            validate_command_name("_abc"),
            Err(BindError::InvalidFirstChar { .. })
        ));
        assert!(matches!(
            validate_command_name("ab-cd"),
            Err(BindError::InvalidChar { .. })
        ));
        assert!(matches!(
            validate_command_name("ab cd"),
            Err(BindError::InvalidChar { .. })
        ));
    }

    #[test]
    fn conflict_leaves_first_owner() {
        let lua = Lua::new();
        let mut registry = BindingRegistry::new();
        let a = ModuleId::new(1);
        let b = ModuleId::new(2);

        registry.register("cmd1", a, key(&lua)).expect("first bind");
        let err = registry
            .register("cmd1", b, key(&lua))
            .expect_err("second bind must conflict");

        assert_eq!(err, BindError::Conflict { name: "cmd1".into() });
        assert_eq!(registry.get("cmd1").map(|e| e.owner), Some(a));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn invalid_name_does_not_mutate() {
        let lua = Lua::new();
        let mut registry = BindingRegistry::new();
        assert!(registry.register("ab", ModuleId::new(1), key(&lua)).is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn release_all_frees_names_for_other_modules() {
        let lua = Lua::new();
        let mut registry = BindingRegistry::new();
        let a = ModuleId::new(1);
        let b = ModuleId::new(2);
        registry.register("heal", a, key(&lua)).expect("bind heal");
        registry.register("buff", a, key(&lua)).expect("bind buff");
        registry.register("nuke", b, key(&lua)).expect("bind nuke");

        let mut released = registry.release_all(a);
        released.sort();
        assert_eq!(released, vec!["buff".to_string(), "heal".to_string()]);
        assert_eq!(registry.owned_by(b), vec!["nuke".to_string()]);

        registry.register("heal", b, key(&lua)).expect("rebind heal");
        assert_eq!(registry.get("heal").map(|e| e.owner), Some(b));
    }

    #[test]
    fn parse_drops_blank_tokens() {
        let inv = BindInvocation::parse("   heal  one two\tthree  ").expect("non-blank");
        assert_eq!(inv.name, "heal");
        assert_eq!(inv.args, vec!["one", "two", "three"]);
    }

    #[test]
    fn parse_blank_line() {
        assert!(BindInvocation::parse("   ").is_none());
        assert!(BindInvocation::parse("").is_none());
    }

    #[test]
    fn long_arguments_are_truncated() {
        let long = "x".repeat(MAX_BIND_ARG_LEN + 10);
        let inv = BindInvocation::parse(&format!("heal {long}")).expect("non-blank");
        assert_eq!(inv.args[0].len(), MAX_BIND_ARG_LEN);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "é".repeat(MAX_BIND_ARG_LEN);
        let cut = truncate_to_boundary(&s, MAX_BIND_ARG_LEN);
        assert!(cut.len() <= MAX_BIND_ARG_LEN);
        assert!(cut.chars().all(|c| c == 'é'));
    }
}
