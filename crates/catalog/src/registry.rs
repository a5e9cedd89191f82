//! The canonical id → entry mapping.
//!
//! The registry is filled once at start-up and only read afterwards, so it
//! hands out plain shared references; wrap it in an `Arc` to share it.

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;

use crate::entry::ShaderEntry;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("shader '{0}' is already registered")]
    DuplicateId(String),

    #[error("shader '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Default)]
pub struct ShaderRegistry {
    entries: Vec<ShaderEntry>,
    index: HashMap<String, usize>,
}

impl ShaderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `entry`. An id that is already present is rejected and the
    /// existing entry is left untouched.
    pub fn register(&mut self, entry: ShaderEntry) -> Result<(), RegistryError> {
        if self.index.contains_key(entry.id()) {
            return Err(RegistryError::DuplicateId(entry.id().to_string()));
        }
        debug!(id = entry.id(), "registered shader");
        let position = self.entries.len();
        self.index.insert(entry.id().to_string(), position);
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&ShaderEntry, RegistryError> {
        self.index
            .get(id)
            .map(|&position| &self.entries[position])
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Entries in registration order. Each call starts a fresh iteration.
    pub fn list(&self) -> std::slice::Iter<'_, ShaderEntry> {
        self.entries.iter()
    }

    pub fn source_text(&self, id: &str) -> Result<&str, RegistryError> {
        self.get(id).map(ShaderEntry::source_text)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// The entry `step` places after (or before, when negative) `id`,
    /// wrapping around at either end.
    pub fn cycle(&self, id: &str, step: isize) -> Result<&ShaderEntry, RegistryError> {
        let position = self
            .position(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let len = self.entries.len() as isize;
        let next = (position as isize + step).rem_euclid(len) as usize;
        Ok(&self.entries[next])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ShaderRegistry {
    type Item = &'a ShaderEntry;
    type IntoIter = std::slice::Iter<'a, ShaderEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str) -> ShaderEntry {
        ShaderEntry::new(id, name, "", "void main() {}")
    }

    #[test]
    fn get_returns_entry_with_matching_id() {
        let mut registry = ShaderRegistry::new();
        registry.register(entry("milky-orb", "Milky Orb")).unwrap();
        registry.register(entry("milky-ring", "Ring")).unwrap();
        for entry in &registry {
            assert_eq!(registry.get(entry.id()).unwrap().id(), entry.id());
        }
    }

    #[test]
    fn duplicate_id_keeps_first_entry() {
        let mut registry = ShaderRegistry::new();
        registry.register(entry("milky-orb", "First")).unwrap();
        let err = registry.register(entry("milky-orb", "Second")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateId("milky-orb".into()));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("milky-orb").unwrap().name(), "First");
    }

    #[test]
    fn unknown_id_is_not_found() {
        let registry = ShaderRegistry::new();
        assert_eq!(
            registry.get("nope").unwrap_err(),
            RegistryError::NotFound("nope".into())
        );
        assert!(registry.source_text("nope").is_err());
    }

    #[test]
    fn list_is_restartable_and_ordered() {
        let mut registry = ShaderRegistry::new();
        for id in ["c", "a", "b"] {
            registry.register(entry(id, id)).unwrap();
        }
        let first: Vec<_> = registry.list().map(ShaderEntry::id).collect();
        let second: Vec<_> = registry.list().map(ShaderEntry::id).collect();
        assert_eq!(first, ["c", "a", "b"]);
        assert_eq!(first, second);
    }

    #[test]
    fn cycle_wraps_in_both_directions() {
        let mut registry = ShaderRegistry::new();
        for id in ["a", "b", "c"] {
            registry.register(entry(id, id)).unwrap();
        }
        assert_eq!(registry.cycle("c", 1).unwrap().id(), "a");
        assert_eq!(registry.cycle("a", -1).unwrap().id(), "c");
        assert_eq!(registry.cycle("b", 0).unwrap().id(), "b");
    }
}
