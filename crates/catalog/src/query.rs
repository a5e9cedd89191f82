//! Pure filtering over registry metadata.
//!
//! Types:
//!
//! - `CatalogFilter` is the transient search/tag state a gallery UI keeps.
//!
//! Functions:
//!
//! - `query` yields matching entries lazily, in registration order.
//! - `matches_search` / `matches_tags` are the two predicates `query` ANDs.
//! - `all_tags` lists the tag vocabulary in first-seen order.

use std::collections::BTreeSet;

use crate::entry::ShaderEntry;
use crate::registry::ShaderRegistry;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogFilter {
    pub search_term: String,
    pub selected_tags: BTreeSet<String>,
}

impl CatalogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, term: impl Into<String>) -> Self {
        self.search_term = term.into();
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.selected_tags.insert(tag.into());
        self
    }

    /// Selects `tag` if it was not selected, deselects it otherwise. Returns
    /// whether the tag is selected afterwards.
    pub fn toggle_tag(&mut self, tag: &str) -> bool {
        if self.selected_tags.remove(tag) {
            false
        } else {
            self.selected_tags.insert(tag.to_string());
            true
        }
    }

    pub fn clear(&mut self) {
        self.search_term.clear();
        self.selected_tags.clear();
    }

    /// True when the filter lets every entry through.
    pub fn is_empty(&self) -> bool {
        self.search_term.is_empty() && self.selected_tags.is_empty()
    }

    pub fn matches(&self, entry: &ShaderEntry) -> bool {
        matches_search(entry, &self.search_term) && matches_tags(entry, &self.selected_tags)
    }
}

/// Case-insensitive substring match against the name or the description.
pub fn matches_search(entry: &ShaderEntry, term: &str) -> bool {
    if term.is_empty() {
        return true;
    }
    let needle = term.to_lowercase();
    entry.name().to_lowercase().contains(&needle)
        || entry.description().to_lowercase().contains(&needle)
}

/// Every selected tag must be carried by the entry.
pub fn matches_tags(entry: &ShaderEntry, selected: &BTreeSet<String>) -> bool {
    selected.iter().all(|tag| entry.has_tag(tag))
}

pub fn query<'a>(
    registry: &'a ShaderRegistry,
    filter: &'a CatalogFilter,
) -> impl Iterator<Item = &'a ShaderEntry> + 'a {
    registry.list().filter(move |entry| filter.matches(entry))
}

pub fn all_tags(registry: &ShaderRegistry) -> Vec<&str> {
    let mut seen = BTreeSet::new();
    let mut tags = Vec::new();
    for tag in registry.list().flat_map(|entry| entry.tags()) {
        if seen.insert(tag.as_str()) {
            tags.push(tag.as_str());
        }
    }
    tags
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ShaderRegistry {
        let mut registry = ShaderRegistry::new();
        let entries = [
            ShaderEntry::new("ring", "Milky Ring", "noise rings", "")
                .with_tags(["shader", "fluid"]),
            ShaderEntry::new("wave", "Milky Wave", "smooth amber tones", "").with_tags(["fluid"]),
            ShaderEntry::new("stars", "Milky Stars", "a STARFIELD", "")
                .with_tags(["shader", "space"]),
        ];
        for entry in entries {
            registry.register(entry).unwrap();
        }
        registry
    }

    fn ids<'a>(entries: impl Iterator<Item = &'a ShaderEntry>) -> Vec<&'a str> {
        entries.map(ShaderEntry::id).collect()
    }

    #[test]
    fn empty_filter_is_identity() {
        let registry = registry();
        let filter = CatalogFilter::new();
        assert_eq!(ids(query(&registry, &filter)), ["ring", "wave", "stars"]);
    }

    #[test]
    fn search_is_case_insensitive_over_name_and_description() {
        let registry = registry();
        let ring = CatalogFilter::new().with_search("RING");
        assert_eq!(ids(query(&registry, &ring)), ["ring"]);
        let field = CatalogFilter::new().with_search("starField");
        assert_eq!(ids(query(&registry, &field)), ["stars"]);
    }

    #[test]
    fn tags_use_and_semantics() {
        let registry = registry();
        let filter = CatalogFilter::new().with_tag("fluid").with_tag("shader");
        assert_eq!(ids(query(&registry, &filter)), ["ring"]);
    }

    #[test]
    fn search_and_tags_combine() {
        let registry = registry();
        let filter = CatalogFilter::new().with_search("milky").with_tag("space");
        assert_eq!(ids(query(&registry, &filter)), ["stars"]);
    }

    #[test]
    fn toggle_tag_adds_then_removes() {
        let mut filter = CatalogFilter::new();
        assert!(filter.toggle_tag("fluid"));
        assert!(filter.selected_tags.contains("fluid"));
        assert!(!filter.toggle_tag("fluid"));
        assert!(filter.is_empty());
    }

    #[test]
    fn all_tags_keeps_first_seen_order() {
        assert_eq!(all_tags(&registry()), ["shader", "fluid", "space"]);
    }
}
