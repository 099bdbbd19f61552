//! Redirection tables
//!
//! The table is the configuration surface of the engine: an ordered list of
//! (source, destination) pairs, applied in authoring order. Tables are built in code
//! or loaded from TOML:
//!
//! ```toml
//! libraries = ["./libreplacements.so"]
//!
//! [[redirect]]
//! group = "trade"
//! note = "adjusted price calculation"
//! source = "Tradeable::PriceFor"
//! destination = "RA_Tradeable::PriceFor"
//!
//! [[redirect]]
//! enabled = false
//! source = { type = "Pawn", member = "Goods", kind = "getter", flags = ["instance", "public"] }
//! destination = { type = "RA_Pawn", member = "Goods", kind = "getter" }
//! ```

use crate::descriptor::MethodDescriptor;
use crate::error::TableError;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

fn default_enabled() -> bool {
    true
}

/// One (source, destination) pair
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RedirectionEntry {
    pub source: MethodDescriptor,
    pub destination: MethodDescriptor,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl RedirectionEntry {
    pub fn new(source: MethodDescriptor, destination: MethodDescriptor) -> Self {
        Self {
            source,
            destination,
            group: None,
            note: None,
            enabled: true,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Keep the entry in the table without applying it
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Ordered set of redirections
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RedirectionTable {
    /// Shared objects a host loader should make available before resolving
    #[serde(default)]
    pub libraries: Vec<String>,
    #[serde(default, rename = "redirect")]
    pub entries: Vec<RedirectionEntry>,
}

impl RedirectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair
    pub fn redirect(self, source: MethodDescriptor, destination: MethodDescriptor) -> Self {
        self.entry(RedirectionEntry::new(source, destination))
    }

    pub fn entry(mut self, entry: RedirectionEntry) -> Self {
        self.entries.push(entry);
        self
    }

    pub fn library(mut self, path: impl Into<String>) -> Self {
        self.libraries.push(path.into());
        self
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, TableError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, TableError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn enabled(&self) -> impl Iterator<Item = &RedirectionEntry> {
        self.entries.iter().filter(|e| e.enabled)
    }

    /// Group names in order of first appearance
    pub fn groups(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.entries
            .iter()
            .filter_map(|e| e.group.as_deref())
            .filter(|g| seen.insert(*g))
            .collect()
    }

    /// Enabled sources that appear more than once, in order of first appearance
    pub fn duplicate_sources(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut reported = HashSet::new();
        let mut duplicates = Vec::new();

        for entry in self.enabled() {
            let name = entry.source.to_string();
            if !seen.insert(name.clone()) && reported.insert(name.clone()) {
                duplicates.push(name);
            }
        }

        duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{BindingFlags, MemberKind};
    use std::io::Write;

    const SAMPLE: &str = r#"
libraries = ["./libascension.so"]

[[redirect]]
group = "various"
note = "delay CheckGameOver first call"
source = "GameEnder::CheckGameOver"
destination = "RA_GameEnder::CheckGameOver"

[[redirect]]
group = "trade"
source = { type = "Pawn", member = "Goods", kind = "getter", flags = ["instance", "public"] }
destination = { type = "RA_Pawn", member = "Goods", kind = "getter" }

[[redirect]]
group = "trade"
source = "Tradeable::PriceFor"
destination = "RA_Tradeable::PriceFor"

[[redirect]]
group = "diplomacy"
enabled = false
source = "Faction::SetHostileTo"
destination = "RA_Faction::SetHostileTo"

[[redirect]]
group = "combat"
source = "Tradeable::PriceFor"
destination = "CR.Detours_Tradeable::PriceFor"
"#;

    #[test]
    fn test_parse_table() {
        let table = RedirectionTable::from_toml_str(SAMPLE).unwrap();

        assert_eq!(table.libraries, vec!["./libascension.so"]);
        assert_eq!(table.len(), 5);
        assert_eq!(table.enabled().count(), 4);

        let goods = &table.entries[1];
        assert_eq!(goods.source.kind, MemberKind::Getter);
        assert_eq!(
            goods.source.flags,
            BindingFlags::INSTANCE | BindingFlags::PUBLIC
        );
        assert_eq!(goods.destination.flags, BindingFlags::all());
        assert_eq!(
            table.entries[0].note.as_deref(),
            Some("delay CheckGameOver first call")
        );
    }

    #[test]
    fn test_groups_in_order() {
        let table = RedirectionTable::from_toml_str(SAMPLE).unwrap();
        assert_eq!(table.groups(), vec!["various", "trade", "diplomacy", "combat"]);
    }

    #[test]
    fn test_duplicate_sources() {
        let table = RedirectionTable::from_toml_str(SAMPLE).unwrap();
        assert_eq!(table.duplicate_sources(), vec!["Tradeable.PriceFor"]);
    }

    #[test]
    fn test_disabled_entries_do_not_count_as_duplicates() {
        let table = RedirectionTable::new()
            .redirect(
                MethodDescriptor::new("A", "a"),
                MethodDescriptor::new("B", "b"),
            )
            .entry(
                RedirectionEntry::new(
                    MethodDescriptor::new("A", "a"),
                    MethodDescriptor::new("C", "c"),
                )
                .disabled(),
            );
        assert!(table.duplicate_sources().is_empty());
    }

    #[test]
    fn test_invalid_descriptor_is_reported() {
        let err = RedirectionTable::from_toml_str(
            r#"
            [[redirect]]
            source = "Foo::"
            destination = "Bar::baz"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, TableError::Parse(_)));
        assert!(err.to_string().contains("missing member name"));
    }

    #[test]
    fn test_empty_table() {
        let table = RedirectionTable::from_toml_str("").unwrap();
        assert!(table.is_empty());
        assert!(table.libraries.is_empty());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let table = RedirectionTable::from_toml_file(file.path()).unwrap();
        assert_eq!(table.len(), 5);

        assert!(matches!(
            RedirectionTable::from_toml_file("/nonexistent/rewire.toml"),
            Err(TableError::Io(_))
        ));
    }
}
