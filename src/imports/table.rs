//! Ordered import symbol table.
//!
//! The table is an insertion-ordered list scanned linearly. Duplicate names are allowed and
//! the first entry wins, so overrides are expressed by registering them *earlier*:
//!
//! ```text
//!  [ glViewport -> clamp ]  [ malloc -> libc ]  ...  [ glViewport -> host ]
//!          ▲ first match wins                                 shadowed
//! ```
//!
//! Once handed to the binder the table is never mutated again, so lookups need no
//! synchronization.

use std::borrow::Cow;

use crate::{
    imports::{ImportEntry, ImportKind},
    module::SymbolResolver,
};

/// Ordered, first-match-wins mapping from symbol name to host address.
///
/// # Examples
///
/// ```rust
/// use soshim::ImportTable;
///
/// let table = ImportTable::new()
///     .function("strlen", 0x1000)
///     .function("strlen", 0x2000);
///
/// assert_eq!(table.lookup("strlen").map(|e| e.target()), Some(0x1000));
/// assert!(table.lookup("memcpy").is_none());
/// ```
#[derive(Clone, Debug, Default)]
pub struct ImportTable {
    entries: Vec<ImportEntry>,
}

impl ImportTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty table with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Appends a function entry.
    #[must_use]
    pub fn function(mut self, name: impl Into<Cow<'static, str>>, target: usize) -> Self {
        self.push(ImportEntry::function(name, target));
        self
    }

    /// Appends a data entry.
    #[must_use]
    pub fn data(mut self, name: impl Into<Cow<'static, str>>, target: usize) -> Self {
        self.push(ImportEntry::data(name, target));
        self
    }

    /// Appends an entry. An earlier entry of the same name keeps precedence.
    pub fn push(&mut self, entry: ImportEntry) {
        self.entries.push(entry);
    }

    /// Appends every entry of `other` after the existing ones.
    pub fn extend_from(&mut self, other: ImportTable) {
        self.entries.extend(other.entries);
    }

    /// Returns a table where every entry of `overrides` shadows the entries of `self`.
    #[must_use]
    pub fn overridden_by(self, overrides: ImportTable) -> Self {
        let mut entries = overrides.entries;
        entries.extend(self.entries);
        Self { entries }
    }

    /// Finds the first entry named `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&ImportEntry> {
        self.entries.iter().find(|entry| entry.name() == name)
    }

    /// Finds the first entry named `name` whose kind matches.
    #[must_use]
    pub fn lookup_kind(&self, name: &str, kind: ImportKind) -> Option<&ImportEntry> {
        self.entries
            .iter()
            .find(|entry| entry.kind() == kind && entry.name() == name)
    }

    /// Returns `true` when some entry is named `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// Number of entries, shadowed ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ImportEntry> {
        self.entries.iter()
    }
}

impl SymbolResolver for ImportTable {
    fn resolve(&self, name: &str) -> Option<usize> {
        self.lookup(name).map(ImportEntry::target)
    }
}

impl FromIterator<ImportEntry> for ImportTable {
    fn from_iter<T: IntoIterator<Item = ImportEntry>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ImportTable {
    type Item = &'a ImportEntry;
    type IntoIter = std::slice::Iter<'a, ImportEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_match_wins() {
        let table = ImportTable::new()
            .function("glViewport", 0x10)
            .function("malloc", 0x20)
            .function("glViewport", 0x30);

        assert_eq!(table.len(), 3);
        assert_eq!(table.resolve("glViewport"), Some(0x10));
        assert_eq!(table.resolve("malloc"), Some(0x20));
        assert_eq!(table.resolve("free"), None);
    }

    #[test]
    fn test_overridden_by_shadows_base() {
        let base = ImportTable::new()
            .function("glViewport", 0x30)
            .function("glClear", 0x40);
        let overrides = ImportTable::new().function("glViewport", 0x10);

        let table = base.overridden_by(overrides);
        assert_eq!(table.resolve("glViewport"), Some(0x10));
        assert_eq!(table.resolve("glClear"), Some(0x40));
        assert_eq!(table.iter().next().map(ImportEntry::name), Some("glViewport"));
    }

    #[test]
    fn test_lookup_kind() {
        let table = ImportTable::new()
            .function("__sF", 0x10)
            .data("__sF", 0x20);

        assert_eq!(
            table.lookup_kind("__sF", ImportKind::Data).map(ImportEntry::target),
            Some(0x20)
        );
        assert_eq!(table.lookup("__sF").map(ImportEntry::kind), Some(ImportKind::Function));
    }

    #[test]
    fn test_extend_keeps_existing_precedence() {
        let mut table = ImportTable::new().function("abort", 0x1);
        table.extend_from(ImportTable::new().function("abort", 0x2).function("exit", 0x3));
        assert_eq!(table.resolve("abort"), Some(0x1));
        assert_eq!(table.resolve("exit"), Some(0x3));
        assert!(table.contains("exit"));
    }

    #[test]
    fn test_from_iterator() {
        let table: ImportTable = ["a", "b"]
            .into_iter()
            .enumerate()
            .map(|(i, name)| ImportEntry::function(name, i + 1))
            .collect();
        assert_eq!(table.resolve("b"), Some(2));
        assert!(!table.is_empty());
    }
}
