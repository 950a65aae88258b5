//! A single name to address binding.

use std::{borrow::Cow, fmt};

/// What an entry's target is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ImportKind {
    /// A host function callable with the guest's calling convention
    Function,
    /// Host data the guest reads or writes in place
    Data,
}

/// One entry of an [`super::ImportTable`]: a symbol name and the host address bound to it.
///
/// Entries are immutable once constructed. Names are usually static strings from the
/// default vocabulary, but runtime-resolved overrides own their name.
#[derive(Clone, PartialEq, Eq)]
pub struct ImportEntry {
    name: Cow<'static, str>,
    target: usize,
    kind: ImportKind,
}

impl ImportEntry {
    /// Creates a new entry.
    #[must_use]
    pub fn new(name: impl Into<Cow<'static, str>>, target: usize, kind: ImportKind) -> Self {
        Self {
            name: name.into(),
            target,
            kind,
        }
    }

    /// Creates a function entry.
    #[must_use]
    pub fn function(name: impl Into<Cow<'static, str>>, target: usize) -> Self {
        Self::new(name, target, ImportKind::Function)
    }

    /// Creates a data entry.
    #[must_use]
    pub fn data(name: impl Into<Cow<'static, str>>, target: usize) -> Self {
        Self::new(name, target, ImportKind::Data)
    }

    /// The symbol name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The host address.
    #[must_use]
    pub fn target(&self) -> usize {
        self.target
    }

    /// Function or data.
    #[must_use]
    pub fn kind(&self) -> ImportKind {
        self.kind
    }
}

impl fmt::Debug for ImportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {:#x} ({:?})", self.name, self.target, self.kind)
    }
}
