//! Process-wide record of cell lifecycles, keyed by cell address.
//!
//! Only live cells have an entry. Destroying a cell retires its entry and folds it into
//! per-family totals, so guests that churn stack-allocated primitives keep the map at the
//! number of primitives alive at once.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    OnceLock,
};

use dashmap::DashMap;
use strum::EnumCount;

use crate::sync::{Lifecycle, PrimitiveKind};

/// What the ledger knows about one guest cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LedgerEntry {
    /// Primitive family stored in the cell
    pub kind: PrimitiveKind,
    /// Last recorded state
    pub lifecycle: Lifecycle,
    /// Host primitives constructed into the cell since it was last destroyed
    pub constructions: usize,
}

/// Running totals of one primitive family over the life of the process.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LedgerTotals {
    /// Host primitives constructed
    pub constructions: usize,
    /// Host primitives destroyed
    pub destructions: usize,
}

struct Counters {
    constructions: [AtomicUsize; PrimitiveKind::COUNT],
    destructions: [AtomicUsize; PrimitiveKind::COUNT],
}

#[allow(clippy::declare_interior_mutable_const)]
const ZERO: AtomicUsize = AtomicUsize::new(0);

static COUNTERS: Counters = Counters {
    constructions: [ZERO; PrimitiveKind::COUNT],
    destructions: [ZERO; PrimitiveKind::COUNT],
};

fn ledger() -> &'static DashMap<usize, LedgerEntry> {
    static LEDGER: OnceLock<DashMap<usize, LedgerEntry>> = OnceLock::new();
    LEDGER.get_or_init(DashMap::new)
}

/// Looks up the ledger entry of the live cell at `address`.
#[must_use]
pub fn ledger_entry(address: usize) -> Option<LedgerEntry> {
    ledger().get(&address).map(|entry| *entry)
}

/// Number of cells currently backed by a host primitive.
#[must_use]
pub fn live_cells() -> usize {
    ledger().len()
}

/// Construction and destruction totals of `kind`.
#[must_use]
pub fn ledger_totals(kind: PrimitiveKind) -> LedgerTotals {
    LedgerTotals {
        constructions: COUNTERS.constructions[kind as usize].load(Ordering::Relaxed),
        destructions: COUNTERS.destructions[kind as usize].load(Ordering::Relaxed),
    }
}

pub(crate) fn record_construct(address: usize, kind: PrimitiveKind) {
    COUNTERS.constructions[kind as usize].fetch_add(1, Ordering::Relaxed);
    let mut entry = ledger().entry(address).or_insert(LedgerEntry {
        kind,
        lifecycle: Lifecycle::Unconstructed,
        constructions: 0,
    });
    // A cell address reused for another family starts over
    if entry.kind != kind {
        *entry = LedgerEntry {
            kind,
            lifecycle: Lifecycle::Unconstructed,
            constructions: 0,
        };
    }
    entry.lifecycle = Lifecycle::Constructed;
    entry.constructions += 1;
}

/// Retires the entry of a destroyed cell, returning it in its final state.
pub(crate) fn record_destroy(address: usize) -> Option<LedgerEntry> {
    let (_, mut entry) = ledger().remove(&address)?;
    COUNTERS.destructions[entry.kind as usize].fetch_add(1, Ordering::Relaxed);
    entry.lifecycle = Lifecycle::Destroyed;
    Some(entry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_sequence() {
        let address = 0x7fff_0000_1000;
        assert!(ledger_entry(address).is_none());

        let before = ledger_totals(PrimitiveKind::ThreadAttr);
        record_construct(address, PrimitiveKind::ThreadAttr);
        let entry = ledger_entry(address).unwrap();
        assert_eq!(entry.lifecycle, Lifecycle::Constructed);
        assert_eq!(entry.constructions, 1);

        let retired = record_destroy(address).unwrap();
        assert_eq!(retired.lifecycle, Lifecycle::Destroyed);
        assert_eq!(retired.constructions, 1);
        assert!(ledger_entry(address).is_none());

        let after = ledger_totals(PrimitiveKind::ThreadAttr);
        assert!(after.constructions > before.constructions);
        assert!(after.destructions > before.destructions);

        record_construct(address, PrimitiveKind::Mutex);
        record_construct(address, PrimitiveKind::Cond);
        let entry = ledger_entry(address).unwrap();
        assert_eq!(entry.kind, PrimitiveKind::Cond);
        assert_eq!(entry.constructions, 1);
        record_destroy(address);
    }

    #[test]
    fn test_destroy_unknown_is_ignored() {
        assert!(record_destroy(0x7fff_0000_2000).is_none());
        assert!(ledger_entry(0x7fff_0000_2000).is_none());
    }

    #[test]
    fn test_churned_cells_are_pruned() {
        let addresses: Vec<usize> = (0..256).map(|i| 0x7ffe_0000_0000 + i * 8).collect();
        for &address in &addresses {
            record_construct(address, PrimitiveKind::Semaphore);
        }
        assert!(live_cells() >= addresses.len());
        for &address in &addresses {
            assert!(record_destroy(address).is_some());
        }
        assert!(addresses.iter().all(|&a| ledger_entry(a).is_none()));
    }
}
