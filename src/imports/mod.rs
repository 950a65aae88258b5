//! Import symbol table and binding.
//!
//! The [`ImportTable`] is the vocabulary consulted when a module's unresolved references are
//! bound: an ordered list of `name -> address` entries where the first entry of a name wins.
//! The [`Binder`] applies a table to a [`crate::module::Module`] under an
//! [`crate::config::UnresolvedPolicy`].
//!
//! # Key Components
//!
//! - [`ImportTable`] - Ordered entries, read-only once binding starts
//! - [`Binder`] / [`BindReport`] - Applies a table to one module
//! - [`default_table`] - The complete host vocabulary for a configuration
//! - [`ImportScan`] - Lists the undefined symbols of a shared object and checks coverage
//! - [`stubs`] - Host replacements for guest C library and platform calls
//!
//! # Ordering
//!
//! ```text
//! ┌──────────────────┐   first match wins
//! │ graphics overrides│ ◄── glViewport, glShaderSource, ...
//! ├──────────────────┤
//! │ sync proxies      │ ◄── pthread_*, sem_*
//! ├──────────────────┤
//! │ compat shims      │ ◄── __errno, stat, getcwd, ...
//! ├──────────────────┤
//! │ logging, bridge   │
//! ├──────────────────┤
//! │ data symbols      │ ◄── __sF, __stack_chk_guard
//! ├──────────────────┤
//! │ host pass-through │ ◄── libc, libm, GL, SDL
//! └──────────────────┘
//! ```

mod binder;
mod defaults;
mod entry;
mod scan;
pub mod stubs;
mod table;

pub use binder::{neutral_target, BindReport, Binder};
pub use defaults::{default_table, default_table_with};
pub use entry::{ImportEntry, ImportKind};
pub use scan::{Coverage, ImportScan, ScannedImport};
pub use table::ImportTable;
