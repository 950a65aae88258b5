//! # soshim Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the soshim library. Import this module to get quick access to the essential
//! types for binding, hooking and launching a guest module.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all soshim bootstrap operations
pub use crate::Error;

/// The result type used throughout soshim
pub use crate::Result;

// ================================================================================================
// Configuration
// ================================================================================================

/// Top level configuration and its sections
pub use crate::config::{
    BridgeConfig, DisplayConfig, EntryConfig, ShimConfig, ThreadConfig, UnresolvedPolicy,
};

// ================================================================================================
// Loader Interface
// ================================================================================================

/// Traits implemented by the external loader and its modules
pub use crate::module::{ImportReference, Loader, Module, ReferenceKind, SymbolResolver};

/// Host `dlsym` based resolution
pub use crate::module::DlsymResolver;

// ================================================================================================
// Import Symbol Table
// ================================================================================================

/// Table, binder and the report a bind produces
pub use crate::imports::{BindReport, Binder, ImportEntry, ImportKind, ImportTable};

/// ELF coverage scan
pub use crate::imports::{Coverage, ImportScan, ScannedImport};

// ================================================================================================
// Synchronization Proxy
// ================================================================================================

/// Handle cells and their lifecycle
pub use crate::sync::{Errno, HandleCell, Lifecycle, PrimitiveKind};

// ================================================================================================
// Runtime Bridge
// ================================================================================================

/// Bridge tables, slots and method identifiers
pub use crate::bridge::{EnvSlot, MethodId, RuntimeBridge, VmSlot};

// ================================================================================================
// Interception
// ================================================================================================

/// Hook mechanism and substitution rules
pub use crate::hook::{
    Architecture, CodeMemory, HookManager, HostCodeMemory, InlineHook, SubstitutionRule,
    SubstitutionTable,
};

// ================================================================================================
// Bootstrap
// ================================================================================================

/// Process bootstrap
pub use crate::launcher::{LaunchReport, Launcher};
