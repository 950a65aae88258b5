//! Interception of functions inside loaded modules.
//!
//! Hooks redirect a resolved or module-internal function to a host replacement while
//! keeping a way back to the original, so patches can wrap behavior rather than replace
//! it.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`arch`] | Instruction sets and jump encodings |
//! | [`memory`] | Rewriting code pages |
//! | [`core`] | The [`InlineHook`] patch and `call_original` |
//! | [`manager`] | [`HookManager`] registry |
//! | [`patch`] | [`SubstitutionTable`] for content patches |
//!
//! # Call Flow
//!
//! ```text
//! guest calls target
//!         │
//!         ▼
//! ┌───────────────────┐
//! │ patched jump      │
//! └───────────────────┘
//!         │
//!         ▼
//! ┌───────────────────┐
//! │ replacement       │───► return directly (redirect)
//! └───────────────────┘
//!         │ apply substitutions
//!         ▼
//! ┌───────────────────┐
//! │ call_original     │ restore bytes, call, re-patch
//! └───────────────────┘
//!         │
//!         ▼
//!    return result
//! ```
//!
//! Hooks are installed once and stay for the life of the process. There is no nesting: a
//! site carries at most one hook.

pub mod arch;
pub mod core;
pub mod manager;
pub mod memory;
pub mod patch;

pub use arch::Architecture;
pub use self::core::InlineHook;
pub use manager::HookManager;
pub use memory::{flush_instruction_cache, CodeMemory, HostCodeMemory, Protection};
pub use patch::{SubstitutionRule, SubstitutionTable};
