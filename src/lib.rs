// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::missing_safety_doc)]
// - 'sync' and 'bridge' expose `extern "C"` entry points that dereference guest pointers
// - 'hook' rewrites executable memory in place

//! # soshim
//!
//! Runtime glue for executing a foreign-compiled shared object (built against a managed
//! runtime host and a different C library) on a platform that provides neither.
//!
//! Once an external loader has mapped and relocated the guest module, `soshim`:
//!
//! - **Binds** the module's unresolved references against an ordered [`ImportTable`]
//! - **Intercepts** selected entry points with inline hooks that can still call the
//!   displaced original ([`hook`])
//! - **Emulates** the native bridge of the managed runtime through fixed-layout dispatch
//!   tables ([`bridge`])
//! - **Proxies** the guest's opaque synchronization handles onto host primitives
//!   ([`sync`])
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use soshim::prelude::*;
//!
//! let config = ShimConfig::lenient().with_data_path("/opt/game");
//! let report = Launcher::new(MyLoader::default(), config).run()?;
//! println!("guest returned {}", report.exit_code);
//! # Ok::<(), soshim::Error>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//!  external loader ──► Module ──► Binder ◄── ImportTable (defaults + overrides)
//!                                   │
//!                                   ▼
//!                             HookManager ◄── patches (shader table, stubs, guards)
//!                                   │
//!                                   ▼
//!                            RuntimeBridge (env / vm tables)
//!                                   │
//!                                   ▼
//!                     guest thread: JNI_OnLoad(vm) → entry(0, NULL)
//! ```
//!
//! - [`imports`] - Import symbol table, binding policy and ELF import coverage scan
//! - [`sync`] - Synchronization primitive proxy for guest `pthread_*` / `sem_*` calls
//! - [`bridge`] - Emulated runtime bridge (environment and instance tables)
//! - [`hook`] - Inline interception with a callable path to the original
//! - [`patches`] - Module specific hooks and graphics overrides
//! - [`launcher`] - Process bootstrap tying everything together
//! - [`Error`] and [`Result`] - Error handling

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// Configuration for the binding policy, guest threads, display and entry contract.
pub mod config;

/// Interfaces of the external loader and the modules it produces.
pub mod module;

/// Import symbol table, binding of unresolved references and coverage scanning.
///
/// # Key Types
///
/// - [`imports::ImportTable`] - Ordered, first-match-wins name to address table
/// - [`imports::Binder`] - Applies a table to a [`module::Module`] under an
///   [`config::UnresolvedPolicy`]
/// - [`imports::ImportScan`] - Lists undefined dynamic symbols of an ELF file
pub mod imports;

/// Synchronization primitive proxy.
///
/// Maps the guest's pointer-sized primitive handles onto lazily constructed host
/// primitives. See [`sync::HandleCell`] for the lifecycle.
pub mod sync;

/// Emulated runtime bridge.
///
/// Two self-referencing dispatch tables addressed by byte offset, plus a symbolic
/// member resolver ([`bridge::MethodId`]).
pub mod bridge;

/// Inline interception of module entry points.
///
/// # Key Types
///
/// - [`hook::InlineHook`] - One installed hook and its path back to the original
/// - [`hook::HookManager`] - Registry enforcing one hook per address
/// - [`hook::SubstitutionTable`] - Ordered `{predicate, substitute}` rules
pub mod hook;

/// Behavior patches for the target module and its graphics backend.
pub mod patches;

/// Process bootstrap: load, bind, hook, construct the bridge and run the guest entry.
pub mod launcher;

/// `soshim` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `soshim` Error type
///
/// The main error type for bootstrap operations. Steady-state guest calls never surface
/// it; they return host error codes or neutral values instead.
pub use error::Error;

pub use bridge::{MethodId, RuntimeBridge};
pub use config::{ShimConfig, UnresolvedPolicy};
pub use hook::{HookManager, InlineHook};
pub use imports::{Binder, ImportEntry, ImportTable};
pub use launcher::{LaunchReport, Launcher};
pub use module::{Loader, Module};
