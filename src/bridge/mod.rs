//! Emulated managed-runtime bridge.
//!
//! Guest modules built against the Android runtime call back into it through two function
//! tables: the environment table (`JNIEnv`) for class, method, field, string and reference
//! operations, and the instance table (`JavaVM`) for thread attachment. No managed runtime
//! exists on the host, so [`RuntimeBridge`] fabricates both tables with emulation functions
//! that answer plausibly and never fail.
//!
//! # Architecture
//!
//! ```text
//! env handle ──► ┌──────────────────┐        vm handle ──► ┌──────────────────┐
//!                │ [0] ─► self       │                      │ [0] ─► self       │
//!                │ [4] GetVersion    │                      │ [3] DestroyJavaVM │
//!                │ [6] FindClass     │                      │ [4] AttachCurrent │
//!                │ ...               │                      │ [6] GetEnv ──┐    │
//!                │ [219] GetJavaVM ──┼──► vm handle         └──────────────┼───┘
//!                │ ...  (ret0)       │◄────────────────────────────────────┘
//!                └──────────────────┘
//! ```
//!
//! Each table is one page of pointer-sized cells. Cell 0 points back at the table itself,
//! so the table address is simultaneously the handle (`JNIEnv*`) and the function table
//! (`*env`). Populated cells hold the functions of [`env`] and [`vm`] at the offsets listed
//! by [`EnvSlot`] and [`VmSlot`]; every other cell holds a neutral stub returning zero.
//!
//! # Lookups
//!
//! `GetMethodID` and `GetStaticMethodID` map the requested name to a [`MethodId`]. Names
//! outside the fixed table resolve to [`MethodId::Unknown`], and invoking an unknown
//! method returns the neutral value of its family:
//!
//! | Family | Neutral value |
//! |--------|---------------|
//! | Integer, long, boolean | `0` |
//! | Float | `0.0` |
//! | Object | null |
//! | Void | no-op |
//!
//! Object handles returned by the bridge are the fixed sentinels in this module. They are
//! never dereferenced by the bridge, the guest passes them back opaquely.
//!
//! # Thread Safety
//!
//! The tables are written only while a [`RuntimeBridge`] is being built and are read-only
//! afterwards, so any guest thread may call through them.

pub mod env;
mod method;
mod slot;
mod table;
pub mod vm;

use std::{
    ffi::c_void,
    sync::atomic::{AtomicUsize, Ordering},
};

pub use method::MethodId;
pub use slot::{EnvSlot, VmSlot, TABLE_BYTES, TABLE_CELLS};
pub use table::{BridgeState, RuntimeBridge};

/// Object returned by `FindClass`.
pub const CLASS_SENTINEL: usize = 0x4141_4141;

/// Object returned by `NewGlobalRef`.
pub const GLOBAL_REF_SENTINEL: usize = 0x4242_4242;

/// Object returned by `NewObjectV`.
pub const OBJECT_SENTINEL: usize = 0x4343_4343;

/// Object returned by `GetObjectClass`.
pub const OBJECT_CLASS_SENTINEL: usize = 0x4444_4444;

/// Version reported by `GetVersion` (`JNI_VERSION_1_6`).
pub const BRIDGE_VERSION: i32 = 0x0001_0006;

// Guest entry points reached without arguments (`SDL_AndroidGetJNIEnv`) have no other way to
// find the environment, so there is one active bridge per process, set by the launcher.
static ACTIVE_ENV: AtomicUsize = AtomicUsize::new(0);

/// Environment handle of the activated bridge, null before activation.
///
/// This is what the platform accessors (`Android_JNI_GetEnv`, `SDL_AndroidGetJNIEnv`)
/// hand to the guest.
#[must_use]
pub fn active_env() -> *mut c_void {
    ACTIVE_ENV.load(Ordering::Acquire) as *mut c_void
}

pub(crate) fn set_active_env(env: usize) {
    ACTIVE_ENV.store(env, Ordering::Release);
}

pub(crate) fn clear_active_env(env: usize) {
    let _ = ACTIVE_ENV.compare_exchange(env, 0, Ordering::AcqRel, Ordering::Acquire);
}
