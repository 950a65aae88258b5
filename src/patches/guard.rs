//! Host side of the static-local guard protocol.
//!
//! The guest compiler wraps the initialization of function-local statics in
//! `__cxa_guard_acquire` / `__cxa_guard_release`. The guard is a word owned by the guest;
//! its first byte is nonzero once the static is initialized, and guest code tests that byte
//! inline before calling in. The second byte marks an initialization in progress.
//!
//! ```text
//! acquire ──► byte 0 set? ──yes──► 0 (already initialized)
//!                 │ no
//!                 ▼
//!            byte 1 set? ──yes──► wait for release / abort, retry
//!                 │ no
//!                 ▼
//!            set byte 1 ──► 1 (caller initializes, then release or abort)
//! ```
//!
//! One process-wide lock serializes all guards, matching the C++ runtime's own strategy.

use std::{
    ffi::{c_int, c_void},
    sync::{
        atomic::{AtomicU8, Ordering},
        Condvar, Mutex, MutexGuard, PoisonError,
    },
};

static LOCK: Mutex<()> = Mutex::new(());
static RELEASED: Condvar = Condvar::new();

fn lock() -> MutexGuard<'static, ()> {
    LOCK.lock().unwrap_or_else(PoisonError::into_inner)
}

/// # Safety
///
/// `guard` must point to at least two writable bytes that outlive the guard protocol.
unsafe fn bytes<'a>(guard: *mut c_void) -> (&'a AtomicU8, &'a AtomicU8) {
    let base = guard.cast::<u8>();
    (AtomicU8::from_ptr(base), AtomicU8::from_ptr(base.add(1)))
}

/// `__cxa_guard_acquire`: 1 if the caller must run the initializer, 0 if it already ran.
///
/// # Safety
///
/// `guard` must be a guest guard variable.
pub unsafe extern "C" fn acquire(guard: *mut c_void) -> c_int {
    let (done, pending) = bytes(guard);
    if done.load(Ordering::Acquire) != 0 {
        return 0;
    }

    let mut held = lock();
    loop {
        if done.load(Ordering::Acquire) != 0 {
            return 0;
        }
        if pending.load(Ordering::Relaxed) == 0 {
            pending.store(1, Ordering::Relaxed);
            return 1;
        }
        held = RELEASED.wait(held).unwrap_or_else(PoisonError::into_inner);
    }
}

/// `__cxa_guard_release`: marks the static initialized and wakes waiters.
///
/// # Safety
///
/// `guard` must have been acquired by the caller.
pub unsafe extern "C" fn release(guard: *mut c_void) {
    let (done, pending) = bytes(guard);
    let _held = lock();
    pending.store(0, Ordering::Relaxed);
    done.store(1, Ordering::Release);
    RELEASED.notify_all();
}

/// `__cxa_guard_abort`: the initializer threw, let another caller retry.
///
/// # Safety
///
/// `guard` must have been acquired by the caller.
pub unsafe extern "C" fn abort(guard: *mut c_void) {
    let (_, pending) = bytes(guard);
    let _held = lock();
    pending.store(0, Ordering::Relaxed);
    RELEASED.notify_all();
}
