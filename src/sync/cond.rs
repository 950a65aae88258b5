//! `pthread_cond_*` and `pthread_condattr_*` proxies.
//!
//! Waiting calls construct both the condition variable and the mutex lazily, since either
//! may still be a static initializer at the first wait. Deadlines are forwarded unchanged.

use std::{ffi::c_int, ptr};

use libc::{pthread_cond_t, pthread_condattr_t, pthread_mutex_t, timespec};

use crate::sync::{mutex, status, HandleCell, HostPrimitive, PrimitiveKind};

/// Host condition variable.
pub struct Cond;

/// Host condition attribute object.
pub struct CondAttr;

/// Parameters of a condition variable construction.
#[derive(Clone, Copy, Debug)]
pub struct CondInit {
    /// Host attribute object, null for defaults
    pub attr: *const pthread_condattr_t,
}

impl Default for CondInit {
    fn default() -> Self {
        Self { attr: ptr::null() }
    }
}

impl HostPrimitive for Cond {
    type Raw = pthread_cond_t;
    type Init = CondInit;
    const KIND: PrimitiveKind = PrimitiveKind::Cond;

    unsafe fn init(raw: *mut pthread_cond_t, init: &CondInit) -> c_int {
        libc::pthread_cond_init(raw, init.attr)
    }

    unsafe fn destroy(raw: *mut pthread_cond_t) -> c_int {
        libc::pthread_cond_destroy(raw)
    }
}

impl HostPrimitive for CondAttr {
    type Raw = pthread_condattr_t;
    type Init = ();
    const KIND: PrimitiveKind = PrimitiveKind::CondAttr;

    unsafe fn init(raw: *mut pthread_condattr_t, _init: &()) -> c_int {
        libc::pthread_condattr_init(raw)
    }

    unsafe fn destroy(raw: *mut pthread_condattr_t) -> c_int {
        libc::pthread_condattr_destroy(raw)
    }
}

unsafe fn with_cond(
    cond: *mut *mut pthread_cond_t,
    op: impl FnOnce(*mut pthread_cond_t) -> c_int,
) -> c_int {
    let Some(cell) = HandleCell::<Cond>::from_guest(cond) else {
        return libc::EINVAL;
    };
    status(cell.get_or_construct().map(|raw| op(raw.as_ptr())))
}

/// `pthread_cond_init`
pub unsafe extern "C" fn init(
    cond: *mut *mut pthread_cond_t,
    attr: *mut *mut pthread_condattr_t,
) -> c_int {
    let Some(cell) = HandleCell::<Cond>::from_guest(cond) else {
        return libc::EINVAL;
    };
    let attr = HandleCell::<CondAttr>::from_guest(attr)
        .and_then(HandleCell::<CondAttr>::raw)
        .map_or(ptr::null(), |raw| raw.as_ptr().cast_const());
    status(cell.construct(CondInit { attr }).map(|_| 0))
}

/// `pthread_cond_destroy`
pub unsafe extern "C" fn destroy(cond: *mut *mut pthread_cond_t) -> c_int {
    match HandleCell::<Cond>::from_guest(cond) {
        Some(cell) => cell.destroy(),
        None => libc::EINVAL,
    }
}

/// `pthread_cond_signal`
pub unsafe extern "C" fn signal(cond: *mut *mut pthread_cond_t) -> c_int {
    with_cond(cond, |raw| libc::pthread_cond_signal(raw))
}

/// `pthread_cond_broadcast`
pub unsafe extern "C" fn broadcast(cond: *mut *mut pthread_cond_t) -> c_int {
    with_cond(cond, |raw| libc::pthread_cond_broadcast(raw))
}

/// `pthread_cond_wait`
pub unsafe extern "C" fn wait(
    cond: *mut *mut pthread_cond_t,
    mutex: *mut *mut pthread_mutex_t,
) -> c_int {
    with_cond(cond, |cond| {
        mutex::with_mutex(mutex, |mutex| libc::pthread_cond_wait(cond, mutex))
    })
}

/// `pthread_cond_timedwait`
pub unsafe extern "C" fn timedwait(
    cond: *mut *mut pthread_cond_t,
    mutex: *mut *mut pthread_mutex_t,
    deadline: *const timespec,
) -> c_int {
    if deadline.is_null() {
        return libc::EINVAL;
    }
    with_cond(cond, |cond| {
        mutex::with_mutex(mutex, |mutex| {
            libc::pthread_cond_timedwait(cond, mutex, deadline)
        })
    })
}

/// `pthread_condattr_init`
pub unsafe extern "C" fn attr_init(attr: *mut *mut pthread_condattr_t) -> c_int {
    match HandleCell::<CondAttr>::from_guest(attr) {
        Some(cell) => status(cell.construct(()).map(|_| 0)),
        None => libc::EINVAL,
    }
}

/// `pthread_condattr_destroy`
pub unsafe extern "C" fn attr_destroy(attr: *mut *mut pthread_condattr_t) -> c_int {
    match HandleCell::<CondAttr>::from_guest(attr) {
        Some(cell) => cell.destroy(),
        None => libc::EINVAL,
    }
}
