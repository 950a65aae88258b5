//! `pthread_mutex_*` and `pthread_mutexattr_*` proxies.

use std::{
    ffi::c_int,
    mem::MaybeUninit,
    ptr,
};

use libc::{pthread_mutex_t, pthread_mutexattr_t};

use crate::sync::{self, status, HandleCell, HostPrimitive, PrimitiveKind};

/// Bionic `PTHREAD_RECURSIVE_MUTEX_INITIALIZER`.
pub const BIONIC_RECURSIVE_INITIALIZER: usize = 0x4000;

/// Bionic `PTHREAD_ERRORCHECK_MUTEX_INITIALIZER`.
pub const BIONIC_ERRORCHECK_INITIALIZER: usize = 0x8000;

/// Host mutex.
pub struct Mutex;

/// Host mutex attribute object.
pub struct MutexAttr;

/// Parameters of a mutex construction.
#[derive(Clone, Copy, Debug)]
pub struct MutexInit {
    /// Host attribute object, null for defaults
    pub attr: *const pthread_mutexattr_t,
    /// Mutex type forced by a static initializer
    pub kind: Option<c_int>,
}

impl Default for MutexInit {
    fn default() -> Self {
        Self {
            attr: ptr::null(),
            kind: None,
        }
    }
}

impl HostPrimitive for Mutex {
    type Raw = pthread_mutex_t;
    type Init = MutexInit;
    const KIND: PrimitiveKind = PrimitiveKind::Mutex;

    unsafe fn init(raw: *mut pthread_mutex_t, init: &MutexInit) -> c_int {
        let Some(kind) = init.kind else {
            return libc::pthread_mutex_init(raw, init.attr);
        };
        let mut attr = MaybeUninit::<pthread_mutexattr_t>::uninit();
        let code = libc::pthread_mutexattr_init(attr.as_mut_ptr());
        if code != 0 {
            return code;
        }
        let mut code = libc::pthread_mutexattr_settype(attr.as_mut_ptr(), kind);
        if code == 0 {
            code = libc::pthread_mutex_init(raw, attr.as_ptr());
        }
        libc::pthread_mutexattr_destroy(attr.as_mut_ptr());
        code
    }

    unsafe fn destroy(raw: *mut pthread_mutex_t) -> c_int {
        libc::pthread_mutex_destroy(raw)
    }

    fn from_static(tag: usize) -> Option<MutexInit> {
        let kind = match tag {
            BIONIC_RECURSIVE_INITIALIZER => libc::PTHREAD_MUTEX_RECURSIVE,
            BIONIC_ERRORCHECK_INITIALIZER => libc::PTHREAD_MUTEX_ERRORCHECK,
            _ => return None,
        };
        Some(MutexInit {
            attr: ptr::null(),
            kind: Some(kind),
        })
    }
}

impl HostPrimitive for MutexAttr {
    type Raw = pthread_mutexattr_t;
    type Init = ();
    const KIND: PrimitiveKind = PrimitiveKind::MutexAttr;

    unsafe fn init(raw: *mut pthread_mutexattr_t, _init: &()) -> c_int {
        libc::pthread_mutexattr_init(raw)
    }

    unsafe fn destroy(raw: *mut pthread_mutexattr_t) -> c_int {
        libc::pthread_mutexattr_destroy(raw)
    }
}

/// The host attribute held by a guest attribute cell, null when absent or unconstructed.
pub(crate) unsafe fn host_attr(attr: *mut *mut pthread_mutexattr_t) -> *const pthread_mutexattr_t {
    HandleCell::<MutexAttr>::from_guest(attr)
        .and_then(HandleCell::<MutexAttr>::raw)
        .map_or(ptr::null(), |raw| raw.as_ptr().cast_const())
}

/// Runs `op` on the host mutex of `mutex`, constructing it first when needed.
pub(crate) unsafe fn with_mutex(
    mutex: *mut *mut pthread_mutex_t,
    op: impl FnOnce(*mut pthread_mutex_t) -> c_int,
) -> c_int {
    let Some(cell) = HandleCell::<Mutex>::from_guest(mutex) else {
        return libc::EINVAL;
    };
    status(cell.get_or_construct().map(|raw| op(raw.as_ptr())))
}

/// `pthread_mutex_init`
pub unsafe extern "C" fn init(
    mutex: *mut *mut pthread_mutex_t,
    attr: *mut *mut pthread_mutexattr_t,
) -> c_int {
    let Some(cell) = HandleCell::<Mutex>::from_guest(mutex) else {
        return libc::EINVAL;
    };
    let init = MutexInit {
        attr: host_attr(attr),
        kind: None,
    };
    status(cell.construct(init).map(|_| 0))
}

/// `pthread_mutex_destroy`
pub unsafe extern "C" fn destroy(mutex: *mut *mut pthread_mutex_t) -> c_int {
    match HandleCell::<Mutex>::from_guest(mutex) {
        Some(cell) => cell.destroy(),
        None => libc::EINVAL,
    }
}

/// `pthread_mutex_lock`
pub unsafe extern "C" fn lock(mutex: *mut *mut pthread_mutex_t) -> c_int {
    with_mutex(mutex, |raw| libc::pthread_mutex_lock(raw))
}

/// `pthread_mutex_trylock`
pub unsafe extern "C" fn trylock(mutex: *mut *mut pthread_mutex_t) -> c_int {
    with_mutex(mutex, |raw| libc::pthread_mutex_trylock(raw))
}

/// `pthread_mutex_unlock`
pub unsafe extern "C" fn unlock(mutex: *mut *mut pthread_mutex_t) -> c_int {
    with_mutex(mutex, |raw| libc::pthread_mutex_unlock(raw))
}

/// `pthread_mutexattr_init`
pub unsafe extern "C" fn attr_init(attr: *mut *mut pthread_mutexattr_t) -> c_int {
    match HandleCell::<MutexAttr>::from_guest(attr) {
        Some(cell) => status(cell.construct(()).map(|_| 0)),
        None => libc::EINVAL,
    }
}

/// `pthread_mutexattr_destroy`
pub unsafe extern "C" fn attr_destroy(attr: *mut *mut pthread_mutexattr_t) -> c_int {
    match HandleCell::<MutexAttr>::from_guest(attr) {
        Some(cell) => cell.destroy(),
        None => libc::EINVAL,
    }
}

unsafe fn with_attr(
    attr: *mut *mut pthread_mutexattr_t,
    op: impl FnOnce(*mut pthread_mutexattr_t) -> c_int,
) -> c_int {
    let Some(cell) = HandleCell::<MutexAttr>::from_guest(attr) else {
        return libc::EINVAL;
    };
    status(cell.get_or_construct().map(|raw| op(raw.as_ptr())))
}

/// `pthread_mutexattr_settype`
pub unsafe extern "C" fn attr_settype(attr: *mut *mut pthread_mutexattr_t, kind: c_int) -> c_int {
    with_attr(attr, |raw| libc::pthread_mutexattr_settype(raw, kind))
}

/// `pthread_mutexattr_gettype`
pub unsafe extern "C" fn attr_gettype(
    attr: *mut *mut pthread_mutexattr_t,
    kind: *mut c_int,
) -> c_int {
    if kind.is_null() {
        return libc::EINVAL;
    }
    with_attr(attr, |raw| sync::pthread_mutexattr_gettype(raw, kind))
}

/// `pthread_mutexattr_setpshared`
pub unsafe extern "C" fn attr_setpshared(
    attr: *mut *mut pthread_mutexattr_t,
    pshared: c_int,
) -> c_int {
    with_attr(attr, |raw| libc::pthread_mutexattr_setpshared(raw, pshared))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{ledger_entry, Lifecycle};

    fn guest_cell() -> *mut *mut pthread_mutex_t {
        Box::leak(Box::new(ptr::null_mut::<pthread_mutex_t>()))
    }

    #[test]
    fn test_static_mutex_locks_lazily() {
        let mutex = guest_cell();
        unsafe {
            assert_eq!(lock(mutex), 0);
            assert!(!(*mutex).is_null());
            assert_eq!(unlock(mutex), 0);
            assert_eq!(ledger_entry(mutex as usize).unwrap().constructions, 1);
            assert_eq!(destroy(mutex), 0);
            assert!((*mutex).is_null());
        }
        assert!(ledger_entry(mutex as usize).is_none());
    }

    #[test]
    fn test_init_then_lock_allocates_once() {
        let mutex = guest_cell();
        unsafe {
            assert_eq!(init(mutex, ptr::null_mut()), 0);
            let backing = *mutex;
            assert_eq!(lock(mutex), 0);
            assert_eq!(trylock(mutex), libc::EBUSY);
            assert_eq!(unlock(mutex), 0);
            assert_eq!(*mutex, backing);
            let entry = ledger_entry(mutex as usize).unwrap();
            assert_eq!(entry.constructions, 1);
            assert_eq!(entry.lifecycle, Lifecycle::Constructed);
            assert_eq!(destroy(mutex), 0);
        }
        assert!(ledger_entry(mutex as usize).is_none());
    }

    #[test]
    fn test_bionic_recursive_initializer() {
        let mutex: *mut *mut pthread_mutex_t =
            Box::leak(Box::new(BIONIC_RECURSIVE_INITIALIZER as *mut pthread_mutex_t));
        unsafe {
            assert_eq!(lock(mutex), 0);
            assert_eq!(lock(mutex), 0);
            assert_eq!(unlock(mutex), 0);
            assert_eq!(unlock(mutex), 0);
            assert_eq!(destroy(mutex), 0);
        }
    }

    #[test]
    fn test_recursive_attr() {
        let attr: *mut *mut pthread_mutexattr_t = Box::leak(Box::new(ptr::null_mut()));
        let mutex = guest_cell();
        unsafe {
            assert_eq!(attr_init(attr), 0);
            assert_eq!(attr_settype(attr, libc::PTHREAD_MUTEX_RECURSIVE), 0);
            let mut kind = 0;
            assert_eq!(attr_gettype(attr, &mut kind), 0);
            assert_eq!(kind, libc::PTHREAD_MUTEX_RECURSIVE);

            assert_eq!(init(mutex, attr), 0);
            assert_eq!(attr_destroy(attr), 0);
            assert!((*attr).is_null());

            assert_eq!(lock(mutex), 0);
            assert_eq!(trylock(mutex), 0);
            assert_eq!(unlock(mutex), 0);
            assert_eq!(unlock(mutex), 0);
            assert_eq!(destroy(mutex), 0);
        }
    }

    #[test]
    fn test_null_cell_rejected() {
        unsafe {
            assert_eq!(lock(ptr::null_mut()), libc::EINVAL);
            assert_eq!(destroy(ptr::null_mut()), libc::EINVAL);
        }
    }
}
