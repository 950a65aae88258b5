//! `sem_*` proxies.
//!
//! Unlike the `pthread_*` family, semaphore calls report failure as `-1` with `errno` set.
//! A semaphore used before `sem_init` is constructed with a count of zero.

use std::ffi::{c_int, c_uint};

use libc::{sem_t, timespec};

use crate::{
    imports::stubs::{host_errno_location, set_errno},
    sync::{HandleCell, HostPrimitive, PrimitiveKind},
};

/// Host semaphore.
pub struct Semaphore;

/// Parameters of a semaphore construction.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SemaphoreInit {
    /// Initial count
    pub value: c_uint,
}

fn last_errno() -> c_int {
    // SAFETY: pointer to the calling thread's errno
    unsafe { *host_errno_location() }
}

impl HostPrimitive for Semaphore {
    type Raw = sem_t;
    type Init = SemaphoreInit;
    const KIND: PrimitiveKind = PrimitiveKind::Semaphore;

    unsafe fn init(raw: *mut sem_t, init: &SemaphoreInit) -> c_int {
        if libc::sem_init(raw, 0, init.value) == 0 {
            0
        } else {
            last_errno()
        }
    }

    unsafe fn destroy(raw: *mut sem_t) -> c_int {
        if libc::sem_destroy(raw) == 0 {
            0
        } else {
            last_errno()
        }
    }
}

unsafe fn with_semaphore(sem: *mut *mut sem_t, op: impl FnOnce(*mut sem_t) -> c_int) -> c_int {
    let Some(cell) = HandleCell::<Semaphore>::from_guest(sem) else {
        set_errno(libc::EINVAL);
        return -1;
    };
    match cell.get_or_construct() {
        Ok(raw) => op(raw.as_ptr()),
        Err(errno) => {
            set_errno(errno.code());
            -1
        }
    }
}

/// `sem_init`
///
/// Process-shared semaphores are created process-private.
pub unsafe extern "C" fn init(sem: *mut *mut sem_t, _pshared: c_int, value: c_uint) -> c_int {
    let Some(cell) = HandleCell::<Semaphore>::from_guest(sem) else {
        set_errno(libc::EINVAL);
        return -1;
    };
    match cell.construct(SemaphoreInit { value }) {
        Ok(_) => 0,
        Err(errno) => {
            set_errno(errno.code());
            -1
        }
    }
}

/// `sem_destroy`
pub unsafe extern "C" fn destroy(sem: *mut *mut sem_t) -> c_int {
    let Some(cell) = HandleCell::<Semaphore>::from_guest(sem) else {
        set_errno(libc::EINVAL);
        return -1;
    };
    match cell.destroy() {
        0 => 0,
        code => {
            set_errno(code);
            -1
        }
    }
}

/// `sem_post`
pub unsafe extern "C" fn post(sem: *mut *mut sem_t) -> c_int {
    with_semaphore(sem, |raw| libc::sem_post(raw))
}

/// `sem_wait`
pub unsafe extern "C" fn wait(sem: *mut *mut sem_t) -> c_int {
    with_semaphore(sem, |raw| libc::sem_wait(raw))
}

/// `sem_trywait`
pub unsafe extern "C" fn trywait(sem: *mut *mut sem_t) -> c_int {
    with_semaphore(sem, |raw| libc::sem_trywait(raw))
}

/// `sem_timedwait`
pub unsafe extern "C" fn timedwait(sem: *mut *mut sem_t, deadline: *const timespec) -> c_int {
    if deadline.is_null() {
        set_errno(libc::EINVAL);
        return -1;
    }
    with_semaphore(sem, |raw| libc::sem_timedwait(raw, deadline))
}

/// `sem_getvalue`
pub unsafe extern "C" fn getvalue(sem: *mut *mut sem_t, value: *mut c_int) -> c_int {
    if value.is_null() {
        set_errno(libc::EINVAL);
        return -1;
    }
    with_semaphore(sem, |raw| libc::sem_getvalue(raw, value))
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;

    fn guest_semaphore() -> *mut *mut sem_t {
        Box::leak(Box::new(ptr::null_mut::<sem_t>()))
    }

    #[test]
    fn test_init_post_wait() {
        let sem = guest_semaphore();
        let mut value = -1;
        unsafe {
            assert_eq!(init(sem, 0, 2), 0);
            assert_eq!(getvalue(sem, &mut value), 0);
            assert_eq!(value, 2);
            assert_eq!(wait(sem), 0);
            assert_eq!(trywait(sem), 0);
            assert_eq!(trywait(sem), -1);
            assert_eq!(*host_errno_location(), libc::EAGAIN);
            assert_eq!(post(sem), 0);
            assert_eq!(getvalue(sem, &mut value), 0);
            assert_eq!(value, 1);
            assert_eq!(destroy(sem), 0);
            assert!((*sem).is_null());
        }
    }

    #[test]
    fn test_lazy_semaphore_starts_at_zero() {
        let sem = guest_semaphore();
        let mut value = -1;
        unsafe {
            assert_eq!(getvalue(sem, &mut value), 0);
            assert_eq!(value, 0);
            assert_eq!(post(sem), 0);
            assert_eq!(wait(sem), 0);
            assert_eq!(destroy(sem), 0);
        }
    }

    #[test]
    fn test_null_semaphore() {
        unsafe {
            assert_eq!(post(ptr::null_mut()), -1);
            assert_eq!(*host_errno_location(), libc::EINVAL);
        }
    }

    #[test]
    fn test_post_from_other_thread() {
        let sem = guest_semaphore();
        unsafe { assert_eq!(init(sem, 0, 0), 0) };
        let address = sem as usize;
        let poster = std::thread::spawn(move || unsafe { post(address as *mut *mut sem_t) });
        unsafe { assert_eq!(wait(sem), 0) };
        assert_eq!(poster.join().unwrap(), 0);
        unsafe { destroy(sem) };
    }
}
