//! `pthread_*` thread and `pthread_attr_*` proxies.
//!
//! A guest `pthread_t` is a pointer to a heap allocated host `pthread_t`. Every thread the
//! guest creates runs on a stack of the pinned size (512 KiB unless configured otherwise),
//! whatever size the guest's attribute object asked for.
//!
//! Thread handles are never freed: the guest may still compare or detach a handle after
//! joining it.
//!
//! The guest's attribute object is never modified. Creation builds a host attribute object
//! from its detach state and scheduling parameters plus the pinned stack size. A new thread
//! is held at a gate until its handle has been stored in the guest's `pthread_t`, so the
//! routine always observes its own handle.

use std::{
    cell::UnsafeCell,
    ffi::{c_char, c_int, c_void, CStr},
    mem::MaybeUninit,
    ptr,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Condvar, Mutex, PoisonError,
    },
};

use libc::{pthread_attr_t, pthread_t, sched_param, size_t};
use log::{debug, warn};

use crate::sync::{self, status, HandleCell, HostPrimitive, PrimitiveKind};

/// Thread entry routine.
pub type StartRoutine = extern "C" fn(*mut c_void) -> *mut c_void;

static GUEST_STACK_SIZE: AtomicUsize = AtomicUsize::new(512 * 1024);

/// Sets the stack size every guest thread is created with.
pub fn set_guest_stack_size(size: usize) {
    GUEST_STACK_SIZE.store(size.max(libc::PTHREAD_STACK_MIN), Ordering::Relaxed);
}

/// The pinned guest thread stack size.
#[must_use]
pub fn guest_stack_size() -> usize {
    GUEST_STACK_SIZE.load(Ordering::Relaxed)
}

/// Host thread handle.
pub struct Thread;

/// Host thread attribute object.
pub struct ThreadAttr;

/// Holds a new thread back until its creator has published the handle.
#[derive(Debug, Default)]
pub struct StartGate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl StartGate {
    /// Releases the waiting thread.
    pub fn open(&self) {
        *self.open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.opened.notify_all();
    }

    fn wait(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self
                .opened
                .wait(open)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct PendingStart {
    routine: StartRoutine,
    arg: *mut c_void,
    gate: Arc<StartGate>,
}

extern "C" fn gated_start(pending: *mut c_void) -> *mut c_void {
    // SAFETY: created by Box::into_raw in Thread::init and consumed exactly once here
    let pending = unsafe { Box::from_raw(pending.cast::<PendingStart>()) };
    pending.gate.wait();
    (pending.routine)(pending.arg)
}

/// Parameters of a thread creation.
#[derive(Clone, Debug)]
pub struct ThreadStart {
    /// Entry routine, `None` cannot be started
    pub routine: Option<StartRoutine>,
    /// Argument passed to the routine
    pub arg: *mut c_void,
    /// Guest supplied host attributes, null for defaults; read, never modified
    pub attr: *mut pthread_attr_t,
    /// Gate the routine waits on before running, `None` to start immediately
    pub gate: Option<Arc<StartGate>>,
}

impl Default for ThreadStart {
    fn default() -> Self {
        Self {
            routine: None,
            arg: ptr::null_mut(),
            attr: ptr::null_mut(),
            gate: None,
        }
    }
}

/// Initializes `out` from the detach state and scheduling parameters of `guest`, with the
/// pinned stack size.
unsafe fn host_attributes(out: *mut pthread_attr_t, guest: *const pthread_attr_t) -> c_int {
    let code = libc::pthread_attr_init(out);
    if code != 0 {
        return code;
    }
    let mut code = libc::pthread_attr_setstacksize(out, guest_stack_size());
    if code == 0 && !guest.is_null() {
        let mut state = libc::PTHREAD_CREATE_JOINABLE;
        code = sync::pthread_attr_getdetachstate(guest, &mut state);
        if code == 0 {
            code = libc::pthread_attr_setdetachstate(out, state);
        }
        let mut param = MaybeUninit::<sched_param>::zeroed();
        if code == 0 && libc::pthread_attr_getschedparam(guest, param.as_mut_ptr()) == 0 {
            code = libc::pthread_attr_setschedparam(out, param.as_ptr());
        }
    }
    if code != 0 {
        libc::pthread_attr_destroy(out);
    }
    code
}

impl HostPrimitive for Thread {
    type Raw = pthread_t;
    type Init = ThreadStart;
    const KIND: PrimitiveKind = PrimitiveKind::Thread;

    unsafe fn init(raw: *mut pthread_t, init: &ThreadStart) -> c_int {
        let Some(routine) = init.routine else {
            return libc::EINVAL;
        };
        let mut attr = MaybeUninit::<pthread_attr_t>::uninit();
        let code = host_attributes(attr.as_mut_ptr(), init.attr);
        if code != 0 {
            return code;
        }

        let code = match &init.gate {
            Some(gate) => {
                let pending = Box::into_raw(Box::new(PendingStart {
                    routine,
                    arg: init.arg,
                    gate: Arc::clone(gate),
                }));
                let code = libc::pthread_create(raw, attr.as_ptr(), gated_start, pending.cast());
                if code != 0 {
                    drop(Box::from_raw(pending));
                }
                code
            }
            None => libc::pthread_create(raw, attr.as_ptr(), routine, init.arg),
        };
        libc::pthread_attr_destroy(attr.as_mut_ptr());
        code
    }

    unsafe fn destroy(_raw: *mut pthread_t) -> c_int {
        0
    }
}

impl HostPrimitive for ThreadAttr {
    type Raw = pthread_attr_t;
    type Init = ();
    const KIND: PrimitiveKind = PrimitiveKind::ThreadAttr;

    unsafe fn init(raw: *mut pthread_attr_t, _init: &()) -> c_int {
        libc::pthread_attr_init(raw)
    }

    unsafe fn destroy(raw: *mut pthread_attr_t) -> c_int {
        libc::pthread_attr_destroy(raw)
    }
}

/// `pthread_create`
pub unsafe extern "C" fn create(
    thread: *mut *mut pthread_t,
    attr: *mut *mut pthread_attr_t,
    routine: Option<StartRoutine>,
    arg: *mut c_void,
) -> c_int {
    let Some(cell) = HandleCell::<Thread>::from_guest(thread) else {
        return libc::EINVAL;
    };
    let attr = HandleCell::<ThreadAttr>::from_guest(attr)
        .and_then(HandleCell::<ThreadAttr>::raw)
        .map_or(ptr::null_mut(), |raw| raw.as_ptr());
    let gate = Arc::new(StartGate::default());
    let start = ThreadStart {
        routine,
        arg,
        attr,
        gate: Some(Arc::clone(&gate)),
    };
    let result = cell.construct(start).map(|_| 0);
    gate.open();
    if result.is_ok() {
        debug!("guest thread created with {} byte stack", guest_stack_size());
    }
    status(result)
}

/// `pthread_join`
pub unsafe extern "C" fn join(thread: *mut pthread_t, value: *mut *mut c_void) -> c_int {
    if thread.is_null() {
        return libc::ESRCH;
    }
    libc::pthread_join(*thread, value)
}

/// `pthread_detach`
pub unsafe extern "C" fn detach(thread: *mut pthread_t) -> c_int {
    if thread.is_null() {
        return libc::ESRCH;
    }
    libc::pthread_detach(*thread)
}

/// `pthread_equal`
pub unsafe extern "C" fn equal(left: *const pthread_t, right: *const pthread_t) -> c_int {
    if left == right {
        return 1;
    }
    if left.is_null() || right.is_null() {
        return 0;
    }
    c_int::from(libc::pthread_equal(*left, *right) != 0)
}

thread_local! {
    static SELF_HANDLE: UnsafeCell<pthread_t> = UnsafeCell::new(unsafe { libc::pthread_self() });
}

/// `pthread_self`
///
/// Returns a per-thread handle comparable with those produced by [`create`].
pub extern "C" fn self_handle() -> *mut pthread_t {
    SELF_HANDLE.with(UnsafeCell::get)
}

/// `pthread_setschedparam`
pub unsafe extern "C" fn setschedparam(
    thread: *mut pthread_t,
    policy: c_int,
    param: *const sched_param,
) -> c_int {
    if thread.is_null() {
        return libc::ESRCH;
    }
    libc::pthread_setschedparam(*thread, policy, param)
}

/// `pthread_getschedparam`
pub unsafe extern "C" fn getschedparam(
    thread: *mut pthread_t,
    policy: *mut c_int,
    param: *mut sched_param,
) -> c_int {
    if thread.is_null() {
        return libc::ESRCH;
    }
    libc::pthread_getschedparam(*thread, policy, param)
}

/// `pthread_setname_np`
///
/// Names are validated and logged but not applied.
pub unsafe extern "C" fn setname_np(thread: *mut pthread_t, name: *const c_char) -> c_int {
    const MAX_TASK_COMM_LEN: usize = 16;
    if thread.is_null() || name.is_null() {
        return libc::EINVAL;
    }
    let name = CStr::from_ptr(name);
    if name.to_bytes().len() >= MAX_TASK_COMM_LEN {
        return libc::ERANGE;
    }
    debug!("guest named a thread '{}'", name.to_string_lossy());
    0
}

/// `pthread_getattr_np`
pub unsafe extern "C" fn getattr_np(_thread: *mut pthread_t, _attr: *mut c_void) -> c_int {
    warn!("pthread_getattr_np is not supported, reporting success");
    0
}

unsafe fn with_attr(
    attr: *mut *mut pthread_attr_t,
    op: impl FnOnce(*mut pthread_attr_t) -> c_int,
) -> c_int {
    let Some(cell) = HandleCell::<ThreadAttr>::from_guest(attr) else {
        return libc::EINVAL;
    };
    status(cell.get_or_construct().map(|raw| op(raw.as_ptr())))
}

/// `pthread_attr_init`
pub unsafe extern "C" fn attr_init(attr: *mut *mut pthread_attr_t) -> c_int {
    match HandleCell::<ThreadAttr>::from_guest(attr) {
        Some(cell) => status(cell.construct(()).map(|_| 0)),
        None => libc::EINVAL,
    }
}

/// `pthread_attr_destroy`
pub unsafe extern "C" fn attr_destroy(attr: *mut *mut pthread_attr_t) -> c_int {
    match HandleCell::<ThreadAttr>::from_guest(attr) {
        Some(cell) => cell.destroy(),
        None => libc::EINVAL,
    }
}

/// `pthread_attr_setdetachstate`
pub unsafe extern "C" fn attr_setdetachstate(attr: *mut *mut pthread_attr_t, state: c_int) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_setdetachstate(raw, state))
}

/// `pthread_attr_getdetachstate`
pub unsafe extern "C" fn attr_getdetachstate(
    attr: *mut *mut pthread_attr_t,
    state: *mut c_int,
) -> c_int {
    if state.is_null() {
        return libc::EINVAL;
    }
    with_attr(attr, |raw| sync::pthread_attr_getdetachstate(raw, state))
}

/// `pthread_attr_setstacksize`
///
/// Recorded in the attribute object, then overridden by the pinned size at creation.
pub unsafe extern "C" fn attr_setstacksize(attr: *mut *mut pthread_attr_t, size: size_t) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_setstacksize(raw, size))
}

/// `pthread_attr_getstacksize`
pub unsafe extern "C" fn attr_getstacksize(
    attr: *mut *mut pthread_attr_t,
    size: *mut size_t,
) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_getstacksize(raw, size))
}

/// `pthread_attr_setstack`
pub unsafe extern "C" fn attr_setstack(
    attr: *mut *mut pthread_attr_t,
    stack: *mut c_void,
    size: size_t,
) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_setstack(raw, stack, size))
}

/// `pthread_attr_getstack`
pub unsafe extern "C" fn attr_getstack(
    attr: *mut *mut pthread_attr_t,
    stack: *mut *mut c_void,
    size: *mut size_t,
) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_getstack(raw, stack, size))
}

/// `pthread_attr_setschedparam`
pub unsafe extern "C" fn attr_setschedparam(
    attr: *mut *mut pthread_attr_t,
    param: *const sched_param,
) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_setschedparam(raw, param))
}

/// `pthread_attr_getschedparam`
pub unsafe extern "C" fn attr_getschedparam(
    attr: *mut *mut pthread_attr_t,
    param: *mut sched_param,
) -> c_int {
    with_attr(attr, |raw| libc::pthread_attr_getschedparam(raw, param))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    static OBSERVED_STACK: AtomicUsize = AtomicUsize::new(0);

    extern "C" fn double(arg: *mut c_void) -> *mut c_void {
        (arg as usize * 2) as *mut c_void
    }

    #[cfg(target_os = "linux")]
    extern "C" fn record_stack(_arg: *mut c_void) -> *mut c_void {
        unsafe {
            let mut attr = MaybeUninit::<pthread_attr_t>::uninit();
            if libc::pthread_getattr_np(libc::pthread_self(), attr.as_mut_ptr()) == 0 {
                let mut size = 0;
                libc::pthread_attr_getstacksize(attr.as_ptr(), &mut size);
                OBSERVED_STACK.store(size, Ordering::SeqCst);
                libc::pthread_attr_destroy(attr.as_mut_ptr());
            }
        }
        ptr::null_mut()
    }

    #[test]
    fn test_create_and_join() {
        let mut handle: *mut pthread_t = ptr::null_mut();
        let mut value: *mut c_void = ptr::null_mut();
        unsafe {
            assert_eq!(create(&mut handle, ptr::null_mut(), Some(double), 21 as *mut c_void), 0);
            assert!(!handle.is_null());
            assert_eq!(equal(handle, handle), 1);
            assert_eq!(equal(handle, self_handle()), 0);
            assert_eq!(join(handle, &mut value), 0);
        }
        assert_eq!(value as usize, 42);
    }

    extern "C" fn sees_own_handle(slot: *mut c_void) -> *mut c_void {
        let published = unsafe { *slot.cast::<*mut pthread_t>() };
        if published.is_null() {
            return ptr::null_mut();
        }
        let own = unsafe { libc::pthread_equal(*published, libc::pthread_self()) };
        (own != 0) as usize as *mut c_void
    }

    #[test]
    fn test_handle_published_before_routine_runs() {
        for _ in 0..32 {
            let slot: &'static mut *mut pthread_t = Box::leak(Box::new(ptr::null_mut()));
            let address: *mut *mut pthread_t = slot;
            let mut value: *mut c_void = ptr::null_mut();
            unsafe {
                assert_eq!(create(address, ptr::null_mut(), Some(sees_own_handle), address.cast()), 0);
                assert_eq!(join(*address, &mut value), 0);
            }
            assert_eq!(value as usize, 1);
        }
    }

    #[test]
    fn test_detach_state_round_trip() {
        let mut attr: *mut pthread_attr_t = ptr::null_mut();
        let mut state = -1;
        unsafe {
            assert_eq!(attr_init(&mut attr), 0);
            assert_eq!(attr_getdetachstate(&mut attr, &mut state), 0);
            assert_eq!(state, libc::PTHREAD_CREATE_JOINABLE);
            assert_eq!(attr_setdetachstate(&mut attr, libc::PTHREAD_CREATE_DETACHED), 0);
            assert_eq!(attr_getdetachstate(&mut attr, &mut state), 0);
            assert_eq!(attr_getdetachstate(&mut attr, ptr::null_mut()), libc::EINVAL);
            assert_eq!(attr_destroy(&mut attr), 0);
        }
        assert_eq!(state, libc::PTHREAD_CREATE_DETACHED);
    }

    #[cfg(target_os = "linux")]
    extern "C" fn report_detach_state(out: *mut c_void) -> *mut c_void {
        unsafe {
            let mut attr = MaybeUninit::<pthread_attr_t>::uninit();
            if libc::pthread_getattr_np(libc::pthread_self(), attr.as_mut_ptr()) == 0 {
                let mut state = -1;
                sync::pthread_attr_getdetachstate(attr.as_ptr(), &mut state);
                (*out.cast::<AtomicUsize>()).store(state as usize, Ordering::SeqCst);
                libc::pthread_attr_destroy(attr.as_mut_ptr());
            }
        }
        ptr::null_mut()
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_detach_state_copied_from_guest() {
        let observed: &'static AtomicUsize = Box::leak(Box::new(AtomicUsize::new(usize::MAX)));
        let mut attr: *mut pthread_attr_t = ptr::null_mut();
        let mut handle: *mut pthread_t = ptr::null_mut();
        unsafe {
            assert_eq!(attr_init(&mut attr), 0);
            assert_eq!(attr_setdetachstate(&mut attr, libc::PTHREAD_CREATE_DETACHED), 0);
            let out = observed as *const AtomicUsize as *mut c_void;
            assert_eq!(create(&mut handle, &mut attr, Some(report_detach_state), out), 0);
            assert_eq!(attr_destroy(&mut attr), 0);
        }
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while observed.load(Ordering::SeqCst) == usize::MAX && std::time::Instant::now() < deadline {
            std::thread::yield_now();
        }
        assert_eq!(
            observed.load(Ordering::SeqCst),
            libc::PTHREAD_CREATE_DETACHED as usize
        );
    }

    #[test]
    fn test_create_without_routine() {
        let mut handle: *mut pthread_t = ptr::null_mut();
        let code = unsafe { create(&mut handle, ptr::null_mut(), None, ptr::null_mut()) };
        assert_eq!(code, libc::EINVAL);
        assert!(handle.is_null());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_guest_stack_request_is_overridden() {
        let mut attr: *mut pthread_attr_t = ptr::null_mut();
        let mut handle: *mut pthread_t = ptr::null_mut();
        unsafe {
            assert_eq!(attr_init(&mut attr), 0);
            assert_eq!(attr_setstacksize(&mut attr, 8 * 1024 * 1024), 0);
            assert_eq!(create(&mut handle, &mut attr, Some(record_stack), ptr::null_mut()), 0);
            assert_eq!(join(handle, ptr::null_mut()), 0);

            let mut requested = 0;
            assert_eq!(attr_getstacksize(&mut attr, &mut requested), 0);
            assert_eq!(requested, 8 * 1024 * 1024);
            assert_eq!(attr_destroy(&mut attr), 0);
        }
        let observed = OBSERVED_STACK.load(Ordering::SeqCst);
        assert!(observed >= guest_stack_size());
        assert!(observed < 8 * 1024 * 1024);
    }

    #[test]
    fn test_self_is_stable_per_thread() {
        let first = self_handle();
        let second = self_handle();
        assert_eq!(first, second);
        assert_eq!(unsafe { equal(first, second) }, 1);
        assert_eq!(unsafe { equal(first, ptr::null()) }, 0);
    }

    #[test]
    fn test_setname_validation() {
        let mut handle: pthread_t = unsafe { libc::pthread_self() };
        unsafe {
            assert_eq!(setname_np(&mut handle, c"worker".as_ptr()), 0);
            assert_eq!(
                setname_np(&mut handle, c"a-name-that-is-too-long".as_ptr()),
                libc::ERANGE
            );
            assert_eq!(setname_np(ptr::null_mut(), c"x".as_ptr()), libc::EINVAL);
        }
    }
}
