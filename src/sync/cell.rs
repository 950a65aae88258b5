use std::{
    ffi::c_int,
    marker::PhantomData,
    mem,
    ptr::{self, NonNull},
    sync::atomic::{AtomicPtr, Ordering},
};

use log::{debug, trace};

use crate::sync::{
    ledger::{record_construct, record_destroy},
    Errno, HostPrimitive, Lifecycle,
};

/// Decoded contents of a cell.
enum Slot<P: HostPrimitive> {
    Unconstructed(P::Init),
    Constructed(NonNull<P::Raw>),
}

/// A guest primitive object viewed as a pointer-sized cell owning a host primitive.
///
/// `HandleCell` is `repr(transparent)` over an atomic pointer, so a guest
/// `pthread_mutex_t *` can be reinterpreted as `&HandleCell<Mutex>` with
/// [`HandleCell::from_guest`].
///
/// # Examples
///
/// ```rust
/// use soshim::sync::{mutex::Mutex, HandleCell, Lifecycle};
///
/// let cell = HandleCell::<Mutex>::new();
/// assert_eq!(cell.lifecycle(), Lifecycle::Unconstructed);
///
/// let raw = cell.get_or_construct().unwrap();
/// assert_eq!(cell.raw(), Some(raw));
/// assert_eq!(cell.destroy(), 0);
/// assert!(cell.raw().is_none());
/// ```
#[repr(transparent)]
pub struct HandleCell<P: HostPrimitive> {
    slot: AtomicPtr<P::Raw>,
    _primitive: PhantomData<P>,
}

impl<P: HostPrimitive> HandleCell<P> {
    /// Creates a null cell, equivalent to a statically initialized guest primitive.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slot: AtomicPtr::new(ptr::null_mut()),
            _primitive: PhantomData,
        }
    }

    /// Views a guest primitive object as a cell.
    ///
    /// Returns `None` for a null pointer.
    ///
    /// # Safety
    ///
    /// A non-null `cell` must be aligned, pointer-sized, writable guest memory that stays
    /// valid for `'a` and is only accessed through this proxy.
    #[must_use]
    pub unsafe fn from_guest<'a, T>(cell: *mut T) -> Option<&'a Self> {
        let cell = cell.cast::<Self>();
        if cell.is_null() {
            None
        } else {
            Some(&*cell)
        }
    }

    /// Address of the cell, the key of its ledger entry.
    #[must_use]
    pub fn address(&self) -> usize {
        self as *const Self as usize
    }

    fn decode(&self, value: *mut P::Raw) -> Slot<P> {
        if value.is_null() {
            return Slot::Unconstructed(P::Init::default());
        }
        match P::from_static(value as usize) {
            Some(init) => Slot::Unconstructed(init),
            None => match NonNull::new(value) {
                Some(raw) => Slot::Constructed(raw),
                None => Slot::Unconstructed(P::Init::default()),
            },
        }
    }

    /// The host primitive, if constructed.
    #[must_use]
    pub fn raw(&self) -> Option<NonNull<P::Raw>> {
        match self.decode(self.slot.load(Ordering::Acquire)) {
            Slot::Constructed(raw) => Some(raw),
            Slot::Unconstructed(_) => None,
        }
    }

    /// Current state of the cell.
    #[must_use]
    pub fn lifecycle(&self) -> Lifecycle {
        if self.raw().is_some() {
            Lifecycle::Constructed
        } else {
            Lifecycle::Unconstructed
        }
    }

    fn allocate(init: &P::Init) -> Result<NonNull<P::Raw>, Errno> {
        // SAFETY: calloc returns zeroed memory or null
        let memory = unsafe { libc::calloc(1, mem::size_of::<P::Raw>().max(1)) };
        let raw = NonNull::new(memory.cast::<P::Raw>()).ok_or(Errno(libc::ENOMEM))?;
        // SAFETY: raw is zeroed and large enough for P::Raw
        let code = unsafe { P::init(raw.as_ptr(), init) };
        if code != 0 {
            // SAFETY: raw came from calloc above
            unsafe { libc::free(raw.as_ptr().cast()) };
            return Err(Errno(code));
        }
        Ok(raw)
    }

    unsafe fn release(raw: NonNull<P::Raw>) -> c_int {
        let code = P::destroy(raw.as_ptr());
        libc::free(raw.as_ptr().cast());
        code
    }

    /// Constructs a host primitive with `init` and stores it, replacing any previous one.
    ///
    /// A previously constructed primitive is abandoned, not destroyed: re-initializing a
    /// live primitive is undefined for the guest, and it may still be in use.
    ///
    /// # Errors
    ///
    /// Returns the host error code; the cell is left unchanged.
    pub fn construct(&self, init: P::Init) -> Result<NonNull<P::Raw>, Errno> {
        let fresh = Self::allocate(&init)?;
        let previous = self.slot.swap(fresh.as_ptr(), Ordering::AcqRel);
        if let Slot::Constructed(old) = self.decode(previous) {
            debug!(
                "{} at {:#x} re-initialized, abandoning {:p}",
                P::KIND,
                self.address(),
                old
            );
        }
        record_construct(self.address(), P::KIND);
        trace!("{} at {:#x} constructed", P::KIND, self.address());
        Ok(fresh)
    }

    /// Returns the host primitive, constructing it with default parameters (or those of a
    /// recognized static initializer) when the cell is unconstructed.
    ///
    /// # Errors
    ///
    /// Returns the host error code; the cell is left unconstructed so a later call retries.
    pub fn get_or_construct(&self) -> Result<NonNull<P::Raw>, Errno> {
        loop {
            let current = self.slot.load(Ordering::Acquire);
            let init = match self.decode(current) {
                Slot::Constructed(raw) => return Ok(raw),
                Slot::Unconstructed(init) => init,
            };

            let fresh = Self::allocate(&init)?;
            match self.slot.compare_exchange(
                current,
                fresh.as_ptr(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    record_construct(self.address(), P::KIND);
                    trace!("{} at {:#x} lazily constructed", P::KIND, self.address());
                    return Ok(fresh);
                }
                Err(_) => {
                    // SAFETY: fresh was never published
                    unsafe { Self::release(fresh) };
                }
            }
        }
    }

    /// Destroys the host primitive and resets the cell to null.
    ///
    /// Destroying an unconstructed cell is a no-op returning 0. Otherwise returns the code
    /// of the host destroy call.
    pub fn destroy(&self) -> c_int {
        let previous = self.slot.load(Ordering::Acquire);
        let Slot::Constructed(raw) = self.decode(previous) else {
            return 0;
        };
        if self
            .slot
            .compare_exchange(previous, ptr::null_mut(), Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return 0;
        }
        if let Some(retired) = record_destroy(self.address()) {
            trace!(
                "{} at {:#x} destroyed after {} construction(s)",
                P::KIND,
                self.address(),
                retired.constructions
            );
        }
        // SAFETY: the primitive was unpublished above and is owned here
        unsafe { Self::release(raw) }
    }
}

impl<P: HostPrimitive> Default for HandleCell<P> {
    fn default() -> Self {
        Self::new()
    }
}
