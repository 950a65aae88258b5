use std::ffi::c_int;

use crate::sync::PrimitiveKind;

/// A host primitive family that a [`super::HandleCell`] can construct.
///
/// Implementors are zero-sized markers; the host object itself is `Raw`, allocated with
/// `calloc` and initialized in place.
pub trait HostPrimitive {
    /// The host object, e.g. `libc::pthread_mutex_t`.
    type Raw;

    /// Construction parameters. `Default` is used for lazy construction.
    type Init: Default;

    /// Family of this primitive, recorded in the ledger and in errors.
    const KIND: PrimitiveKind;

    /// Initializes a zeroed host object.
    ///
    /// Returns 0 on success or a host error number.
    ///
    /// # Safety
    ///
    /// `raw` points to zeroed, writable memory large enough for `Raw`.
    unsafe fn init(raw: *mut Self::Raw, init: &Self::Init) -> c_int;

    /// Releases the resources of an initialized host object. The memory is freed by the
    /// caller.
    ///
    /// # Safety
    ///
    /// `raw` was initialized by [`HostPrimitive::init`] and is not in use.
    unsafe fn destroy(raw: *mut Self::Raw) -> c_int;

    /// Decodes a non-pointer static initializer stored in a guest cell.
    fn from_static(_tag: usize) -> Option<Self::Init> {
        None
    }
}
