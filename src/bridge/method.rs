//! Known method identifiers.

use std::{ffi::CStr, str::FromStr};

use strum::{AsRefStr, Display, EnumIter, EnumString, FromRepr};

/// Method identifiers handed out by `GetMethodID` and `GetStaticMethodID`.
///
/// Names not listed here resolve to [`MethodId::Unknown`], whose calls return neutral values.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Display, AsRefStr, EnumIter, EnumString, FromRepr,
)]
#[repr(usize)]
pub enum MethodId {
    /// Any name without special handling
    #[default]
    Unknown = 0,
    /// Constructor
    #[strum(serialize = "<init>")]
    Init = 1,
    /// Language index of the running game
    #[strum(serialize = "getCurrentLanguage")]
    GetCurrentLanguage = 2,
}

impl MethodId {
    /// Looks up the identifier for a method name.
    #[must_use]
    pub fn resolve(name: &str) -> Self {
        Self::from_str(name).unwrap_or_default()
    }

    /// Looks up the identifier for a guest-supplied name, [`MethodId::Unknown`] for null or non-UTF-8.
    ///
    /// # Safety
    ///
    /// `name` must be null or point to a NUL-terminated string.
    #[must_use]
    pub unsafe fn resolve_raw(name: *const std::ffi::c_char) -> Self {
        if name.is_null() {
            return Self::Unknown;
        }
        CStr::from_ptr(name)
            .to_str()
            .map_or(Self::Unknown, Self::resolve)
    }

    /// Decodes an identifier the guest passed back, [`MethodId::Unknown`] when not ours.
    #[must_use]
    pub fn from_raw(raw: usize) -> Self {
        Self::from_repr(raw).unwrap_or_default()
    }

    /// Value handed to the guest.
    #[must_use]
    pub fn raw(self) -> usize {
        self as usize
    }
}
