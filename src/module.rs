//! Interfaces of the external loader.
//!
//! Mapping a foreign object, applying its relocations and flushing instruction caches are
//! services of an external loader. This module defines the narrow surface the shim
//! consumes from it:
//!
//! - [`Loader`] - `load`, `relocate`, `flush_caches`, `run_initializers`
//! - [`Module`] - a loaded object: base address, unresolved references, symbol lookup and
//!   the primitive that rewrites one reference
//! - [`SymbolResolver`] - name to address lookup, implemented by closures, by
//!   [`crate::ImportTable`] and by the host dynamic linker ([`DlsymResolver`])
//!
//! A [`Module`] is referenced, never owned, by the hooks and bridge calls installed into
//! it. It must outlive all of them, which in practice means for the lifetime of the process.

use std::{
    ffi::{c_void, CString},
    path::Path,
    sync::Arc,
};

use crate::Result;

/// Whether a reference is called or read.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// The module calls through the reference
    Function,
    /// The module loads through the reference
    Data,
}

/// One unresolved external reference of a module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportReference {
    /// The referenced symbol name
    pub name: String,
    /// Loader specific index of the reference, e.g. the relocation or GOT slot number
    pub index: usize,
    /// Call or load reference
    pub kind: ReferenceKind,
}

impl ImportReference {
    /// Creates a function reference.
    #[must_use]
    pub fn function(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            kind: ReferenceKind::Function,
        }
    }

    /// Creates a data reference.
    #[must_use]
    pub fn data(name: impl Into<String>, index: usize) -> Self {
        Self {
            name: name.into(),
            index,
            kind: ReferenceKind::Data,
        }
    }
}

/// A module produced by the external loader.
pub trait Module {
    /// Name of the module, used in diagnostics.
    fn name(&self) -> &str;

    /// Address the module was mapped at.
    fn base_address(&self) -> usize;

    /// All references the loader could not satisfy from the module itself.
    fn references(&self) -> Vec<ImportReference>;

    /// Rewrites `reference` to point at `target`.
    ///
    /// # Safety
    ///
    /// `target` must be a valid address for the reference kind: a callable function with
    /// the calling convention the module expects, or readable data of the expected layout.
    /// Must run before any code of the module executes.
    ///
    /// # Errors
    ///
    /// Returns an error when the loader cannot write the reference.
    unsafe fn bind(&mut self, reference: &ImportReference, target: usize) -> Result<()>;

    /// Looks up a symbol defined by the module.
    fn find_symbol(&self, name: &str) -> Option<usize>;
}

/// The external loader.
pub trait Loader {
    /// Module type produced by this loader.
    type Module: Module;

    /// Maps the file at `path`, optionally at a preferred address.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LoadFailure`] when the file is missing or malformed.
    fn load(&mut self, path: &Path, address: Option<usize>) -> Result<Self::Module>;

    /// Applies format specific relocations.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Relocation`] on failure.
    fn relocate(&mut self, module: &mut Self::Module) -> Result<()>;

    /// Makes rewritten code visible to instruction fetch.
    fn flush_caches(&mut self, module: &Self::Module);

    /// Runs the module's static initializers.
    ///
    /// # Errors
    ///
    /// Returns an error when an initializer cannot be run.
    fn run_initializers(&mut self, module: &Self::Module) -> Result<()>;
}

/// Name to address lookup.
pub trait SymbolResolver {
    /// Resolves `name` to an address.
    fn resolve(&self, name: &str) -> Option<usize>;
}

impl<F> SymbolResolver for F
where
    F: Fn(&str) -> Option<usize> + ?Sized,
{
    fn resolve(&self, name: &str) -> Option<usize> {
        self(name)
    }
}

impl<S: SymbolResolver + ?Sized> SymbolResolver for Arc<S> {
    fn resolve(&self, name: &str) -> Option<usize> {
        (**self).resolve(name)
    }
}

impl SymbolResolver for () {
    fn resolve(&self, _name: &str) -> Option<usize> {
        None
    }
}

/// Resolves names through the host dynamic linker.
///
/// Used to reach backends (graphics, audio) whose entry points are only known by name.
#[derive(Debug)]
pub struct DlsymResolver {
    handle: *mut c_void,
}

// SAFETY: the handle is only passed to dlsym, which is thread-safe
unsafe impl Send for DlsymResolver {}
unsafe impl Sync for DlsymResolver {}

impl DlsymResolver {
    /// Resolver over the global symbol scope of the process.
    #[must_use]
    pub fn global() -> Self {
        Self {
            handle: libc::RTLD_DEFAULT,
        }
    }

    /// Resolver over a specific host library.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::LoadFailure`] when the library cannot be opened.
    pub fn open(path: &Path) -> Result<Self> {
        let cpath = CString::new(path.to_string_lossy().as_bytes())
            .map_err(|_| malformed_error!("Library path contains a NUL byte"))?;
        // SAFETY: cpath is a valid NUL-terminated string
        let handle = unsafe { libc::dlopen(cpath.as_ptr(), libc::RTLD_NOW | libc::RTLD_GLOBAL) };
        if handle.is_null() {
            return Err(crate::Error::LoadFailure {
                path: path.to_path_buf(),
                message: "dlopen failed".to_string(),
            });
        }
        Ok(Self { handle })
    }
}

impl Default for DlsymResolver {
    fn default() -> Self {
        Self::global()
    }
}

impl SymbolResolver for DlsymResolver {
    fn resolve(&self, name: &str) -> Option<usize> {
        let cname = CString::new(name).ok()?;
        // SAFETY: handle is RTLD_DEFAULT or a live dlopen handle
        let address = unsafe { libc::dlsym(self.handle, cname.as_ptr()) };
        (!address.is_null()).then_some(address as usize)
    }
}
