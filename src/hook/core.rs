//! Inline hooks.
//!
//! An [`InlineHook`] overwrites the first instructions of a function with an absolute jump
//! to a replacement. The displaced bytes are kept, and [`InlineHook::call_original`]
//! briefly puts them back to run the unhooked function:
//!
//! ```text
//!            installed                       inside call_original
//! target ─► ┌──────────────┐            target ─► ┌──────────────┐
//!           │ jmp replace  │                      │ original     │ ◄── call
//!           ├──────────────┤                      │ prologue     │
//!           │ rest of body │                      ├──────────────┤
//!           └──────────────┘                      │ rest of body │
//!                                                 └──────────────┘
//!                                                  jump rewritten on return
//! ```
//!
//! Restoring in place needs no instruction relocation, so it works for any prologue on
//! every supported instruction set. Calls to the original are serialized per hook, and
//! while one is running, other threads entering the target execute the original too.

use std::{
    fmt,
    sync::{Arc, Mutex},
};

use log::debug;

use crate::{
    hook::{Architecture, CodeMemory},
    Error, Result,
};

/// A jump patched over the entry of a function, with the displaced bytes kept.
pub struct InlineHook {
    name: String,
    entry: usize,
    site: usize,
    replacement: usize,
    architecture: Architecture,
    original: Vec<u8>,
    patch: Vec<u8>,
    memory: Arc<dyn CodeMemory>,
    gate: Mutex<()>,
}

impl InlineHook {
    /// Patches a jump to `replacement` over the entry of the function at `entry`.
    ///
    /// For 32-bit ARM, `entry` and `replacement` are symbol addresses: bit 0 selects Thumb
    /// state, and `architecture` is refined accordingly.
    ///
    /// # Safety
    ///
    /// `entry` must be the start of a function at least as long as the patch, no thread may
    /// be executing its first instructions, and `replacement` must have the same signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the code cannot be read or rewritten.
    pub unsafe fn install(
        memory: Arc<dyn CodeMemory>,
        architecture: Architecture,
        name: impl Into<String>,
        entry: usize,
        replacement: usize,
    ) -> Result<Self> {
        let architecture = architecture.for_symbol(entry);
        let site = architecture.code_address(entry);
        let patch = architecture.encode_jump(site, replacement);
        let original = memory.read(site, patch.len())?;
        memory.write(site, &patch)?;

        let name = name.into();
        debug!(
            "hooked {name} at {site:#x} -> {replacement:#x} ({architecture}, {} bytes)",
            patch.len()
        );
        Ok(Self {
            name,
            entry,
            site,
            replacement,
            architecture,
            original,
            patch,
            memory,
            gate: Mutex::new(()),
        })
    }

    /// Symbol or label of the hooked function.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Address the hooked function is called through.
    #[must_use]
    pub fn entry(&self) -> usize {
        self.entry
    }

    /// Address of the first patched byte.
    #[must_use]
    pub fn site(&self) -> usize {
        self.site
    }

    /// Function control is redirected to.
    #[must_use]
    pub fn replacement(&self) -> usize {
        self.replacement
    }

    /// Instruction set of the patch.
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Bytes displaced by the patch.
    #[must_use]
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// Bytes of the patch.
    #[must_use]
    pub fn patch_bytes(&self) -> &[u8] {
        &self.patch
    }

    /// Runs the unhooked function.
    ///
    /// `call` receives the original entry address and is expected to call it with the
    /// arguments the replacement received. The jump is restored before returning, whatever
    /// `call` returns.
    ///
    /// # Safety
    ///
    /// `call` must invoke the entry with the original function's signature.
    ///
    /// # Errors
    ///
    /// Returns an error if the code cannot be rewritten. The call is not made when the
    /// original bytes cannot be restored.
    pub unsafe fn call_original<R>(&self, call: impl FnOnce(usize) -> R) -> Result<R> {
        let _gate = self
            .gate
            .lock()
            .map_err(|_| Error::Error(format!("hook gate of {} poisoned", self.name)))?;

        self.memory.write(self.site, &self.original)?;
        let restore = Repatch { hook: self };
        let result = call(self.entry);
        drop(restore);
        Ok(result)
    }
}

/// Rewrites the jump when dropped, including on unwind.
struct Repatch<'a> {
    hook: &'a InlineHook,
}

impl Drop for Repatch<'_> {
    fn drop(&mut self) {
        // SAFETY: the site was patched with these bytes at install time
        if let Err(error) = unsafe { self.hook.memory.write(self.hook.site, &self.hook.patch) } {
            log::error!("failed to re-arm hook {}: {error}", self.hook.name);
        }
    }
}

impl fmt::Debug for InlineHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InlineHook")
            .field("name", &self.name)
            .field("site", &format_args!("{:#x}", self.site))
            .field("replacement", &format_args!("{:#x}", self.replacement))
            .field("architecture", &self.architecture)
            .finish_non_exhaustive()
    }
}
