//! Hook registry.
//!
//! [`HookManager`] owns every installed [`InlineHook`], keyed by patch site. Hooks are
//! permanent: there is no removal, and installing a second hook over a site that already
//! carries one is refused.

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use log::warn;

use crate::{
    hook::{Architecture, CodeMemory, HostCodeMemory, InlineHook},
    module::Module,
    Error, Result,
};

/// Registry of installed hooks.
///
/// # Examples
///
/// ```rust,ignore
/// use soshim::hook::HookManager;
///
/// let hooks = HookManager::host();
/// let hook = unsafe { hooks.install("glViewport", target, viewport_clamp as usize)? };
/// let value = unsafe { hook.call_original(|entry| call_through(entry, args))? };
/// ```
pub struct HookManager {
    memory: Arc<dyn CodeMemory>,
    architecture: Architecture,
    hooks: DashMap<usize, Arc<InlineHook>>,
}

impl HookManager {
    /// Manager patching memory through `memory` with `architecture` encodings.
    #[must_use]
    pub fn new(memory: Arc<dyn CodeMemory>, architecture: Architecture) -> Self {
        Self {
            memory,
            architecture,
            hooks: DashMap::new(),
        }
    }

    /// Manager patching the host process with the host instruction set.
    #[must_use]
    pub fn host() -> Self {
        Self::new(Arc::new(HostCodeMemory::new()), Architecture::host())
    }

    /// Instruction set used for new hooks.
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Hooks the function at `entry`.
    ///
    /// # Safety
    ///
    /// See [`InlineHook::install`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::HookInstallConflict`] if the site is already hooked, or the memory
    /// error if the code cannot be rewritten.
    pub unsafe fn install(
        &self,
        name: &str,
        entry: usize,
        replacement: usize,
    ) -> Result<Arc<InlineHook>> {
        let site = self.architecture.for_symbol(entry).code_address(entry);
        match self.hooks.entry(site) {
            Entry::Occupied(existing) => Err(Error::HookInstallConflict {
                address: site,
                existing: existing.get().name().to_string(),
            }),
            Entry::Vacant(slot) => {
                let hook = InlineHook::install(
                    Arc::clone(&self.memory),
                    self.architecture,
                    name,
                    entry,
                    replacement,
                )?;
                Ok(Arc::clone(slot.insert(Arc::new(hook)).value()))
            }
        }
    }

    /// Hooks the function `symbol` of `module`, `None` if the module does not define it.
    ///
    /// # Safety
    ///
    /// See [`InlineHook::install`].
    ///
    /// # Errors
    ///
    /// See [`HookManager::install`].
    pub unsafe fn install_symbol<M: Module + ?Sized>(
        &self,
        module: &M,
        symbol: &str,
        replacement: usize,
    ) -> Result<Option<Arc<InlineHook>>> {
        match module.find_symbol(symbol) {
            Some(entry) => self.install(symbol, entry, replacement).map(Some),
            None => {
                warn!("{}: {symbol} not found, hook skipped", module.name());
                Ok(None)
            }
        }
    }

    /// Hook patched at `site`, if any.
    #[must_use]
    pub fn get(&self, site: usize) -> Option<Arc<InlineHook>> {
        self.hooks.get(&site).map(|hook| Arc::clone(hook.value()))
    }

    /// Hook installed under `name`, if any.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<Arc<InlineHook>> {
        self.hooks
            .iter()
            .find(|hook| hook.name() == name)
            .map(|hook| Arc::clone(hook.value()))
    }

    /// Number of installed hooks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if no hook is installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Names of the installed hooks, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.hooks.iter().map(|h| h.name().to_string()).collect();
        names.sort();
        names
    }
}

impl std::fmt::Debug for HookManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookManager")
            .field("architecture", &self.architecture)
            .field("hooks", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::{MockModule, PlainMemory};

    fn manager(memory: &Arc<PlainMemory>) -> HookManager {
        HookManager::new(
            Arc::clone(memory) as Arc<dyn CodeMemory>,
            Architecture::X86_64,
        )
    }

    #[test]
    fn test_install_and_lookup() {
        let memory = Arc::new(PlainMemory::filled(128, 0x90));
        let hooks = manager(&memory);
        let site = memory.base() + 16;
        let hook = unsafe { hooks.install("target", site, 0x1234) }.unwrap();
        assert_eq!(hook.site(), site);
        assert_eq!(hooks.len(), 1);
        assert!(hooks.get(site).is_some());
        assert_eq!(hooks.find("target").map(|h| h.replacement()), Some(0x1234));
    }

    #[test]
    fn test_rehook_is_a_conflict() {
        let memory = Arc::new(PlainMemory::filled(128, 0x90));
        let hooks = manager(&memory);
        let site = memory.base();
        unsafe { hooks.install("first", site, 0x1111) }.unwrap();
        let patched = memory.bytes(0, 14);

        let result = unsafe { hooks.install("second", site, 0x2222) };
        match result {
            Err(Error::HookInstallConflict { address, existing }) => {
                assert_eq!(address, site);
                assert_eq!(existing, "first");
            }
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(memory.bytes(0, 14), patched);
        assert_eq!(hooks.len(), 1);
    }

    #[test]
    fn test_install_symbol_skips_missing() {
        let memory = Arc::new(PlainMemory::filled(128, 0x90));
        let hooks = manager(&memory);
        let module = MockModule::new("libmain.so", memory.base())
            .with_symbol("present", memory.base() + 32);

        let hook = unsafe { hooks.install_symbol(&module, "present", 0x1) }.unwrap();
        assert!(hook.is_some());
        let missing = unsafe { hooks.install_symbol(&module, "absent", 0x1) }.unwrap();
        assert!(missing.is_none());
        assert_eq!(hooks.names(), vec!["present".to_string()]);
    }
}
