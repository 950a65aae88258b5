//! Process bootstrap.
//!
//! [`Launcher`] drives an external [`Loader`] through the fixed bootstrap order and then
//! hands control to the guest:
//!
//! ```text
//! runtime module:  load ─► relocate ─► bind ─────────────────► flush ─► initialize
//!                                                                          │
//! target module:   load ─► relocate ─► bind ─► install hooks ─► flush ─► initialize
//!                                                                          │
//!                      construct + activate bridge ◄───────────────────────┘
//!                                  │
//!                      export environment
//!                                  │
//!                      guest main thread (main_stack_size)
//!                        onload(vm, NULL) if present
//!                        entry(0, NULL)
//!                                  │
//!                                join
//! ```
//!
//! Any failure before the guest thread starts is returned as an error and is fatal to the
//! process: a partially bound module cannot be run.
//!
//! Once the guest has started, the modules, the bridge and the loader stay resident for the
//! rest of the process, even after [`Launcher::run`] returns: threads the guest created may
//! still execute module code and call through the bridge tables. The caller is expected to
//! exit the process with [`LaunchReport::exit_code`].

use std::{
    ffi::{c_char, c_int, c_void, CString},
    path::Path,
    sync::Arc,
    thread,
};

use log::{debug, info};

use crate::{
    bridge::RuntimeBridge,
    config::ShimConfig,
    hook::{HookManager, HostCodeMemory},
    imports::{default_table, BindReport, Binder, ImportTable},
    module::{Loader, Module},
    patches::install_default_hooks,
    Error, Result,
};

type OnLoad = unsafe extern "C" fn(*mut c_void, *mut c_void) -> c_int;
type Entry = unsafe extern "C" fn(c_int, *mut *mut c_char) -> c_int;

/// Outcome of a completed launch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LaunchReport {
    /// Binding of the runtime support module
    pub runtime: BindReport,
    /// Binding of the target module
    pub target: BindReport,
    /// Names of the hooks installed in the target
    pub hooks: Vec<String>,
    /// Version returned by the bridge load hook, `None` if the target has none
    pub onload_version: Option<i32>,
    /// Return value of the guest entry
    pub exit_code: i32,
}

/// Bootstraps and runs a guest.
///
/// # Examples
///
/// ```rust,ignore
/// use soshim::{Launcher, ShimConfig};
///
/// let config = ShimConfig::strict().with_data_path("/opt/game");
/// let report = unsafe { Launcher::new(ElfLoader::new(), config).run()? };
/// std::process::exit(report.exit_code);
/// ```
pub struct Launcher<L: Loader> {
    loader: L,
    config: ShimConfig,
    table: ImportTable,
    hooks: HookManager,
}

impl<L: Loader> Launcher<L> {
    /// Launcher with the default import table and host hook manager for `config`.
    #[must_use]
    pub fn new(loader: L, config: ShimConfig) -> Self {
        let table = default_table(&config);
        let hooks = HookManager::new(Arc::new(HostCodeMemory::new()), config.architecture);
        Self {
            loader,
            config,
            table,
            hooks,
        }
    }

    /// Replaces the import table.
    #[must_use]
    pub fn with_table(mut self, table: ImportTable) -> Self {
        self.table = table;
        self
    }

    /// Replaces the hook manager.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookManager) -> Self {
        self.hooks = hooks;
        self
    }

    /// The launch configuration.
    #[must_use]
    pub fn config(&self) -> &ShimConfig {
        &self.config
    }

    /// The import table modules are bound against.
    #[must_use]
    pub fn table(&self) -> &ImportTable {
        &self.table
    }

    /// The hook manager target hooks are installed through.
    #[must_use]
    pub fn hooks(&self) -> &HookManager {
        &self.hooks
    }

    /// Loads, binds and initializes one module.
    unsafe fn prepare(
        &mut self,
        path: &Path,
        address: Option<usize>,
        hook: bool,
    ) -> Result<(L::Module, BindReport, Vec<String>)> {
        info!("loading {}", path.display());
        let mut module = self.loader.load(path, address)?;
        self.loader.relocate(&mut module)?;

        let report = Binder::new(&self.table, self.config.unresolved).bind(&mut module)?;

        let hooks = if hook {
            install_default_hooks(&self.hooks, &module)?
                .iter()
                .map(|hook| hook.name().to_string())
                .collect()
        } else {
            Vec::new()
        };

        self.loader.flush_caches(&module);
        self.loader.run_initializers(&module)?;
        debug!("{} initialized at {:#x}", module.name(), module.base_address());
        Ok((module, report, hooks))
    }

    /// Runs the bootstrap and the guest to completion.
    ///
    /// After the guest main thread has been joined, the modules, the bridge and the launcher
    /// itself are leaked so that remaining guest threads keep valid code and tables.
    ///
    /// # Safety
    ///
    /// Executes foreign code. The loader must produce modules whose symbols are callable
    /// with the entry contract signatures.
    ///
    /// # Errors
    ///
    /// Returns the first bootstrap failure, [`Error::SymbolNotFound`] when the target has
    /// no entry symbol, or [`Error::GuestThread`] when the guest thread cannot be started
    /// or panics.
    pub unsafe fn run(mut self) -> Result<LaunchReport> {
        let runtime_path = self.config.runtime_path();
        let runtime_address = self.config.runtime_address;
        let (runtime, runtime_report, _) = self.prepare(&runtime_path, runtime_address, false)?;

        let target_path = self.config.target_path();
        let target_address = self.config.target_address;
        let (target, target_report, hooks) = self.prepare(&target_path, target_address, true)?;

        let entry = target
            .find_symbol(&self.config.entry.entry_symbol)
            .ok_or_else(|| Error::SymbolNotFound {
                module: target.name().to_string(),
                name: self.config.entry.entry_symbol.clone(),
            })?;
        let onload = target.find_symbol(&self.config.entry.onload_symbol);
        if onload.is_none() {
            debug!(
                "{}: no {}, skipping bridge load hook",
                target.name(),
                self.config.entry.onload_symbol
            );
        }

        let bridge = RuntimeBridge::new(&self.config.bridge);
        bridge.activate();
        export_environment(&self.config.environment)?;

        let vm = bridge.vm_handle() as usize;
        let guest = thread::Builder::new()
            .name("guest-main".to_string())
            .stack_size(self.config.threads.main_stack_size)
            .spawn(move || {
                let version = onload.map(|address| {
                    let onload: OnLoad = std::mem::transmute(address);
                    onload(vm as *mut c_void, std::ptr::null_mut())
                });
                let entry: Entry = std::mem::transmute(entry);
                (version, entry(0, std::ptr::null_mut()))
            })
            .map_err(|error| Error::GuestThread(format!("spawn failed: {error}")))?;

        info!("guest main thread started");
        let (onload_version, exit_code) = guest
            .join()
            .map_err(|_| Error::GuestThread("guest main thread panicked".to_string()))?;
        info!("guest exited with {exit_code}");

        // guest threads may outlive the entry
        std::mem::forget(bridge);
        std::mem::forget(target);
        std::mem::forget(runtime);
        std::mem::forget(self);

        Ok(LaunchReport {
            runtime: runtime_report,
            target: target_report,
            hooks,
            onload_version,
            exit_code,
        })
    }
}

/// Exports `variables` into the host process environment, replacing existing values.
///
/// # Errors
///
/// Returns [`Error::Error`] when a key or value contains a NUL byte or the host rejects
/// the key.
pub fn export_environment(variables: &[(String, String)]) -> Result<()> {
    for (key, value) in variables {
        let ckey = CString::new(key.as_str())
            .map_err(|_| Error::Error(format!("environment key '{key}' contains NUL")))?;
        let cvalue = CString::new(value.as_str())
            .map_err(|_| Error::Error(format!("environment value of '{key}' contains NUL")))?;
        // SAFETY: both strings are NUL-terminated and copied by setenv
        if unsafe { libc::setenv(ckey.as_ptr(), cvalue.as_ptr(), 1) } != 0 {
            return Err(Error::Error(format!("setenv rejected '{key}'")));
        }
        debug!("exported {key}={value}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_export_environment() {
        let variables = vec![("SOSHIM_LAUNCHER_TEST".to_string(), "1".to_string())];
        export_environment(&variables).unwrap();
        assert_eq!(std::env::var("SOSHIM_LAUNCHER_TEST").as_deref(), Ok("1"));
    }

    #[test]
    fn test_export_rejects_nul() {
        let variables = vec![("BAD\0KEY".to_string(), "1".to_string())];
        assert!(matches!(export_environment(&variables), Err(Error::Error(_))));
    }
}
