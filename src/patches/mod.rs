//! Module specific behavior patches.
//!
//! # Organization
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`gles`] | Import overrides for the graphics backend |
//! | [`shader`] | Shader program constructor wrap with source substitutions |
//! | [`guard`] | Host implementation of the static-local guard protocol |
//!
//! [`install_default_hooks`] applies the hook set the target module needs once it has
//! been relocated and bound. Every hook is keyed on a symbol; symbols the module does not
//! define are logged and skipped, so the same set can be offered to any build.

use std::sync::Arc;

use crate::{
    hook::{HookManager, InlineHook},
    imports::stubs,
    module::Module,
    Result,
};

pub mod gles;
pub mod guard;
pub mod shader;

/// Advertisement constructors neutralized in the target.
pub const AD_CONSTRUCTORS: [&str; 2] = [
    "_ZN8firebase5admob14InterstitialAdC2Ev",
    "_ZN14InterstitialAdC2EP8_jobject",
];

/// Installs the default hook set on `module`, returning the hooks installed.
///
/// 1. Shader program constructor wrap, see [`shader`].
/// 2. Advertisement constructors redirected to a neutral stub.
/// 3. The module's own static guard functions redirected to [`guard`].
///
/// # Safety
///
/// `module` must be relocated, bound, and not running. The code of every hooked symbol
/// is rewritten in place.
///
/// # Errors
///
/// Returns the first hook installation error.
pub unsafe fn install_default_hooks<M: Module + ?Sized>(
    hooks: &HookManager,
    module: &M,
) -> Result<Vec<Arc<InlineHook>>> {
    let mut installed = Vec::new();
    installed.extend(shader::install(hooks, module)?);

    for symbol in AD_CONSTRUCTORS {
        installed.extend(hooks.install_symbol(module, symbol, stubs::ret0 as usize)?);
    }

    let guards = [
        ("__cxa_guard_acquire", guard::acquire as usize),
        ("__cxa_guard_release", guard::release as usize),
    ];
    for (symbol, replacement) in guards {
        installed.extend(hooks.install_symbol(module, symbol, replacement)?);
    }
    Ok(installed)
}
