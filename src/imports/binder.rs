//! Binding of a module's unresolved references against an [`ImportTable`].
//!
//! Binding must run after relocation and before any code of the module executes: call and
//! load encodings bake the resolved address in. A reference bound to nothing only fails
//! when it is finally used, as a jump to a foreign address, so every unresolved name is
//! logged here regardless of policy. This is the only diagnostic surface for missing
//! symbols.
//!
//! | Policy | Unresolved reference |
//! |--------|----------------------|
//! | [`UnresolvedPolicy::Strict`] | every name logged at `error`, the bind fails with the first |
//! | [`UnresolvedPolicy::Lenient`] | every name logged at `warn`, bound to a neutral stub |

use log::{debug, error, info, warn};

use crate::{
    config::UnresolvedPolicy,
    imports::{stubs, ImportTable},
    module::{ImportReference, Module, ReferenceKind},
    Error, Result,
};

/// Outcome of binding one module.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BindReport {
    /// Name of the bound module
    pub module: String,
    /// References bound to a table entry
    pub bound: usize,
    /// Names bound to a neutral stub (lenient mode only)
    pub stubbed: Vec<String>,
}

impl BindReport {
    /// Returns `true` when every reference was satisfied by the table.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.stubbed.is_empty()
    }
}

/// Applies an [`ImportTable`] to modules.
///
/// # Examples
///
/// ```rust,ignore
/// use soshim::{Binder, ImportTable, UnresolvedPolicy};
///
/// let table = ImportTable::new().function("strlen", libc::strlen as usize);
/// let report = unsafe { Binder::new(&table, UnresolvedPolicy::Lenient).bind(&mut module)? };
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Binder<'a> {
    table: &'a ImportTable,
    policy: UnresolvedPolicy,
}

impl<'a> Binder<'a> {
    /// Creates a binder over `table`.
    #[must_use]
    pub fn new(table: &'a ImportTable, policy: UnresolvedPolicy) -> Self {
        Self { table, policy }
    }

    /// The table consulted by this binder.
    #[must_use]
    pub fn table(&self) -> &'a ImportTable {
        self.table
    }

    /// Binds every unresolved reference of `module`.
    ///
    /// In strict mode nothing is written when any reference is unresolved.
    ///
    /// # Safety
    ///
    /// Every table target must be valid for the kind of the references named after it, and
    /// no code of `module` may be running.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnresolvedSymbol`] naming the first unresolved reference in strict
    /// mode, or the loader's error when a reference cannot be written.
    pub unsafe fn bind<M: Module>(&self, module: &mut M) -> Result<BindReport> {
        let references = module.references();
        let mut plan: Vec<(ImportReference, Option<usize>)> = Vec::with_capacity(references.len());
        let mut missing = Vec::new();

        for reference in references {
            let target = self.table.lookup(&reference.name).map(|entry| entry.target());
            if target.is_none() {
                match self.policy {
                    UnresolvedPolicy::Strict => {
                        error!("{}: unresolved symbol '{}'", module.name(), reference.name);
                    }
                    UnresolvedPolicy::Lenient => {
                        warn!(
                            "{}: unresolved symbol '{}', binding neutral stub",
                            module.name(),
                            reference.name
                        );
                    }
                }
                missing.push(reference.name.clone());
            }
            plan.push((reference, target));
        }

        if self.policy == UnresolvedPolicy::Strict {
            if let Some(name) = missing.into_iter().next() {
                return Err(Error::UnresolvedSymbol {
                    module: module.name().to_string(),
                    name,
                });
            }
        }

        let mut report = BindReport {
            module: module.name().to_string(),
            ..BindReport::default()
        };

        for (reference, target) in plan {
            match target {
                Some(address) => {
                    module.bind(&reference, address)?;
                    report.bound += 1;
                    debug!("{}: {} -> {:#x}", report.module, reference.name, address);
                }
                None => {
                    module.bind(&reference, neutral_target(reference.kind))?;
                    report.stubbed.push(reference.name);
                }
            }
        }

        info!(
            "{}: bound {} references, {} stubbed",
            report.module,
            report.bound,
            report.stubbed.len()
        );
        Ok(report)
    }
}

/// Address bound to an unresolved reference in lenient mode.
#[must_use]
pub fn neutral_target(kind: ReferenceKind) -> usize {
    match kind {
        ReferenceKind::Function => stubs::ret0 as usize,
        ReferenceKind::Data => stubs::neutral_data(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::MockModule;

    fn module() -> MockModule {
        MockModule::new("libmain.so", 0x4000_0000)
            .with_function("strlen")
            .with_function("glViewport")
            .with_data("__sF")
    }

    #[test]
    fn test_bind_points_at_entry_target() {
        let table = ImportTable::new()
            .function("strlen", 0x1111)
            .function("glViewport", 0x2222)
            .data("__sF", 0x3333);
        let mut module = module();

        let report = unsafe { Binder::new(&table, UnresolvedPolicy::Strict).bind(&mut module) }
            .unwrap();

        assert_eq!(report.bound, 3);
        assert!(report.is_complete());
        assert_eq!(module.bound_target("strlen"), Some(0x1111));
        assert_eq!(module.bound_target("glViewport"), Some(0x2222));
        assert_eq!(module.bound_target("__sF"), Some(0x3333));
    }

    #[test]
    fn test_bind_duplicate_names_use_first() {
        let table = ImportTable::new()
            .function("strlen", 0x1)
            .function("strlen", 0x2)
            .function("glViewport", 0x3)
            .data("__sF", 0x4);
        let mut module = module();

        unsafe { Binder::new(&table, UnresolvedPolicy::Strict).bind(&mut module) }.unwrap();
        assert_eq!(module.bound_target("strlen"), Some(0x1));
    }

    #[test]
    fn test_strict_fails_with_first_missing_and_writes_nothing() {
        let table = ImportTable::new().function("strlen", 0x1);
        let mut module = module();

        let err = unsafe { Binder::new(&table, UnresolvedPolicy::Strict).bind(&mut module) }
            .unwrap_err();

        match err {
            Error::UnresolvedSymbol { module: name, name: symbol } => {
                assert_eq!(name, "libmain.so");
                assert_eq!(symbol, "glViewport");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(module.bound_target("strlen"), None);
    }

    #[test]
    fn test_lenient_binds_neutral_stubs() {
        let table = ImportTable::new().function("strlen", 0x1);
        let mut module = module();

        let report = unsafe { Binder::new(&table, UnresolvedPolicy::Lenient).bind(&mut module) }
            .unwrap();

        assert_eq!(report.bound, 1);
        assert_eq!(report.stubbed, vec!["glViewport".to_string(), "__sF".to_string()]);
        assert_eq!(
            module.bound_target("glViewport"),
            Some(neutral_target(ReferenceKind::Function))
        );
        assert_eq!(
            module.bound_target("__sF"),
            Some(neutral_target(ReferenceKind::Data))
        );
    }

    #[test]
    fn test_neutral_function_is_callable() {
        let stub: extern "C" fn() -> i32 =
            unsafe { std::mem::transmute(neutral_target(ReferenceKind::Function)) };
        assert_eq!(stub(), 0);
    }
}
