//! Undefined-symbol scan of a shared object.
//!
//! Lists what a module will ask the binder for, so the coverage of an [`ImportTable`] can be
//! checked before anything is loaded.

use std::path::{Path, PathBuf};

use goblin::elf::{
    section_header::SHN_UNDEF,
    sym::{STB_WEAK, STT_COMMON, STT_OBJECT, STT_TLS},
    Elf,
};
use memmap2::Mmap;

use crate::{
    hook::Architecture,
    imports::{ImportKind, ImportTable},
    module::ImportReference,
    Error, Result,
};

/// An undefined dynamic symbol of a scanned module.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScannedImport {
    /// Symbol name
    pub name: String,
    /// Function or data reference
    pub kind: ImportKind,
    /// Weak references may stay unresolved
    pub weak: bool,
}

/// Partition of a module's imports against a table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Coverage {
    /// Names the table resolves
    pub resolved: Vec<String>,
    /// Names the table does not know, weak ones included
    pub missing: Vec<String>,
}

impl Coverage {
    /// Returns `true` when no name is missing.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }
}

/// The undefined dynamic symbols of one ELF shared object.
#[derive(Clone, Debug)]
pub struct ImportScan {
    path: Option<PathBuf>,
    machine: u16,
    imports: Vec<ScannedImport>,
}

impl ImportScan {
    /// Maps and scans the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LoadFailure`] if the file cannot be opened or mapped, or
    /// [`Error::GoblinErr`] if it is not a valid ELF object.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let load_failure = |error: std::io::Error| Error::LoadFailure {
            path: path.to_path_buf(),
            message: error.to_string(),
        };
        let file = std::fs::File::open(path).map_err(load_failure)?;
        // SAFETY: the mapping is read-only and dropped before this function returns
        let map = unsafe { Mmap::map(&file) }.map_err(load_failure)?;

        let mut scan = Self::from_bytes(&map)?;
        scan.path = Some(path.to_path_buf());
        Ok(scan)
    }

    /// Scans an in-memory ELF image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GoblinErr`] if `data` is not a valid ELF object.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let elf = Elf::parse(data)?;
        let mut imports = Vec::new();
        for symbol in elf.dynsyms.iter() {
            if symbol.st_shndx != SHN_UNDEF as usize || symbol.st_name == 0 {
                continue;
            }
            let Some(name) = elf.dynstrtab.get_at(symbol.st_name) else {
                continue;
            };
            if name.is_empty() {
                continue;
            }
            let kind = match symbol.st_type() {
                STT_OBJECT | STT_COMMON | STT_TLS => ImportKind::Data,
                _ => ImportKind::Function,
            };
            imports.push(ScannedImport {
                name: name.to_string(),
                kind,
                weak: symbol.st_bind() == STB_WEAK,
            });
        }

        Ok(Self {
            path: None,
            machine: elf.header.e_machine,
            imports,
        })
    }

    /// File the scan was read from.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Hook encoding family of the module's machine.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedArchitecture`] for machines without a jump encoding.
    pub fn architecture(&self) -> Result<Architecture> {
        Architecture::from_elf_machine(self.machine)
    }

    /// Undefined symbols in dynamic symbol table order.
    #[must_use]
    pub fn imports(&self) -> &[ScannedImport] {
        &self.imports
    }

    /// The imports as binder references, indexed by position.
    #[must_use]
    pub fn references(&self) -> Vec<ImportReference> {
        self.imports
            .iter()
            .enumerate()
            .map(|(index, import)| match import.kind {
                ImportKind::Function => ImportReference::function(import.name.clone(), index),
                ImportKind::Data => ImportReference::data(import.name.clone(), index),
            })
            .collect()
    }

    /// Partitions the imports into names `table` resolves and names it does not.
    #[must_use]
    pub fn coverage(&self, table: &ImportTable) -> Coverage {
        let mut coverage = Coverage::default();
        for import in &self.imports {
            if table.contains(&import.name) {
                coverage.resolved.push(import.name.clone());
            } else {
                coverage.missing.push(import.name.clone());
            }
        }
        coverage
    }
}
