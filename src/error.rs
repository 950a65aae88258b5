use std::path::PathBuf;

use thiserror::Error;

use crate::sync::PrimitiveKind;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which covers every failure this library can report.
///
/// Errors are only produced on the one-time bootstrap path (loading, relocating,
/// binding in strict mode, hook installation). Calls made by the guest during steady
/// state never see this type: the synchronization proxy answers with host error codes
/// and the runtime bridge answers with neutral values.
///
/// # Error Categories
///
/// ## Bootstrap Errors
/// - [`Error::LoadFailure`] - Module file missing or malformed
/// - [`Error::Relocation`] - The external loader failed to relocate a module
/// - [`Error::UnresolvedSymbol`] - Strict binding found a reference with no table entry
/// - [`Error::SymbolNotFound`] - A required module symbol (entry point) is absent
///
/// ## Interception Errors
/// - [`Error::HookInstallConflict`] - The address is already hooked
/// - [`Error::MemoryProtection`] - Code pages could not be made writable
/// - [`Error::UnsupportedArchitecture`] - No jump encoding for the requested target
///
/// ## Runtime Errors
/// - [`Error::PrimitiveAllocation`] - A host primitive could not be constructed
/// - [`Error::GuestThread`] - The guest main thread could not be started or joined
///
/// ## I/O and Parsing Errors
/// - [`Error::FileError`] - Filesystem I/O errors
/// - [`Error::GoblinErr`] - ELF parsing errors from the goblin crate
/// - [`Error::Malformed`] - Structurally invalid input
///
/// # Examples
///
/// ```rust,no_run
/// use soshim::Error;
///
/// fn report(err: &Error) {
///     match err {
///         Error::UnresolvedSymbol { module, name } => {
///             eprintln!("{module}: no host implementation for '{name}'");
///         }
///         Error::LoadFailure { path, message } => {
///             eprintln!("could not load {}: {message}", path.display());
///         }
///         other => eprintln!("{other}"),
///     }
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The module file is missing or could not be mapped.
    ///
    /// Fatal: reported to the operator and the process exits.
    #[error("Failed to load module '{}': {message}", path.display())]
    LoadFailure {
        /// Path handed to the loader
        path: PathBuf,
        /// Loader supplied reason
        message: String,
    },

    /// The external loader failed to apply format specific relocations.
    #[error("Failed to relocate module '{module}': {message}")]
    Relocation {
        /// Name of the module being relocated
        module: String,
        /// Loader supplied reason
        message: String,
    },

    /// A reference of the module has no entry in the import table.
    ///
    /// Only produced under [`crate::UnresolvedPolicy::Strict`]. In lenient mode the
    /// reference is bound to a neutral stub instead.
    #[error("Unresolved symbol '{name}' in module '{module}'")]
    UnresolvedSymbol {
        /// Name of the module holding the reference
        module: String,
        /// The symbol name that could not be resolved
        name: String,
    },

    /// A symbol required by the bootstrap could not be found in a module.
    #[error("Symbol '{name}' not found in module '{module}'")]
    SymbolNotFound {
        /// Name of the module that was queried
        module: String,
        /// The symbol that was requested
        name: String,
    },

    /// The address already carries an active hook.
    ///
    /// Re-hooking is a programming error in the installer: every hook is installed
    /// exactly once for the lifetime of the process.
    #[error("Address {address:#x} is already hooked by '{existing}'")]
    HookInstallConflict {
        /// Address that was requested
        address: usize,
        /// Name of the hook that owns the address
        existing: String,
    },

    /// Changing the protection of a code page failed.
    #[error("Failed to change protection at {address:#x}: {source}")]
    MemoryProtection {
        /// First byte of the affected range
        address: usize,
        /// The OS error
        source: std::io::Error,
    },

    /// No jump encoding exists for the requested architecture.
    #[error("Architecture '{0}' is not supported for interception")]
    UnsupportedArchitecture(&'static str),

    /// A host primitive could not be allocated or initialized.
    ///
    /// The guest-facing proxy returns `code` unchanged instead of this error.
    #[error("Failed to construct host {kind} - error code {code}")]
    PrimitiveAllocation {
        /// The primitive family
        kind: PrimitiveKind,
        /// Host error code
        code: i32,
    },

    /// The guest main thread could not be spawned or panicked.
    #[error("Guest thread failure: {0}")]
    GuestThread(String),

    /// The input is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during ELF parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),

    /// Generic error for miscellaneous failures.
    #[error("{0}")]
    Error(String),
}
