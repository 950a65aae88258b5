//! Shim configuration types.
//!
//! Everything the bootstrap needs to know about the guest that is not encoded in the guest
//! itself: where its files live, how to treat unresolved references, how large guest
//! threads may grow, the display the graphics overrides clamp to and which symbols form
//! the entry contract.
//!
//! # Overview
//!
//! - [`ShimConfig`] - Top-level configuration container
//! - [`UnresolvedPolicy`] - Fail fast or bind neutral stubs
//! - [`ThreadConfig`] - Stack sizes for guest threads
//! - [`DisplayConfig`] - Viewport dimensions
//! - [`BridgeConfig`] - Values reported by the emulated runtime bridge
//! - [`EntryConfig`] - Entry contract symbol names
//!
//! # Configuration Presets
//!
//! - [`ShimConfig::strict()`] - Every unresolved reference is fatal
//! - [`ShimConfig::lenient()`] - Unresolved references are bound to neutral stubs
//!
//! # Example
//!
//! ```rust,no_run
//! use soshim::config::{ShimConfig, ThreadConfig};
//!
//! let config = ShimConfig::strict()
//!     .with_data_path("/opt/game")
//!     .with_env("VITA_DISABLE_TOUCH_BACK", "1");
//!
//! let config = ShimConfig {
//!     threads: ThreadConfig::new().with_guest_stack_size(256 * 1024),
//!     ..config
//! };
//! ```

use std::path::{Path, PathBuf};

use crate::hook::Architecture;

/// Top-level configuration consumed by [`crate::Launcher`].
///
/// # Default Configuration
///
/// The default is [`ShimConfig::lenient()`]:
/// - Runtime module `libc++_shared.so` at `0x98000000`, target `libmain.so` anywhere
/// - Guest threads pinned to 512 KiB, guest main thread 1 MiB
/// - Display 960x544
/// - Entry contract `JNI_OnLoad` then `SDL_main`
#[derive(Clone, Debug)]
pub struct ShimConfig {
    /// Directory holding the guest modules and its data files.
    ///
    /// Also returned to the guest as its working directory and storage paths.
    pub data_path: PathBuf,

    /// File name of the shared runtime support module, loaded first.
    pub runtime_module: String,

    /// Preferred load address of the runtime module, `None` lets the loader choose.
    pub runtime_address: Option<usize>,

    /// File name of the target module.
    pub target_module: String,

    /// Preferred load address of the target module.
    pub target_address: Option<usize>,

    /// What binding does with references missing from the import table.
    pub unresolved: UnresolvedPolicy,

    /// Guest thread sizing.
    pub threads: ThreadConfig,

    /// Display dimensions used by the viewport override.
    pub display: DisplayConfig,

    /// Values answered by the runtime bridge.
    pub bridge: BridgeConfig,

    /// Symbols forming the entry contract.
    pub entry: EntryConfig,

    /// Host environment variables exported before the guest entry runs.
    pub environment: Vec<(String, String)>,

    /// Directory of precompiled shader binaries keyed by source hash.
    pub shader_cache: Option<PathBuf>,

    /// Instruction set used for hook encodings.
    pub architecture: Architecture,
}

/// Treatment of module references the import table cannot satisfy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnresolvedPolicy {
    /// Log every unresolved name and fail the bind with the first one.
    Strict,
    /// Log every unresolved name and bind it to a neutral stub.
    #[default]
    Lenient,
}

/// Guest thread sizing.
///
/// Guest threads are pinned to a fixed, reduced stack regardless of the size the guest
/// requests through its thread attributes. This is a compatibility constraint of the host
/// memory budget; deep recursion that worked on the original platform may overflow here.
///
/// | Setting | Default Value |
/// |---------|---------------|
/// | `guest_stack_size` | 512 KiB |
/// | `main_stack_size` | 1 MiB |
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ThreadConfig {
    /// Stack size of every thread the guest creates.
    pub guest_stack_size: usize,
    /// Stack size of the thread running the guest entry.
    pub main_stack_size: usize,
}

/// Display dimensions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Width in pixels
    pub width: i32,
    /// Height in pixels
    pub height: i32,
}

/// Values reported by the runtime bridge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Answer of the `getCurrentLanguage` method.
    pub language: i32,
}

/// Symbols forming the process entry contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryConfig {
    /// Bridge load hook, invoked first with the instance table. Optional in the module.
    pub onload_symbol: String,
    /// Module entry invoked with `argc = 0` and no argument vector. Required.
    pub entry_symbol: String,
}

impl ShimConfig {
    /// Configuration that treats every unresolved reference as fatal.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            unresolved: UnresolvedPolicy::Strict,
            ..Self::lenient()
        }
    }

    /// Configuration that binds unresolved references to neutral stubs.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            data_path: PathBuf::from("."),
            runtime_module: "libc++_shared.so".to_string(),
            runtime_address: Some(0x9800_0000),
            target_module: "libmain.so".to_string(),
            target_address: None,
            unresolved: UnresolvedPolicy::Lenient,
            threads: ThreadConfig::default(),
            display: DisplayConfig::default(),
            bridge: BridgeConfig::default(),
            entry: EntryConfig::default(),
            environment: vec![("VITA_DISABLE_TOUCH_BACK".to_string(), "1".to_string())],
            shader_cache: None,
            architecture: Architecture::host(),
        }
    }

    /// Sets the data directory.
    #[must_use]
    pub fn with_data_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_path = path.into();
        self
    }

    /// Sets the unresolved reference policy.
    #[must_use]
    pub fn with_unresolved(mut self, policy: UnresolvedPolicy) -> Self {
        self.unresolved = policy;
        self
    }

    /// Sets the target module file name and preferred address.
    #[must_use]
    pub fn with_target_module(mut self, name: impl Into<String>, address: Option<usize>) -> Self {
        self.target_module = name.into();
        self.target_address = address;
        self
    }

    /// Sets the runtime module file name and preferred address.
    #[must_use]
    pub fn with_runtime_module(mut self, name: impl Into<String>, address: Option<usize>) -> Self {
        self.runtime_module = name.into();
        self.runtime_address = address;
        self
    }

    /// Adds an environment variable exported before the guest entry runs.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let key = key.into();
        let value = value.into();
        match self.environment.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.environment.push((key, value)),
        }
        self
    }

    /// Sets the precompiled shader cache directory.
    #[must_use]
    pub fn with_shader_cache(mut self, path: impl Into<PathBuf>) -> Self {
        self.shader_cache = Some(path.into());
        self
    }

    /// Sets the display dimensions.
    #[must_use]
    pub fn with_display(mut self, width: i32, height: i32) -> Self {
        self.display = DisplayConfig { width, height };
        self
    }

    /// Sets the hook encoding architecture.
    #[must_use]
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = architecture;
        self
    }

    /// Full path of the runtime module.
    #[must_use]
    pub fn runtime_path(&self) -> PathBuf {
        self.data_path.join(&self.runtime_module)
    }

    /// Full path of the target module.
    #[must_use]
    pub fn target_path(&self) -> PathBuf {
        self.data_path.join(&self.target_module)
    }

    /// Returns `true` when unresolved references are fatal.
    #[must_use]
    pub fn is_strict(&self) -> bool {
        self.unresolved == UnresolvedPolicy::Strict
    }

    /// The data directory.
    #[must_use]
    pub fn data_path(&self) -> &Path {
        &self.data_path
    }
}

impl Default for ShimConfig {
    fn default() -> Self {
        Self::lenient()
    }
}

impl ThreadConfig {
    /// Creates the default thread configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pinned guest thread stack size.
    #[must_use]
    pub fn with_guest_stack_size(mut self, size: usize) -> Self {
        self.guest_stack_size = size;
        self
    }

    /// Sets the guest main thread stack size.
    #[must_use]
    pub fn with_main_stack_size(mut self, size: usize) -> Self {
        self.main_stack_size = size;
        self
    }
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self {
            guest_stack_size: 512 * 1024,
            main_stack_size: 1024 * 1024,
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 960,
            height: 544,
        }
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self { language: 1 }
    }
}

impl Default for EntryConfig {
    fn default() -> Self {
        Self {
            onload_symbol: "JNI_OnLoad".to_string(),
            entry_symbol: "SDL_main".to_string(),
        }
    }
}
