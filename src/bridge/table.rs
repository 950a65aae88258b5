//! Table construction and per-bridge state.

use std::{
    ffi::c_void,
    fmt,
    sync::{
        atomic::{AtomicIsize, Ordering},
        Arc, OnceLock,
    },
};

use dashmap::DashMap;
use log::debug;
use strum::IntoEnumIterator;

use crate::{
    bridge::{clear_active_env, env, set_active_env, vm, EnvSlot, VmSlot, TABLE_CELLS},
    config::BridgeConfig,
    imports::stubs,
};

/// One page of pointer-sized cells, the shape of both emulated tables.
#[repr(C, align(16))]
struct TableBlock {
    cells: [usize; TABLE_CELLS],
}

impl TableBlock {
    fn new(filler: usize) -> Box<Self> {
        let mut block = Box::new(Self {
            cells: [filler; TABLE_CELLS],
        });
        block.cells[0] = block.address();
        block
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

/// State shared by the emulation functions of one bridge.
pub struct BridgeState {
    language: i32,
    env: usize,
    vm: usize,
    global_refs: AtomicIsize,
    natives: DashMap<String, usize>,
}

impl BridgeState {
    /// Answer of the `getCurrentLanguage` method.
    #[must_use]
    pub fn language(&self) -> i32 {
        self.language
    }

    /// Address of the environment table.
    #[must_use]
    pub fn env_handle(&self) -> usize {
        self.env
    }

    /// Address of the instance table.
    #[must_use]
    pub fn vm_handle(&self) -> usize {
        self.vm
    }

    /// Outstanding global references handed to the guest.
    #[must_use]
    pub fn global_refs(&self) -> isize {
        self.global_refs.load(Ordering::Relaxed)
    }

    /// Entry point the guest registered for `name` through `RegisterNatives`.
    #[must_use]
    pub fn registered_native(&self, name: &str) -> Option<usize> {
        self.natives.get(name).map(|entry| *entry.value())
    }

    /// Number of distinct native methods the guest registered.
    #[must_use]
    pub fn registered_natives(&self) -> usize {
        self.natives.len()
    }

    pub(crate) fn add_global_ref(&self) {
        self.global_refs.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remove_global_ref(&self) {
        self.global_refs.fetch_sub(1, Ordering::Relaxed);
    }

    pub(crate) fn register_native(&self, name: String, target: usize) {
        self.natives.insert(name, target);
    }
}

impl fmt::Debug for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeState")
            .field("language", &self.language)
            .field("env", &format_args!("{:#x}", self.env))
            .field("vm", &format_args!("{:#x}", self.vm))
            .field("global_refs", &self.global_refs())
            .field("natives", &self.natives.len())
            .finish()
    }
}

/// Bridge state by table handle.
///
/// Table functions receive only the guest's handle, so state is found through this
/// process-wide map. Several bridges may coexist; the launcher creates one per process.
fn registry() -> &'static DashMap<usize, Arc<BridgeState>> {
    static REGISTRY: OnceLock<DashMap<usize, Arc<BridgeState>>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// State of the bridge owning the environment or instance table at `handle`.
pub(crate) fn lookup(handle: *mut c_void) -> Option<Arc<BridgeState>> {
    registry()
        .get(&(handle as usize))
        .map(|entry| Arc::clone(entry.value()))
}

/// A fabricated environment table and instance table.
///
/// Both tables live at fixed heap addresses for as long as the bridge exists. Guest code
/// keeps the handles it was given, so the bridge must outlive every guest thread that can
/// still call through them.
///
/// # Examples
///
/// ```rust,no_run
/// use soshim::{config::BridgeConfig, bridge::{EnvSlot, RuntimeBridge}};
///
/// let bridge = RuntimeBridge::new(&BridgeConfig::default());
/// bridge.activate();
/// let find_class = bridge.env_slot(EnvSlot::FindClass);
/// assert_ne!(find_class, 0);
/// ```
pub struct RuntimeBridge {
    env: Box<TableBlock>,
    vm: Box<TableBlock>,
    state: Arc<BridgeState>,
}

impl RuntimeBridge {
    /// Builds both tables with every populated slot bound to its emulation function.
    #[must_use]
    pub fn new(config: &BridgeConfig) -> Self {
        let neutral = stubs::ret0 as usize;
        let mut env = TableBlock::new(neutral);
        let mut vm = TableBlock::new(neutral);
        for slot in EnvSlot::iter() {
            env.cells[slot.index()] = env::handler(slot);
        }
        for slot in VmSlot::iter() {
            vm.cells[slot.index()] = vm::handler(slot);
        }

        let state = Arc::new(BridgeState {
            language: config.language,
            env: env.address(),
            vm: vm.address(),
            global_refs: AtomicIsize::new(0),
            natives: DashMap::new(),
        });
        registry().insert(state.env, Arc::clone(&state));
        registry().insert(state.vm, Arc::clone(&state));
        debug!(
            "runtime bridge tables at env={:#x} vm={:#x}",
            state.env, state.vm
        );

        Self { env, vm, state }
    }

    /// Environment handle (`JNIEnv*`) handed to the guest.
    #[must_use]
    pub fn env_handle(&self) -> *mut c_void {
        self.env.address() as *mut c_void
    }

    /// Instance handle (`JavaVM*`) handed to the guest.
    #[must_use]
    pub fn vm_handle(&self) -> *mut c_void {
        self.vm.address() as *mut c_void
    }

    /// Shared state of the emulation functions.
    #[must_use]
    pub fn state(&self) -> &BridgeState {
        &self.state
    }

    /// Current target of an environment slot.
    #[must_use]
    pub fn env_slot(&self, slot: EnvSlot) -> usize {
        self.env.cells[slot.index()]
    }

    /// Current target of an instance slot.
    #[must_use]
    pub fn vm_slot(&self, slot: VmSlot) -> usize {
        self.vm.cells[slot.index()]
    }

    /// Raw environment cell at `index`, `None` past the end of the table.
    #[must_use]
    pub fn env_cell(&self, index: usize) -> Option<usize> {
        self.env.cells.get(index).copied()
    }

    /// Rebinds an environment slot, returning the previous target.
    ///
    /// # Safety
    ///
    /// `target` must be a function with the slot's signature and calling convention, and
    /// no guest thread may be calling through the table concurrently.
    pub unsafe fn set_env_slot(&mut self, slot: EnvSlot, target: usize) -> usize {
        std::mem::replace(&mut self.env.cells[slot.index()], target)
    }

    /// Publishes this bridge as the environment returned by the platform accessors.
    pub fn activate(&self) {
        set_active_env(self.env.address());
    }

    /// Returns `true` if this bridge is the one returned by the platform accessors.
    #[must_use]
    pub fn is_active(&self) -> bool {
        crate::bridge::active_env() as usize == self.env.address()
    }
}

impl Drop for RuntimeBridge {
    fn drop(&mut self) {
        clear_active_env(self.env.address());
        registry().remove(&self.env.address());
        registry().remove(&self.vm.address());
    }
}

impl fmt::Debug for RuntimeBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeBridge")
            .field("state", &self.state)
            .finish()
    }
}
