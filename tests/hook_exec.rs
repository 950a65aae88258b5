//! Inline hooks on real executable code.
//!
//! A small function is assembled into an anonymous executable mapping, hooked through
//! the host code memory, and called before and after.
#![cfg(all(target_os = "linux", any(target_arch = "x86_64", target_arch = "aarch64")))]

use std::sync::{Arc, OnceLock};

use memmap2::{Mmap, MmapMut};
use soshim::prelude::*;

/// `return 7;` padded past the longest jump patch.
#[cfg(target_arch = "x86_64")]
fn returns_seven() -> Vec<u8> {
    let mut code = vec![0xB8, 0x07, 0x00, 0x00, 0x00, 0xC3];
    code.resize(32, 0xCC);
    code
}

#[cfg(target_arch = "aarch64")]
fn returns_seven() -> Vec<u8> {
    let mut code = Vec::new();
    for word in [0x5280_00E0u32, 0xD65F_03C0] {
        code.extend_from_slice(&word.to_le_bytes());
    }
    while code.len() < 32 {
        code.extend_from_slice(&0xD503_201Fu32.to_le_bytes());
    }
    code
}

/// Distance between function copies placed in one page.
const STRIDE: usize = 64;

fn map_functions(count: usize) -> Mmap {
    let mut map = MmapMut::map_anon(4096).unwrap();
    let code = returns_seven();
    for index in 0..count {
        let start = index * STRIDE;
        map[start..start + code.len()].copy_from_slice(&code);
    }
    map.make_exec().unwrap()
}

fn map_function() -> Mmap {
    map_functions(1)
}

type Function = extern "C" fn() -> i32;

unsafe fn as_function(address: usize) -> Function {
    std::mem::transmute(address)
}

extern "C" fn forty_two() -> i32 {
    42
}

static WRAPPED: OnceLock<Arc<InlineHook>> = OnceLock::new();

extern "C" fn add_hundred() -> i32 {
    let Some(hook) = WRAPPED.get() else {
        return -1;
    };
    match unsafe { hook.call_original(|entry| as_function(entry)()) } {
        Ok(value) => value + 100,
        Err(_) => -2,
    }
}

static LEFT: OnceLock<Arc<InlineHook>> = OnceLock::new();
static RIGHT: OnceLock<Arc<InlineHook>> = OnceLock::new();

fn wrap(slot: &OnceLock<Arc<InlineHook>>, bias: i32) -> i32 {
    let Some(hook) = slot.get() else {
        return -1;
    };
    match unsafe { hook.call_original(|entry| as_function(entry)()) } {
        Ok(value) => value + bias,
        Err(_) => -2,
    }
}

extern "C" fn left_wrapper() -> i32 {
    wrap(&LEFT, 1000)
}

extern "C" fn right_wrapper() -> i32 {
    wrap(&RIGHT, 2000)
}

#[test]
fn test_redirect_replaces_function() {
    let map = map_function();
    let entry = map.as_ptr() as usize;
    assert_eq!(unsafe { as_function(entry) }(), 7);

    let hooks = HookManager::host();
    let hook = unsafe { hooks.install("seven", entry, forty_two as usize) }.unwrap();
    assert_eq!(unsafe { as_function(entry) }(), 42);
    assert_eq!(&map[..hook.patch_bytes().len()], hook.patch_bytes());
}

#[test]
fn test_call_original_through_wrapper() {
    let map = map_function();
    let entry = map.as_ptr() as usize;

    let hooks = HookManager::host();
    let hook = unsafe { hooks.install("seven", entry, add_hundred as usize) }.unwrap();
    assert!(WRAPPED.set(Arc::clone(&hook)).is_ok());

    assert_eq!(unsafe { as_function(entry) }(), 107);
    // re-armed after the call
    assert_eq!(unsafe { as_function(entry) }(), 107);
    assert_eq!(&map[..hook.patch_bytes().len()], hook.patch_bytes());
}

#[test]
fn test_second_hook_on_same_site_conflicts() {
    let map = map_function();
    let entry = map.as_ptr() as usize;

    let hooks = HookManager::host();
    unsafe { hooks.install("first", entry, forty_two as usize) }.unwrap();
    let second = unsafe { hooks.install("second", entry, add_hundred as usize) };
    assert!(matches!(second, Err(Error::HookInstallConflict { .. })));
    assert_eq!(unsafe { as_function(entry) }(), 42);
}

#[test]
fn test_call_original_on_hooks_sharing_a_page() {
    let map = map_functions(2);
    let left = map.as_ptr() as usize;
    let right = left + STRIDE;

    let hooks = HookManager::host();
    let left_hook = unsafe { hooks.install("left", left, left_wrapper as usize) }.unwrap();
    let right_hook = unsafe { hooks.install("right", right, right_wrapper as usize) }.unwrap();
    assert!(LEFT.set(left_hook).is_ok());
    assert!(RIGHT.set(right_hook).is_ok());

    std::thread::scope(|scope| {
        let workers = [(left, 1007), (right, 2007)].map(|(entry, expected)| {
            scope.spawn(move || {
                let function = unsafe { as_function(entry) };
                (0..2000).all(|_| function() == expected)
            })
        });
        for worker in workers {
            assert!(worker.join().unwrap());
        }
    });
}
