//! Emulation functions of the instance table.
//!
//! Every host thread shares the single environment of the owning bridge, so attaching is
//! a lookup and detaching does nothing.

use std::ffi::c_void;

use log::warn;

use crate::bridge::{
    env::{JavaVm, JniEnv},
    table::lookup,
    VmSlot,
};

/// `JNI_EDETACHED`
pub const JNI_EDETACHED: i32 = -2;

/// Emulation function bound to `slot`.
pub(crate) fn handler(slot: VmSlot) -> usize {
    match slot {
        VmSlot::DestroyJavaVM => destroy_java_vm as usize,
        VmSlot::AttachCurrentThread | VmSlot::AttachCurrentThreadAsDaemon => {
            attach_current_thread as usize
        }
        VmSlot::DetachCurrentThread => detach_current_thread as usize,
        VmSlot::GetEnv => get_env as usize,
    }
}

unsafe fn write_env(vm: JavaVm, out: *mut JniEnv) -> i32 {
    let Some(state) = lookup(vm) else {
        warn!("environment requested from unknown instance {vm:p}");
        return JNI_EDETACHED;
    };
    if !out.is_null() {
        *out = state.env_handle() as JniEnv;
    }
    0
}

/// `DestroyJavaVM`
pub extern "C" fn destroy_java_vm(_vm: JavaVm) -> i32 {
    0
}

/// `AttachCurrentThread` and `AttachCurrentThreadAsDaemon`
pub unsafe extern "C" fn attach_current_thread(
    vm: JavaVm,
    env: *mut JniEnv,
    _args: *mut c_void,
) -> i32 {
    write_env(vm, env)
}

/// `DetachCurrentThread`
pub extern "C" fn detach_current_thread(_vm: JavaVm) -> i32 {
    0
}

/// `GetEnv`, every requested version is accepted.
pub unsafe extern "C" fn get_env(vm: JavaVm, env: *mut JniEnv, _version: i32) -> i32 {
    write_env(vm, env)
}

#[cfg(test)]
mod tests {
    use std::ptr;

    use super::*;
    use crate::{bridge::RuntimeBridge, config::BridgeConfig};

    #[test]
    fn test_get_env_writes_environment() {
        let bridge = RuntimeBridge::new(&BridgeConfig::default());
        let mut env: JniEnv = ptr::null_mut();
        unsafe {
            assert_eq!(get_env(bridge.vm_handle(), &mut env, 0x0001_0006), 0);
        }
        assert_eq!(env, bridge.env_handle());
    }

    #[test]
    fn test_attach_shares_environment() {
        let bridge = RuntimeBridge::new(&BridgeConfig::default());
        let vm = bridge.vm_handle() as usize;
        let expected = bridge.env_handle() as usize;
        let attached = std::thread::spawn(move || {
            let mut env: JniEnv = ptr::null_mut();
            let code = unsafe { attach_current_thread(vm as JavaVm, &mut env, ptr::null_mut()) };
            (code, env as usize)
        })
        .join()
        .unwrap();
        assert_eq!(attached, (0, expected));
        assert_eq!(detach_current_thread(vm as JavaVm), 0);
    }

    #[test]
    fn test_unknown_instance() {
        let mut env: JniEnv = ptr::null_mut();
        let bogus = 0x10 as JavaVm;
        assert_eq!(unsafe { get_env(bogus, &mut env, 0) }, JNI_EDETACHED);
        assert!(env.is_null());
    }
}
