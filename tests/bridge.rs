//! Runtime bridge dispatch through raw table offsets, as guest code performs it.

use std::{
    ffi::{c_char, c_void, CStr},
    mem::size_of,
};

use soshim::{
    bridge::{
        EnvSlot, MethodId, RuntimeBridge, VmSlot, BRIDGE_VERSION, CLASS_SENTINEL,
        GLOBAL_REF_SENTINEL, TABLE_BYTES,
    },
    config::BridgeConfig,
};

/// Reads the function stored `offset` bytes into the table behind `handle`.
unsafe fn function_at(handle: *mut c_void, offset: usize) -> usize {
    let table = *(handle as *const *const u8);
    *(table.add(offset) as *const usize)
}

#[test]
fn test_handles_point_at_their_own_table() {
    let bridge = RuntimeBridge::new(&BridgeConfig::default());
    unsafe {
        assert_eq!(*(bridge.env_handle() as *const usize), bridge.env_handle() as usize);
        assert_eq!(*(bridge.vm_handle() as *const usize), bridge.vm_handle() as usize);
    }
}

#[test]
fn test_version_and_class_lookup() {
    let bridge = RuntimeBridge::new(&BridgeConfig::default());
    let env = bridge.env_handle();

    type GetVersion = unsafe extern "C" fn(*mut c_void) -> i32;
    type FindClass = unsafe extern "C" fn(*mut c_void, *const c_char) -> *mut c_void;
    unsafe {
        let get_version: GetVersion =
            std::mem::transmute(function_at(env, EnvSlot::GetVersion.offset()));
        assert_eq!(get_version(env), BRIDGE_VERSION);

        let find_class: FindClass =
            std::mem::transmute(function_at(env, EnvSlot::FindClass.offset()));
        let class = find_class(env, c"org/libsdl/app/SDLActivity".as_ptr());
        assert_eq!(class as usize, CLASS_SENTINEL);
    }
}

#[test]
fn test_language_method_round_trip() {
    let bridge = RuntimeBridge::new(&BridgeConfig { language: 4 });
    let env = bridge.env_handle();

    type GetMethodId = unsafe extern "C" fn(
        *mut c_void,
        *mut c_void,
        *const c_char,
        *const c_char,
    ) -> usize;
    type CallIntV = unsafe extern "C" fn(*mut c_void, *mut c_void, usize, *mut c_void) -> i32;
    unsafe {
        let lookup: GetMethodId =
            std::mem::transmute(function_at(env, EnvSlot::GetStaticMethodID.offset()));
        let method = lookup(
            env,
            CLASS_SENTINEL as *mut c_void,
            c"getCurrentLanguage".as_ptr(),
            c"()I".as_ptr(),
        );
        assert_eq!(MethodId::from_raw(method), MethodId::GetCurrentLanguage);

        let call: CallIntV =
            std::mem::transmute(function_at(env, EnvSlot::CallStaticIntMethodV.offset()));
        assert_eq!(call(env, std::ptr::null_mut(), method, std::ptr::null_mut()), 4);

        let unknown = lookup(
            env,
            CLASS_SENTINEL as *mut c_void,
            c"isTablet".as_ptr(),
            c"()Z".as_ptr(),
        );
        assert_eq!(MethodId::from_raw(unknown), MethodId::Unknown);
        assert_eq!(call(env, std::ptr::null_mut(), unknown, std::ptr::null_mut()), 0);
    }
}

#[test]
fn test_global_references_are_counted() {
    let bridge = RuntimeBridge::new(&BridgeConfig::default());
    let env = bridge.env_handle();

    type NewGlobalRef = unsafe extern "C" fn(*mut c_void, *mut c_void) -> *mut c_void;
    type DeleteGlobalRef = unsafe extern "C" fn(*mut c_void, *mut c_void);
    unsafe {
        let new_ref: NewGlobalRef =
            std::mem::transmute(function_at(env, EnvSlot::NewGlobalRef.offset()));
        let delete_ref: DeleteGlobalRef =
            std::mem::transmute(function_at(env, EnvSlot::DeleteGlobalRef.offset()));

        let object = 0x1234 as *mut c_void;
        let global = new_ref(env, object);
        assert_eq!(global as usize, GLOBAL_REF_SENTINEL);
        assert_eq!(bridge.state().global_refs(), 1);
        delete_ref(env, global);
        assert_eq!(bridge.state().global_refs(), 0);
    }
}

#[test]
fn test_string_region_copy() {
    let bridge = RuntimeBridge::new(&BridgeConfig::default());
    let env = bridge.env_handle();

    type Region = unsafe extern "C" fn(*mut c_void, *mut c_void, i32, i32, *mut c_char);
    unsafe {
        let region: Region =
            std::mem::transmute(function_at(env, EnvSlot::GetStringUTFRegion.offset()));
        let source = c"storage/emulated";
        let mut out = [0x7f as c_char; 16];
        region(env, source.as_ptr().cast_mut().cast(), 8, 8, out.as_mut_ptr());
        assert_eq!(CStr::from_ptr(out.as_ptr()).to_bytes(), b"emulated");
    }
}

#[test]
fn test_get_env_through_instance_table() {
    let bridge = RuntimeBridge::new(&BridgeConfig::default());
    let vm = bridge.vm_handle();

    type GetEnv = unsafe extern "C" fn(*mut c_void, *mut *mut c_void, i32) -> i32;
    unsafe {
        let get_env: GetEnv = std::mem::transmute(function_at(vm, VmSlot::GetEnv.offset()));
        let mut env = std::ptr::null_mut();
        assert_eq!(get_env(vm, &mut env, BRIDGE_VERSION), 0);
        assert_eq!(env, bridge.env_handle());
    }
}

#[test]
fn test_every_cell_is_callable_target() {
    let bridge = RuntimeBridge::new(&BridgeConfig::default());
    let cells = TABLE_BYTES / size_of::<usize>();
    for index in 1..cells {
        let target = bridge.env_cell(index).unwrap();
        assert_ne!(target, 0, "cell {index} is empty");
    }
    assert!(bridge.env_cell(cells).is_none());
}
