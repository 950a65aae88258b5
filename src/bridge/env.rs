//! Emulation functions of the environment table.
//!
//! Argument lists of the `Call*MethodV` family arrive as a platform `va_list`, which is
//! passed as a single pointer-sized value on every supported target. They are never read.

use std::{
    ffi::{c_char, c_void, CStr},
    ptr,
};

use log::{debug, trace, warn};

use crate::bridge::{
    table::lookup, EnvSlot, MethodId, BRIDGE_VERSION, CLASS_SENTINEL, GLOBAL_REF_SENTINEL,
    OBJECT_CLASS_SENTINEL, OBJECT_SENTINEL,
};

/// Environment handle (`JNIEnv*`).
pub type JniEnv = *mut c_void;

/// Opaque object handle (`jobject`, `jclass`, `jstring`, ...).
pub type JObject = *mut c_void;

/// Instance handle (`JavaVM*`).
pub type JavaVm = *mut c_void;

type VaList = *mut c_void;

/// `JNI_ERR`
pub const JNI_ERR: i32 = -1;

/// One entry of a `RegisterNatives` array.
#[repr(C)]
#[derive(Debug)]
pub struct NativeMethod {
    /// Method name
    pub name: *const c_char,
    /// Method descriptor
    pub signature: *const c_char,
    /// Native implementation
    pub fn_ptr: *mut c_void,
}

unsafe fn text<'a>(value: *const c_char) -> std::borrow::Cow<'a, str> {
    if value.is_null() {
        "<null>".into()
    } else {
        CStr::from_ptr(value).to_string_lossy()
    }
}

/// Integer answer of a known method, `None` when it has no meaningful answer.
fn int_answer(env: JniEnv, method: usize) -> Option<i32> {
    match MethodId::from_raw(method) {
        MethodId::GetCurrentLanguage => lookup(env).map(|state| state.language()),
        MethodId::Init | MethodId::Unknown => None,
    }
}

/// Emulation function bound to `slot`.
pub(crate) fn handler(slot: EnvSlot) -> usize {
    match slot {
        EnvSlot::GetVersion => get_version as usize,
        EnvSlot::FindClass => find_class as usize,
        EnvSlot::ExceptionOccurred => exception_occurred as usize,
        EnvSlot::ExceptionClear => exception_clear as usize,
        EnvSlot::PushLocalFrame => push_local_frame as usize,
        EnvSlot::PopLocalFrame => pop_local_frame as usize,
        EnvSlot::NewGlobalRef => new_global_ref as usize,
        EnvSlot::DeleteGlobalRef => delete_global_ref as usize,
        EnvSlot::DeleteLocalRef => delete_local_ref as usize,
        EnvSlot::NewLocalRef => new_local_ref as usize,
        EnvSlot::NewObjectV => new_object_v as usize,
        EnvSlot::GetObjectClass => get_object_class as usize,
        EnvSlot::GetMethodID => get_method_id as usize,
        EnvSlot::CallObjectMethodV | EnvSlot::CallStaticObjectMethodV => {
            call_object_method_v as usize
        }
        EnvSlot::CallBooleanMethodV | EnvSlot::CallStaticBooleanMethodV => {
            call_boolean_method_v as usize
        }
        EnvSlot::CallIntMethodV | EnvSlot::CallStaticIntMethodV => call_int_method_v as usize,
        EnvSlot::CallLongMethodV | EnvSlot::CallStaticLongMethodV => call_long_method_v as usize,
        EnvSlot::CallFloatMethodV | EnvSlot::CallStaticFloatMethodV => {
            call_float_method_v as usize
        }
        EnvSlot::CallVoidMethodV | EnvSlot::CallStaticVoidMethodV => call_void_method_v as usize,
        EnvSlot::GetFieldID => get_field_id as usize,
        EnvSlot::GetObjectField => get_object_field as usize,
        EnvSlot::GetBooleanField => get_boolean_field as usize,
        EnvSlot::GetIntField => get_int_field as usize,
        EnvSlot::GetFloatField => get_float_field as usize,
        EnvSlot::GetStaticMethodID => get_static_method_id as usize,
        EnvSlot::GetStaticFieldID => get_static_field_id as usize,
        EnvSlot::GetStaticObjectField => get_static_object_field as usize,
        EnvSlot::NewStringUTF => new_string_utf as usize,
        EnvSlot::GetStringUTFLength => get_string_utf_length as usize,
        EnvSlot::GetStringUTFChars => get_string_utf_chars as usize,
        EnvSlot::ReleaseStringUTFChars => release_string_utf_chars as usize,
        EnvSlot::GetArrayLength => get_array_length as usize,
        EnvSlot::GetObjectArrayElement => get_object_array_element as usize,
        EnvSlot::RegisterNatives => register_natives as usize,
        EnvSlot::GetJavaVM => get_java_vm as usize,
        EnvSlot::GetStringUTFRegion => get_string_utf_region as usize,
        EnvSlot::ExceptionCheck => exception_check as usize,
    }
}

/// `GetVersion`
pub extern "C" fn get_version(_env: JniEnv) -> i32 {
    BRIDGE_VERSION
}

/// `FindClass`
pub unsafe extern "C" fn find_class(_env: JniEnv, name: *const c_char) -> JObject {
    debug!("FindClass({})", text(name));
    CLASS_SENTINEL as JObject
}

/// `ExceptionOccurred`, never any pending exception.
pub extern "C" fn exception_occurred(_env: JniEnv) -> JObject {
    ptr::null_mut()
}

/// `ExceptionClear`
pub extern "C" fn exception_clear(_env: JniEnv) {}

/// `ExceptionCheck`
pub extern "C" fn exception_check(_env: JniEnv) -> u8 {
    0
}

/// `PushLocalFrame`
pub extern "C" fn push_local_frame(_env: JniEnv, _capacity: i32) -> i32 {
    0
}

/// `PopLocalFrame`, hands the surviving reference back unchanged.
pub extern "C" fn pop_local_frame(_env: JniEnv, result: JObject) -> JObject {
    result
}

/// `NewGlobalRef`
pub extern "C" fn new_global_ref(env: JniEnv, object: JObject) -> JObject {
    if object.is_null() {
        return ptr::null_mut();
    }
    if let Some(state) = lookup(env) {
        state.add_global_ref();
    }
    GLOBAL_REF_SENTINEL as JObject
}

/// `DeleteGlobalRef`
pub extern "C" fn delete_global_ref(env: JniEnv, object: JObject) {
    if object.is_null() {
        return;
    }
    if let Some(state) = lookup(env) {
        state.remove_global_ref();
    }
}

/// `DeleteLocalRef`
pub extern "C" fn delete_local_ref(_env: JniEnv, _object: JObject) {}

/// `NewLocalRef`
pub extern "C" fn new_local_ref(_env: JniEnv, object: JObject) -> JObject {
    object
}

/// `NewObjectV`
pub extern "C" fn new_object_v(
    _env: JniEnv,
    _class: JObject,
    method: usize,
    _args: VaList,
) -> JObject {
    trace!("NewObjectV({})", MethodId::from_raw(method));
    OBJECT_SENTINEL as JObject
}

/// `GetObjectClass`
pub extern "C" fn get_object_class(_env: JniEnv, _object: JObject) -> JObject {
    OBJECT_CLASS_SENTINEL as JObject
}

/// `GetMethodID`
pub unsafe extern "C" fn get_method_id(
    _env: JniEnv,
    _class: JObject,
    name: *const c_char,
    signature: *const c_char,
) -> usize {
    let id = MethodId::resolve_raw(name);
    debug!("GetMethodID({}, {}) -> {id}", text(name), text(signature));
    id.raw()
}

/// `GetStaticMethodID`
pub unsafe extern "C" fn get_static_method_id(
    _env: JniEnv,
    _class: JObject,
    name: *const c_char,
    signature: *const c_char,
) -> usize {
    let id = MethodId::resolve_raw(name);
    debug!(
        "GetStaticMethodID({}, {}) -> {id}",
        text(name),
        text(signature)
    );
    id.raw()
}

/// `Call[Static]ObjectMethodV`
pub extern "C" fn call_object_method_v(
    _env: JniEnv,
    _object: JObject,
    method: usize,
    _args: VaList,
) -> JObject {
    trace!("CallObjectMethodV({})", MethodId::from_raw(method));
    ptr::null_mut()
}

/// `Call[Static]BooleanMethodV`
pub extern "C" fn call_boolean_method_v(
    env: JniEnv,
    _object: JObject,
    method: usize,
    _args: VaList,
) -> u8 {
    int_answer(env, method).map_or(0, |value| u8::from(value != 0))
}

/// `Call[Static]IntMethodV`
pub extern "C" fn call_int_method_v(
    env: JniEnv,
    _object: JObject,
    method: usize,
    _args: VaList,
) -> i32 {
    int_answer(env, method).unwrap_or(0)
}

/// `Call[Static]LongMethodV`
pub extern "C" fn call_long_method_v(
    env: JniEnv,
    _object: JObject,
    method: usize,
    _args: VaList,
) -> i64 {
    int_answer(env, method).map_or(0, i64::from)
}

/// `Call[Static]FloatMethodV`
pub extern "C" fn call_float_method_v(
    _env: JniEnv,
    _object: JObject,
    _method: usize,
    _args: VaList,
) -> f32 {
    0.0
}

/// `Call[Static]VoidMethodV`
pub extern "C" fn call_void_method_v(
    _env: JniEnv,
    _object: JObject,
    method: usize,
    _args: VaList,
) {
    trace!("CallVoidMethodV({})", MethodId::from_raw(method));
}

/// `GetFieldID`
pub unsafe extern "C" fn get_field_id(
    _env: JniEnv,
    _class: JObject,
    name: *const c_char,
    signature: *const c_char,
) -> usize {
    debug!("GetFieldID({}, {})", text(name), text(signature));
    0
}

/// `GetStaticFieldID`
pub unsafe extern "C" fn get_static_field_id(
    _env: JniEnv,
    _class: JObject,
    name: *const c_char,
    signature: *const c_char,
) -> usize {
    debug!("GetStaticFieldID({}, {})", text(name), text(signature));
    0
}

/// `GetObjectField`
pub extern "C" fn get_object_field(_env: JniEnv, _object: JObject, _field: usize) -> JObject {
    ptr::null_mut()
}

/// `GetBooleanField`
pub extern "C" fn get_boolean_field(_env: JniEnv, _object: JObject, _field: usize) -> u8 {
    0
}

/// `GetIntField`
pub extern "C" fn get_int_field(_env: JniEnv, _object: JObject, _field: usize) -> i32 {
    0
}

/// `GetFloatField`
pub extern "C" fn get_float_field(_env: JniEnv, _object: JObject, _field: usize) -> f32 {
    0.0
}

/// `GetStaticObjectField`
pub extern "C" fn get_static_object_field(
    _env: JniEnv,
    _class: JObject,
    _field: usize,
) -> JObject {
    ptr::null_mut()
}

/// `NewStringUTF`
///
/// Strings are represented by the guest's own character buffer.
pub extern "C" fn new_string_utf(_env: JniEnv, bytes: *const c_char) -> JObject {
    bytes.cast_mut().cast()
}

/// `GetStringUTFLength`
pub unsafe extern "C" fn get_string_utf_length(_env: JniEnv, string: JObject) -> i32 {
    if string.is_null() {
        return 0;
    }
    let length = CStr::from_ptr(string.cast_const().cast()).to_bytes().len();
    i32::try_from(length).unwrap_or(i32::MAX)
}

/// `GetStringUTFChars`
pub unsafe extern "C" fn get_string_utf_chars(
    _env: JniEnv,
    string: JObject,
    is_copy: *mut u8,
) -> *const c_char {
    if !is_copy.is_null() {
        *is_copy = 0;
    }
    string.cast_const().cast()
}

/// `ReleaseStringUTFChars`
pub extern "C" fn release_string_utf_chars(_env: JniEnv, _string: JObject, _chars: *const c_char) {
}

/// `GetStringUTFRegion`
///
/// Copies `length` bytes starting at `start` and terminates the copy with a NUL.
pub unsafe extern "C" fn get_string_utf_region(
    _env: JniEnv,
    string: JObject,
    start: i32,
    length: i32,
    buffer: *mut c_char,
) {
    let (Ok(start), Ok(length)) = (usize::try_from(start), usize::try_from(length)) else {
        return;
    };
    if string.is_null() || buffer.is_null() {
        return;
    }
    let source = string.cast_const().cast::<c_char>().add(start);
    ptr::copy_nonoverlapping(source, buffer, length);
    *buffer.add(length) = 0;
}

/// `GetArrayLength`, the guest array stores its length in its first word.
pub unsafe extern "C" fn get_array_length(_env: JniEnv, array: JObject) -> i32 {
    if array.is_null() {
        return 0;
    }
    ptr::read_unaligned(array.cast_const().cast::<i32>())
}

/// `GetObjectArrayElement`
pub extern "C" fn get_object_array_element(_env: JniEnv, _array: JObject, _index: i32) -> JObject {
    ptr::null_mut()
}

/// `RegisterNatives`
///
/// Registrations are recorded on the bridge state and otherwise ignored.
pub unsafe extern "C" fn register_natives(
    env: JniEnv,
    _class: JObject,
    methods: *const NativeMethod,
    count: i32,
) -> i32 {
    let Ok(count) = usize::try_from(count) else {
        return JNI_ERR;
    };
    if methods.is_null() {
        return if count == 0 { 0 } else { JNI_ERR };
    }
    let state = lookup(env);
    for method in std::slice::from_raw_parts(methods, count) {
        let name = text(method.name).into_owned();
        debug!(
            "RegisterNatives({name}, {}) -> {:p}",
            text(method.signature),
            method.fn_ptr
        );
        if let Some(state) = &state {
            state.register_native(name, method.fn_ptr as usize);
        }
    }
    0
}

/// `GetJavaVM`
pub unsafe extern "C" fn get_java_vm(env: JniEnv, vm: *mut JavaVm) -> i32 {
    if vm.is_null() {
        return JNI_ERR;
    }
    match lookup(env) {
        Some(state) => {
            *vm = state.vm_handle() as JavaVm;
            0
        }
        None => {
            warn!("GetJavaVM on unknown environment {env:p}");
            JNI_ERR
        }
    }
}
