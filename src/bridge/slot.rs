//! Fixed slot positions of the emulated function tables.
//!
//! Slots are the function indices of the native interface the guest was compiled against.
//! Call sites generated by the guest's compiler load `table[index]` directly, so a slot's
//! byte offset is `index * size_of::<usize>()` and can never be reordered.
//!
//! | Slot | Index | Offset (32-bit) |
//! |------|-------|-----------------|
//! | `FindClass` | 6 | `0x18` |
//! | `GetMethodID` | 33 | `0x84` |
//! | `CallIntMethodV` | 50 | `0xC8` |
//! | `GetStaticMethodID` | 113 | `0x1C4` |
//! | `NewStringUTF` | 167 | `0x29C` |
//! | `GetJavaVM` | 219 | `0x36C` |

use std::mem::size_of;

use strum::{Display, EnumIter, IntoEnumIterator, IntoStaticStr};

/// Size in bytes of each emulated table.
pub const TABLE_BYTES: usize = 0x1000;

/// Number of pointer-sized cells in each emulated table.
pub const TABLE_CELLS: usize = TABLE_BYTES / size_of::<usize>();

/// Populated slots of the environment table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[repr(usize)]
pub enum EnvSlot {
    /// Interface version
    GetVersion = 4,
    /// Class lookup by name
    FindClass = 6,
    /// Pending exception, always none
    ExceptionOccurred = 15,
    /// Clears the pending exception
    ExceptionClear = 17,
    /// Opens a local reference frame
    PushLocalFrame = 19,
    /// Closes a local reference frame
    PopLocalFrame = 20,
    /// Creates a counted global reference
    NewGlobalRef = 21,
    /// Releases a global reference
    DeleteGlobalRef = 22,
    /// Releases a local reference
    DeleteLocalRef = 23,
    /// Creates a local reference
    NewLocalRef = 25,
    /// Constructs an object
    NewObjectV = 29,
    /// Class of an object
    GetObjectClass = 31,
    /// Instance method lookup
    GetMethodID = 33,
    /// Instance call returning an object
    CallObjectMethodV = 35,
    /// Instance call returning a boolean
    CallBooleanMethodV = 38,
    /// Instance call returning an int
    CallIntMethodV = 50,
    /// Instance call returning a long
    CallLongMethodV = 53,
    /// Instance call returning a float
    CallFloatMethodV = 56,
    /// Instance call without result
    CallVoidMethodV = 62,
    /// Instance field lookup
    GetFieldID = 94,
    /// Object field read
    GetObjectField = 95,
    /// Boolean field read
    GetBooleanField = 96,
    /// Int field read
    GetIntField = 100,
    /// Float field read
    GetFloatField = 102,
    /// Static method lookup
    GetStaticMethodID = 113,
    /// Static call returning an object
    CallStaticObjectMethodV = 115,
    /// Static call returning a boolean
    CallStaticBooleanMethodV = 118,
    /// Static call returning an int
    CallStaticIntMethodV = 130,
    /// Static call returning a long
    CallStaticLongMethodV = 133,
    /// Static call returning a float
    CallStaticFloatMethodV = 136,
    /// Static call without result
    CallStaticVoidMethodV = 142,
    /// Static field lookup
    GetStaticFieldID = 144,
    /// Static object field read
    GetStaticObjectField = 145,
    /// String from modified UTF-8
    NewStringUTF = 167,
    /// Length of a string in bytes
    GetStringUTFLength = 168,
    /// Borrows the bytes of a string
    GetStringUTFChars = 169,
    /// Returns borrowed string bytes
    ReleaseStringUTFChars = 170,
    /// Length of an array
    GetArrayLength = 171,
    /// Element of an object array
    GetObjectArrayElement = 173,
    /// Registers native method implementations
    RegisterNatives = 215,
    /// The instance table of this environment
    GetJavaVM = 219,
    /// Copies part of a string
    GetStringUTFRegion = 221,
    /// Whether an exception is pending
    ExceptionCheck = 228,
}

/// Populated slots of the instance table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumIter, IntoStaticStr)]
#[repr(usize)]
pub enum VmSlot {
    /// Tears the instance down
    DestroyJavaVM = 3,
    /// Attaches the calling thread
    AttachCurrentThread = 4,
    /// Detaches the calling thread
    DetachCurrentThread = 5,
    /// Environment table of the calling thread
    GetEnv = 6,
    /// Attaches the calling thread as a daemon
    AttachCurrentThreadAsDaemon = 7,
}

impl EnvSlot {
    /// Function index of the slot.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Byte offset of the slot from the start of the table.
    #[must_use]
    pub fn offset(self) -> usize {
        self.index() * size_of::<usize>()
    }

    /// The slot at `offset`, if populated.
    #[must_use]
    pub fn from_offset(offset: usize) -> Option<Self> {
        Self::iter().find(|slot| slot.offset() == offset)
    }
}

impl VmSlot {
    /// Function index of the slot.
    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Byte offset of the slot from the start of the table.
    #[must_use]
    pub fn offset(self) -> usize {
        self.index() * size_of::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_fit_in_table() {
        assert!(EnvSlot::iter().all(|slot| slot.offset() < TABLE_BYTES));
        assert!(VmSlot::iter().all(|slot| slot.offset() < TABLE_BYTES));
        assert!(EnvSlot::iter().all(|slot| slot.index() != 0));
    }

    #[test]
    fn test_offsets_are_index_times_pointer() {
        let ptr = size_of::<usize>();
        assert_eq!(EnvSlot::FindClass.offset(), 6 * ptr);
        assert_eq!(EnvSlot::GetMethodID.offset(), 33 * ptr);
        assert_eq!(EnvSlot::GetJavaVM.offset(), 219 * ptr);
        assert_eq!(VmSlot::GetEnv.offset(), 6 * ptr);
    }

    #[cfg(target_pointer_width = "32")]
    #[test]
    fn test_arm32_offsets() {
        assert_eq!(EnvSlot::FindClass.offset(), 0x18);
        assert_eq!(EnvSlot::ExceptionOccurred.offset(), 0x3C);
        assert_eq!(EnvSlot::NewObjectV.offset(), 0x74);
        assert_eq!(EnvSlot::CallIntMethodV.offset(), 0xC8);
        assert_eq!(EnvSlot::GetStaticMethodID.offset(), 0x1C4);
        assert_eq!(EnvSlot::CallStaticFloatMethodV.offset(), 0x220);
        assert_eq!(EnvSlot::GetStringUTFRegion.offset(), 0x374);
        assert_eq!(VmSlot::AttachCurrentThread.offset(), 0x10);
        assert_eq!(VmSlot::GetEnv.offset(), 0x18);
    }

    #[test]
    fn test_from_offset() {
        let offset = EnvSlot::NewStringUTF.offset();
        assert_eq!(EnvSlot::from_offset(offset), Some(EnvSlot::NewStringUTF));
        assert_eq!(EnvSlot::from_offset(0), None);
    }

    #[test]
    fn test_slot_names() {
        assert_eq!(EnvSlot::GetMethodID.to_string(), "GetMethodID");
        let name: &'static str = VmSlot::GetEnv.into();
        assert_eq!(name, "GetEnv");
    }
}
