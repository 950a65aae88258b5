//! Host implementations bound in place of guest C library and platform calls.
//!
//! Everything here is `extern "C"` and called directly by guest code, so nothing returns a
//! [`crate::Result`]: failures are reported through the return value and the guest's
//! `errno`, exactly as the replaced function would.
//!
//! Variadic guest functions (`__android_log_print`, `__android_log_assert`) are bound to
//! fixed-arity functions reading only the leading arguments, which every supported
//! calling convention passes in the same registers as a variadic call. Their format
//! string is logged unexpanded.

use std::{
    cell::Cell,
    ffi::{c_char, c_int, c_long, c_void, CStr, CString},
    path::Path,
    ptr,
    sync::atomic::{AtomicPtr, AtomicUsize, Ordering},
    time::Duration,
};

use log::{error, log, warn, Level};

/// Bionic value of `ETIMEDOUT`.
pub const GUEST_ETIMEDOUT: c_int = 110;

/// Byte offset of `st_mode` in the guest `struct stat`.
pub const GUEST_STAT_MODE_OFFSET: usize = 0x10;

/// Byte offset of `st_size` in the guest `struct stat`.
pub const GUEST_STAT_SIZE_OFFSET: usize = 0x30;

/// Value of the guest's stack protector canary.
pub const STACK_CHK_GUARD: usize = 0x4242_4242;

const NEUTRAL_WORDS: usize = 0x1000 / std::mem::size_of::<usize>();

/// Zeroed, writable block of memory usable as any guest data object.
#[repr(C, align(16))]
pub struct NeutralBlock([AtomicUsize; NEUTRAL_WORDS]);

impl NeutralBlock {
    const fn new() -> Self {
        #[allow(clippy::declare_interior_mutable_const)]
        const ZERO: AtomicUsize = AtomicUsize::new(0);
        Self([ZERO; NEUTRAL_WORDS])
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }
}

static NEUTRAL_DATA: NeutralBlock = NeutralBlock::new();
static FAKE_STDIO: NeutralBlock = NeutralBlock::new();
static STACK_GUARD: AtomicUsize = AtomicUsize::new(STACK_CHK_GUARD);
static DATA_PATH: AtomicPtr<c_char> = AtomicPtr::new(ptr::null_mut());

thread_local! {
    static GUEST_ERRNO: Cell<c_int> = const { Cell::new(0) };
}

/// Address of the block bound to unresolved data references.
#[must_use]
pub fn neutral_data() -> usize {
    NEUTRAL_DATA.address()
}

/// Address of the fake `__sF` stdio array.
#[must_use]
pub fn fake_stdio() -> usize {
    FAKE_STDIO.address()
}

/// Address of the fake `__stack_chk_guard`.
#[must_use]
pub fn stack_guard() -> usize {
    &STACK_GUARD as *const AtomicUsize as usize
}

/// Publishes the data directory reported by `getcwd` and the storage path accessors.
///
/// Previous values are leaked: the guest may still hold pointers into them.
pub fn set_data_path(path: &Path) {
    let Ok(value) = CString::new(path.to_string_lossy().as_bytes()) else {
        warn!("data path {} contains a NUL byte, ignored", path.display());
        return;
    };
    DATA_PATH.store(value.into_raw(), Ordering::Release);
}

/// The published data directory, `"."` when none was set.
#[must_use]
pub fn data_path() -> &'static CStr {
    let current = DATA_PATH.load(Ordering::Acquire);
    if current.is_null() {
        c"."
    } else {
        // SAFETY: set_data_path only stores leaked CStrings
        unsafe { CStr::from_ptr(current) }
    }
}

/// Pointer to the host thread's `errno`.
#[must_use]
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn host_errno_location() -> *mut c_int {
    // SAFETY: always valid for the calling thread
    unsafe { libc::__errno_location() }
}

/// Pointer to the host thread's `errno`.
#[must_use]
#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
pub fn host_errno_location() -> *mut c_int {
    // SAFETY: always valid for the calling thread
    unsafe { libc::__error() }
}

/// Sets the host thread's `errno`.
pub fn set_errno(value: c_int) {
    // SAFETY: pointer to the calling thread's errno
    unsafe { *host_errno_location() = value };
}

/// Translates a host error number to the guest's numbering.
#[must_use]
pub fn guest_errno(host: c_int) -> c_int {
    if host == libc::ETIMEDOUT {
        GUEST_ETIMEDOUT
    } else {
        host
    }
}

/// Maps an Android log priority to a log level.
#[must_use]
pub fn guest_level(priority: c_int) -> Level {
    match priority {
        2 => Level::Trace,
        3 => Level::Debug,
        4 => Level::Info,
        5 => Level::Warn,
        6 | 7 => Level::Error,
        _ => Level::Info,
    }
}

unsafe fn lossy<'a>(text: *const c_char) -> std::borrow::Cow<'a, str> {
    if text.is_null() {
        "(null)".into()
    } else {
        CStr::from_ptr(text).to_string_lossy()
    }
}

/// Returns 0.
pub extern "C" fn ret0() -> c_int {
    0
}

/// Returns 1.
pub extern "C" fn ret1() -> c_int {
    1
}

/// Returns -1.
pub extern "C" fn ret_minus1() -> c_int {
    -1
}

/// Returns 99, the top of the guest's scheduling priority range.
pub extern "C" fn ret99() -> c_int {
    99
}

/// `__android_log_print`
pub unsafe extern "C" fn android_log_print(
    priority: c_int,
    tag: *const c_char,
    format: *const c_char,
) -> c_int {
    log!(target: "guest", guest_level(priority), "{}: {}", lossy(tag), lossy(format));
    0
}

/// `__android_log_write`
pub unsafe extern "C" fn android_log_write(
    priority: c_int,
    tag: *const c_char,
    text: *const c_char,
) -> c_int {
    log!(target: "guest", guest_level(priority), "{}: {}", lossy(tag), lossy(text));
    0
}

/// `__android_log_vprint`
pub unsafe extern "C" fn android_log_vprint(
    priority: c_int,
    tag: *const c_char,
    format: *const c_char,
    _args: *mut c_void,
) -> c_int {
    log!(target: "guest", guest_level(priority), "{}: {}", lossy(tag), lossy(format));
    0
}

/// `__android_log_assert`
pub unsafe extern "C" fn android_log_assert(
    condition: *const c_char,
    tag: *const c_char,
    format: *const c_char,
) {
    error!(
        target: "guest",
        "{}: assertion '{}' failed: {}",
        lossy(tag),
        lossy(condition),
        lossy(format)
    );
    libc::abort();
}

/// `__assert2`
pub unsafe extern "C" fn assert2(
    file: *const c_char,
    line: c_int,
    function: *const c_char,
    expression: *const c_char,
) {
    error!(
        target: "guest",
        "{}:{} {}: assertion '{}' failed",
        lossy(file),
        line,
        lossy(function),
        lossy(expression)
    );
}

/// `abort`
pub extern "C" fn abort_hook() {
    error!(target: "guest", "guest called abort");
    // SAFETY: terminates the process
    unsafe { libc::abort() };
}

/// `__errno`
///
/// Returns a per-thread guest `errno` holding the host value translated to guest numbering.
pub extern "C" fn errno_hook() -> *mut c_int {
    // SAFETY: pointer to the calling thread's errno
    let host = unsafe { *host_errno_location() };
    GUEST_ERRNO.with(|cell| {
        cell.set(guest_errno(host));
        cell.as_ptr()
    })
}

unsafe fn write_guest_stat(buffer: *mut c_void, stat: &libc::stat) {
    let base = buffer.cast::<u8>();
    base.add(GUEST_STAT_MODE_OFFSET)
        .cast::<u32>()
        .write_unaligned(stat.st_mode as u32);
    base.add(GUEST_STAT_SIZE_OFFSET)
        .cast::<u64>()
        .write_unaligned(stat.st_size as u64);
}

/// `stat`
///
/// Fills the size and mode fields of the guest's `struct stat`.
pub unsafe extern "C" fn stat_hook(path: *const c_char, buffer: *mut c_void) -> c_int {
    if path.is_null() || buffer.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let mut host: libc::stat = std::mem::zeroed();
    let result = libc::stat(path, &mut host);
    if result == 0 {
        write_guest_stat(buffer, &host);
    }
    result
}

/// `fstat`
pub unsafe extern "C" fn fstat_hook(fd: c_int, buffer: *mut c_void) -> c_int {
    if buffer.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let mut host: libc::stat = std::mem::zeroed();
    let result = libc::fstat(fd, &mut host);
    if result == 0 {
        write_guest_stat(buffer, &host);
    }
    result
}

/// Directory entry in the guest's `struct dirent` layout.
#[repr(C)]
pub struct GuestDirent {
    /// Inode number
    pub d_ino: u64,
    /// Opaque position, always 0
    pub d_off: i64,
    /// Size of this record
    pub d_reclen: u16,
    /// `DT_*` file type, at byte offset 18
    pub d_type: u8,
    /// NUL-terminated name, at byte offset 19
    pub d_name: [c_char; 256],
}

/// Open directory handed to the guest as its `DIR *`.
pub struct GuestDir {
    host: *mut libc::DIR,
    entry: GuestDirent,
}

/// `opendir`
pub unsafe extern "C" fn opendir_hook(path: *const c_char) -> *mut GuestDir {
    if path.is_null() {
        set_errno(libc::EFAULT);
        return ptr::null_mut();
    }
    let host = libc::opendir(path);
    if host.is_null() {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(GuestDir {
        host,
        entry: std::mem::zeroed(),
    }))
}

/// `readdir`
///
/// The returned entry lives in the directory object and is overwritten by the next call.
pub unsafe extern "C" fn readdir_hook(dir: *mut GuestDir) -> *mut GuestDirent {
    if dir.is_null() {
        set_errno(libc::EBADF);
        return ptr::null_mut();
    }
    let dir = &mut *dir;
    let host = libc::readdir(dir.host);
    if host.is_null() {
        return ptr::null_mut();
    }

    let name = CStr::from_ptr((*host).d_name.as_ptr()).to_bytes();
    let len = name.len().min(dir.entry.d_name.len() - 1);
    let entry = &mut dir.entry;
    entry.d_ino = (*host).d_ino as u64;
    entry.d_off = 0;
    entry.d_reclen = std::mem::size_of::<GuestDirent>() as u16;
    entry.d_type = (*host).d_type;
    ptr::copy_nonoverlapping(name.as_ptr().cast::<c_char>(), entry.d_name.as_mut_ptr(), len);
    entry.d_name[len] = 0;
    entry
}

/// `closedir`
pub unsafe extern "C" fn closedir_hook(dir: *mut GuestDir) -> c_int {
    if dir.is_null() {
        set_errno(libc::EBADF);
        return -1;
    }
    let dir = Box::from_raw(dir);
    libc::closedir(dir.host)
}

/// `nanosleep`
pub unsafe extern "C" fn nanosleep_hook(
    request: *const libc::timespec,
    _remaining: *mut libc::timespec,
) -> c_int {
    if request.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    let request = &*request;
    if request.tv_sec < 0 || request.tv_nsec < 0 || request.tv_nsec > 999_999_999 {
        set_errno(libc::EINVAL);
        return -1;
    }
    std::thread::sleep(Duration::new(request.tv_sec as u64, request.tv_nsec as u32));
    0
}

/// `clock_gettime`
///
/// Clocks the host does not know fall back to the realtime clock.
pub unsafe extern "C" fn clock_gettime_hook(clock: libc::clockid_t, out: *mut libc::timespec) -> c_int {
    if out.is_null() {
        set_errno(libc::EFAULT);
        return -1;
    }
    if libc::clock_gettime(clock, out) == 0 {
        return 0;
    }
    libc::clock_gettime(libc::CLOCK_REALTIME, out)
}

/// `getcwd`
pub unsafe extern "C" fn getcwd_hook(buffer: *mut c_char, size: libc::size_t) -> *mut c_char {
    let path = data_path().to_bytes_with_nul();
    if buffer.is_null() || size < path.len() {
        set_errno(libc::ERANGE);
        return ptr::null_mut();
    }
    ptr::copy_nonoverlapping(path.as_ptr().cast::<c_char>(), buffer, path.len());
    buffer
}

/// `SDL_AndroidGetInternalStoragePath` and `SDL_AndroidGetExternalStoragePath`
pub extern "C" fn storage_path() -> *const c_char {
    data_path().as_ptr()
}

/// `Android_JNI_GetEnv` and `SDL_AndroidGetJNIEnv`
pub extern "C" fn active_env() -> *mut c_void {
    crate::bridge::active_env()
}

/// `memalign`
pub unsafe extern "C" fn memalign(alignment: libc::size_t, size: libc::size_t) -> *mut c_void {
    let alignment = alignment.max(std::mem::size_of::<usize>()).next_power_of_two();
    let mut out = ptr::null_mut();
    if libc::posix_memalign(&mut out, alignment, size) == 0 {
        out
    } else {
        ptr::null_mut()
    }
}

/// `__aeabi_memclr`
pub unsafe extern "C" fn aeabi_memclr(dest: *mut c_void, size: libc::size_t) {
    ptr::write_bytes(dest.cast::<u8>(), 0, size);
}

/// `__aeabi_memset`, note the EABI argument order.
pub unsafe extern "C" fn aeabi_memset(dest: *mut c_void, size: libc::size_t, value: c_int) {
    ptr::write_bytes(dest.cast::<u8>(), value as u8, size);
}

/// `__strlen_chk`
pub unsafe extern "C" fn strlen_chk(text: *const c_char, limit: libc::size_t) -> libc::size_t {
    let length = libc::strlen(text);
    if length >= limit {
        error!(target: "guest", "strlen overflowed its {limit} byte buffer");
        libc::abort();
    }
    length
}

/// `sysconf`
///
/// Answers the queries the guest makes about the processor, zero for everything else.
pub extern "C" fn sysconf_hook(name: c_int) -> c_long {
    // Bionic numbering
    const SC_PAGESIZE: c_int = 0x27;
    const SC_NPROCESSORS_CONF: c_int = 0x60;
    const SC_NPROCESSORS_ONLN: c_int = 0x61;
    match name {
        SC_PAGESIZE => 4096,
        SC_NPROCESSORS_CONF | SC_NPROCESSORS_ONLN => std::thread::available_parallelism()
            .map(|n| n.get() as c_long)
            .unwrap_or(1),
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_stubs() {
        assert_eq!(ret0(), 0);
        assert_eq!(ret1(), 1);
        assert_eq!(ret_minus1(), -1);
        assert_eq!(ret99(), 99);
    }

    #[test]
    fn test_neutral_data_is_zeroed() {
        let block = neutral_data() as *const usize;
        for i in 0..NEUTRAL_WORDS {
            assert_eq!(unsafe { *block.add(i) }, 0);
        }
        assert_ne!(neutral_data(), fake_stdio());
    }

    #[test]
    fn test_stack_guard_value() {
        assert_eq!(unsafe { *(stack_guard() as *const usize) }, STACK_CHK_GUARD);
    }

    #[test]
    fn test_errno_translation() {
        assert_eq!(guest_errno(libc::ETIMEDOUT), GUEST_ETIMEDOUT);
        assert_eq!(guest_errno(libc::ENOENT), libc::ENOENT);

        set_errno(libc::ETIMEDOUT);
        let guest = errno_hook();
        assert_eq!(unsafe { *guest }, GUEST_ETIMEDOUT);
    }

    #[test]
    fn test_guest_level_mapping() {
        assert_eq!(guest_level(2), Level::Trace);
        assert_eq!(guest_level(3), Level::Debug);
        assert_eq!(guest_level(4), Level::Info);
        assert_eq!(guest_level(5), Level::Warn);
        assert_eq!(guest_level(6), Level::Error);
        assert_eq!(guest_level(7), Level::Error);
        assert_eq!(guest_level(42), Level::Info);
    }

    #[test]
    fn test_stat_writes_guest_layout() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, &[0u8; 1234]).unwrap();
        let path = CString::new(file.path().to_string_lossy().as_bytes()).unwrap();

        let mut buffer = [0u8; 0x80];
        let result = unsafe { stat_hook(path.as_ptr(), buffer.as_mut_ptr().cast()) };
        assert_eq!(result, 0);

        let size = u64::from_le_bytes(buffer[0x30..0x38].try_into().unwrap());
        assert_eq!(size, 1234);
        let mode = u32::from_le_bytes(buffer[0x10..0x14].try_into().unwrap());
        assert_eq!(mode & libc::S_IFMT as u32, libc::S_IFREG as u32);
    }

    #[test]
    fn test_stat_missing_file() {
        let mut buffer = [0u8; 0x80];
        let result = unsafe { stat_hook(c"/nonexistent/soshim/file".as_ptr(), buffer.as_mut_ptr().cast()) };
        assert_eq!(result, -1);
        assert!(buffer.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_guest_dirent_layout() {
        assert_eq!(std::mem::offset_of!(GuestDirent, d_type), 18);
        assert_eq!(std::mem::offset_of!(GuestDirent, d_name), 19);
    }

    #[test]
    fn test_directory_listing_in_guest_layout() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("alpha.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("beta.bin"), b"b").unwrap();
        std::fs::create_dir(dir.path().join("gamma")).unwrap();
        let path = CString::new(dir.path().to_string_lossy().as_bytes()).unwrap();

        let mut found = Vec::new();
        unsafe {
            let handle = opendir_hook(path.as_ptr());
            assert!(!handle.is_null());
            loop {
                let entry = readdir_hook(handle);
                if entry.is_null() {
                    break;
                }
                // read through the raw guest offsets
                let bytes = entry.cast::<u8>();
                let kind = *bytes.add(18);
                let name = CStr::from_ptr(bytes.add(19).cast()).to_string_lossy().into_owned();
                if name != "." && name != ".." {
                    found.push((name, kind));
                }
            }
            assert_eq!(closedir_hook(handle), 0);
        }
        found.sort();
        assert_eq!(
            found,
            vec![
                ("alpha.txt".to_string(), libc::DT_REG),
                ("beta.bin".to_string(), libc::DT_REG),
                ("gamma".to_string(), libc::DT_DIR),
            ]
        );
    }

    #[test]
    fn test_directory_errors() {
        unsafe {
            assert!(opendir_hook(c"/nonexistent/soshim/dir".as_ptr()).is_null());
            assert!(readdir_hook(ptr::null_mut()).is_null());
            assert_eq!(closedir_hook(ptr::null_mut()), -1);
            assert_eq!(*host_errno_location(), libc::EBADF);
        }
    }

    #[test]
    fn test_nanosleep_validation() {
        let bad = libc::timespec {
            tv_sec: 0,
            tv_nsec: 1_000_000_000,
        };
        assert_eq!(unsafe { nanosleep_hook(&bad, ptr::null_mut()) }, -1);
        assert_eq!(unsafe { *host_errno_location() }, libc::EINVAL);

        assert_eq!(unsafe { nanosleep_hook(ptr::null(), ptr::null_mut()) }, -1);
        assert_eq!(unsafe { *host_errno_location() }, libc::EFAULT);

        let ok = libc::timespec {
            tv_sec: 0,
            tv_nsec: 1_000,
        };
        assert_eq!(unsafe { nanosleep_hook(&ok, ptr::null_mut()) }, 0);
    }

    #[test]
    fn test_getcwd_reports_data_path() {
        let mut small = [0 as c_char; 1];
        assert!(unsafe { getcwd_hook(small.as_mut_ptr(), 0) }.is_null());

        let mut buffer = [0 as c_char; 4096];
        let out = unsafe { getcwd_hook(buffer.as_mut_ptr(), buffer.len()) };
        assert_eq!(out, buffer.as_mut_ptr());
        assert_eq!(unsafe { CStr::from_ptr(out) }, data_path());
    }

    #[test]
    fn test_aeabi_memory_helpers() {
        let mut buffer = [0xAAu8; 16];
        unsafe {
            aeabi_memset(buffer.as_mut_ptr().cast(), 8, 0x11);
            aeabi_memclr(buffer.as_mut_ptr().add(8).cast(), 4);
        }
        assert_eq!(&buffer[..8], &[0x11; 8]);
        assert_eq!(&buffer[8..12], &[0; 4]);
        assert_eq!(&buffer[12..], &[0xAA; 4]);
    }

    #[test]
    fn test_memalign() {
        let block = unsafe { memalign(64, 100) };
        assert!(!block.is_null());
        assert_eq!(block as usize % 64, 0);
        unsafe { libc::free(block) };
        assert_eq!(unsafe { strlen_chk(c"abc".as_ptr(), 4) }, 3);
    }
}
