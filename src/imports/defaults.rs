//! The default import vocabulary.
//!
//! Entries are registered in precedence order: graphics overrides, synchronization proxies,
//! compatibility shims, guest logging, bridge accessors, data symbols, then plain host
//! functions. Host functions the `libc` crate does not declare (libm, wide-character
//! helpers, GL, SDL, zlib) are looked up by name through a [`SymbolResolver`] and skipped
//! when absent.

use log::{debug, trace};

use crate::{
    config::ShimConfig,
    imports::{stubs, ImportEntry, ImportTable},
    module::{DlsymResolver, SymbolResolver},
    patches::{gles, guard},
    sync::{cond, mutex, semaphore, thread},
};

macro_rules! functions {
    ($table:expr, { $($name:literal => $target:expr),+ $(,)? }) => {
        $( $table.push(ImportEntry::function($name, $target as usize)); )+
    };
}

macro_rules! libc_functions {
    ($table:expr, [$($name:ident),+ $(,)?]) => {
        $( $table.push(ImportEntry::function(stringify!($name), libc::$name as usize)); )+
    };
}

/// Math library functions.
const MATH: &[&str] = &[
    "acos", "acosf", "acosh", "asin", "asinf", "asinh", "atan", "atanf", "atanh", "atan2",
    "atan2f", "ceil", "ceilf", "cos", "cosf", "cosh", "exp", "exp2", "expf", "fabs", "fabsf",
    "floor", "floorf", "fmod", "fmodf", "frexp", "frexpf", "ldexp", "ldexpf", "log", "logf",
    "log10", "log10f", "lrint", "lrintf", "modf", "modff", "pow", "powf", "rint", "rintf",
    "round", "roundf", "sin", "sinf", "sinh", "sincos", "sincosf", "sqrt", "sqrtf", "tan",
    "tanf", "tanh",
];

/// C library functions reached by name.
const LIBC_BY_NAME: &[&str] = &[
    "__cxa_atexit", "__cxa_finalize", "asctime", "atol", "atoll", "basename", "bsearch",
    "btowc", "clearerr", "clock", "fscanf", "fseeko", "ftello", "getc", "getwc", "localtime",
    "longjmp", "lrand48", "mbrlen", "mbrtowc", "mbsnrtowcs", "mbsrtowcs", "mbtowc", "memmem",
    "newlocale", "freelocale", "uselocale", "putc", "putwc", "fputwc", "setjmp", "srand48",
    "strcoll", "strlcpy", "strpbrk", "strtof", "strtoll", "strtoull", "strxfrm", "towlower",
    "towupper", "ungetc", "ungetwc", "vasprintf", "vfprintf", "vprintf", "vsnprintf",
    "vsprintf", "vsscanf", "vswprintf", "wcrtomb", "wcscmp", "wcscoll", "wcsftime", "wcslen",
    "wcsncpy", "wcsnrtombs", "wcsxfrm", "wctob", "wctype", "wmemchr", "wmemcmp", "wmemcpy",
    "wmemmove", "wmemset", "iswalpha", "iswcntrl", "iswctype", "iswdigit", "iswlower",
    "iswprint", "iswpunct", "iswspace", "iswupper", "iswxdigit", "isascii", "isblank",
];

/// Compression library functions.
const ZLIB: &[&str] = &[
    "crc32", "deflate", "deflateEnd", "deflateInit_", "deflateInit2_", "deflateReset",
    "gzopen", "inflate", "inflateEnd", "inflateInit_", "inflateInit2_", "inflateReset",
    "inflateReset2", "zlibVersion",
];

/// OpenGL ES entry points forwarded to the host driver.
const GLES: &[&str] = &[
    "glActiveTexture", "glAttachShader", "glBindAttribLocation", "glBindBuffer",
    "glBindFramebuffer", "glBindRenderbuffer", "glBindTexture", "glBlendEquation",
    "glBlendFunc", "glBlendFuncSeparate", "glBufferData", "glBufferSubData",
    "glCheckFramebufferStatus", "glClear", "glClearColor", "glClearDepthf", "glColorMask",
    "glCompressedTexImage2D", "glCreateProgram", "glCreateShader", "glCullFace",
    "glDeleteBuffers", "glDeleteFramebuffers", "glDeleteProgram", "glDeleteRenderbuffers",
    "glDeleteShader", "glDeleteTextures", "glDepthFunc", "glDepthMask", "glDetachShader",
    "glDisable", "glDisableVertexAttribArray", "glDrawArrays", "glDrawElements", "glEnable",
    "glEnableVertexAttribArray", "glFramebufferRenderbuffer", "glFramebufferTexture2D",
    "glFrontFace", "glGenBuffers", "glGenFramebuffers", "glGenRenderbuffers", "glGenTextures",
    "glGenerateMipmap", "glGetAttribLocation", "glGetIntegerv", "glGetProgramInfoLog",
    "glGetShaderInfoLog", "glGetShaderiv", "glGetString", "glGetUniformLocation",
    "glLinkProgram", "glReadPixels", "glRenderbufferStorage", "glScissor", "glTexImage2D",
    "glTexParameterf", "glTexParameteri", "glTexSubImage2D", "glUniform1f", "glUniform1fv",
    "glUniform1i", "glUniform2fv", "glUniform3fv", "glUniform4fv", "glUniformMatrix3fv",
    "glUniformMatrix4fv", "glUseProgram", "glVertexAttribPointer",
];

/// SDL2 entry points forwarded to the host library.
const SDL: &[&str] = &[
    "SDL_AddTimer", "SDL_CloseAudioDevice", "SDL_CondSignal", "SDL_CondWait",
    "SDL_CreateCond", "SDL_CreateMutex", "SDL_CreateThread", "SDL_CreateWindow", "SDL_Delay",
    "SDL_DestroyCond", "SDL_DestroyMutex", "SDL_DestroyWindow", "SDL_GL_CreateContext",
    "SDL_GL_DeleteContext", "SDL_GL_GetDrawableSize", "SDL_GL_MakeCurrent",
    "SDL_GL_SetAttribute", "SDL_GL_SetSwapInterval", "SDL_GL_SwapWindow",
    "SDL_GameControllerClose", "SDL_GameControllerEventState", "SDL_GameControllerGetAxis",
    "SDL_GameControllerGetButton", "SDL_GameControllerOpen", "SDL_GetError",
    "SDL_GetPlatform", "SDL_GetTicks", "SDL_GetWindowSize", "SDL_Init", "SDL_InitSubSystem",
    "SDL_IsTextInputActive", "SDL_JoystickOpen", "SDL_LockMutex", "SDL_NumJoysticks",
    "SDL_OpenAudioDevice", "SDL_PauseAudioDevice", "SDL_PollEvent", "SDL_Quit", "SDL_RWclose",
    "SDL_RWFromFile", "SDL_RWread", "SDL_RWseek", "SDL_RWsize", "SDL_SetHint",
    "SDL_ShowCursor", "SDL_StartTextInput", "SDL_StopTextInput", "SDL_UnlockMutex",
    "SDL_WaitThread", "SDL_WarpMouseInWindow", "SDL_free", "SDL_malloc", "SDL_setenv",
];

/// Builds the default table, resolving named host functions through the process scope.
#[must_use]
pub fn default_table(config: &ShimConfig) -> ImportTable {
    default_table_with(config, &DlsymResolver::global())
}

/// Builds the default table, resolving named host functions through `host`.
///
/// Publishes the configured data directory and guest stack size to the shims that report
/// them.
#[must_use]
pub fn default_table_with<R: SymbolResolver + ?Sized>(config: &ShimConfig, host: &R) -> ImportTable {
    stubs::set_data_path(&config.data_path);
    thread::set_guest_stack_size(config.threads.guest_stack_size);

    let mut table = ImportTable::with_capacity(640);
    table.extend_from(gles::overrides(config, host));
    register_sync(&mut table);
    register_compat(&mut table);
    register_logging(&mut table);
    register_bridge(&mut table);
    register_data(&mut table);
    register_libc(&mut table);

    let mut missing = 0usize;
    for group in [MATH, LIBC_BY_NAME, ZLIB, GLES, SDL] {
        for &name in group {
            match host.resolve(name) {
                Some(address) => table.push(ImportEntry::function(name, address)),
                None => {
                    trace!("host symbol '{name}' unavailable");
                    missing += 1;
                }
            }
        }
    }

    debug!(
        "default import table: {} entries, {missing} host symbols unavailable",
        table.len()
    );
    table
}

fn register_sync(table: &mut ImportTable) {
    functions!(table, {
        "pthread_mutex_init" => mutex::init,
        "pthread_mutex_destroy" => mutex::destroy,
        "pthread_mutex_lock" => mutex::lock,
        "pthread_mutex_trylock" => mutex::trylock,
        "pthread_mutex_unlock" => mutex::unlock,
        "pthread_mutexattr_init" => mutex::attr_init,
        "pthread_mutexattr_destroy" => mutex::attr_destroy,
        "pthread_mutexattr_settype" => mutex::attr_settype,
        "pthread_mutexattr_gettype" => mutex::attr_gettype,
        "pthread_mutexattr_setpshared" => mutex::attr_setpshared,
        "pthread_cond_init" => cond::init,
        "pthread_cond_destroy" => cond::destroy,
        "pthread_cond_signal" => cond::signal,
        "pthread_cond_broadcast" => cond::broadcast,
        "pthread_cond_wait" => cond::wait,
        "pthread_cond_timedwait" => cond::timedwait,
        "pthread_condattr_init" => cond::attr_init,
        "pthread_condattr_destroy" => cond::attr_destroy,
        "pthread_create" => thread::create,
        "pthread_join" => thread::join,
        "pthread_detach" => thread::detach,
        "pthread_equal" => thread::equal,
        "pthread_self" => thread::self_handle,
        "pthread_setschedparam" => thread::setschedparam,
        "pthread_getschedparam" => thread::getschedparam,
        "pthread_setname_np" => thread::setname_np,
        "pthread_getattr_np" => thread::getattr_np,
        "pthread_attr_init" => thread::attr_init,
        "pthread_attr_destroy" => thread::attr_destroy,
        "pthread_attr_setdetachstate" => thread::attr_setdetachstate,
        "pthread_attr_getdetachstate" => thread::attr_getdetachstate,
        "pthread_attr_setstacksize" => thread::attr_setstacksize,
        "pthread_attr_getstacksize" => thread::attr_getstacksize,
        "pthread_attr_setstack" => thread::attr_setstack,
        "pthread_attr_getstack" => thread::attr_getstack,
        "pthread_attr_setschedparam" => thread::attr_setschedparam,
        "pthread_attr_getschedparam" => thread::attr_getschedparam,
        "sem_init" => semaphore::init,
        "sem_destroy" => semaphore::destroy,
        "sem_post" => semaphore::post,
        "sem_wait" => semaphore::wait,
        "sem_trywait" => semaphore::trywait,
        "sem_timedwait" => semaphore::timedwait,
        "sem_getvalue" => semaphore::getvalue,
    });
}

fn register_compat(table: &mut ImportTable) {
    functions!(table, {
        "__errno" => stubs::errno_hook,
        "abort" => stubs::abort_hook,
        "__stack_chk_fail" => stubs::abort_hook,
        "__assert2" => stubs::assert2,
        "stat" => stubs::stat_hook,
        "fstat" => stubs::fstat_hook,
        "opendir" => stubs::opendir_hook,
        "readdir" => stubs::readdir_hook,
        "closedir" => stubs::closedir_hook,
        "nanosleep" => stubs::nanosleep_hook,
        "clock_gettime" => stubs::clock_gettime_hook,
        "getcwd" => stubs::getcwd_hook,
        "sysconf" => stubs::sysconf_hook,
        "__cxa_guard_acquire" => guard::acquire,
        "__cxa_guard_release" => guard::release,
        "__cxa_guard_abort" => guard::abort,
        "chdir" => stubs::ret0,
        "getenv" => stubs::ret0,
        "setenv" => stubs::ret0,
        "getpid" => stubs::ret0,
        "fcntl" => stubs::ret0,
        "sigaction" => stubs::ret0,
        "bsd_signal" => stubs::ret0,
        "dlopen" => stubs::ret0,
        "strerror_r" => stubs::ret0,
        "__system_property_get" => stubs::ret0,
        "__gnu_Unwind_Find_exidx" => stubs::ret0,
        "dl_unwind_find_exidx" => stubs::ret0,
        "sched_get_priority_min" => stubs::ret0,
        "sched_get_priority_max" => stubs::ret99,
        "sched_yield" => stubs::ret0,
        "prctl" => stubs::ret0,
        "syscall" => stubs::ret_minus1,
    });
}

fn register_logging(table: &mut ImportTable) {
    functions!(table, {
        "__android_log_print" => stubs::android_log_print,
        "__android_log_write" => stubs::android_log_write,
        "__android_log_vprint" => stubs::android_log_vprint,
        "__android_log_assert" => stubs::android_log_assert,
        "SDL_Log" => stubs::ret0,
        "SDL_LogDebug" => stubs::ret0,
        "SDL_LogError" => stubs::ret0,
        "SDL_LogInfo" => stubs::ret0,
        "SDL_LogWarn" => stubs::ret0,
        "SDL_LogSetPriority" => stubs::ret0,
    });
}

fn register_bridge(table: &mut ImportTable) {
    functions!(table, {
        "Android_JNI_GetEnv" => stubs::active_env,
        "SDL_AndroidGetJNIEnv" => stubs::active_env,
        "SDL_AndroidGetActivity" => stubs::ret0,
        "SDL_AndroidGetActivityClass" => stubs::ret0,
        "SDL_Android_Init" => stubs::ret1,
        "SDL_AndroidGetInternalStoragePath" => stubs::storage_path,
        "SDL_AndroidGetExternalStoragePath" => stubs::storage_path,
        "SDL_AndroidGetExternalStorageState" => stubs::ret1,
        "SDL_NumAccelerometers" => stubs::ret0,
    });
}

fn register_data(table: &mut ImportTable) {
    table.push(ImportEntry::data("__stack_chk_guard", stubs::stack_guard()));
    table.push(ImportEntry::data("__sF", stubs::fake_stdio()));
}

fn register_libc(table: &mut ImportTable) {
    libc_functions!(table, [
        memcpy, memmove, memset, memcmp, memchr,
        strlen, strcmp, strncmp, strcpy, strncpy, strcat, strncat, strchr, strrchr, strstr,
        strdup, strcspn, strspn, strtok, strerror, strcasecmp, strncasecmp,
        strtod, strtol, strtoul, atoi, atof,
        malloc, calloc, realloc, free, posix_memalign,
        fopen, fclose, fread, fwrite, fseek, ftell, fflush, fgets, fputs, puts, fputc, fgetc,
        printf, fprintf, sprintf, snprintf, sscanf, setvbuf, ferror, feof, fileno, fdopen,
        open, close, read, write, lseek, unlink, mkdir, rmdir, rename, access, ftruncate,
        poll, writev, realpath, mmap, munmap,
        time, gettimeofday, localtime_r, gmtime_r, mktime, strftime, usleep,
        pthread_key_create, pthread_key_delete, pthread_getspecific, pthread_setspecific,
        pthread_once,
        isalnum, isalpha, iscntrl, isdigit, isgraph, islower, isprint, ispunct, isspace,
        isupper, isxdigit, tolower, toupper,
        qsort, rand, srand, exit, socket, bind, listen, send, recv, sendto, setsockopt,
        setlocale,
    ]);
    functions!(table, {
        "__aeabi_memcpy" => libc::memcpy,
        "__aeabi_memcpy4" => libc::memcpy,
        "__aeabi_memcpy8" => libc::memcpy,
        "__aeabi_memmove" => libc::memmove,
        "__aeabi_memmove4" => libc::memmove,
        "__aeabi_memmove8" => libc::memmove,
        "strcasestr" => libc::strstr,
        "lseek64" => libc::lseek,
        "memalign" => stubs::memalign,
        "__aeabi_memclr" => stubs::aeabi_memclr,
        "__aeabi_memclr4" => stubs::aeabi_memclr,
        "__aeabi_memclr8" => stubs::aeabi_memclr,
        "__aeabi_memset" => stubs::aeabi_memset,
        "__aeabi_memset4" => stubs::aeabi_memset,
        "__aeabi_memset8" => stubs::aeabi_memset,
        "__strlen_chk" => stubs::strlen_chk,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ImportTable {
        default_table_with(&ShimConfig::default(), &|name: &str| {
            (name == "sinf").then_some(0x5151)
        })
    }

    #[test]
    fn test_sync_proxies_present() {
        let table = table();
        assert_eq!(
            table.lookup("pthread_mutex_lock").map(ImportEntry::target),
            Some(mutex::lock as usize)
        );
        assert_eq!(
            table.lookup("sem_post").map(ImportEntry::target),
            Some(semaphore::post as usize)
        );
    }

    #[test]
    fn test_compat_shims() {
        let table = table();
        assert_eq!(
            table.lookup("getenv").map(ImportEntry::target),
            Some(stubs::ret0 as usize)
        );
        assert_eq!(
            table.lookup("sched_get_priority_max").map(ImportEntry::target),
            Some(stubs::ret99 as usize)
        );
        assert_eq!(
            table.lookup("malloc").map(ImportEntry::target),
            Some(libc::malloc as usize)
        );
        assert_eq!(
            table.lookup("readdir").map(ImportEntry::target),
            Some(stubs::readdir_hook as usize)
        );
    }

    #[test]
    fn test_data_entries() {
        let table = table();
        let guard = table.lookup("__stack_chk_guard").unwrap();
        assert_eq!(guard.kind(), crate::imports::ImportKind::Data);
        assert_eq!(guard.target(), stubs::stack_guard());
        assert_eq!(
            table.lookup("__sF").map(ImportEntry::target),
            Some(stubs::fake_stdio())
        );
    }

    #[test]
    fn test_resolved_host_names_only() {
        let table = table();
        assert_eq!(table.lookup("sinf").map(ImportEntry::target), Some(0x5151));
        assert!(!table.contains("cosf"));
        assert!(!table.contains("glClear"));
    }

    #[test]
    fn test_viewport_override_without_host_gl() {
        // no host glViewport, so nothing to clamp
        let table = table();
        assert!(!table.contains("glViewport"));
    }

    #[test]
    fn test_bridge_accessors() {
        let table = table();
        assert_eq!(
            table.lookup("SDL_AndroidGetJNIEnv").map(ImportEntry::target),
            Some(stubs::active_env as usize)
        );
        assert_eq!(
            table.lookup("SDL_Android_Init").map(ImportEntry::target),
            Some(stubs::ret1 as usize)
        );
    }
}
