//! Graphics backend overrides.
//!
//! The guest renders through GLES entry points bound from the host backend. A few of them
//! need adjusting for the fixed host display and shader toolchain; [`GlesOverrides`]
//! resolves the host functions by name and produces import entries that take precedence
//! over the plain pass-throughs.
//!
//! | Import | Override |
//! |--------|----------|
//! | `glViewport` | always `(0, 0, display width, display height)` |
//! | `glGetProgramiv` | `GL_ACTIVE_UNIFORM_BLOCKS` answers 0 |
//! | `glShaderSource` | precompiled binary from the shader cache when present |
//! | `SDL_GL_GetProcAddress` | override list consulted before the host |
//!
//! An override is only registered when the host functions it forwards to resolve.

use std::{
    ffi::{c_char, c_void, CStr},
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use log::{debug, info, trace, warn};
use sha1::{Digest, Sha1};

use crate::{
    config::{DisplayConfig, ShimConfig},
    imports::{stubs, ImportTable},
    module::SymbolResolver,
};

type GLenum = u32;
type GLuint = u32;
type GLint = i32;
type GLsizei = i32;

/// `GL_ACTIVE_UNIFORM_BLOCKS`
pub const GL_ACTIVE_UNIFORM_BLOCKS: GLenum = 0x8A36;

type Viewport = unsafe extern "C" fn(GLint, GLint, GLsizei, GLsizei);
type GetProgramiv = unsafe extern "C" fn(GLuint, GLenum, *mut GLint);
type ShaderSource = unsafe extern "C" fn(GLuint, GLsizei, *const *const c_char, *const GLint);
type CompileShader = unsafe extern "C" fn(GLuint);
type ShaderBinary = unsafe extern "C" fn(GLsizei, *const GLuint, GLenum, *const c_void, GLsizei);
type GetProcAddress = unsafe extern "C" fn(*const c_char) -> *mut c_void;

/// Host backend functions the overrides forward to.
#[derive(Clone, Debug, Default)]
pub struct GlesOverrides {
    display: DisplayConfig,
    shader_cache: Option<PathBuf>,
    viewport: Option<usize>,
    get_programiv: Option<usize>,
    shader_source: Option<usize>,
    compile_shader: Option<usize>,
    shader_binary: Option<usize>,
    get_proc_address: Option<usize>,
}

// Overrides are bound into the guest as plain functions and find the host GL entry points
// here. One graphics backend per process; the last activation wins.
static BACKEND: RwLock<Option<GlesOverrides>> = RwLock::new(None);

fn backend() -> Option<GlesOverrides> {
    BACKEND.read().unwrap_or_else(PoisonError::into_inner).clone()
}

impl GlesOverrides {
    /// Resolves the host functions through `host`.
    #[must_use]
    pub fn resolve<R: SymbolResolver + ?Sized>(config: &ShimConfig, host: &R) -> Self {
        Self {
            display: config.display,
            shader_cache: config.shader_cache.clone(),
            viewport: host.resolve("glViewport"),
            get_programiv: host.resolve("glGetProgramiv"),
            shader_source: host.resolve("glShaderSource"),
            compile_shader: host.resolve("glCompileShader"),
            shader_binary: host.resolve("glShaderBinary"),
            get_proc_address: host.resolve("SDL_GL_GetProcAddress"),
        }
    }

    /// Returns `true` when the cached binary path of `glShaderSource` can be taken.
    #[must_use]
    pub fn caches_shaders(&self) -> bool {
        self.shader_cache.is_some()
            && self.shader_source.is_some()
            && self.compile_shader.is_some()
            && self.shader_binary.is_some()
    }

    /// Import entries for every override whose host functions resolved.
    #[must_use]
    pub fn table(&self) -> ImportTable {
        let mut table = ImportTable::new();
        if self.viewport.is_some() {
            table = table.function("glViewport", viewport_clamp as usize);
        }
        if self.get_programiv.is_some() {
            table = table.function("glGetProgramiv", get_programiv as usize);
        }
        if self.caches_shaders() {
            table = table.function("glShaderSource", shader_source as usize);
        }
        if self.get_proc_address.is_some() {
            table = table.function("SDL_GL_GetProcAddress", get_proc_address as usize);
        }
        table
    }

    /// Makes these functions the ones the override entry points forward to.
    pub fn activate(self) {
        *BACKEND.write().unwrap_or_else(PoisonError::into_inner) = Some(self);
    }
}

/// Resolves, activates and returns the graphics overrides for `config`.
#[must_use]
pub fn overrides<R: SymbolResolver + ?Sized>(config: &ShimConfig, host: &R) -> ImportTable {
    let overrides = GlesOverrides::resolve(config, host);
    let table = overrides.table();
    if !table.is_empty() {
        info!("{} graphics overrides registered", table.len());
    }
    overrides.activate();
    table
}

unsafe extern "C" fn viewport_clamp(_x: GLint, _y: GLint, _width: GLsizei, _height: GLsizei) {
    let Some(backend) = backend() else { return };
    if let Some(address) = backend.viewport {
        let viewport: Viewport = std::mem::transmute(address);
        viewport(0, 0, backend.display.width, backend.display.height);
    }
}

unsafe extern "C" fn get_programiv(program: GLuint, pname: GLenum, params: *mut GLint) {
    if pname == GL_ACTIVE_UNIFORM_BLOCKS {
        if !params.is_null() {
            *params = 0;
        }
        return;
    }
    if let Some(address) = backend().and_then(|b| b.get_programiv) {
        let forward: GetProgramiv = std::mem::transmute(address);
        forward(program, pname, params);
    }
}

/// Cache key of a shader: SHA-1 over the concatenated sources, printed as five
/// little-endian words.
#[must_use]
pub fn shader_cache_key<'a>(sources: impl IntoIterator<Item = &'a [u8]>) -> String {
    let mut hasher = Sha1::new();
    for source in sources {
        hasher.update(source);
    }
    let digest = hasher.finalize();
    digest
        .chunks_exact(4)
        .map(|word| format!("{:08x}", u32::from_le_bytes([word[0], word[1], word[2], word[3]])))
        .collect()
}

/// Location of the precompiled binary for `key` inside `cache`.
#[must_use]
pub fn shader_cache_path(cache: &Path, key: &str) -> PathBuf {
    cache.join(format!("{key}_glsl.gxp"))
}

unsafe extern "C" fn shader_source(
    shader: GLuint,
    count: GLsizei,
    strings: *const *const c_char,
    lengths: *const GLint,
) {
    let Some(backend) = backend() else { return };
    let (Some(source), Some(compile), Some(binary)) =
        (backend.shader_source, backend.compile_shader, backend.shader_binary)
    else {
        return;
    };

    let sources: Vec<&[u8]> = (0..usize::try_from(count).unwrap_or(0))
        .map(|i| *strings.add(i))
        .filter(|s| !s.is_null())
        .map(|s| CStr::from_ptr(s).to_bytes())
        .collect();
    let key = shader_cache_key(sources);

    let cached = backend
        .shader_cache
        .as_deref()
        .map(|cache| shader_cache_path(cache, &key))
        .and_then(|path| std::fs::read(&path).ok());

    match cached {
        Some(program) => {
            debug!("shader {key}: loading cached binary ({} bytes)", program.len());
            let Ok(length) = GLsizei::try_from(program.len()) else {
                warn!("shader {key}: cached binary too large");
                return;
            };
            let upload: ShaderBinary = std::mem::transmute(binary);
            upload(1, &shader, 0, program.as_ptr().cast(), length);
        }
        None => {
            debug!("shader {key}: compiling from source");
            let forward: ShaderSource = std::mem::transmute(source);
            let compile: CompileShader = std::mem::transmute(compile);
            forward(shader, count, strings, lengths);
            compile(shader);
        }
    }
}

extern "C" fn draw_buffers(_count: GLsizei, _buffers: *const GLenum) {
    debug!("glDrawBuffers ignored");
}

extern "C" fn compressed_tex_sub_image_2d() {
    debug!("glCompressedTexSubImage2D ignored");
}

/// Address `SDL_GL_GetProcAddress` answers for `name` ahead of the host, if overridden.
#[must_use]
pub fn proc_override(name: &str) -> Option<usize> {
    match name {
        "glPixelStorei" | "glGetError" => Some(stubs::ret0 as usize),
        "glGetProgramiv" => Some(get_programiv as usize),
        "glDrawBuffers" => Some(draw_buffers as usize),
        "glCompressedTexSubImage2D" => Some(compressed_tex_sub_image_2d as usize),
        _ => None,
    }
}

unsafe extern "C" fn get_proc_address(symbol: *const c_char) -> *mut c_void {
    if symbol.is_null() {
        return std::ptr::null_mut();
    }
    let name = CStr::from_ptr(symbol).to_string_lossy();
    trace!("looking up GL symbol {name}");
    if let Some(address) = proc_override(&name) {
        return address as *mut c_void;
    }

    let address = match backend().and_then(|b| b.get_proc_address) {
        Some(host) => {
            let host: GetProcAddress = std::mem::transmute(host);
            host(symbol)
        }
        None => std::ptr::null_mut(),
    };
    if address.is_null() {
        debug!("GL symbol {name} unavailable");
    }
    address
}
