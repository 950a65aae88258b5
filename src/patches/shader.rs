//! Shader program constructor wrap.
//!
//! The target builds its programs through `ShaderProgram::ShaderProgram(const char *vertex,
//! const char *fragment)`. A handful of the sources it passes are unusable on the host
//! GLES backend; they are recognized by their address relative to the module base and
//! swapped for a working variant before the constructor runs.
//!
//! | Module offset | Matched as | Replacement |
//! |---------------|------------|-------------|
//! | `0xBF5E9` | fragment | fragment at `0xC5022` |
//! | `0xDFD3C` | fragment | fragment at `0xC5022` |
//! | `0xD2EC1` | vertex | embedded 2D pair |
//! | `0xD3CC2` | vertex or fragment | embedded flat color pair |
//! | `0xE4722` | fragment | embedded depth fragment |
//! | `0xD264F` | vertex | embedded mesh vertex |

use std::{
    ffi::{c_char, c_void, CStr},
    sync::{Arc, PoisonError, RwLock},
};

use log::info;

use crate::{
    hook::{HookManager, InlineHook, SubstitutionTable},
    module::Module,
    Result,
};

/// Mangled name of the wrapped constructor.
pub const SHADER_PROGRAM_CTOR: &str = "_ZN13ShaderProgramC2EPKcS1_";

const ES3_FRAGMENT: usize = 0xBF5E9;
const ES3_FRAGMENT_ALT: usize = 0xDFD3C;
const ES1_FRAGMENT: usize = 0xC5022;
const SPRITE_VERTEX: usize = 0xD2EC1;
const FLAT_SOURCE: usize = 0xD3CC2;
const DEPTH_FRAGMENT: usize = 0xE4722;
const MESH_VERTEX: usize = 0xD264F;

static FLAT_VERTEX: &CStr = c"
attribute vec4 a_Location;
attribute vec4 a_Color;
uniform mat4 u_Projection;
uniform mat4 u_View;
uniform mat4 u_Model;
varying vec4 var_color;
void main() {
    gl_Position = u_Projection * u_View * u_Model * a_Location;
    var_color = a_Color;
}
";

static FLAT_FRAGMENT: &CStr = c"
varying vec4 var_color;
void main() {
    gl_FragColor = var_color;
}
";

static DEPTH_ONLY_FRAGMENT: &CStr = c"
void main() {
    gl_FragDepth = gl_FragCoord.z;
}
";

static MESH_VERTEX_SOURCE: &CStr = c"
attribute vec4 a_Location;
attribute vec3 a_Normal;
attribute vec2 a_TexCoords;
uniform mat4 u_Projection;
uniform mat4 u_View;
uniform mat4 u_Model;
uniform mat4 u_DepthMVP;
varying vec3 var_normal;
varying vec3 var_worldPos;
varying vec2 var_texCoords;
varying vec4 var_shadowLoc;
void main(void) {
    var_texCoords = a_TexCoords;
    var_worldPos = vec3(u_Model * a_Location);
    var_normal = mat3(u_Model) * a_Normal;
    gl_Position = u_Projection * u_View * vec4(var_worldPos, 1.0);
    var_shadowLoc = u_DepthMVP * a_Location;
}
";

static SPRITE_VERTEX_SOURCE: &CStr = c"
attribute vec2 a_Location;
attribute vec2 a_TexCoords;
attribute vec4 a_Color;
uniform vec2 u_WH;
uniform float u_Zoom;
uniform vec2 u_CamPos;
varying vec4 var_color;
varying vec2 var_TexCoords;
void main() {
    gl_Position = vec4((a_Location - u_CamPos) / (u_WH * 0.5) * u_Zoom, 0.0, 1.0);
    var_color = a_Color;
    var_TexCoords = a_TexCoords;
}
";

static SPRITE_FRAGMENT_SOURCE: &CStr = c"
varying vec4 var_color;
varying vec2 var_TexCoords;
uniform int u_UseTexture;
uniform sampler2D u_Texture;
void main() {
    vec4 texColor = vec4(1.0, 1.0, 1.0, 1.0);
    if (u_UseTexture > 0)
        texColor = texture2D(u_Texture, var_TexCoords);
    gl_FragColor = texColor * var_color;
}
";

/// Source pointers passed to the constructor, as addresses.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ShaderSources {
    /// Vertex shader source
    pub vertex: usize,
    /// Fragment shader source
    pub fragment: usize,
}

fn embedded(source: &'static CStr) -> usize {
    source.as_ptr() as usize
}

/// Substitution rules for a module loaded at `base`.
#[must_use]
pub fn substitution_table(base: usize) -> SubstitutionTable<ShaderSources> {
    SubstitutionTable::new()
        .rule(
            "fragment 0xBF5E9 (es 3.00 -> 1.00)",
            move |s: &ShaderSources| s.fragment == base + ES3_FRAGMENT,
            move |s| s.fragment = base + ES1_FRAGMENT,
        )
        .rule(
            "fragment 0xDFD3C (es 3.00 -> 1.00)",
            move |s: &ShaderSources| s.fragment == base + ES3_FRAGMENT_ALT,
            move |s| s.fragment = base + ES1_FRAGMENT,
        )
        .rule(
            "vertex 0xD2EC1 (sprite pair)",
            move |s: &ShaderSources| s.vertex == base + SPRITE_VERTEX,
            |s| {
                s.vertex = embedded(SPRITE_VERTEX_SOURCE);
                s.fragment = embedded(SPRITE_FRAGMENT_SOURCE);
            },
        )
        .rule(
            "source 0xD3CC2 (flat color pair)",
            move |s: &ShaderSources| s.vertex == base + FLAT_SOURCE || s.fragment == base + FLAT_SOURCE,
            |s| {
                s.vertex = embedded(FLAT_VERTEX);
                s.fragment = embedded(FLAT_FRAGMENT);
            },
        )
        .rule(
            "fragment 0xE4722 (depth)",
            move |s: &ShaderSources| s.fragment == base + DEPTH_FRAGMENT,
            |s| s.fragment = embedded(DEPTH_ONLY_FRAGMENT),
        )
        .rule(
            "vertex 0xD264F (mesh)",
            move |s: &ShaderSources| s.vertex == base + MESH_VERTEX,
            |s| s.vertex = embedded(MESH_VERTEX_SOURCE),
        )
}

struct ShaderPatch {
    hook: Arc<InlineHook>,
    rules: SubstitutionTable<ShaderSources>,
}

// The replacement is a plain function the guest calls, so the patch it applies is process
// state. One target module per process: installing again replaces the active patch.
static ACTIVE: RwLock<Option<ShaderPatch>> = RwLock::new(None);

type ShaderProgramCtor = unsafe extern "C" fn(*mut c_void, *const c_char, *const c_char) -> *mut c_void;

unsafe extern "C" fn shader_program(
    this: *mut c_void,
    vertex: *const c_char,
    fragment: *const c_char,
) -> *mut c_void {
    let active = ACTIVE.read().unwrap_or_else(PoisonError::into_inner);
    let Some(patch) = active.as_ref() else {
        return this;
    };

    let mut sources = ShaderSources {
        vertex: vertex as usize,
        fragment: fragment as usize,
    };
    patch.rules.apply(&mut sources);

    let result = patch.hook.call_original(|entry| {
        let ctor: ShaderProgramCtor = std::mem::transmute(entry);
        ctor(this, sources.vertex as *const c_char, sources.fragment as *const c_char)
    });
    match result {
        Ok(object) => object,
        Err(error) => {
            log::error!("{SHADER_PROGRAM_CTOR}: {error}");
            this
        }
    }
}

/// Wraps the shader program constructor of `module`, `None` if it has none.
///
/// # Safety
///
/// `module` must be the target module, relocated and not yet running.
///
/// # Errors
///
/// Returns the hook installation error.
pub unsafe fn install<M: Module + ?Sized>(
    hooks: &HookManager,
    module: &M,
) -> Result<Option<Arc<InlineHook>>> {
    let Some(hook) = hooks.install_symbol(module, SHADER_PROGRAM_CTOR, shader_program as usize)? else {
        return Ok(None);
    };

    let rules = substitution_table(module.base_address());
    info!("{}: {} shader substitutions armed", module.name(), rules.len());
    *ACTIVE.write().unwrap_or_else(PoisonError::into_inner) = Some(ShaderPatch {
        hook: Arc::clone(&hook),
        rules,
    });
    Ok(Some(hook))
}
