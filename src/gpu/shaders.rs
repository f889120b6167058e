//! WGSL sources for the fluid passes.
//!
//! Every pass shader is [`PRELUDE`] followed by a pass body. The prelude
//! declares the `Params` uniform at binding 0 (layout of
//! [`FrameParameters`](crate::uniforms::FrameParameters)), periodic cell
//! indexing and the pointer falloff. Bodies bind their inputs at 1..n and
//! their output last. All kernels run one invocation per cell in 16x16
//! workgroups and share entry point `main`.

/// Workgroup edge length used by every fluid kernel.
pub const WORKGROUP_SIZE: u32 = 16;

pub const PRELUDE: &str = r#"
struct Params {
    pointers: array<vec4<f32>, 5>,
    texel_size: vec2<f32>,
    grid_size: vec2<u32>,
    impulse_strength: f32,
    ink_radius: f32,
    ink_amount: f32,
    pointer_count: u32,
    time_step: f32,
    vorticity: f32,
    velocity_dissipation: f32,
    density_dissipation: f32,
};

@group(0) @binding(0)
var<uniform> params: Params;

const MAX_POINTERS: u32 = 5u;
const FALLOFF_CUTOFF: f32 = 3.0;

// Periodic row-major index.
fn cell_index(x: i32, y: i32) -> u32 {
    let w = i32(params.grid_size.x);
    let h = i32(params.grid_size.y);
    let wx = ((x % w) + w) % w;
    let wy = ((y % h) + h) % h;
    return u32(wy * w + wx);
}

// Wrap a position onto the periodic grid in float space, so far-away
// backtraces never overflow the integer cell index.
fn wrap_position(pos: vec2<f32>) -> vec2<f32> {
    let size = vec2<f32>(params.grid_size);
    let wrapped = pos - floor(pos / size) * size;
    return clamp(wrapped, vec2<f32>(0.0), size);
}

fn in_grid(id: vec3<u32>) -> bool {
    return id.x < params.grid_size.x && id.y < params.grid_size.y;
}

fn falloff(cell: vec2<f32>, center: vec2<f32>, radius: f32) -> f32 {
    let d = cell - center;
    let d2 = dot(d, d);
    let r2 = radius * radius;
    if d2 > FALLOFF_CUTOFF * FALLOFF_CUTOFF * r2 {
        return 0.0;
    }
    return exp(-d2 / r2);
}
"#;

pub const ADVECT_VECTOR: &str = r#"
@group(0) @binding(1)
var<storage, read> velocity: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read> src: array<vec2<f32>>;

@group(0) @binding(3)
var<storage, read_write> dst: array<vec2<f32>>;

fn sample_src(pos: vec2<f32>) -> vec2<f32> {
    let p = wrap_position(pos);
    let base = floor(p);
    let f = p - base;
    let x0 = i32(base.x);
    let y0 = i32(base.y);
    let top = mix(src[cell_index(x0, y0)], src[cell_index(x0 + 1, y0)], f.x);
    let bottom = mix(src[cell_index(x0, y0 + 1)], src[cell_index(x0 + 1, y0 + 1)], f.x);
    return mix(top, bottom, f.y);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let i = cell_index(i32(id.x), i32(id.y));
    let pos = vec2<f32>(f32(id.x), f32(id.y)) - velocity[i] * params.time_step;
    dst[i] = sample_src(pos) * params.velocity_dissipation;
}
"#;

pub const ADVECT_SCALAR: &str = r#"
@group(0) @binding(1)
var<storage, read> velocity: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read> src: array<f32>;

@group(0) @binding(3)
var<storage, read_write> dst: array<f32>;

fn sample_src(pos: vec2<f32>) -> f32 {
    let p = wrap_position(pos);
    let base = floor(p);
    let f = p - base;
    let x0 = i32(base.x);
    let y0 = i32(base.y);
    let top = mix(src[cell_index(x0, y0)], src[cell_index(x0 + 1, y0)], f.x);
    let bottom = mix(src[cell_index(x0, y0 + 1)], src[cell_index(x0 + 1, y0 + 1)], f.x);
    return mix(top, bottom, f.y);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let i = cell_index(i32(id.x), i32(id.y));
    let pos = vec2<f32>(f32(id.x), f32(id.y)) - velocity[i] * params.time_step;
    dst[i] = sample_src(pos) * params.density_dissipation;
}
"#;

pub const SPLAT_VECTOR: &str = r#"
@group(0) @binding(1)
var<storage, read> src: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read_write> dst: array<vec2<f32>>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let i = cell_index(i32(id.x), i32(id.y));
    let cell = vec2<f32>(f32(id.x), f32(id.y));

    var force = vec2<f32>(0.0, 0.0);
    let count = min(params.pointer_count, MAX_POINTERS);
    for (var p = 0u; p < count; p++) {
        let pointer = params.pointers[p];
        force += pointer.zw * falloff(cell, pointer.xy, params.ink_radius);
    }
    dst[i] = src[i] + force * params.impulse_strength;
}
"#;

pub const SPLAT_SCALAR: &str = r#"
@group(0) @binding(1)
var<storage, read> src: array<f32>;

@group(0) @binding(2)
var<storage, read_write> dst: array<f32>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let i = cell_index(i32(id.x), i32(id.y));
    let cell = vec2<f32>(f32(id.x), f32(id.y));

    var weight = 0.0;
    let count = min(params.pointer_count, MAX_POINTERS);
    for (var p = 0u; p < count; p++) {
        weight += falloff(cell, params.pointers[p].xy, params.ink_radius);
    }
    dst[i] = src[i] + weight * params.ink_amount;
}
"#;

pub const VORTICITY: &str = r#"
@group(0) @binding(1)
var<storage, read> velocity: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read_write> dst: array<f32>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let x = i32(id.x);
    let y = i32(id.y);
    let left = velocity[cell_index(x - 1, y)];
    let right = velocity[cell_index(x + 1, y)];
    let up = velocity[cell_index(x, y - 1)];
    let down = velocity[cell_index(x, y + 1)];
    dst[cell_index(x, y)] = 0.5 * ((right.y - left.y) - (down.x - up.x));
}
"#;

pub const CONFINEMENT: &str = r#"
@group(0) @binding(1)
var<storage, read> velocity: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read> curl: array<f32>;

@group(0) @binding(3)
var<storage, read_write> dst: array<vec2<f32>>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let x = i32(id.x);
    let y = i32(id.y);
    let left = abs(curl[cell_index(x - 1, y)]);
    let right = abs(curl[cell_index(x + 1, y)]);
    let up = abs(curl[cell_index(x, y - 1)]);
    let down = abs(curl[cell_index(x, y + 1)]);

    let eta = vec2<f32>(right - left, down - up) * 0.5;
    let n = eta / (length(eta) + 1e-5);
    let i = cell_index(x, y);
    let w = curl[i];
    let force = vec2<f32>(n.y * w, -n.x * w) * params.vorticity;
    dst[i] = velocity[i] + force * params.time_step;
}
"#;

pub const DIVERGENCE: &str = r#"
@group(0) @binding(1)
var<storage, read> velocity: array<vec2<f32>>;

@group(0) @binding(2)
var<storage, read_write> dst: array<f32>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let x = i32(id.x);
    let y = i32(id.y);
    let left = velocity[cell_index(x - 1, y)];
    let right = velocity[cell_index(x + 1, y)];
    let up = velocity[cell_index(x, y - 1)];
    let down = velocity[cell_index(x, y + 1)];
    dst[cell_index(x, y)] = 0.5 * ((right.x - left.x) + (down.y - up.y));
}
"#;

pub const JACOBI: &str = r#"
@group(0) @binding(1)
var<storage, read> pressure: array<f32>;

@group(0) @binding(2)
var<storage, read> divergence: array<f32>;

@group(0) @binding(3)
var<storage, read_write> dst: array<f32>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let x = i32(id.x);
    let y = i32(id.y);
    let sum = pressure[cell_index(x - 1, y)]
        + pressure[cell_index(x + 1, y)]
        + pressure[cell_index(x, y - 1)]
        + pressure[cell_index(x, y + 1)];
    let i = cell_index(x, y);
    dst[i] = (sum - divergence[i]) * 0.25;
}
"#;

pub const SUBTRACT_GRADIENT: &str = r#"
@group(0) @binding(1)
var<storage, read> pressure: array<f32>;

@group(0) @binding(2)
var<storage, read> velocity: array<vec2<f32>>;

@group(0) @binding(3)
var<storage, read_write> dst: array<vec2<f32>>;

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if !in_grid(id) {
        return;
    }
    let x = i32(id.x);
    let y = i32(id.y);
    let left = pressure[cell_index(x - 1, y)];
    let right = pressure[cell_index(x + 1, y)];
    let up = pressure[cell_index(x, y - 1)];
    let down = pressure[cell_index(x, y + 1)];
    let i = cell_index(x, y);
    dst[i] = velocity[i] - vec2<f32>(right - left, down - up) * 0.5;
}
"#;

/// Field to RGBA8 conversion. Standalone: does not use [`PRELUDE`].
///
/// Fields are bound as flat `f32` arrays, so one pipeline reads both
/// formats. `mode`: 0 = scalar, 1 = vector, 2 = scalar drawn as the vector
/// `(w, 0)`, 3 = vector drawn by magnitude.
pub const VISUALIZE: &str = r#"
struct VisualParams {
    background: vec4<f32>,
    positive: vec4<f32>,
    negative: vec4<f32>,
    grid_size: vec2<u32>,
    scale: f32,
    mode: u32,
};

@group(0) @binding(0)
var<uniform> visual: VisualParams;

@group(0) @binding(1)
var<storage, read> values: array<f32>;

@group(0) @binding(2)
var<storage, read_write> pixels: array<u32>;

const TAU: f32 = 6.283185307179586;

fn hue_to_rgb(hue: f32) -> vec3<f32> {
    let k = (vec3<f32>(5.0, 3.0, 1.0) + hue * 6.0) % 6.0;
    return 1.0 - clamp(min(k, 4.0 - k), vec3<f32>(0.0), vec3<f32>(1.0));
}

fn scalar_color(v: f32) -> vec4<f32> {
    let s = clamp(v * visual.scale, -1.0, 1.0);
    let ink = select(visual.negative, visual.positive, s >= 0.0);
    return mix(visual.background, ink, abs(s));
}

fn vector_color(v: vec2<f32>) -> vec4<f32> {
    let t = clamp(length(v) * visual.scale, 0.0, 1.0);
    // atan2(0, 0) is undefined in WGSL.
    if t == 0.0 {
        return visual.background;
    }
    let hue = atan2(v.y, v.x) / TAU + 0.5;
    return mix(visual.background, vec4<f32>(hue_to_rgb(hue), 1.0), t);
}

@compute @workgroup_size(16, 16)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    if id.x >= visual.grid_size.x || id.y >= visual.grid_size.y {
        return;
    }
    let i = id.y * visual.grid_size.x + id.x;

    var color: vec4<f32>;
    switch visual.mode {
        case 1u: {
            color = vector_color(vec2<f32>(values[2u * i], values[2u * i + 1u]));
        }
        case 2u: {
            color = vector_color(vec2<f32>(values[i], 0.0));
        }
        case 3u: {
            color = scalar_color(length(vec2<f32>(values[2u * i], values[2u * i + 1u])));
        }
        default: {
            color = scalar_color(values[i]);
        }
    }
    pixels[i] = pack4x8unorm(color);
}
"#;

/// Full source of a pass shader.
pub fn compose(body: &str) -> String {
    format!("{}{}", PRELUDE, body)
}

/// Every complete shader module the GPU backend compiles, by label.
pub fn all_sources() -> Vec<(&'static str, String)> {
    vec![
        ("advect_vector", compose(ADVECT_VECTOR)),
        ("advect_scalar", compose(ADVECT_SCALAR)),
        ("apply_force_vector", compose(SPLAT_VECTOR)),
        ("apply_force_scalar", compose(SPLAT_SCALAR)),
        ("compute_vorticity", compose(VORTICITY)),
        ("vorticity_confinement", compose(CONFINEMENT)),
        ("compute_divergence", compose(DIVERGENCE)),
        ("compute_pressure", compose(JACOBI)),
        ("subtract_gradient", compose(SUBTRACT_GRADIENT)),
        ("visualize", VISUALIZE.to_string()),
    ]
}
