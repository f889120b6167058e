//! Host implementations of the eight compute passes.
//!
//! Each function reads its inputs and writes every cell of `dst`; none of
//! them reads `dst`. They mirror the WGSL kernels in `gpu::shaders` formula
//! for formula, with the same periodic boundary and central-difference
//! stencils (grid spacing h = 1).

use glam::Vec2;

use crate::field::{FieldValue, Grid};
use crate::uniforms::FrameParameters;

/// Pointer influence is exactly zero beyond this many radii.
pub const FALLOFF_CUTOFF: f32 = 3.0;

/// Guards the normalization of the vorticity gradient.
const CONFINEMENT_EPSILON: f32 = 1e-5;

/// Gaussian weight of a pointer at `center` on `cell`, truncated at
/// [`FALLOFF_CUTOFF`] radii.
#[inline]
pub fn falloff(cell: Vec2, center: Vec2, radius: f32) -> f32 {
    let d2 = (cell - center).length_squared();
    let r2 = radius * radius;
    if d2 > FALLOFF_CUTOFF * FALLOFF_CUTOFF * r2 {
        return 0.0;
    }
    (-d2 / r2).exp()
}

fn for_each_cell<T: FieldValue>(dst: &mut Grid<T>, mut f: impl FnMut(i32, i32) -> T) {
    let width = dst.width() as usize;
    for (idx, out) in dst.as_mut_slice().iter_mut().enumerate() {
        *out = f((idx % width) as i32, (idx / width) as i32);
    }
}

/// Semi-Lagrangian advection of `src` by `velocity`.
///
/// Each cell traces back along the velocity and takes the bilinear sample of
/// `src` found there, scaled by `dissipation`.
pub fn advect<T: FieldValue>(
    velocity: &Grid<Vec2>,
    src: &Grid<T>,
    dst: &mut Grid<T>,
    time_step: f32,
    dissipation: f32,
) {
    for_each_cell(dst, |x, y| {
        let pos = Vec2::new(x as f32, y as f32) - velocity.get(x, y) * time_step;
        src.sample(pos) * dissipation
    });
}

/// Add falloff-weighted pointer impulses to a velocity field.
pub fn apply_force_vector(src: &Grid<Vec2>, dst: &mut Grid<Vec2>, params: &FrameParameters) {
    for_each_cell(dst, |x, y| {
        let cell = Vec2::new(x as f32, y as f32);
        let force = params
            .active_pointers()
            .fold(Vec2::ZERO, |acc, (pos, impulse)| {
                acc + impulse * falloff(cell, pos, params.ink_radius)
            });
        src.get(x, y) + force * params.impulse_strength
    });
}

/// Add falloff-weighted ink to a scalar field.
pub fn apply_force_scalar(src: &Grid<f32>, dst: &mut Grid<f32>, params: &FrameParameters) {
    for_each_cell(dst, |x, y| {
        let cell = Vec2::new(x as f32, y as f32);
        let weight: f32 = params
            .active_pointers()
            .map(|(pos, _)| falloff(cell, pos, params.ink_radius))
            .sum();
        src.get(x, y) + weight * params.ink_amount
    });
}

/// Discrete curl `dv/dx - du/dy`.
pub fn compute_vorticity(velocity: &Grid<Vec2>, dst: &mut Grid<f32>) {
    for_each_cell(dst, |x, y| {
        let left = velocity.get(x - 1, y);
        let right = velocity.get(x + 1, y);
        let up = velocity.get(x, y - 1);
        let down = velocity.get(x, y + 1);
        0.5 * ((right.y - left.y) - (down.x - up.x))
    });
}

/// Vorticity confinement (Fedkiw, Stam & Jensen 2001).
///
/// `N = grad|w| / |grad|w||`, force `= epsilon * (N.y * w, -N.x * w)`,
/// integrated over one timestep.
pub fn vorticity_confinement(
    velocity: &Grid<Vec2>,
    vorticity: &Grid<f32>,
    dst: &mut Grid<Vec2>,
    time_step: f32,
    epsilon: f32,
) {
    for_each_cell(dst, |x, y| {
        let left = vorticity.get(x - 1, y).abs();
        let right = vorticity.get(x + 1, y).abs();
        let up = vorticity.get(x, y - 1).abs();
        let down = vorticity.get(x, y + 1).abs();

        let eta = Vec2::new(right - left, down - up) * 0.5;
        let n = eta / (eta.length() + CONFINEMENT_EPSILON);
        let w = vorticity.get(x, y);
        let force = Vec2::new(n.y * w, -n.x * w) * epsilon;
        velocity.get(x, y) + force * time_step
    });
}

/// Central-difference divergence.
pub fn compute_divergence(velocity: &Grid<Vec2>, dst: &mut Grid<f32>) {
    for_each_cell(dst, |x, y| {
        let left = velocity.get(x - 1, y);
        let right = velocity.get(x + 1, y);
        let up = velocity.get(x, y - 1);
        let down = velocity.get(x, y + 1);
        0.5 * ((right.x - left.x) + (down.y - up.y))
    });
}

/// One Jacobi step for `laplacian(p) = divergence`.
pub fn compute_pressure(pressure: &Grid<f32>, divergence: &Grid<f32>, dst: &mut Grid<f32>) {
    for_each_cell(dst, |x, y| {
        let sum = pressure.get(x - 1, y)
            + pressure.get(x + 1, y)
            + pressure.get(x, y - 1)
            + pressure.get(x, y + 1);
        (sum - divergence.get(x, y)) * 0.25
    });
}

/// Projection: subtract the pressure gradient from velocity.
pub fn subtract_gradient(pressure: &Grid<f32>, velocity: &Grid<Vec2>, dst: &mut Grid<Vec2>) {
    for_each_cell(dst, |x, y| {
        let left = pressure.get(x - 1, y);
        let right = pressure.get(x + 1, y);
        let up = pressure.get(x, y - 1);
        let down = pressure.get(x, y + 1);
        velocity.get(x, y) - Vec2::new(right - left, down - up) * 0.5
    });
}
