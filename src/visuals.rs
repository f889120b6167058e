//! Field visualization.
//!
//! Maps a field's front buffer to an RGBA image at grid resolution. Two color
//! rules exist:
//!
//! - **Scalar-like** (density, pressure): the value is scaled and clamped to
//!   `[-1, 1]`, then mixes the background toward the positive or negative
//!   ink color by its magnitude.
//! - **Vector-like** (velocity, vorticity): direction picks a hue, magnitude
//!   mixes the background toward that hue. Vorticity is drawn as the vector
//!   `(w, 0)`, so clockwise and counter-clockwise rotation get opposite hues.
//!
//! A zero field renders as a uniform background in both rules.

use glam::{Vec2, Vec3, Vec4};

use crate::field::{FieldKind, FieldValue, Grid};

/// Rendered output of one tick.
pub type Image = image::RgbaImage;

/// Colors and scales used to draw fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisualStyle {
    /// Color of an empty field (RGBA, 0.0-1.0).
    pub background: Vec4,
    /// Ink color for positive scalar values.
    pub positive: Vec4,
    /// Ink color for negative scalar values.
    pub negative: Vec4,
    /// Density value that renders at full ink.
    pub density_scale: f32,
    pub pressure_scale: f32,
    /// Speed (cells/s) mapped to full brightness is `1 / velocity_scale`.
    pub velocity_scale: f32,
    pub vorticity_scale: f32,
}

impl Default for VisualStyle {
    fn default() -> Self {
        Self {
            background: Vec4::new(0.02, 0.02, 0.04, 1.0),
            positive: Vec4::new(0.95, 0.55, 0.15, 1.0),
            negative: Vec4::new(0.15, 0.45, 0.95, 1.0),
            density_scale: 1.0,
            pressure_scale: 0.05,
            velocity_scale: 0.01,
            vorticity_scale: 0.1,
        }
    }
}

impl VisualStyle {
    /// Multiplier applied to raw values of `kind` before clamping.
    pub fn scale_for(&self, kind: FieldKind) -> f32 {
        match kind {
            FieldKind::Density => self.density_scale,
            FieldKind::Pressure => self.pressure_scale,
            FieldKind::Velocity => self.velocity_scale,
            FieldKind::Vorticity => self.vorticity_scale,
        }
    }
}

/// Fully saturated color for a hue in `[0, 1]`.
pub fn hue_to_rgb(hue: f32) -> Vec3 {
    let k = (Vec3::new(5.0, 3.0, 1.0) + Vec3::splat(hue * 6.0)) % 6.0;
    Vec3::ONE - k.min(Vec3::splat(4.0) - k).clamp(Vec3::ZERO, Vec3::ONE)
}

/// Scalar-like color rule.
pub fn scalar_color(value: f32, scale: f32, style: &VisualStyle) -> Vec4 {
    let s = (value * scale).clamp(-1.0, 1.0);
    let ink = if s >= 0.0 { style.positive } else { style.negative };
    style.background.lerp(ink, s.abs())
}

/// Vector-like color rule.
pub fn vector_color(value: Vec2, scale: f32, style: &VisualStyle) -> Vec4 {
    let hue = value.y.atan2(value.x) / std::f32::consts::TAU + 0.5;
    let t = (value.length() * scale).clamp(0.0, 1.0);
    style.background.lerp(hue_to_rgb(hue).extend(1.0), t)
}

/// Same rounding as WGSL `pack4x8unorm`.
pub fn to_rgba8(color: Vec4) -> [u8; 4] {
    let c = color.clamp(Vec4::ZERO, Vec4::ONE) * 255.0 + Vec4::splat(0.5);
    [c.x as u8, c.y as u8, c.z as u8, c.w as u8]
}

fn render<T: FieldValue>(grid: &Grid<T>, color: impl Fn(T) -> Vec4) -> Image {
    Image::from_fn(grid.width(), grid.height(), |x, y| {
        image::Rgba(to_rgba8(color(grid.get(x as i32, y as i32))))
    })
}

/// Render a scalar field (density, pressure or vorticity).
pub fn render_scalar(grid: &Grid<f32>, kind: FieldKind, style: &VisualStyle) -> Image {
    let scale = style.scale_for(kind);
    if kind.is_vector_like() {
        render(grid, |v| vector_color(Vec2::new(v, 0.0), scale, style))
    } else {
        render(grid, |v| scalar_color(v, scale, style))
    }
}

/// Render a vector field (velocity).
pub fn render_vector(grid: &Grid<Vec2>, kind: FieldKind, style: &VisualStyle) -> Image {
    let scale = style.scale_for(kind);
    if kind.is_vector_like() {
        render(grid, |v| vector_color(v, scale, style))
    } else {
        render(grid, |v| scalar_color(v.length(), scale, style))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::GridSize;

    #[test]
    fn test_hue_primaries() {
        assert!((hue_to_rgb(0.0) - Vec3::new(1.0, 0.0, 0.0)).length() < 1e-5);
        assert!((hue_to_rgb(1.0 / 3.0) - Vec3::new(0.0, 1.0, 0.0)).length() < 1e-5);
        assert!((hue_to_rgb(2.0 / 3.0) - Vec3::new(0.0, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_zero_renders_background() {
        let style = VisualStyle::default();
        assert_eq!(scalar_color(0.0, 1.0, &style), style.background);
        assert_eq!(vector_color(Vec2::ZERO, 1.0, &style), style.background);
    }

    #[test]
    fn test_scalar_sign_picks_ink() {
        let style = VisualStyle::default();
        assert_eq!(to_rgba8(scalar_color(10.0, 1.0, &style)), to_rgba8(style.positive));
        assert_eq!(to_rgba8(scalar_color(-10.0, 1.0, &style)), to_rgba8(style.negative));
    }

    #[test]
    fn test_opposite_vorticity_gets_opposite_hue() {
        let style = VisualStyle::default();
        let cw = vector_color(Vec2::new(-1.0, 0.0), 1.0, &style);
        let ccw = vector_color(Vec2::new(1.0, 0.0), 1.0, &style);
        assert_ne!(to_rgba8(cw), to_rgba8(ccw));
    }

    #[test]
    fn test_to_rgba8_rounds_and_clamps() {
        assert_eq!(to_rgba8(Vec4::new(0.0, 1.0, 2.0, -1.0)), [0, 255, 255, 0]);
        assert_eq!(to_rgba8(Vec4::splat(0.5)), [128, 128, 128, 128]);
    }

    #[test]
    fn test_uninitialized_fields_render_uniform() {
        let style = VisualStyle::default();
        let size = GridSize::new(7, 3).unwrap();
        let bg = image::Rgba(to_rgba8(style.background));

        for kind in FieldKind::ALL {
            let image = if kind == FieldKind::Velocity {
                render_vector(&Grid::new(size), kind, &style)
            } else {
                render_scalar(&Grid::new(size), kind, &style)
            };
            assert_eq!(image.dimensions(), (7, 3));
            assert!(image.pixels().all(|p| *p == bg), "{:?} not uniform", kind);
        }
    }
}
