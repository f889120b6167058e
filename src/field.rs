//! 2D grid fields for the fluid solver.
//!
//! Every simulated quantity lives on the same uniform grid. Cells are stored
//! row-major with row 0 at the top, matching image rows, and the grid spacing
//! is one cell. The domain is periodic: neighbor lookups and bilinear samples
//! wrap around the edges.
//!
//! # Field Types
//!
//! - **Scalar fields** (`f32` per cell): density, pressure, divergence, vorticity
//! - **Vector fields** (`Vec2` per cell): velocity

use std::collections::TryReserveError;
use std::ops::{Add, Mul, Sub};

use glam::Vec2;

use crate::error::FluidError;

/// Type of data stored at each cell.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum FieldFormat {
    /// One `f32` per cell.
    #[default]
    Scalar,
    /// One `vec2<f32>` per cell.
    Vector,
}

impl FieldFormat {
    /// Number of f32 components per cell.
    pub fn components(&self) -> u32 {
        match self {
            FieldFormat::Scalar => 1,
            FieldFormat::Vector => 2,
        }
    }

    /// Whether this is a vector field.
    pub fn is_vector(&self) -> bool {
        matches!(self, FieldFormat::Vector)
    }
}

/// Which simulated field to visualize.
///
/// Selecting a field never changes how the simulation evolves.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum FieldKind {
    /// The advected ink.
    #[default]
    Density,
    /// Solved pressure.
    Pressure,
    /// Velocity, rendered with direction as hue.
    Velocity,
    /// Curl of velocity, rendered with rotation sense as hue.
    Vorticity,
}

impl FieldKind {
    /// All selectable fields, in display order.
    pub const ALL: [FieldKind; 4] = [
        FieldKind::Density,
        FieldKind::Pressure,
        FieldKind::Velocity,
        FieldKind::Vorticity,
    ];

    /// Whether this field uses the direction/magnitude color rule.
    pub fn is_vector_like(&self) -> bool {
        matches!(self, FieldKind::Velocity | FieldKind::Vorticity)
    }

    /// Lowercase name, used in labels and file names.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Density => "density",
            FieldKind::Pressure => "pressure",
            FieldKind::Velocity => "velocity",
            FieldKind::Vorticity => "vorticity",
        }
    }
}

/// Grid resolution in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    /// Create a grid size, rejecting a zero dimension.
    pub fn new(width: u32, height: u32) -> Result<Self, FluidError> {
        if width == 0 || height == 0 {
            return Err(FluidError::InvalidGrid { width, height });
        }
        Ok(Self { width, height })
    }

    /// Total number of cells.
    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of one cell in normalized [0, 1] coordinates.
    pub fn texel_size(&self) -> Vec2 {
        Vec2::new(1.0 / self.width as f32, 1.0 / self.height as f32)
    }

    /// Memory size in bytes of one buffer holding `format` cells.
    pub fn byte_size(&self, format: FieldFormat) -> u64 {
        self.cells() as u64 * 4 * format.components() as u64
    }

    /// Linear index of a cell, wrapping out-of-range coordinates.
    #[inline]
    pub fn wrap_index(&self, x: i32, y: i32) -> usize {
        let x = x.rem_euclid(self.width as i32) as usize;
        let y = y.rem_euclid(self.height as i32) as usize;
        x + y * self.width as usize
    }
}

/// Values a [`Grid`] can hold and interpolate.
pub trait FieldValue:
    Copy + Default + PartialEq + Add<Output = Self> + Sub<Output = Self> + Mul<f32, Output = Self> + Send + Sync + 'static
{
    /// Format tag matching this value type.
    const FORMAT: FieldFormat;
}

impl FieldValue for f32 {
    const FORMAT: FieldFormat = FieldFormat::Scalar;
}

impl FieldValue for Vec2 {
    const FORMAT: FieldFormat = FieldFormat::Vector;
}

/// Host-side storage for one field buffer.
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    size: GridSize,
    data: Vec<T>,
}

impl<T: FieldValue> Grid<T> {
    /// Allocate a zero-filled grid.
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            data: vec![T::default(); size.cells()],
        }
    }

    /// Allocate a zero-filled grid, reporting allocation failure instead of aborting.
    pub fn try_new(size: GridSize) -> Result<Self, TryReserveError> {
        let mut data = Vec::new();
        data.try_reserve_exact(size.cells())?;
        data.resize(size.cells(), T::default());
        Ok(Self { size, data })
    }

    /// Build a grid from existing cell values.
    ///
    /// Returns `None` if `data` does not hold exactly one value per cell.
    pub fn from_vec(size: GridSize, data: Vec<T>) -> Option<Self> {
        (data.len() == size.cells()).then_some(Self { size, data })
    }

    pub fn size(&self) -> GridSize {
        self.size
    }

    pub fn width(&self) -> u32 {
        self.size.width
    }

    pub fn height(&self) -> u32 {
        self.size.height
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Cell value with periodic wrapping.
    #[inline]
    pub fn get(&self, x: i32, y: i32) -> T {
        self.data[self.size.wrap_index(x, y)]
    }

    /// Overwrite one cell (wrapping).
    #[inline]
    pub fn set(&mut self, x: i32, y: i32, value: T) {
        let idx = self.size.wrap_index(x, y);
        self.data[idx] = value;
    }

    /// Set every cell to `value`.
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Bilinear sample at a non grid-aligned position, in cell units.
    ///
    /// Positions anywhere on the plane wrap onto the periodic grid.
    pub fn sample(&self, pos: Vec2) -> T {
        // Wrap in float space so far-away positions never overflow the cell index.
        let pos = Vec2::new(
            pos.x.rem_euclid(self.size.width as f32),
            pos.y.rem_euclid(self.size.height as f32),
        );
        let base = pos.floor();
        let f = pos - base;
        let x0 = base.x as i32;
        let y0 = base.y as i32;

        let a = self.get(x0, y0);
        let b = self.get(x0 + 1, y0);
        let c = self.get(x0, y0 + 1);
        let d = self.get(x0 + 1, y0 + 1);

        let top = lerp(a, b, f.x);
        let bottom = lerp(c, d, f.x);
        lerp(top, bottom, f.y)
    }
}

impl Grid<f32> {
    /// Root-mean-square of all cell values.
    pub fn rms(&self) -> f32 {
        let sum: f64 = self.data.iter().map(|v| (*v as f64) * (*v as f64)).sum();
        (sum / self.data.len() as f64).sqrt() as f32
    }

    /// Largest absolute cell value.
    pub fn max_abs(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.abs()))
    }
}

impl Grid<Vec2> {
    /// Largest vector length over all cells.
    pub fn max_length(&self) -> f32 {
        self.data.iter().fold(0.0f32, |m, v| m.max(v.length()))
    }
}

/// Same formula as WGSL `mix`, so both backends interpolate identically.
#[inline]
fn lerp<T: FieldValue>(a: T, b: T, t: f32) -> T {
    a * (1.0 - t) + b * t
}
