//! Double-buffered fields ("slabs") and the simulation state built from them.
//!
//! A slab owns two buffers outright and a flag naming the front one. Passes
//! read `front` and write `back`; [`Slab::swap`] flips the flag, so promoting
//! a freshly written buffer never copies data.

use crate::error::FluidError;
use crate::field::{FieldFormat, FieldKind, GridSize};

/// A front/back buffer pair for one field.
#[derive(Debug)]
pub struct Slab<T> {
    buffers: [T; 2],
    /// Index of the current front buffer (0 or 1).
    front: usize,
    size: GridSize,
    format: FieldFormat,
}

impl<T> Slab<T> {
    /// Create a slab, allocating both buffers through `alloc`.
    ///
    /// `alloc` receives the buffer index (0 or 1). A zero-sized grid is
    /// rejected before anything is allocated.
    pub fn new<F>(width: u32, height: u32, format: FieldFormat, mut alloc: F) -> Result<Self, FluidError>
    where
        F: FnMut(usize) -> Result<T, FluidError>,
    {
        let size = GridSize::new(width, height)?;
        let a = alloc(0)?;
        let b = alloc(1)?;
        Ok(Self {
            buffers: [a, b],
            front: 0,
            size,
            format,
        })
    }

    /// The current readable state.
    #[inline]
    pub fn read(&self) -> &T {
        &self.buffers[self.front]
    }

    /// The buffer the next pass writes into.
    #[inline]
    pub fn write_target(&mut self) -> &mut T {
        &mut self.buffers[1 - self.front]
    }

    /// Front for reading and back for writing, borrowed together.
    ///
    /// Used by passes whose input and output are the same field.
    pub fn split(&mut self) -> (&T, &mut T) {
        let [a, b] = &mut self.buffers;
        if self.front == 0 {
            (a, b)
        } else {
            (b, a)
        }
    }

    /// Promote the back buffer to front.
    #[inline]
    pub fn swap(&mut self) {
        self.front = 1 - self.front;
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

    pub fn format(&self) -> FieldFormat {
        self.format
    }
}

/// The five slabs advanced by one timestep.
#[derive(Debug)]
pub struct SimulationState<F> {
    pub velocity: Slab<F>,
    pub density: Slab<F>,
    pub divergence: Slab<F>,
    pub vorticity: Slab<F>,
    pub pressure: Slab<F>,
}

impl<F> SimulationState<F> {
    /// Allocate all five slabs at `size`.
    ///
    /// `alloc` is called with a buffer label, the cell format and the grid size.
    pub fn new<A>(size: GridSize, mut alloc: A) -> Result<Self, FluidError>
    where
        A: FnMut(&str, FieldFormat, GridSize) -> Result<F, FluidError>,
    {
        let mut slab = |name: &str, format: FieldFormat| {
            Slab::new(size.width, size.height, format, |i| {
                alloc(&format!("{} {}", name, if i == 0 { "A" } else { "B" }), format, size)
            })
        };

        Ok(Self {
            velocity: slab("velocity", FieldFormat::Vector)?,
            density: slab("density", FieldFormat::Scalar)?,
            divergence: slab("divergence", FieldFormat::Scalar)?,
            vorticity: slab("vorticity", FieldFormat::Scalar)?,
            pressure: slab("pressure", FieldFormat::Scalar)?,
        })
    }

    /// Grid size shared by every slab.
    pub fn size(&self) -> GridSize {
        self.velocity.size()
    }

    /// The slab a visualizer reads for `kind`.
    pub fn field(&self, kind: FieldKind) -> &Slab<F> {
        match kind {
            FieldKind::Density => &self.density,
            FieldKind::Pressure => &self.pressure,
            FieldKind::Velocity => &self.velocity,
            FieldKind::Vorticity => &self.vorticity,
        }
    }
}
