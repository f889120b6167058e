//! Simulation tunables.
//!
//! # Example
//!
//! ```ignore
//! let config = FluidConfig::new()
//!     .with_resolution_scale(4.0)
//!     .with_pressure_iterations(20)
//!     .with_vorticity(1.5);
//! ```

use crate::error::FluidError;
use crate::field::GridSize;
use crate::visuals::VisualStyle;

/// Configuration for a [`FluidSimulation`](crate::FluidSimulation).
///
/// Builder methods store values as given; [`FluidConfig::validate`] (called
/// by the simulation constructor) rejects degenerate ones.
#[derive(Clone, Debug, PartialEq)]
pub struct FluidConfig {
    /// Viewport pixels per grid cell along each axis.
    pub resolution_scale: f32,
    /// Jacobi iterations per frame.
    pub pressure_iterations: u32,
    /// Multiplier on pointer deltas when injected as velocity.
    pub impulse_strength: f32,
    /// Falloff radius of pointer injection, in cells.
    pub ink_radius: f32,
    /// Density added at a pointer's center per frame.
    pub ink_amount: f32,
    /// Vorticity confinement coefficient. 0 disables confinement.
    pub vorticity: f32,
    /// Seconds per timestep.
    pub time_step: f32,
    /// Per-frame multiplier on advected velocity.
    pub velocity_dissipation: f32,
    /// Per-frame multiplier on advected density.
    pub density_dissipation: f32,
    /// Frames allowed in flight (parameter ring slots).
    pub ring_depth: usize,
    pub style: VisualStyle,
}

impl FluidConfig {
    pub fn new() -> Self {
        Self {
            resolution_scale: 1.0,
            pressure_iterations: 40,
            impulse_strength: 60.0,
            ink_radius: 8.0,
            ink_amount: 1.0,
            vorticity: 2.0,
            time_step: 1.0 / 60.0,
            velocity_dissipation: 1.0,
            density_dissipation: 0.995,
            ring_depth: 3,
            style: VisualStyle::default(),
        }
    }

    /// Set how many viewport pixels map to one cell.
    ///
    /// A scale of 4 on a 1024x768 viewport gives a 256x192 grid.
    pub fn with_resolution_scale(mut self, scale: f32) -> Self {
        self.resolution_scale = scale;
        self
    }

    /// Set the Jacobi iteration count. More iterations leave less divergence.
    pub fn with_pressure_iterations(mut self, iterations: u32) -> Self {
        self.pressure_iterations = iterations;
        self
    }

    pub fn with_impulse_strength(mut self, strength: f32) -> Self {
        self.impulse_strength = strength;
        self
    }

    pub fn with_ink_radius(mut self, radius: f32) -> Self {
        self.ink_radius = radius;
        self
    }

    pub fn with_ink_amount(mut self, amount: f32) -> Self {
        self.ink_amount = amount;
        self
    }

    pub fn with_vorticity(mut self, vorticity: f32) -> Self {
        self.vorticity = vorticity;
        self
    }

    pub fn with_time_step(mut self, time_step: f32) -> Self {
        self.time_step = time_step;
        self
    }

    /// Set the velocity and density dissipation factors (0.0-1.0).
    pub fn with_dissipation(mut self, velocity: f32, density: f32) -> Self {
        self.velocity_dissipation = velocity;
        self.density_dissipation = density;
        self
    }

    /// Set the number of frames that may be in flight at once.
    pub fn with_ring_depth(mut self, depth: usize) -> Self {
        self.ring_depth = depth;
        self
    }

    pub fn with_style(mut self, style: VisualStyle) -> Self {
        self.style = style;
        self
    }

    /// Check every tunable for a usable value.
    pub fn validate(&self) -> Result<(), FluidError> {
        if self.ring_depth == 0 {
            return Err(FluidError::InvalidRingDepth(self.ring_depth));
        }

        let positive = [
            ("resolution_scale", self.resolution_scale),
            ("time_step", self.time_step),
            ("ink_radius", self.ink_radius),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(FluidError::InvalidConfig(format!("{} must be positive and finite, got {}", name, value)));
            }
        }

        let non_negative = [
            ("impulse_strength", self.impulse_strength),
            ("ink_amount", self.ink_amount),
            ("vorticity", self.vorticity),
        ];
        for (name, value) in non_negative {
            if !(value.is_finite() && value >= 0.0) {
                return Err(FluidError::InvalidConfig(format!("{} must be non-negative and finite, got {}", name, value)));
            }
        }

        for (name, value) in [
            ("velocity_dissipation", self.velocity_dissipation),
            ("density_dissipation", self.density_dissipation),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(FluidError::InvalidConfig(format!("{} must be within 0.0-1.0, got {}", name, value)));
            }
        }

        Ok(())
    }

    /// Grid size for a viewport of `width` x `height` pixels.
    ///
    /// Each side is `ceil(pixels / resolution_scale)`; a zero-sized viewport
    /// is an [`FluidError::InvalidGrid`].
    pub fn grid_size_for(&self, width: u32, height: u32) -> Result<GridSize, FluidError> {
        if width == 0 || height == 0 {
            return Err(FluidError::InvalidGrid { width, height });
        }
        let cells = |pixels: u32| ((pixels as f32 / self.resolution_scale).ceil() as u32).max(1);
        GridSize::new(cells(width), cells(height))
    }
}

impl Default for FluidConfig {
    fn default() -> Self {
        Self::new()
    }
}
