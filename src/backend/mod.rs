//! Execution backends.
//!
//! A backend owns the storage behind every slab buffer and executes passes
//! asynchronously with respect to the orchestrator. The orchestrator decides
//! *what* runs and in which order; the backend decides *how*.
//!
//! Two implementations ship with the crate:
//!
//! - [`CpuBackend`]: host kernels from [`crate::passes`]; frames complete at submit.
//! - [`crate::gpu::GpuBackend`]: WGSL compute pipelines on a `wgpu` device;
//!   frames complete when the queue reports the submitted work done.

mod cpu;

pub use cpu::{CpuBackend, CpuField};

use crate::error::{FluidError, FrameError};
use crate::field::{FieldFormat, FieldKind, GridSize};
use crate::uniforms::FrameParameters;
use crate::visuals::{Image, VisualStyle};

/// Called exactly once per submitted frame, after the backend finished (or
/// failed) executing it.
pub type CompletionHandler = Box<dyn FnOnce(Result<(), FrameError>) + Send + 'static>;

/// One compute pass invocation.
///
/// Inputs are shared borrows of front buffers; `dst` is the exclusive borrow
/// of a back buffer, so a pass can never write what it reads.
pub enum Pass<'a, F> {
    /// Semi-Lagrangian advection of `src` by `velocity`. Vector sources use
    /// the velocity dissipation, scalar sources the density dissipation.
    Advect {
        velocity: &'a F,
        src: &'a F,
        dst: &'a mut F,
    },
    /// Pointer impulses into a vector field.
    ApplyForceVector { src: &'a F, dst: &'a mut F },
    /// Pointer ink into a scalar field.
    ApplyForceScalar { src: &'a F, dst: &'a mut F },
    ComputeVorticity { velocity: &'a F, dst: &'a mut F },
    VorticityConfinement {
        velocity: &'a F,
        vorticity: &'a F,
        dst: &'a mut F,
    },
    ComputeDivergence { velocity: &'a F, dst: &'a mut F },
    /// One Jacobi iteration of the pressure solve.
    ComputePressure {
        pressure: &'a F,
        divergence: &'a F,
        dst: &'a mut F,
    },
    SubtractGradient {
        pressure: &'a F,
        velocity: &'a F,
        dst: &'a mut F,
    },
}

impl<F> Pass<'_, F> {
    /// Stable name, used for labels and log output.
    pub fn name(&self) -> &'static str {
        match self {
            Pass::Advect { .. } => "advect",
            Pass::ApplyForceVector { .. } => "apply_force_vector",
            Pass::ApplyForceScalar { .. } => "apply_force_scalar",
            Pass::ComputeVorticity { .. } => "compute_vorticity",
            Pass::VorticityConfinement { .. } => "vorticity_confinement",
            Pass::ComputeDivergence { .. } => "compute_divergence",
            Pass::ComputePressure { .. } => "compute_pressure",
            Pass::SubtractGradient { .. } => "subtract_gradient",
        }
    }
}

/// An asynchronous executor of compute passes.
///
/// Per frame the orchestrator calls `write_params`, `begin_frame`, a fixed
/// sequence of `dispatch`, then `submit`. Field and parameter-slot storage is
/// created up front and owned by the orchestrator.
pub trait Backend {
    /// Storage for one slab buffer.
    type Field;
    /// Storage for one frame-parameter ring slot.
    type ParamSlot;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Allocate a zero-filled field buffer.
    fn create_field(&mut self, label: &str, format: FieldFormat, size: GridSize) -> Result<Self::Field, FluidError>;

    /// Allocate one parameter ring slot.
    fn create_param_slot(&mut self, index: usize) -> Result<Self::ParamSlot, FluidError>;

    /// Store a frame's parameters in `slot`. The slot is not in use by any
    /// in-flight frame when this is called.
    fn write_params(&mut self, slot: &mut Self::ParamSlot, params: &FrameParameters);

    /// Start recording frame `frame`.
    fn begin_frame(&mut self, frame: u64);

    /// Record (or run) one pass of the current frame.
    fn dispatch(&mut self, params: &Self::ParamSlot, pass: Pass<'_, Self::Field>);

    /// Hand the recorded frame to the executor. `on_complete` fires once the
    /// work has finished executing, never on mere submission.
    fn submit(&mut self, on_complete: CompletionHandler);

    /// Give the executor a chance to deliver completions. With `wait` set,
    /// block until previously submitted work has finished.
    fn poll(&mut self, _wait: bool) {}

    /// Render the front buffer of a field to an RGBA image.
    ///
    /// Asynchronous backends may return the newest finished image instead,
    /// which can belong to an earlier frame of the same grid size.
    fn visualize(&mut self, field: &Self::Field, kind: FieldKind, style: &VisualStyle) -> Result<Image, FluidError>;
}
