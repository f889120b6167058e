//! Host reference backend.
//!
//! Runs every pass immediately inside `dispatch` using the kernels in
//! [`crate::passes`]. A frame is therefore finished by the time `submit` is
//! called, and the completion handler fires from `submit` itself.

use bytemuck::Zeroable;
use glam::Vec2;

use super::{Backend, CompletionHandler, Pass};
use crate::error::{FluidError, FrameError};
use crate::field::{FieldFormat, FieldKind, Grid, GridSize};
use crate::passes;
use crate::uniforms::FrameParameters;
use crate::visuals::{self, Image, VisualStyle};

/// Host storage for one slab buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum CpuField {
    Scalar(Grid<f32>),
    Vector(Grid<Vec2>),
}

impl CpuField {
    pub fn format(&self) -> FieldFormat {
        match self {
            CpuField::Scalar(_) => FieldFormat::Scalar,
            CpuField::Vector(_) => FieldFormat::Vector,
        }
    }

    pub fn size(&self) -> GridSize {
        match self {
            CpuField::Scalar(g) => g.size(),
            CpuField::Vector(g) => g.size(),
        }
    }

    pub fn as_scalar(&self) -> Option<&Grid<f32>> {
        match self {
            CpuField::Scalar(g) => Some(g),
            CpuField::Vector(_) => None,
        }
    }

    pub fn as_vector(&self) -> Option<&Grid<Vec2>> {
        match self {
            CpuField::Vector(g) => Some(g),
            CpuField::Scalar(_) => None,
        }
    }

    pub fn as_scalar_mut(&mut self) -> Option<&mut Grid<f32>> {
        match self {
            CpuField::Scalar(g) => Some(g),
            CpuField::Vector(_) => None,
        }
    }

    pub fn as_vector_mut(&mut self) -> Option<&mut Grid<Vec2>> {
        match self {
            CpuField::Vector(g) => Some(g),
            CpuField::Scalar(_) => None,
        }
    }
}

/// Executes passes on the calling thread.
#[derive(Debug, Default)]
pub struct CpuBackend {
    frame: u64,
    /// First failure recorded while dispatching the current frame.
    failure: Option<FrameError>,
}

impl CpuBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn fail(&mut self, pass: &str, message: &str) {
        if self.failure.is_none() {
            self.failure = Some(FrameError::new(self.frame, format!("{}: {}", pass, message)));
        }
    }
}

impl Backend for CpuBackend {
    type Field = CpuField;
    type ParamSlot = FrameParameters;

    fn name(&self) -> &'static str {
        "cpu"
    }

    fn create_field(&mut self, label: &str, format: FieldFormat, size: GridSize) -> Result<CpuField, FluidError> {
        let alloc_error = |e: std::collections::TryReserveError| FluidError::Allocation {
            label: label.to_string(),
            bytes: size.byte_size(format),
            reason: e.to_string(),
        };
        Ok(match format {
            FieldFormat::Scalar => CpuField::Scalar(Grid::try_new(size).map_err(alloc_error)?),
            FieldFormat::Vector => CpuField::Vector(Grid::try_new(size).map_err(alloc_error)?),
        })
    }

    fn create_param_slot(&mut self, _index: usize) -> Result<FrameParameters, FluidError> {
        Ok(FrameParameters::zeroed())
    }

    fn write_params(&mut self, slot: &mut FrameParameters, params: &FrameParameters) {
        *slot = *params;
    }

    fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
        self.failure = None;
    }

    fn dispatch(&mut self, params: &FrameParameters, pass: Pass<'_, CpuField>) {
        let name = pass.name();
        match pass {
            Pass::Advect { velocity, src, dst } => match (velocity, src, dst) {
                (CpuField::Vector(v), CpuField::Vector(s), CpuField::Vector(d)) => {
                    passes::advect(v, s, d, params.time_step, params.velocity_dissipation)
                }
                (CpuField::Vector(v), CpuField::Scalar(s), CpuField::Scalar(d)) => {
                    passes::advect(v, s, d, params.time_step, params.density_dissipation)
                }
                _ => self.fail(name, "field format mismatch"),
            },
            Pass::ApplyForceVector { src, dst } => match (src, dst) {
                (CpuField::Vector(s), CpuField::Vector(d)) => passes::apply_force_vector(s, d, params),
                _ => self.fail(name, "expected vector fields"),
            },
            Pass::ApplyForceScalar { src, dst } => match (src, dst) {
                (CpuField::Scalar(s), CpuField::Scalar(d)) => passes::apply_force_scalar(s, d, params),
                _ => self.fail(name, "expected scalar fields"),
            },
            Pass::ComputeVorticity { velocity, dst } => match (velocity, dst) {
                (CpuField::Vector(v), CpuField::Scalar(d)) => passes::compute_vorticity(v, d),
                _ => self.fail(name, "field format mismatch"),
            },
            Pass::VorticityConfinement { velocity, vorticity, dst } => match (velocity, vorticity, dst) {
                (CpuField::Vector(v), CpuField::Scalar(w), CpuField::Vector(d)) => {
                    passes::vorticity_confinement(v, w, d, params.time_step, params.vorticity)
                }
                _ => self.fail(name, "field format mismatch"),
            },
            Pass::ComputeDivergence { velocity, dst } => match (velocity, dst) {
                (CpuField::Vector(v), CpuField::Scalar(d)) => passes::compute_divergence(v, d),
                _ => self.fail(name, "field format mismatch"),
            },
            Pass::ComputePressure { pressure, divergence, dst } => match (pressure, divergence, dst) {
                (CpuField::Scalar(p), CpuField::Scalar(b), CpuField::Scalar(d)) => passes::compute_pressure(p, b, d),
                _ => self.fail(name, "expected scalar fields"),
            },
            Pass::SubtractGradient { pressure, velocity, dst } => match (pressure, velocity, dst) {
                (CpuField::Scalar(p), CpuField::Vector(v), CpuField::Vector(d)) => passes::subtract_gradient(p, v, d),
                _ => self.fail(name, "field format mismatch"),
            },
        }
    }

    fn submit(&mut self, on_complete: CompletionHandler) {
        match self.failure.take() {
            Some(e) => on_complete(Err(e)),
            None => on_complete(Ok(())),
        }
    }

    fn visualize(&mut self, field: &CpuField, kind: FieldKind, style: &VisualStyle) -> Result<Image, FluidError> {
        Ok(match field {
            CpuField::Scalar(g) => visuals::render_scalar(g, kind, style),
            CpuField::Vector(g) => visuals::render_vector(g, kind, style),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn size() -> GridSize {
        GridSize::new(8, 8).unwrap()
    }

    fn capture() -> (CompletionHandler, Arc<Mutex<Option<Result<(), FrameError>>>>) {
        let slot = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&slot);
        (Box::new(move |r: Result<(), FrameError>| *sink.lock().unwrap() = Some(r)), slot)
    }

    #[test]
    fn test_create_field_formats() {
        let mut backend = CpuBackend::new();
        let v = backend.create_field("v", FieldFormat::Vector, size()).unwrap();
        let s = backend.create_field("s", FieldFormat::Scalar, size()).unwrap();
        assert_eq!(v.format(), FieldFormat::Vector);
        assert_eq!(s.format(), FieldFormat::Scalar);
        assert_eq!(v.size(), size());
        assert!(s.as_scalar().unwrap().as_slice().iter().all(|x| *x == 0.0));
    }

    #[test]
    fn test_successful_frame_completes_ok() {
        let mut backend = CpuBackend::new();
        let velocity = backend.create_field("v", FieldFormat::Vector, size()).unwrap();
        let mut dst = backend.create_field("d", FieldFormat::Scalar, size()).unwrap();
        let params = FrameParameters::for_grid(size());

        backend.begin_frame(0);
        backend.dispatch(&params, Pass::ComputeDivergence { velocity: &velocity, dst: &mut dst });
        let (handler, result) = capture();
        backend.submit(handler);
        assert_eq!(*result.lock().unwrap(), Some(Ok(())));
    }

    #[test]
    fn test_format_mismatch_fails_frame() {
        let mut backend = CpuBackend::new();
        let scalar = backend.create_field("s", FieldFormat::Scalar, size()).unwrap();
        let mut dst = backend.create_field("d", FieldFormat::Scalar, size()).unwrap();
        let params = FrameParameters::for_grid(size());

        backend.begin_frame(3);
        backend.dispatch(&params, Pass::ComputeVorticity { velocity: &scalar, dst: &mut dst });
        let (handler, result) = capture();
        backend.submit(handler);

        let err = result.lock().unwrap().clone().unwrap().unwrap_err();
        assert_eq!(err.frame, 3);
        assert!(err.message.starts_with("compute_vorticity"));

        // The failure does not leak into the next frame.
        backend.begin_frame(4);
        let (handler, result) = capture();
        backend.submit(handler);
        assert_eq!(*result.lock().unwrap(), Some(Ok(())));
    }
}
