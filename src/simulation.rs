//! The simulation orchestrator.
//!
//! [`FluidSimulation`] owns the five slabs, the frame parameter ring and the
//! frame gate, and drives a [`Backend`] through the fixed pass sequence once
//! per [`tick`](FluidSimulation::tick).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, Pass};
use crate::config::FluidConfig;
use crate::error::{FluidError, FrameError};
use crate::field::{FieldKind, GridSize};
use crate::gate::FrameGate;
use crate::input::InteractionSample;
use crate::slab::SimulationState;
use crate::uniforms::{FrameParameters, ParameterRing, MAX_POINTERS};
use crate::visuals::Image;

/// How long [`FluidSimulation::wait_idle`] waits for a frame before warning.
pub const STALL_WARNING_AFTER: Duration = Duration::from_millis(250);

/// Frame counters, updated from completion handlers.
#[derive(Debug, Default)]
pub struct FrameStats {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

impl FrameStats {
    /// Frames handed to the backend.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Acquire)
    }

    /// Frames that finished without error.
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Acquire)
    }

    /// Frames whose completion reported an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    /// Frames submitted but not yet finished.
    pub fn in_flight(&self) -> u64 {
        self.submitted()
            .saturating_sub(self.completed())
            .saturating_sub(self.failed())
    }
}

/// A 2D stable-fluids simulation running on backend `B`.
///
/// # Example
///
/// ```ignore
/// let mut sim = FluidSimulation::new(CpuBackend::new(), FluidConfig::new())?;
/// sim.resize(320, 240)?;
/// let samples = [InteractionSample::new(Vec2::new(160.0, 120.0), Vec2::new(150.0, 120.0))];
/// let image = sim.tick(Some(&samples), FieldKind::Density)?;
/// ```
pub struct FluidSimulation<B: Backend> {
    backend: B,
    config: FluidConfig,
    state: Option<SimulationState<B::Field>>,
    ring: ParameterRing<B::ParamSlot>,
    gate: Arc<FrameGate>,
    stats: Arc<FrameStats>,
}

impl<B: Backend> FluidSimulation<B> {
    /// Validate `config` and allocate the parameter ring.
    ///
    /// No grid exists until the first [`resize`](Self::resize).
    pub fn new(mut backend: B, config: FluidConfig) -> Result<Self, FluidError> {
        config.validate()?;
        let slots = (0..config.ring_depth)
            .map(|i| backend.create_param_slot(i))
            .collect::<Result<Vec<_>, _>>()?;

        log::info!(
            "Created fluid simulation on {} backend ({} frames in flight, {} pressure iterations)",
            backend.name(),
            config.ring_depth,
            config.pressure_iterations
        );

        Ok(Self {
            backend,
            gate: FrameGate::new(config.ring_depth),
            config,
            state: None,
            ring: ParameterRing::new(slots),
            stats: Arc::new(FrameStats::default()),
        })
    }

    /// Rebuild every slab for a `width` x `height` pixel viewport.
    ///
    /// Waits for in-flight frames first. All fields restart from zero. If
    /// allocation fails the simulation is left without a grid and `tick`
    /// returns [`FluidError::NotInitialized`] until a successful resize.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), FluidError> {
        let size = self.config.grid_size_for(width, height)?;
        self.wait_idle();
        self.state = None;

        let backend = &mut self.backend;
        let state = SimulationState::new(size, |label, format, size| backend.create_field(label, format, size))?;
        self.state = Some(state);

        log::debug!(
            "Resized to {}x{} cells for a {}x{} viewport",
            size.width,
            size.height,
            width,
            height
        );
        Ok(())
    }

    /// Advance one timestep and render `selector`.
    ///
    /// Blocks while `ring_depth` frames are already in flight. Per-frame
    /// backend failures are logged and counted in [`stats`](Self::stats);
    /// they do not fail this call.
    pub fn tick(&mut self, interactions: Option<&[InteractionSample]>, selector: FieldKind) -> Result<Image, FluidError> {
        let size = self.state.as_ref().ok_or(FluidError::NotInitialized)?.size();

        let permit = match self.gate.try_acquire() {
            Some(permit) => permit,
            None => {
                self.backend.poll(true);
                self.gate.acquire()
            }
        };

        let params = self.frame_parameters(size, interactions.unwrap_or(&[]));
        let frame = self.ring.frame();
        let slot = self.ring.advance();
        self.backend.write_params(self.ring.slot_mut(slot), &params);

        let state = self.state.as_mut().ok_or(FluidError::NotInitialized)?;
        self.backend.begin_frame(frame);
        encode_timestep(
            &mut self.backend,
            self.ring.slot(slot),
            state,
            params.has_pointers(),
            self.config.pressure_iterations,
        );

        let stats = Arc::clone(&self.stats);
        stats.submitted.fetch_add(1, Ordering::AcqRel);
        self.backend.submit(Box::new(move |result: Result<(), FrameError>| {
            match result {
                Ok(()) => {
                    stats.completed.fetch_add(1, Ordering::AcqRel);
                }
                Err(e) => {
                    log::error!("{}", e);
                    stats.failed.fetch_add(1, Ordering::AcqRel);
                }
            }
            drop(permit);
        }));

        self.backend.visualize(state.field(selector).read(), selector, &self.config.style)
    }

    /// Block until every submitted frame has completed.
    ///
    /// Logs a warning each time frames stay in flight longer than
    /// [`STALL_WARNING_AFTER`].
    pub fn wait_idle(&mut self) {
        if self.gate.in_flight() == 0 {
            return;
        }
        self.backend.poll(true);

        let mut permits = Vec::with_capacity(self.gate.capacity());
        while permits.len() < self.gate.capacity() {
            match self.gate.acquire_timeout(STALL_WARNING_AFTER) {
                Some(permit) => permits.push(permit),
                None => log::warn!(
                    "Still waiting for {} frame(s) in flight after {:?}",
                    self.gate.in_flight().saturating_sub(permits.len()),
                    STALL_WARNING_AFTER
                ),
            }
        }
        drop(permits);
    }

    fn frame_parameters(&self, size: GridSize, samples: &[InteractionSample]) -> FrameParameters {
        let c = &self.config;
        let mut params = FrameParameters::for_grid(size);
        params.impulse_strength = c.impulse_strength;
        params.ink_radius = c.ink_radius;
        params.ink_amount = c.ink_amount;
        params.time_step = c.time_step;
        params.vorticity = c.vorticity;
        params.velocity_dissipation = c.velocity_dissipation;
        params.density_dissipation = c.density_dissipation;

        let usable = samples
            .iter()
            .filter(|s| s.position.is_finite() && s.previous_position.is_finite());
        for (i, sample) in usable.enumerate() {
            let position = sample.position / c.resolution_scale;
            let impulse = sample.delta() / c.resolution_scale;
            if !params.push_pointer(position, impulse) {
                log::trace!("Ignoring pointer {} (at most {} per frame)", i, MAX_POINTERS);
            }
        }
        params
    }

    /// Current grid, or `None` before the first resize.
    pub fn grid_size(&self) -> Option<GridSize> {
        self.state.as_ref().map(|s| s.size())
    }

    pub fn state(&self) -> Option<&SimulationState<B::Field>> {
        self.state.as_ref()
    }

    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    pub fn config(&self) -> &FluidConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Number of frames submitted so far.
    pub fn frame_index(&self) -> u64 {
        self.ring.frame()
    }

    /// Frames holding a gate permit right now.
    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }
}

/// Record one timestep into `backend`.
///
/// Every pass reads front buffers, writes a back buffer, and the written
/// slab is swapped before the next pass. Force injection is skipped without
/// pointers.
pub fn encode_timestep<B: Backend>(
    backend: &mut B,
    params: &B::ParamSlot,
    state: &mut SimulationState<B::Field>,
    has_pointers: bool,
    pressure_iterations: u32,
) {
    {
        let (velocity, dst) = state.velocity.split();
        backend.dispatch(
            params,
            Pass::Advect {
                velocity,
                src: velocity,
                dst,
            },
        );
    }
    state.velocity.swap();

    {
        let velocity = state.velocity.read();
        let (src, dst) = state.density.split();
        backend.dispatch(params, Pass::Advect { velocity, src, dst });
    }
    state.density.swap();

    if has_pointers {
        let (src, dst) = state.velocity.split();
        backend.dispatch(params, Pass::ApplyForceVector { src, dst });
        state.velocity.swap();

        let (src, dst) = state.density.split();
        backend.dispatch(params, Pass::ApplyForceScalar { src, dst });
        state.density.swap();
    }

    backend.dispatch(
        params,
        Pass::ComputeVorticity {
            velocity: state.velocity.read(),
            dst: state.vorticity.write_target(),
        },
    );
    state.vorticity.swap();

    {
        let vorticity = state.vorticity.read();
        let (velocity, dst) = state.velocity.split();
        backend.dispatch(params, Pass::VorticityConfinement { velocity, vorticity, dst });
    }
    state.velocity.swap();

    backend.dispatch(
        params,
        Pass::ComputeDivergence {
            velocity: state.velocity.read(),
            dst: state.divergence.write_target(),
        },
    );
    state.divergence.swap();

    // Pressure carries over from the previous frame as the initial guess.
    for _ in 0..pressure_iterations {
        let divergence = state.divergence.read();
        let (pressure, dst) = state.pressure.split();
        backend.dispatch(params, Pass::ComputePressure { pressure, divergence, dst });
        state.pressure.swap();
    }

    {
        let pressure = state.pressure.read();
        let (velocity, dst) = state.velocity.split();
        backend.dispatch(params, Pass::SubtractGradient { pressure, velocity, dst });
    }
    state.velocity.swap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::CpuBackend;
    use glam::Vec2;

    fn sim() -> FluidSimulation<CpuBackend> {
        FluidSimulation::new(CpuBackend::new(), FluidConfig::new()).unwrap()
    }

    #[test]
    fn test_tick_before_resize() {
        let mut sim = sim();
        assert!(matches!(sim.tick(None, FieldKind::Density), Err(FluidError::NotInitialized)));
        assert_eq!(sim.frame_index(), 0);
    }

    #[test]
    fn test_new_rejects_zero_ring() {
        let result = FluidSimulation::new(CpuBackend::new(), FluidConfig::new().with_ring_depth(0));
        assert!(matches!(result, Err(FluidError::InvalidRingDepth(0))));
    }

    #[test]
    fn test_tick_counts_frames() {
        let mut sim = sim();
        sim.resize(16, 8).unwrap();
        for _ in 0..5 {
            let image = sim.tick(None, FieldKind::Velocity).unwrap();
            assert_eq!(image.dimensions(), (16, 8));
        }
        assert_eq!(sim.frame_index(), 5);
        assert_eq!(sim.stats().submitted(), 5);
        assert_eq!(sim.stats().completed(), 5);
        assert_eq!(sim.stats().in_flight(), 0);
        assert_eq!(sim.in_flight(), 0);
    }

    #[test]
    fn test_frame_parameters_scale_pointers() {
        let mut sim = FluidSimulation::new(CpuBackend::new(), FluidConfig::new().with_resolution_scale(2.0)).unwrap();
        sim.resize(64, 64).unwrap();
        let samples = [InteractionSample::new(Vec2::new(20.0, 10.0), Vec2::new(16.0, 10.0))];
        let params = sim.frame_parameters(GridSize::new(32, 32).unwrap(), &samples);

        let pointers: Vec<_> = params.active_pointers().collect();
        assert_eq!(pointers, vec![(Vec2::new(10.0, 5.0), Vec2::new(2.0, 0.0))]);
        assert_eq!(params.ink_radius, 8.0);
    }

    #[test]
    fn test_extra_and_invalid_pointers_ignored() {
        let sim = sim();
        let mut samples = vec![InteractionSample::stationary(Vec2::new(f32::NAN, 0.0))];
        samples.extend((0..8).map(|i| InteractionSample::stationary(Vec2::splat(i as f32))));
        let params = sim.frame_parameters(GridSize::new(8, 8).unwrap(), &samples);

        assert_eq!(params.pointer_count as usize, MAX_POINTERS);
        assert_eq!(params.active_pointers().next().unwrap().0, Vec2::ZERO);
    }
}
