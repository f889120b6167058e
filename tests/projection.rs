//! Pressure projection on the host kernels.

use inkflow::field::{FieldFormat, Grid, GridSize};
use inkflow::passes;
use inkflow::prelude::*;
use inkflow::slab::Slab;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_velocity(size: GridSize, seed: u64) -> Grid<Vec2> {
    let mut rng = StdRng::seed_from_u64(seed);
    let data = (0..size.cells())
        .map(|_| Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
        .collect();
    Grid::from_vec(size, data).unwrap()
}

fn divergence_of(velocity: &Grid<Vec2>) -> Grid<f32> {
    let mut divergence = Grid::new(velocity.size());
    passes::compute_divergence(velocity, &mut divergence);
    divergence
}

/// Project `velocity` with `iterations` Jacobi steps from a zero pressure guess.
fn project(velocity: &Grid<Vec2>, iterations: u32) -> Grid<Vec2> {
    let size = velocity.size();
    let divergence = divergence_of(velocity);
    let mut pressure = Slab::new(size.width, size.height, FieldFormat::Scalar, |_| Ok(Grid::<f32>::new(size))).unwrap();

    for _ in 0..iterations {
        let (front, back) = pressure.split();
        passes::compute_pressure(front, &divergence, back);
        pressure.swap();
    }

    let mut projected = Grid::new(size);
    passes::subtract_gradient(pressure.read(), velocity, &mut projected);
    projected
}

#[test]
fn test_projection_reduces_divergence() {
    let size = GridSize::new(32, 32).unwrap();
    let velocity = random_velocity(size, 7);
    let before = divergence_of(&velocity).rms();
    let after = divergence_of(&project(&velocity, 40)).rms();

    assert!(before > 0.0);
    assert!(after < 0.8 * before, "divergence {} -> {}", before, after);
}

#[test]
fn test_more_iterations_never_increase_divergence() {
    let size = GridSize::new(32, 24).unwrap();
    for seed in [1, 2, 3] {
        let velocity = random_velocity(size, seed);
        let residuals: Vec<f32> = [10, 20, 40, 80]
            .iter()
            .map(|&k| divergence_of(&project(&velocity, k)).rms())
            .collect();

        for pair in residuals.windows(2) {
            assert!(
                pair[1] <= pair[0] * (1.0 + 1e-4) + 1e-6,
                "seed {}: residuals not monotone: {:?}",
                seed,
                residuals
            );
        }
        assert!(residuals[3] < residuals[0], "seed {}: {:?}", seed, residuals);
    }
}

#[test]
fn test_divergence_free_field_is_untouched() {
    // A shear flow u = (sin(2*pi*y/h), 0) has zero discrete divergence.
    let size = GridSize::new(16, 16).unwrap();
    let data = (0..size.cells())
        .map(|i| {
            let y = (i / 16) as f32;
            Vec2::new((y / 16.0 * std::f32::consts::TAU).sin(), 0.0)
        })
        .collect();
    let velocity = Grid::from_vec(size, data).unwrap();
    assert!(divergence_of(&velocity).max_abs() < 1e-6);

    let projected = project(&velocity, 20);
    for (a, b) in projected.as_slice().iter().zip(velocity.as_slice()) {
        assert!((*a - *b).length() < 1e-5);
    }
}

#[test]
fn test_first_tick_projects_velocity() {
    let mut sim = FluidSimulation::new(CpuBackend::new(), FluidConfig::new().with_vorticity(0.0)).unwrap();
    sim.resize(48, 48).unwrap();
    let samples = [InteractionSample::new(Vec2::new(24.0, 24.0), Vec2::new(20.0, 22.0))];
    sim.tick(Some(&samples), FieldKind::Velocity).unwrap();

    let state = sim.state().unwrap();
    let velocity = state.velocity.read().as_vector().unwrap();
    // The divergence slab still holds the pre-projection divergence.
    let before = state.divergence.read().as_scalar().unwrap().rms();
    let after = divergence_of(velocity).rms();

    assert!(velocity.max_length() > 0.0);
    assert!(after < before, "divergence {} -> {}", before, after);
}
