//! Headless demo: stirs the fluid with a scripted pointer and writes PNGs.
//!
//! Usage: `inkflow-demo [cpu|gpu] [frames] [out_dir]`
//!
//! Set `RUST_LOG=debug` for orchestrator logs.

use std::error::Error;
use std::path::{Path, PathBuf};

use inkflow::prelude::*;

const VIEWPORT: (u32, u32) = (512, 384);
const SNAPSHOT_EVERY: u64 = 60;

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let backend = args.next().unwrap_or_else(|| "cpu".to_string());
    let frames: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(240);
    let out_dir = PathBuf::from(args.next().unwrap_or_else(|| "frames".to_string()));
    std::fs::create_dir_all(&out_dir)?;

    let config = FluidConfig::new().with_resolution_scale(2.0);
    match backend.as_str() {
        "gpu" => {
            let backend = GpuBackend::headless()?;
            log::info!("{}", backend.context().device_info());
            run(FluidSimulation::new(backend, config)?, frames, &out_dir)
        }
        "cpu" => run(FluidSimulation::new(CpuBackend::new(), config)?, frames, &out_dir),
        other => Err(format!("unknown backend '{}', expected cpu or gpu", other).into()),
    }
}

/// Pointer position on a circle around the viewport center.
fn pointer_at(frame: u64) -> Vec2 {
    let center = Vec2::new(VIEWPORT.0 as f32, VIEWPORT.1 as f32) * 0.5;
    let angle = frame as f32 * 0.05;
    center + Vec2::new(angle.cos(), angle.sin()) * (VIEWPORT.1 as f32 * 0.3)
}

fn run<B: Backend>(mut sim: FluidSimulation<B>, frames: u64, out_dir: &Path) -> Result<(), Box<dyn Error>> {
    sim.resize(VIEWPORT.0, VIEWPORT.1)?;

    let mut tracker = InteractionTracker::new();
    tracker.press(0, pointer_at(0));

    let start = std::time::Instant::now();
    for frame in 1..=frames {
        tracker.moved(0, pointer_at(frame));
        let samples = tracker.samples();
        let image = sim.tick(Some(&samples), FieldKind::Density)?;

        if frame % SNAPSHOT_EVERY == 0 {
            let path = out_dir.join(format!("density_{:05}.png", frame));
            image.save(&path)?;
            log::info!("Wrote {}", path.display());
        }
    }

    // Release the pointer and render each field once more.
    tracker.clear();
    for kind in FieldKind::ALL {
        let image = sim.tick(None, kind)?;
        image.save(out_dir.join(format!("final_{}.png", kind.name())))?;
    }
    sim.wait_idle();

    let stats = sim.stats();
    println!(
        "{} frames in {:.2?} ({} completed, {} failed)",
        stats.submitted(),
        start.elapsed(),
        stats.completed(),
        stats.failed()
    );
    Ok(())
}
