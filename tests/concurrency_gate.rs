//! Frames-in-flight bounding with completions delivered out of band.

use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use inkflow::backend::{Backend, CompletionHandler, CpuField, Pass};
use inkflow::field::{FieldFormat, GridSize};
use inkflow::prelude::*;
use inkflow::simulation::STALL_WARNING_AFTER;
use inkflow::{FrameError, FrameParameters};

type Held = Arc<Mutex<Vec<CompletionHandler>>>;

const SHORT: Duration = Duration::from_millis(100);
const LONG: Duration = Duration::from_secs(5);

/// Runs passes on the host but keeps completion handlers until the test
/// releases them, like a GPU queue that has not finished yet.
struct HeldBackend {
    inner: CpuBackend,
    held: Held,
    fail_odd_frames: bool,
    frame: u64,
}

impl HeldBackend {
    fn new() -> (Self, Held) {
        let held: Held = Arc::new(Mutex::new(Vec::new()));
        let backend = Self {
            inner: CpuBackend::new(),
            held: Arc::clone(&held),
            fail_odd_frames: false,
            frame: 0,
        };
        (backend, held)
    }
}

impl Backend for HeldBackend {
    type Field = CpuField;
    type ParamSlot = FrameParameters;

    fn name(&self) -> &'static str {
        "held"
    }

    fn create_field(&mut self, label: &str, format: FieldFormat, size: GridSize) -> Result<CpuField, FluidError> {
        self.inner.create_field(label, format, size)
    }

    fn create_param_slot(&mut self, index: usize) -> Result<FrameParameters, FluidError> {
        self.inner.create_param_slot(index)
    }

    fn write_params(&mut self, slot: &mut FrameParameters, params: &FrameParameters) {
        self.inner.write_params(slot, params)
    }

    fn begin_frame(&mut self, frame: u64) {
        self.frame = frame;
        self.inner.begin_frame(frame)
    }

    fn dispatch(&mut self, params: &FrameParameters, pass: Pass<'_, CpuField>) {
        self.inner.dispatch(params, pass)
    }

    fn submit(&mut self, on_complete: CompletionHandler) {
        if self.fail_odd_frames && self.frame % 2 == 1 {
            on_complete(Err(FrameError::new(self.frame, "device lost")));
            return;
        }
        self.held.lock().unwrap().push(on_complete);
    }

    fn visualize(&mut self, field: &CpuField, kind: FieldKind, style: &VisualStyle) -> Result<Image, FluidError> {
        self.inner.visualize(field, kind, style)
    }
}

fn release_one(held: &Held, result: Result<(), FrameError>) {
    let handler = {
        let mut held = held.lock().unwrap();
        assert!(!held.is_empty(), "no frame to release");
        held.remove(0)
    };
    handler(result);
}

fn held_sim(ring_depth: usize) -> (FluidSimulation<HeldBackend>, Held) {
    let (backend, held) = HeldBackend::new();
    let config = FluidConfig::new().with_ring_depth(ring_depth).with_pressure_iterations(4);
    let mut sim = FluidSimulation::new(backend, config).unwrap();
    sim.resize(16, 16).unwrap();
    (sim, held)
}

#[test]
fn test_tick_blocks_when_ring_is_full() {
    let (mut sim, held) = held_sim(3);
    for _ in 0..3 {
        sim.tick(None, FieldKind::Density).unwrap();
    }
    assert_eq!(sim.in_flight(), 3);
    assert_eq!(held.lock().unwrap().len(), 3);

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        let result = sim.tick(None, FieldKind::Density).map(|image| image.dimensions());
        tx.send(result.is_ok()).unwrap();
        sim
    });

    assert!(rx.recv_timeout(SHORT).is_err(), "fourth tick ran with three frames in flight");

    release_one(&held, Ok(()));
    assert_eq!(rx.recv_timeout(LONG), Ok(true));

    let sim = worker.join().unwrap();
    assert_eq!(sim.in_flight(), 3);
    assert_eq!(sim.stats().submitted(), 4);
    assert_eq!(sim.stats().completed(), 1);
    assert_eq!(held.lock().unwrap().len(), 3);
}

#[test]
fn test_each_release_unblocks_one_tick() {
    let (mut sim, held) = held_sim(2);
    sim.tick(None, FieldKind::Density).unwrap();
    sim.tick(None, FieldKind::Density).unwrap();

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        for i in 0..2 {
            sim.tick(None, FieldKind::Velocity).unwrap();
            tx.send(i).unwrap();
        }
        sim
    });

    assert!(rx.recv_timeout(SHORT).is_err());
    release_one(&held, Ok(()));
    assert_eq!(rx.recv_timeout(LONG), Ok(0));
    assert!(rx.recv_timeout(SHORT).is_err(), "one release let two ticks through");

    release_one(&held, Ok(()));
    assert_eq!(rx.recv_timeout(LONG), Ok(1));

    let mut sim = worker.join().unwrap();
    while !held.lock().unwrap().is_empty() {
        release_one(&held, Ok(()));
    }
    sim.wait_idle();
    assert_eq!(sim.in_flight(), 0);
    assert_eq!(sim.stats().completed(), 4);
}

#[test]
fn test_failed_frame_releases_its_slot() {
    let (mut sim, held) = held_sim(1);
    sim.tick(None, FieldKind::Density).unwrap();
    release_one(&held, Err(FrameError::new(0, "out of memory")));

    assert_eq!(sim.in_flight(), 0);
    assert_eq!(sim.stats().failed(), 1);
    assert_eq!(sim.stats().in_flight(), 0);

    // The next tick proceeds without waiting.
    sim.tick(None, FieldKind::Density).unwrap();
    assert_eq!(sim.in_flight(), 1);
}

#[test]
fn test_immediate_failures_never_wedge_the_gate() {
    let (mut backend, held) = HeldBackend::new();
    backend.fail_odd_frames = true;
    let mut sim = FluidSimulation::new(backend, FluidConfig::new().with_ring_depth(2)).unwrap();
    sim.resize(8, 8).unwrap();

    for _ in 0..6 {
        sim.tick(None, FieldKind::Density).unwrap();
        // Even frames stay held; release them so the ring never fills.
        while let Some(handler) = held.lock().unwrap().pop() {
            handler(Ok(()));
        }
    }

    assert_eq!(sim.stats().submitted(), 6);
    assert_eq!(sim.stats().completed(), 3);
    assert_eq!(sim.stats().failed(), 3);
    assert_eq!(sim.in_flight(), 0);
}

#[test]
fn test_resize_waits_for_in_flight_frames() {
    let (mut sim, held) = held_sim(2);
    sim.tick(None, FieldKind::Density).unwrap();
    sim.tick(None, FieldKind::Density).unwrap();

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        sim.resize(24, 8).unwrap();
        tx.send(()).unwrap();
        sim
    });

    assert!(rx.recv_timeout(SHORT).is_err(), "resize ran under in-flight frames");
    release_one(&held, Ok(()));
    assert!(rx.recv_timeout(SHORT).is_err());
    release_one(&held, Ok(()));
    assert_eq!(rx.recv_timeout(LONG), Ok(()));

    let sim = worker.join().unwrap();
    assert_eq!(sim.grid_size(), Some(GridSize::new(24, 8).unwrap()));
    assert_eq!(sim.in_flight(), 0);
}

#[test]
fn test_wait_idle_outlasts_stall_warnings() {
    let (mut sim, held) = held_sim(2);
    sim.tick(None, FieldKind::Density).unwrap();

    let (tx, rx) = mpsc::channel();
    let worker = thread::spawn(move || {
        sim.wait_idle();
        tx.send(()).unwrap();
        sim
    });

    // Several stall warnings pass without giving up on the frame.
    assert!(rx.recv_timeout(STALL_WARNING_AFTER * 3).is_err());
    release_one(&held, Ok(()));
    assert_eq!(rx.recv_timeout(LONG), Ok(()));

    let sim = worker.join().unwrap();
    assert_eq!(sim.in_flight(), 0);
    assert_eq!(sim.stats().completed(), 1);
}
