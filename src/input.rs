//! Pointer interaction input.
//!
//! The simulation core only consumes [`InteractionSample`]s: one per active
//! pointer per frame, each carrying the pointer's current and previous
//! position in viewport pixels. [`InteractionTracker`] is a small helper for
//! UI layers that turns press/move/release events into those samples.
//!
//! # Usage
//!
//! ```ignore
//! let mut tracker = InteractionTracker::new();
//! tracker.press(0, Vec2::new(120.0, 80.0));
//! tracker.moved(0, Vec2::new(126.0, 83.0));
//!
//! let samples = tracker.samples();
//! let image = sim.tick(Some(&samples), FieldKind::Density)?;
//! ```

use glam::Vec2;

/// A pointer's position this frame and last frame, in viewport pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InteractionSample {
    pub position: Vec2,
    pub previous_position: Vec2,
}

impl InteractionSample {
    pub fn new(position: Vec2, previous_position: Vec2) -> Self {
        Self {
            position,
            previous_position,
        }
    }

    /// A pointer that has not moved since last frame.
    pub fn stationary(position: Vec2) -> Self {
        Self::new(position, position)
    }

    /// Position delta since the previous frame.
    pub fn delta(&self) -> Vec2 {
        self.position - self.previous_position
    }
}

#[derive(Debug, Clone, Copy)]
struct TrackedPointer {
    id: u64,
    current: Vec2,
    previous: Vec2,
}

/// Tracks pointer positions between frames.
///
/// Pointers are reported in press order. The tracker does not cap the number
/// of pointers; the simulation ignores samples beyond its supported count.
#[derive(Debug, Default)]
pub struct InteractionTracker {
    pointers: Vec<TrackedPointer>,
}

impl InteractionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pointer went down. Pressing an already tracked id restarts it.
    pub fn press(&mut self, id: u64, position: Vec2) {
        self.release(id);
        self.pointers.push(TrackedPointer {
            id,
            current: position,
            previous: position,
        });
    }

    /// A tracked pointer moved. Unknown ids are ignored.
    pub fn moved(&mut self, id: u64, position: Vec2) {
        if let Some(p) = self.pointers.iter_mut().find(|p| p.id == id) {
            p.current = position;
        }
    }

    /// A pointer went up.
    pub fn release(&mut self, id: u64) {
        self.pointers.retain(|p| p.id != id);
    }

    /// Drop every pointer (e.g. when the viewport loses focus).
    pub fn clear(&mut self) {
        self.pointers.clear();
    }

    /// Number of pointers currently down.
    pub fn active(&self) -> usize {
        self.pointers.len()
    }

    /// Snapshot this frame's samples and roll positions forward.
    ///
    /// After the call each pointer's previous position equals its current
    /// one, so a pointer that does not move produces a zero delta next frame.
    pub fn samples(&mut self) -> Vec<InteractionSample> {
        self.pointers
            .iter_mut()
            .map(|p| {
                let sample = InteractionSample::new(p.current, p.previous);
                p.previous = p.current;
                sample
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_delta() {
        let s = InteractionSample::new(Vec2::new(5.0, 3.0), Vec2::new(2.0, 4.0));
        assert_eq!(s.delta(), Vec2::new(3.0, -1.0));
        assert_eq!(InteractionSample::stationary(Vec2::ONE).delta(), Vec2::ZERO);
    }

    #[test]
    fn test_press_move_sample() {
        let mut tracker = InteractionTracker::new();
        tracker.press(1, Vec2::new(10.0, 10.0));
        tracker.moved(1, Vec2::new(14.0, 11.0));

        let samples = tracker.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].delta(), Vec2::new(4.0, 1.0));
    }

    #[test]
    fn test_samples_roll_previous_forward() {
        let mut tracker = InteractionTracker::new();
        tracker.press(1, Vec2::ZERO);
        tracker.moved(1, Vec2::new(3.0, 0.0));
        let _ = tracker.samples();

        let samples = tracker.samples();
        assert_eq!(samples[0].position, Vec2::new(3.0, 0.0));
        assert_eq!(samples[0].delta(), Vec2::ZERO);
    }

    #[test]
    fn test_release_and_unknown_ids() {
        let mut tracker = InteractionTracker::new();
        tracker.press(1, Vec2::ZERO);
        tracker.press(2, Vec2::ONE);
        tracker.moved(9, Vec2::splat(100.0));
        assert_eq!(tracker.active(), 2);

        tracker.release(1);
        let samples = tracker.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].position, Vec2::ONE);

        tracker.clear();
        assert!(tracker.samples().is_empty());
    }

    #[test]
    fn test_repress_restarts_pointer() {
        let mut tracker = InteractionTracker::new();
        tracker.press(4, Vec2::ZERO);
        tracker.moved(4, Vec2::new(5.0, 5.0));
        tracker.press(4, Vec2::new(50.0, 50.0));

        let samples = tracker.samples();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].delta(), Vec2::ZERO);
    }
}
