//! Per-frame uniform parameters and the ring that multi-buffers them.
//!
//! The CPU fills one [`FrameParameters`] record per frame. Records live in a
//! [`ParameterRing`] of N slots indexed by `frame mod N`, so the next frame's
//! parameters can be written while earlier frames are still executing and
//! reading their own slot.

use bytemuck::{Pod, Zeroable};
use glam::Vec2;

use crate::field::GridSize;

/// Maximum number of simultaneous pointers injected per frame.
pub const MAX_POINTERS: usize = 5;

/// One timestep's constants, uploaded to the GPU as a uniform buffer.
///
/// Layout must match `struct Params` in the WGSL pass shaders (128 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct FrameParameters {
    /// Per pointer: `xy` = position, `zw` = impulse (position delta), in cells.
    pub pointers: [[f32; 4]; MAX_POINTERS],
    /// `1 / width`, `1 / height`.
    pub texel_size: [f32; 2],
    /// Grid width and height in cells.
    pub grid_size: [u32; 2],
    pub impulse_strength: f32,
    /// Falloff radius of pointer injection, in cells.
    pub ink_radius: f32,
    /// Density added at a pointer's center.
    pub ink_amount: f32,
    /// Number of valid entries in `pointers`.
    pub pointer_count: u32,
    /// Seconds per timestep.
    pub time_step: f32,
    /// Vorticity confinement coefficient.
    pub vorticity: f32,
    pub velocity_dissipation: f32,
    pub density_dissipation: f32,
}

impl FrameParameters {
    /// Parameters for `size` with no pointers and neutral coefficients.
    pub fn for_grid(size: GridSize) -> Self {
        let texel = size.texel_size();
        Self {
            pointers: [[0.0; 4]; MAX_POINTERS],
            texel_size: texel.to_array(),
            grid_size: [size.width, size.height],
            impulse_strength: 0.0,
            ink_radius: 1.0,
            ink_amount: 0.0,
            pointer_count: 0,
            time_step: 0.0,
            vorticity: 0.0,
            velocity_dissipation: 1.0,
            density_dissipation: 1.0,
        }
    }

    /// Append a pointer. Returns `false` (and ignores it) once all slots are used.
    pub fn push_pointer(&mut self, position: Vec2, impulse: Vec2) -> bool {
        let i = self.pointer_count as usize;
        if i >= MAX_POINTERS {
            return false;
        }
        self.pointers[i] = [position.x, position.y, impulse.x, impulse.y];
        self.pointer_count += 1;
        true
    }

    /// Active pointers as `(position, impulse)` pairs.
    pub fn active_pointers(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        self.pointers[..(self.pointer_count as usize).min(MAX_POINTERS)]
            .iter()
            .map(|p| (Vec2::new(p[0], p[1]), Vec2::new(p[2], p[3])))
    }

    pub fn has_pointers(&self) -> bool {
        self.pointer_count > 0
    }
}

/// Fixed-size pool of per-frame parameter slots, used round-robin.
///
/// The slot type is backend specific: plain records on the CPU, uniform
/// buffers on the GPU. No allocation happens after construction.
#[derive(Debug)]
pub struct ParameterRing<S> {
    slots: Vec<S>,
    frame: u64,
}

impl<S> ParameterRing<S> {
    /// Build a ring from pre-allocated slots.
    pub fn new(slots: Vec<S>) -> Self {
        Self { slots, frame: 0 }
    }

    /// Number of slots (N).
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Frames handed out so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Slot index the next call to [`ParameterRing::advance`] returns.
    pub fn next_index(&self) -> usize {
        (self.frame % self.slots.len() as u64) as usize
    }

    /// Claim the slot for the next frame, returning its index.
    pub fn advance(&mut self) -> usize {
        let index = self.next_index();
        self.frame += 1;
        index
    }

    pub fn slot(&self, index: usize) -> &S {
        &self.slots[index]
    }

    pub fn slot_mut(&mut self, index: usize) -> &mut S {
        &mut self.slots[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_parameters_layout() {
        // Must match the WGSL struct.
        assert_eq!(std::mem::size_of::<FrameParameters>(), 128);
        assert_eq!(std::mem::size_of::<FrameParameters>() % 16, 0);
    }

    #[test]
    fn test_for_grid() {
        let params = FrameParameters::for_grid(GridSize::new(64, 32).unwrap());
        assert_eq!(params.grid_size, [64, 32]);
        assert_eq!(params.texel_size, [1.0 / 64.0, 1.0 / 32.0]);
        assert!(!params.has_pointers());
    }

    #[test]
    fn test_push_pointer_caps_at_max() {
        let mut params = FrameParameters::for_grid(GridSize::new(8, 8).unwrap());
        for i in 0..MAX_POINTERS {
            assert!(params.push_pointer(Vec2::splat(i as f32), Vec2::X));
        }
        assert!(!params.push_pointer(Vec2::ZERO, Vec2::Y));
        assert_eq!(params.pointer_count as usize, MAX_POINTERS);

        let pointers: Vec<_> = params.active_pointers().collect();
        assert_eq!(pointers.len(), MAX_POINTERS);
        assert_eq!(pointers[2], (Vec2::splat(2.0), Vec2::X));
    }

    #[test]
    fn test_ring_rotates() {
        let mut ring = ParameterRing::new(vec!['a', 'b', 'c']);
        let indices: Vec<usize> = (0..7).map(|_| ring.advance()).collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1, 2, 0]);
        assert_eq!(ring.frame(), 7);
        assert_eq!(*ring.slot(ring.next_index()), 'b');
    }

    #[test]
    fn test_ring_slot_mut() {
        let mut ring = ParameterRing::new(vec![0u32; 2]);
        let i = ring.advance();
        *ring.slot_mut(i) = 9;
        assert_eq!(*ring.slot(0), 9);
        assert_eq!(ring.depth(), 2);
    }
}
