//! Error types for inkflow.
//!
//! Construction and configuration problems surface synchronously as
//! [`FluidError`]. Failures of a single submitted frame are reported as
//! [`FrameError`] to the frame's completion handler and never interrupt the
//! next `tick()`.

use std::fmt;

/// Errors that can occur during GPU initialization.
#[derive(Debug)]
pub enum GpuError {
    /// No compatible GPU adapter found.
    NoAdapter,
    /// Failed to create GPU device.
    DeviceCreation(wgpu::RequestDeviceError),
    /// Failed to map buffer for reading.
    BufferMapping(String),
}

impl fmt::Display for GpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GpuError::NoAdapter => write!(f, "No compatible GPU adapter found. Ensure your system has a GPU with WebGPU/Vulkan/Metal/DX12 support."),
            GpuError::DeviceCreation(e) => write!(f, "Failed to create GPU device: {}", e),
            GpuError::BufferMapping(msg) => write!(f, "Failed to map GPU buffer: {}", msg),
        }
    }
}

impl std::error::Error for GpuError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GpuError::DeviceCreation(e) => Some(e),
            _ => None,
        }
    }
}

impl From<wgpu::RequestDeviceError> for GpuError {
    fn from(e: wgpu::RequestDeviceError) -> Self {
        GpuError::DeviceCreation(e)
    }
}

/// Errors returned by construction, resize and tick.
#[derive(Debug)]
pub enum FluidError {
    /// Grid dimensions with a zero side.
    InvalidGrid { width: u32, height: u32 },
    /// Frame parameter ring must hold at least one slot.
    InvalidRingDepth(usize),
    /// A tunable is outside its valid range.
    InvalidConfig(String),
    /// `tick()` was called before the first `resize()`.
    NotInitialized,
    /// The backend could not allocate storage for a field.
    Allocation {
        label: String,
        bytes: u64,
        reason: String,
    },
    /// GPU initialization failed.
    Gpu(GpuError),
    /// Reading the rendered image back from the backend failed.
    Readback(String),
}

impl fmt::Display for FluidError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FluidError::InvalidGrid { width, height } => {
                write!(f, "Invalid grid size {}x{}: both dimensions must be non-zero", width, height)
            }
            FluidError::InvalidRingDepth(depth) => {
                write!(f, "Invalid frame ring depth {}: at least one slot is required", depth)
            }
            FluidError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            FluidError::NotInitialized => {
                write!(f, "Simulation has no grid yet. Call resize() before the first tick().")
            }
            FluidError::Allocation { label, bytes, reason } => {
                write!(f, "Failed to allocate {} bytes for '{}': {}", bytes, label, reason)
            }
            FluidError::Gpu(e) => write!(f, "GPU error: {}", e),
            FluidError::Readback(msg) => write!(f, "Failed to read back image: {}", msg),
        }
    }
}

impl std::error::Error for FluidError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FluidError::Gpu(e) => Some(e),
            _ => None,
        }
    }
}

impl From<GpuError> for FluidError {
    fn from(e: GpuError) -> Self {
        FluidError::Gpu(e)
    }
}

/// A transient failure of one submitted frame.
///
/// Delivered to the frame's completion handler. The orchestrator logs it and
/// keeps going; whatever swaps already happened stay in place.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameError {
    /// Frame index the failure belongs to.
    pub frame: u64,
    /// Human readable cause.
    pub message: String,
}

impl FrameError {
    pub fn new(frame: u64, message: impl Into<String>) -> Self {
        Self {
            frame,
            message: message.into(),
        }
    }
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Frame {} failed: {}", self.frame, self.message)
    }
}

impl std::error::Error for FrameError {}
