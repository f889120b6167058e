//! `wgpu` compute backend.
//!
//! Fields live in storage buffers, parameter ring slots in uniform buffers,
//! and every pass is one compute dispatch recorded into a per-frame command
//! encoder. A frame's completion handler runs from
//! `Queue::on_submitted_work_done`, which `wgpu` only fires while the device
//! is polled; the orchestrator polls through [`Backend::poll`] before it
//! blocks on the frame gate.
//!
//! Validation errors raised while recording or submitting a frame are caught
//! with an error scope and reported to that frame's handler.
//!
//! Rendered images come back asynchronously too. `visualize` queues the
//! readback of the current frame and returns the newest image that has
//! already arrived, usually the previous frame's. It only blocks when no
//! image of the current grid size exists yet (the first frame after a
//! resize) or when more than [`MAX_PENDING_IMAGES`] readbacks are queued.

mod field_gpu;
pub mod shaders;

pub use field_gpu::{GpuField, GpuParamSlot, VisualParamsGpu};

use std::collections::VecDeque;
use std::sync::mpsc;

use wgpu::util::DeviceExt;

use crate::backend::{Backend, CompletionHandler, Pass};
use crate::error::{FluidError, FrameError, GpuError};
use crate::field::{FieldFormat, FieldKind, GridSize};
use crate::uniforms::FrameParameters;
use crate::visuals::{Image, VisualStyle};
use field_gpu::{FluidPipelines, PassPipeline};

/// Readbacks allowed in flight before `visualize` waits for the oldest.
pub const MAX_PENDING_IMAGES: usize = 2;

/// A rendered image still on its way back from the GPU.
struct PendingImage {
    staging: wgpu::Buffer,
    size: GridSize,
    submission: wgpu::SubmissionIndex,
    mapped: mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>,
}

/// A headless `wgpu` device and queue.
pub struct GpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
}

impl GpuContext {
    /// Request an adapter and device, blocking until both are ready.
    pub fn new() -> Result<Self, GpuError> {
        pollster::block_on(Self::new_async())
    }

    pub async fn new_async() -> Result<Self, GpuError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("inkflow"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        // Errors outside a frame's error scope would otherwise panic.
        device.on_uncaptured_error(Box::new(|e: wgpu::Error| log::error!("Uncaptured wgpu error: {}", e)));

        log::info!("Using GPU adapter: {}", adapter.get_info().name);
        Ok(Self { adapter, device, queue })
    }

    /// Adapter description for logs.
    pub fn device_info(&self) -> String {
        format!("{:?}", self.adapter.get_info())
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}

/// Runs the fluid passes as WGSL compute shaders.
pub struct GpuBackend {
    ctx: GpuContext,
    pipelines: FluidPipelines,
    /// Commands of the frame being recorded.
    encoder: Option<wgpu::CommandEncoder>,
    frame: u64,
    failure: Option<FrameError>,
    readbacks: VecDeque<PendingImage>,
    latest: Option<Image>,
}

impl GpuBackend {
    pub fn new(ctx: GpuContext) -> Self {
        let pipelines = FluidPipelines::new(&ctx.device);
        Self {
            ctx,
            pipelines,
            encoder: None,
            frame: 0,
            failure: None,
            readbacks: VecDeque::new(),
            latest: None,
        }
    }

    /// Backend on a freshly created headless context.
    pub fn headless() -> Result<Self, FluidError> {
        Ok(Self::new(GpuContext::new()?))
    }

    pub fn context(&self) -> &GpuContext {
        &self.ctx
    }

    /// Read a field's raw cell values back to the host.
    ///
    /// Vector fields come back interleaved (`x0, y0, x1, y1, ...`).
    pub fn read_field(&self, field: &GpuField) -> Result<Vec<f32>, FluidError> {
        let encoder = self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Field Readback Encoder"),
        });
        let bytes = self.read_buffer(encoder, &field.buffer, field.buffer.size())?;
        Ok(bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect())
    }

    /// Finish `encoder` with a copy of `source` into a staging buffer, submit
    /// it and wait for the mapped bytes.
    fn read_buffer(&self, mut encoder: wgpu::CommandEncoder, source: &wgpu::Buffer, size: u64) -> Result<Vec<u8>, FluidError> {
        let staging = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
        self.ctx.queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.ctx.device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?
            .map_err(|e| GpuError::BufferMapping(e.to_string()))?;
        let data = slice.get_mapped_range().to_vec();
        staging.unmap();
        Ok(data)
    }

    /// Readbacks queued by `visualize` that have not arrived yet.
    pub fn pending_images(&self) -> usize {
        self.readbacks.len()
    }

    /// Move every finished readback, in submission order, into `latest`.
    fn collect_images(&mut self) -> Result<(), FluidError> {
        loop {
            let status = match self.readbacks.front() {
                Some(pending) => pending.mapped.try_recv(),
                None => return Ok(()),
            };
            let result = match status {
                Ok(result) => result,
                Err(mpsc::TryRecvError::Empty) => return Ok(()),
                Err(mpsc::TryRecvError::Disconnected) => {
                    self.readbacks.pop_front();
                    return Err(GpuError::BufferMapping("map callback dropped".to_string()).into());
                }
            };
            let Some(pending) = self.readbacks.pop_front() else {
                return Ok(());
            };
            result.map_err(|e| GpuError::BufferMapping(e.to_string()))?;

            let bytes = pending.staging.slice(..).get_mapped_range().to_vec();
            pending.staging.unmap();
            // pack4x8unorm stores R in the low byte, so the little-endian words
            // are already RGBA8 rows.
            let image = Image::from_raw(pending.size.width, pending.size.height, bytes)
                .ok_or_else(|| FluidError::Readback("pixel buffer does not match the grid size".to_string()))?;
            self.latest = Some(image);
        }
    }

    fn fail(&mut self, message: String) {
        if self.failure.is_none() {
            self.failure = Some(FrameError::new(self.frame, message));
        }
    }
}

fn pipeline_for<'a>(pipelines: &'a FluidPipelines, pass: &Pass<'_, GpuField>) -> &'a PassPipeline {
    let p = pipelines;
    match pass {
        Pass::Advect { src, .. } if src.format.is_vector() => &p.advect_vector,
        Pass::Advect { .. } => &p.advect_scalar,
        Pass::ApplyForceVector { .. } => &p.splat_vector,
        Pass::ApplyForceScalar { .. } => &p.splat_scalar,
        Pass::ComputeVorticity { .. } => &p.vorticity,
        Pass::VorticityConfinement { .. } => &p.confinement,
        Pass::ComputeDivergence { .. } => &p.divergence,
        Pass::ComputePressure { .. } => &p.jacobi,
        Pass::SubtractGradient { .. } => &p.subtract_gradient,
    }
}

/// Input buffers, output buffer, and the formats the kernel expects for each
/// (inputs first, output last).
fn pass_bindings<'a>(pass: &'a Pass<'_, GpuField>) -> (Vec<&'a GpuField>, &'a GpuField, Vec<FieldFormat>) {
    use FieldFormat::{Scalar, Vector};
    match pass {
        Pass::Advect { velocity, src, dst } => (vec![*velocity, *src], &**dst, vec![Vector, src.format, src.format]),
        Pass::ApplyForceVector { src, dst } => (vec![*src], &**dst, vec![Vector, Vector]),
        Pass::ApplyForceScalar { src, dst } => (vec![*src], &**dst, vec![Scalar, Scalar]),
        Pass::ComputeVorticity { velocity, dst } => (vec![*velocity], &**dst, vec![Vector, Scalar]),
        Pass::VorticityConfinement { velocity, vorticity, dst } => {
            (vec![*velocity, *vorticity], &**dst, vec![Vector, Scalar, Vector])
        }
        Pass::ComputeDivergence { velocity, dst } => (vec![*velocity], &**dst, vec![Vector, Scalar]),
        Pass::ComputePressure { pressure, divergence, dst } => {
            (vec![*pressure, *divergence], &**dst, vec![Scalar, Scalar, Scalar])
        }
        Pass::SubtractGradient { pressure, velocity, dst } => {
            (vec![*pressure, *velocity], &**dst, vec![Scalar, Vector, Vector])
        }
    }
}

impl Backend for GpuBackend {
    type Field = GpuField;
    type ParamSlot = GpuParamSlot;

    fn name(&self) -> &'static str {
        "gpu"
    }

    fn create_field(&mut self, label: &str, format: FieldFormat, size: GridSize) -> Result<GpuField, FluidError> {
        let bytes = size.byte_size(format);
        let limits = self.ctx.device.limits();
        let max = u64::from(limits.max_storage_buffer_binding_size).min(limits.max_buffer_size);
        if bytes > max {
            return Err(FluidError::Allocation {
                label: label.to_string(),
                bytes,
                reason: format!("exceeds the device storage buffer limit of {} bytes", max),
            });
        }

        self.ctx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let field = GpuField::new(&self.ctx.device, label, format, size);
        match pollster::block_on(self.ctx.device.pop_error_scope()) {
            Some(e) => Err(FluidError::Allocation {
                label: label.to_string(),
                bytes,
                reason: e.to_string(),
            }),
            None => Ok(field),
        }
    }

    fn create_param_slot(&mut self, index: usize) -> Result<GpuParamSlot, FluidError> {
        let buffer = self.ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("Frame Params {}", index)),
            size: std::mem::size_of::<FrameParameters>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(GpuParamSlot { buffer })
    }

    fn write_params(&mut self, slot: &mut GpuParamSlot, params: &FrameParameters) {
        self.ctx.queue.write_buffer(&slot.buffer, 0, bytemuck::bytes_of(params));
    }

    fn begin_frame(&mut self, frame: u64) {
        if self.encoder.take().is_some() {
            log::warn!("Frame {} was never submitted; discarding its commands", self.frame);
            if let Some(e) = pollster::block_on(self.ctx.device.pop_error_scope()) {
                log::warn!("Discarded frame {} had a validation error: {}", self.frame, e);
            }
        }
        self.frame = frame;
        self.failure = None;
        self.ctx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.encoder = Some(self.ctx.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some(&format!("Frame {} Encoder", frame)),
        }));
    }

    fn dispatch(&mut self, params: &GpuParamSlot, pass: Pass<'_, GpuField>) {
        let name = pass.name();
        if self.encoder.is_none() {
            log::warn!("{} dispatched outside a frame; ignored", name);
            return;
        }

        let (inputs, dst, expected) = pass_bindings(&pass);
        let formats_ok = inputs.iter().chain(std::iter::once(&dst)).map(|f| f.format).eq(expected);
        let sizes_ok = inputs.iter().all(|f| f.size == dst.size);
        if !formats_ok || !sizes_ok {
            self.fail(format!("{}: field format or size mismatch", name));
            return;
        }

        let pipeline = pipeline_for(&self.pipelines, &pass);
        let buffers: Vec<&wgpu::Buffer> = inputs.iter().map(|f| &f.buffer).collect();
        let bind_group = pipeline.bind_group(&self.ctx.device, name, &params.buffer, &buffers, &dst.buffer);
        if let Some(encoder) = self.encoder.as_mut() {
            pipeline.dispatch(encoder, name, &bind_group, dst.size);
        }
    }

    fn submit(&mut self, on_complete: CompletionHandler) {
        let Some(encoder) = self.encoder.take() else {
            on_complete(Err(FrameError::new(self.frame, "submit without begin_frame")));
            return;
        };
        self.ctx.queue.submit(Some(encoder.finish()));

        let frame = self.frame;
        let scope_error = pollster::block_on(self.ctx.device.pop_error_scope());
        let failure = self
            .failure
            .take()
            .or_else(|| scope_error.map(|e| FrameError::new(frame, e.to_string())));

        self.ctx.queue.on_submitted_work_done(move || {
            on_complete(match failure {
                Some(e) => Err(e),
                None => Ok(()),
            })
        });
    }

    fn poll(&mut self, wait: bool) {
        let maintain = if wait { wgpu::Maintain::Wait } else { wgpu::Maintain::Poll };
        let _ = self.ctx.device.poll(maintain);
    }

    fn visualize(&mut self, field: &GpuField, kind: FieldKind, style: &VisualStyle) -> Result<Image, FluidError> {
        let size = field.size;
        let device = &self.ctx.device;

        let params = VisualParamsGpu::new(field.format, size, kind, style);
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Visual Params"),
            contents: bytemuck::bytes_of(&params),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let pixel_bytes = size.cells() as u64 * 4;
        let pixels = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Visual Pixels"),
            size: pixel_bytes,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Visual Staging Buffer"),
            size: pixel_bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let pipeline = &self.pipelines.visualize;
        let bind_group = pipeline.bind_group(device, "Visualize Bind Group", &uniform, &[&field.buffer], &pixels);
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Visualize Encoder"),
        });
        pipeline.dispatch(&mut encoder, "Visualize Pass", &bind_group, size);
        encoder.copy_buffer_to_buffer(&pixels, 0, &staging, 0, pixel_bytes);
        let submission = self.ctx.queue.submit(Some(encoder.finish()));

        let (tx, rx) = mpsc::channel();
        staging.slice(..).map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.readbacks.push_back(PendingImage {
            staging,
            size,
            submission,
            mapped: rx,
        });

        // Deliver whatever has finished without waiting on the GPU.
        let _ = self.ctx.device.poll(wgpu::Maintain::Poll);
        self.collect_images()?;

        let current = (size.width, size.height);
        let stale = self.latest.as_ref().map_or(true, |image| image.dimensions() != current);
        let wait_for = if stale {
            self.readbacks.back()
        } else if self.readbacks.len() > MAX_PENDING_IMAGES {
            self.readbacks.front()
        } else {
            None
        };
        if let Some(pending) = wait_for {
            let index = pending.submission.clone();
            let _ = self.ctx.device.poll(wgpu::Maintain::WaitForSubmissionIndex(index));
            self.collect_images()?;
        }

        match &self.latest {
            Some(image) if image.dimensions() == current => Ok(image.clone()),
            _ => Err(FluidError::Readback("no image of the current grid size arrived".to_string())),
        }
    }
}
