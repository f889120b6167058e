//! GPU resources and compute pipelines for 2D fluid fields.

use bytemuck::{Pod, Zeroable};

use super::shaders;
use crate::field::{FieldFormat, FieldKind, GridSize};
use crate::visuals::VisualStyle;

/// GPU state for one slab buffer.
#[derive(Debug)]
pub struct GpuField {
    pub buffer: wgpu::Buffer,
    pub format: FieldFormat,
    pub size: GridSize,
}

impl GpuField {
    pub fn new(device: &wgpu::Device, label: &str, format: FieldFormat, size: GridSize) -> Self {
        // wgpu zero-initializes new buffers.
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: size.byte_size(format),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Self { buffer, format, size }
    }
}

/// One frame-parameter ring slot: a uniform buffer holding `FrameParameters`.
#[derive(Debug)]
pub struct GpuParamSlot {
    pub buffer: wgpu::Buffer,
}

/// Visualizer parameters, uploaded as a uniform.
///
/// Layout must match `struct VisualParams` in the visualize shader (64 bytes).
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct VisualParamsGpu {
    pub background: [f32; 4],
    pub positive: [f32; 4],
    pub negative: [f32; 4],
    pub grid_size: [u32; 2],
    pub scale: f32,
    /// 0 = scalar, 1 = vector, 2 = scalar as `(w, 0)`, 3 = vector magnitude
    pub mode: u32,
}

impl VisualParamsGpu {
    pub fn new(format: FieldFormat, size: GridSize, kind: FieldKind, style: &VisualStyle) -> Self {
        let mode = match (format, kind.is_vector_like()) {
            (FieldFormat::Scalar, false) => 0,
            (FieldFormat::Vector, true) => 1,
            (FieldFormat::Scalar, true) => 2,
            (FieldFormat::Vector, false) => 3,
        };
        Self {
            background: style.background.to_array(),
            positive: style.positive.to_array(),
            negative: style.negative.to_array(),
            grid_size: [size.width, size.height],
            scale: style.scale_for(kind),
            mode,
        }
    }
}

/// A compute pipeline plus the layout its bind groups are built against.
///
/// Layout: binding 0 is a uniform, bindings `1..=inputs` are read-only
/// storage, binding `inputs + 1` is the read-write output.
#[derive(Debug)]
pub struct PassPipeline {
    pub pipeline: wgpu::ComputePipeline,
    pub layout: wgpu::BindGroupLayout,
    pub inputs: u32,
}

impl PassPipeline {
    pub fn bind_group(
        &self,
        device: &wgpu::Device,
        label: &str,
        uniform: &wgpu::Buffer,
        inputs: &[&wgpu::Buffer],
        output: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        debug_assert_eq!(inputs.len() as u32, self.inputs);
        let mut entries = Vec::with_capacity(inputs.len() + 2);
        entries.push(wgpu::BindGroupEntry {
            binding: 0,
            resource: uniform.as_entire_binding(),
        });
        for (i, buffer) in inputs.iter().enumerate() {
            entries.push(wgpu::BindGroupEntry {
                binding: i as u32 + 1,
                resource: buffer.as_entire_binding(),
            });
        }
        entries.push(wgpu::BindGroupEntry {
            binding: self.inputs + 1,
            resource: output.as_entire_binding(),
        });

        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout: &self.layout,
            entries: &entries,
        })
    }

    /// Record one dispatch covering a `size` grid.
    pub fn dispatch(&self, encoder: &mut wgpu::CommandEncoder, label: &str, bind_group: &wgpu::BindGroup, size: GridSize) {
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some(label),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.dispatch_workgroups(
            size.width.div_ceil(shaders::WORKGROUP_SIZE),
            size.height.div_ceil(shaders::WORKGROUP_SIZE),
            1,
        );
    }
}

/// Every pipeline the GPU backend dispatches.
#[derive(Debug)]
pub struct FluidPipelines {
    pub advect_vector: PassPipeline,
    pub advect_scalar: PassPipeline,
    pub splat_vector: PassPipeline,
    pub splat_scalar: PassPipeline,
    pub vorticity: PassPipeline,
    pub confinement: PassPipeline,
    pub divergence: PassPipeline,
    pub jacobi: PassPipeline,
    pub subtract_gradient: PassPipeline,
    pub visualize: PassPipeline,
}

impl FluidPipelines {
    pub fn new(device: &wgpu::Device) -> Self {
        let pass = |label: &str, body: &str, inputs: u32| {
            create_pass_pipeline(device, label, &shaders::compose(body), inputs)
        };
        Self {
            advect_vector: pass("Advect Vector", shaders::ADVECT_VECTOR, 2),
            advect_scalar: pass("Advect Scalar", shaders::ADVECT_SCALAR, 2),
            splat_vector: pass("Apply Force Vector", shaders::SPLAT_VECTOR, 1),
            splat_scalar: pass("Apply Force Scalar", shaders::SPLAT_SCALAR, 1),
            vorticity: pass("Compute Vorticity", shaders::VORTICITY, 1),
            confinement: pass("Vorticity Confinement", shaders::CONFINEMENT, 2),
            divergence: pass("Compute Divergence", shaders::DIVERGENCE, 1),
            jacobi: pass("Compute Pressure", shaders::JACOBI, 2),
            subtract_gradient: pass("Subtract Gradient", shaders::SUBTRACT_GRADIENT, 2),
            visualize: create_pass_pipeline(device, "Visualize", shaders::VISUALIZE, 1),
        }
    }
}

fn buffer_entry(binding: u32, ty: wgpu::BufferBindingType) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compile `source` and build its pipeline with the standard pass layout.
pub fn create_pass_pipeline(device: &wgpu::Device, label: &str, source: &str, inputs: u32) -> PassPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(&format!("{} Shader", label)),
        source: wgpu::ShaderSource::Wgsl(source.into()),
    });

    let mut entries = vec![buffer_entry(0, wgpu::BufferBindingType::Uniform)];
    for binding in 1..=inputs {
        entries.push(buffer_entry(binding, wgpu::BufferBindingType::Storage { read_only: true }));
    }
    entries.push(buffer_entry(inputs + 1, wgpu::BufferBindingType::Storage { read_only: false }));

    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(&format!("{} Bind Group Layout", label)),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(&format!("{} Pipeline Layout", label)),
        bind_group_layouts: &[&layout],
        push_constant_ranges: &[],
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(&format!("{} Pipeline", label)),
        layout: Some(&pipeline_layout),
        module: &shader,
        entry_point: Some("main"),
        compilation_options: Default::default(),
        cache: None,
    });

    PassPipeline {
        pipeline,
        layout,
        inputs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visual_params_layout() {
        // Must match the WGSL struct.
        assert_eq!(std::mem::size_of::<VisualParamsGpu>(), 64);
    }

    #[test]
    fn test_visual_mode_selection() {
        let size = GridSize::new(4, 4).unwrap();
        let style = VisualStyle::default();
        let mode = |format, kind| VisualParamsGpu::new(format, size, kind, &style).mode;
        assert_eq!(mode(FieldFormat::Scalar, FieldKind::Density), 0);
        assert_eq!(mode(FieldFormat::Vector, FieldKind::Velocity), 1);
        assert_eq!(mode(FieldFormat::Scalar, FieldKind::Vorticity), 2);
        assert_eq!(mode(FieldFormat::Vector, FieldKind::Pressure), 3);
    }
}
