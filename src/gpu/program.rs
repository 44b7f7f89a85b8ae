//! Compute kernel compilation and uniform parameter handling
//!
//! A [`ComputeProgram`] wraps a WGSL compute kernel compiled into a
//! `wgpu::ComputePipeline`. Compilation never panics: validation errors are
//! captured through wgpu error scopes and the program comes back invalid,
//! with the diagnostic text logged. Callers must check [`is_valid`] before
//! dispatching.
//!
//! [`is_valid`]: ComputeProgram::is_valid

use super::context::GpuContext;

/// A compiled compute kernel plus its scalar uniform parameters
///
/// The kernel must bind its storage data at `@group(0) @binding(0)` and (if
/// it takes parameters) a uniform struct of `f32` fields at
/// `@group(0) @binding(1)`. Parameter names are declared at compile time in
/// struct-field order; values are shadowed CPU-side and re-uploaded in full
/// on every dispatch.
pub struct ComputeProgram {
    // None = compilation or pipeline creation failed
    pipeline: Option<wgpu::ComputePipeline>,
    bind_group_layout: wgpu::BindGroupLayout,
    params_buffer: wgpu::Buffer,
    params: Vec<f32>,
    param_names: Vec<String>,
    local_size: u32,
}

impl ComputeProgram {
    /// Compile a WGSL compute kernel
    ///
    /// `local_size` must match the `@workgroup_size` declared in the kernel
    /// source; the dispatch controller sizes its work-group count from it.
    /// `param_names` lists the kernel's scalar uniform fields in declaration
    /// order (empty slice for kernels without parameters).
    ///
    /// On a compilation or pipeline error this returns an invalid program
    /// (checked via [`Self::is_valid`]) and logs the diagnostic; it never
    /// panics and leaves the device usable.
    pub fn compile(
        ctx: &GpuContext,
        source: &str,
        entry_point: &str,
        param_names: &[&str],
        local_size: u32,
    ) -> Self {
        let device = &ctx.device;

        // Uniform buffers round up to 16-byte slots
        let param_count = param_names.len();
        let padded_len = param_count.next_multiple_of(4).max(4);
        let params = vec![0.0f32; padded_len];

        let params_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Kernel Params Buffer"),
            size: (padded_len * std::mem::size_of::<f32>()) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Kernel Bind Group Layout"),
            entries: &[
                // storage data
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                // scalar params
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let mut program = Self {
            pipeline: None,
            bind_group_layout,
            params_buffer,
            params,
            param_names: param_names.iter().map(|s| s.to_string()).collect(),
            local_size: local_size.max(1),
        };

        // Capture shader translation errors instead of letting them hit the
        // uncaptured-error handler
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Kernel Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            log::error!("Kernel compilation failed: {}", e);
            return program;
        }

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Kernel Pipeline Layout"),
            bind_group_layouts: &[&program.bind_group_layout],
            push_constant_ranges: &[],
        });

        // Entry-point / interface mismatches surface here
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Kernel Compute Pipeline"),
            layout: Some(&pipeline_layout),
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: Default::default(),
            cache: None,
        });
        if let Some(e) = pollster::block_on(device.pop_error_scope()) {
            log::error!("Kernel pipeline creation failed: {}", e);
            return program;
        }

        program.pipeline = Some(pipeline);
        program
    }

    /// True iff compilation and pipeline creation both succeeded
    ///
    /// All other operations assume validity; on an invalid program they are
    /// logged no-ops rather than panics.
    pub fn is_valid(&self) -> bool {
        self.pipeline.is_some()
    }

    /// Set a scalar uniform parameter by name
    ///
    /// Unknown names are a silent no-op, logged at debug level only. The
    /// value takes effect on the next dispatch.
    pub fn set_uniform_float(&mut self, name: &str, value: f32) {
        if !self.is_valid() {
            log::warn!("set_uniform_float({name}) on invalid program");
            return;
        }
        match self.param_names.iter().position(|n| n == name) {
            Some(slot) => self.params[slot] = value,
            None => log::debug!("Uniform '{name}' does not exist; value dropped"),
        }
    }

    /// Push the CPU-side parameter shadow to the GPU
    ///
    /// Called by the dispatch controller before every dispatch; parameters
    /// have no GPU-side lifetime of their own.
    pub(crate) fn upload_params(&self, ctx: &GpuContext) {
        ctx.queue
            .write_buffer(&self.params_buffer, 0, bytemuck::cast_slice(&self.params));
    }

    pub(crate) fn pipeline(&self) -> Option<&wgpu::ComputePipeline> {
        self.pipeline.as_ref()
    }

    pub(crate) fn bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub(crate) fn params_buffer(&self) -> &wgpu::Buffer {
        &self.params_buffer
    }

    /// The `@workgroup_size` the kernel was declared with
    pub fn local_size(&self) -> u32 {
        self.local_size
    }
}
