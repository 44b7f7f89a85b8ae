//! Storage + staging buffer pair for compute output
//!
//! A [`ComputeBuffer`] owns two GPU regions of identical byte size: the
//! storage region the kernel reads and writes, and a staging region used
//! only to move the result into a display texture without a CPU round trip.

use super::context::GpuContext;

/// Bytes per RGBA pixel at 32-bit float per channel
const BYTES_PER_PIXEL: u64 = 4 * std::mem::size_of::<f32>() as u64;

/// A kernel-visible storage region plus an equally sized transfer-staging region
///
/// The size is fixed at creation and never changes. Both regions live on the
/// GPU; the staging region's contents are undefined until the first
/// [`transfer_to_texture`] overwrites them.
///
/// [`transfer_to_texture`]: ComputeBuffer::transfer_to_texture
pub struct ComputeBuffer {
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    size_bytes: u64,
    len: usize,
}

impl ComputeBuffer {
    /// Allocate both regions and seed the storage region with `initial_data`
    pub fn new(ctx: &GpuContext, initial_data: &[f32]) -> Self {
        let device = &ctx.device;
        let size_bytes = std::mem::size_of_val(initial_data) as u64;

        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Compute Storage Buffer"),
            size: size_bytes,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_SRC
                | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        ctx.queue
            .write_buffer(&storage, 0, bytemuck::cast_slice(initial_data));

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Compute Staging Buffer"),
            size: size_bytes,
            usage: wgpu::BufferUsages::COPY_SRC | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        log::debug!("Created compute buffer: {} floats", initial_data.len());

        Self {
            storage,
            staging,
            size_bytes,
            len: initial_data.len(),
        }
    }

    /// Move the storage contents into `texture` entirely on the GPU
    ///
    /// Records storage -> staging -> texture copies in one command buffer and
    /// submits it; nothing is mapped and the CPU never sees the data. The
    /// texture must be `Rgba32Float` with `COPY_DST` usage.
    ///
    /// Preconditions (checked in debug builds, undefined at the wgpu
    /// validation layer otherwise): `width * height * 4` floats must equal
    /// the buffer size, and `width` must be a multiple of 16 so the row
    /// pitch meets wgpu's 256-byte copy alignment.
    pub fn transfer_to_texture(
        &self,
        ctx: &GpuContext,
        texture: &wgpu::Texture,
        width: u32,
        height: u32,
    ) {
        let bytes_per_row = width as u64 * BYTES_PER_PIXEL;
        debug_assert_eq!(
            width as u64 * height as u64 * BYTES_PER_PIXEL,
            self.size_bytes,
            "texture dimensions do not cover the buffer"
        );
        debug_assert_eq!(
            bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as u64,
            0,
            "row pitch must be 256-byte aligned"
        );

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Transfer Encoder"),
            });

        encoder.copy_buffer_to_buffer(&self.storage, 0, &self.staging, 0, self.size_bytes);
        encoder.copy_buffer_to_texture(
            wgpu::TexelCopyBufferInfo {
                buffer: &self.staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Copy the storage region back to the CPU, blocking until it arrives
    ///
    /// Test and benchmark support; the render path never reads back.
    pub fn read_back(&self, ctx: &GpuContext) -> Vec<f32> {
        let download = ctx.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: self.size_bytes,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_buffer_to_buffer(&self.storage, 0, &download, 0, self.size_bytes);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let slice = download.slice(..);
        slice.map_async(wgpu::MapMode::Read, |_| {});
        let _ = ctx.device.poll(wgpu::Maintain::Wait);

        let data = slice.get_mapped_range();
        let result: Vec<f32> = bytemuck::cast_slice(&data).to_vec();
        drop(data);
        download.unmap();
        result
    }

    /// Bind the storage region into a compute bind group
    pub(crate) fn storage_binding(&self) -> wgpu::BindingResource<'_> {
        self.storage.as_entire_binding()
    }

    /// Number of `f32` elements in the storage region
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Byte size of each region
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}
