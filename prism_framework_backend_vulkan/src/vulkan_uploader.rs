/// Staging buffers and batched uploads
///
/// A BatchUploader records every upload of one loading batch into a single
/// transfer command buffer. Source bytes are bump-allocated into host-visible
/// staging buffers; buffers that fill up stay alive on a stack until the
/// batch is submitted, because the command buffer references their memory.
/// Acceleration-structure builds are queued and recorded as one consolidated
/// build command at submit time, which keeps pipeline barriers to a minimum.
///
/// Each uploader is single-use: `submit` consumes it, blocks until the device
/// has finished the batch, then releases every staging resource.

use ash::vk;
use gpu_allocator::MemoryLocation;
use prism_framework::prism::{Error, Result};
use prism_framework::{prism_error, prism_warn};

use crate::vulkan_arena::{AccelerationStructureHandle, BufferHandle, ImageHandle};
use crate::vulkan_backend::Backend;
use crate::vulkan_buffer::{aligned_size, Buffer, BufferDesc};
use crate::vulkan_command::WorkerId;
use crate::vulkan_image::transition_image_layout;

/// Default capacity of one staging buffer; oversized uploads get a dedicated
/// buffer of exactly their size instead of stranding chunk capacity.
const STAGING_CHUNK_SIZE: vk::DeviceSize = 16 * 1024 * 1024;

/// Copy offsets handed to the device must satisfy texel alignment rules;
/// 16 covers every format this backend uploads.
const STAGING_ALIGNMENT: vk::DeviceSize = 16;

/// Host-visible bump allocator. The offset only ever grows; a full buffer is
/// replaced, never resized.
struct StagingBuffer {
    buffer: Buffer,
    total: vk::DeviceSize,
    offset: vk::DeviceSize,
}

impl StagingBuffer {
    fn create(backend: &Backend, size: vk::DeviceSize) -> Result<Self> {
        let buffer = Buffer::create(
            backend.device(),
            backend.allocator_ref(),
            &BufferDesc {
                usage: vk::BufferUsageFlags::TRANSFER_SRC,
                size,
                alignment: None,
                location: MemoryLocation::CpuToGpu,
                name: "staging",
            },
            None,
        )?;

        Ok(Self {
            buffer,
            total: size,
            offset: 0,
        })
    }

    fn fits(&self, size: vk::DeviceSize) -> bool {
        aligned_size(self.offset, STAGING_ALIGNMENT) + size <= self.total
    }

    /// Copy `data` into the mapped region and return its offset from the
    /// start of the buffer. The caller must have checked `fits`.
    fn insert_data(&mut self, data: &[u8]) -> Result<vk::DeviceSize> {
        let offset = aligned_size(self.offset, STAGING_ALIGNMENT);
        debug_assert!(offset + data.len() as vk::DeviceSize <= self.total);

        self.buffer.upload_data(data, offset)?;
        self.offset = offset + data.len() as vk::DeviceSize;
        Ok(offset)
    }
}

/// A queued bottom-level build, recorded at submit time
struct BlasBuildRequest {
    target: AccelerationStructureHandle,
    geometries: Vec<vk::AccelerationStructureGeometryKHR<'static>>,
    build_ranges: Vec<vk::AccelerationStructureBuildRangeInfoKHR>,
}

/// Records one batch of uploads and acceleration-structure builds
pub struct BatchUploader {
    worker: WorkerId,
    pool: vk::CommandPool,
    cmd: vk::CommandBuffer,
    staging: Vec<StagingBuffer>,
    blas_requests: Vec<BlasBuildRequest>,
}

impl BatchUploader {
    /// Allocate and begin the batch's transfer command buffer.
    pub fn begin(backend: &Backend, worker: WorkerId) -> Result<Self> {
        let pool = backend.transfer_command_pool(worker)?;

        let cmd = unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let cmd = backend
                .device()
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to allocate upload command buffer: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to allocate command buffer: {:?}",
                        e
                    ))
                })?[0];

            let begin_info = vk::CommandBufferBeginInfo::default()
                .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            backend
                .device()
                .begin_command_buffer(cmd, &begin_info)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to begin upload command buffer: {:?}", e))
                })?;
            cmd
        };

        Ok(Self {
            worker,
            pool,
            cmd,
            staging: Vec::new(),
            blas_requests: Vec::new(),
        })
    }

    /// The worker this uploader records on behalf of
    pub fn worker(&self) -> WorkerId {
        self.worker
    }

    /// Make sure the top staging buffer can take `size` more bytes; full
    /// buffers are kept on the stack since the command buffer references them.
    fn ensure_staging(&mut self, backend: &Backend, size: vk::DeviceSize) -> Result<()> {
        if self.staging.last().map_or(true, |s| !s.fits(size)) {
            let capacity = size.max(STAGING_CHUNK_SIZE);
            self.staging.push(StagingBuffer::create(backend, capacity)?);
        }
        Ok(())
    }

    /// Stage `data` and record a copy into `buffer` at `offset`.
    pub fn upload_buffer_data(
        &mut self,
        backend: &Backend,
        buffer: BufferHandle,
        data: &[u8],
        offset: vk::DeviceSize,
    ) -> Result<()> {
        let dst = backend
            .arena()
            .buffers
            .get(buffer)
            .ok_or_else(|| Error::InvalidResource("stale buffer handle in upload".to_string()))?;

        if offset + data.len() as vk::DeviceSize > dst.size() {
            return Err(Error::InvalidResource(format!(
                "upload of {} bytes at offset {} exceeds destination size {}",
                data.len(),
                offset,
                dst.size()
            )));
        }

        self.ensure_staging(backend, data.len() as vk::DeviceSize)?;
        let staging = self.staging.last_mut().expect("ensured above");
        let src_offset = staging.insert_data(data)?;

        let region = vk::BufferCopy {
            src_offset,
            dst_offset: offset,
            size: data.len() as vk::DeviceSize,
        };

        unsafe {
            backend.device().cmd_copy_buffer(
                self.cmd,
                staging.buffer.handle(),
                dst.handle(),
                &[region],
            );
        }

        Ok(())
    }

    /// Stage `data` and record per-mip copies into `image`, bracketed by the
    /// layout transitions from `src_layout` to transfer-destination and on to
    /// `dst_layout`.
    ///
    /// `data` holds the tightly packed mip chain for every array layer in
    /// layer-major order; `mip_level_sizes[m]` is the byte size of mip `m`
    /// for one layer.
    pub fn upload_image_data(
        &mut self,
        backend: &Backend,
        image: ImageHandle,
        data: &[u8],
        mip_level_sizes: &[vk::DeviceSize],
        src_layout: vk::ImageLayout,
        dst_layout: vk::ImageLayout,
    ) -> Result<()> {
        let (image_vk, extent, mip_levels, array_layers) = {
            let img = backend.arena().images.get(image).ok_or_else(|| {
                Error::InvalidResource("stale image handle in upload".to_string())
            })?;
            (img.handle(), img.extent(), img.mip_levels(), img.array_layers())
        };

        if mip_level_sizes.len() != mip_levels as usize {
            return Err(Error::InvalidResource(format!(
                "expected {} mip level sizes, got {}",
                mip_levels,
                mip_level_sizes.len()
            )));
        }

        let per_layer: vk::DeviceSize = mip_level_sizes.iter().sum();
        if per_layer * array_layers as vk::DeviceSize > data.len() as vk::DeviceSize {
            return Err(Error::InvalidResource(format!(
                "image upload needs {} bytes, got {}",
                per_layer * array_layers as vk::DeviceSize,
                data.len()
            )));
        }

        let full_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: array_layers,
        };

        transition_image_layout(
            backend.device(),
            self.cmd,
            image_vk,
            src_layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            full_range,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        );

        let mut data_offset = 0usize;
        for layer in 0..array_layers {
            for (mip, &mip_size) in mip_level_sizes.iter().enumerate() {
                let bytes = &data[data_offset..data_offset + mip_size as usize];
                data_offset += mip_size as usize;

                self.ensure_staging(backend, mip_size)?;
                let staging = self.staging.last_mut().expect("ensured above");
                let src_offset = staging.insert_data(bytes)?;

                let region = vk::BufferImageCopy {
                    buffer_offset: src_offset,
                    buffer_row_length: 0,
                    buffer_image_height: 0,
                    image_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: mip as u32,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                    image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
                    image_extent: vk::Extent3D {
                        width: (extent.width >> mip).max(1),
                        height: (extent.height >> mip).max(1),
                        depth: (extent.depth >> mip).max(1),
                    },
                };

                unsafe {
                    backend.device().cmd_copy_buffer_to_image(
                        self.cmd,
                        staging.buffer.handle(),
                        image_vk,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        &[region],
                    );
                }
            }
        }

        transition_image_layout(
            backend.device(),
            self.cmd,
            image_vk,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            dst_layout,
            full_range,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::ALL_COMMANDS,
        );

        Ok(())
    }

    /// Queue a bottom-level build. Nothing is recorded until `submit`.
    pub fn build_blas(
        &mut self,
        acceleration_structure: AccelerationStructureHandle,
        geometries: Vec<vk::AccelerationStructureGeometryKHR<'static>>,
        build_ranges: Vec<vk::AccelerationStructureBuildRangeInfoKHR>,
    ) {
        self.blas_requests.push(BlasBuildRequest {
            target: acceleration_structure,
            geometries,
            build_ranges,
        });
    }

    /// End the batch, submit it on the transfer queue and block until the
    /// device is done; all staging memory is released before returning.
    pub fn submit(mut self, backend: &Backend) -> Result<()> {
        let device = backend.device();

        // Scratch buffers must stay alive until the fence signals
        let mut scratch_buffers: Vec<Buffer> = Vec::new();

        if !self.blas_requests.is_empty() {
            let loader = backend.acceleration_structure_loader().ok_or_else(|| {
                Error::InvalidResource(
                    "acceleration-structure build queued but ray tracing is not enabled".to_string(),
                )
            })?;

            let scratch_alignment = backend
                .acceleration_structure_properties()
                .map(|p| p.min_acceleration_structure_scratch_offset_alignment as vk::DeviceSize)
                .unwrap_or(256);

            let mut build_infos = Vec::with_capacity(self.blas_requests.len());
            for request in &self.blas_requests {
                let target = backend
                    .arena()
                    .acceleration_structures
                    .get(request.target)
                    .ok_or_else(|| {
                        Error::InvalidResource(
                            "stale acceleration structure handle in build".to_string(),
                        )
                    })?;

                let scratch = Buffer::create(
                    device,
                    backend.allocator_ref(),
                    &BufferDesc {
                        usage: vk::BufferUsageFlags::STORAGE_BUFFER
                            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                        size: target.build_sizes().build_scratch_size,
                        alignment: Some(scratch_alignment),
                        location: MemoryLocation::GpuOnly,
                        name: "blas_scratch",
                    },
                    None,
                )?;
                let scratch_address = scratch
                    .device_address()
                    .expect("scratch buffer created with SHADER_DEVICE_ADDRESS");
                scratch_buffers.push(scratch);

                build_infos.push(
                    vk::AccelerationStructureBuildGeometryInfoKHR::default()
                        .ty(target.ty())
                        .flags(target.flags())
                        .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                        .dst_acceleration_structure(target.handle())
                        .geometries(&request.geometries)
                        .scratch_data(vk::DeviceOrHostAddressKHR {
                            device_address: scratch_address,
                        }),
                );
            }

            let range_slices: Vec<&[vk::AccelerationStructureBuildRangeInfoKHR]> = self
                .blas_requests
                .iter()
                .map(|r| r.build_ranges.as_slice())
                .collect();

            // One consolidated build for the whole batch
            unsafe {
                loader.cmd_build_acceleration_structures(self.cmd, &build_infos, &range_slices);
            }
        }

        unsafe {
            device.end_command_buffer(self.cmd).map_err(|e| {
                Error::BackendError(format!("Failed to end upload command buffer: {:?}", e))
            })?;

            let fence = device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| {
                    Error::ResourceCreationFailed(format!("Failed to create upload fence: {:?}", e))
                })?;

            let command_buffers = [self.cmd];
            let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

            let submit_result = device
                .queue_submit(backend.transfer_queue(), &[submit_info], fence)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Upload batch submission rejected: {:?}", e);
                    Error::SubmissionError(format!("Upload batch submission rejected: {:?}", e))
                });

            let wait_result = if submit_result.is_ok() {
                device
                    .wait_for_fences(&[fence], true, u64::MAX)
                    .map_err(|e| {
                        Error::SubmissionError(format!("Upload fence wait failed: {:?}", e))
                    })
            } else {
                Ok(())
            };

            device.destroy_fence(fence, None);
            device.free_command_buffers(self.pool, &[self.cmd]);

            // Device is done (or the submit never happened): release staging
            for mut staging in self.staging.drain(..) {
                staging.buffer.destroy(device, backend.allocator_ref());
            }
            for mut scratch in scratch_buffers {
                scratch.destroy(device, backend.allocator_ref());
            }

            submit_result?;
            wait_result?;
        }

        Ok(())
    }
}

impl Drop for BatchUploader {
    fn drop(&mut self) {
        // submit() drains the staging stack; anything left here means the
        // uploader was dropped without submitting and its memory leaks.
        if !self.staging.is_empty() {
            prism_warn!(
                "prism::vulkan",
                "BatchUploader dropped without submit(); {} staging buffer(s) leaked",
                self.staging.len()
            );
        }
    }
}
