/// Image and image-view resources, plus the layout-transition helper used by
/// the uploader and the swapchain depth setup.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;
use std::sync::Mutex;

use crate::vulkan_arena::ImageHandle;

/// Image creation parameters
#[derive(Clone)]
pub struct ImageDesc {
    pub image_type: vk::ImageType,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub location: MemoryLocation,
    pub samples: vk::SampleCountFlags,
    pub initial_layout: vk::ImageLayout,
    pub flags: vk::ImageCreateFlags,
    pub tiling: vk::ImageTiling,
    /// Debug name forwarded to the allocator
    pub name: &'static str,
}

impl Default for ImageDesc {
    fn default() -> Self {
        Self {
            image_type: vk::ImageType::TYPE_2D,
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::SAMPLED,
            location: MemoryLocation::GpuOnly,
            samples: vk::SampleCountFlags::TYPE_1,
            initial_layout: vk::ImageLayout::UNDEFINED,
            flags: vk::ImageCreateFlags::empty(),
            tiling: vk::ImageTiling::OPTIMAL,
            name: "image",
        }
    }
}

/// Vulkan image plus its allocation and creation metadata
pub struct Image {
    pub(crate) image: vk::Image,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) format: vk::Format,
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) depth: u32,
    pub(crate) mip_levels: u32,
    pub(crate) array_layers: u32,
}

impl Image {
    pub(crate) fn create(
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        desc: &ImageDesc,
    ) -> Result<Self> {
        unsafe {
            let create_info = vk::ImageCreateInfo::default()
                .image_type(desc.image_type)
                .extent(vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: desc.depth,
                })
                .mip_levels(desc.mip_levels)
                .array_layers(desc.array_layers)
                .format(desc.format)
                .tiling(desc.tiling)
                .initial_layout(desc.initial_layout)
                .usage(desc.usage)
                .samples(desc.samples)
                .flags(desc.flags)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let image = device.create_image(&create_info, None).map_err(|e| {
                prism_error!(
                    "prism::vulkan",
                    "Failed to create image {}x{} {:?}: {:?}",
                    desc.width,
                    desc.height,
                    desc.format,
                    e
                );
                Error::ResourceCreationFailed(format!("Failed to create image: {:?}", e))
            })?;

            let requirements = device.get_image_memory_requirements(image);

            let allocation = allocator
                .lock()
                .unwrap()
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: desc.location,
                    linear: desc.tiling == vk::ImageTiling::LINEAR,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    prism_error!(
                        "prism::vulkan",
                        "Out of GPU memory for image '{}' ({}x{}, {} layers, {:.2} MB)",
                        desc.name,
                        desc.width,
                        desc.height,
                        desc.array_layers,
                        size_mb
                    );
                    device.destroy_image(image, None);
                    Error::OutOfMemory
                })?;

            device
                .bind_image_memory(image, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to bind image memory: {:?}", e);
                    Error::ResourceCreationFailed(format!("Failed to bind image memory: {:?}", e))
                })?;

            Ok(Self {
                image,
                allocation: Some(allocation),
                format: desc.format,
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
                mip_levels: desc.mip_levels,
                array_layers: desc.array_layers,
            })
        }
    }

    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: self.depth,
        }
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    pub(crate) fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            device.destroy_image(self.image, None);
            self.image = vk::Image::null();
        }
    }
}

/// Image-view creation parameters
#[derive(Clone)]
pub struct ImageViewDesc {
    pub image: ImageHandle,
    pub view_type: vk::ImageViewType,
    pub aspect_mask: vk::ImageAspectFlags,
    pub base_mip_level: u32,
    pub level_count: u32,
    pub base_array_layer: u32,
    pub layer_count: u32,
}

impl ImageViewDesc {
    pub fn color_2d(image: ImageHandle) -> Self {
        Self {
            image,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        }
    }
}

/// View over an arena-owned image
pub struct ImageView {
    pub(crate) image_view: vk::ImageView,
    pub(crate) image: ImageHandle,
    pub(crate) format: vk::Format,
}

impl ImageView {
    pub(crate) fn create(
        device: &ash::Device,
        image: vk::Image,
        format: vk::Format,
        desc: &ImageViewDesc,
    ) -> Result<Self> {
        let image_view = unsafe {
            create_raw_image_view(
                device,
                image,
                format,
                desc.view_type,
                vk::ImageSubresourceRange {
                    aspect_mask: desc.aspect_mask,
                    base_mip_level: desc.base_mip_level,
                    level_count: desc.level_count,
                    base_array_layer: desc.base_array_layer,
                    layer_count: desc.layer_count,
                },
            )?
        };

        Ok(Self {
            image_view,
            image: desc.image,
            format,
        })
    }

    pub fn handle(&self) -> vk::ImageView {
        self.image_view
    }

    /// Arena handle of the viewed image
    pub fn image(&self) -> ImageHandle {
        self.image
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }
}

/// Shared view-creation path, also used for swapchain and depth views that
/// live outside the arena.
pub(crate) unsafe fn create_raw_image_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    view_type: vk::ImageViewType,
    subresource_range: vk::ImageSubresourceRange,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(view_type)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(subresource_range);

    device.create_image_view(&create_info, None).map_err(|e| {
        prism_error!("prism::vulkan", "Failed to create image view: {:?}", e);
        Error::ResourceCreationFailed(format!("Failed to create image view: {:?}", e))
    })
}

/// Record a pipeline barrier that moves `image` from `old_layout` to
/// `new_layout`, deriving access masks from the layouts.
pub(crate) fn transition_image_layout(
    device: &ash::Device,
    cmd: vk::CommandBuffer,
    image: vk::Image,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    subresource_range: vk::ImageSubresourceRange,
    src_stage: vk::PipelineStageFlags,
    dst_stage: vk::PipelineStageFlags,
) {
    let src_access_mask = access_mask_for_layout(old_layout, false);
    let dst_access_mask = access_mask_for_layout(new_layout, true);

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range)
        .src_access_mask(src_access_mask)
        .dst_access_mask(dst_access_mask);

    unsafe {
        device.cmd_pipeline_barrier(
            cmd,
            src_stage,
            dst_stage,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    }
}

/// Access mask a layout implies, on the source or destination side of a barrier
fn access_mask_for_layout(layout: vk::ImageLayout, is_destination: bool) -> vk::AccessFlags {
    match layout {
        vk::ImageLayout::UNDEFINED | vk::ImageLayout::PRESENT_SRC_KHR => vk::AccessFlags::empty(),
        vk::ImageLayout::PREINITIALIZED => vk::AccessFlags::HOST_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL => vk::AccessFlags::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL => vk::AccessFlags::TRANSFER_READ,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL => vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL => {
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        }
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL => {
            if is_destination {
                vk::AccessFlags::SHADER_READ
            } else {
                // Reads need no flush on the source side
                vk::AccessFlags::empty()
            }
        }
        vk::ImageLayout::GENERAL => vk::AccessFlags::SHADER_READ | vk::AccessFlags::SHADER_WRITE,
        _ => vk::AccessFlags::empty(),
    }
}
