/// Swapchain negotiation and the default presentation chain
///
/// Owns the presentation images, their views, the shared depth buffer, the
/// default render pass and one framebuffer per swap image. The whole state is
/// replaced wholesale on recreation (resize, out-of-date surface); it is
/// never patched incrementally.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;
use prism_framework::prism::{Error, Result};
use prism_framework::{prism_debug, prism_error};
use std::sync::Mutex;

use crate::vulkan_device::{QueueInfos, SwapChainSupportDetails};
use crate::vulkan_image::{create_raw_image_view, Image, ImageDesc};

// ===== NEGOTIATION =====

/// Prefer the 32-bit BGRA format matching the srgb request, else take the
/// first format the surface offers.
pub(crate) fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    srgb: bool,
) -> vk::SurfaceFormatKHR {
    let preferred = if srgb {
        vk::Format::B8G8R8A8_SRGB
    } else {
        vk::Format::B8G8R8A8_UNORM
    };

    available
        .iter()
        .find(|f| {
            f.format == preferred && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .unwrap_or(available[0])
}

/// Low-latency modes are only worth tearing/extra buffering when vsync is
/// off; FIFO is the one mode every implementation must support.
pub(crate) fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    vsync: bool,
) -> vk::PresentModeKHR {
    if !vsync {
        for candidate in [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE] {
            if available.contains(&candidate) {
                return candidate;
            }
        }
    }
    vk::PresentModeKHR::FIFO
}

/// The surface dictates the extent unless it reports "any size allowed"
/// (u32::MAX), in which case the framebuffer size is clamped into range.
pub(crate) fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_extent: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: framebuffer_extent.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: framebuffer_extent.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// min + 1 for triple-buffering headroom, clamped to the reported maximum
/// (0 means "no maximum").
pub(crate) fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}

/// First candidate format supporting `features` with the given tiling
pub(crate) fn find_supported_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            _ => props.optimal_tiling_features.contains(features),
        }
    })
}

pub(crate) fn find_depth_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
) -> Result<vk::Format> {
    find_supported_format(
        instance,
        physical_device,
        &[
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ],
        vk::ImageTiling::OPTIMAL,
        vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
    )
    .ok_or_else(|| Error::InitializationFailed("No supported depth format found".to_string()))
}

// ===== SWAPCHAIN STATE =====

pub(crate) struct SwapchainConfig {
    pub vsync: bool,
    pub srgb: bool,
    /// Fallback used when the surface reports "any size allowed"
    pub framebuffer_extent: vk::Extent2D,
}

/// The complete presentation chain for one surface
pub(crate) struct SwapchainState {
    swapchain_loader: ash::khr::swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub depth_format: vk::Format,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    depth_image: Image,
    pub depth_view: vk::ImageView,
    pub render_pass: vk::RenderPass,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainState {
    pub(crate) fn create(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        allocator: &Mutex<Allocator>,
        surface: vk::SurfaceKHR,
        support: &SwapChainSupportDetails,
        queue_infos: &QueueInfos,
        config: &SwapchainConfig,
    ) -> Result<Self> {
        let surface_format = choose_surface_format(&support.formats, config.srgb);
        let present_mode = choose_present_mode(&support.present_modes, config.vsync);
        let extent = choose_extent(&support.capabilities, config.framebuffer_extent);
        let image_count = choose_image_count(&support.capabilities);

        prism_debug!(
            "prism::vulkan",
            "Swapchain: {:?} {:?}, {}x{}, {} images, present mode {:?}",
            surface_format.format,
            surface_format.color_space,
            extent.width,
            extent.height,
            image_count,
            present_mode
        );

        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        // Concurrent sharing only when graphics and presentation come from
        // different families.
        let family_indices = [
            queue_infos.graphics_queue_index,
            queue_infos.presentation_queue_index,
        ];
        if family_indices[0] != family_indices[1] {
            create_info = create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices);
        } else {
            create_info = create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE);
        }

        let swapchain_loader = ash::khr::swapchain::Device::new(instance, device);
        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to create swapchain: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
                })?
        };

        let images = unsafe {
            swapchain_loader.get_swapchain_images(swapchain).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to get swapchain images: {:?}", e);
                Error::InitializationFailed(format!("Failed to get swapchain images: {:?}", e))
            })?
        };

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view = unsafe {
                create_raw_image_view(
                    device,
                    image,
                    surface_format.format,
                    vk::ImageViewType::TYPE_2D,
                    vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    },
                )?
            };
            image_views.push(view);
        }

        // Shared depth buffer sized to the chain
        let depth_format = find_depth_format(instance, physical_device)?;
        let depth_image = Image::create(
            device,
            allocator,
            &ImageDesc {
                width: extent.width,
                height: extent.height,
                format: depth_format,
                usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                location: MemoryLocation::GpuOnly,
                name: "swapchain_depth",
                ..Default::default()
            },
        )?;
        let depth_view = unsafe {
            create_raw_image_view(
                device,
                depth_image.handle(),
                depth_format,
                vk::ImageViewType::TYPE_2D,
                vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::DEPTH,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
            )?
        };

        let render_pass =
            create_default_render_pass(device, surface_format.format, depth_format)?;

        let mut framebuffers = Vec::with_capacity(image_views.len());
        for &view in &image_views {
            let attachments = [view, depth_view];
            let fb_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = unsafe {
                device.create_framebuffer(&fb_info, None).map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to create swapchain framebuffer: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create framebuffer: {:?}", e))
                })?
            };
            framebuffers.push(framebuffer);
        }

        Ok(Self {
            swapchain_loader,
            swapchain,
            surface_format,
            present_mode,
            extent,
            depth_format,
            images,
            image_views,
            depth_image,
            depth_view,
            render_pass,
            framebuffers,
        })
    }

    pub(crate) fn loader(&self) -> &ash::khr::swapchain::Device {
        &self.swapchain_loader
    }

    pub(crate) fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    /// Tear the chain down in dependency order. The device must be idle;
    /// recreation runs `create` again afterwards. Safe to call twice (drop
    /// after a failed recreation): handles are nulled once destroyed.
    pub(crate) fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        if self.swapchain == vk::SwapchainKHR::null() {
            return;
        }
        unsafe {
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            self.framebuffers.clear();

            for &view in &self.image_views {
                device.destroy_image_view(view, None);
            }
            self.image_views.clear();

            device.destroy_image_view(self.depth_view, None);
            self.depth_view = vk::ImageView::null();
            self.depth_image.destroy(device, allocator);

            device.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();

            // Swap images are owned by the swapchain itself
            self.images.clear();
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.swapchain = vk::SwapchainKHR::null();
        }
    }
}

/// Color attachment cleared on load and handed to the presentation engine,
/// plus the shared depth attachment.
fn create_default_render_pass(
    device: &ash::Device,
    color_format: vk::Format,
    depth_format: vk::Format,
) -> Result<vk::RenderPass> {
    let attachments = [
        vk::AttachmentDescription {
            format: color_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            ..Default::default()
        },
        vk::AttachmentDescription {
            format: depth_format,
            samples: vk::SampleCountFlags::TYPE_1,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
            stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::UNDEFINED,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            ..Default::default()
        },
    ];

    let color_ref = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };

    let subpasses = [vk::SubpassDescription::default()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_ref)
        .depth_stencil_attachment(&depth_ref)];

    let dependencies = [vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
            | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        src_access_mask: vk::AccessFlags::empty(),
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE
            | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
        ..Default::default()
    }];

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);

    unsafe {
        device.create_render_pass(&create_info, None).map_err(|e| {
            prism_error!("prism::vulkan", "Failed to create swapchain render pass: {:?}", e);
            Error::InitializationFailed(format!("Failed to create render pass: {:?}", e))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "vulkan_swapchain_tests.rs"]
mod tests;
