/// Render pass and framebuffer resources (caller-created; the swapchain's
/// default pass lives in vulkan_swapchain.rs)

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;

use crate::vulkan_arena::{ImageViewHandle, RenderPassHandle};

/// One subpass of a render pass; attachment references index into the
/// desc's attachment list.
#[derive(Clone, Default)]
pub struct SubpassDesc {
    pub color_attachments: Vec<vk::AttachmentReference>,
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
    pub input_attachments: Vec<vk::AttachmentReference>,
}

/// Render pass creation parameters
#[derive(Clone, Default)]
pub struct RenderPassDesc {
    pub attachments: Vec<vk::AttachmentDescription>,
    pub subpasses: Vec<SubpassDesc>,
    pub dependencies: Vec<vk::SubpassDependency>,
}

pub struct RenderPass {
    pub(crate) render_pass: vk::RenderPass,
}

impl RenderPass {
    pub(crate) fn create(device: &ash::Device, desc: &RenderPassDesc) -> Result<Self> {
        let subpasses: Vec<vk::SubpassDescription> = desc
            .subpasses
            .iter()
            .map(|sp| {
                let mut subpass = vk::SubpassDescription::default()
                    .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                    .color_attachments(&sp.color_attachments)
                    .input_attachments(&sp.input_attachments);
                if let Some(depth) = &sp.depth_stencil_attachment {
                    subpass = subpass.depth_stencil_attachment(depth);
                }
                subpass
            })
            .collect();

        let create_info = vk::RenderPassCreateInfo::default()
            .attachments(&desc.attachments)
            .subpasses(&subpasses)
            .dependencies(&desc.dependencies);

        let render_pass = unsafe {
            device.create_render_pass(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create render pass: {:?}", e);
                Error::ResourceCreationFailed(format!("Failed to create render pass: {:?}", e))
            })?
        };

        Ok(Self { render_pass })
    }

    pub fn handle(&self) -> vk::RenderPass {
        self.render_pass
    }
}

/// Framebuffer creation parameters; views referenced by arena handle
#[derive(Clone)]
pub struct FramebufferDesc {
    pub render_pass: RenderPassHandle,
    pub attachments: Vec<ImageViewHandle>,
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

pub struct Framebuffer {
    pub(crate) framebuffer: vk::Framebuffer,
    pub(crate) extent: vk::Extent2D,
}

impl Framebuffer {
    /// `render_pass` and `attachments` are the already-resolved Vulkan handles.
    pub(crate) fn create(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        attachments: &[vk::ImageView],
        desc: &FramebufferDesc,
    ) -> Result<Self> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(desc.width)
            .height(desc.height)
            .layers(desc.layers);

        let framebuffer = unsafe {
            device.create_framebuffer(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create framebuffer: {:?}", e);
                Error::ResourceCreationFailed(format!("Failed to create framebuffer: {:?}", e))
            })?
        };

        Ok(Self {
            framebuffer,
            extent: vk::Extent2D {
                width: desc.width,
                height: desc.height,
            },
        })
    }

    pub fn handle(&self) -> vk::Framebuffer {
        self.framebuffer
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }
}
