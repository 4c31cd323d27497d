/// Shader module and pipeline resources
///
/// The declarative fixed-function state bags of a full engine live above this
/// backend; pipeline descs here carry shader modules, layout, render pass and
/// a small set of knobs, with sensible fixed-function defaults (dynamic
/// viewport/scissor) filled in at creation. A base pipeline is referenced by
/// arena handle and resolved when the derived pipeline is created.

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;

use crate::vulkan_arena::{
    PipelineHandle, PipelineLayoutHandle, RenderPassHandle, ShaderModuleHandle,
};

/// SPIR-V shader module
pub struct ShaderModule {
    pub(crate) module: vk::ShaderModule,
}

impl ShaderModule {
    pub(crate) fn create(device: &ash::Device, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);

        let module = unsafe {
            device.create_shader_module(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create shader module: {:?}", e);
                Error::ResourceCreationFailed(format!("Failed to create shader module: {:?}", e))
            })?
        };

        Ok(Self { module })
    }

    pub fn handle(&self) -> vk::ShaderModule {
        self.module
    }
}

/// Graphics pipeline creation parameters
#[derive(Clone)]
pub struct GraphicsPipelineDesc {
    pub vertex_shader: ShaderModuleHandle,
    pub fragment_shader: ShaderModuleHandle,
    pub layout: PipelineLayoutHandle,
    pub render_pass: RenderPassHandle,
    pub subpass: u32,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth_test: bool,
    pub depth_write: bool,
    pub samples: vk::SampleCountFlags,
    /// Vertex bindings and attributes; empty for vertex-pulling pipelines
    pub vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    pub vertex_attributes: Vec<vk::VertexInputAttributeDescription>,
    /// Number of color attachments in the target subpass
    pub color_attachment_count: u32,
    /// Creation-time base pipeline, resolved from the arena
    pub base_pipeline: Option<PipelineHandle>,
}

/// Compute pipeline creation parameters
#[derive(Clone)]
pub struct ComputePipelineDesc {
    pub shader: ShaderModuleHandle,
    pub layout: PipelineLayoutHandle,
    pub base_pipeline: Option<PipelineHandle>,
}

/// A graphics or compute pipeline; the bind point records which
pub struct Pipeline {
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) bind_point: vk::PipelineBindPoint,
}

impl Pipeline {
    /// `desc` knobs plus already-resolved Vulkan handles from the arena.
    pub(crate) fn create_graphics(
        device: &ash::Device,
        desc: &GraphicsPipelineDesc,
        vertex_shader: vk::ShaderModule,
        fragment_shader: vk::ShaderModule,
        layout: vk::PipelineLayout,
        render_pass: vk::RenderPass,
        base_pipeline: Option<vk::Pipeline>,
    ) -> Result<Self> {
        let entry_point = c"main";

        let stages = [
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_shader)
                .name(entry_point),
            vk::PipelineShaderStageCreateInfo::default()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_shader)
                .name(entry_point),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&desc.vertex_bindings)
            .vertex_attribute_descriptions(&desc.vertex_attributes);

        let input_assembly_state =
            vk::PipelineInputAssemblyStateCreateInfo::default().topology(desc.topology);

        // Viewport and scissor are dynamic so pipelines survive resizes
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(desc.cull_mode)
            .front_face(desc.front_face)
            .line_width(1.0);

        let multisample_state =
            vk::PipelineMultisampleStateCreateInfo::default().rasterization_samples(desc.samples);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth_test)
            .depth_write_enable(desc.depth_write)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = (0..desc
            .color_attachment_count)
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect();

        let color_blend_state =
            vk::PipelineColorBlendStateCreateInfo::default().attachments(&blend_attachments);

        let mut create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(layout)
            .render_pass(render_pass)
            .subpass(desc.subpass);

        if let Some(base) = base_pipeline {
            create_info = create_info
                .flags(vk::PipelineCreateFlags::DERIVATIVE)
                .base_pipeline_handle(base)
                .base_pipeline_index(-1);
        }

        let pipeline = unsafe {
            device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| {
                    prism_error!("prism::vulkan", "Failed to create graphics pipeline: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to create graphics pipeline: {:?}",
                        e
                    ))
                })?[0]
        };

        Ok(Self {
            pipeline,
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }

    pub(crate) fn create_compute(
        device: &ash::Device,
        shader: vk::ShaderModule,
        layout: vk::PipelineLayout,
        base_pipeline: Option<vk::Pipeline>,
    ) -> Result<Self> {
        let stage = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader)
            .name(c"main");

        let mut create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage)
            .layout(layout);

        if let Some(base) = base_pipeline {
            create_info = create_info
                .flags(vk::PipelineCreateFlags::DERIVATIVE)
                .base_pipeline_handle(base)
                .base_pipeline_index(-1);
        }

        let pipeline = unsafe {
            device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| {
                    prism_error!("prism::vulkan", "Failed to create compute pipeline: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to create compute pipeline: {:?}",
                        e
                    ))
                })?[0]
        };

        Ok(Self {
            pipeline,
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        self.bind_point
    }
}
