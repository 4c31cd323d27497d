/// Descriptor-set layout and pipeline layout resources
///
/// Descriptor *sets* are not arena resources: they are carved out of a
/// worker's descriptor pool (see vulkan_command.rs) and recycled individually
/// through that pool's FREE_DESCRIPTOR_SET flag.

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;

use crate::vulkan_arena::DescriptorSetLayoutHandle;

/// One binding within a descriptor-set layout
#[derive(Clone, Copy)]
pub struct DescriptorBindingDesc {
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub descriptor_count: u32,
    pub stage_flags: vk::ShaderStageFlags,
}

/// Descriptor-set layout creation parameters
#[derive(Clone, Default)]
pub struct DescriptorSetLayoutDesc {
    pub bindings: Vec<DescriptorBindingDesc>,
}

impl DescriptorSetLayoutDesc {
    pub fn add_binding(
        mut self,
        binding: u32,
        descriptor_type: vk::DescriptorType,
        descriptor_count: u32,
        stage_flags: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(DescriptorBindingDesc {
            binding,
            descriptor_type,
            descriptor_count,
            stage_flags,
        });
        self
    }
}

/// A descriptor set carved out of a worker's pool.
///
/// Pool-owned rather than arena-owned: freeing goes back to the pool it was
/// allocated from, via `Backend::free_descriptor_set`.
pub struct DescriptorSet {
    pub(crate) set: vk::DescriptorSet,
    pub(crate) pool: vk::DescriptorPool,
}

impl DescriptorSet {
    pub fn handle(&self) -> vk::DescriptorSet {
        self.set
    }
}

pub struct DescriptorSetLayout {
    pub(crate) layout: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    pub(crate) fn create(device: &ash::Device, desc: &DescriptorSetLayoutDesc) -> Result<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .bindings
            .iter()
            .map(|b| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(b.binding)
                    .descriptor_type(b.descriptor_type)
                    .descriptor_count(b.descriptor_count)
                    .stage_flags(b.stage_flags)
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            device
                .create_descriptor_set_layout(&create_info, None)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to create descriptor set layout: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to create descriptor set layout: {:?}",
                        e
                    ))
                })?
        };

        Ok(Self { layout })
    }

    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }
}

/// Pipeline layout creation parameters; set layouts referenced by arena handle
#[derive(Clone, Default)]
pub struct PipelineLayoutDesc {
    pub set_layouts: Vec<DescriptorSetLayoutHandle>,
    pub push_constant_ranges: Vec<vk::PushConstantRange>,
}

impl PipelineLayoutDesc {
    pub fn add_descriptor_set_layout(mut self, layout: DescriptorSetLayoutHandle) -> Self {
        self.set_layouts.push(layout);
        self
    }

    pub fn add_push_constant_range(
        mut self,
        stage_flags: vk::ShaderStageFlags,
        offset: u32,
        size: u32,
    ) -> Self {
        self.push_constant_ranges.push(vk::PushConstantRange {
            stage_flags,
            offset,
            size,
        });
        self
    }
}

pub struct PipelineLayout {
    pub(crate) layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// `set_layouts` are the already-resolved Vulkan handles, in desc order.
    pub(crate) fn create(
        device: &ash::Device,
        set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
    ) -> Result<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constant_ranges);

        let layout = unsafe {
            device
                .create_pipeline_layout(&create_info, None)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to create pipeline layout: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to create pipeline layout: {:?}",
                        e
                    ))
                })?
        };

        Ok(Self { layout })
    }

    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}
