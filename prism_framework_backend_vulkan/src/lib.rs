/*!
# Prism Framework - Vulkan Backend

The GPU device/resource-lifecycle manager of the Prism framework, built on
the Ash Vulkan bindings and gpu-allocator for memory management.

The backend reconciles three independent lifetimes without stalling the
pipeline: application-level handle ownership (a resource arena), GPU-queue
execution order (per-frame fences, explicit semaphores), and swapchain image
availability (the presentation engine's image indices). Resources are never
destroyed while the device may still read them: dropping a handle moves the
resource into a deferred deletion queue that waits out the in-flight window.

## Typical frame

```no_run
# use prism_framework_backend_vulkan::*;
# fn frame(backend: &mut Backend, worker: WorkerId,
#          acquire_sem: SemaphoreHandle, render_sem: SemaphoreHandle)
#          -> prism_framework::PrismResult<()> {
backend.acquire_next_swap_chain_image(acquire_sem)?;
let cmd = backend.allocate_graphics_command_buffer(worker, true)?;
// ... record ...
backend.submit_graphics(
    &[cmd],
    &[acquire_sem],
    &[ash::vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
    &[render_sem],
)?;
backend.present(&[render_sem])?;
# Ok(())
# }
```
*/

mod debug;
mod vulkan_acceleration_structure;
mod vulkan_arena;
mod vulkan_backend;
mod vulkan_buffer;
mod vulkan_command;
mod vulkan_descriptor;
mod vulkan_device;
mod vulkan_image;
mod vulkan_pipeline;
mod vulkan_render_pass;
mod vulkan_sampler;
mod vulkan_swapchain;
mod vulkan_sync;
mod vulkan_uploader;

pub use vulkan_acceleration_structure::{AccelerationStructure, AccelerationStructureDesc};
pub use vulkan_arena::{
    AccelerationStructureHandle, BufferHandle, DeletableHandle, DescriptorSetLayoutHandle,
    FenceHandle, FramebufferHandle, ImageHandle, ImageViewHandle, PipelineHandle,
    PipelineLayoutHandle, RenderPassHandle, SamplerHandle, SemaphoreHandle, ShaderModuleHandle,
    MAX_FRAMES_IN_FLIGHT,
};
pub use vulkan_backend::{Backend, BackendSettings};
pub use vulkan_buffer::{aligned_size, Buffer, BufferDesc};
pub use vulkan_command::WorkerId;
pub use vulkan_descriptor::{
    DescriptorBindingDesc, DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutDesc,
    PipelineLayout, PipelineLayoutDesc,
};
pub use vulkan_device::{QueueInfos, SwapChainSupportDetails};
pub use vulkan_image::{Image, ImageDesc, ImageView, ImageViewDesc};
pub use vulkan_pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, ShaderModule,
};
pub use vulkan_render_pass::{
    Framebuffer, FramebufferDesc, RenderPass, RenderPassDesc, SubpassDesc,
};
pub use vulkan_sampler::{Sampler, SamplerDesc};
pub use vulkan_sync::{Fence, Semaphore};
pub use vulkan_uploader::BatchUploader;

// Re-export the Vulkan types that appear in this crate's public API
pub use ash;
pub use gpu_allocator::MemoryLocation;
