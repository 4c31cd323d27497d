/// Resource arena and deferred deletion queue
///
/// All device-scoped resources are owned by a single arena; callers hold
/// opaque slotmap handles instead of smart pointers, which rules out
/// ownership cycles between resources and the backend. Destroying a resource
/// moves it out of the arena into the deletion queue, which holds it for
/// MAX_FRAMES_IN_FLIGHT frame boundaries before running the actual Vulkan
/// destruction.

use gpu_allocator::vulkan::Allocator;
use slotmap::{new_key_type, SlotMap};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::vulkan_acceleration_structure::AccelerationStructure;
use crate::vulkan_buffer::Buffer;
use crate::vulkan_descriptor::{DescriptorSetLayout, PipelineLayout};
use crate::vulkan_image::{Image, ImageView};
use crate::vulkan_pipeline::{Pipeline, ShaderModule};
use crate::vulkan_render_pass::{Framebuffer, RenderPass};
use crate::vulkan_sampler::Sampler;
use crate::vulkan_sync::{Fence, Semaphore};

/// Number of frames the CPU may record ahead of the GPU.
///
/// Also the deletion-queue countdown: an object queued for deletion survives
/// this many frame boundaries, which is enough for every fence-tracked frame
/// that could still reference it to have retired.
pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

new_key_type! {
    pub struct BufferHandle;
    pub struct ImageHandle;
    pub struct ImageViewHandle;
    pub struct SamplerHandle;
    pub struct ShaderModuleHandle;
    pub struct RenderPassHandle;
    pub struct FramebufferHandle;
    pub struct DescriptorSetLayoutHandle;
    pub struct PipelineLayoutHandle;
    pub struct PipelineHandle;
    pub struct AccelerationStructureHandle;
    pub struct FenceHandle;
    pub struct SemaphoreHandle;
}

/// Everything needed to physically destroy a resource.
///
/// Built on the fly by the backend; the acceleration-structure loader is only
/// present when the backend was created with ray tracing enabled.
pub(crate) struct DestroyCtx<'a> {
    pub device: &'a ash::Device,
    pub allocator: &'a Mutex<Allocator>,
    pub acceleration_structure_loader: Option<&'a ash::khr::acceleration_structure::Device>,
}

/// A resource moved out of the arena, pending destruction.
///
/// Public only because it appears in the `DeletableHandle` signature; it
/// cannot be built or inspected outside the crate.
#[doc(hidden)]
pub enum DeletedObject {
    Buffer(Buffer),
    Image(Image),
    ImageView(ImageView),
    Sampler(Sampler),
    ShaderModule(ShaderModule),
    RenderPass(RenderPass),
    Framebuffer(Framebuffer),
    DescriptorSetLayout(DescriptorSetLayout),
    PipelineLayout(PipelineLayout),
    Pipeline(Pipeline),
    AccelerationStructure(AccelerationStructure),
    Fence(Fence),
    Semaphore(Semaphore),
}

impl DeletedObject {
    pub(crate) fn destroy(&mut self, ctx: &DestroyCtx) {
        unsafe {
            match self {
                DeletedObject::Buffer(b) => b.destroy(ctx.device, ctx.allocator),
                DeletedObject::Image(i) => i.destroy(ctx.device, ctx.allocator),
                DeletedObject::ImageView(v) => ctx.device.destroy_image_view(v.image_view, None),
                DeletedObject::Sampler(s) => ctx.device.destroy_sampler(s.sampler, None),
                DeletedObject::ShaderModule(m) => {
                    ctx.device.destroy_shader_module(m.module, None)
                }
                DeletedObject::RenderPass(rp) => {
                    ctx.device.destroy_render_pass(rp.render_pass, None)
                }
                DeletedObject::Framebuffer(fb) => {
                    ctx.device.destroy_framebuffer(fb.framebuffer, None)
                }
                DeletedObject::DescriptorSetLayout(l) => {
                    ctx.device.destroy_descriptor_set_layout(l.layout, None)
                }
                DeletedObject::PipelineLayout(l) => {
                    ctx.device.destroy_pipeline_layout(l.layout, None)
                }
                DeletedObject::Pipeline(p) => ctx.device.destroy_pipeline(p.pipeline, None),
                DeletedObject::AccelerationStructure(a) => {
                    a.destroy(ctx.device, ctx.allocator, ctx.acceleration_structure_loader)
                }
                DeletedObject::Fence(f) => ctx.device.destroy_fence(f.fence, None),
                DeletedObject::Semaphore(s) => ctx.device.destroy_semaphore(s.semaphore, None),
            }
        }
    }
}

// ===== ARENA =====

/// Owner of every caller-created device-scoped resource.
///
/// The backend's factory methods insert into the arena and hand back handles;
/// lookups go through the typed slotmaps. Removal only happens through the
/// deletion queue (or wholesale at backend teardown). Public only for the
/// `DeletableHandle` signature; its storage is crate-internal.
#[doc(hidden)]
#[derive(Default)]
pub struct ResourceArena {
    pub(crate) buffers: SlotMap<BufferHandle, Buffer>,
    pub(crate) images: SlotMap<ImageHandle, Image>,
    pub(crate) image_views: SlotMap<ImageViewHandle, ImageView>,
    pub(crate) samplers: SlotMap<SamplerHandle, Sampler>,
    pub(crate) shader_modules: SlotMap<ShaderModuleHandle, ShaderModule>,
    pub(crate) render_passes: SlotMap<RenderPassHandle, RenderPass>,
    pub(crate) framebuffers: SlotMap<FramebufferHandle, Framebuffer>,
    pub(crate) descriptor_set_layouts: SlotMap<DescriptorSetLayoutHandle, DescriptorSetLayout>,
    pub(crate) pipeline_layouts: SlotMap<PipelineLayoutHandle, PipelineLayout>,
    pub(crate) pipelines: SlotMap<PipelineHandle, Pipeline>,
    pub(crate) acceleration_structures: SlotMap<AccelerationStructureHandle, AccelerationStructure>,
    pub(crate) fences: SlotMap<FenceHandle, Fence>,
    pub(crate) semaphores: SlotMap<SemaphoreHandle, Semaphore>,
}

impl ResourceArena {
    /// Destroy every resource still owned by the arena (backend teardown).
    pub(crate) fn destroy_all(&mut self, ctx: &DestroyCtx) {
        // Dependent objects first: views before images, pipelines before layouts.
        for (_, v) in self.image_views.drain() {
            DeletedObject::ImageView(v).destroy(ctx);
        }
        for (_, fb) in self.framebuffers.drain() {
            DeletedObject::Framebuffer(fb).destroy(ctx);
        }
        for (_, p) in self.pipelines.drain() {
            DeletedObject::Pipeline(p).destroy(ctx);
        }
        for (_, a) in self.acceleration_structures.drain() {
            DeletedObject::AccelerationStructure(a).destroy(ctx);
        }
        for (_, b) in self.buffers.drain() {
            DeletedObject::Buffer(b).destroy(ctx);
        }
        for (_, i) in self.images.drain() {
            DeletedObject::Image(i).destroy(ctx);
        }
        for (_, s) in self.samplers.drain() {
            DeletedObject::Sampler(s).destroy(ctx);
        }
        for (_, m) in self.shader_modules.drain() {
            DeletedObject::ShaderModule(m).destroy(ctx);
        }
        for (_, rp) in self.render_passes.drain() {
            DeletedObject::RenderPass(rp).destroy(ctx);
        }
        for (_, l) in self.pipeline_layouts.drain() {
            DeletedObject::PipelineLayout(l).destroy(ctx);
        }
        for (_, l) in self.descriptor_set_layouts.drain() {
            DeletedObject::DescriptorSetLayout(l).destroy(ctx);
        }
        for (_, f) in self.fences.drain() {
            DeletedObject::Fence(f).destroy(ctx);
        }
        for (_, s) in self.semaphores.drain() {
            DeletedObject::Semaphore(s).destroy(ctx);
        }
    }
}

/// Moves a resource out of the arena for deferred destruction.
///
/// Implemented by every handle type so `Backend::queue_object_deletion`
/// accepts any of them through one entry point.
pub trait DeletableHandle {
    #[doc(hidden)]
    fn take(self, arena: &mut ResourceArena) -> Option<DeletedObject>;
}

macro_rules! impl_deletable {
    ($handle:ty, $field:ident, $variant:ident) => {
        impl DeletableHandle for $handle {
            fn take(self, arena: &mut ResourceArena) -> Option<DeletedObject> {
                arena.$field.remove(self).map(DeletedObject::$variant)
            }
        }
    };
}

impl_deletable!(BufferHandle, buffers, Buffer);
impl_deletable!(ImageHandle, images, Image);
impl_deletable!(ImageViewHandle, image_views, ImageView);
impl_deletable!(SamplerHandle, samplers, Sampler);
impl_deletable!(ShaderModuleHandle, shader_modules, ShaderModule);
impl_deletable!(RenderPassHandle, render_passes, RenderPass);
impl_deletable!(FramebufferHandle, framebuffers, Framebuffer);
impl_deletable!(DescriptorSetLayoutHandle, descriptor_set_layouts, DescriptorSetLayout);
impl_deletable!(PipelineLayoutHandle, pipeline_layouts, PipelineLayout);
impl_deletable!(PipelineHandle, pipelines, Pipeline);
impl_deletable!(AccelerationStructureHandle, acceleration_structures, AccelerationStructure);
impl_deletable!(FenceHandle, fences, Fence);
impl_deletable!(SemaphoreHandle, semaphores, Semaphore);

// ===== DELETION QUEUE =====

/// FIFO of objects waiting out their in-flight frames.
///
/// Entries carry a countdown seeded with `MAX_FRAMES_IN_FLIGHT`; `process`
/// decrements every countdown once and destroys matured entries from the
/// front. Because countdowns only differ by frame of insertion, the front of
/// the queue is always the oldest entry, so a contiguous front scan is
/// sufficient; no full traversal is needed to find work.
///
/// Generic over the entry type so the countdown policy itself is testable
/// without a device.
pub(crate) struct DeletionQueue<T> {
    entries: VecDeque<(T, u32)>,
}

impl<T> DeletionQueue<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append an object with a fresh countdown. The queue takes exclusive
    /// ownership; this must be the last live reference.
    pub fn queue(&mut self, object: T) {
        self.entries
            .push_back((object, MAX_FRAMES_IN_FLIGHT as u32));
    }

    /// Advance one frame boundary: decrement all countdowns, destroy matured
    /// entries in FIFO order. Call exactly once per frame.
    pub fn process(&mut self, mut destroy: impl FnMut(&mut T)) {
        for entry in self.entries.iter_mut() {
            entry.1 -= 1;
        }

        while matches!(self.entries.front(), Some((_, 0))) {
            if let Some((mut object, _)) = self.entries.pop_front() {
                destroy(&mut object);
            }
        }
    }

    /// Destroy everything immediately, countdowns ignored.
    ///
    /// Only valid once the device is idle (backend teardown).
    pub fn drain(&mut self, mut destroy: impl FnMut(&mut T)) {
        while let Some((mut object, _)) = self.entries.pop_front() {
            destroy(&mut object);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "vulkan_arena_tests.rs"]
mod tests;
