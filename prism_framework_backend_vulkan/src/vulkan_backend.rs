/// Backend - the Vulkan device/resource-lifecycle manager
///
/// Owns the instance, the committed device and queues, the presentation
/// chain, the per-frame synchronization slots, the resource arena with its
/// deferred deletion queue, and the per-worker pool registry. Everything the
/// upper layers touch goes through here.
///
/// Three lifetimes meet in this type: application-level handle ownership
/// (the arena), GPU-queue execution order (fences and semaphores), and
/// swapchain image availability (the presentation engine). The frame-slot
/// protocol and the deletion-queue countdown keep them from stepping on
/// each other.

use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use prism_framework::prism::{Error, Result};
use prism_framework::{prism_bail, prism_err, prism_error, prism_info, prism_warn};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Mutex;

use crate::debug;
use crate::vulkan_acceleration_structure::{AccelerationStructure, AccelerationStructureDesc};
use crate::vulkan_arena::{
    AccelerationStructureHandle, BufferHandle, DeletableHandle, DeletedObject, DeletionQueue,
    DescriptorSetLayoutHandle, DestroyCtx, FenceHandle, FramebufferHandle, ImageHandle,
    ImageViewHandle, PipelineHandle, PipelineLayoutHandle, RenderPassHandle, ResourceArena,
    SamplerHandle, SemaphoreHandle, ShaderModuleHandle, MAX_FRAMES_IN_FLIGHT,
};
use crate::vulkan_buffer::{aligned_size, Buffer, BufferDesc};
use crate::vulkan_command::{PoolRegistry, QueueRole, WorkerId};
use crate::vulkan_descriptor::{
    DescriptorSet, DescriptorSetLayout, DescriptorSetLayoutDesc, PipelineLayout,
    PipelineLayoutDesc,
};
use crate::vulkan_device::{
    create_logical_device, select_physical_device, QueueInfos, SwapChainSupportDetails,
};
use crate::vulkan_image::{Image, ImageDesc, ImageView, ImageViewDesc};
use crate::vulkan_pipeline::{
    ComputePipelineDesc, GraphicsPipelineDesc, Pipeline, ShaderModule,
};
use crate::vulkan_render_pass::{Framebuffer, FramebufferDesc, RenderPass, RenderPassDesc};
use crate::vulkan_sampler::{DefaultSamplers, Sampler, SamplerDesc};
use crate::vulkan_swapchain::{find_supported_format, SwapchainConfig, SwapchainState};
use crate::vulkan_sync::{Fence, Semaphore};

/// Backend construction parameters (the factory contract)
#[derive(Clone)]
pub struct BackendSettings {
    pub vsync: bool,
    pub srgb_swapchain: bool,
    pub enable_validation: bool,
    pub require_ray_tracing: bool,
    /// Device extensions on top of what the backend itself requires
    pub device_extensions: Vec<CString>,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            vsync: true,
            srgb_swapchain: true,
            enable_validation: false,
            require_ray_tracing: false,
            device_extensions: Vec::new(),
        }
    }
}

/// Round-robin frame slot counter, independent of the swapchain's own image
/// indices (the presentation engine picks those and they need not match 1:1).
pub(crate) struct FrameSlots {
    current: usize,
}

impl FrameSlots {
    pub fn new() -> Self {
        Self { current: 0 }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % MAX_FRAMES_IN_FLIGHT;
        self.current
    }
}

/// The Vulkan backend
pub struct Backend {
    _entry: ash::Entry,
    instance: ash::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
    debug_utils_device: Option<ash::ext::debug_utils::Device>,
    surface_loader: ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,

    physical_device: vk::PhysicalDevice,
    device_properties: vk::PhysicalDeviceProperties,
    queue_infos: QueueInfos,
    device: ash::Device,

    graphics_queue: vk::Queue,
    compute_queue: vk::Queue,
    transfer_queue: vk::Queue,
    present_queue: vk::Queue,

    /// Dropped explicitly before the device in Drop
    allocator: ManuallyDrop<Mutex<Allocator>>,

    acceleration_structure_loader: Option<ash::khr::acceleration_structure::Device>,
    ray_tracing_pipeline_properties: Option<vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static>>,
    acceleration_structure_properties: Option<vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>>,

    swapchain: SwapchainState,
    frame_slots: FrameSlots,
    in_flight_fences: Vec<vk::Fence>,
    image_index: u32,

    arena: ResourceArena,
    deletion_queue: DeletionQueue<DeletedObject>,
    pools: Mutex<PoolRegistry>,

    default_samplers: DefaultSamplers,

    vsync: bool,
    srgb_swapchain: bool,
    /// Latest known framebuffer size, used when the surface reports
    /// "any size allowed" during swapchain negotiation
    framebuffer_extent: vk::Extent2D,
}

impl Backend {
    /// Create the backend for `window`. Fatal on any initialization failure;
    /// no partial backend is ever returned.
    pub fn create<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        settings: BackendSettings,
    ) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load().map_err(|e| {
                prism_error!("prism::vulkan", "Failed to load Vulkan library: {:?}", e);
                Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
            })?;

            // Validation layers are a hard requirement once asked for
            let validation_layer = c"VK_LAYER_KHRONOS_validation";
            if settings.enable_validation {
                let available = entry.enumerate_instance_layer_properties().map_err(|e| {
                    Error::InitializationFailed(format!("Failed to enumerate layers: {:?}", e))
                })?;
                let found = available
                    .iter()
                    .any(|l| CStr::from_ptr(l.layer_name.as_ptr()) == validation_layer);
                if !found {
                    prism_error!(
                        "prism::vulkan",
                        "Validation requested but VK_LAYER_KHRONOS_validation is not installed"
                    );
                    return Err(Error::InitializationFailed(
                        "Validation layers requested but not available".to_string(),
                    ));
                }
            }

            let app_info = vk::ApplicationInfo::default()
                .application_name(c"Prism Application")
                .application_version(vk::make_api_version(0, 1, 0, 0))
                .engine_name(c"Prism")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            let display_handle = window.display_handle().map_err(|e| {
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
            let window_handle = window.window_handle().map_err(|e| {
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;

            let mut extension_names =
                ash_window::enumerate_required_extensions(display_handle.as_raw())
                    .map_err(|e| {
                        Error::InitializationFailed(format!(
                            "Failed to get required instance extensions: {}",
                            e
                        ))
                    })?
                    .to_vec();
            if settings.enable_validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
            }

            let layer_names = if settings.enable_validation {
                vec![validation_layer.as_ptr()]
            } else {
                vec![]
            };

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry.create_instance(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create Vulkan instance: {:?}", e);
                Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
            })?;

            let debug_utils = if settings.enable_validation {
                let loader = ash::ext::debug_utils::Instance::new(&entry, &instance);
                let messenger = loader
                    .create_debug_utils_messenger(&debug::messenger_create_info(), None)
                    .map_err(|e| {
                        Error::InitializationFailed(format!(
                            "Failed to create debug messenger: {:?}",
                            e
                        ))
                    })?;
                Some((loader, messenger))
            } else {
                None
            };

            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

            // Required device extensions: swapchain always, the ray-tracing
            // trio when requested, plus whatever the caller asked for.
            let mut required_extensions: Vec<&CStr> = vec![ash::khr::swapchain::NAME];
            if settings.require_ray_tracing {
                required_extensions.push(ash::khr::acceleration_structure::NAME);
                required_extensions.push(ash::khr::ray_tracing_pipeline::NAME);
                required_extensions.push(ash::khr::deferred_host_operations::NAME);
            }
            for ext in &settings.device_extensions {
                required_extensions.push(ext.as_c_str());
            }

            let selected = select_physical_device(
                &instance,
                &surface_loader,
                surface,
                &required_extensions,
                settings.require_ray_tracing,
            )?;

            let (device, queues) = create_logical_device(
                &instance,
                &selected,
                &required_extensions,
                settings.require_ray_tracing,
            )?;

            if !selected.queue_infos.asynchronous_compute() {
                prism_warn!(
                    "prism::vulkan",
                    "No async compute family; compute work shares the graphics queue"
                );
            }

            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device: selected.physical_device,
                debug_settings: Default::default(),
                buffer_device_address: settings.require_ray_tracing,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;
            let allocator = ManuallyDrop::new(Mutex::new(allocator));

            // Ray-tracing loaders and properties, only when enabled
            let (acceleration_structure_loader, rt_pipeline_props, accel_props) =
                if settings.require_ray_tracing {
                    let loader =
                        ash::khr::acceleration_structure::Device::new(&instance, &device);

                    let mut rt_props =
                        vk::PhysicalDeviceRayTracingPipelinePropertiesKHR::default();
                    let mut as_props =
                        vk::PhysicalDeviceAccelerationStructurePropertiesKHR::default();
                    {
                        let mut props2 = vk::PhysicalDeviceProperties2::default()
                            .push_next(&mut rt_props)
                            .push_next(&mut as_props);
                        instance.get_physical_device_properties2(
                            selected.physical_device,
                            &mut props2,
                        );
                    }
                    rt_props.p_next = std::ptr::null_mut();
                    as_props.p_next = std::ptr::null_mut();

                    (Some(loader), Some(rt_props), Some(as_props))
                } else {
                    (None, None, None)
                };

            // Initial framebuffer-size fallback; the surface's fixed extent
            // wins whenever it is reported, and window_resized() updates this.
            let framebuffer_extent = vk::Extent2D {
                width: 1280,
                height: 720,
            };

            let support =
                SwapChainSupportDetails::query(&surface_loader, selected.physical_device, surface)?;
            let swapchain = SwapchainState::create(
                &instance,
                &device,
                selected.physical_device,
                &allocator,
                surface,
                &support,
                &selected.queue_infos,
                &SwapchainConfig {
                    vsync: settings.vsync,
                    srgb: settings.srgb_swapchain,
                    framebuffer_extent,
                },
            )?;

            // One fence per frame slot, created signaled so the first
            // wait_for_frame on each slot passes immediately.
            let fence_create_info =
                vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED);
            let mut in_flight_fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
            for _ in 0..MAX_FRAMES_IN_FLIGHT {
                in_flight_fences.push(device.create_fence(&fence_create_info, None).map_err(
                    |e| {
                        Error::InitializationFailed(format!(
                            "Failed to create frame fence: {:?}",
                            e
                        ))
                    },
                )?);
            }

            let debug_utils_device = debug_utils
                .as_ref()
                .map(|_| ash::ext::debug_utils::Device::new(&instance, &device));

            let mut arena = ResourceArena::default();
            let [bilinear_desc, trilinear_desc, nearest_desc] = DefaultSamplers::descs();
            let default_samplers = DefaultSamplers {
                bilinear: arena.samplers.insert(Sampler::create(&device, &bilinear_desc)?),
                trilinear: arena.samplers.insert(Sampler::create(&device, &trilinear_desc)?),
                nearest: arena.samplers.insert(Sampler::create(&device, &nearest_desc)?),
            };

            prism_info!(
                "prism::vulkan",
                "Vulkan backend initialized ({} swap images, {} frames in flight)",
                swapchain.image_count(),
                MAX_FRAMES_IN_FLIGHT
            );

            Ok(Self {
                _entry: entry,
                instance,
                debug_utils,
                debug_utils_device,
                surface_loader,
                surface,
                physical_device: selected.physical_device,
                device_properties: selected.properties,
                queue_infos: selected.queue_infos,
                device,
                graphics_queue: queues.graphics,
                compute_queue: queues.compute,
                transfer_queue: queues.transfer,
                present_queue: queues.present,
                allocator,
                acceleration_structure_loader,
                ray_tracing_pipeline_properties: rt_pipeline_props,
                acceleration_structure_properties: accel_props,
                swapchain,
                frame_slots: FrameSlots::new(),
                in_flight_fences,
                image_index: 0,
                arena,
                deletion_queue: DeletionQueue::new(),
                pools: Mutex::new(PoolRegistry::new(settings.require_ray_tracing)),
                default_samplers,
                vsync: settings.vsync,
                srgb_swapchain: settings.srgb_swapchain,
                framebuffer_extent,
            })
        }
    }

    // ===== FRAME SYNCHRONIZATION =====

    /// Block until the target frame slot's previous work retired, then ask
    /// the presentation engine for the next image; `signal_semaphore` fires
    /// when that image is actually available to render into.
    pub fn acquire_next_swap_chain_image(
        &mut self,
        signal_semaphore: SemaphoreHandle,
    ) -> Result<u32> {
        self.wait_for_frame(self.frame_slots.current() as u32)?;

        let semaphore = self.semaphore_handle(signal_semaphore)?;

        let result = unsafe {
            self.swapchain.loader().acquire_next_image(
                self.swapchain.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, _suboptimal)) => {
                self.image_index = image_index;
                Ok(image_index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapchainOutOfDate),
            Err(e) => {
                prism_error!("prism::vulkan", "Failed to acquire swapchain image: {:?}", e);
                Err(Error::BackendError(format!(
                    "Failed to acquire swapchain image: {:?}",
                    e
                )))
            }
        }
    }

    /// Submit graphics work for the current frame. The frame slot's fence is
    /// attached here: graphics is the final submission of a steady-state
    /// frame, so its completion retires the slot.
    pub fn submit_graphics(
        &self,
        cmd_bufs: &[vk::CommandBuffer],
        wait_semaphores: &[SemaphoreHandle],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[SemaphoreHandle],
    ) -> Result<()> {
        let fence = self.in_flight_fences[self.frame_slots.current()];
        unsafe {
            self.device.reset_fences(&[fence]).map_err(|e| {
                Error::BackendError(format!("Failed to reset frame fence: {:?}", e))
            })?;
        }
        self.submit_internal(
            self.graphics_queue,
            cmd_bufs,
            wait_semaphores,
            wait_stages,
            signal_semaphores,
            fence,
        )
    }

    /// Submit compute work; ordering against other queues is the caller's
    /// business via the semaphore lists.
    pub fn submit_compute(
        &self,
        cmd_bufs: &[vk::CommandBuffer],
        wait_semaphores: &[SemaphoreHandle],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[SemaphoreHandle],
    ) -> Result<()> {
        self.submit_internal(
            self.compute_queue,
            cmd_bufs,
            wait_semaphores,
            wait_stages,
            signal_semaphores,
            vk::Fence::null(),
        )
    }

    /// Submit transfer work; see `submit_compute` for ordering.
    pub fn submit_transfer(
        &self,
        cmd_bufs: &[vk::CommandBuffer],
        wait_semaphores: &[SemaphoreHandle],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[SemaphoreHandle],
    ) -> Result<()> {
        self.submit_internal(
            self.transfer_queue,
            cmd_bufs,
            wait_semaphores,
            wait_stages,
            signal_semaphores,
            vk::Fence::null(),
        )
    }

    /// Submit on the graphics queue and block until completion. For one-off
    /// setup work outside the frame loop.
    pub fn flush_graphics(&self, cmd_bufs: &[vk::CommandBuffer]) -> Result<()> {
        self.flush_internal(self.graphics_queue, cmd_bufs)
    }

    /// Synchronous compute submission; see `flush_graphics`.
    pub fn flush_compute(&self, cmd_bufs: &[vk::CommandBuffer]) -> Result<()> {
        self.flush_internal(self.compute_queue, cmd_bufs)
    }

    /// Synchronous transfer submission; see `flush_graphics`.
    pub fn flush_transfer(&self, cmd_bufs: &[vk::CommandBuffer]) -> Result<()> {
        self.flush_internal(self.transfer_queue, cmd_bufs)
    }

    /// Present the acquired image, then advance the frame slot and run the
    /// deletion queue (the frame boundary). A stale swapchain is
    /// reported as `SwapchainOutOfDate` after the bookkeeping has run.
    pub fn present(&mut self, wait_semaphores: &[SemaphoreHandle]) -> Result<()> {
        let semaphores = self.resolve_semaphores(wait_semaphores)?;
        let swapchains = [self.swapchain.swapchain];
        let image_indices = [self.image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            self.swapchain
                .loader()
                .queue_present(self.present_queue, &present_info)
        };

        // Frame boundary bookkeeping runs whether or not the chain is stale
        self.frame_slots.advance();
        self.process_deletion_queue();

        match result {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Err(Error::SwapchainOutOfDate),
            Err(e) => {
                prism_error!("prism::vulkan", "Failed to present swapchain image: {:?}", e);
                Err(Error::SubmissionError(format!(
                    "Failed to present swapchain image: {:?}",
                    e
                )))
            }
        }
    }

    /// Non-blocking poll of a frame slot's fence
    pub fn is_frame_done(&self, idx: u32) -> Result<bool> {
        let fence = self.frame_fence(idx)?;
        unsafe {
            self.device.get_fence_status(fence).map_err(|e| {
                Error::BackendError(format!("Failed to query frame fence: {:?}", e))
            })
        }
    }

    /// Block until frame slot `idx` retires
    pub fn wait_for_frame(&self, idx: u32) -> Result<()> {
        let fence = self.frame_fence(idx)?;
        unsafe {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| {
                    Error::BackendError(format!("Failed to wait for frame fence: {:?}", e))
                })
        }
    }

    /// Block until the device has finished all outstanding work
    pub fn wait_idle(&self) -> Result<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(|e| prism_err!("prism::vulkan", "Failed to wait for device idle: {:?}", e))
        }
    }

    /// Tear down and rebuild the presentation chain. Waits for device idle
    /// first; no in-flight work may reference the old images afterwards.
    pub fn recreate_swapchain(&mut self, vsync: bool) -> Result<()> {
        self.wait_idle()?;
        self.vsync = vsync;

        self.swapchain.destroy(&self.device, &self.allocator);

        let support = SwapChainSupportDetails::query(
            &self.surface_loader,
            self.physical_device,
            self.surface,
        )?;
        self.swapchain = SwapchainState::create(
            &self.instance,
            &self.device,
            self.physical_device,
            &self.allocator,
            self.surface,
            &support,
            &self.queue_infos,
            &SwapchainConfig {
                vsync: self.vsync,
                srgb: self.srgb_swapchain,
                framebuffer_extent: self.framebuffer_extent,
            },
        )?;

        Ok(())
    }

    /// Record the window's framebuffer size; used during swapchain
    /// negotiation when the surface reports "any size allowed".
    pub fn window_resized(&mut self, width: u32, height: u32) {
        self.framebuffer_extent = vk::Extent2D { width, height };
    }

    // ===== DELETION QUEUE =====

    /// Move a resource out of the arena and into the deferred deletion
    /// queue. The handle is dead from this point on; the object itself is
    /// destroyed once every frame that could reference it has retired.
    pub fn queue_object_deletion<H: DeletableHandle>(&mut self, handle: H) {
        match handle.take(&mut self.arena) {
            Some(object) => self.deletion_queue.queue(object),
            None => {
                prism_warn!("prism::vulkan", "Stale handle passed to queue_object_deletion");
            }
        }
    }

    /// Advance the deletion queue one frame boundary. Called from `present`;
    /// also public so setup-time code without a frame loop can drive it.
    pub fn process_deletion_queue(&mut self) {
        let ctx = DestroyCtx {
            device: &self.device,
            allocator: &*self.allocator,
            acceleration_structure_loader: self.acceleration_structure_loader.as_ref(),
        };
        self.deletion_queue.process(|object| object.destroy(&ctx));
    }

    // ===== WORKER POOLS =====

    /// Register a recording context (a thread, a task, a job-system worker).
    /// Pools created for it live until backend teardown.
    pub fn register_worker(&self) -> WorkerId {
        self.pools.lock().unwrap().register()
    }

    /// The worker's graphics command pool, created on first use
    pub fn graphics_command_pool(&self, worker: WorkerId) -> Result<vk::CommandPool> {
        self.pools.lock().unwrap().command_pool(
            &self.device,
            worker,
            QueueRole::Graphics,
            self.queue_infos.graphics_queue_index,
        )
    }

    /// The worker's compute command pool; shares the graphics family when no
    /// compute family exists
    pub fn compute_command_pool(&self, worker: WorkerId) -> Result<vk::CommandPool> {
        let family = self
            .queue_infos
            .compute_queue_index
            .unwrap_or(self.queue_infos.graphics_queue_index);
        self.pools
            .lock()
            .unwrap()
            .command_pool(&self.device, worker, QueueRole::Compute, family)
    }

    /// The worker's transfer command pool; shares the graphics family when no
    /// transfer family exists
    pub fn transfer_command_pool(&self, worker: WorkerId) -> Result<vk::CommandPool> {
        let family = self
            .queue_infos
            .transfer_queue_index
            .unwrap_or(self.queue_infos.graphics_queue_index);
        self.pools
            .lock()
            .unwrap()
            .command_pool(&self.device, worker, QueueRole::Transfer, family)
    }

    /// The worker's descriptor pool, created on first use
    pub fn descriptor_pool(&self, worker: WorkerId) -> Result<vk::DescriptorPool> {
        self.pools.lock().unwrap().descriptor_pool(&self.device, worker)
    }

    /// Allocate a primary command buffer from the worker's graphics pool
    pub fn allocate_graphics_command_buffer(
        &self,
        worker: WorkerId,
        begin: bool,
    ) -> Result<vk::CommandBuffer> {
        let pool = self.graphics_command_pool(worker)?;
        self.allocate_command_buffer(pool, begin)
    }

    /// Allocate a primary command buffer from the worker's compute pool
    pub fn allocate_compute_command_buffer(
        &self,
        worker: WorkerId,
        begin: bool,
    ) -> Result<vk::CommandBuffer> {
        let pool = self.compute_command_pool(worker)?;
        self.allocate_command_buffer(pool, begin)
    }

    /// Allocate a primary command buffer from the worker's transfer pool
    pub fn allocate_transfer_command_buffer(
        &self,
        worker: WorkerId,
        begin: bool,
    ) -> Result<vk::CommandBuffer> {
        let pool = self.transfer_command_pool(worker)?;
        self.allocate_command_buffer(pool, begin)
    }

    /// Allocate a descriptor set from the worker's pool; freed individually
    /// through `free_descriptor_set`
    pub fn allocate_descriptor_set(
        &self,
        worker: WorkerId,
        layout: DescriptorSetLayoutHandle,
    ) -> Result<DescriptorSet> {
        let layout_vk = self
            .arena
            .descriptor_set_layouts
            .get(layout)
            .ok_or_else(|| Error::InvalidResource("stale descriptor set layout handle".to_string()))?
            .handle();
        let pool = self.descriptor_pool(worker)?;

        let layouts = [layout_vk];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        let set = unsafe {
            self.device
                .allocate_descriptor_sets(&alloc_info)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to allocate descriptor set: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to allocate descriptor set: {:?}",
                        e
                    ))
                })?[0]
        };

        Ok(DescriptorSet { set, pool })
    }

    /// Return a descriptor set to its owning pool
    pub fn free_descriptor_set(&self, set: DescriptorSet) -> Result<()> {
        unsafe {
            self.device
                .free_descriptor_sets(set.pool, &[set.set])
                .map_err(|e| {
                    Error::BackendError(format!("Failed to free descriptor set: {:?}", e))
                })
        }
    }

    // ===== RESOURCE FACTORIES =====

    /// Create a buffer; `data` is copied in immediately for host-visible
    /// buffers (device-local initial data goes through the BatchUploader).
    pub fn create_buffer(
        &mut self,
        desc: &BufferDesc,
        data: Option<&[u8]>,
    ) -> Result<BufferHandle> {
        let buffer = Buffer::create(&self.device, &self.allocator, desc, data)?;
        debug::set_object_name(self.debug_utils_device.as_ref(), buffer.handle(), desc.name);
        Ok(self.arena.buffers.insert(buffer))
    }

    pub fn create_image(&mut self, desc: &ImageDesc) -> Result<ImageHandle> {
        let image = Image::create(&self.device, &self.allocator, desc)?;
        debug::set_object_name(self.debug_utils_device.as_ref(), image.handle(), desc.name);
        Ok(self.arena.images.insert(image))
    }

    pub fn create_image_view(&mut self, desc: &ImageViewDesc) -> Result<ImageViewHandle> {
        let (image_vk, format) = {
            let image = self
                .arena
                .images
                .get(desc.image)
                .ok_or_else(|| Error::InvalidResource("stale image handle".to_string()))?;
            (image.handle(), image.format())
        };
        let view = ImageView::create(&self.device, image_vk, format, desc)?;
        Ok(self.arena.image_views.insert(view))
    }

    pub fn create_sampler(&mut self, desc: &SamplerDesc) -> Result<SamplerHandle> {
        let sampler = Sampler::create(&self.device, desc)?;
        Ok(self.arena.samplers.insert(sampler))
    }

    pub fn create_shader_module(&mut self, code: &[u32]) -> Result<ShaderModuleHandle> {
        let module = ShaderModule::create(&self.device, code)?;
        Ok(self.arena.shader_modules.insert(module))
    }

    pub fn create_render_pass(&mut self, desc: &RenderPassDesc) -> Result<RenderPassHandle> {
        let render_pass = RenderPass::create(&self.device, desc)?;
        Ok(self.arena.render_passes.insert(render_pass))
    }

    pub fn create_framebuffer(&mut self, desc: &FramebufferDesc) -> Result<FramebufferHandle> {
        let render_pass = self
            .arena
            .render_passes
            .get(desc.render_pass)
            .ok_or_else(|| Error::InvalidResource("stale render pass handle".to_string()))?
            .handle();
        let attachments: Vec<vk::ImageView> = desc
            .attachments
            .iter()
            .map(|&view| {
                self.arena
                    .image_views
                    .get(view)
                    .map(|v| v.handle())
                    .ok_or_else(|| Error::InvalidResource("stale image view handle".to_string()))
            })
            .collect::<Result<_>>()?;

        let framebuffer = Framebuffer::create(&self.device, render_pass, &attachments, desc)?;
        Ok(self.arena.framebuffers.insert(framebuffer))
    }

    pub fn create_descriptor_set_layout(
        &mut self,
        desc: &DescriptorSetLayoutDesc,
    ) -> Result<DescriptorSetLayoutHandle> {
        let layout = DescriptorSetLayout::create(&self.device, desc)?;
        Ok(self.arena.descriptor_set_layouts.insert(layout))
    }

    pub fn create_pipeline_layout(
        &mut self,
        desc: &PipelineLayoutDesc,
    ) -> Result<PipelineLayoutHandle> {
        let set_layouts: Vec<vk::DescriptorSetLayout> = desc
            .set_layouts
            .iter()
            .map(|&handle| {
                self.arena
                    .descriptor_set_layouts
                    .get(handle)
                    .map(|l| l.handle())
                    .ok_or_else(|| {
                        Error::InvalidResource("stale descriptor set layout handle".to_string())
                    })
            })
            .collect::<Result<_>>()?;

        let layout =
            PipelineLayout::create(&self.device, &set_layouts, &desc.push_constant_ranges)?;
        Ok(self.arena.pipeline_layouts.insert(layout))
    }

    pub fn create_graphics_pipeline(
        &mut self,
        desc: &GraphicsPipelineDesc,
    ) -> Result<PipelineHandle> {
        let vertex_shader = self.shader_module_handle(desc.vertex_shader)?;
        let fragment_shader = self.shader_module_handle(desc.fragment_shader)?;
        let layout = self
            .arena
            .pipeline_layouts
            .get(desc.layout)
            .ok_or_else(|| Error::InvalidResource("stale pipeline layout handle".to_string()))?
            .handle();
        let render_pass = self
            .arena
            .render_passes
            .get(desc.render_pass)
            .ok_or_else(|| Error::InvalidResource("stale render pass handle".to_string()))?
            .handle();
        let base_pipeline = self.resolve_base_pipeline(desc.base_pipeline)?;

        let pipeline = Pipeline::create_graphics(
            &self.device,
            desc,
            vertex_shader,
            fragment_shader,
            layout,
            render_pass,
            base_pipeline,
        )?;
        Ok(self.arena.pipelines.insert(pipeline))
    }

    pub fn create_compute_pipeline(
        &mut self,
        desc: &ComputePipelineDesc,
    ) -> Result<PipelineHandle> {
        let shader = self.shader_module_handle(desc.shader)?;
        let layout = self
            .arena
            .pipeline_layouts
            .get(desc.layout)
            .ok_or_else(|| Error::InvalidResource("stale pipeline layout handle".to_string()))?
            .handle();
        let base_pipeline = self.resolve_base_pipeline(desc.base_pipeline)?;

        let pipeline = Pipeline::create_compute(&self.device, shader, layout, base_pipeline)?;
        Ok(self.arena.pipelines.insert(pipeline))
    }

    pub fn create_acceleration_structure(
        &mut self,
        desc: &AccelerationStructureDesc,
    ) -> Result<AccelerationStructureHandle> {
        let loader = self.acceleration_structure_loader.as_ref().ok_or_else(|| {
            Error::InvalidResource(
                "acceleration structures require require_ray_tracing at backend creation"
                    .to_string(),
            )
        })?;
        let accel = AccelerationStructure::create(&self.device, &self.allocator, loader, desc)?;
        Ok(self.arena.acceleration_structures.insert(accel))
    }

    pub fn create_fence(&mut self, signaled: bool) -> Result<FenceHandle> {
        let fence = Fence::create(&self.device, signaled)?;
        Ok(self.arena.fences.insert(fence))
    }

    pub fn create_semaphore(&mut self) -> Result<SemaphoreHandle> {
        let semaphore = Semaphore::create(&self.device)?;
        Ok(self.arena.semaphores.insert(semaphore))
    }

    // ===== RESOURCE LOOKUP =====

    pub fn buffer(&self, handle: BufferHandle) -> Option<&Buffer> {
        self.arena.buffers.get(handle)
    }

    pub fn image(&self, handle: ImageHandle) -> Option<&Image> {
        self.arena.images.get(handle)
    }

    pub fn image_view(&self, handle: ImageViewHandle) -> Option<&ImageView> {
        self.arena.image_views.get(handle)
    }

    pub fn sampler(&self, handle: SamplerHandle) -> Option<&Sampler> {
        self.arena.samplers.get(handle)
    }

    pub fn render_pass(&self, handle: RenderPassHandle) -> Option<&RenderPass> {
        self.arena.render_passes.get(handle)
    }

    pub fn framebuffer(&self, handle: FramebufferHandle) -> Option<&Framebuffer> {
        self.arena.framebuffers.get(handle)
    }

    pub fn pipeline(&self, handle: PipelineHandle) -> Option<&Pipeline> {
        self.arena.pipelines.get(handle)
    }

    pub fn pipeline_layout(&self, handle: PipelineLayoutHandle) -> Option<&PipelineLayout> {
        self.arena.pipeline_layouts.get(handle)
    }

    pub fn descriptor_set_layout(
        &self,
        handle: DescriptorSetLayoutHandle,
    ) -> Option<&DescriptorSetLayout> {
        self.arena.descriptor_set_layouts.get(handle)
    }

    pub fn acceleration_structure(
        &self,
        handle: AccelerationStructureHandle,
    ) -> Option<&AccelerationStructure> {
        self.arena.acceleration_structures.get(handle)
    }

    pub fn fence(&self, handle: FenceHandle) -> Option<&Fence> {
        self.arena.fences.get(handle)
    }

    pub fn semaphore(&self, handle: SemaphoreHandle) -> Option<&Semaphore> {
        self.arena.semaphores.get(handle)
    }

    // ===== ACCESSORS =====

    pub fn instance(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn device(&self) -> &ash::Device {
        &self.device
    }

    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    /// Falls back to the graphics queue when the device has no compute family
    pub fn compute_queue(&self) -> vk::Queue {
        self.compute_queue
    }

    /// Falls back to the graphics queue when the device has no transfer family
    pub fn transfer_queue(&self) -> vk::Queue {
        self.transfer_queue
    }

    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    pub fn queue_infos(&self) -> &QueueInfos {
        &self.queue_infos
    }

    pub fn current_frame_idx(&self) -> u32 {
        self.frame_slots.current() as u32
    }

    /// Image index returned by the most recent acquire
    pub fn current_image_index(&self) -> u32 {
        self.image_index
    }

    pub fn swap_image_count(&self) -> u32 {
        self.swapchain.image_count()
    }

    pub fn swap_chain_image_format(&self) -> vk::Format {
        self.swapchain.surface_format.format
    }

    pub fn swap_chain_depth_format(&self) -> vk::Format {
        self.swapchain.depth_format
    }

    pub fn swap_chain_extent(&self) -> vk::Extent2D {
        self.swapchain.extent
    }

    pub fn swap_chain_present_mode(&self) -> vk::PresentModeKHR {
        self.swapchain.present_mode
    }

    /// The default render pass targeting the swapchain (color + depth)
    pub fn swapchain_render_pass(&self) -> vk::RenderPass {
        self.swapchain.render_pass
    }

    /// Framebuffer for the most recently acquired image
    pub fn swapchain_framebuffer(&self) -> vk::Framebuffer {
        self.swapchain.framebuffers[self.image_index as usize]
    }

    pub fn swapchain_image_view(&self, image_index: u32) -> Option<vk::ImageView> {
        self.swapchain.image_views.get(image_index as usize).copied()
    }

    pub fn swapchain_depth_image_view(&self) -> vk::ImageView {
        self.swapchain.depth_view
    }

    pub fn bilinear_sampler(&self) -> SamplerHandle {
        self.default_samplers.bilinear
    }

    pub fn trilinear_sampler(&self) -> SamplerHandle {
        self.default_samplers.trilinear
    }

    pub fn nearest_sampler(&self) -> SamplerHandle {
        self.default_samplers.nearest
    }

    /// Minimum offset alignment for dynamic uniform buffers on this device
    pub fn min_dynamic_ubo_alignment(&self) -> vk::DeviceSize {
        self.device_properties.limits.min_uniform_buffer_offset_alignment
    }

    /// `size` rounded up so consecutive dynamic-UBO elements stay aligned
    pub fn aligned_dynamic_ubo_size(&self, size: vk::DeviceSize) -> vk::DeviceSize {
        let alignment = self.min_dynamic_ubo_alignment();
        if alignment == 0 {
            size
        } else {
            aligned_size(size, alignment)
        }
    }

    /// First of `candidates` this device supports for the given tiling/features
    pub fn find_supported_format(
        &self,
        candidates: &[vk::Format],
        tiling: vk::ImageTiling,
        features: vk::FormatFeatureFlags,
    ) -> Option<vk::Format> {
        find_supported_format(&self.instance, self.physical_device, candidates, tiling, features)
    }

    pub fn ray_tracing_enabled(&self) -> bool {
        self.acceleration_structure_loader.is_some()
    }

    pub fn ray_tracing_pipeline_properties(
        &self,
    ) -> Option<vk::PhysicalDeviceRayTracingPipelinePropertiesKHR<'static>> {
        self.ray_tracing_pipeline_properties
    }

    pub fn acceleration_structure_properties(
        &self,
    ) -> Option<vk::PhysicalDeviceAccelerationStructurePropertiesKHR<'static>> {
        self.acceleration_structure_properties
    }

    // ===== INTERNAL =====

    pub(crate) fn arena(&self) -> &ResourceArena {
        &self.arena
    }

    pub(crate) fn allocator_ref(&self) -> &Mutex<Allocator> {
        &*self.allocator
    }

    pub(crate) fn acceleration_structure_loader(
        &self,
    ) -> Option<&ash::khr::acceleration_structure::Device> {
        self.acceleration_structure_loader.as_ref()
    }

    fn frame_fence(&self, idx: u32) -> Result<vk::Fence> {
        self.in_flight_fences
            .get(idx as usize)
            .copied()
            .ok_or_else(|| {
                Error::InvalidResource(format!(
                    "frame slot {} out of range (max {})",
                    idx, MAX_FRAMES_IN_FLIGHT
                ))
            })
    }

    fn semaphore_handle(&self, handle: SemaphoreHandle) -> Result<vk::Semaphore> {
        self.arena
            .semaphores
            .get(handle)
            .map(|s| s.handle())
            .ok_or_else(|| Error::InvalidResource("stale semaphore handle".to_string()))
    }

    fn resolve_semaphores(&self, handles: &[SemaphoreHandle]) -> Result<Vec<vk::Semaphore>> {
        handles
            .iter()
            .map(|&handle| self.semaphore_handle(handle))
            .collect()
    }

    fn shader_module_handle(&self, handle: ShaderModuleHandle) -> Result<vk::ShaderModule> {
        self.arena
            .shader_modules
            .get(handle)
            .map(|m| m.handle())
            .ok_or_else(|| Error::InvalidResource("stale shader module handle".to_string()))
    }

    fn resolve_base_pipeline(&self, handle: Option<PipelineHandle>) -> Result<Option<vk::Pipeline>> {
        match handle {
            None => Ok(None),
            Some(handle) => self
                .arena
                .pipelines
                .get(handle)
                .map(|p| Some(p.handle()))
                .ok_or_else(|| Error::InvalidResource("stale base pipeline handle".to_string())),
        }
    }

    fn allocate_command_buffer(
        &self,
        pool: vk::CommandPool,
        begin: bool,
    ) -> Result<vk::CommandBuffer> {
        unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let cmd = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to allocate command buffer: {:?}", e);
                    Error::ResourceCreationFailed(format!(
                        "Failed to allocate command buffer: {:?}",
                        e
                    ))
                })?[0];

            if begin {
                let begin_info = vk::CommandBufferBeginInfo::default();
                self.device.begin_command_buffer(cmd, &begin_info).map_err(|e| {
                    Error::BackendError(format!("Failed to begin command buffer: {:?}", e))
                })?;
            }

            Ok(cmd)
        }
    }

    fn submit_internal(
        &self,
        queue: vk::Queue,
        cmd_bufs: &[vk::CommandBuffer],
        wait_semaphores: &[SemaphoreHandle],
        wait_stages: &[vk::PipelineStageFlags],
        signal_semaphores: &[SemaphoreHandle],
        fence: vk::Fence,
    ) -> Result<()> {
        if wait_semaphores.len() != wait_stages.len() {
            prism_bail!(
                "prism::vulkan",
                "{} wait semaphores but {} wait stages",
                wait_semaphores.len(),
                wait_stages.len()
            );
        }

        let wait = self.resolve_semaphores(wait_semaphores)?;
        let signal = self.resolve_semaphores(signal_semaphores)?;

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(cmd_bufs)
            .signal_semaphores(&signal);

        unsafe {
            self.device
                .queue_submit(queue, &[submit_info], fence)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Queue submission rejected: {:?}", e);
                    Error::SubmissionError(format!("Queue submission rejected: {:?}", e))
                })
        }
    }

    fn flush_internal(&self, queue: vk::Queue, cmd_bufs: &[vk::CommandBuffer]) -> Result<()> {
        unsafe {
            let fence = self
                .device
                .create_fence(&vk::FenceCreateInfo::default(), None)
                .map_err(|e| {
                    Error::ResourceCreationFailed(format!("Failed to create flush fence: {:?}", e))
                })?;

            let submit_info = vk::SubmitInfo::default().command_buffers(cmd_bufs);

            let result = self
                .device
                .queue_submit(queue, &[submit_info], fence)
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Flush submission rejected: {:?}", e);
                    Error::SubmissionError(format!("Flush submission rejected: {:?}", e))
                })
                .and_then(|_| {
                    self.device
                        .wait_for_fences(&[fence], true, u64::MAX)
                        .map_err(|e| {
                            Error::SubmissionError(format!("Flush fence wait failed: {:?}", e))
                        })
                });

            self.device.destroy_fence(fence, None);
            result
        }
    }
}

impl Drop for Backend {
    fn drop(&mut self) {
        unsafe {
            // Nothing below is safe while the device still runs
            self.device.device_wait_idle().ok();

            // Flush the deferred queue, then everything still in the arena
            let ctx = DestroyCtx {
                device: &self.device,
                allocator: &*self.allocator,
                acceleration_structure_loader: self.acceleration_structure_loader.as_ref(),
            };
            self.deletion_queue.drain(|object| object.destroy(&ctx));
            self.arena.destroy_all(&ctx);

            self.pools.lock().unwrap().destroy_all(&self.device);

            self.swapchain.destroy(&self.device, &self.allocator);

            for &fence in &self.in_flight_fences {
                self.device.destroy_fence(fence, None);
            }
            self.in_flight_fences.clear();

            // The allocator borrows the device; free it first
            ManuallyDrop::drop(&mut self.allocator);

            self.device.destroy_device(None);

            self.surface_loader.destroy_surface(self.surface, None);

            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }

            self.instance.destroy_instance(None);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "vulkan_backend_tests.rs"]
mod tests;
