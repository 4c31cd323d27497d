/// Physical-device selection and queue-family scoring
///
/// Candidates are tried discrete-first; the first device per type bucket that
/// meets every requirement wins. Queue families are scored per role so that
/// dedicated async compute/transfer families are preferred over the
/// do-everything graphics family whenever the hardware offers them.

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::{prism_debug, prism_info, prism_warn};
use std::ffi::CStr;

/// Quality score for a (queue family, role) pair.
///
/// 3 = the family exposes exactly this capability among the competing set
///     (fully dedicated, async-capable)
/// 2 = shared with one other relevant capability
/// 1 = the do-everything fallback family
/// 0 = the role is absent
pub fn role_quality(flags: vk::QueueFlags, role: vk::QueueFlags) -> u32 {
    if !flags.contains(role) {
        return 0;
    }
    let relevant =
        flags & (vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER);
    match relevant.as_raw().count_ones() {
        1 => 3,
        2 => 2,
        _ => 1,
    }
}

/// The committed queue-family assignment for one physical device.
///
/// Graphics is mandatory (quality >= 1); compute and transfer may be absent,
/// in which case that work is issued on the graphics queue instead.
#[derive(Debug, Clone, Copy)]
pub struct QueueInfos {
    pub graphics_queue_index: u32,
    pub graphics_queue_quality: u32,
    pub compute_queue_index: Option<u32>,
    pub compute_queue_quality: u32,
    pub transfer_queue_index: Option<u32>,
    pub transfer_queue_quality: u32,
    pub presentation_queue_index: u32,
}

impl QueueInfos {
    /// Whether compute work can run without contending with graphics
    pub fn asynchronous_compute(&self) -> bool {
        self.compute_queue_quality > 1
    }

    /// Whether transfers have their own family (typically DMA hardware)
    pub fn dedicated_transfer(&self) -> bool {
        self.transfer_queue_quality > 1
    }

    /// Family indices that need a VkDeviceQueueCreateInfo, deduplicated
    pub fn unique_family_indices(&self) -> Vec<u32> {
        let mut indices = vec![self.graphics_queue_index, self.presentation_queue_index];
        if let Some(idx) = self.compute_queue_index {
            indices.push(idx);
        }
        if let Some(idx) = self.transfer_queue_index {
            indices.push(idx);
        }
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

/// Score every family and pick the best per role.
///
/// `present_support[i]` reports whether family `i` can present to the target
/// surface. Returns None when the device has no usable graphics queue or no
/// presentation-capable family; those devices are rejected outright.
pub fn find_queue_assignments(
    families: &[vk::QueueFamilyProperties],
    present_support: &[bool],
) -> Option<QueueInfos> {
    let mut graphics: Option<(u32, u32)> = None; // (index, quality)
    let mut compute: Option<(u32, u32)> = None;
    let mut transfer: Option<(u32, u32)> = None;

    for (index, family) in families.iter().enumerate() {
        if family.queue_count == 0 {
            continue;
        }
        let index = index as u32;

        let g = role_quality(family.queue_flags, vk::QueueFlags::GRAPHICS);
        if g > graphics.map_or(0, |(_, q)| q) {
            graphics = Some((index, g));
        }
        let c = role_quality(family.queue_flags, vk::QueueFlags::COMPUTE);
        if c > compute.map_or(0, |(_, q)| q) {
            compute = Some((index, c));
        }
        let t = role_quality(family.queue_flags, vk::QueueFlags::TRANSFER);
        if t > transfer.map_or(0, |(_, q)| q) {
            transfer = Some((index, t));
        }
    }

    let (graphics_index, graphics_quality) = graphics?;

    // Presentation is a boolean requirement, scored separately from the
    // capability roles. Prefer presenting from the graphics family.
    let presentation_queue_index = if present_support
        .get(graphics_index as usize)
        .copied()
        .unwrap_or(false)
    {
        graphics_index
    } else {
        (0..families.len() as u32)
            .find(|&i| present_support.get(i as usize).copied().unwrap_or(false))?
    };

    Some(QueueInfos {
        graphics_queue_index: graphics_index,
        graphics_queue_quality: graphics_quality,
        compute_queue_index: compute.map(|(i, _)| i),
        compute_queue_quality: compute.map_or(0, |(_, q)| q),
        transfer_queue_index: transfer.map(|(i, _)| i),
        transfer_queue_quality: transfer.map_or(0, |(_, q)| q),
        presentation_queue_index,
    })
}

/// Surface support queried from one physical device
pub struct SwapChainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapChainSupportDetails {
    pub(crate) fn query(
        surface_loader: &ash::khr::surface::Instance,
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self> {
        unsafe {
            let capabilities = surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(|e| {
                    Error::InitializationFailed(format!(
                        "Failed to get surface capabilities: {:?}",
                        e
                    ))
                })?;
            let formats = surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(|e| {
                    Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
                })?;
            let present_modes = surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(|e| {
                    Error::InitializationFailed(format!("Failed to get present modes: {:?}", e))
                })?;

            Ok(Self {
                capabilities,
                formats,
                present_modes,
            })
        }
    }

    /// A surface we can actually build a swapchain for
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// The device committed by selection, with everything queried along the way
pub(crate) struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_infos: QueueInfos,
}

/// Try every adapter, discrete GPUs first, and commit to the first one that
/// satisfies extensions, swapchain support, queue requirements and (when
/// requested) the ray-tracing feature set.
pub(crate) fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    required_extensions: &[&CStr],
    require_ray_tracing: bool,
) -> Result<SelectedDevice> {
    let physical_devices = unsafe {
        instance.enumerate_physical_devices().map_err(|e| {
            Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
        })?
    };

    const TYPE_PREFERENCE: [vk::PhysicalDeviceType; 5] = [
        vk::PhysicalDeviceType::DISCRETE_GPU,
        vk::PhysicalDeviceType::INTEGRATED_GPU,
        vk::PhysicalDeviceType::VIRTUAL_GPU,
        vk::PhysicalDeviceType::CPU,
        vk::PhysicalDeviceType::OTHER,
    ];

    for device_type in TYPE_PREFERENCE {
        for &physical_device in &physical_devices {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            if properties.device_type != device_type {
                continue;
            }

            let device_name = unsafe {
                CStr::from_ptr(properties.device_name.as_ptr())
                    .to_string_lossy()
                    .into_owned()
            };

            match is_device_suitable(
                instance,
                surface_loader,
                surface,
                physical_device,
                required_extensions,
                require_ray_tracing,
            )? {
                Some(queue_infos) => {
                    prism_info!(
                        "prism::vulkan",
                        "Selected device '{}' ({:?}), queue qualities: graphics {}, compute {}, transfer {}",
                        device_name,
                        device_type,
                        queue_infos.graphics_queue_quality,
                        queue_infos.compute_queue_quality,
                        queue_infos.transfer_queue_quality
                    );
                    return Ok(SelectedDevice {
                        physical_device,
                        properties,
                        queue_infos,
                    });
                }
                None => {
                    prism_debug!(
                        "prism::vulkan",
                        "Rejected device '{}' ({:?})",
                        device_name,
                        device_type
                    );
                }
            }
        }
    }

    prism_warn!("prism::vulkan", "No physical device met the requirements");
    Err(Error::NoSuitableDevice)
}

/// Returns the queue assignment when `physical_device` meets every
/// requirement, None when it should be skipped.
fn is_device_suitable(
    instance: &ash::Instance,
    surface_loader: &ash::khr::surface::Instance,
    surface: vk::SurfaceKHR,
    physical_device: vk::PhysicalDevice,
    required_extensions: &[&CStr],
    require_ray_tracing: bool,
) -> Result<Option<QueueInfos>> {
    if !check_device_extension_support(instance, physical_device, required_extensions)? {
        return Ok(None);
    }

    let support = SwapChainSupportDetails::query(surface_loader, physical_device, surface)?;
    if !support.is_adequate() {
        return Ok(None);
    }

    if require_ray_tracing && !check_ray_tracing_support(instance, physical_device) {
        return Ok(None);
    }

    let families =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
    let present_support: Vec<bool> = (0..families.len() as u32)
        .map(|i| unsafe {
            surface_loader
                .get_physical_device_surface_support(physical_device, i, surface)
                .unwrap_or(false)
        })
        .collect();

    Ok(find_queue_assignments(&families, &present_support))
}

fn check_device_extension_support(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    required_extensions: &[&CStr],
) -> Result<bool> {
    let available = unsafe {
        instance
            .enumerate_device_extension_properties(physical_device)
            .map_err(|e| {
                Error::InitializationFailed(format!(
                    "Failed to enumerate device extensions: {:?}",
                    e
                ))
            })?
    };

    Ok(required_extensions.iter().all(|required| {
        available.iter().any(|ext| {
            (unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }) == *required
        })
    }))
}

/// Ray tracing needs the acceleration-structure and pipeline features plus
/// buffer device addresses; all three must be reported or the device is out.
fn check_ray_tracing_support(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> bool {
    let mut acceleration_structure =
        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default();
    let mut ray_tracing_pipeline = vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default();
    let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default();

    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut acceleration_structure)
        .push_next(&mut ray_tracing_pipeline)
        .push_next(&mut vulkan12);

    unsafe {
        instance.get_physical_device_features2(physical_device, &mut features2);
    }

    acceleration_structure.acceleration_structure == vk::TRUE
        && ray_tracing_pipeline.ray_tracing_pipeline == vk::TRUE
        && vulkan12.buffer_device_address == vk::TRUE
}

/// Queue handles retrieved after logical-device creation, with the
/// graphics-queue fallback applied for absent compute/transfer roles.
pub(crate) struct DeviceQueues {
    pub graphics: vk::Queue,
    pub compute: vk::Queue,
    pub transfer: vk::Queue,
    pub present: vk::Queue,
}

/// Create the logical device with one queue per unique selected family.
pub(crate) fn create_logical_device(
    instance: &ash::Instance,
    selected: &SelectedDevice,
    extensions: &[&CStr],
    require_ray_tracing: bool,
) -> Result<(ash::Device, DeviceQueues)> {
    let queue_priorities = [1.0];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = selected
        .queue_infos
        .unique_family_indices()
        .into_iter()
        .map(|family_index| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family_index)
                .queue_priorities(&queue_priorities)
        })
        .collect();

    let extension_names: Vec<*const std::ffi::c_char> =
        extensions.iter().map(|e| e.as_ptr()).collect();

    let device_features = vk::PhysicalDeviceFeatures::default().sampler_anisotropy(true);

    let mut acceleration_structure = vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
        .acceleration_structure(true);
    let mut ray_tracing_pipeline =
        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default().ray_tracing_pipeline(true);
    let mut vulkan12 = vk::PhysicalDeviceVulkan12Features::default().buffer_device_address(true);

    let mut device_create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&device_features);

    if require_ray_tracing {
        device_create_info = device_create_info
            .push_next(&mut acceleration_structure)
            .push_next(&mut ray_tracing_pipeline)
            .push_next(&mut vulkan12);
    }

    let device = unsafe {
        instance
            .create_device(selected.physical_device, &device_create_info, None)
            .map_err(|e| {
                Error::InitializationFailed(format!("Failed to create logical device: {:?}", e))
            })?
    };

    let infos = &selected.queue_infos;
    let queues = unsafe {
        let graphics = device.get_device_queue(infos.graphics_queue_index, 0);
        let compute = infos
            .compute_queue_index
            .map(|idx| device.get_device_queue(idx, 0))
            .unwrap_or(graphics);
        let transfer = infos
            .transfer_queue_index
            .map(|idx| device.get_device_queue(idx, 0))
            .unwrap_or(graphics);
        let present = device.get_device_queue(infos.presentation_queue_index, 0);
        DeviceQueues {
            graphics,
            compute,
            transfer,
            present,
        }
    };

    Ok((device, queues))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "vulkan_device_tests.rs"]
mod tests;
