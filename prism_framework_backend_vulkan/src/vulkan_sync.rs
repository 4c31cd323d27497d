/// Fence and semaphore resources
///
/// Fences are CPU-observable completion signals; semaphores order work
/// between queue submissions and never reach the CPU. Both are created
/// through the backend's factories and owned by the resource arena.

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;

/// CPU-observable completion signal for a batch of device work
pub struct Fence {
    pub(crate) fence: vk::Fence,
}

impl Fence {
    pub(crate) fn create(device: &ash::Device, signaled: bool) -> Result<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe {
            device.create_fence(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create fence: {:?}", e);
                Error::ResourceCreationFailed(format!("Failed to create fence: {:?}", e))
            })?
        };

        Ok(Self { fence })
    }

    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

/// GPU-side-only ordering primitive between queue submissions
pub struct Semaphore {
    pub(crate) semaphore: vk::Semaphore,
}

impl Semaphore {
    pub(crate) fn create(device: &ash::Device) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe {
            device.create_semaphore(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create semaphore: {:?}", e);
                Error::ResourceCreationFailed(format!("Failed to create semaphore: {:?}", e))
            })?
        };

        Ok(Self { semaphore })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}
