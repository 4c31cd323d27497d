/// Buffer resource backed by the external GPU allocator
///
/// The allocator (gpu-allocator) does all block/sub-allocation; this module
/// only adds alignment and mapping policy on top: callers may request a
/// minimum alignment, and host-visible buffers stay persistently mapped for
/// their whole lifetime.

use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;
use std::sync::Mutex;

/// Round `value` up to the next multiple of `alignment` (power of two).
pub fn aligned_size(value: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    (value + alignment - 1) & !(alignment - 1)
}

/// Buffer creation parameters
#[derive(Clone)]
pub struct BufferDesc {
    pub usage: vk::BufferUsageFlags,
    pub size: vk::DeviceSize,
    /// Extra minimum alignment on top of what the driver reports
    pub alignment: Option<vk::DeviceSize>,
    pub location: MemoryLocation,
    /// Debug name forwarded to the allocator
    pub name: &'static str,
}

impl Default for BufferDesc {
    fn default() -> Self {
        Self {
            usage: vk::BufferUsageFlags::empty(),
            size: 0,
            alignment: None,
            location: MemoryLocation::GpuOnly,
            name: "buffer",
        }
    }
}

/// Vulkan buffer plus its allocation
pub struct Buffer {
    pub(crate) buffer: vk::Buffer,
    pub(crate) allocation: Option<Allocation>,
    pub(crate) size: vk::DeviceSize,
    pub(crate) usage: vk::BufferUsageFlags,
    pub(crate) device_address: Option<vk::DeviceAddress>,
}

impl Buffer {
    /// Create a buffer; when `data` is given the buffer must be host-visible
    /// and the bytes are copied into the mapped allocation immediately.
    pub(crate) fn create(
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        desc: &BufferDesc,
        data: Option<&[u8]>,
    ) -> Result<Self> {
        if desc.size == 0 {
            return Err(Error::InvalidResource("buffer size must be non-zero".to_string()));
        }
        if let Some(data) = data {
            if desc.location == MemoryLocation::GpuOnly {
                return Err(Error::InvalidResource(
                    "initial data requires a host-visible buffer; use BatchUploader for device-local uploads".to_string(),
                ));
            }
            if data.len() as vk::DeviceSize > desc.size {
                return Err(Error::InvalidResource(format!(
                    "initial data ({} bytes) exceeds buffer size ({} bytes)",
                    data.len(),
                    desc.size
                )));
            }
        }

        unsafe {
            let create_info = vk::BufferCreateInfo::default()
                .size(desc.size)
                .usage(desc.usage)
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = device.create_buffer(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create buffer ({} bytes): {:?}", desc.size, e);
                Error::ResourceCreationFailed(format!("Failed to create buffer: {:?}", e))
            })?;

            let mut requirements = device.get_buffer_memory_requirements(buffer);
            if let Some(alignment) = desc.alignment {
                requirements.alignment = requirements.alignment.max(alignment);
            }

            let allocation = allocator
                .lock()
                .unwrap()
                .allocate(&AllocationCreateDesc {
                    name: desc.name,
                    requirements,
                    location: desc.location,
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                })
                .map_err(|_e| {
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    prism_error!("prism::vulkan", "Out of GPU memory for buffer '{}' ({:.2} MB)", desc.name, size_mb);
                    device.destroy_buffer(buffer, None);
                    Error::OutOfMemory
                })?;

            device
                .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                .map_err(|e| {
                    prism_error!("prism::vulkan", "Failed to bind buffer memory: {:?}", e);
                    Error::ResourceCreationFailed(format!("Failed to bind buffer memory: {:?}", e))
                })?;

            if let Some(data) = data {
                // Host-visible path was validated above; allocation is mapped
                let mapped = allocation
                    .mapped_ptr()
                    .ok_or_else(|| Error::BackendError("host-visible allocation is not mapped".to_string()))?
                    .as_ptr() as *mut u8;
                std::ptr::copy_nonoverlapping(data.as_ptr(), mapped, data.len());
            }

            let device_address = if desc
                .usage
                .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
            {
                let info = vk::BufferDeviceAddressInfo::default().buffer(buffer);
                Some(device.get_buffer_device_address(&info))
            } else {
                None
            };

            Ok(Self {
                buffer,
                allocation: Some(allocation),
                size: desc.size,
                usage: desc.usage,
                device_address,
            })
        }
    }

    /// Copy bytes into the mapped region at `offset`. Host-visible buffers only.
    pub(crate) fn upload_data(&self, data: &[u8], offset: vk::DeviceSize) -> Result<()> {
        let mapped = self
            .mapped_ptr()
            .ok_or_else(|| Error::InvalidResource("buffer is not CPU-accessible".to_string()))?;

        if offset + data.len() as vk::DeviceSize > self.size {
            return Err(Error::InvalidResource(format!(
                "upload of {} bytes at offset {} exceeds buffer size {}",
                data.len(),
                offset,
                self.size
            )));
        }

        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(offset as usize), data.len());
        }
        Ok(())
    }

    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    pub fn usage(&self) -> vk::BufferUsageFlags {
        self.usage
    }

    /// Base of the persistent mapping, if host-visible
    pub fn mapped_ptr(&self) -> Option<*mut u8> {
        self.allocation
            .as_ref()
            .and_then(|a| a.mapped_ptr())
            .map(|p| p.as_ptr() as *mut u8)
    }

    /// GPU virtual address, present when created with SHADER_DEVICE_ADDRESS
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_address
    }

    pub(crate) fn destroy(&mut self, device: &ash::Device, allocator: &Mutex<Allocator>) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if the lock fails - the buffer still has to go
                if let Ok(mut allocator) = allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            device.destroy_buffer(self.buffer, None);
            self.buffer = vk::Buffer::null();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "vulkan_buffer_tests.rs"]
mod tests;
