/// Per-worker command and descriptor pools
///
/// Instead of keying pools off ambient thread identity, recording contexts
/// register themselves once and get a `WorkerId`; every pool lookup is
/// explicit about which worker it serves. Pools are created lazily on first
/// use, never reset behind the caller's back, and torn down en masse when the
/// backend shuts down.
///
/// A command buffer allocated from a worker's pool must be recorded and
/// submitted by that worker only; pools are not synchronized for concurrent
/// recording.

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;
use rustc_hash::FxHashMap;

/// Queue role a command pool serves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueRole {
    Graphics,
    Compute,
    Transfer,
}

/// Opaque identity of a registered recording context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u32);

#[derive(Default)]
struct WorkerPools {
    command_pools: FxHashMap<QueueRole, vk::CommandPool>,
    descriptor_pool: Option<vk::DescriptorPool>,
}

/// All pools for all registered workers
pub(crate) struct PoolRegistry {
    workers: FxHashMap<WorkerId, WorkerPools>,
    next_id: u32,
    ray_tracing: bool,
}

impl PoolRegistry {
    pub fn new(ray_tracing: bool) -> Self {
        Self {
            workers: FxHashMap::default(),
            next_id: 0,
            ray_tracing,
        }
    }

    pub fn register(&mut self) -> WorkerId {
        let id = WorkerId(self.next_id);
        self.next_id += 1;
        self.workers.insert(id, WorkerPools::default());
        id
    }

    /// The worker's command pool for `role`, created on first request
    pub fn command_pool(
        &mut self,
        device: &ash::Device,
        worker: WorkerId,
        role: QueueRole,
        queue_family_index: u32,
    ) -> Result<vk::CommandPool> {
        let pools = self
            .workers
            .get_mut(&worker)
            .ok_or_else(|| Error::InvalidResource(format!("unregistered worker {:?}", worker)))?;

        if let Some(&pool) = pools.command_pools.get(&role) {
            return Ok(pool);
        }

        let create_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue_family_index)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        let pool = unsafe {
            device.create_command_pool(&create_info, None).map_err(|e| {
                prism_error!(
                    "prism::vulkan",
                    "Failed to create {:?} command pool for {:?}: {:?}",
                    role,
                    worker,
                    e
                );
                Error::ResourceCreationFailed(format!("Failed to create command pool: {:?}", e))
            })?
        };

        pools.command_pools.insert(role, pool);
        Ok(pool)
    }

    /// The worker's descriptor pool, created on first request.
    ///
    /// Generous fixed capacity with FREE_DESCRIPTOR_SET so sets are recycled
    /// individually rather than through whole-pool resets.
    pub fn descriptor_pool(
        &mut self,
        device: &ash::Device,
        worker: WorkerId,
    ) -> Result<vk::DescriptorPool> {
        let ray_tracing = self.ray_tracing;
        let pools = self
            .workers
            .get_mut(&worker)
            .ok_or_else(|| Error::InvalidResource(format!("unregistered worker {:?}", worker)))?;

        if let Some(pool) = pools.descriptor_pool {
            return Ok(pool);
        }

        let mut pool_sizes = vec![
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2048,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLED_IMAGE,
                descriptor_count: 1024,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::SAMPLER,
                descriptor_count: 512,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: 1024,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 256,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: 1024,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                descriptor_count: 512,
            },
        ];
        if ray_tracing {
            pool_sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::ACCELERATION_STRUCTURE_KHR,
                descriptor_count: 64,
            });
        }

        let create_info = vk::DescriptorPoolCreateInfo::default()
            .pool_sizes(&pool_sizes)
            .max_sets(1024)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe {
            device
                .create_descriptor_pool(&create_info, None)
                .map_err(|e| {
                    prism_error!(
                        "prism::vulkan",
                        "Failed to create descriptor pool for {:?}: {:?}",
                        worker,
                        e
                    );
                    Error::ResourceCreationFailed(format!(
                        "Failed to create descriptor pool: {:?}",
                        e
                    ))
                })?
        };

        pools.descriptor_pool = Some(pool);
        Ok(pool)
    }

    /// Destroy every pool of every worker. Backend teardown only; the device
    /// must be idle.
    pub fn destroy_all(&mut self, device: &ash::Device) {
        unsafe {
            for (_, pools) in self.workers.drain() {
                for (_, pool) in pools.command_pools {
                    device.destroy_command_pool(pool, None);
                }
                if let Some(pool) = pools.descriptor_pool {
                    device.destroy_descriptor_pool(pool, None);
                }
            }
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
#[path = "vulkan_command_tests.rs"]
mod tests;
