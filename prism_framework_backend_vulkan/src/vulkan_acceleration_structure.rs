/// Acceleration-structure resource (ray tracing)
///
/// Creation queries the build sizes for the supplied geometry, allocates the
/// backing buffer, and creates the structure; the actual build command is
/// recorded later by the BatchUploader so many structures can share one
/// consolidated build submission.

use ash::vk;
use gpu_allocator::vulkan::Allocator;
use gpu_allocator::MemoryLocation;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;
use std::sync::Mutex;

use crate::vulkan_buffer::{Buffer, BufferDesc};

/// Acceleration-structure creation parameters.
///
/// `geometries` here only size the structure; the geometry actually built can
/// be resupplied to `BatchUploader::build_blas` with per-range primitive data.
pub struct AccelerationStructureDesc {
    pub ty: vk::AccelerationStructureTypeKHR,
    pub flags: vk::BuildAccelerationStructureFlagsKHR,
    pub geometries: Vec<vk::AccelerationStructureGeometryKHR<'static>>,
    pub max_primitive_counts: Vec<u32>,
}

pub struct AccelerationStructure {
    pub(crate) acceleration_structure: vk::AccelerationStructureKHR,
    pub(crate) buffer: Buffer,
    pub(crate) ty: vk::AccelerationStructureTypeKHR,
    pub(crate) flags: vk::BuildAccelerationStructureFlagsKHR,
    pub(crate) build_sizes: vk::AccelerationStructureBuildSizesInfoKHR<'static>,
    pub(crate) device_address: vk::DeviceAddress,
}

impl AccelerationStructure {
    pub(crate) fn create(
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        loader: &ash::khr::acceleration_structure::Device,
        desc: &AccelerationStructureDesc,
    ) -> Result<Self> {
        if desc.geometries.len() != desc.max_primitive_counts.len() {
            return Err(Error::InvalidResource(format!(
                "geometry count ({}) does not match primitive count entries ({})",
                desc.geometries.len(),
                desc.max_primitive_counts.len()
            )));
        }

        unsafe {
            let build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
                .ty(desc.ty)
                .flags(desc.flags)
                .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
                .geometries(&desc.geometries);

            let mut build_sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
            loader.get_acceleration_structure_build_sizes(
                vk::AccelerationStructureBuildTypeKHR::DEVICE,
                &build_info,
                &desc.max_primitive_counts,
                &mut build_sizes,
            );

            let mut buffer = Buffer::create(
                device,
                allocator,
                &BufferDesc {
                    usage: vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                    size: build_sizes.acceleration_structure_size,
                    alignment: None,
                    location: MemoryLocation::GpuOnly,
                    name: "acceleration_structure",
                },
                None,
            )?;

            let create_info = vk::AccelerationStructureCreateInfoKHR::default()
                .buffer(buffer.handle())
                .size(build_sizes.acceleration_structure_size)
                .ty(desc.ty);

            let acceleration_structure = loader
                .create_acceleration_structure(&create_info, None)
                .map_err(|e| {
                    prism_error!(
                        "prism::vulkan",
                        "Failed to create acceleration structure: {:?}",
                        e
                    );
                    buffer.destroy(device, allocator);
                    Error::ResourceCreationFailed(format!(
                        "Failed to create acceleration structure: {:?}",
                        e
                    ))
                })?;

            let address_info = vk::AccelerationStructureDeviceAddressInfoKHR::default()
                .acceleration_structure(acceleration_structure);
            let device_address = loader.get_acceleration_structure_device_address(&address_info);

            // p_next chains are dead after the query; keep a plain copy
            let build_sizes_copy = vk::AccelerationStructureBuildSizesInfoKHR::default()
                .acceleration_structure_size(build_sizes.acceleration_structure_size)
                .update_scratch_size(build_sizes.update_scratch_size)
                .build_scratch_size(build_sizes.build_scratch_size);

            Ok(Self {
                acceleration_structure,
                buffer,
                ty: desc.ty,
                flags: desc.flags,
                build_sizes: build_sizes_copy,
                device_address,
            })
        }
    }

    pub fn handle(&self) -> vk::AccelerationStructureKHR {
        self.acceleration_structure
    }

    pub fn ty(&self) -> vk::AccelerationStructureTypeKHR {
        self.ty
    }

    pub fn flags(&self) -> vk::BuildAccelerationStructureFlagsKHR {
        self.flags
    }

    pub fn build_sizes(&self) -> vk::AccelerationStructureBuildSizesInfoKHR<'static> {
        self.build_sizes
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        self.device_address
    }

    pub(crate) fn destroy(
        &mut self,
        device: &ash::Device,
        allocator: &Mutex<Allocator>,
        loader: Option<&ash::khr::acceleration_structure::Device>,
    ) {
        unsafe {
            if let Some(loader) = loader {
                loader.destroy_acceleration_structure(self.acceleration_structure, None);
            }
            self.buffer.destroy(device, allocator);
        }
    }
}
