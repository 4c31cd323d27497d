/// Sampler resource and the backend's default sampler set

use ash::vk;
use prism_framework::prism::{Error, Result};
use prism_framework::prism_error;

use crate::vulkan_arena::SamplerHandle;

/// Sampler creation parameters
#[derive(Clone, Copy)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode_u: vk::SamplerAddressMode,
    pub address_mode_v: vk::SamplerAddressMode,
    pub address_mode_w: vk::SamplerAddressMode,
    pub mip_lod_bias: f32,
    pub anisotropy_enable: bool,
    pub max_anisotropy: f32,
    pub compare_enable: bool,
    pub compare_op: vk::CompareOp,
    pub min_lod: f32,
    pub max_lod: f32,
    pub border_color: vk::BorderColor,
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::LINEAR,
            address_mode_u: vk::SamplerAddressMode::REPEAT,
            address_mode_v: vk::SamplerAddressMode::REPEAT,
            address_mode_w: vk::SamplerAddressMode::REPEAT,
            mip_lod_bias: 0.0,
            anisotropy_enable: false,
            max_anisotropy: 1.0,
            compare_enable: false,
            compare_op: vk::CompareOp::NEVER,
            min_lod: 0.0,
            max_lod: vk::LOD_CLAMP_NONE,
            border_color: vk::BorderColor::INT_OPAQUE_BLACK,
            unnormalized_coordinates: false,
        }
    }
}

pub struct Sampler {
    pub(crate) sampler: vk::Sampler,
}

impl Sampler {
    pub(crate) fn create(device: &ash::Device, desc: &SamplerDesc) -> Result<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(desc.mag_filter)
            .min_filter(desc.min_filter)
            .mipmap_mode(desc.mipmap_mode)
            .address_mode_u(desc.address_mode_u)
            .address_mode_v(desc.address_mode_v)
            .address_mode_w(desc.address_mode_w)
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(desc.anisotropy_enable)
            .max_anisotropy(desc.max_anisotropy)
            .compare_enable(desc.compare_enable)
            .compare_op(desc.compare_op)
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(desc.border_color)
            .unnormalized_coordinates(desc.unnormalized_coordinates);

        let sampler = unsafe {
            device.create_sampler(&create_info, None).map_err(|e| {
                prism_error!("prism::vulkan", "Failed to create sampler: {:?}", e);
                Error::ResourceCreationFailed(format!("Failed to create sampler: {:?}", e))
            })?
        };

        Ok(Self { sampler })
    }

    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

/// Samplers every application ends up wanting; created once at backend init
pub(crate) struct DefaultSamplers {
    pub bilinear: SamplerHandle,
    pub trilinear: SamplerHandle,
    pub nearest: SamplerHandle,
}

impl DefaultSamplers {
    /// Descs in (bilinear, trilinear, nearest) order
    pub(crate) fn descs() -> [SamplerDesc; 3] {
        let bilinear = SamplerDesc {
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            ..Default::default()
        };
        let trilinear = SamplerDesc::default();
        let nearest = SamplerDesc {
            mag_filter: vk::Filter::NEAREST,
            min_filter: vk::Filter::NEAREST,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            ..Default::default()
        };
        [bilinear, trilinear, nearest]
    }
}
