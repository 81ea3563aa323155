use std::path::Path;
use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::{anyhow, Context, Ok, Result};
use log::*;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0};

use super::buffer::{find_memory_type, VulkanBuffer};
use super::command_buffer::OneTimeCommands;
use super::context::VulkanContext;
use super::device::VulkanDevice;
use super::instance::VulkanInstance;

/// All textures go through the same fixed format.
const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// Stage and access masks for the two layout transitions the renderer
/// performs while uploading a texture.
fn barrier_masks(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> Result<(
    vk::AccessFlags,
    vk::AccessFlags,
    vk::PipelineStageFlags,
    vk::PipelineStageFlags,
)> {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => Ok((
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        )),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => {
            Ok((
                vk::AccessFlags::TRANSFER_WRITE,
                vk::AccessFlags::SHADER_READ,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
            ))
        }
        _ => Err(anyhow!(
            "Unsupported image layout transition ({:?} -> {:?}).",
            old_layout,
            new_layout
        )),
    }
}

#[derive(Debug)]
pub struct VulkanImage;

impl VulkanImage {
    /// 2D, single mip, single layer, optimal tiling; the memory-type search
    /// mirrors the buffer path.
    pub unsafe fn create_image(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        width: u32,
        height: u32,
        usage: vk::ImageUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Image, vk::DeviceMemory)> {
        let info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::_2D)
            .extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .format(TEXTURE_FORMAT)
            .tiling(vk::ImageTiling::OPTIMAL)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .samples(vk::SampleCountFlags::_1);

        let image = device.vk_device.create_image(&info, None)?;

        let requirements = device.vk_device.get_image_memory_requirements(image);
        let memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);

        let memory_type_index = match find_memory_type(
            &memory_properties,
            requirements.memory_type_bits,
            properties,
        ) {
            std::result::Result::Ok(index) => index,
            Err(err) => {
                device.vk_device.destroy_image(image, None);
                return Err(err.into());
            }
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match device.vk_device.allocate_memory(&allocate_info, None) {
            std::result::Result::Ok(memory) => memory,
            Err(err) => {
                device.vk_device.destroy_image(image, None);
                return Err(err.into());
            }
        };

        device.vk_device.bind_image_memory(image, memory, 0)?;

        Ok((image, memory))
    }

    pub unsafe fn create_image_view(
        device: &VulkanDevice,
        image: vk::Image,
        format: vk::Format,
    ) -> Result<vk::ImageView> {
        let subresource_range = vk::ImageSubresourceRange::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::_2D)
            .format(format)
            .subresource_range(subresource_range);

        Ok(device.vk_device.create_image_view(&info, None)?)
    }

    unsafe fn transition_image_layout(
        device: &VulkanDevice,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) -> Result<()> {
        let (src_access_mask, dst_access_mask, src_stage_mask, dst_stage_mask) =
            barrier_masks(old_layout, new_layout)?;

        let subresource_range = vk::ImageSubresourceRange::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .base_mip_level(0)
            .level_count(1)
            .base_array_layer(0)
            .layer_count(1);

        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(src_access_mask)
            .dst_access_mask(dst_access_mask);

        device.vk_device.cmd_pipeline_barrier(
            command_buffer,
            src_stage_mask,
            dst_stage_mask,
            vk::DependencyFlags::empty(),
            &[] as &[vk::MemoryBarrier],
            &[] as &[vk::BufferMemoryBarrier],
            &[barrier],
        );

        Ok(())
    }

    unsafe fn copy_buffer_to_image(
        device: &VulkanDevice,
        command_buffer: vk::CommandBuffer,
        buffer: vk::Buffer,
        image: vk::Image,
        width: u32,
        height: u32,
    ) {
        let subresource = vk::ImageSubresourceLayers::builder()
            .aspect_mask(vk::ImageAspectFlags::COLOR)
            .mip_level(0)
            .base_array_layer(0)
            .layer_count(1);

        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(subresource)
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D {
                width,
                height,
                depth: 1,
            });

        device.vk_device.cmd_copy_buffer_to_image(
            command_buffer,
            buffer,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    /// Decode the texture file, stage its pixels, and move them into a
    /// device-local sampled image with the two layout transitions recorded
    /// into a single one-time command buffer.
    pub unsafe fn create_texture_image(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        path: &Path,
    ) -> Result<()> {
        let decoded = image::open(path)
            .with_context(|| format!("Failed to decode texture `{}`.", path.display()))?
            .to_rgba8();
        let (width, height) = decoded.dimensions();
        let pixels = decoded.into_raw();
        let size = pixels.len() as vk::DeviceSize;

        info!("Loaded texture `{}` ({}x{}).", path.display(), width, height);

        let (staging_buffer, staging_memory) = VulkanBuffer::create_buffer(
            instance,
            device,
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_SRC,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )?;

        let memory =
            device
                .vk_device
                .map_memory(staging_memory, 0, size, vk::MemoryMapFlags::empty())?;
        memcpy(pixels.as_ptr(), memory.cast(), pixels.len());
        device.vk_device.unmap_memory(staging_memory);

        let result = VulkanImage::create_image(
            instance,
            device,
            context,
            width,
            height,
            vk::ImageUsageFlags::TRANSFER_DST | vk::ImageUsageFlags::SAMPLED,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|(image, image_memory)| {
            let upload = (|| {
                let commands = OneTimeCommands::begin(device, context)?;
                VulkanImage::transition_image_layout(
                    device,
                    commands.buffer(),
                    image,
                    vk::ImageLayout::UNDEFINED,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                )?;
                VulkanImage::copy_buffer_to_image(
                    device,
                    commands.buffer(),
                    staging_buffer,
                    image,
                    width,
                    height,
                );
                VulkanImage::transition_image_layout(
                    device,
                    commands.buffer(),
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                )?;
                commands.submit()
            })();

            match upload {
                std::result::Result::Ok(()) => Ok((image, image_memory)),
                Err(err) => {
                    device.vk_device.destroy_image(image, None);
                    device.vk_device.free_memory(image_memory, None);
                    Err(err)
                }
            }
        });

        device.vk_device.destroy_buffer(staging_buffer, None);
        device.vk_device.free_memory(staging_memory, None);

        let (image, image_memory) = result?;
        context.texture_image = image;
        context.texture_image_memory = image_memory;

        Ok(())
    }

    pub unsafe fn create_texture_image_view(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.texture_image_view =
            VulkanImage::create_image_view(device, context.texture_image, TEXTURE_FORMAT)?;
        Ok(())
    }

    pub unsafe fn create_texture_sampler(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let properties = instance
            .vk_instance
            .get_physical_device_properties(context.physical_device);

        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(properties.limits.max_sampler_anisotropy)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(0.0);

        context.texture_sampler = device.vk_device.create_sampler(&info, None)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_transition_targets_transfer_stage() {
        let (src_access, dst_access, src_stage, dst_stage) = barrier_masks(
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        )
        .unwrap();

        assert_eq!(src_access, vk::AccessFlags::empty());
        assert_eq!(dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);
    }

    #[test]
    fn sample_transition_targets_fragment_stage() {
        let (src_access, dst_access, src_stage, dst_stage) = barrier_masks(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        )
        .unwrap();

        assert_eq!(src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(src_stage, vk::PipelineStageFlags::TRANSFER);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn unknown_transition_is_rejected() {
        let result = barrier_masks(
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
        );
        assert!(result.is_err());
    }
}
