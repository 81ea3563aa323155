use std::mem::size_of;

use anyhow::{Ok, Result};
use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder};

use super::{context::VulkanContext, device::VulkanDevice};

/// Per-frame shader globals, rewritten each frame into the uniform buffer of
/// the acquired swapchain image. Field order matches the shader block.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub model: Mat4,
    pub view: Mat4,
    pub proj: Mat4,
}

#[derive(Debug)]
pub struct VulkanDescriptor;

impl VulkanDescriptor {
    /// Created once at startup; unlike the pool and sets it survives
    /// swapchain recreation.
    pub unsafe fn create_set_layout(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let ubo_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(0)
            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::VERTEX);

        let sampler_binding = vk::DescriptorSetLayoutBinding::builder()
            .binding(1)
            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(1)
            .stage_flags(vk::ShaderStageFlags::FRAGMENT);

        let bindings = &[ubo_binding, sampler_binding];
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);

        context.descriptor_set_layout = device
            .vk_device
            .create_descriptor_set_layout(&info, None)?;

        Ok(())
    }

    pub unsafe fn create_pool(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let count = context.swapchain_images.len() as u32;

        let ubo_size = vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::UNIFORM_BUFFER)
            .descriptor_count(count);
        let sampler_size = vk::DescriptorPoolSize::builder()
            .type_(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .descriptor_count(count);

        let pool_sizes = &[ubo_size, sampler_size];
        let info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(pool_sizes)
            .max_sets(count);

        context.descriptor_pool = device.vk_device.create_descriptor_pool(&info, None)?;

        Ok(())
    }

    /// One set per swapchain image, each pointing at that image's uniform
    /// buffer and the shared texture sampler. Sets are freed with the pool.
    pub unsafe fn create_sets(device: &VulkanDevice, context: &mut VulkanContext) -> Result<()> {
        let layouts = vec![context.descriptor_set_layout; context.swapchain_images.len()];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(context.descriptor_pool)
            .set_layouts(&layouts);

        context.descriptor_sets = device.vk_device.allocate_descriptor_sets(&info)?;

        for i in 0..context.swapchain_images.len() {
            let buffer_info = vk::DescriptorBufferInfo::builder()
                .buffer(context.uniform_buffers[i])
                .offset(0)
                .range(size_of::<UniformBufferObject>() as u64);

            let image_info = vk::DescriptorImageInfo::builder()
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                .image_view(context.texture_image_view)
                .sampler(context.texture_sampler);

            let buffer_infos = &[buffer_info];
            let ubo_write = vk::WriteDescriptorSet::builder()
                .dst_set(context.descriptor_sets[i])
                .dst_binding(0)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                .buffer_info(buffer_infos);

            let image_infos = &[image_info];
            let sampler_write = vk::WriteDescriptorSet::builder()
                .dst_set(context.descriptor_sets[i])
                .dst_binding(1)
                .dst_array_element(0)
                .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                .image_info(image_infos);

            device
                .vk_device
                .update_descriptor_sets(&[ubo_write, sampler_write], &[] as &[vk::CopyDescriptorSet]);
        }

        Ok(())
    }
}
