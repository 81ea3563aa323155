use std::mem::size_of;
use std::ptr::copy_nonoverlapping as memcpy;
use std::time::Instant;

use anyhow::{anyhow, Result};
use glam::{Mat4, Vec3};
use log::*;
use vulkanalia::{
    loader::{LibloadingLoader, LIBRARY},
    vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSwapchainExtension},
    Entry,
};
use winit::window::Window;

use buffer::VulkanBuffer;
use command_buffer::VulkanCommandBuffer;
use context::VulkanContext;
use descriptor::{UniformBufferObject, VulkanDescriptor};
use device::VulkanDevice;
use framebuffer::VulkanFramebuffer;
use instance::VulkanInstance;
use self::image::VulkanImage;
use pipeline::VulkanPipeline;
use render_pass::VulkanRenderPass;
use swapchain::VulkanSwapchain;

use crate::config::EngineConfig;

mod buffer;
mod command_buffer;
mod constants;
mod context;
mod descriptor;
mod device;
mod framebuffer;
mod image;
mod instance;
mod pipeline;
mod render_pass;
mod swapchain;
mod vertex;

pub use swapchain::SwapchainPreferences;

/// Round-robin advance through the in-flight slots.
const fn next_frame_slot(current: usize, in_flight: usize) -> usize {
    (current + 1) % in_flight
}

#[derive(Debug)]
pub struct VulkanRenderer {
    // Held so the Vulkan library stays loaded for the device's lifetime.
    #[allow(dead_code)]
    entry: Entry,
    instance: VulkanInstance,
    device: VulkanDevice,
    context: VulkanContext,
    config: EngineConfig,
    /// Current in-flight slot, always within [0, MAX_FRAMES_IN_FLIGHT).
    frame: usize,
    /// Set by the windowing layer when the framebuffer size changed.
    pub resized: bool,
    start: Instant,
}

impl VulkanRenderer {
    pub unsafe fn new(window: &Window, config: EngineConfig) -> Result<VulkanRenderer> {
        let loader = LibloadingLoader::new(LIBRARY)?;
        let entry = Entry::new(loader).map_err(|b| anyhow!("{}", b))?;

        let mut context = VulkanContext::default();
        let instance = VulkanInstance::new(window, &entry, &mut context)?;
        VulkanSwapchain::create_surface(window, &instance.vk_instance, &mut context)?;
        let device = VulkanDevice::new(&entry, &instance, &mut context)?;

        VulkanSwapchain::create(window, &instance, &device, &mut context, &config.swapchain)?;
        VulkanSwapchain::create_image_views(&device, &mut context)?;

        VulkanRenderPass::create(&device, &mut context)?;
        VulkanDescriptor::create_set_layout(&device, &mut context)?;
        VulkanPipeline::create(&device, &mut context, &config)?;
        VulkanFramebuffer::create(&device, &mut context)?;
        VulkanCommandBuffer::create_command_pool(&instance, &device, &mut context)?;

        VulkanImage::create_texture_image(&instance, &device, &mut context, &config.texture)?;
        VulkanImage::create_texture_image_view(&device, &mut context)?;
        VulkanImage::create_texture_sampler(&instance, &device, &mut context)?;

        VulkanBuffer::create_vertex_buffer(&instance, &device, &mut context)?;
        VulkanBuffer::create_index_buffer(&instance, &device, &mut context)?;
        VulkanBuffer::create_uniform_buffers(&instance, &device, &mut context)?;

        VulkanDescriptor::create_pool(&device, &mut context)?;
        VulkanDescriptor::create_sets(&device, &mut context)?;
        VulkanCommandBuffer::create_command_buffers(&device, &mut context)?;

        VulkanRenderer::create_sync_objects(&device, &mut context)?;

        let renderer = VulkanRenderer {
            entry,
            instance,
            device,
            context,
            config,
            frame: 0,
            resized: false,
            start: Instant::now(),
        };
        renderer.assert_per_image_parity();

        Ok(renderer)
    }

    unsafe fn create_sync_objects(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Fences start signaled so the very first wait falls through.
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        for _ in 0..constants::MAX_FRAMES_IN_FLIGHT {
            context
                .image_available_semaphores
                .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
            context
                .render_finished_semaphores
                .push(device.vk_device.create_semaphore(&semaphore_info, None)?);
            context
                .in_flight_fences
                .push(device.vk_device.create_fence(&fence_info, None)?);
        }

        context.images_in_flight = context
            .swapchain_images
            .iter()
            .map(|_| vk::Fence::null())
            .collect();

        Ok(())
    }

    /// One frame: wait for the slot's fence, acquire an image, guard against
    /// the presentation engine handing back an image an older frame still
    /// owns, refresh that image's uniforms, submit, present, advance.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        let in_flight_fence = self.context.in_flight_fences[self.frame];

        self.device
            .vk_device
            .wait_for_fences(&[in_flight_fence], true, u64::MAX)?;

        let result = self.device.vk_device.acquire_next_image_khr(
            self.context.swapchain,
            u64::MAX,
            self.context.image_available_semaphores[self.frame],
            vk::Fence::null(),
        );

        let image_index = match result {
            Ok((image_index, _)) => image_index as usize,
            // Stale swapchain: rebuild and abandon this frame cleanly.
            Err(vk::ErrorCode::OUT_OF_DATE_KHR) => return self.recreate_swapchain(window),
            Err(e) => return Err(anyhow!(e)),
        };

        if !self.context.images_in_flight[image_index].is_null() {
            self.device.vk_device.wait_for_fences(
                &[self.context.images_in_flight[image_index]],
                true,
                u64::MAX,
            )?;
        }
        self.context.images_in_flight[image_index] = in_flight_fence;

        self.update_uniform_buffer(image_index)?;

        let wait_semaphores = &[self.context.image_available_semaphores[self.frame]];
        let wait_stages = &[vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = &[self.context.command_buffers[image_index]];
        let signal_semaphores = &[self.context.render_finished_semaphores[self.frame]];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(wait_semaphores)
            .wait_dst_stage_mask(wait_stages)
            .command_buffers(command_buffers)
            .signal_semaphores(signal_semaphores);

        self.device.vk_device.reset_fences(&[in_flight_fence])?;

        self.device.vk_device.queue_submit(
            self.context.graphics_queue,
            &[submit_info],
            in_flight_fence,
        )?;

        let swapchains = &[self.context.swapchain];
        let image_indices = &[image_index as u32];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(signal_semaphores)
            .swapchains(swapchains)
            .image_indices(image_indices);

        let result = self
            .device
            .vk_device
            .queue_present_khr(self.context.present_queue, &present_info);

        let stale = result == Ok(vk::SuccessCode::SUBOPTIMAL_KHR)
            || result == Err(vk::ErrorCode::OUT_OF_DATE_KHR);
        if self.resized || stale {
            self.resized = false;
            self.recreate_swapchain(window)?;
        } else if let Err(e) = result {
            return Err(anyhow!(e));
        }

        self.frame = next_frame_slot(self.frame, constants::MAX_FRAMES_IN_FLIGHT);

        Ok(())
    }

    unsafe fn update_uniform_buffer(&self, image_index: usize) -> Result<()> {
        let time = self.start.elapsed().as_secs_f32();

        let model = Mat4::from_rotation_z(time * 90.0_f32.to_radians());
        let view = Mat4::look_at_rh(Vec3::new(2.0, 2.0, 2.0), Vec3::ZERO, Vec3::Z);
        let aspect = self.context.swapchain_extent.width as f32
            / self.context.swapchain_extent.height as f32;
        // No y-flip here: the quad is wound clockwise for Vulkan's y-down
        // clip space and the pipeline culls accordingly.
        let proj = Mat4::perspective_rh(45.0_f32.to_radians(), aspect, 0.1, 10.0);

        let ubo = UniformBufferObject { model, view, proj };

        let memory = self.device.vk_device.map_memory(
            self.context.uniform_buffers_memory[image_index],
            0,
            size_of::<UniformBufferObject>() as u64,
            vk::MemoryMapFlags::empty(),
        )?;
        memcpy(&ubo, memory.cast(), 1);
        self.device
            .vk_device
            .unmap_memory(self.context.uniform_buffers_memory[image_index]);

        Ok(())
    }

    /// Tear down and rebuild everything derived from the surface, in
    /// dependency order. The image count may change across this boundary, so
    /// every per-image vector is rebuilt before the next indexed access.
    pub unsafe fn recreate_swapchain(&mut self, window: &Window) -> Result<()> {
        debug!("Recreating swapchain.");

        self.device.vk_device.device_wait_idle()?;
        self.destroy_swapchain();

        VulkanSwapchain::create(
            window,
            &self.instance,
            &self.device,
            &mut self.context,
            &self.config.swapchain,
        )?;
        VulkanSwapchain::create_image_views(&self.device, &mut self.context)?;
        VulkanRenderPass::create(&self.device, &mut self.context)?;
        VulkanPipeline::create(&self.device, &mut self.context, &self.config)?;
        VulkanFramebuffer::create(&self.device, &mut self.context)?;
        VulkanBuffer::create_uniform_buffers(&self.instance, &self.device, &mut self.context)?;
        VulkanDescriptor::create_pool(&self.device, &mut self.context)?;
        VulkanDescriptor::create_sets(&self.device, &mut self.context)?;
        VulkanCommandBuffer::create_command_buffers(&self.device, &mut self.context)?;

        self.context.images_in_flight = self
            .context
            .swapchain_images
            .iter()
            .map(|_| vk::Fence::null())
            .collect();

        self.assert_per_image_parity();

        Ok(())
    }

    unsafe fn destroy_swapchain(&mut self) {
        let device = &self.device.vk_device;

        device.free_command_buffers(self.context.command_pool, &self.context.command_buffers);
        self.context.command_buffers.clear();

        self.context
            .framebuffers
            .iter()
            .for_each(|f| device.destroy_framebuffer(*f, None));
        self.context.framebuffers.clear();

        device.destroy_pipeline(self.context.pipeline, None);
        device.destroy_pipeline_layout(self.context.pipeline_layout, None);
        device.destroy_render_pass(self.context.render_pass, None);

        self.context
            .swapchain_image_views
            .iter()
            .for_each(|v| device.destroy_image_view(*v, None));
        self.context.swapchain_image_views.clear();

        device.destroy_swapchain_khr(self.context.swapchain, None);

        self.context
            .uniform_buffers
            .iter()
            .for_each(|b| device.destroy_buffer(*b, None));
        self.context
            .uniform_buffers_memory
            .iter()
            .for_each(|m| device.free_memory(*m, None));
        self.context.uniform_buffers.clear();
        self.context.uniform_buffers_memory.clear();

        // Sets are returned with the pool.
        device.destroy_descriptor_pool(self.context.descriptor_pool, None);
        self.context.descriptor_sets.clear();
    }

    pub unsafe fn destroy(&mut self) {
        if let Err(err) = self.device.vk_device.device_wait_idle() {
            warn!("Device wait before teardown failed: {:?}", err);
        }

        self.destroy_swapchain();

        let device = &self.device.vk_device;

        self.context
            .in_flight_fences
            .iter()
            .for_each(|f| device.destroy_fence(*f, None));
        self.context
            .render_finished_semaphores
            .iter()
            .for_each(|s| device.destroy_semaphore(*s, None));
        self.context
            .image_available_semaphores
            .iter()
            .for_each(|s| device.destroy_semaphore(*s, None));

        device.destroy_descriptor_set_layout(self.context.descriptor_set_layout, None);

        device.destroy_buffer(self.context.index_buffer, None);
        device.free_memory(self.context.index_buffer_memory, None);
        device.destroy_buffer(self.context.vertex_buffer, None);
        device.free_memory(self.context.vertex_buffer_memory, None);

        device.destroy_sampler(self.context.texture_sampler, None);
        device.destroy_image_view(self.context.texture_image_view, None);
        device.destroy_image(self.context.texture_image, None);
        device.free_memory(self.context.texture_image_memory, None);

        device.destroy_command_pool(self.context.command_pool, None);

        self.device.destroy();
        self.instance.destroy(&mut self.context);
    }

    fn assert_per_image_parity(&self) {
        let images = self.context.swapchain_images.len();
        debug_assert_eq!(self.context.swapchain_image_views.len(), images);
        debug_assert_eq!(self.context.framebuffers.len(), images);
        debug_assert_eq!(self.context.command_buffers.len(), images);
        debug_assert_eq!(self.context.uniform_buffers.len(), images);
        debug_assert_eq!(self.context.uniform_buffers_memory.len(), images);
        debug_assert_eq!(self.context.descriptor_sets.len(), images);
        debug_assert_eq!(self.context.images_in_flight.len(), images);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_slots_alternate_with_two_in_flight() {
        let mut frame = 0;
        let mut observed = Vec::new();
        for _ in 0..6 {
            observed.push(frame);
            frame = next_frame_slot(frame, constants::MAX_FRAMES_IN_FLIGHT);
        }
        assert_eq!(observed, vec![0, 1, 0, 1, 0, 1]);
    }

    #[test]
    fn frame_slot_never_leaves_range() {
        let mut frame = 0;
        for _ in 0..100 {
            frame = next_frame_slot(frame, constants::MAX_FRAMES_IN_FLIGHT);
            assert!(frame < constants::MAX_FRAMES_IN_FLIGHT);
        }
    }
}
