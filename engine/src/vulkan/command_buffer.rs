use anyhow::{Ok, Result};
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};
use vulkanalia::Device;

use super::{
    context::VulkanContext,
    device::{QueueFamilyIndices, VulkanDevice},
    instance::VulkanInstance,
    vertex::INDICES,
};

/// A single-use command buffer tied to the lifetime of this guard. Recording
/// starts on `begin`; `submit` ends recording, submits to the graphics queue
/// and blocks until the queue drains. The buffer is freed when the guard
/// drops, on every exit path.
pub struct OneTimeCommands<'a> {
    device: &'a Device,
    pool: vk::CommandPool,
    queue: vk::Queue,
    buffer: vk::CommandBuffer,
}

impl<'a> OneTimeCommands<'a> {
    pub unsafe fn begin(
        device: &'a VulkanDevice,
        context: &VulkanContext,
    ) -> Result<OneTimeCommands<'a>> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let buffer = device.vk_device.allocate_command_buffers(&allocate_info)?[0];

        let commands = OneTimeCommands {
            device: &device.vk_device,
            pool: context.command_pool,
            queue: context.graphics_queue,
            buffer,
        };

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        commands.device.begin_command_buffer(buffer, &begin_info)?;

        Ok(commands)
    }

    pub fn buffer(&self) -> vk::CommandBuffer {
        self.buffer
    }

    pub unsafe fn submit(self) -> Result<()> {
        self.device.end_command_buffer(self.buffer)?;

        let command_buffers = &[self.buffer];
        let submit_info = vk::SubmitInfo::builder().command_buffers(command_buffers);

        self.device
            .queue_submit(self.queue, &[submit_info], vk::Fence::null())?;
        self.device.queue_wait_idle(self.queue)?;

        Ok(())
    }
}

impl Drop for OneTimeCommands<'_> {
    fn drop(&mut self) {
        unsafe {
            self.device.free_command_buffers(self.pool, &[self.buffer]);
        }
    }
}

/// Record and synchronously execute a one-off transfer/barrier batch.
pub unsafe fn run_one_time<F>(device: &VulkanDevice, context: &VulkanContext, f: F) -> Result<()>
where
    F: FnOnce(&Device, vk::CommandBuffer) -> Result<()>,
{
    let commands = OneTimeCommands::begin(device, context)?;
    f(&device.vk_device, commands.buffer())?;
    commands.submit()
}

#[derive(Debug)]
pub struct VulkanCommandBuffer;

impl VulkanCommandBuffer {
    pub unsafe fn create_command_pool(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let indices = QueueFamilyIndices::get(instance, context, context.physical_device)?;

        let info = vk::CommandPoolCreateInfo::builder()
            .flags(vk::CommandPoolCreateFlags::empty())
            .queue_family_index(indices.graphics);

        context.command_pool = device.vk_device.create_command_pool(&info, None)?;

        Ok(())
    }

    /// Pre-record one command buffer per framebuffer: clear, bind the quad's
    /// pipeline and buffers plus the image's descriptor set, indexed draw.
    pub unsafe fn create_command_buffers(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(context.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(context.framebuffers.len() as u32);

        context.command_buffers = device.vk_device.allocate_command_buffers(&allocate_info)?;

        for (i, command_buffer) in context.command_buffers.iter().enumerate() {
            let info = vk::CommandBufferBeginInfo::builder();

            device
                .vk_device
                .begin_command_buffer(*command_buffer, &info)?;

            let render_area = vk::Rect2D::builder()
                .offset(vk::Offset2D::default())
                .extent(context.swapchain_extent);

            let color_clear_value = vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            };

            let clear_values = &[color_clear_value];
            let info = vk::RenderPassBeginInfo::builder()
                .render_pass(context.render_pass)
                .framebuffer(context.framebuffers[i])
                .render_area(render_area)
                .clear_values(clear_values);

            device.vk_device.cmd_begin_render_pass(
                *command_buffer,
                &info,
                vk::SubpassContents::INLINE,
            );

            device.vk_device.cmd_bind_pipeline(
                *command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline,
            );
            device.vk_device.cmd_bind_vertex_buffers(
                *command_buffer,
                0,
                &[context.vertex_buffer],
                &[0],
            );
            device.vk_device.cmd_bind_index_buffer(
                *command_buffer,
                context.index_buffer,
                0,
                vk::IndexType::UINT16,
            );
            device.vk_device.cmd_bind_descriptor_sets(
                *command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                context.pipeline_layout,
                0,
                &[context.descriptor_sets[i]],
                &[],
            );
            device
                .vk_device
                .cmd_draw_indexed(*command_buffer, INDICES.len() as u32, 1, 0, 0, 0);

            device.vk_device.cmd_end_render_pass(*command_buffer);

            device.vk_device.end_command_buffer(*command_buffer)?;
        }

        Ok(())
    }
}
