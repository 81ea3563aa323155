use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Ok, Result};
use vulkanalia::bytecode::Bytecode;
use vulkanalia::vk::{self, DeviceV1_0, Handle, HasBuilder};

use super::{context::VulkanContext, device::VulkanDevice, vertex::Vertex};
use crate::config::EngineConfig;

#[derive(Debug)]
pub struct VulkanPipeline;

impl VulkanPipeline {
    pub unsafe fn create(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        config: &EngineConfig,
    ) -> Result<()> {
        let vert = load_shader(&config.vertex_shader)?;
        let frag = load_shader(&config.fragment_shader)?;

        let vertex_shader_module = VulkanPipeline::create_shader_module(device, &vert[..])?;
        let fragment_shader_module =
            match VulkanPipeline::create_shader_module(device, &frag[..]) {
                std::result::Result::Ok(module) => module,
                Err(err) => {
                    device
                        .vk_device
                        .destroy_shader_module(vertex_shader_module, None);
                    return Err(err);
                }
            };

        let result =
            VulkanPipeline::build(device, context, vertex_shader_module, fragment_shader_module);

        // The modules only feed pipeline construction; drop them regardless
        // of the outcome.
        device
            .vk_device
            .destroy_shader_module(vertex_shader_module, None);
        device
            .vk_device
            .destroy_shader_module(fragment_shader_module, None);

        result
    }

    unsafe fn build(
        device: &VulkanDevice,
        context: &mut VulkanContext,
        vertex_shader_module: vk::ShaderModule,
        fragment_shader_module: vk::ShaderModule,
    ) -> Result<()> {
        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vertex_shader_module)
            .name(b"main\0");

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(fragment_shader_module)
            .name(b"main\0");

        let binding_descriptions = &[Vertex::binding_description()];
        let attribute_descriptions = Vertex::attribute_descriptions();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(binding_descriptions)
            .vertex_attribute_descriptions(&attribute_descriptions);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(context.swapchain_extent.width as f32)
            .height(context.swapchain_extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0);

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(context.swapchain_extent);

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        // rasterizer
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        // multisampling
        let multisample_state = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::_1);

        // color blending disabled: the quad overwrites whatever was cleared
        let attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::all())
            .blend_enable(false);

        let attachments = &[attachment];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(attachments);

        // layout
        let set_layouts = &[context.descriptor_set_layout];
        let layout_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        context.pipeline_layout = device
            .vk_device
            .create_pipeline_layout(&layout_info, None)?;

        let stages = &[vert_stage, frag_stage];
        let info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .layout(context.pipeline_layout)
            .render_pass(context.render_pass)
            .subpass(0);

        match device
            .vk_device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[info], None)
        {
            std::result::Result::Ok(pipelines) => {
                context.pipeline = pipelines.0[0];
                Ok(())
            }
            Err(err) => {
                // Don't leak the sibling layout when pipeline creation fails.
                device
                    .vk_device
                    .destroy_pipeline_layout(context.pipeline_layout, None);
                context.pipeline_layout = vk::PipelineLayout::null();
                Err(anyhow!(err))
            }
        }
    }

    unsafe fn create_shader_module(
        device: &VulkanDevice,
        bytecode: &[u8],
    ) -> Result<vk::ShaderModule> {
        let bytecode = Bytecode::new(bytecode)
            .map_err(|err| anyhow!("Shader bytecode is malformed: {:?}", err))?;
        let info = vk::ShaderModuleCreateInfo::builder()
            .code_size(bytecode.code_size())
            .code(bytecode.code());

        Ok(device.vk_device.create_shader_module(&info, None)?)
    }
}

fn load_shader(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("Failed to read shader binary `{}`.", path.display()))
}
