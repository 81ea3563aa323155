use anyhow::Result;
use winit::window::Window;

use crate::config::EngineConfig;
use crate::vulkan::VulkanRenderer;

#[derive(Debug)]
pub struct Renderer {
    pub vk_renderer: VulkanRenderer,
}

impl Renderer {
    /// Brings up the whole GPU side: device, swapchain, pipeline, geometry
    /// and texture uploads, sync objects.
    pub unsafe fn create(window: &Window, config: EngineConfig) -> Result<Self> {
        let vk_renderer = VulkanRenderer::new(window, config)?;

        Ok(Self { vk_renderer })
    }

    /// Renders one frame.
    pub unsafe fn render(&mut self, window: &Window) -> Result<()> {
        self.vk_renderer.render(window)?;
        Ok(())
    }

    /// Called by the windowing layer whenever the framebuffer size changed;
    /// picked up after the next present.
    pub fn mark_resized(&mut self) {
        self.vk_renderer.resized = true;
    }

    /// Waits for the device to drain, then releases every GPU resource.
    pub unsafe fn destroy(&mut self) {
        self.vk_renderer.destroy();
    }
}
