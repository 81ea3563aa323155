use std::path::PathBuf;

use crate::vulkan::SwapchainPreferences;

/// Everything the renderer takes from the outside world: window shape, the
/// on-disk assets, and the swapchain selection policy.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub vertex_shader: PathBuf,
    pub fragment_shader: PathBuf,
    pub texture: PathBuf,
    pub swapchain: SwapchainPreferences,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            title: String::from("Boreal Engine"),
            window_width: 1024,
            window_height: 768,
            vertex_shader: PathBuf::from("shaders/vert.spv"),
            fragment_shader: PathBuf::from("shaders/frag.spv"),
            texture: PathBuf::from("assets/texture.png"),
            swapchain: SwapchainPreferences::default(),
        }
    }
}
