use anyhow::{Ok, Result};
use log::*;
use vulkanalia::{
    vk::{self, DeviceV1_0, Handle, HasBuilder, KhrSurfaceExtension, KhrSwapchainExtension},
    Instance,
};
use vulkanalia::window as vk_window;
use winit::window::Window;

use super::{
    context::VulkanContext,
    device::{QueueFamilyIndices, VulkanDevice},
    instance::VulkanInstance,
};

/// Selection policy for surface format and present mode. With no preference
/// set, the first enumerated option wins.
#[derive(Copy, Clone, Debug, Default)]
pub struct SwapchainPreferences {
    pub present_mode: Option<vk::PresentModeKHR>,
    pub surface_format: Option<vk::SurfaceFormatKHR>,
}

/// What the surface reports for a physical device.
#[derive(Clone, Debug)]
pub struct SwapchainSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupport {
    pub unsafe fn get(
        instance: &VulkanInstance,
        context: &VulkanContext,
        physical_device: vk::PhysicalDevice,
    ) -> Result<Self> {
        Ok(Self {
            capabilities: instance
                .vk_instance
                .get_physical_device_surface_capabilities_khr(physical_device, context.surface)?,
            formats: instance
                .vk_instance
                .get_physical_device_surface_formats_khr(physical_device, context.surface)?,
            present_modes: instance
                .vk_instance
                .get_physical_device_surface_present_modes_khr(
                    physical_device,
                    context.surface,
                )?,
        })
    }
}

pub fn select_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preference: Option<vk::SurfaceFormatKHR>,
) -> vk::SurfaceFormatKHR {
    preference
        .and_then(|p| {
            formats
                .iter()
                .find(|f| f.format == p.format && f.color_space == p.color_space)
                .copied()
        })
        .unwrap_or(formats[0])
}

pub fn select_present_mode(
    modes: &[vk::PresentModeKHR],
    preference: Option<vk::PresentModeKHR>,
) -> vk::PresentModeKHR {
    preference
        .and_then(|p| modes.iter().find(|m| **m == p).copied())
        .unwrap_or(modes[0])
}

/// Surfaces report `u32::MAX` when they leave the extent to the application;
/// in that case the window's framebuffer size is clamped to the allowed
/// range. A concrete extent is taken verbatim.
pub fn negotiate_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D::builder()
            .width(framebuffer_size.0.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ))
            .height(framebuffer_size.1.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ))
            .build()
    }
}

/// One more image than the minimum, so the driver is never the reason a
/// frame has to wait; a max of zero means "no limit".
pub fn negotiate_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let mut count = capabilities.min_image_count + 1;
    if capabilities.max_image_count != 0 && count > capabilities.max_image_count {
        count = capabilities.max_image_count;
    }
    count
}

#[derive(Debug)]
pub struct VulkanSwapchain;

impl VulkanSwapchain {
    pub unsafe fn create_surface(
        window: &Window,
        instance: &Instance,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.surface = vk_window::create_surface(instance, window, window)?;
        Ok(())
    }

    pub unsafe fn create(
        window: &Window,
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
        preferences: &SwapchainPreferences,
    ) -> Result<()> {
        let indices = QueueFamilyIndices::get(instance, context, context.physical_device)?;
        let support = SwapchainSupport::get(instance, context, context.physical_device)?;

        let surface_format = select_surface_format(&support.formats, preferences.surface_format);
        let present_mode = select_present_mode(&support.present_modes, preferences.present_mode);
        let size = window.inner_size();
        let extent = negotiate_extent(&support.capabilities, (size.width, size.height));
        let image_count = negotiate_image_count(&support.capabilities);

        debug!(
            "Swapchain negotiation: {:?} / {:?}, {}x{}, {} images.",
            surface_format.format, present_mode, extent.width, extent.height, image_count
        );

        let mut queue_family_indices = vec![];
        let image_sharing_mode = if indices.graphics != indices.present {
            queue_family_indices.push(indices.graphics);
            queue_family_indices.push(indices.present);
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let info = vk::SwapchainCreateInfoKHR::builder()
            .surface(context.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(image_sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        context.swapchain = device.vk_device.create_swapchain_khr(&info, None)?;
        context.swapchain_format = surface_format.format;
        context.swapchain_extent = extent;
        context.swapchain_images = device
            .vk_device
            .get_swapchain_images_khr(context.swapchain)?;

        Ok(())
    }

    pub unsafe fn create_image_views(
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.swapchain_image_views = context
            .swapchain_images
            .iter()
            .map(|i| {
                let subresource_range = vk::ImageSubresourceRange::builder()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1);

                let info = vk::ImageViewCreateInfo::builder()
                    .image(*i)
                    .view_type(vk::ImageViewType::_2D)
                    .format(context.swapchain_format)
                    .subresource_range(subresource_range);

                device.vk_device.create_image_view(&info, None)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn capabilities(min: u32, max: u32, current: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        let mut capabilities = vk::SurfaceCapabilitiesKHR::default();
        capabilities.min_image_count = min;
        capabilities.max_image_count = max;
        capabilities.current_extent = vk::Extent2D {
            width: current.0,
            height: current.1,
        };
        capabilities.min_image_extent = vk::Extent2D {
            width: 64,
            height: 64,
        };
        capabilities.max_image_extent = vk::Extent2D {
            width: 2048,
            height: 1024,
        };
        capabilities
    }

    #[test]
    fn concrete_extent_taken_verbatim() {
        let capabilities = capabilities(2, 8, (800, 600));
        let extent = negotiate_extent(&capabilities, (4096, 4096));
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn sentinel_extent_clamps_framebuffer_size() {
        let capabilities = capabilities(2, 8, (u32::MAX, u32::MAX));

        let oversized = negotiate_extent(&capabilities, (4096, 4096));
        assert_eq!((oversized.width, oversized.height), (2048, 1024));

        let undersized = negotiate_extent(&capabilities, (10, 10));
        assert_eq!((undersized.width, undersized.height), (64, 64));

        let in_range = negotiate_extent(&capabilities, (1280, 720));
        assert_eq!((in_range.width, in_range.height), (1280, 720));
    }

    #[test]
    fn image_count_is_min_plus_one_capped_by_max() {
        assert_eq!(negotiate_image_count(&capabilities(2, 8, (1, 1))), 3);
        assert_eq!(negotiate_image_count(&capabilities(3, 3, (1, 1))), 3);
        // Zero max means unlimited.
        assert_eq!(negotiate_image_count(&capabilities(2, 0, (1, 1))), 3);
    }

    #[test]
    fn first_enumerated_format_wins_without_preference() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let selected = select_surface_format(&formats, None);
        assert_eq!(selected.format, vk::Format::R8G8B8A8_UNORM);
    }

    #[test]
    fn format_preference_honored_only_when_enumerated() {
        let formats = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];

        let preferred = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            select_surface_format(&formats, Some(preferred)).format,
            vk::Format::B8G8R8A8_SRGB
        );

        let unavailable = vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            select_surface_format(&formats, Some(unavailable)).format,
            vk::Format::R8G8B8A8_UNORM
        );
    }

    #[test]
    fn present_mode_defaults_to_first_enumerated() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(select_present_mode(&modes, None), vk::PresentModeKHR::FIFO);
        assert_eq!(
            select_present_mode(&modes, Some(vk::PresentModeKHR::MAILBOX)),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&modes, Some(vk::PresentModeKHR::IMMEDIATE)),
            vk::PresentModeKHR::FIFO
        );
    }
}
