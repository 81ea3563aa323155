use std::ptr::copy_nonoverlapping as memcpy;

use anyhow::{Ok, Result};
use thiserror::Error;
use vulkanalia::vk::{self, DeviceV1_0, HasBuilder, InstanceV1_0};

use super::command_buffer::run_one_time;
use super::context::VulkanContext;
use super::descriptor::UniformBufferObject;
use super::device::VulkanDevice;
use super::instance::VulkanInstance;
use super::vertex::{INDICES, VERTICES};

#[derive(Debug, Error)]
#[error("No memory type matches filter {filter:#b} with properties {properties:?}.")]
pub struct NoMatchingMemoryTypeError {
    pub filter: u32,
    pub properties: vk::MemoryPropertyFlags,
}

/// Lowest memory-type index whose bit is set in `filter` and whose property
/// flags are a superset of `properties`. No scoring, ties go to enumeration
/// order.
pub fn find_memory_type(
    memory: &vk::PhysicalDeviceMemoryProperties,
    filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Result<u32, NoMatchingMemoryTypeError> {
    (0..memory.memory_type_count)
        .find(|i| {
            let compatible = (filter & (1 << i)) != 0;
            let memory_type = memory.memory_types[*i as usize];
            compatible && memory_type.property_flags.contains(properties)
        })
        .ok_or(NoMatchingMemoryTypeError { filter, properties })
}

#[derive(Debug)]
pub struct VulkanBuffer;

impl VulkanBuffer {
    pub unsafe fn create_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        properties: vk::MemoryPropertyFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = device.vk_device.create_buffer(&info, None)?;

        let requirements = device.vk_device.get_buffer_memory_requirements(buffer);
        let memory_properties = instance
            .vk_instance
            .get_physical_device_memory_properties(context.physical_device);

        let memory_type_index = match find_memory_type(
            &memory_properties,
            requirements.memory_type_bits,
            properties,
        ) {
            Result::Ok(index) => index,
            Err(err) => {
                device.vk_device.destroy_buffer(buffer, None);
                return Err(err.into());
            }
        };

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        let memory = match device.vk_device.allocate_memory(&allocate_info, None) {
            Result::Ok(memory) => memory,
            Err(err) => {
                device.vk_device.destroy_buffer(buffer, None);
                return Err(err.into());
            }
        };

        device.vk_device.bind_buffer_memory(buffer, memory, 0)?;

        Ok((buffer, memory))
    }

    pub unsafe fn copy_buffer(
        device: &VulkanDevice,
        context: &VulkanContext,
        source: vk::Buffer,
        destination: vk::Buffer,
        size: vk::DeviceSize,
    ) -> Result<()> {
        run_one_time(device, context, |vk_device, command_buffer| {
            let region = vk::BufferCopy::builder()
                .src_offset(0)
                .dst_offset(0)
                .size(size);
            vk_device.cmd_copy_buffer(command_buffer, source, destination, &[region]);
            Ok(())
        })
    }

    /// The staged-upload pattern: fill a host-visible staging buffer, copy it
    /// into a device-local destination, destroy the staging pair.
    unsafe fn create_device_local_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &VulkanContext,
        bytes: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> Result<(vk::Buffer, vk::DeviceMemory)> {
        let size = bytes.len() as vk::DeviceSize;

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
        memcpy(bytes.as_ptr(), memory.cast(), bytes.len());
        device.vk_device.unmap_memory(staging_memory);

        let result = VulkanBuffer::create_buffer(
            instance,
            device,
            context,
            size,
            vk::BufferUsageFlags::TRANSFER_DST | usage,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        )
        .and_then(|(buffer, buffer_memory)| {
            if let Err(err) =
                VulkanBuffer::copy_buffer(device, context, staging_buffer, buffer, size)
            {
                device.vk_device.destroy_buffer(buffer, None);
                device.vk_device.free_memory(buffer_memory, None);
                return Err(err);
            }
            Ok((buffer, buffer_memory))
        });

        device.vk_device.destroy_buffer(staging_buffer, None);
        device.vk_device.free_memory(staging_memory, None);

        result
    }

    pub unsafe fn create_vertex_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let (buffer, memory) = VulkanBuffer::create_device_local_buffer(
            instance,
            device,
            context,
            bytemuck::cast_slice(&VERTICES),
            vk::BufferUsageFlags::VERTEX_BUFFER,
        )?;

        context.vertex_buffer = buffer;
        context.vertex_buffer_memory = memory;

        Ok(())
    }

    pub unsafe fn create_index_buffer(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        let (buffer, memory) = VulkanBuffer::create_device_local_buffer(
            instance,
            device,
            context,
            bytemuck::cast_slice(&INDICES),
            vk::BufferUsageFlags::INDEX_BUFFER,
        )?;

        context.index_buffer = buffer;
        context.index_buffer_memory = memory;

        Ok(())
    }

    /// One host-visible uniform buffer per swapchain image; rebuilt with the
    /// swapchain since the image count may change.
    pub unsafe fn create_uniform_buffers(
        instance: &VulkanInstance,
        device: &VulkanDevice,
        context: &mut VulkanContext,
    ) -> Result<()> {
        context.uniform_buffers.clear();
        context.uniform_buffers_memory.clear();

        for _ in 0..context.swapchain_images.len() {
            let (buffer, memory) = VulkanBuffer::create_buffer(
                instance,
                device,
                context,
                std::mem::size_of::<UniformBufferObject>() as u64,
                vk::BufferUsageFlags::UNIFORM_BUFFER,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            )?;
            context.uniform_buffers.push(buffer);
            context.uniform_buffers_memory.push(memory);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut memory = vk::PhysicalDeviceMemoryProperties::default();
        memory.memory_type_count = types.len() as u32;
        for (i, property_flags) in types.iter().enumerate() {
            memory.memory_types[i] = vk::MemoryType {
                property_flags: *property_flags,
                heap_index: 0,
            };
        }
        memory
    }

    #[test]
    fn picks_lowest_satisfying_index() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);

        let index = find_memory_type(
            &memory,
            0b111,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn respects_compatibility_filter() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
        ]);

        // Type 0 matches the properties but is excluded by the filter.
        let index =
            find_memory_type(&memory, 0b10, vk::MemoryPropertyFlags::DEVICE_LOCAL).unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn requires_property_superset() {
        let memory = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);

        // A type with extra flags still qualifies; one with fewer does not.
        let index = find_memory_type(
            &memory,
            0b11,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .unwrap();
        assert_eq!(index, 1);
    }

    #[test]
    fn reports_error_when_nothing_matches() {
        let memory = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);

        let result = find_memory_type(&memory, 0b1, vk::MemoryPropertyFlags::HOST_VISIBLE);
        assert!(result.is_err());
    }
}
