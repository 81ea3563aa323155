use std::mem::{offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use vulkanalia::vk::{self, HasBuilder};

/// A single vertex of the quad: 2D position, RGB color, texture coordinate.
///
/// The attribute descriptions below must stay in lockstep with this layout;
/// the pipeline reads exactly what `offset_of!` reports.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec2,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    pub const fn new(position: Vec2, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Vertex>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build()
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        let position = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(0)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(offset_of!(Vertex, position) as u32)
            .build();
        let color = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(1)
            .format(vk::Format::R32G32B32_SFLOAT)
            .offset(offset_of!(Vertex, color) as u32)
            .build();
        let tex_coord = vk::VertexInputAttributeDescription::builder()
            .binding(0)
            .location(2)
            .format(vk::Format::R32G32_SFLOAT)
            .offset(offset_of!(Vertex, tex_coord) as u32)
            .build();
        [position, color, tex_coord]
    }
}

/// The hardcoded quad, wound clockwise to match the pipeline's front face.
pub static VERTICES: [Vertex; 4] = [
    Vertex::new(
        Vec2::new(-0.5, -0.5),
        Vec3::new(1.0, 0.0, 0.0),
        Vec2::new(1.0, 0.0),
    ),
    Vertex::new(
        Vec2::new(0.5, -0.5),
        Vec3::new(1.0, 0.0, 0.0),
        Vec2::new(0.0, 0.0),
    ),
    Vertex::new(
        Vec2::new(0.5, 0.5),
        Vec3::new(0.0, 1.0, 0.0),
        Vec2::new(0.0, 1.0),
    ),
    Vertex::new(
        Vec2::new(-0.5, 0.5),
        Vec3::new(0.0, 0.0, 1.0),
        Vec2::new(1.0, 1.0),
    ),
];

pub static INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binding_stride_matches_struct_size() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride as usize, size_of::<Vertex>());
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn attribute_offsets_match_field_offsets() {
        let attributes = Vertex::attribute_descriptions();

        assert_eq!(attributes[0].offset as usize, offset_of!(Vertex, position));
        assert_eq!(attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attributes[1].offset as usize, offset_of!(Vertex, color));
        assert_eq!(attributes[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attributes[2].offset as usize, offset_of!(Vertex, tex_coord));
        assert_eq!(attributes[2].format, vk::Format::R32G32_SFLOAT);

        // The schema is tightly packed: vec2 + vec3 + vec2 of f32.
        assert_eq!(offset_of!(Vertex, position), 0);
        assert_eq!(offset_of!(Vertex, color), 8);
        assert_eq!(offset_of!(Vertex, tex_coord), 20);
        assert_eq!(size_of::<Vertex>(), 28);
    }

    #[test]
    fn quad_indices_stay_in_range() {
        assert!(INDICES.iter().all(|i| (*i as usize) < VERTICES.len()));
    }
}
