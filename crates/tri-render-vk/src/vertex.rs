// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::error::{RenderError, RenderResult, VkResultExt};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 2],
    pub color: [f32; 3],
}

/// Clockwise in framebuffer space (y down), matching the pipeline's front face.
pub const TRIANGLE: [Vertex; 3] = [
    // top (red)
    Vertex {
        position: [0.0, -0.5],
        color: [1.0, 0.0, 0.0],
    },
    // bottom right (green)
    Vertex {
        position: [0.5, 0.5],
        color: [0.0, 1.0, 0.0],
    },
    // bottom left (blue)
    Vertex {
        position: [-0.5, 0.5],
        color: [0.0, 0.0, 1.0],
    },
];

impl Vertex {
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Vertex>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 2] {
        [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
        ]
    }
}

/// First memory type allowed by `type_bits` that has every flag in `required`.
pub fn find_memory_type(
    props: &vk::PhysicalDeviceMemoryProperties,
    type_bits: u32,
    required: vk::MemoryPropertyFlags,
) -> RenderResult<u32> {
    let count = props.memory_type_count.min(vk::MAX_MEMORY_TYPES as u32);
    (0..count)
        .find(|&i| {
            type_bits & (1 << i) != 0
                && props.memory_types[i as usize]
                    .property_flags
                    .contains(required)
        })
        .ok_or(RenderError::NoMemoryType(required))
}

/// Vertices the vertex shader generates from `gl_VertexIndex`.
pub const IN_SHADER_VERTEX_COUNT: u32 = 3;

/// Vertices one draw call covers: the buffer's contents when one is bound.
pub fn draw_vertex_count(vertex_buffer: Option<&VertexBuffer>) -> u32 {
    vertex_buffer.map_or(IN_SHADER_VERTEX_COUNT, |vb| vb.count)
}

/// Host-visible vertex buffer, written once at creation.
pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub count: u32,
}

impl VertexBuffer {
    pub unsafe fn upload(
        instance: &ash::Instance,
        phys: vk::PhysicalDevice,
        device: &ash::Device,
        vertices: &[Vertex],
    ) -> RenderResult<Self> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let size = bytes.len() as vk::DeviceSize;

        let buffer_info = vk::BufferCreateInfo {
            s_type: vk::StructureType::BUFFER_CREATE_INFO,
            size,
            usage: vk::BufferUsageFlags::VERTEX_BUFFER,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
            ..Default::default()
        };
        let buffer = device
            .create_buffer(&buffer_info, None)
            .vk_op("create_buffer")?;

        let req = device.get_buffer_memory_requirements(buffer);
        let mem_props = instance.get_physical_device_memory_properties(phys);
        let memory = match find_memory_type(
            &mem_props,
            req.memory_type_bits,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        )
        .and_then(|memory_type_index| {
            let alloc = vk::MemoryAllocateInfo {
                s_type: vk::StructureType::MEMORY_ALLOCATE_INFO,
                allocation_size: req.size,
                memory_type_index,
                ..Default::default()
            };
            device
                .allocate_memory(&alloc, None)
                .vk_op("allocate_memory")
        }) {
            Ok(m) => m,
            Err(e) => {
                device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        let vb = Self {
            buffer,
            memory,
            count: vertices.len() as u32,
        };
        if let Err(e) = vb.write(device, bytes) {
            vb.destroy(device);
            return Err(e);
        }
        Ok(vb)
    }

    unsafe fn write(&self, device: &ash::Device, bytes: &[u8]) -> RenderResult<()> {
        device
            .bind_buffer_memory(self.buffer, self.memory, 0)
            .vk_op("bind_buffer_memory")?;
        let ptr = device
            .map_memory(
                self.memory,
                0,
                bytes.len() as vk::DeviceSize,
                vk::MemoryMapFlags::empty(),
            )
            .vk_op("map_memory")?;
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
        device.unmap_memory(self.memory);
        Ok(())
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_buffer(self.buffer, None);
        device.free_memory(self.memory, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem_props(flags: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut p = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: flags.len() as u32,
            ..Default::default()
        };
        for (i, f) in flags.iter().enumerate() {
            p.memory_types[i].property_flags = *f;
        }
        p
    }

    #[test]
    fn layout_is_tightly_packed() {
        assert_eq!(std::mem::size_of::<Vertex>(), 20);
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs[0].offset, 0);
        assert_eq!(attrs[1].offset, 8);
        assert_eq!(Vertex::binding_description().stride, 20);
        assert_eq!(bytemuck::cast_slice::<Vertex, u8>(&TRIANGLE).len(), 60);
    }

    #[test]
    fn memory_type_respects_type_bits_and_flags() {
        let host = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;
        let p = mem_props(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            host,
            host | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        assert_eq!(find_memory_type(&p, 0b111, host).unwrap(), 1);
        assert_eq!(find_memory_type(&p, 0b100, host).unwrap(), 2);
        assert!(matches!(
            find_memory_type(&p, 0b001, host),
            Err(RenderError::NoMemoryType(_))
        ));
    }

    #[test]
    fn draw_count_follows_bound_buffer() {
        assert_eq!(draw_vertex_count(None), IN_SHADER_VERTEX_COUNT);
        let vb = VertexBuffer {
            buffer: vk::Buffer::null(),
            memory: vk::DeviceMemory::null(),
            count: 6,
        };
        assert_eq!(draw_vertex_count(Some(&vb)), 6);
    }
}
