// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{RenderError, RenderResult, VkResultExt};

/// What one recorded frame draws into.
#[derive(Clone, Copy, Debug)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    /// Bound at binding 0 when the pipeline reads vertex input.
    pub vertex_buffer: Option<vk::Buffer>,
    pub vertex_count: u32,
    pub clear_color: [f32; 4],
}

/// One resettable primary command buffer per frame slot.
#[derive(Default)]
pub struct CommandRecorder {
    pub pool: vk::CommandPool,
    pub buffers: Vec<vk::CommandBuffer>,
}

impl CommandRecorder {
    pub unsafe fn create(
        device: &ash::Device,
        graphics_family: u32,
        frames_in_flight: usize,
    ) -> RenderResult<Self> {
        let pool_info = vk::CommandPoolCreateInfo {
            s_type: vk::StructureType::COMMAND_POOL_CREATE_INFO,
            queue_family_index: graphics_family,
            flags: vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            ..Default::default()
        };
        let pool = device
            .create_command_pool(&pool_info, None)
            .vk_op("create_command_pool")?;
        let alloc_info = vk::CommandBufferAllocateInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_ALLOCATE_INFO,
            command_pool: pool,
            level: vk::CommandBufferLevel::PRIMARY,
            command_buffer_count: frames_in_flight as u32,
            ..Default::default()
        };
        match device.allocate_command_buffers(&alloc_info) {
            Ok(buffers) => Ok(Self { pool, buffers }),
            Err(result) => {
                device.destroy_command_pool(pool, None);
                Err(RenderError::Vulkan {
                    op: "allocate_command_buffers",
                    result,
                })
            }
        }
    }

    /// Resets and re-records the buffer of `slot`. The slot's fence must have
    /// signaled; the buffer may otherwise still be executing.
    pub unsafe fn record(
        &self,
        device: &ash::Device,
        slot: usize,
        target: &DrawTarget,
    ) -> RenderResult<vk::CommandBuffer> {
        let cmd = self.buffers[slot];
        device
            .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
            .vk_op("reset_command_buffer")?;

        let begin = vk::CommandBufferBeginInfo {
            s_type: vk::StructureType::COMMAND_BUFFER_BEGIN_INFO,
            flags: vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT,
            ..Default::default()
        };
        device
            .begin_command_buffer(cmd, &begin)
            .vk_op("begin_command_buffer")?;

        let clear = vk::ClearValue {
            color: vk::ClearColorValue {
                float32: target.clear_color,
            },
        };
        let rp_begin = vk::RenderPassBeginInfo {
            s_type: vk::StructureType::RENDER_PASS_BEGIN_INFO,
            render_pass: target.render_pass,
            framebuffer: target.framebuffer,
            render_area: vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: target.extent,
            },
            clear_value_count: 1,
            p_clear_values: &clear,
            ..Default::default()
        };
        device.cmd_begin_render_pass(cmd, &rp_begin, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
        if let Some(vb) = target.vertex_buffer {
            device.cmd_bind_vertex_buffers(cmd, 0, &[vb], &[0]);
        }
        device.cmd_draw(cmd, target.vertex_count, 1, 0, 0);
        device.cmd_end_render_pass(cmd);

        device
            .end_command_buffer(cmd)
            .vk_op("end_command_buffer")?;
        Ok(cmd)
    }

    /// Frees the buffers along with the pool.
    pub unsafe fn destroy(&mut self, device: &ash::Device) {
        if self.pool != vk::CommandPool::null() {
            device.destroy_command_pool(self.pool, None);
            self.pool = vk::CommandPool::null();
        }
        self.buffers.clear();
    }
}
