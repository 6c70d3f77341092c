// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{RenderError, RenderResult, VkResultExt};

/// Sync objects for one frame slot.
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    /// Created signaled so the first wait on each slot returns immediately.
    pub in_flight: vk::Fence,
}

impl FrameSync {
    pub unsafe fn create(device: &ash::Device) -> RenderResult<Self> {
        let sem_ci = vk::SemaphoreCreateInfo::default();
        let fence_ci = vk::FenceCreateInfo {
            s_type: vk::StructureType::FENCE_CREATE_INFO,
            flags: vk::FenceCreateFlags::SIGNALED,
            ..Default::default()
        };
        let image_available = device
            .create_semaphore(&sem_ci, None)
            .vk_op("create_semaphore")?;
        let render_finished = match device.create_semaphore(&sem_ci, None) {
            Ok(s) => s,
            Err(result) => {
                device.destroy_semaphore(image_available, None);
                return Err(RenderError::Vulkan {
                    op: "create_semaphore",
                    result,
                });
            }
        };
        let in_flight = match device.create_fence(&fence_ci, None) {
            Ok(f) => f,
            Err(result) => {
                device.destroy_semaphore(image_available, None);
                device.destroy_semaphore(render_finished, None);
                return Err(RenderError::Vulkan {
                    op: "create_fence",
                    result,
                });
            }
        };
        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }

    pub unsafe fn create_n(device: &ash::Device, n: usize) -> RenderResult<Vec<Self>> {
        let mut frames = Vec::with_capacity(n);
        for _ in 0..n {
            match Self::create(device) {
                Ok(f) => frames.push(f),
                Err(e) => {
                    for f in &frames {
                        f.destroy(device);
                    }
                    return Err(e);
                }
            }
        }
        Ok(frames)
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_fence(self.in_flight, None);
        device.destroy_semaphore(self.render_finished, None);
        device.destroy_semaphore(self.image_available, None);
    }
}
