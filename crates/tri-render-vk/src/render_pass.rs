// SPDX-License-Identifier: CEPL-1.0
use ash::vk;

use crate::error::{RenderResult, VkResultExt};

fn color_attachment(format: vk::Format) -> vk::AttachmentDescription {
    vk::AttachmentDescription {
        format,
        samples: vk::SampleCountFlags::TYPE_1,
        load_op: vk::AttachmentLoadOp::CLEAR,
        store_op: vk::AttachmentStoreOp::STORE,
        stencil_load_op: vk::AttachmentLoadOp::DONT_CARE,
        stencil_store_op: vk::AttachmentStoreOp::DONT_CARE,
        initial_layout: vk::ImageLayout::UNDEFINED,
        final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        ..Default::default()
    }
}

/// Keeps the layout transition from running before the acquire semaphore
/// has been waited on at the color output stage.
fn acquire_dependency() -> vk::SubpassDependency {
    vk::SubpassDependency {
        src_subpass: vk::SUBPASS_EXTERNAL,
        dst_subpass: 0,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::empty(),
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        ..Default::default()
    }
}

/// Single-subpass pass that clears one color attachment and leaves it ready
/// to present.
pub unsafe fn create_render_pass(
    device: &ash::Device,
    format: vk::Format,
) -> RenderResult<vk::RenderPass> {
    let attachment = color_attachment(format);
    let color_ref = vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    };
    let subpass = vk::SubpassDescription {
        pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
        color_attachment_count: 1,
        p_color_attachments: &color_ref,
        ..Default::default()
    };
    let dependency = acquire_dependency();

    let info = vk::RenderPassCreateInfo {
        s_type: vk::StructureType::RENDER_PASS_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &attachment,
        subpass_count: 1,
        p_subpasses: &subpass,
        dependency_count: 1,
        p_dependencies: &dependency,
        ..Default::default()
    };
    device
        .create_render_pass(&info, None)
        .vk_op("create_render_pass")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_clears_and_ends_presentable() {
        let a = color_attachment(vk::Format::B8G8R8A8_UNORM);
        assert_eq!(a.format, vk::Format::B8G8R8A8_UNORM);
        assert_eq!(a.load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(a.store_op, vk::AttachmentStoreOp::STORE);
        assert_eq!(a.initial_layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(a.final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
    }

    #[test]
    fn dependency_waits_on_color_output() {
        let d = acquire_dependency();
        assert_eq!(d.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(d.dst_subpass, 0);
        assert_eq!(d.dst_stage_mask, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT);
        assert!(d
            .dst_access_mask
            .contains(vk::AccessFlags::COLOR_ATTACHMENT_WRITE));
    }
}
