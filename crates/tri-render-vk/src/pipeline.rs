// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use tracing::debug;

use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::shader::ShaderBundle;
use crate::vertex::Vertex;

/// Where the triangle's vertices come from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum GeometryMode {
    /// Positions and colors are constants in the vertex shader.
    #[default]
    InShader,
    /// Read from a host-visible vertex buffer.
    VertexBuffer,
}

/// What a swapchain rebuild invalidates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RebuildPlan {
    /// The render pass is tied to one color format.
    pub render_pass: bool,
    /// The pipeline bakes the render pass and the viewport extent.
    pub pipeline: bool,
}

#[derive(Default)]
pub struct GraphicsPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    /// Viewport and scissor are baked for this extent.
    pub extent: vk::Extent2D,
    pub format: vk::Format,
}

fn viewport_for(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    (
        vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        },
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        },
    )
}

impl GraphicsPipeline {
    pub unsafe fn create(
        device: &ash::Device,
        render_pass: vk::RenderPass,
        shaders: &ShaderBundle,
        extent: vk::Extent2D,
        format: vk::Format,
        geometry: GeometryMode,
    ) -> RenderResult<Self> {
        // STRICT: the render pass must be built for `format`; a format change
        // means a new render pass and a new pipeline.
        let modules = shaders.create_modules(device)?;

        let stages = [
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::VERTEX,
                module: modules.vertex,
                p_name: shaders.vertex_entry().as_ptr(),
                ..Default::default()
            },
            vk::PipelineShaderStageCreateInfo {
                s_type: vk::StructureType::PIPELINE_SHADER_STAGE_CREATE_INFO,
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: modules.fragment,
                p_name: shaders.fragment_entry().as_ptr(),
                ..Default::default()
            },
        ];

        // --- Vertex input: empty for in-shader geometry ---
        let binding = Vertex::binding_description();
        let attrs = Vertex::attribute_descriptions();
        let vertex_input = match geometry {
            GeometryMode::InShader => vk::PipelineVertexInputStateCreateInfo {
                s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
                ..Default::default()
            },
            GeometryMode::VertexBuffer => vk::PipelineVertexInputStateCreateInfo {
                s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
                vertex_binding_description_count: 1,
                p_vertex_binding_descriptions: &binding,
                vertex_attribute_description_count: attrs.len() as u32,
                p_vertex_attribute_descriptions: attrs.as_ptr(),
                ..Default::default()
            },
        };
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart_enable: vk::FALSE,
            ..Default::default()
        };

        // Fixed viewport; resizing rebuilds the pipeline.
        let (viewport, scissor) = viewport_for(extent);
        let viewport_state = vk::PipelineViewportStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
            viewport_count: 1,
            p_viewports: &viewport,
            scissor_count: 1,
            p_scissors: &scissor,
            ..Default::default()
        };
        let raster = vk::PipelineRasterizationStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            line_width: 1.0,
            ..Default::default()
        };
        let multisample = vk::PipelineMultisampleStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
            rasterization_samples: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        let color_blend_att = vk::PipelineColorBlendAttachmentState {
            color_write_mask: vk::ColorComponentFlags::R
                | vk::ColorComponentFlags::G
                | vk::ColorComponentFlags::B
                | vk::ColorComponentFlags::A,
            blend_enable: vk::FALSE,
            ..Default::default()
        };
        let color_blend = vk::PipelineColorBlendStateCreateInfo {
            s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
            attachment_count: 1,
            p_attachments: &color_blend_att,
            ..Default::default()
        };

        // --- Pipeline layout (nothing bound) ---
        let layout_info = vk::PipelineLayoutCreateInfo {
            s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
            ..Default::default()
        };
        let layout = match device
            .create_pipeline_layout(&layout_info, None)
            .vk_op("create_pipeline_layout")
        {
            Ok(l) => l,
            Err(e) => {
                modules.destroy(device);
                return Err(e);
            }
        };

        let pipeline_info = vk::GraphicsPipelineCreateInfo {
            s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
            stage_count: stages.len() as u32,
            p_stages: stages.as_ptr(),
            p_vertex_input_state: &vertex_input,
            p_input_assembly_state: &input_assembly,
            p_viewport_state: &viewport_state,
            p_rasterization_state: &raster,
            p_multisample_state: &multisample,
            p_color_blend_state: &color_blend,
            layout,
            render_pass,
            subpass: 0,
            ..Default::default()
        };

        let created = device.create_graphics_pipelines(
            vk::PipelineCache::null(),
            std::slice::from_ref(&pipeline_info),
            None,
        );
        modules.destroy(device);

        let pipeline = match created {
            Ok(p) => p[0],
            Err((_, err)) => {
                device.destroy_pipeline_layout(layout, None);
                return Err(RenderError::PipelineCreationFailed(err));
            }
        };

        debug!(
            "pipeline built: {}x{} {:?} {:?}",
            extent.width, extent.height, format, geometry
        );

        Ok(Self {
            layout,
            pipeline,
            extent,
            format,
        })
    }

    /// Compares the baked state against a freshly created swapchain.
    pub fn rebuild_plan(&self, extent: vk::Extent2D, format: vk::Format) -> RebuildPlan {
        let format_changed = self.format != format;
        RebuildPlan {
            render_pass: format_changed,
            pipeline: format_changed || self.extent != extent,
        }
    }

    pub unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}
