// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, info, warn};
use tri_render::RenderSize;

use crate::commands::{CommandRecorder, DrawTarget};
use crate::config::VkConfig;
use crate::device::{select_physical_device, LogicalDevice};
use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::frame::{AcquireOutcome, FenceWait, FrameBackend, PresentOutcome};
use crate::instance::{InstanceConfig, VulkanInstance};
use crate::pipeline::{GeometryMode, GraphicsPipeline};
use crate::render_pass::create_render_pass;
use crate::shader::ShaderBundle;
use crate::surface::WindowTarget;
use crate::swapchain::{extent_is_empty, SurfaceContext, Swapchain, SwapchainConfig};
use crate::sync::FrameSync;
use crate::vertex::{draw_vertex_count, VertexBuffer, TRIANGLE};

/// Every Vulkan object the renderer owns.
pub struct RenderState {
    inst: VulkanInstance,
    surface_loader: surface::Instance,
    surface: vk::SurfaceKHR,
    phys: vk::PhysicalDevice,
    device: LogicalDevice,
    swapchain_loader: swapchain::Device,

    swapchain: Swapchain,
    render_pass: vk::RenderPass,
    shaders: ShaderBundle,
    pipeline: GraphicsPipeline,
    commands: CommandRecorder,
    frames: Vec<FrameSync>,
    vertex_buffer: Option<VertexBuffer>,

    cfg: VkConfig,
    window_size: RenderSize,
    /// A rebuild was asked for while there was nothing to build into.
    deferred_recreate: bool,
    alive: bool,
}

// STRICT TEARDOWN ORDER (see `shutdown`):
// - device_wait_idle()
// - per-frame sync, then the command pool (frees its buffers)
// - vertex buffer, pipeline + layout
// - framebuffers, image views, swapchain, then the render pass
// - device, surface, debug messenger, instance
// The entry (loader library) is dropped with the struct, after all of the above.
impl RenderState {
    pub unsafe fn create(
        target: &WindowTarget,
        size: RenderSize,
        cfg: VkConfig,
    ) -> RenderResult<Self> {
        // Validate shaders before touching the GPU.
        let shaders = match &cfg.shader_blob {
            Some(path) => {
                info!("loading shader blob {}", path.display());
                ShaderBundle::from_file(path)?
            }
            None => ShaderBundle::builtin(cfg.geometry)?,
        };

        // STRICT ORDER:
        // 1) instance (window-system + debug extensions negotiated up front)
        // 2) surface from THIS instance
        // 3) physical device + queues chosen AGAINST this surface
        // 4) logical device
        let mut inst = VulkanInstance::create(
            target,
            &InstanceConfig {
                validation: cfg.validation,
                hdr: cfg.hdr,
            },
        )?;
        let surface_loader = surface::Instance::new(&inst.entry, &inst.instance);
        let surface = match target.create_surface(&inst.entry, &inst.instance) {
            Ok(s) => s,
            Err(e) => {
                inst.destroy();
                return Err(e);
            }
        };

        let device = select_physical_device(&inst.instance, &surface_loader, surface).and_then(
            |chosen| {
                LogicalDevice::create(&inst.instance, &chosen, &inst.enabled)
                    .map(|d| (chosen.handle, d))
            },
        );
        let (phys, device) = match device {
            Ok(pair) => pair,
            Err(e) => {
                surface_loader.destroy_surface(surface, None);
                inst.destroy();
                return Err(e);
            }
        };
        let swapchain_loader = swapchain::Device::new(&inst.instance, &device.device);

        let mut state = Self {
            inst,
            surface_loader,
            surface,
            phys,
            device,
            swapchain_loader,
            swapchain: Swapchain::default(),
            render_pass: vk::RenderPass::null(),
            shaders,
            pipeline: GraphicsPipeline::default(),
            commands: CommandRecorder::default(),
            frames: Vec::new(),
            vertex_buffer: None,
            cfg,
            window_size: size,
            deferred_recreate: false,
            alive: true,
        };
        if let Err(e) = state.build_resources() {
            state.shutdown();
            return Err(e);
        }
        Ok(state)
    }

    fn swapchain_config(&self) -> SwapchainConfig {
        SwapchainConfig {
            window_size: self.window_size,
            hdr: self.cfg.hdr,
            present_modes: self.cfg.present_modes_vk(),
        }
    }

    fn surface_context(&self) -> SurfaceContext<'_> {
        SurfaceContext {
            device: &self.device.device,
            surface_loader: &self.surface_loader,
            swapchain_loader: &self.swapchain_loader,
            phys: self.phys,
            surface: self.surface,
            queues: self.device.queues,
        }
    }

    unsafe fn build_resources(&mut self) -> RenderResult<()> {
        let cfg = self.swapchain_config();
        self.swapchain = Swapchain::create(&self.surface_context(), &cfg, vk::SwapchainKHR::null())?;

        let dev = &self.device.device;
        self.render_pass = create_render_pass(dev, self.swapchain.surface_format.format)?;
        self.pipeline = GraphicsPipeline::create(
            dev,
            self.render_pass,
            &self.shaders,
            self.swapchain.extent,
            self.swapchain.surface_format.format,
            self.cfg.geometry,
        )?;
        self.swapchain.create_framebuffers(dev, self.render_pass)?;

        let n = self.cfg.frames_in_flight();
        self.commands = CommandRecorder::create(dev, self.device.queues.graphics, n)?;
        self.frames = FrameSync::create_n(dev, n)?;

        if self.cfg.geometry == GeometryMode::VertexBuffer {
            self.vertex_buffer = Some(VertexBuffer::upload(
                &self.inst.instance,
                self.phys,
                dev,
                &TRIANGLE,
            )?);
        }

        info!(
            "renderer ready: {} frame(s) in flight, {} swapchain image(s), geometry {:?}",
            n,
            self.swapchain.image_count(),
            self.cfg.geometry
        );
        Ok(())
    }

    pub fn set_window_size(&mut self, size: RenderSize) {
        self.window_size = size;
    }

    pub fn set_clear_color(&mut self, rgba: [f32; 4]) {
        self.cfg.clear_color = rgba;
    }

    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// True while the surface reports a zero-sized extent (minimized).
    unsafe fn surface_is_empty(&self) -> RenderResult<bool> {
        let caps = self
            .surface_loader
            .get_physical_device_surface_capabilities(self.phys, self.surface)
            .vk_op("get_physical_device_surface_capabilities")?;
        Ok(extent_is_empty(caps.current_extent))
    }

    // STRICT ORDER (recreate):
    // - nothing to build into (0x0) => defer, keep the old chain
    // - device_wait_idle()
    // - drop framebuffers + views, keep the old handle for old_swapchain
    // - create the new chain, then destroy the old handle
    // - format changed => new render pass + pipeline; extent changed => new pipeline
    // - framebuffers against the (possibly new) render pass
    pub unsafe fn recreate(&mut self) -> RenderResult<()> {
        if self.window_size.is_empty() || self.surface_is_empty()? {
            debug!("recreate deferred: surface is 0x0");
            self.deferred_recreate = true;
            return Ok(());
        }
        self.device
            .device
            .device_wait_idle()
            .vk_op("device_wait_idle")?;

        let mut old = std::mem::take(&mut self.swapchain);
        old.destroy_views(&self.device.device);

        let cfg = self.swapchain_config();
        let created = Swapchain::create(&self.surface_context(), &cfg, old.handle);
        old.destroy(&self.device.device, &self.swapchain_loader);
        self.swapchain = created?;

        let dev = &self.device.device;
        let format = self.swapchain.surface_format.format;
        let extent = self.swapchain.extent;

        let plan = self.pipeline.rebuild_plan(extent, format);
        if plan.render_pass {
            info!(
                "surface format changed {:?} -> {:?}; rebuilding render pass",
                old.surface_format.format, format
            );
            dev.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
            self.render_pass = create_render_pass(dev, format)?;
        }
        if plan.pipeline {
            self.pipeline.destroy(dev);
            self.pipeline = GraphicsPipeline::default();
            self.pipeline = GraphicsPipeline::create(
                dev,
                self.render_pass,
                &self.shaders,
                extent,
                format,
                self.cfg.geometry,
            )?;
        }
        self.swapchain.create_framebuffers(dev, self.render_pass)?;

        self.deferred_recreate = false;
        info!(
            "swapchain recreated: {}x{}, {} image(s)",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );
        Ok(())
    }

    fn draw_target(&self, image_index: u32) -> RenderResult<DrawTarget> {
        let framebuffer = *self
            .swapchain
            .framebuffers
            .get(image_index as usize)
            .ok_or(RenderError::UnexpectedResult {
                op: "acquire_next_image (image index out of range)",
                result: vk::Result::ERROR_UNKNOWN,
            })?;
        Ok(DrawTarget {
            render_pass: self.render_pass,
            framebuffer,
            extent: self.swapchain.extent,
            pipeline: self.pipeline.pipeline,
            vertex_buffer: self.vertex_buffer.as_ref().map(|vb| vb.buffer),
            vertex_count: draw_vertex_count(self.vertex_buffer.as_ref()),
            clear_color: self.cfg.clear_color,
        })
    }

    /// Idempotent. Waits for the GPU, then destroys everything in reverse
    /// creation order.
    pub unsafe fn shutdown(&mut self) {
        if !self.alive {
            return;
        }
        self.alive = false;

        let dev = &self.device.device;
        if let Err(e) = dev.device_wait_idle() {
            warn!("device_wait_idle during shutdown: {e}");
        }

        for f in self.frames.drain(..) {
            f.destroy(dev);
        }
        self.commands.destroy(dev);
        if let Some(vb) = self.vertex_buffer.take() {
            vb.destroy(dev);
        }
        self.pipeline.destroy(dev);
        self.pipeline = GraphicsPipeline::default();
        self.swapchain.destroy(dev, &self.swapchain_loader);
        if self.render_pass != vk::RenderPass::null() {
            dev.destroy_render_pass(self.render_pass, None);
            self.render_pass = vk::RenderPass::null();
        }

        dev.destroy_device(None);
        self.surface_loader.destroy_surface(self.surface, None);
        self.surface = vk::SurfaceKHR::null();
        self.inst.destroy();
        info!("renderer shut down");
    }
}

impl FrameBackend for RenderState {
    fn wait_for_fence(&mut self, slot: usize, timeout_ns: u64) -> RenderResult<FenceWait> {
        let fence = self.frames[slot].in_flight;
        match unsafe { self.device.device.wait_for_fences(&[fence], true, timeout_ns) } {
            Ok(()) => Ok(FenceWait::Signaled),
            Err(vk::Result::TIMEOUT) => Ok(FenceWait::TimedOut),
            Err(result) => Err(RenderError::Vulkan {
                op: "wait_for_fences",
                result,
            }),
        }
    }

    fn acquire_next_image(&mut self, slot: usize) -> RenderResult<AcquireOutcome> {
        let sem = self.frames[slot].image_available;
        let res = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain.handle,
                u64::MAX,
                sem,
                vk::Fence::null(),
            )
        };
        match res {
            Ok((image_index, suboptimal)) => Ok(AcquireOutcome::Acquired {
                image_index,
                suboptimal,
            }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireOutcome::Stale),
            Err(result) => Err(RenderError::UnexpectedResult {
                op: "acquire_next_image",
                result,
            }),
        }
    }

    fn reset_fence(&mut self, slot: usize) -> RenderResult<()> {
        let fence = self.frames[slot].in_flight;
        unsafe { self.device.device.reset_fences(&[fence]) }.vk_op("reset_fences")
    }

    fn record_commands(&mut self, slot: usize, image_index: u32) -> RenderResult<()> {
        let target = self.draw_target(image_index)?;
        unsafe { self.commands.record(&self.device.device, slot, &target) }.map(|_| ())
    }

    fn submit(&mut self, slot: usize) -> RenderResult<()> {
        let sync = self.frames[slot];
        let cmd = self.commands.buffers[slot];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let submit = vk::SubmitInfo {
            s_type: vk::StructureType::SUBMIT_INFO,
            wait_semaphore_count: 1,
            p_wait_semaphores: &sync.image_available,
            p_wait_dst_stage_mask: wait_stages.as_ptr(),
            command_buffer_count: 1,
            p_command_buffers: &cmd,
            signal_semaphore_count: 1,
            p_signal_semaphores: &sync.render_finished,
            ..Default::default()
        };
        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                std::slice::from_ref(&submit),
                sync.in_flight,
            )
        }
        .vk_op("queue_submit")
    }

    fn present(&mut self, slot: usize, image_index: u32) -> RenderResult<PresentOutcome> {
        let wait = self.frames[slot].render_finished;
        let present = vk::PresentInfoKHR {
            s_type: vk::StructureType::PRESENT_INFO_KHR,
            wait_semaphore_count: 1,
            p_wait_semaphores: &wait,
            swapchain_count: 1,
            p_swapchains: &self.swapchain.handle,
            p_image_indices: &image_index,
            ..Default::default()
        };
        match unsafe {
            self.swapchain_loader
                .queue_present(self.device.present_queue, &present)
        } {
            Ok(false) => Ok(PresentOutcome::Presented),
            Ok(true) => Ok(PresentOutcome::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentOutcome::Stale),
            Err(result) => Err(RenderError::UnexpectedResult {
                op: "queue_present",
                result,
            }),
        }
    }

    fn recreate_swapchain(&mut self) -> RenderResult<()> {
        unsafe { self.recreate() }
    }

    fn recreate_deferred(&self) -> bool {
        self.deferred_recreate
    }
}

impl Drop for RenderState {
    fn drop(&mut self) {
        unsafe { self.shutdown() }
    }
}
