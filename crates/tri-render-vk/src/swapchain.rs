// SPDX-License-Identifier: CEPL-1.0
use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::info;
use tri_render::RenderSize;

use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::queue::ResolvedQueues;

/// Snapshot of what a surface supports on one physical device.
#[derive(Clone, Debug, Default)]
pub struct SwapchainDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainDetails {
    pub unsafe fn query(
        surface_loader: &surface::Instance,
        phys: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> RenderResult<Self> {
        Ok(Self {
            capabilities: surface_loader
                .get_physical_device_surface_capabilities(phys, surface)
                .vk_op("get_physical_device_surface_capabilities")?,
            formats: surface_loader
                .get_physical_device_surface_formats(phys, surface)
                .vk_op("get_physical_device_surface_formats")?,
            present_modes: surface_loader
                .get_physical_device_surface_present_modes(phys, surface)
                .vk_op("get_physical_device_surface_present_modes")?,
        })
    }

    pub fn is_valid(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Score of one (format, color space) pair; 0 means "never pick".
/// SDR: 8-bit BGRA 500, 10-bit 400, sRGB nonlinear 500.
/// With `hdr`, FP16 500 and HDR10 PQ 600 join the table.
pub fn score_surface_format(f: vk::SurfaceFormatKHR, hdr: bool) -> u32 {
    let format = match f.format {
        vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => 500,
        vk::Format::A2B10G10R10_UNORM_PACK32 | vk::Format::A2R10G10B10_UNORM_PACK32 => 400,
        vk::Format::R16G16B16A16_SFLOAT if hdr => 500,
        _ => 0,
    };
    let color_space = match f.color_space {
        vk::ColorSpaceKHR::SRGB_NONLINEAR => 500,
        vk::ColorSpaceKHR::HDR10_ST2084_EXT if hdr => 600,
        _ => 0,
    };
    if format == 0 || color_space == 0 {
        0
    } else {
        format + color_space
    }
}

/// Highest scoring pair, first seen on ties. Errors instead of falling back to
/// an arbitrary format when nothing qualifies.
pub fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    hdr: bool,
) -> RenderResult<vk::SurfaceFormatKHR> {
    let mut best: Option<(vk::SurfaceFormatKHR, u32)> = None;
    for &f in formats {
        let score = score_surface_format(f, hdr);
        if score == 0 {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((f, score));
        }
    }
    best.map(|(f, _)| f).ok_or(RenderError::NoSurfaceFormat)
}

/// First mode of `preferred` the surface offers. FIFO is mandatory for every
/// conforming driver, so it is the fallback.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: &[vk::PresentModeKHR],
) -> vk::PresentModeKHR {
    preferred
        .iter()
        .copied()
        .find(|m| available.contains(m))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, window: RenderSize) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: window
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: window
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// Zero in either dimension, as reported while minimized. The `u32::MAX`
/// "window decides" extent is not empty.
pub fn extent_is_empty(extent: vk::Extent2D) -> bool {
    extent.width == 0 || extent.height == 0
}

/// One more than the minimum; `max_image_count == 0` means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let want = caps.min_image_count + 1;
    if caps.max_image_count == 0 {
        want
    } else {
        want.min(caps.max_image_count)
    }
}

/// Concurrent across both families when they differ, else exclusive.
pub fn sharing_mode(queues: &ResolvedQueues) -> (vk::SharingMode, Vec<u32>) {
    if queues.is_split() {
        (vk::SharingMode::CONCURRENT, queues.unique_families())
    } else {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    }
}

#[derive(Clone, Debug)]
pub struct SwapchainConfig {
    pub window_size: RenderSize,
    pub hdr: bool,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

/// Everything the swapchain needs from the device it is built on.
pub struct SurfaceContext<'a> {
    pub device: &'a ash::Device,
    pub surface_loader: &'a surface::Instance,
    pub swapchain_loader: &'a swapchain::Device,
    pub phys: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub queues: ResolvedQueues,
}

/// Presentable images plus the per-image views and framebuffers.
#[derive(Default)]
pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl Swapchain {
    /// Builds a swapchain from freshly queried details. `old` is handed to the
    /// driver for resource reuse; the caller still destroys it afterwards.
    pub unsafe fn create(
        ctx: &SurfaceContext<'_>,
        cfg: &SwapchainConfig,
        old: vk::SwapchainKHR,
    ) -> RenderResult<Self> {
        let details = SwapchainDetails::query(ctx.surface_loader, ctx.phys, ctx.surface)?;
        let caps = &details.capabilities;

        let surface_format = choose_surface_format(&details.formats, cfg.hdr)?;
        let present_mode = choose_present_mode(&details.present_modes, &cfg.present_modes);
        let extent = choose_extent(caps, cfg.window_size);
        let image_count = choose_image_count(caps);
        let (sharing, family_indices) = sharing_mode(&ctx.queues);

        info!(
            "swapchain: format {:?} / {:?}, present {:?}, extent {}x{}, images min={} picked={}, sharing {:?}",
            surface_format.format,
            surface_format.color_space,
            present_mode,
            extent.width,
            extent.height,
            caps.min_image_count,
            image_count,
            sharing,
        );

        let info = vk::SwapchainCreateInfoKHR {
            s_type: vk::StructureType::SWAPCHAIN_CREATE_INFO_KHR,
            surface: ctx.surface,
            min_image_count: image_count,
            image_format: surface_format.format,
            image_color_space: surface_format.color_space,
            image_extent: extent,
            image_array_layers: 1,
            image_usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            image_sharing_mode: sharing,
            queue_family_index_count: family_indices.len() as u32,
            p_queue_family_indices: family_indices.as_ptr(),
            pre_transform: caps.current_transform,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode,
            clipped: vk::TRUE,
            old_swapchain: old,
            ..Default::default()
        };

        let handle = ctx
            .swapchain_loader
            .create_swapchain(&info, None)
            .vk_op("create_swapchain")?;
        let images = match ctx.swapchain_loader.get_swapchain_images(handle) {
            Ok(images) => images,
            Err(result) => {
                ctx.swapchain_loader.destroy_swapchain(handle, None);
                return Err(RenderError::Vulkan {
                    op: "get_swapchain_images",
                    result,
                });
            }
        };

        let mut sc = Swapchain {
            handle,
            surface_format,
            present_mode,
            extent,
            images,
            image_views: Vec::new(),
            framebuffers: Vec::new(),
        };
        if let Err(e) = sc.create_image_views(ctx.device) {
            sc.destroy(ctx.device, ctx.swapchain_loader);
            return Err(e);
        }
        Ok(sc)
    }

    unsafe fn create_image_views(&mut self, device: &ash::Device) -> RenderResult<()> {
        self.image_views.reserve(self.images.len());
        for &image in &self.images {
            let info = vk::ImageViewCreateInfo {
                s_type: vk::StructureType::IMAGE_VIEW_CREATE_INFO,
                image,
                view_type: vk::ImageViewType::TYPE_2D,
                format: self.surface_format.format,
                components: vk::ComponentMapping::default(),
                subresource_range: vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                ..Default::default()
            };
            let view = device
                .create_image_view(&info, None)
                .vk_op("create_image_view")?;
            self.image_views.push(view);
        }
        Ok(())
    }

    /// One framebuffer per image view, sized to the swapchain extent.
    pub unsafe fn create_framebuffers(
        &mut self,
        device: &ash::Device,
        render_pass: vk::RenderPass,
    ) -> RenderResult<()> {
        self.destroy_framebuffers(device);
        self.framebuffers.reserve(self.image_views.len());
        for view in &self.image_views {
            let info = vk::FramebufferCreateInfo {
                s_type: vk::StructureType::FRAMEBUFFER_CREATE_INFO,
                render_pass,
                attachment_count: 1,
                p_attachments: view,
                width: self.extent.width,
                height: self.extent.height,
                layers: 1,
                ..Default::default()
            };
            let fb = device
                .create_framebuffer(&info, None)
                .vk_op("create_framebuffer")?;
            self.framebuffers.push(fb);
        }
        Ok(())
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    unsafe fn destroy_framebuffers(&mut self, device: &ash::Device) {
        for fb in self.framebuffers.drain(..) {
            device.destroy_framebuffer(fb, None);
        }
    }

    /// Framebuffers and views go first; they reference the swapchain images.
    /// The handle itself stays valid so it can be passed as `old_swapchain`.
    pub unsafe fn destroy_views(&mut self, device: &ash::Device) {
        self.destroy_framebuffers(device);
        for view in self.image_views.drain(..) {
            device.destroy_image_view(view, None);
        }
    }

    pub unsafe fn destroy(&mut self, device: &ash::Device, loader: &swapchain::Device) {
        self.destroy_views(device);
        if self.handle != vk::SwapchainKHR::null() {
            loader.destroy_swapchain(self.handle, None);
            self.handle = vk::SwapchainKHR::null();
        }
        self.images.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space,
        }
    }

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            current_extent: vk::Extent2D {
                width: u32::MAX,
                height: u32::MAX,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            ..Default::default()
        }
    }

    #[test]
    fn sdr_policy_prefers_bgra8_srgb_nonlinear() {
        let formats = [
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
        ];
        assert_eq!(score_surface_format(formats[0], false), 1000);
        assert_eq!(score_surface_format(formats[1], false), 0);
        assert_eq!(choose_surface_format(&formats, false).unwrap(), formats[0]);
    }

    #[test]
    fn hdr_policy_prefers_fp16_pq() {
        let formats = [
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::R16G16B16A16_SFLOAT, vk::ColorSpaceKHR::HDR10_ST2084_EXT),
        ];
        assert_eq!(score_surface_format(formats[1], true), 1100);
        assert_eq!(choose_surface_format(&formats, true).unwrap(), formats[1]);
    }

    #[test]
    fn ten_bit_loses_to_eight_bit_in_sdr() {
        let formats = [
            sf(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats, false).unwrap(), formats[1]);
        assert_eq!(
            choose_surface_format(&formats[..1], false).unwrap(),
            formats[0]
        );
    }

    #[test]
    fn ties_keep_first_seen() {
        let formats = [
            sf(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats, false).unwrap(), formats[0]);
    }

    #[test]
    fn no_scoring_format_is_an_error() {
        let formats = [
            sf(vk::Format::R5G6B5_UNORM_PACK16, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::DISPLAY_P3_NONLINEAR_EXT),
        ];
        assert!(matches!(
            choose_surface_format(&formats, false),
            Err(RenderError::NoSurfaceFormat)
        ));
        assert!(matches!(
            choose_surface_format(&[], true),
            Err(RenderError::NoSurfaceFormat)
        ));
    }

    #[test]
    fn present_mode_falls_back_to_fifo() {
        let pref = [
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::FIFO_RELAXED,
            vk::PresentModeKHR::FIFO,
        ];
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], &pref),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::FIFO_RELAXED],
                &pref
            ),
            vk::PresentModeKHR::FIFO_RELAXED
        );
        assert_eq!(
            choose_present_mode(
                &[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO],
                &[vk::PresentModeKHR::MAILBOX]
            ),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn image_count_stays_in_capability_range() {
        let c = caps(2, 4);
        let n = choose_image_count(&c);
        assert!((2..=4).contains(&n));
        assert_eq!(n, 3);

        assert_eq!(choose_image_count(&caps(3, 3)), 3);
        assert_eq!(choose_image_count(&caps(2, 0)), 3);
        assert_eq!(choose_image_count(&caps(4, 0)), 5);
    }

    #[test]
    fn extent_follows_window_when_surface_defers() {
        let c = caps(2, 0);
        assert_eq!(
            choose_extent(&c, RenderSize::new(1280, 720)),
            vk::Extent2D {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(
            choose_extent(&c, RenderSize::new(9000, 0)),
            vk::Extent2D {
                width: 4096,
                height: 1
            }
        );
    }

    #[test]
    fn extent_uses_surface_when_fixed() {
        let mut c = caps(2, 0);
        c.current_extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        assert_eq!(choose_extent(&c, RenderSize::new(1280, 720)), c.current_extent);
    }

    #[test]
    fn sharing_is_concurrent_only_for_split_queues() {
        let (mode, idx) = sharing_mode(&ResolvedQueues {
            graphics: 0,
            present: 0,
        });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(idx.is_empty());

        let (mode, idx) = sharing_mode(&ResolvedQueues {
            graphics: 0,
            present: 2,
        });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(idx, vec![0, 2]);
    }

    #[test]
    fn details_validity_needs_formats_and_modes() {
        let mut d = SwapchainDetails::default();
        assert!(!d.is_valid());
        d.formats
            .push(sf(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR));
        assert!(!d.is_valid());
        d.present_modes.push(vk::PresentModeKHR::FIFO);
        assert!(d.is_valid());
    }

    #[test]
    fn minimized_extent_is_empty() {
        let e = |width, height| vk::Extent2D { width, height };
        assert!(extent_is_empty(e(0, 0)));
        assert!(extent_is_empty(e(800, 0)));
        assert!(!extent_is_empty(e(800, 600)));
        assert!(!extent_is_empty(e(u32::MAX, u32::MAX)));
    }
}
