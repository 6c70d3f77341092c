// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{CStr, CString};

use ash::khr::{surface, swapchain};
use ash::vk;
use tracing::{debug, info};

use crate::error::{CapabilityKind, RenderError, RenderResult, VkResultExt};
use crate::negotiate::{extension_names, missing_extensions, Negotiated};
use crate::queue::{find_queue_families, QueueFamilyIndices, ResolvedQueues};
use crate::swapchain::SwapchainDetails;

pub const REQUIRED_DEVICE_EXTENSIONS: &[&CStr] = &[swapchain::NAME];

/// Everything the selector needs to know about one physical device. Filled
/// from the driver in [`DeviceCandidate::probe`], or by hand in tests.
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub max_image_dimension_2d: u32,
    pub geometry_shader: bool,
    pub queues: QueueFamilyIndices,
    pub missing_extensions: Vec<CString>,
    pub swapchain_valid: bool,
    pub api_version: u32,
    pub driver_version: u32,
}

impl DeviceCandidate {
    pub unsafe fn probe(
        instance: &ash::Instance,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        handle: vk::PhysicalDevice,
    ) -> RenderResult<Self> {
        let props = instance.get_physical_device_properties(handle);
        let features = instance.get_physical_device_features(handle);
        let queues = find_queue_families(instance, surface_loader, handle, surface);

        let available = extension_names(
            &instance
                .enumerate_device_extension_properties(handle)
                .vk_op("enumerate_device_extension_properties")?,
        );
        let missing: Vec<CString> = missing_extensions(REQUIRED_DEVICE_EXTENSIONS, &available)
            .into_iter()
            .map(CStr::to_owned)
            .collect();

        // Surface details are only meaningful once the swapchain extension exists.
        let swapchain_valid = missing.is_empty()
            && SwapchainDetails::query(surface_loader, handle, surface)
                .map(|d| d.is_valid())
                .unwrap_or(false);

        Ok(Self {
            handle,
            name: props
                .device_name_as_c_str()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|_| "<unnamed>".to_owned()),
            device_type: props.device_type,
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            geometry_shader: features.geometry_shader == vk::TRUE,
            queues,
            missing_extensions: missing,
            swapchain_valid,
            api_version: props.api_version,
            driver_version: props.driver_version,
        })
    }

    /// 0 disqualifies. Otherwise discrete GPUs get +1000 on top of the
    /// largest supported 2D image dimension.
    pub fn score(&self) -> u64 {
        if !self.queues.is_complete()
            || !self.geometry_shader
            || !self.missing_extensions.is_empty()
            || !self.swapchain_valid
        {
            return 0;
        }
        let discrete = if self.device_type == vk::PhysicalDeviceType::DISCRETE_GPU {
            1000
        } else {
            0
        };
        discrete + u64::from(self.max_image_dimension_2d)
    }
}

/// Index of the strictly highest scoring candidate; the earlier one wins a tie.
pub fn pick_best(candidates: &[DeviceCandidate]) -> RenderResult<usize> {
    let mut best: Option<(usize, u64)> = None;
    for (i, c) in candidates.iter().enumerate() {
        let score = c.score();
        if score == 0 {
            continue;
        }
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((i, score));
        }
    }
    best.map(|(i, _)| i).ok_or(RenderError::NoSuitableDevice)
}

pub unsafe fn select_physical_device(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    surface: vk::SurfaceKHR,
) -> RenderResult<DeviceCandidate> {
    let handles = instance
        .enumerate_physical_devices()
        .vk_op("enumerate_physical_devices")?;
    let mut candidates = Vec::with_capacity(handles.len());
    for phys in handles {
        let c = DeviceCandidate::probe(instance, surface_loader, surface, phys)?;
        debug!(
            "candidate {} ({:?}) api={}.{} driver={:#x} score={} queues={:?} geometry={} missing_ext={:?} swapchain_ok={}",
            c.name,
            c.device_type,
            vk::api_version_major(c.api_version),
            vk::api_version_minor(c.api_version),
            c.driver_version,
            c.score(),
            c.queues,
            c.geometry_shader,
            c.missing_extensions,
            c.swapchain_valid,
        );
        candidates.push(c);
    }
    let idx = pick_best(&candidates)?;
    let chosen = candidates.swap_remove(idx);
    info!(
        "using GPU {} ({:?}), API {}.{}.{}",
        chosen.name,
        chosen.device_type,
        vk::api_version_major(chosen.api_version),
        vk::api_version_minor(chosen.api_version),
        vk::api_version_patch(chosen.api_version),
    );
    Ok(chosen)
}

pub struct LogicalDevice {
    pub device: ash::Device,
    pub queues: ResolvedQueues,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

impl LogicalDevice {
    /// One queue per unique family. `instance_layers` is repeated on the
    /// device for pre-1.1 loaders that still read device layers.
    pub unsafe fn create(
        instance: &ash::Instance,
        chosen: &DeviceCandidate,
        instance_layers: &Negotiated,
    ) -> RenderResult<Self> {
        let queues = chosen.queues.require().ok_or(RenderError::NoSuitableDevice)?;

        let priorities = [1.0_f32];
        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = queues
            .unique_families()
            .into_iter()
            .map(|family| vk::DeviceQueueCreateInfo {
                s_type: vk::StructureType::DEVICE_QUEUE_CREATE_INFO,
                queue_family_index: family,
                queue_count: 1,
                p_queue_priorities: priorities.as_ptr(),
                ..Default::default()
            })
            .collect();

        let available = extension_names(
            &instance
                .enumerate_device_extension_properties(chosen.handle)
                .vk_op("enumerate_device_extension_properties")?,
        );
        let mut exts: Vec<&CStr> = REQUIRED_DEVICE_EXTENSIONS.to_vec();
        if let Some(missing) = missing_extensions(&exts, &available).first() {
            return Err(RenderError::MissingCapability {
                kind: CapabilityKind::DeviceExtension,
                name: missing.to_string_lossy().into_owned(),
            });
        }
        // Portability drivers (MoltenVK) require the subset extension whenever they expose it.
        let portability = c"VK_KHR_portability_subset";
        if available.iter().any(|a| a.as_c_str() == portability) {
            exts.push(portability);
        }
        let ext_ptrs: Vec<_> = exts.iter().map(|e| e.as_ptr()).collect();
        let layer_ptrs = instance_layers.layer_ptrs();

        let features = vk::PhysicalDeviceFeatures {
            geometry_shader: vk::TRUE,
            ..Default::default()
        };

        let create_info = vk::DeviceCreateInfo {
            s_type: vk::StructureType::DEVICE_CREATE_INFO,
            queue_create_info_count: queue_infos.len() as u32,
            p_queue_create_infos: queue_infos.as_ptr(),
            enabled_layer_count: layer_ptrs.len() as u32,
            pp_enabled_layer_names: layer_ptrs.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            p_enabled_features: &features,
            ..Default::default()
        };

        let device = instance
            .create_device(chosen.handle, &create_info, None)
            .vk_op("create_device")?;
        let graphics_queue = device.get_device_queue(queues.graphics, 0);
        let present_queue = device.get_device_queue(queues.present, 0);

        info!(
            "device ready: graphics family {}, present family {}",
            queues.graphics, queues.present
        );

        Ok(Self {
            device,
            queues,
            graphics_queue,
            present_queue,
        })
    }
}
