// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{c_void, CStr};

use ash::ext::debug_utils;
use ash::vk;
use tracing::{debug, error, info, trace, warn};

use crate::error::{RenderResult, VkResultExt};
use crate::negotiate::{extension_names, layer_names, negotiate, Negotiated};
use crate::surface::WindowTarget;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

#[derive(Clone, Copy, Debug)]
pub struct InstanceConfig {
    pub validation: bool,
    pub hdr: bool,
}

/// Loader entry, instance and the optional debug messenger. Destroyed
/// explicitly by [`VulkanInstance::destroy`]; nothing here drops on its own.
pub struct VulkanInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub enabled: Negotiated,
    debug: Option<DebugMessenger>,
}

struct DebugMessenger {
    loader: debug_utils::Instance,
    messenger: vk::DebugUtilsMessengerEXT,
}

unsafe extern "system" fn debug_callback(
    severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    types: vk::DebugUtilsMessageTypeFlagsEXT,
    data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user: *mut c_void,
) -> vk::Bool32 {
    if data.is_null() || (*data).p_message.is_null() {
        return vk::FALSE;
    }
    let msg = CStr::from_ptr((*data).p_message).to_string_lossy();
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!(target: "vulkan", "{:?}: {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!(target: "vulkan", "{:?}: {}", types, msg);
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        debug!(target: "vulkan", "{:?}: {}", types, msg);
    } else {
        trace!(target: "vulkan", "{:?}: {}", types, msg);
    }
    vk::FALSE
}

fn messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    vk::DebugUtilsMessengerCreateInfoEXT {
        s_type: vk::StructureType::DEBUG_UTILS_MESSENGER_CREATE_INFO_EXT,
        message_severity: vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
            | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
            | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
            | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        message_type: vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
            | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
            | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        pfn_user_callback: Some(debug_callback),
        ..Default::default()
    }
}

/// Extensions that are requested only when present, never required.
fn optional_extensions(available: &[std::ffi::CString], cfg: &InstanceConfig) -> Vec<&'static CStr> {
    let has = |name: &CStr| available.iter().any(|a| a.as_c_str() == name);
    let mut out = Vec::new();
    if cfg.hdr && has(ash::ext::swapchain_colorspace::NAME) {
        out.push(ash::ext::swapchain_colorspace::NAME);
    }
    if cfg!(target_os = "macos") && has(ash::khr::portability_enumeration::NAME) {
        out.push(ash::khr::portability_enumeration::NAME);
    }
    out
}

impl VulkanInstance {
    pub unsafe fn create(target: &WindowTarget, cfg: &InstanceConfig) -> RenderResult<Self> {
        // Loaded at runtime; a machine without a Vulkan loader gets an error, not a link failure.
        let entry = ash::Entry::load()?;

        match entry.try_enumerate_instance_version() {
            Ok(Some(v)) => info!(
                "Vulkan loader API {}.{}.{}",
                vk::api_version_major(v),
                vk::api_version_minor(v),
                vk::api_version_patch(v)
            ),
            Ok(None) => info!("Vulkan loader API 1.0"),
            Err(e) => warn!("enumerate_instance_version failed: {e}"),
        }

        let available_layers = layer_names(
            &entry
                .enumerate_instance_layer_properties()
                .vk_op("enumerate_instance_layer_properties")?,
        );
        let available_exts = extension_names(
            &entry
                .enumerate_instance_extension_properties(None)
                .vk_op("enumerate_instance_extension_properties")?,
        );

        let mut wanted_exts = target.required_extensions()?;
        if cfg.validation {
            wanted_exts.push(debug_utils::NAME);
        }
        wanted_exts.extend(optional_extensions(&available_exts, cfg));

        let wanted_layers: &[&CStr] = if cfg.validation {
            &[VALIDATION_LAYER]
        } else {
            &[]
        };

        let enabled = negotiate(wanted_layers, &available_layers, &wanted_exts, &available_exts)?;
        let layer_ptrs = enabled.layer_ptrs();
        let ext_ptrs = enabled.extension_ptrs();

        let app_info = vk::ApplicationInfo {
            s_type: vk::StructureType::APPLICATION_INFO,
            p_application_name: c"Triangle".as_ptr(),
            application_version: vk::make_api_version(0, 1, 0, 0),
            p_engine_name: c"tri".as_ptr(),
            engine_version: vk::make_api_version(0, 1, 0, 0),
            api_version: vk::API_VERSION_1_0,
            ..Default::default()
        };

        let flags = if enabled.has_extension(ash::khr::portability_enumeration::NAME) {
            vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR
        } else {
            vk::InstanceCreateFlags::empty()
        };

        let use_debug = enabled.has_extension(debug_utils::NAME);
        // Chained so instance creation and destruction are covered by the callback too.
        let chained = messenger_info();
        let create_info = vk::InstanceCreateInfo {
            s_type: vk::StructureType::INSTANCE_CREATE_INFO,
            p_next: if use_debug {
                &chained as *const _ as *const c_void
            } else {
                std::ptr::null()
            },
            flags,
            p_application_info: &app_info,
            enabled_layer_count: layer_ptrs.len() as u32,
            pp_enabled_layer_names: layer_ptrs.as_ptr(),
            enabled_extension_count: ext_ptrs.len() as u32,
            pp_enabled_extension_names: ext_ptrs.as_ptr(),
            ..Default::default()
        };

        let instance = entry
            .create_instance(&create_info, None)
            .vk_op("create_instance")?;

        let debug = if use_debug {
            let loader = debug_utils::Instance::new(&entry, &instance);
            match loader.create_debug_utils_messenger(&messenger_info(), None) {
                Ok(messenger) => Some(DebugMessenger { loader, messenger }),
                Err(e) => {
                    warn!("debug messenger unavailable: {e}");
                    None
                }
            }
        } else {
            None
        };

        // Evaluated outside `info!`: the macro's expansion brings
        // `tracing::field::debug` into scope, shadowing the local `debug`.
        let validation_state = if debug.is_some() { "on" } else { "off" };
        info!(
            "instance created: {} layer(s), {} extension(s), validation {}",
            enabled.layers.len(),
            enabled.extensions.len(),
            validation_state
        );

        Ok(Self {
            entry,
            instance,
            enabled,
            debug,
        })
    }

    /// Must run after every object created from this instance is gone.
    pub unsafe fn destroy(&mut self) {
        if let Some(dbg) = self.debug.take() {
            dbg.loader.destroy_debug_utils_messenger(dbg.messenger, None);
        }
        self.instance.destroy_instance(None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;

    #[test]
    fn colorspace_extension_only_with_hdr() {
        let avail = vec![CString::from(ash::ext::swapchain_colorspace::NAME)];
        let sdr = InstanceConfig {
            validation: false,
            hdr: false,
        };
        let hdr = InstanceConfig {
            validation: false,
            hdr: true,
        };
        assert!(!optional_extensions(&avail, &sdr).contains(&ash::ext::swapchain_colorspace::NAME));
        assert!(optional_extensions(&avail, &hdr).contains(&ash::ext::swapchain_colorspace::NAME));
        assert!(optional_extensions(&[], &hdr).is_empty());
    }

    #[test]
    fn messenger_covers_errors_and_warnings() {
        let info = messenger_info();
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR));
        assert!(info
            .message_severity
            .contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING));
        assert!(info.pfn_user_callback.is_some());
    }
}
