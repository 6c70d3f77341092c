// SPDX-License-Identifier: CEPL-1.0
//! Capability negotiation: intersect what we ask for with what the loader or
//! driver enumerates. Missing layers degrade to a warning; missing extensions
//! are fatal because later code depends on them unconditionally.

use std::ffi::{CStr, CString};

use ash::vk;
use tracing::{info, warn};

use crate::error::{CapabilityKind, RenderError, RenderResult};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Negotiated {
    pub layers: Vec<CString>,
    pub extensions: Vec<CString>,
}

impl Negotiated {
    pub fn layer_ptrs(&self) -> Vec<*const std::ffi::c_char> {
        self.layers.iter().map(|l| l.as_ptr()).collect()
    }

    pub fn extension_ptrs(&self) -> Vec<*const std::ffi::c_char> {
        self.extensions.iter().map(|e| e.as_ptr()).collect()
    }

    pub fn has_extension(&self, name: &CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }
}

/// Returns the supported subset of the request. Fails on the first
/// requested extension that `available_extensions` does not list.
pub fn negotiate(
    requested_layers: &[&CStr],
    available_layers: &[CString],
    requested_extensions: &[&CStr],
    available_extensions: &[CString],
) -> RenderResult<Negotiated> {
    let mut out = Negotiated::default();

    for &layer in dedup(requested_layers).iter() {
        if contains(available_layers, layer) {
            info!("enabling layer {}", layer.to_string_lossy());
            out.layers.push(layer.to_owned());
        } else {
            warn!(
                "requested layer {} not found; continuing without it",
                layer.to_string_lossy()
            );
        }
    }

    for &ext in dedup(requested_extensions).iter() {
        if !contains(available_extensions, ext) {
            return Err(RenderError::MissingCapability {
                kind: CapabilityKind::InstanceExtension,
                name: ext.to_string_lossy().into_owned(),
            });
        }
        out.extensions.push(ext.to_owned());
    }

    Ok(out)
}

/// Requested names absent from `available`, in request order.
pub fn missing_extensions<'a>(requested: &[&'a CStr], available: &[CString]) -> Vec<&'a CStr> {
    requested
        .iter()
        .copied()
        .filter(|r| !contains(available, r))
        .collect()
}

pub(crate) fn layer_names(props: &[vk::LayerProperties]) -> Vec<CString> {
    props
        .iter()
        .filter_map(|p| p.layer_name_as_c_str().ok())
        .map(CStr::to_owned)
        .collect()
}

pub(crate) fn extension_names(props: &[vk::ExtensionProperties]) -> Vec<CString> {
    props
        .iter()
        .filter_map(|p| p.extension_name_as_c_str().ok())
        .map(CStr::to_owned)
        .collect()
}

fn contains(haystack: &[CString], needle: &CStr) -> bool {
    haystack.iter().any(|h| h.as_c_str() == needle)
}

fn dedup<'a>(names: &[&'a CStr]) -> Vec<&'a CStr> {
    let mut out: Vec<&CStr> = Vec::with_capacity(names.len());
    for &n in names {
        if !out.contains(&n) {
            out.push(n);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALIDATION: &CStr = c"VK_LAYER_KHRONOS_validation";
    const SURFACE: &CStr = c"VK_KHR_surface";
    const XCB: &CStr = c"VK_KHR_xcb_surface";
    const DEBUG_UTILS: &CStr = c"VK_EXT_debug_utils";

    fn owned(names: &[&CStr]) -> Vec<CString> {
        names.iter().map(|n| (*n).to_owned()).collect()
    }

    #[test]
    fn returns_requested_subset_when_everything_exists() {
        let got = negotiate(
            &[VALIDATION],
            &owned(&[VALIDATION, c"VK_LAYER_other"]),
            &[SURFACE, XCB],
            &owned(&[XCB, SURFACE, DEBUG_UTILS]),
        )
        .unwrap();
        assert_eq!(got.layers, owned(&[VALIDATION]));
        assert_eq!(got.extensions, owned(&[SURFACE, XCB]));
    }

    #[test]
    fn missing_layer_is_dropped_not_fatal() {
        let got = negotiate(&[VALIDATION], &[], &[SURFACE], &owned(&[SURFACE])).unwrap();
        assert!(got.layers.is_empty());
        assert_eq!(got.extensions, owned(&[SURFACE]));
    }

    #[test]
    fn missing_extension_is_fatal() {
        let err = negotiate(&[], &[], &[SURFACE, DEBUG_UTILS], &owned(&[SURFACE])).unwrap_err();
        match err {
            RenderError::MissingCapability { kind, name } => {
                assert_eq!(kind, CapabilityKind::InstanceExtension);
                assert_eq!(name, "VK_EXT_debug_utils");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn matching_is_exact() {
        // A prefix of an available name must not count as a match.
        let err = negotiate(&[], &[], &[c"VK_KHR_surf"], &owned(&[SURFACE])).unwrap_err();
        assert!(matches!(err, RenderError::MissingCapability { .. }));
    }

    #[test]
    fn duplicate_requests_collapse() {
        let got = negotiate(&[], &[], &[SURFACE, SURFACE], &owned(&[SURFACE])).unwrap();
        assert_eq!(got.extensions.len(), 1);
    }

    #[test]
    fn missing_extensions_lists_absent_in_order() {
        let missing = missing_extensions(&[XCB, SURFACE, DEBUG_UTILS], &owned(&[SURFACE]));
        assert_eq!(missing, vec![XCB, DEBUG_UTILS]);
    }
}
