// SPDX-License-Identifier: CEPL-1.0
use ash::khr::surface;
use ash::vk;

/// Queue roles found on one physical device for one surface. Either index
/// may be missing; check [`QueueFamilyIndices::is_complete`] before use.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

/// Both roles resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedQueues {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Scans in reported order, taking the first graphics-capable family and,
    /// independently, the first family that can present. Stops once both
    /// roles are filled.
    pub fn resolve(
        families: &[vk::QueueFamilyProperties],
        mut supports_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut out = Self::default();
        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            if out.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                out.graphics = Some(i);
            }
            if out.present.is_none() && supports_present(i) {
                out.present = Some(i);
            }
            if out.is_complete() {
                break;
            }
        }
        out
    }

    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn require(&self) -> Option<ResolvedQueues> {
        Some(ResolvedQueues {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

impl ResolvedQueues {
    /// True when graphics and present live on different families.
    pub fn is_split(&self) -> bool {
        self.graphics != self.present
    }

    /// Families to create queues on; never lists the same family twice.
    pub fn unique_families(&self) -> Vec<u32> {
        if self.is_split() {
            vec![self.graphics, self.present]
        } else {
            vec![self.graphics]
        }
    }
}

/// Queries the driver for `phys` against `surface`. A failed support query
/// counts as "cannot present".
pub unsafe fn find_queue_families(
    instance: &ash::Instance,
    surface_loader: &surface::Instance,
    phys: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> QueueFamilyIndices {
    let families = instance.get_physical_device_queue_family_properties(phys);
    QueueFamilyIndices::resolve(&families, |i| {
        surface_loader
            .get_physical_device_surface_support(phys, i, surface)
            .unwrap_or(false)
    })
}
