// SPDX-License-Identifier: CEPL-1.0
use std::path::PathBuf;

use ash::vk;

use crate::pipeline::GeometryMode;

pub const MAX_FRAMES_IN_FLIGHT: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentModePreference {
    Immediate,
    Mailbox,
    FifoRelaxed,
    Fifo,
}

impl PresentModePreference {
    pub fn to_vk(self) -> vk::PresentModeKHR {
        match self {
            PresentModePreference::Immediate => vk::PresentModeKHR::IMMEDIATE,
            PresentModePreference::Mailbox => vk::PresentModeKHR::MAILBOX,
            PresentModePreference::FifoRelaxed => vk::PresentModeKHR::FIFO_RELAXED,
            PresentModePreference::Fifo => vk::PresentModeKHR::FIFO,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VkConfig {
    pub frames_in_flight: usize,
    /// Tried in order; FIFO is used when none is available.
    pub present_modes: Vec<PresentModePreference>,
    /// Lets FP16 and HDR10 surface formats compete in format selection.
    pub hdr: bool,
    pub validation: bool,
    pub geometry: GeometryMode,
    pub clear_color: [f32; 4],
    /// Combined SPIR-V blob with `vertexMain` / `fragmentMain`. The built-in
    /// shaders are used when unset.
    pub shader_blob: Option<PathBuf>,
}

impl Default for VkConfig {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            present_modes: vec![
                PresentModePreference::Mailbox,
                PresentModePreference::FifoRelaxed,
                PresentModePreference::Fifo,
            ],
            hdr: false,
            validation: cfg!(debug_assertions),
            geometry: GeometryMode::InShader,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            shader_blob: None,
        }
    }
}

impl VkConfig {
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn present_modes_vk(&self) -> Vec<vk::PresentModeKHR> {
        self.present_modes.iter().map(|p| p.to_vk()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = VkConfig::default();
        assert_eq!(c.frames_in_flight(), 2);
        assert_eq!(
            c.present_modes_vk(),
            vec![
                vk::PresentModeKHR::MAILBOX,
                vk::PresentModeKHR::FIFO_RELAXED,
                vk::PresentModeKHR::FIFO
            ]
        );
        assert_eq!(c.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(!c.hdr);
    }

    #[test]
    fn frames_in_flight_is_clamped() {
        let mut c = VkConfig::default();
        c.frames_in_flight = 0;
        assert_eq!(c.frames_in_flight(), 1);
        c.frames_in_flight = 8;
        assert_eq!(c.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
    }
}
