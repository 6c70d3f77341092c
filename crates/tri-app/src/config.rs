// SPDX-License-Identifier: CEPL-1.0
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{info, warn};
use tri_platform::WindowSettings;
use tri_render_vk::{GeometryMode, PresentModePreference, VkConfig};

pub const CONFIG_FILE: &str = "trivk.toml";

#[derive(Debug, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct AppCfg {
    pub window: WindowCfg,
    pub render: RenderCfg,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct WindowCfg {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub resizable: bool,
}

impl Default for WindowCfg {
    fn default() -> Self {
        let w = WindowSettings::default();
        WindowCfg {
            title: w.title,
            width: w.width,
            height: w.height,
            resizable: w.resizable,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PresentModeCfg {
    Immediate,
    Mailbox,
    FifoRelaxed,
    Fifo,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GeometryCfg {
    #[default]
    InShader,
    VertexBuffer,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RenderCfg {
    pub clear_color: [f32; 4],
    pub frames_in_flight: usize,
    pub present_modes: Vec<PresentModeCfg>,
    pub hdr: bool,
    /// Unset means "on in debug builds".
    pub validation: Option<bool>,
    pub geometry: GeometryCfg,
    pub shader_blob: Option<PathBuf>,
}

impl Default for RenderCfg {
    fn default() -> Self {
        RenderCfg {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            frames_in_flight: 2,
            present_modes: vec![
                PresentModeCfg::Mailbox,
                PresentModeCfg::FifoRelaxed,
                PresentModeCfg::Fifo,
            ],
            hdr: false,
            validation: None,
            geometry: GeometryCfg::InShader,
            shader_blob: None,
        }
    }
}

fn env_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl AppCfg {
    pub fn parse(src: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(src)
    }

    /// Missing file gives defaults; a malformed one is reported and ignored.
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => match Self::parse(&s) {
                Ok(cfg) => {
                    info!("config loaded from {}", path.display());
                    cfg
                }
                Err(e) => {
                    warn!("ignoring {}: {e}", path.display());
                    AppCfg::default()
                }
            },
            Err(_) => AppCfg::default(),
        }
    }

    /// `TRIVK_HDR` and `TRIVK_VALIDATION` win over the file.
    pub fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        if let Some(on) = var("TRIVK_HDR").as_deref().and_then(env_flag) {
            self.render.hdr = on;
        }
        if let Some(on) = var("TRIVK_VALIDATION").as_deref().and_then(env_flag) {
            self.render.validation = Some(on);
        }
    }

    pub fn window_settings(&self) -> WindowSettings {
        WindowSettings {
            title: self.window.title.clone(),
            width: self.window.width.max(1),
            height: self.window.height.max(1),
            resizable: self.window.resizable,
        }
    }

    pub fn vk_config(&self) -> VkConfig {
        let r = &self.render;
        let defaults = VkConfig::default();
        VkConfig {
            frames_in_flight: r.frames_in_flight,
            present_modes: r
                .present_modes
                .iter()
                .map(|m| match m {
                    PresentModeCfg::Immediate => PresentModePreference::Immediate,
                    PresentModeCfg::Mailbox => PresentModePreference::Mailbox,
                    PresentModeCfg::FifoRelaxed => PresentModePreference::FifoRelaxed,
                    PresentModeCfg::Fifo => PresentModePreference::Fifo,
                })
                .collect(),
            hdr: r.hdr,
            validation: r.validation.unwrap_or(defaults.validation),
            geometry: match r.geometry {
                GeometryCfg::InShader => GeometryMode::InShader,
                GeometryCfg::VertexBuffer => GeometryMode::VertexBuffer,
            },
            clear_color: r.clear_color,
            shader_blob: r.shader_blob.clone(),
        }
    }
}
