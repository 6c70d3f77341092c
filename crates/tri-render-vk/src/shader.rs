// SPDX-License-Identifier: CEPL-1.0
use std::ffi::{CStr, CString};
use std::io::Cursor;
use std::path::Path;

use ash::util::read_spv;
use ash::vk;

use crate::error::{RenderError, RenderResult, VkResultExt};
use crate::pipeline::GeometryMode;

const SPIRV_MAGIC: u32 = 0x0723_0203;

// Compiled by build.rs
static TRI_VS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.vert.spv"));
static TRI_VB_VS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri_vb.vert.spv"));
static TRI_FS: &[u8] = include_bytes!(concat!(env!("OUT_DIR"), "/tri.frag.spv"));

#[derive(Clone, Debug, PartialEq, Eq)]
enum Modules {
    /// One blob holding both entry points.
    Shared(Vec<u32>),
    Split { vertex: Vec<u32>, fragment: Vec<u32> },
}

/// SPIR-V code for the two programmable stages plus their entry points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderBundle {
    modules: Modules,
    vertex_entry: CString,
    fragment_entry: CString,
}

/// Checks size and magic, then decodes into words. Both byte orders are accepted.
pub fn decode_spirv(bytes: &[u8]) -> RenderResult<Vec<u32>> {
    if bytes.is_empty() {
        return Err(RenderError::InvalidShader("empty blob".into()));
    }
    if bytes.len() % 4 != 0 {
        return Err(RenderError::InvalidShader(format!(
            "length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    let head = [bytes[0], bytes[1], bytes[2], bytes[3]];
    if u32::from_le_bytes(head) != SPIRV_MAGIC && u32::from_be_bytes(head) != SPIRV_MAGIC {
        return Err(RenderError::InvalidShader(format!(
            "bad magic {:#010x}",
            u32::from_le_bytes(head)
        )));
    }
    read_spv(&mut Cursor::new(bytes)).map_err(|e| RenderError::InvalidShader(e.to_string()))
}

fn entry_name(name: &str) -> RenderResult<CString> {
    CString::new(name).map_err(|_| RenderError::InvalidShader(format!("entry point {name:?}")))
}

impl ShaderBundle {
    /// The shaders compiled into the binary, entry point `main` in each.
    pub fn builtin(mode: GeometryMode) -> RenderResult<Self> {
        let vertex = match mode {
            GeometryMode::InShader => TRI_VS,
            GeometryMode::VertexBuffer => TRI_VB_VS,
        };
        Self::split(vertex, TRI_FS, "main", "main")
    }

    pub fn split(
        vertex: &[u8],
        fragment: &[u8],
        vertex_entry: &str,
        fragment_entry: &str,
    ) -> RenderResult<Self> {
        Ok(Self {
            modules: Modules::Split {
                vertex: decode_spirv(vertex)?,
                fragment: decode_spirv(fragment)?,
            },
            vertex_entry: entry_name(vertex_entry)?,
            fragment_entry: entry_name(fragment_entry)?,
        })
    }

    /// A single blob exporting both stages under different entry points.
    pub fn combined(bytes: &[u8], vertex_entry: &str, fragment_entry: &str) -> RenderResult<Self> {
        Ok(Self {
            modules: Modules::Shared(decode_spirv(bytes)?),
            vertex_entry: entry_name(vertex_entry)?,
            fragment_entry: entry_name(fragment_entry)?,
        })
    }

    /// Loads a combined blob with `vertexMain` / `fragmentMain`.
    pub fn from_file(path: &Path) -> RenderResult<Self> {
        let bytes = std::fs::read(path)
            .map_err(|e| RenderError::InvalidShader(format!("{}: {e}", path.display())))?;
        Self::combined(&bytes, "vertexMain", "fragmentMain")
    }

    pub fn vertex_entry(&self) -> &CStr {
        &self.vertex_entry
    }

    pub fn fragment_entry(&self) -> &CStr {
        &self.fragment_entry
    }

    pub fn is_shared(&self) -> bool {
        matches!(self.modules, Modules::Shared(_))
    }

    /// Short-lived modules; drop them with [`ShaderModules::destroy`] once the
    /// pipeline exists.
    pub unsafe fn create_modules(&self, device: &ash::Device) -> RenderResult<ShaderModules> {
        match &self.modules {
            Modules::Shared(code) => {
                let m = create_module(device, code)?;
                Ok(ShaderModules {
                    vertex: m,
                    fragment: m,
                })
            }
            Modules::Split { vertex, fragment } => {
                let vs = create_module(device, vertex)?;
                let fs = match create_module(device, fragment) {
                    Ok(fs) => fs,
                    Err(e) => {
                        device.destroy_shader_module(vs, None);
                        return Err(e);
                    }
                };
                Ok(ShaderModules {
                    vertex: vs,
                    fragment: fs,
                })
            }
        }
    }
}

unsafe fn create_module(device: &ash::Device, code: &[u32]) -> RenderResult<vk::ShaderModule> {
    let info = vk::ShaderModuleCreateInfo {
        s_type: vk::StructureType::SHADER_MODULE_CREATE_INFO,
        code_size: code.len() * 4,
        p_code: code.as_ptr(),
        ..Default::default()
    };
    device
        .create_shader_module(&info, None)
        .vk_op("create_shader_module")
}

#[derive(Clone, Copy, Debug)]
pub struct ShaderModules {
    pub vertex: vk::ShaderModule,
    pub fragment: vk::ShaderModule,
}

impl ShaderModules {
    pub unsafe fn destroy(self, device: &ash::Device) {
        device.destroy_shader_module(self.vertex, None);
        if self.fragment != self.vertex {
            device.destroy_shader_module(self.fragment, None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(words: &[u32]) -> Vec<u8> {
        words.iter().flat_map(|w| w.to_le_bytes()).collect()
    }

    #[test]
    fn rejects_empty_unaligned_and_bad_magic() {
        assert!(matches!(decode_spirv(&[]), Err(RenderError::InvalidShader(_))));
        assert!(matches!(
            decode_spirv(&[0x03, 0x02, 0x23, 0x07, 0x00]),
            Err(RenderError::InvalidShader(_))
        ));
        assert!(matches!(
            decode_spirv(&blob(&[0xdead_beef, 0])),
            Err(RenderError::InvalidShader(_))
        ));
    }

    #[test]
    fn accepts_either_byte_order() {
        let le = blob(&[SPIRV_MAGIC, 0x0001_0000, 7]);
        assert_eq!(decode_spirv(&le).unwrap(), vec![SPIRV_MAGIC, 0x0001_0000, 7]);

        let be: Vec<u8> = [SPIRV_MAGIC, 0x0001_0000, 7]
            .iter()
            .flat_map(|w: &u32| w.to_be_bytes())
            .collect();
        assert_eq!(decode_spirv(&be).unwrap()[0], SPIRV_MAGIC);
    }

    #[test]
    fn combined_blob_keeps_named_entries() {
        let b = ShaderBundle::combined(&blob(&[SPIRV_MAGIC, 0]), "vertexMain", "fragmentMain")
            .unwrap();
        assert!(b.is_shared());
        assert_eq!(b.vertex_entry(), c"vertexMain");
        assert_eq!(b.fragment_entry(), c"fragmentMain");
    }

    #[test]
    fn builtin_shaders_are_valid_spirv() {
        for mode in [GeometryMode::InShader, GeometryMode::VertexBuffer] {
            let b = ShaderBundle::builtin(mode).unwrap();
            assert!(!b.is_shared());
            assert_eq!(b.vertex_entry(), c"main");
        }
    }

    #[test]
    fn missing_file_is_invalid_shader() {
        let err = ShaderBundle::from_file(Path::new("/nonexistent/tri.spv")).unwrap_err();
        assert!(matches!(err, RenderError::InvalidShader(_)));
    }
}
