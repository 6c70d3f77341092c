use std::{env, fs, path::PathBuf};

fn main() {
    let out = PathBuf::from(env::var("OUT_DIR").unwrap());

    // Vertex shader, in-shader geometry: positions and colors indexed by
    // gl_VertexIndex. Clockwise in framebuffer space (y down).
    let vs_src = r#"
#version 450
layout(location = 0) out vec3 vColor;

vec2 positions[3] = vec2[](
    vec2(0.0, -0.5),
    vec2(0.5, 0.5),
    vec2(-0.5, 0.5)
);

vec3 colors[3] = vec3[](
    vec3(1.0, 0.0, 0.0),
    vec3(0.0, 1.0, 0.0),
    vec3(0.0, 0.0, 1.0)
);

void main() {
    gl_Position = vec4(positions[gl_VertexIndex], 0.0, 1.0);
    vColor = colors[gl_VertexIndex];
}
"#;

    // Vertex shader, vertex-buffer geometry. Matches `Vertex`:
    //   - binding 0, location 0: R32G32_SFLOAT (position)
    //   - binding 0, location 1: R32G32B32_SFLOAT (color)
    let vs_vb_src = r#"
#version 450
layout(location = 0) in vec2 inPos;
layout(location = 1) in vec3 inColor;

layout(location = 0) out vec3 vColor;

void main() {
    vColor = inColor;
    gl_Position = vec4(inPos, 0.0, 1.0);
}
"#;

    // Fragment shader shared by both variants.
    let fs_src = r#"
#version 450
layout(location = 0) in vec3 vColor;
layout(location = 0) out vec4 outColor;

void main() {
    outColor = vec4(vColor, 1.0);
}
"#;

    let comp = shaderc::Compiler::new().unwrap();
    let mut opts = shaderc::CompileOptions::new().unwrap();

    // Instance and device are created for Vulkan 1.0.
    opts.set_target_env(
        shaderc::TargetEnv::Vulkan,
        shaderc::EnvVersion::Vulkan1_0 as u32,
    );
    opts.set_optimization_level(shaderc::OptimizationLevel::Performance);

    let shaders = [
        (vs_src, shaderc::ShaderKind::Vertex, "tri.vert"),
        (vs_vb_src, shaderc::ShaderKind::Vertex, "tri_vb.vert"),
        (fs_src, shaderc::ShaderKind::Fragment, "tri.frag"),
    ];
    for (src, kind, name) in shaders {
        let spv = comp
            .compile_into_spirv(src, kind, name, "main", Some(&opts))
            .unwrap();
        fs::write(out.join(format!("{name}.spv")), spv.as_binary_u8()).unwrap();
    }

    // Re-run if this file changes (inline sources live here)
    println!("cargo:rerun-if-changed=build.rs");
}
