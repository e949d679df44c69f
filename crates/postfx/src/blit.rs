//! Final composite onto the visible framebuffer.

/// Column-major `mat3` applied to the quad texcoords: `v' = 1 - v`. Render
/// targets store their first row at the top, the quad puts `v = 0` at the
/// bottom of the screen.
pub const FLIP_VERTICAL: [f32; 9] = [1.0, 0.0, 0.0, 0.0, -1.0, 0.0, 0.0, 1.0, 1.0];

pub const BLIT_VERTEX_SHADER: &str = r#"#version 450

layout(location = 0) in vec2 a_position;
layout(location = 1) in vec2 a_texcoord;

layout(location = 0) out vec2 v_texcoord;

layout(std140, set = 0, binding = 0) uniform BlitParams {
    mat3 u_transform;
} params;

void main() {
    v_texcoord = (params.u_transform * vec3(a_texcoord, 1.0)).xy;
    gl_Position = vec4(a_position, 0.0, 1.0);
}
"#;

pub const BLIT_FRAGMENT_SHADER: &str = r#"#version 450

layout(location = 0) in vec2 v_texcoord;
layout(location = 0) out vec4 out_color;

layout(set = 0, binding = 2) uniform texture2D u_tex;
layout(set = 0, binding = 3) uniform sampler u_tex_sampler;

void main() {
    out_color = texture(sampler2D(u_tex, u_tex_sampler), v_texcoord);
}
"#;

/// Applies a column-major `mat3` to a 2D point with `w = 1`.
pub fn apply(matrix: &[f32; 9], [x, y]: [f32; 2]) -> [f32; 2] {
    [
        matrix[0] * x + matrix[3] * y + matrix[6],
        matrix[1] * x + matrix[4] * y + matrix[7],
    ]
}
