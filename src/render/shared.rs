use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::camera::CameraParams;
use crate::scene::SceneNode;

/// Lighting state shared by both GPU backends.
#[derive(Clone, Copy, Debug)]
pub(crate) struct LightParams {
    pub position: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

/// Key light placed above and behind the viewer so models placed in front
/// of the user are lit from the camera side.
pub(crate) const KEY_LIGHT: LightParams = LightParams {
    position: Vec3::new(1.0, 4.0, 2.0),
    color: Vec3::ONE,
    intensity: 1.0,
};

/// Per-view uniform block, identical layout in WGSL and GLSL (std140).
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct GlobalUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_position: [f32; 4],
    pub light_position: [f32; 4],
    pub light_color: [f32; 4],
}

impl GlobalUniform {
    pub fn new(camera: &CameraParams, light: &LightParams) -> Self {
        Self {
            view_proj: camera.view_proj.to_cols_array_2d(),
            camera_position: camera.position.extend(1.0).into(),
            light_position: light.position.extend(1.0).into(),
            light_color: light.color.extend(light.intensity).into(),
        }
    }
}

/// Per-draw uniform block.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct ObjectConstants {
    pub model: [[f32; 4]; 4],
    pub normal: [[f32; 4]; 3],
    pub color: [f32; 4],
}

impl ObjectConstants {
    pub fn new(node: &SceneNode, color: Vec4) -> Self {
        let model = node.transform.matrix();
        Self {
            model: model.to_cols_array_2d(),
            normal: mat3_to_3x4(normal_matrix(model)),
            color: color.into(),
        }
    }
}

fn normal_matrix(model: Mat4) -> Mat3 {
    let linear = Mat3::from_mat4(model);
    if linear.determinant().abs() <= f32::EPSILON {
        Mat3::IDENTITY
    } else {
        linear.inverse().transpose()
    }
}

fn mat3_to_3x4(matrix: Mat3) -> [[f32; 4]; 3] {
    let cols = matrix.to_cols_array();
    [
        [cols[0], cols[1], cols[2], 0.0],
        [cols[3], cols[4], cols[5], 0.0],
        [cols[6], cols[7], cols[8], 0.0],
    ]
}

#[cfg(not(target_arch = "wasm32"))]
pub(crate) const WGSL_SHADER: &str = r#"
struct GlobalUniform {
    view_proj: mat4x4<f32>,
    camera_position: vec4<f32>,
    light_position: vec4<f32>,
    light_color: vec4<f32>,
}

struct ObjectConstants {
    model: mat4x4<f32>,
    normal: mat3x4<f32>,
    color: vec4<f32>,
}

@group(0) @binding(0)
var<uniform> globals: GlobalUniform;

@group(1) @binding(0)
var<uniform> object: ObjectConstants;

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var out: VertexOutput;
    let world_position = object.model * vec4<f32>(input.position, 1.0);
    out.position = globals.view_proj * world_position;
    out.world_pos = world_position.xyz;

    let world_normal = mat3x3<f32>(
        object.normal[0].xyz,
        object.normal[1].xyz,
        object.normal[2].xyz
    ) * input.normal;

    out.normal = normalize(world_normal);
    return out;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let light_dir = normalize(globals.light_position.xyz - input.world_pos);
    let normal = normalize(input.normal);
    let diffuse = max(dot(normal, light_dir), 0.0);
    let ambient = 0.25;
    let intensity = globals.light_color.w;
    let light_color = globals.light_color.xyz;
    let lit_color = (ambient + diffuse * intensity) * object.color.rgb * light_color;
    return vec4<f32>(lit_color, object.color.a);
}
"#;

#[cfg(target_arch = "wasm32")]
pub(crate) const GLSL_VERTEX_SHADER: &str = r#"#version 300 es
layout(std140) uniform Globals {
    mat4 view_proj;
    vec4 camera_position;
    vec4 light_position;
    vec4 light_color;
} globals;

layout(std140) uniform Object {
    mat4 model;
    vec4 normal_cols[3];
    vec4 color;
} object;

layout(location = 0) in vec3 a_position;
layout(location = 1) in vec3 a_normal;

out vec3 v_world_pos;
out vec3 v_normal;

void main() {
    vec4 world_position = object.model * vec4(a_position, 1.0);
    gl_Position = globals.view_proj * world_position;
    v_world_pos = world_position.xyz;
    mat3 normal_matrix = mat3(
        object.normal_cols[0].xyz,
        object.normal_cols[1].xyz,
        object.normal_cols[2].xyz
    );
    v_normal = normalize(normal_matrix * a_normal);
}
"#;

#[cfg(target_arch = "wasm32")]
pub(crate) const GLSL_FRAGMENT_SHADER: &str = r#"#version 300 es
precision highp float;

layout(std140) uniform Globals {
    mat4 view_proj;
    vec4 camera_position;
    vec4 light_position;
    vec4 light_color;
} globals;

layout(std140) uniform Object {
    mat4 model;
    vec4 normal_cols[3];
    vec4 color;
} object;

in vec3 v_world_pos;
in vec3 v_normal;

out vec4 frag_color;

void main() {
    vec3 light_dir = normalize(globals.light_position.xyz - v_world_pos);
    vec3 normal = normalize(v_normal);
    float diffuse = max(dot(normal, light_dir), 0.0);
    float ambient = 0.25;
    vec3 lit_color = (ambient + diffuse * globals.light_color.w) * object.color.rgb * globals.light_color.xyz;
    frag_color = vec4(lit_color, object.color.a);
}
"#;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Quat;

    use super::*;
    use crate::model::ModelMesh;
    use crate::scene::{Scene, Transform};

    #[test]
    fn uniform_blocks_match_std140_sizes() {
        assert_eq!(std::mem::size_of::<GlobalUniform>(), 112);
        assert_eq!(std::mem::size_of::<ObjectConstants>(), 128);
    }

    #[test]
    fn object_constants_follow_node_transform() {
        let mut scene = Scene::new();
        let transform = Transform {
            position: Vec3::new(0.0, 0.0, -2.0),
            orientation: Quat::IDENTITY,
            scale: Vec3::splat(0.0),
        };
        let id = scene.add("flat", Arc::new(ModelMesh::unit_cube()), transform);
        let constants = ObjectConstants::new(scene.get(id).unwrap(), Vec4::ONE);
        assert_eq!(constants.model[3], [0.0, 0.0, -2.0, 1.0]);
        // Degenerate scale falls back to an identity normal matrix.
        assert_eq!(constants.normal[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
