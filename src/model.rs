use glam::{Mat3, Mat4, Vec3, Vec4};
use gltf::{buffer, mesh::Mode, Gltf};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Floats per interleaved vertex: `position.xyz` followed by `normal.xyz`.
pub const VERTEX_STRIDE: usize = 6;

/// GPU ready mesh buffers for one glTF primitive, already in model space.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MeshPrimitive {
    pub vertices: Vec<f32>,
    pub indices: Vec<u32>,
    pub base_color: Vec4,
}

impl MeshPrimitive {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len() / VERTEX_STRIDE
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Every triangle primitive of a model with node transforms baked in.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ModelMesh {
    pub name: String,
    pub primitives: Vec<MeshPrimitive>,
}

impl ModelMesh {
    pub fn triangle_count(&self) -> usize {
        self.primitives.iter().map(MeshPrimitive::triangle_count).sum()
    }

    pub fn vertex_count(&self) -> usize {
        self.primitives.iter().map(MeshPrimitive::vertex_count).sum()
    }

    /// Axis aligned bounds of every vertex, `None` for an empty mesh.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        self.primitives
            .iter()
            .flat_map(|primitive| primitive.vertices.chunks_exact(VERTEX_STRIDE))
            .map(|chunk| Vec3::from_slice(&chunk[..3]))
            .fold(None, |acc, point| match acc {
                None => Some((point, point)),
                Some((min, max)) => Some((min.min(point), max.max(point))),
            })
    }

    /// Unit cube used when a renderer needs geometry before the model arrives.
    pub fn unit_cube() -> Self {
        Self {
            name: "unit-cube".to_string(),
            primitives: vec![MeshPrimitive {
                vertices: UNIT_CUBE_VERTICES.to_vec(),
                indices: UNIT_CUBE_INDICES.to_vec(),
                base_color: Vec4::ONE,
            }],
        }
    }
}

/// Parses a binary glTF (`.glb`) file from memory.
///
/// Only buffers stored in the GLB binary chunk are supported. Triangle
/// primitives of the default scene (or of every mesh, when the file has no
/// scene) are flattened with their node transforms applied, and normals are
/// generated for primitives that do not carry any.
pub fn load_glb_from_slice(name: &str, data: &[u8]) -> Result<ModelMesh, ModelError> {
    let gltf = Gltf::from_slice(data).map_err(|source| ModelError::Parse {
        name: name.to_string(),
        source,
    })?;

    let blob = gltf.blob.as_deref();
    let buffers = gltf
        .buffers()
        .map(|buffer| match buffer.source() {
            buffer::Source::Bin => blob.ok_or_else(|| ModelError::Unsupported {
                name: name.to_string(),
                message: "binary chunk is missing".to_string(),
            }),
            buffer::Source::Uri(uri) => Err(ModelError::Unsupported {
                name: name.to_string(),
                message: format!("external buffer {uri} is not supported"),
            }),
        })
        .collect::<Result<Vec<&[u8]>, _>>()?;

    let mut primitives = Vec::new();
    match gltf.default_scene().or_else(|| gltf.scenes().next()) {
        Some(scene) => {
            for node in scene.nodes() {
                collect_node(name, &node, Mat4::IDENTITY, &buffers, &mut primitives)?;
            }
        }
        None => {
            for mesh in gltf.meshes() {
                append_mesh(name, &mesh, Mat4::IDENTITY, &buffers, &mut primitives)?;
            }
        }
    }

    if primitives.is_empty() {
        return Err(ModelError::Empty {
            name: name.to_string(),
        });
    }

    let mesh = ModelMesh {
        name: name.to_string(),
        primitives,
    };
    debug!(
        "decoded {name}: {} primitives, {} triangles",
        mesh.primitives.len(),
        mesh.triangle_count()
    );
    Ok(mesh)
}

fn collect_node(
    name: &str,
    node: &gltf::Node<'_>,
    parent: Mat4,
    buffers: &[&[u8]],
    out: &mut Vec<MeshPrimitive>,
) -> Result<(), ModelError> {
    let world = parent * Mat4::from_cols_array_2d(&node.transform().matrix());
    if let Some(mesh) = node.mesh() {
        append_mesh(name, &mesh, world, buffers, out)?;
    }
    for child in node.children() {
        collect_node(name, &child, world, buffers, out)?;
    }
    Ok(())
}

fn append_mesh(
    name: &str,
    mesh: &gltf::Mesh<'_>,
    world: Mat4,
    buffers: &[&[u8]],
    out: &mut Vec<MeshPrimitive>,
) -> Result<(), ModelError> {
    let normal_matrix = Mat3::from_mat4(world).inverse().transpose();

    for primitive in mesh.primitives() {
        if primitive.mode() != Mode::Triangles {
            warn!(
                "{name}: skipping {:?} primitive in mesh {}",
                primitive.mode(),
                mesh.name().unwrap_or("<unnamed>")
            );
            continue;
        }

        let reader = primitive.reader(|buffer| buffers.get(buffer.index()).copied());
        let Some(positions) = reader.read_positions() else {
            warn!("{name}: primitive without positions skipped");
            continue;
        };
        let positions: Vec<Vec3> = positions
            .map(|p| world.transform_point3(Vec3::from_array(p)))
            .collect();
        let normals: Option<Vec<Vec3>> = reader.read_normals().map(|normals| {
            normals
                .map(|n| (normal_matrix * Vec3::from_array(n)).normalize_or_zero())
                .collect()
        });
        let indices: Vec<u32> = match reader.read_indices() {
            Some(indices) => indices.into_u32().collect(),
            None => (0..positions.len() as u32).collect(),
        };

        if let Some(bad) = indices.iter().find(|&&i| i as usize >= positions.len()) {
            return Err(ModelError::Unsupported {
                name: name.to_string(),
                message: format!("index {bad} is out of range for {} vertices", positions.len()),
            });
        }

        let mut vertices = Vec::with_capacity(positions.len() * VERTEX_STRIDE);
        for (i, position) in positions.iter().enumerate() {
            let normal = normals
                .as_ref()
                .and_then(|normals| normals.get(i).copied())
                .unwrap_or(Vec3::ZERO);
            vertices.extend_from_slice(&[position.x, position.y, position.z]);
            vertices.extend_from_slice(&[normal.x, normal.y, normal.z]);
        }

        let mut built = MeshPrimitive {
            vertices,
            indices,
            base_color: Vec4::from_array(
                primitive
                    .material()
                    .pbr_metallic_roughness()
                    .base_color_factor(),
            ),
        };
        if normals.is_none() {
            compute_normals(&mut built);
        }
        out.push(built);
    }
    Ok(())
}

fn compute_normals(mesh: &mut MeshPrimitive) {
    let mut accum = vec![Vec3::ZERO; mesh.vertex_count()];

    for triangle in mesh.indices.chunks_exact(3) {
        let i0 = triangle[0] as usize;
        let i1 = triangle[1] as usize;
        let i2 = triangle[2] as usize;
        let p0 = Vec3::from_slice(&mesh.vertices[i0 * VERTEX_STRIDE..]);
        let p1 = Vec3::from_slice(&mesh.vertices[i1 * VERTEX_STRIDE..]);
        let p2 = Vec3::from_slice(&mesh.vertices[i2 * VERTEX_STRIDE..]);
        let normal = (p1 - p0).cross(p2 - p0);
        if normal.length_squared() > f32::EPSILON {
            let normal = normal.normalize();
            accum[i0] += normal;
            accum[i1] += normal;
            accum[i2] += normal;
        }
    }

    for (i, normal) in accum.into_iter().enumerate() {
        let normal = normal.normalize_or_zero();
        mesh.vertices[i * VERTEX_STRIDE + 3] = normal.x;
        mesh.vertices[i * VERTEX_STRIDE + 4] = normal.y;
        mesh.vertices[i * VERTEX_STRIDE + 5] = normal.z;
    }
}

#[rustfmt::skip]
const UNIT_CUBE_VERTICES: &[f32] = &[
    // positions        // normals
    -0.5, -0.5,  0.5,   0.0,  0.0,  1.0,
     0.5, -0.5,  0.5,   0.0,  0.0,  1.0,
     0.5,  0.5,  0.5,   0.0,  0.0,  1.0,
    -0.5,  0.5,  0.5,   0.0,  0.0,  1.0,
    -0.5, -0.5, -0.5,   0.0,  0.0, -1.0,
     0.5, -0.5, -0.5,   0.0,  0.0, -1.0,
     0.5,  0.5, -0.5,   0.0,  0.0, -1.0,
    -0.5,  0.5, -0.5,   0.0,  0.0, -1.0,
    -0.5, -0.5, -0.5,  -1.0,  0.0,  0.0,
    -0.5, -0.5,  0.5,  -1.0,  0.0,  0.0,
    -0.5,  0.5,  0.5,  -1.0,  0.0,  0.0,
    -0.5,  0.5, -0.5,  -1.0,  0.0,  0.0,
     0.5, -0.5, -0.5,   1.0,  0.0,  0.0,
     0.5, -0.5,  0.5,   1.0,  0.0,  0.0,
     0.5,  0.5,  0.5,   1.0,  0.0,  0.0,
     0.5,  0.5, -0.5,   1.0,  0.0,  0.0,
    -0.5, -0.5, -0.5,   0.0, -1.0,  0.0,
     0.5, -0.5, -0.5,   0.0, -1.0,  0.0,
     0.5, -0.5,  0.5,   0.0, -1.0,  0.0,
    -0.5, -0.5,  0.5,   0.0, -1.0,  0.0,
    -0.5,  0.5, -0.5,   0.0,  1.0,  0.0,
     0.5,  0.5, -0.5,   0.0,  1.0,  0.0,
     0.5,  0.5,  0.5,   0.0,  1.0,  0.0,
    -0.5,  0.5,  0.5,   0.0,  1.0,  0.0,
];

const UNIT_CUBE_INDICES: &[u32] = &[
    0, 1, 2, 0, 2, 3, // front
    4, 6, 5, 4, 7, 6, // back
    8, 9, 10, 8, 10, 11, // left
    12, 14, 13, 12, 15, 14, // right
    16, 18, 17, 16, 19, 18, // bottom
    20, 21, 22, 20, 22, 23, // top
];
