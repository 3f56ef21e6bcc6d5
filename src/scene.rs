use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::model::ModelMesh;
use crate::pose::Pose;

/// Stable handle to a node added to a [`Scene`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(u32);

/// Placement of a node in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub orientation: Quat,
    pub scale: Vec3,
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::default()
        }
    }

    /// Copies position and orientation from a tracked pose. Scale is kept.
    pub fn apply_pose(&mut self, pose: &Pose) {
        self.position = pose.position;
        self.orientation = pose.orientation;
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation, self.position)
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Renderable entry of the scene.
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub id: ObjectId,
    pub name: String,
    pub mesh: Arc<ModelMesh>,
    pub transform: Transform,
}

/// Flat list of renderable nodes, in insertion order.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    next_id: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a mesh at the given transform and returns its handle.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        mesh: Arc<ModelMesh>,
        transform: Transform,
    ) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += 1;
        self.nodes.push(SceneNode {
            id,
            name: name.into(),
            mesh,
            transform,
        });
        id
    }

    /// Detaches a node and hands it back to the caller.
    pub fn remove(&mut self, id: ObjectId) -> Option<SceneNode> {
        let index = self.nodes.iter().position(|node| node.id == id)?;
        Some(self.nodes.remove(index))
    }

    pub fn get(&self, id: ObjectId) -> Option<&SceneNode> {
        self.nodes.iter().find(|node| node.id == id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut SceneNode> {
        self.nodes.iter_mut().find(|node| node.id == id)
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.get(id).is_some()
    }

    pub fn nodes(&self) -> &[SceneNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh(name: &str) -> Arc<ModelMesh> {
        Arc::new(ModelMesh {
            name: name.to_string(),
            primitives: Vec::new(),
        })
    }

    #[test]
    fn handles_survive_removal_of_earlier_nodes() {
        let mut scene = Scene::new();
        let first = scene.add("marker", mesh("marker"), Transform::default());
        let model = scene.add("product", mesh("product"), Transform::from_position(Vec3::Z));
        scene.remove(first).unwrap();
        let node = scene.get(model).unwrap();
        assert_eq!(node.name, "product");
        assert_eq!(node.transform.position, Vec3::Z);
    }

    #[test]
    fn removing_twice_returns_none() {
        let mut scene = Scene::new();
        let id = scene.add("product", mesh("product"), Transform::default());
        assert!(scene.contains(id));
        assert!(scene.remove(id).is_some());
        assert!(!scene.contains(id));
        assert!(scene.remove(id).is_none());
        assert!(scene.is_empty());
    }

    #[test]
    fn apply_pose_keeps_scale() {
        let mut transform = Transform {
            scale: Vec3::splat(2.0),
            ..Transform::default()
        };
        let pose = Pose::new(Vec3::new(1.0, 2.0, 3.0), Quat::from_rotation_y(1.0));
        transform.apply_pose(&pose);
        assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(transform.scale, Vec3::splat(2.0));
    }
}
