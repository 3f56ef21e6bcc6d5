use anyhow::{Context, Result};
use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::xr::{ReferenceSpaceKind, SessionMode};

pub const DEFAULT_MODEL: &str = "product1.glb";
pub const DEFAULT_START_BUTTON_ID: &str = "startARButton";
pub const UNSUPPORTED_MESSAGE: &str = "WebXR AR not supported on this device.";

/// Runtime options for the viewer. Every field has a default so partial JSON
/// documents are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewerConfig {
    pub model: String,
    pub start_button_id: String,
    pub session_mode: SessionMode,
    pub reference_space: ReferenceSpaceKind,
    pub model_offset: Vec3,
    pub camera: CameraConfig,
    pub unsupported_message: String,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            start_button_id: DEFAULT_START_BUTTON_ID.to_string(),
            session_mode: SessionMode::ImmersiveAr,
            reference_space: ReferenceSpaceKind::Local,
            model_offset: Vec3::new(0.0, 0.0, -2.0),
            camera: CameraConfig::default(),
            unsupported_message: UNSUPPORTED_MESSAGE.to_string(),
        }
    }
}

impl ViewerConfig {
    /// Parses a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid viewer configuration")
    }
}

/// Perspective camera used when the host does not provide per-view matrices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CameraConfig {
    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_degrees: 75.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}
