//! Host abstraction over the WebXR device API.
//!
//! The viewer only ever talks to these traits. `web` binds them to the
//! browser through `web-sys`; `sim` is an in-process runtime that delivers
//! frames when pumped, used by the desktop binary and the tests.
#![allow(async_fn_in_trait)]

use glam::Mat4;
use serde::{Deserialize, Serialize};

use crate::camera::Viewport;
use crate::error::XrError;
use crate::pose::Pose;

#[cfg(not(target_arch = "wasm32"))]
pub mod sim;
#[cfg(target_arch = "wasm32")]
pub mod web;

/// Kind of XR session to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SessionMode {
    ImmersiveAr,
    ImmersiveVr,
    Inline,
}

impl SessionMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImmersiveAr => "immersive-ar",
            Self::ImmersiveVr => "immersive-vr",
            Self::Inline => "inline",
        }
    }
}

/// Reference space type requested at bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceSpaceKind {
    Viewer,
    Local,
    LocalFloor,
    BoundedFloor,
    Unbounded,
}

impl ReferenceSpaceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Local => "local",
            Self::LocalFloor => "local-floor",
            Self::BoundedFloor => "bounded-floor",
            Self::Unbounded => "unbounded",
        }
    }
}

/// Opaque id returned by [`XrSession::request_animation_frame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(pub u32);

/// One eye (or the single screen) of a viewer pose.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct XrViewInfo {
    pub projection: Mat4,
    /// Pose of the view in the reference space.
    pub transform: Mat4,
    pub viewport: Option<Viewport>,
}

/// Per-frame data handed to an animation frame callback. Only valid for the
/// duration of the callback.
pub trait XrFrame<S> {
    /// Pose of `space` relative to `base`, when tracking provides one.
    fn pose(&self, space: &S, base: &S) -> Option<Pose>;

    /// Views of the viewer in `space`; empty when the viewer is not tracked.
    fn views(&self, _space: &S) -> Vec<XrViewInfo> {
        Vec::new()
    }
}

/// Callback invoked once with the frame timestamp (ms) and the frame.
pub type FrameCallback<S> = Box<dyn FnOnce(f64, &dyn XrFrame<S>)>;

/// Active XR session.
pub trait XrSession: Clone + 'static {
    type Space: 'static;

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceKind,
    ) -> Result<Self::Space, XrError>;

    /// Schedules `callback` for the next frame. Requests made after the
    /// session ended are never delivered.
    fn request_animation_frame(&self, callback: FrameCallback<Self::Space>) -> FrameHandle;

    /// Registers a handler that runs once when the session ends.
    fn on_end(&self, handler: Box<dyn FnOnce()>);

    /// Ends the session; the end handlers run before this resolves.
    async fn end(&self) -> Result<(), XrError>;

    fn has_ended(&self) -> bool;
}

/// Entry point of the XR device API (`navigator.xr`).
pub trait XrRuntime {
    type Session: XrSession;

    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, XrError>;

    async fn request_session(&self, mode: SessionMode) -> Result<Self::Session, XrError>;
}
