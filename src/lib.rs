//! WebXR immersive-AR model viewer.
//!
//! The crate checks for AR support, starts a session, loads a single glTF
//! model and keeps it tracked to a reference space frame after frame. The
//! browser build talks to WebXR through `web-sys` and draws with WebGL2; the
//! native build replays sessions against a simulated XR runtime, headless or
//! in a `wgpu` preview window.

pub mod assets;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame_loop;
pub mod model;
pub mod pose;
pub mod render;
pub mod scene;
pub mod session;
pub mod viewer;
#[cfg(target_arch = "wasm32")]
pub mod web;
pub mod xr;

pub use assets::{ModelLoader, StaticModelLoader};
pub use camera::{CameraParams, PerspectiveCamera, Viewport};
pub use config::{CameraConfig, ViewerConfig};
pub use error::{ModelError, RenderError, ViewerError, XrError};
pub use frame_loop::{FrameLoop, FrameState, FrameStats, LoopPhase, SessionToken};
pub use model::{load_glb_from_slice, MeshPrimitive, ModelMesh};
pub use pose::Pose;
pub use render::{HeadlessRenderer, HeadlessSurfaces, SceneRenderer, SurfaceFactory};
pub use scene::{ObjectId, Scene, SceneNode, Transform};
pub use session::{ActiveSession, SessionSummary};
pub use viewer::{check_support, ArViewer, StartControl, StartOutcome, UserNotifier};
pub use xr::{ReferenceSpaceKind, SessionMode, XrFrame, XrRuntime, XrSession};

#[cfg(not(target_arch = "wasm32"))]
pub use assets::FsModelLoader;
#[cfg(not(target_arch = "wasm32"))]
pub use xr::sim::{SimulatedRuntime, SimulatedSession};
