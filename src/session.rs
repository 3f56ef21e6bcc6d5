//! Session bootstrap: everything between "the user asked for AR" and "the
//! session ended".

use std::cell::RefCell;
use std::sync::Arc;

use futures::channel::oneshot;
use log::{info, warn};

use crate::assets::ModelLoader;
use crate::camera::PerspectiveCamera;
use crate::config::ViewerConfig;
use crate::error::ViewerError;
use crate::frame_loop::{FrameLoop, FrameStats, FrameState};
use crate::render::{SceneRenderer, SurfaceFactory};
use crate::scene::{Scene, SceneNode, Transform};
use crate::xr::{XrRuntime, XrSession};

/// Result of a session that ran to its end.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub stats: FrameStats,
    /// The model as it was when the session-end handler took it out of the scene.
    pub removed_model: Option<SceneNode>,
    pub removals: u32,
    /// Nodes still in the scene after cleanup.
    pub remaining_nodes: usize,
}

impl SessionSummary {
    pub fn final_transform(&self) -> Option<Transform> {
        self.removed_model.as_ref().map(|node| node.transform)
    }
}

/// Slot holding the session currently running, if any.
pub struct ActiveSession<S> {
    slot: RefCell<Option<S>>,
}

impl<S: XrSession> ActiveSession<S> {
    pub fn new() -> Self {
        Self {
            slot: RefCell::new(None),
        }
    }

    pub fn get(&self) -> Option<S> {
        self.slot.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        self.slot
            .borrow()
            .as_ref()
            .map(|session| !session.has_ended())
            .unwrap_or(false)
    }

    fn set(&self, session: S) {
        *self.slot.borrow_mut() = Some(session);
    }

    fn clear(&self) {
        self.slot.borrow_mut().take();
    }
}

/// Requests a session, builds the scene around the loaded model, runs the
/// frame loop and resolves once the session has ended.
///
/// A session that was granted but whose setup failed afterwards is ended
/// before the error is returned.
pub async fn bootstrap<Rt, L, F>(
    runtime: &Rt,
    loader: &L,
    surfaces: &F,
    config: &ViewerConfig,
    active: &ActiveSession<Rt::Session>,
) -> Result<SessionSummary, ViewerError>
where
    Rt: XrRuntime,
    L: ModelLoader,
    F: SurfaceFactory<Rt::Session>,
{
    let session = runtime
        .request_session(config.session_mode)
        .await
        .map_err(ViewerError::SessionRequest)?;
    info!("{} session granted", config.session_mode.as_str());
    active.set(session.clone());

    let result = run_granted(&session, loader, surfaces, config).await;
    active.clear();

    if result.is_err() && !session.has_ended() {
        if let Err(err) = session.end().await {
            warn!("failed to end session after setup error: {err}");
        }
    }
    result
}

async fn run_granted<S, L, F>(
    session: &S,
    loader: &L,
    surfaces: &F,
    config: &ViewerConfig,
) -> Result<SessionSummary, ViewerError>
where
    S: XrSession,
    L: ModelLoader,
    F: SurfaceFactory<S>,
{
    let space = session
        .request_reference_space(config.reference_space)
        .await
        .map_err(ViewerError::ReferenceSpace)?;

    let renderer = surfaces
        .create(session)
        .await
        .map_err(ViewerError::Surface)?;
    let (width, height) = renderer.surface_size();
    let camera = PerspectiveCamera::new(&config.camera, width as f32 / height.max(1) as f32);

    let mesh = loader.load(&config.model).await?;
    info!(
        "loaded {} ({} primitives, {} triangles)",
        config.model,
        mesh.primitives.len(),
        mesh.triangle_count()
    );

    let mut scene = Scene::new();
    let tracked = scene.add(
        config.model.clone(),
        Arc::new(mesh),
        Transform::from_position(config.model_offset),
    );

    let frame_loop = FrameLoop::new(
        session.clone(),
        FrameState::new(scene, tracked, camera, renderer, space),
    );

    let (ended_tx, ended_rx) = oneshot::channel();
    session.on_end(frame_loop.end_handler(move || {
        let _ = ended_tx.send(());
    }));

    if session.has_ended() {
        warn!("session ended during setup");
        frame_loop.end_handler(|| {})();
        return Ok(summarize(&frame_loop));
    }

    frame_loop.start();
    info!("AR session running");

    // A dropped sender means the session object went away without an end
    // event; either way nothing will render any more.
    let _ = ended_rx.await;
    let summary = summarize(&frame_loop);
    info!(
        "AR session ended after {} frames",
        summary.stats.frames_rendered
    );
    Ok(summary)
}

fn summarize<S, R>(frame_loop: &FrameLoop<S, R>) -> SessionSummary
where
    S: XrSession,
    R: SceneRenderer + 'static,
{
    let state = frame_loop.state();
    let state = state.borrow();
    SessionSummary {
        stats: state.stats(),
        removed_model: state.detached().cloned(),
        removals: state.detach_count(),
        remaining_nodes: state.scene.len(),
    }
}
