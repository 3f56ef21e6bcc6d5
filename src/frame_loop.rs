//! Per-frame tracking and rendering driven by the session's animation frame
//! callback.
//!
//! Each delivered frame copies the tracked pose onto the model, renders, and
//! re-arms the next frame. A [`SessionToken`] shared with the session-end
//! handler is checked when a frame arrives and again before re-arming, so a
//! frame that lands after cleanup neither draws nor schedules another one.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, error, trace};

use crate::camera::{CameraParams, PerspectiveCamera};
use crate::render::SceneRenderer;
use crate::scene::{ObjectId, Scene, SceneNode};
use crate::xr::{XrFrame, XrSession};

/// Where the loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopPhase {
    AwaitingFrame,
    Rendering,
    Stopped,
}

/// Cancellation flag shared between the loop and the session-end handler.
#[derive(Debug, Clone, Default)]
pub struct SessionToken(Rc<Cell<bool>>);

impl SessionToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.set(true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.get()
    }
}

/// Counters kept while the loop runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub frames_rendered: u64,
    pub frames_with_pose: u64,
    pub frames_skipped: u64,
    pub render_errors: u64,
}

/// Everything a frame touches. Owned by the loop, shared with the end handler.
pub struct FrameState<Sp, R> {
    pub scene: Scene,
    pub tracked: ObjectId,
    pub camera: PerspectiveCamera,
    pub renderer: R,
    pub space: Sp,
    phase: LoopPhase,
    stats: FrameStats,
    last_time: Option<f64>,
    detached: Option<SceneNode>,
    detach_count: u32,
}

impl<Sp, R: SceneRenderer> FrameState<Sp, R> {
    pub fn new(
        scene: Scene,
        tracked: ObjectId,
        camera: PerspectiveCamera,
        renderer: R,
        space: Sp,
    ) -> Self {
        Self {
            scene,
            tracked,
            camera,
            renderer,
            space,
            phase: LoopPhase::AwaitingFrame,
            stats: FrameStats::default(),
            last_time: None,
            detached: None,
            detach_count: 0,
        }
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    pub fn last_time(&self) -> Option<f64> {
        self.last_time
    }

    /// The node removed by [`FrameState::detach_model`], if it ran.
    pub fn detached(&self) -> Option<&SceneNode> {
        self.detached.as_ref()
    }

    /// How many times the tracked model actually left the scene.
    pub fn detach_count(&self) -> u32 {
        self.detach_count
    }

    /// Removes the tracked model from the scene and keeps it around.
    pub fn detach_model(&mut self) {
        if let Some(node) = self.scene.remove(self.tracked) {
            debug!("removed {} from the scene", node.name);
            self.detach_count += 1;
            self.detached = Some(node);
        }
    }

    fn render_frame(&mut self, time: f64, frame: &dyn XrFrame<Sp>) {
        self.last_time = Some(time);

        if let Some(pose) = frame.pose(&self.space, &self.space) {
            if let Some(node) = self.scene.get_mut(self.tracked) {
                node.transform.apply_pose(&pose);
                self.stats.frames_with_pose += 1;
            }
        }

        let mut views: Vec<CameraParams> = frame
            .views(&self.space)
            .into_iter()
            .map(|view| CameraParams::from_view(view.projection, view.transform, view.viewport))
            .collect();
        if views.is_empty() {
            let (width, height) = self.renderer.surface_size();
            self.camera.set_aspect(width as f32 / height.max(1) as f32);
            views.push(self.camera.params());
        }

        match self.renderer.render(&self.scene, &views) {
            Ok(()) => self.stats.frames_rendered += 1,
            Err(err) => {
                self.stats.render_errors += 1;
                if self.stats.render_errors == 1 {
                    error!("frame render failed: {err}");
                } else {
                    trace!("frame render failed again: {err}");
                }
            }
        }
    }
}

/// Animation frame loop bound to one session.
pub struct FrameLoop<S: XrSession, R> {
    session: S,
    state: Rc<RefCell<FrameState<S::Space, R>>>,
    token: SessionToken,
}

impl<S, R> FrameLoop<S, R>
where
    S: XrSession,
    R: SceneRenderer + 'static,
{
    pub fn new(session: S, state: FrameState<S::Space, R>) -> Self {
        Self {
            session,
            state: Rc::new(RefCell::new(state)),
            token: SessionToken::new(),
        }
    }

    pub fn token(&self) -> SessionToken {
        self.token.clone()
    }

    pub fn state(&self) -> Rc<RefCell<FrameState<S::Space, R>>> {
        Rc::clone(&self.state)
    }

    /// Handler to register with [`XrSession::on_end`]: cancels the loop,
    /// detaches the model, then runs `then`.
    pub fn end_handler(&self, then: impl FnOnce() + 'static) -> Box<dyn FnOnce()> {
        let token = self.token.clone();
        let state = Rc::clone(&self.state);
        Box::new(move || {
            token.cancel();
            {
                let mut state = state.borrow_mut();
                state.phase = LoopPhase::Stopped;
                state.detach_model();
            }
            then();
        })
    }

    /// Requests the first frame.
    pub fn start(&self) {
        Self::arm(&self.session, Rc::clone(&self.state), self.token.clone());
    }

    fn arm(session: &S, state: Rc<RefCell<FrameState<S::Space, R>>>, token: SessionToken) {
        if token.is_cancelled() || session.has_ended() {
            state.borrow_mut().phase = LoopPhase::Stopped;
            return;
        }

        let next_session = session.clone();
        session.request_animation_frame(Box::new(move |time, frame| {
            if Self::tick(&state, &token, time, frame) {
                Self::arm(&next_session, state, token);
            }
        }));
    }

    fn tick(
        state: &RefCell<FrameState<S::Space, R>>,
        token: &SessionToken,
        time: f64,
        frame: &dyn XrFrame<S::Space>,
    ) -> bool {
        let mut state = state.borrow_mut();
        if token.is_cancelled() {
            state.phase = LoopPhase::Stopped;
            state.stats.frames_skipped += 1;
            return false;
        }
        state.phase = LoopPhase::Rendering;
        state.render_frame(time, frame);
        state.phase = LoopPhase::AwaitingFrame;
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::executor::block_on;
    use glam::{Quat, Vec3};

    use super::*;
    use crate::config::CameraConfig;
    use crate::model::ModelMesh;
    use crate::pose::Pose;
    use crate::render::HeadlessRenderer;
    use crate::scene::Transform;
    use crate::xr::sim::{sequence_script, SimulatedRuntime, SimulatedSession};
    use crate::xr::{ReferenceSpaceKind, SessionMode, XrRuntime};

    fn start_loop(
        runtime: &SimulatedRuntime,
        renderer: HeadlessRenderer,
    ) -> (FrameLoop<SimulatedSession, HeadlessRenderer>, ObjectId) {
        let session = block_on(runtime.request_session(SessionMode::ImmersiveAr)).unwrap();
        let space = block_on(session.request_reference_space(ReferenceSpaceKind::Local)).unwrap();
        let mut scene = Scene::new();
        let tracked = scene.add(
            "product",
            Arc::new(ModelMesh::unit_cube()),
            Transform::from_position(Vec3::new(0.0, 0.0, -2.0)),
        );
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 1.0);
        let state = FrameState::new(scene, tracked, camera, renderer, space);
        let frame_loop = FrameLoop::new(session.clone(), state);
        session.on_end(frame_loop.end_handler(|| {}));
        frame_loop.start();
        (frame_loop, tracked)
    }

    #[test]
    fn pose_is_copied_onto_tracked_model() {
        let pose = Pose::from_components([1.0, 2.0, 3.0], [0.0, 0.0, 0.0, 1.0]);
        let runtime = SimulatedRuntime::builder()
            .pose_script(sequence_script(vec![Some(pose)]))
            .build();
        let (frame_loop, tracked) = start_loop(&runtime, HeadlessRenderer::new(640, 480));

        assert!(runtime.pump_frame());

        let state = frame_loop.state();
        let state = state.borrow();
        let node = state.scene.get(tracked).unwrap();
        assert_eq!(node.transform.position, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(node.transform.orientation, Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
        assert_eq!(state.phase(), LoopPhase::AwaitingFrame);
        assert_eq!(state.last_time(), Some(0.0));
    }

    #[test]
    fn missing_pose_keeps_transform_and_still_renders() {
        let pose = Pose::new(Vec3::new(0.5, 0.0, -1.0), Quat::from_rotation_y(0.3));
        let runtime = SimulatedRuntime::builder()
            .pose_script(sequence_script(vec![Some(pose), None]))
            .build();
        let renderer = HeadlessRenderer::new(640, 480);
        let log = renderer.log();
        let (frame_loop, tracked) = start_loop(&runtime, renderer);

        assert!(runtime.pump_frame());
        assert!(runtime.pump_frame());

        assert_eq!(log.len(), 2);
        let state = frame_loop.state();
        let state = state.borrow();
        assert_eq!(state.scene.get(tracked).unwrap().transform.position, pose.position);
        assert_eq!(state.stats().frames_with_pose, 1);
        assert_eq!(state.stats().frames_rendered, 2);
    }

    #[test]
    fn each_frame_rearms_exactly_once() {
        let runtime = SimulatedRuntime::new();
        let (_frame_loop, _) = start_loop(&runtime, HeadlessRenderer::new(640, 480));
        for expected in 1..=5 {
            assert_eq!(runtime.frame_requests(), expected);
            assert_eq!(runtime.pending_frames(), 1);
            runtime.pump_frame();
        }
    }

    #[test]
    fn render_errors_do_not_stop_the_loop() {
        let runtime = SimulatedRuntime::new();
        let (frame_loop, _) =
            start_loop(&runtime, HeadlessRenderer::new(640, 480).failing("context lost"));
        runtime.pump_frame();
        runtime.pump_frame();
        let stats = frame_loop.state().borrow().stats();
        assert_eq!(stats.render_errors, 2);
        assert_eq!(stats.frames_rendered, 0);
        assert_eq!(runtime.pending_frames(), 1);
    }

    #[test]
    fn session_end_releases_the_armed_callback() {
        let runtime = SimulatedRuntime::new();
        let (frame_loop, _) = start_loop(&runtime, HeadlessRenderer::new(640, 480));
        runtime.pump_frame();

        let state = frame_loop.state();
        // Loop, end handler, armed callback and this clone.
        assert_eq!(Rc::strong_count(&state), 4);
        assert!(runtime.end_session());
        assert_eq!(Rc::strong_count(&state), 2);
        assert_eq!(runtime.pending_frames(), 0);
    }

    #[test]
    fn frame_in_flight_after_cleanup_is_skipped() {
        let runtime = SimulatedRuntime::new();
        let session = block_on(runtime.request_session(SessionMode::ImmersiveAr)).unwrap();
        let space = block_on(session.request_reference_space(ReferenceSpaceKind::Local)).unwrap();
        let mut scene = Scene::new();
        let tracked = scene.add("product", Arc::new(ModelMesh::unit_cube()), Transform::default());
        let renderer = HeadlessRenderer::new(64, 64);
        let log = renderer.log();
        let camera = PerspectiveCamera::new(&CameraConfig::default(), 1.0);
        let frame_loop = FrameLoop::new(
            session.clone(),
            FrameState::new(scene, tracked, camera, renderer, space),
        );
        frame_loop.start();

        // Cleanup ran but the host still delivers the already queued frame.
        frame_loop.end_handler(|| {})();
        assert!(runtime.pump_frame());

        assert!(log.is_empty());
        assert!(frame_loop.token().is_cancelled());
        let state = frame_loop.state();
        assert_eq!(state.borrow().phase(), LoopPhase::Stopped);
        assert_eq!(state.borrow().stats().frames_skipped, 1);
        assert!(!state.borrow().scene.contains(tracked));
        assert_eq!(runtime.pending_frames(), 0);
        assert_eq!(runtime.frame_requests(), 1);
    }
}
