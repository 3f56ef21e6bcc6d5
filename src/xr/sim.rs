//! In-process XR runtime.
//!
//! Frames are only delivered when [`SimulatedRuntime::pump_frame`] is called,
//! and the pose reported for each frame comes from a script, so a whole AR
//! session can be replayed deterministically on the desktop.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::{Quat, Vec3};
use log::{debug, trace};

use super::{
    FrameCallback, FrameHandle, ReferenceSpaceKind, SessionMode, XrError, XrFrame, XrRuntime,
    XrSession, XrViewInfo,
};
use crate::pose::Pose;

/// Produces the tracked pose for a frame from its index and timestamp (ms).
pub type PoseScript = Box<dyn FnMut(u64, f64) -> Option<Pose>>;

/// Nominal frame spacing used for simulated timestamps.
pub const FRAME_INTERVAL_MS: f64 = 1000.0 / 60.0;

/// Pose script that slowly circles the origin at `radius`, facing the centre.
pub fn orbit_script(radius: f32, period_ms: f64) -> PoseScript {
    Box::new(move |_, time| {
        let angle = ((time / period_ms) * std::f64::consts::TAU) as f32;
        let position = Vec3::new(angle.sin() * radius, 0.0, -angle.cos() * radius);
        Some(Pose::new(position, Quat::from_rotation_y(-angle)))
    })
}

/// Pose script that replays a fixed list, then keeps reporting the last entry.
pub fn sequence_script(poses: Vec<Option<Pose>>) -> PoseScript {
    Box::new(move |index, _| {
        let index = (index as usize).min(poses.len().saturating_sub(1));
        poses.get(index).copied().flatten()
    })
}

/// Reference space handed out by the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedSpace {
    pub kind: ReferenceSpaceKind,
}

struct RuntimeState {
    supported: bool,
    support_query_error: Option<String>,
    session_error: Option<String>,
    reference_space_error: Option<String>,
    views: Vec<XrViewInfo>,
    pose_script: RefCell<PoseScript>,
    session_requests: Cell<u32>,
    frame_requests: Cell<u32>,
    frames_delivered: Cell<u64>,
    current: RefCell<Option<SimulatedSession>>,
}

/// Simulated `navigator.xr`.
#[derive(Clone)]
pub struct SimulatedRuntime {
    state: Rc<RuntimeState>,
}

impl SimulatedRuntime {
    /// Runtime that supports immersive AR and reports no pose until a script
    /// is installed.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> SimulatedRuntimeBuilder {
        SimulatedRuntimeBuilder::default()
    }

    /// Delivers one frame to every pending animation frame callback of the
    /// current session. Returns `false` when nothing was waiting.
    pub fn pump_frame(&self) -> bool {
        let Some(session) = self.current_session() else {
            return false;
        };
        if session.has_ended() {
            return false;
        }
        let callbacks = session.inner.pending.take();
        if callbacks.is_empty() {
            return false;
        }

        let index = self.state.frames_delivered.get();
        let time = index as f64 * FRAME_INTERVAL_MS;
        let pose = {
            let mut script = self.state.pose_script.borrow_mut();
            (*script)(index, time)
        };
        self.state.frames_delivered.set(index + 1);

        let frame = SimulatedFrame {
            pose,
            views: &self.state.views,
        };
        trace!("delivering frame {index} to {} callback(s)", callbacks.len());
        for (_, callback) in callbacks {
            callback(time, &frame);
        }
        true
    }

    /// Ends the current session from the device side, as when the user
    /// leaves AR through the system UI.
    pub fn end_session(&self) -> bool {
        match self.current_session() {
            Some(session) if !session.has_ended() => {
                session.finish();
                true
            }
            _ => false,
        }
    }

    pub fn current_session(&self) -> Option<SimulatedSession> {
        self.state.current.borrow().clone()
    }

    pub fn session_active(&self) -> bool {
        self.current_session()
            .map(|session| !session.has_ended())
            .unwrap_or(false)
    }

    pub fn session_requests(&self) -> u32 {
        self.state.session_requests.get()
    }

    pub fn frame_requests(&self) -> u32 {
        self.state.frame_requests.get()
    }

    pub fn frames_delivered(&self) -> u64 {
        self.state.frames_delivered.get()
    }

    pub fn pending_frames(&self) -> usize {
        self.current_session()
            .map(|session| session.inner.pending.borrow().len())
            .unwrap_or(0)
    }
}

impl Default for SimulatedRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl XrRuntime for SimulatedRuntime {
    type Session = SimulatedSession;

    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, XrError> {
        if let Some(message) = &self.state.support_query_error {
            return Err(XrError::Host(message.clone()));
        }
        Ok(self.state.supported && mode != SessionMode::ImmersiveVr)
    }

    async fn request_session(&self, mode: SessionMode) -> Result<SimulatedSession, XrError> {
        self.state
            .session_requests
            .set(self.state.session_requests.get() + 1);
        if let Some(message) = &self.state.session_error {
            return Err(XrError::SessionRejected(message.clone()));
        }
        if !self.state.supported {
            return Err(XrError::SessionRejected(format!(
                "{} is not supported",
                mode.as_str()
            )));
        }
        if self.session_active() {
            return Err(XrError::SessionRejected(
                "an immersive session is already active".to_string(),
            ));
        }

        let session = SimulatedSession {
            inner: Rc::new(SessionState::default()),
            runtime: Rc::clone(&self.state),
        };
        debug!("simulated {} session started", mode.as_str());
        *self.state.current.borrow_mut() = Some(session.clone());
        Ok(session)
    }
}

/// Builder for [`SimulatedRuntime`].
pub struct SimulatedRuntimeBuilder {
    supported: bool,
    support_query_error: Option<String>,
    session_error: Option<String>,
    reference_space_error: Option<String>,
    views: Vec<XrViewInfo>,
    pose_script: PoseScript,
}

impl Default for SimulatedRuntimeBuilder {
    fn default() -> Self {
        Self {
            supported: true,
            support_query_error: None,
            session_error: None,
            reference_space_error: None,
            views: Vec::new(),
            pose_script: Box::new(|_, _| None),
        }
    }
}

impl SimulatedRuntimeBuilder {
    pub fn supported(mut self, supported: bool) -> Self {
        self.supported = supported;
        self
    }

    pub fn fail_support_query(mut self, message: impl Into<String>) -> Self {
        self.support_query_error = Some(message.into());
        self
    }

    pub fn reject_sessions(mut self, message: impl Into<String>) -> Self {
        self.session_error = Some(message.into());
        self
    }

    pub fn reject_reference_spaces(mut self, message: impl Into<String>) -> Self {
        self.reference_space_error = Some(message.into());
        self
    }

    pub fn views(mut self, views: Vec<XrViewInfo>) -> Self {
        self.views = views;
        self
    }

    pub fn pose_script(mut self, script: PoseScript) -> Self {
        self.pose_script = script;
        self
    }

    pub fn build(self) -> SimulatedRuntime {
        SimulatedRuntime {
            state: Rc::new(RuntimeState {
                supported: self.supported,
                support_query_error: self.support_query_error,
                session_error: self.session_error,
                reference_space_error: self.reference_space_error,
                views: self.views,
                pose_script: RefCell::new(self.pose_script),
                session_requests: Cell::new(0),
                frame_requests: Cell::new(0),
                frames_delivered: Cell::new(0),
                current: RefCell::new(None),
            }),
        }
    }
}

#[derive(Default)]
struct SessionState {
    ended: Cell<bool>,
    next_handle: Cell<u32>,
    pending: RefCell<Vec<(FrameHandle, FrameCallback<SimulatedSpace>)>>,
    end_handlers: RefCell<Vec<Box<dyn FnOnce()>>>,
}

/// Session created by [`SimulatedRuntime`].
#[derive(Clone)]
pub struct SimulatedSession {
    inner: Rc<SessionState>,
    runtime: Rc<RuntimeState>,
}

impl SimulatedSession {
    fn finish(&self) {
        if self.inner.ended.replace(true) {
            return;
        }
        self.inner.pending.borrow_mut().clear();
        let handlers = self.inner.end_handlers.take();
        debug!("simulated session ended, running {} handler(s)", handlers.len());
        for handler in handlers {
            handler();
        }
    }
}

impl XrSession for SimulatedSession {
    type Space = SimulatedSpace;

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceKind,
    ) -> Result<SimulatedSpace, XrError> {
        if let Some(message) = &self.runtime.reference_space_error {
            return Err(XrError::ReferenceSpaceRejected(message.clone()));
        }
        if self.has_ended() {
            return Err(XrError::SessionEnded);
        }
        Ok(SimulatedSpace { kind })
    }

    fn request_animation_frame(&self, callback: FrameCallback<SimulatedSpace>) -> FrameHandle {
        let handle = FrameHandle(self.inner.next_handle.get() + 1);
        self.inner.next_handle.set(handle.0);
        self.runtime
            .frame_requests
            .set(self.runtime.frame_requests.get() + 1);
        if !self.has_ended() {
            self.inner.pending.borrow_mut().push((handle, callback));
        }
        handle
    }

    fn on_end(&self, handler: Box<dyn FnOnce()>) {
        if self.has_ended() {
            return;
        }
        self.inner.end_handlers.borrow_mut().push(handler);
    }

    async fn end(&self) -> Result<(), XrError> {
        if self.has_ended() {
            return Err(XrError::SessionEnded);
        }
        self.finish();
        Ok(())
    }

    fn has_ended(&self) -> bool {
        self.inner.ended.get()
    }
}

struct SimulatedFrame<'a> {
    pose: Option<Pose>,
    views: &'a [XrViewInfo],
}

impl XrFrame<SimulatedSpace> for SimulatedFrame<'_> {
    fn pose(&self, _space: &SimulatedSpace, _base: &SimulatedSpace) -> Option<Pose> {
        self.pose
    }

    fn views(&self, _space: &SimulatedSpace) -> Vec<XrViewInfo> {
        self.views.to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn frames_are_only_delivered_when_pumped() {
        let runtime = SimulatedRuntime::new();
        let session = block_on(runtime.request_session(SessionMode::ImmersiveAr)).unwrap();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        session.request_animation_frame(Box::new(move |_, _| counter.set(counter.get() + 1)));
        assert_eq!(seen.get(), 0);
        assert!(runtime.pump_frame());
        assert_eq!(seen.get(), 1);
        assert!(!runtime.pump_frame());
    }

    #[test]
    fn end_handlers_run_once_and_drop_pending_frames() {
        let runtime = SimulatedRuntime::new();
        let session = block_on(runtime.request_session(SessionMode::ImmersiveAr)).unwrap();
        let ended = Rc::new(Cell::new(0));
        let counter = Rc::clone(&ended);
        session.on_end(Box::new(move || counter.set(counter.get() + 1)));
        session.request_animation_frame(Box::new(|_, _| panic!("frame after end")));

        assert!(runtime.end_session());
        assert!(!runtime.end_session());
        assert!(block_on(session.end()).is_err());
        assert_eq!(ended.get(), 1);
        assert!(!runtime.pump_frame());
    }

    #[test]
    fn second_session_is_rejected_while_first_is_active() {
        let runtime = SimulatedRuntime::new();
        let first = block_on(runtime.request_session(SessionMode::ImmersiveAr)).unwrap();
        assert!(block_on(runtime.request_session(SessionMode::ImmersiveAr)).is_err());
        block_on(first.end()).unwrap();
        assert!(block_on(runtime.request_session(SessionMode::ImmersiveAr)).is_ok());
    }

    #[test]
    fn sequence_script_holds_last_pose() {
        let last = Pose::new(Vec3::X, Quat::IDENTITY);
        let mut script = sequence_script(vec![None, Some(last)]);
        assert_eq!(script(0, 0.0), None);
        assert_eq!(script(1, 16.0), Some(last));
        assert_eq!(script(7, 116.0), Some(last));
    }
}
