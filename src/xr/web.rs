//! `navigator.xr` bound through `web-sys`. Needs `--cfg=web_sys_unstable_apis`.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use glam::Mat4;
use gloo_events::EventListener;
use js_sys::Reflect;
use log::{debug, info};
use wasm_bindgen::closure::Closure;
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{
    window, DomPointReadOnly, XrReferenceSpace, XrReferenceSpaceType, XrSessionMode, XrSystem,
    XrView,
};

use super::{
    FrameCallback, FrameHandle, ReferenceSpaceKind, SessionMode, XrFrame, XrRuntime, XrSession,
    XrViewInfo,
};
use crate::camera::Viewport;
use crate::error::XrError;
use crate::pose::Pose;

/// The browser's XR device API.
#[derive(Clone)]
pub struct WebXrRuntime {
    system: XrSystem,
}

impl WebXrRuntime {
    /// Returns `None` when the page has no `navigator.xr`.
    pub fn detect() -> Option<Self> {
        let navigator = window()?.navigator();
        let xr = Reflect::get(&navigator, &JsValue::from_str("xr")).ok()?;
        if xr.is_undefined() || xr.is_null() {
            return None;
        }
        Some(Self {
            system: xr.unchecked_into(),
        })
    }
}

impl XrRuntime for WebXrRuntime {
    type Session = WebSession;

    async fn is_session_supported(&self, mode: SessionMode) -> Result<bool, XrError> {
        let supported = JsFuture::from(self.system.is_session_supported(session_mode(mode)))
            .await
            .map_err(|err| XrError::Host(describe(&err)))?;
        Ok(supported.as_bool().unwrap_or(false))
    }

    async fn request_session(&self, mode: SessionMode) -> Result<WebSession, XrError> {
        let session = JsFuture::from(self.system.request_session(session_mode(mode)))
            .await
            .map_err(|err| XrError::SessionRejected(describe(&err)))?
            .dyn_into::<web_sys::XrSession>()
            .map_err(|_| XrError::Host("requestSession did not return an XRSession".into()))?;
        info!("{} session granted by the browser", mode.as_str());
        Ok(WebSession::wrap(session))
    }
}

/// Handle to a live `XRSession`. Clones share the session and its listeners.
#[derive(Clone)]
pub struct WebSession {
    inner: Rc<SessionInner>,
}

type FrameClosure = Closure<dyn FnMut(f64, web_sys::XrFrame)>;

/// The armed animation frame callback. The browser never invokes a callback
/// that is still pending when the session ends, so it is owned here and
/// dropped on end instead of being leaked to JS.
#[derive(Default)]
struct PendingFrame {
    slot: RefCell<Option<(u32, FrameClosure)>>,
}

impl PendingFrame {
    fn arm(&self, handle: u32, closure: FrameClosure) {
        *self.slot.borrow_mut() = Some((handle, closure));
    }

    fn take(&self) -> Option<(u32, FrameClosure)> {
        self.slot.borrow_mut().take()
    }

    fn release(&self, session: &web_sys::XrSession) {
        if let Some((handle, _closure)) = self.take() {
            debug!("cancelling pending animation frame {handle}");
            session.cancel_animation_frame(handle);
        }
    }
}

struct SessionInner {
    session: web_sys::XrSession,
    ended: Rc<Cell<bool>>,
    pending: Rc<PendingFrame>,
    listeners: RefCell<Vec<EventListener>>,
}

impl WebSession {
    fn wrap(session: web_sys::XrSession) -> Self {
        let ended = Rc::new(Cell::new(false));
        let pending = Rc::new(PendingFrame::default());
        let watcher = {
            let flag = Rc::clone(&ended);
            let pending = Rc::clone(&pending);
            let target = session.clone();
            EventListener::once(&session, "end", move |_| {
                debug!("XRSession end event");
                flag.set(true);
                pending.release(&target);
            })
        };
        Self {
            inner: Rc::new(SessionInner {
                session,
                ended,
                pending,
                listeners: RefCell::new(vec![watcher]),
            }),
        }
    }

    pub fn raw(&self) -> &web_sys::XrSession {
        &self.inner.session
    }
}

impl XrSession for WebSession {
    type Space = XrReferenceSpace;

    async fn request_reference_space(
        &self,
        kind: ReferenceSpaceKind,
    ) -> Result<XrReferenceSpace, XrError> {
        JsFuture::from(
            self.inner
                .session
                .request_reference_space(reference_space_type(kind)),
        )
        .await
        .map_err(|err| XrError::ReferenceSpaceRejected(describe(&err)))?
        .dyn_into::<XrReferenceSpace>()
        .map_err(|_| XrError::Host("requestReferenceSpace did not return a space".into()))
    }

    fn request_animation_frame(&self, callback: FrameCallback<XrReferenceSpace>) -> FrameHandle {
        let pending = Rc::clone(&self.inner.pending);
        let mut callback = Some(callback);
        let closure = FrameClosure::new(move |time: f64, frame: web_sys::XrFrame| {
            // Held until this call returns; re-arming fills the slot again.
            let _current = pending.take();
            if let Some(callback) = callback.take() {
                callback(time, &WebFrame { frame });
            }
        });
        let handle = self
            .inner
            .session
            .request_animation_frame(closure.as_ref().unchecked_ref());
        self.inner.pending.arm(handle, closure);
        FrameHandle(handle)
    }

    fn on_end(&self, handler: Box<dyn FnOnce()>) {
        let listener = EventListener::once(&self.inner.session, "end", move |_| handler());
        self.inner.listeners.borrow_mut().push(listener);
    }

    async fn end(&self) -> Result<(), XrError> {
        if self.has_ended() {
            return Err(XrError::SessionEnded);
        }
        JsFuture::from(self.inner.session.end())
            .await
            .map_err(|err| XrError::Host(describe(&err)))?;
        self.inner.ended.set(true);
        self.inner.pending.release(&self.inner.session);
        Ok(())
    }

    fn has_ended(&self) -> bool {
        self.inner.ended.get()
    }
}

struct WebFrame {
    frame: web_sys::XrFrame,
}

impl XrFrame<XrReferenceSpace> for WebFrame {
    fn pose(&self, space: &XrReferenceSpace, base: &XrReferenceSpace) -> Option<Pose> {
        let pose = self.frame.get_pose(space, base)?;
        let transform = pose.transform();
        Some(pose_from_points(&transform.position(), &transform.orientation()))
    }

    fn views(&self, space: &XrReferenceSpace) -> Vec<XrViewInfo> {
        let Some(viewer) = self.frame.get_viewer_pose(space) else {
            return Vec::new();
        };
        let layer = self.frame.session().render_state().base_layer();
        viewer
            .views()
            .iter()
            .filter_map(|value| value.dyn_into::<XrView>().ok())
            .filter_map(|view| {
                let projection = view.projection_matrix();
                let transform = view.transform().matrix();
                if projection.len() != 16 || transform.len() != 16 {
                    return None;
                }
                let viewport = layer
                    .as_ref()
                    .and_then(|layer| layer.get_viewport(&view))
                    .map(|vp| Viewport {
                        x: vp.x(),
                        y: vp.y(),
                        width: vp.width().max(0) as u32,
                        height: vp.height().max(0) as u32,
                    });
                Some(XrViewInfo {
                    projection: Mat4::from_cols_slice(&projection),
                    transform: Mat4::from_cols_slice(&transform),
                    viewport,
                })
            })
            .collect()
    }
}

fn pose_from_points(position: &DomPointReadOnly, orientation: &DomPointReadOnly) -> Pose {
    Pose::from_components(
        [position.x() as f32, position.y() as f32, position.z() as f32],
        [
            orientation.x() as f32,
            orientation.y() as f32,
            orientation.z() as f32,
            orientation.w() as f32,
        ],
    )
}

fn session_mode(mode: SessionMode) -> XrSessionMode {
    match mode {
        SessionMode::ImmersiveAr => XrSessionMode::ImmersiveAr,
        SessionMode::ImmersiveVr => XrSessionMode::ImmersiveVr,
        SessionMode::Inline => XrSessionMode::Inline,
    }
}

fn reference_space_type(kind: ReferenceSpaceKind) -> XrReferenceSpaceType {
    match kind {
        ReferenceSpaceKind::Viewer => XrReferenceSpaceType::Viewer,
        ReferenceSpaceKind::Local => XrReferenceSpaceType::Local,
        ReferenceSpaceKind::LocalFloor => XrReferenceSpaceType::LocalFloor,
        ReferenceSpaceKind::BoundedFloor => XrReferenceSpaceType::BoundedFloor,
        ReferenceSpaceKind::Unbounded => XrReferenceSpaceType::Unbounded,
    }
}

/// Best-effort text for a rejected promise.
pub(crate) fn describe(value: &JsValue) -> String {
    if let Some(text) = value.as_string() {
        return text;
    }
    if let Some(error) = value.dyn_ref::<js_sys::Error>() {
        return String::from(error.message());
    }
    format!("{value:?}")
}
