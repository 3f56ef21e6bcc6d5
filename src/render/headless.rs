use std::cell::RefCell;
use std::rc::Rc;

use crate::camera::CameraParams;
use crate::error::RenderError;
use crate::scene::{ObjectId, Scene, Transform};

use super::{SceneRenderer, SurfaceFactory};
use crate::xr::XrSession;

/// What a headless renderer saw for one submitted frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameRecord {
    pub views: usize,
    pub nodes: Vec<(ObjectId, Transform)>,
}

/// Shared, clonable log of submitted frames.
#[derive(Debug, Clone, Default)]
pub struct RenderLog {
    frames: Rc<RefCell<Vec<FrameRecord>>>,
}

impl RenderLog {
    pub fn len(&self) -> usize {
        self.frames.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.borrow().is_empty()
    }

    pub fn last(&self) -> Option<FrameRecord> {
        self.frames.borrow().last().cloned()
    }

    pub fn frames(&self) -> Vec<FrameRecord> {
        self.frames.borrow().clone()
    }

    fn push(&self, record: FrameRecord) {
        self.frames.borrow_mut().push(record);
    }
}

/// Renderer without a GPU. Records what would have been drawn.
#[derive(Debug, Clone)]
pub struct HeadlessRenderer {
    size: (u32, u32),
    log: RenderLog,
    fail_with: Option<String>,
}

impl HeadlessRenderer {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width.max(1), height.max(1)),
            log: RenderLog::default(),
            fail_with: None,
        }
    }

    /// Renderer that appends to an existing log.
    pub fn with_log(width: u32, height: u32, log: RenderLog) -> Self {
        Self {
            log,
            ..Self::new(width, height)
        }
    }

    /// Makes every draw fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn log(&self) -> RenderLog {
        self.log.clone()
    }
}

impl SceneRenderer for HeadlessRenderer {
    fn render(&mut self, scene: &Scene, views: &[CameraParams]) -> Result<(), RenderError> {
        if let Some(message) = &self.fail_with {
            return Err(RenderError::Draw(message.clone()));
        }
        self.log.push(FrameRecord {
            views: views.len(),
            nodes: scene
                .nodes()
                .iter()
                .map(|node| (node.id, node.transform))
                .collect(),
        });
        Ok(())
    }

    fn surface_size(&self) -> (u32, u32) {
        self.size
    }
}

/// Hands out [`HeadlessRenderer`]s that all write to the same [`RenderLog`].
#[derive(Debug, Clone)]
pub struct HeadlessSurfaces {
    size: (u32, u32),
    log: RenderLog,
    surface_error: Option<String>,
}

impl HeadlessSurfaces {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            size: (width, height),
            log: RenderLog::default(),
            surface_error: None,
        }
    }

    /// Makes surface creation fail with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.surface_error = Some(message.into());
        self
    }

    pub fn log(&self) -> RenderLog {
        self.log.clone()
    }
}

impl<S: XrSession> SurfaceFactory<S> for HeadlessSurfaces {
    type Renderer = HeadlessRenderer;

    async fn create(&self, _session: &S) -> Result<HeadlessRenderer, RenderError> {
        if let Some(message) = &self.surface_error {
            return Err(RenderError::Surface(message.clone()));
        }
        Ok(HeadlessRenderer::with_log(
            self.size.0,
            self.size.1,
            self.log.clone(),
        ))
    }
}
