use crate::camera::CameraParams;
use crate::error::RenderError;
use crate::scene::Scene;
use crate::xr::XrSession;

pub mod headless;
#[cfg(not(target_arch = "wasm32"))]
pub mod native;
#[cfg(target_arch = "wasm32")]
pub mod wasm;

mod shared;

pub use headless::{FrameRecord, HeadlessRenderer, HeadlessSurfaces, RenderLog};

/// Draws a scene snapshot. Implemented once per backend.
pub trait SceneRenderer {
    /// Draws every node of `scene` once per entry of `views`.
    fn render(&mut self, scene: &Scene, views: &[CameraParams]) -> Result<(), RenderError>;

    /// Size of the drawing surface, used for the fallback camera aspect.
    fn surface_size(&self) -> (u32, u32);
}

impl<R: SceneRenderer + ?Sized> SceneRenderer for Box<R> {
    fn render(&mut self, scene: &Scene, views: &[CameraParams]) -> Result<(), RenderError> {
        (**self).render(scene, views)
    }

    fn surface_size(&self) -> (u32, u32) {
        (**self).surface_size()
    }
}

/// Creates the renderer for a freshly granted session: an XR compatible
/// surface attached to the page (or window) and bound to the session.
#[allow(async_fn_in_trait)]
pub trait SurfaceFactory<S: XrSession> {
    type Renderer: SceneRenderer + 'static;

    async fn create(&self, session: &S) -> Result<Self::Renderer, RenderError>;
}
