//! Browser entry points exported through `wasm-bindgen`.

use std::rc::Rc;

use gloo_events::EventListener;
use log::{info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::spawn_local;
use web_sys::{window, HtmlElement};

use crate::assets::FetchModelLoader;
use crate::config::ViewerConfig;
use crate::render::wasm::WebGlSurfaces;
use crate::viewer::{check_support, ArViewer, StartControl, StartOutcome, UserNotifier};
use crate::xr::web::WebXrRuntime;
use crate::xr::SessionMode;

type WebViewer = ArViewer<WebXrRuntime, FetchModelLoader, WebGlSurfaces>;

#[wasm_bindgen(start)]
pub fn bootstrap() {
    console_error_panic_hook::set_once();
    wasm_logger::init(wasm_logger::Config::default());
}

/// Resolves to `true` when the browser can start an `immersive-ar` session.
#[wasm_bindgen(js_name = isArSupported)]
pub async fn is_ar_supported() -> bool {
    check_support(WebXrRuntime::detect().as_ref(), SessionMode::ImmersiveAr).await
}

/// Viewer bound to a start button on the page.
#[wasm_bindgen]
pub struct ArApp {
    viewer: Rc<WebViewer>,
    control: ButtonControl,
    _click: EventListener,
}

#[wasm_bindgen]
impl ArApp {
    /// `button` defaults to the element with the configured start button id;
    /// `config` is an optional JSON object overriding viewer settings.
    #[wasm_bindgen(constructor)]
    pub fn new(button: Option<HtmlElement>, config: Option<String>) -> Result<ArApp, JsValue> {
        let config = match config {
            Some(json) => ViewerConfig::from_json(&json)
                .map_err(|err| JsValue::from_str(&format!("{err:#}")))?,
            None => ViewerConfig::default(),
        };
        let button = match button {
            Some(button) => button,
            None => find_button(&config.start_button_id)?,
        };

        let runtime = WebXrRuntime::detect();
        if runtime.is_none() {
            info!("navigator.xr is not available");
        }
        let viewer = Rc::new(ArViewer::new(
            runtime,
            FetchModelLoader::default(),
            WebGlSurfaces::new(),
            config,
        ));
        let control = ButtonControl {
            element: button.clone(),
        };

        let click = {
            let viewer = Rc::clone(&viewer);
            let control = control.clone();
            EventListener::new(&button, "click", move |_| {
                spawn_start(Rc::clone(&viewer), control.clone());
            })
        };

        Ok(Self {
            viewer,
            control,
            _click: click,
        })
    }

    /// Starts a session as if the button had been pressed.
    pub fn start(&self) {
        spawn_start(Rc::clone(&self.viewer), self.control.clone());
    }

    /// Ends the running session, if any.
    pub fn end(&self) {
        let viewer = Rc::clone(&self.viewer);
        spawn_local(async move {
            if let Err(err) = viewer.end_session().await {
                warn!("failed to end AR session: {err}");
            }
        });
    }

    #[wasm_bindgen(js_name = isRunning)]
    pub fn is_running(&self) -> bool {
        self.viewer.is_running()
    }
}

fn spawn_start(viewer: Rc<WebViewer>, control: ButtonControl) {
    spawn_local(async move {
        if let StartOutcome::Completed(summary) = viewer.start(&control, &AlertNotifier).await {
            info!(
                "session over: {} frames rendered",
                summary.stats.frames_rendered
            );
        }
    });
}

fn find_button(id: &str) -> Result<HtmlElement, JsValue> {
    let document = window()
        .and_then(|window| window.document())
        .ok_or_else(|| JsValue::from_str("document not available"))?;
    document
        .get_element_by_id(id)
        .ok_or_else(|| JsValue::from_str(&format!("element #{id} not found")))?
        .dyn_into::<HtmlElement>()
        .map_err(|_| JsValue::from_str(&format!("element #{id} is not an HTML element")))
}

#[derive(Clone)]
struct ButtonControl {
    element: HtmlElement,
}

impl StartControl for ButtonControl {
    fn set_visible(&self, visible: bool) {
        let display = if visible { "block" } else { "none" };
        if let Err(err) = self.element.style().set_property("display", display) {
            warn!("failed to set start button display: {err:?}");
        }
    }
}

struct AlertNotifier;

impl UserNotifier for AlertNotifier {
    fn alert(&self, message: &str) {
        match window() {
            Some(window) => {
                if let Err(err) = window.alert_with_message(message) {
                    warn!("alert failed: {err:?}");
                }
            }
            None => warn!("{message}"),
        }
    }
}
