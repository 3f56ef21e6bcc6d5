use std::any::Any;
use std::cell::RefCell;
use std::env;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use log::{info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, EventLoop};
use winit::window::{Window, WindowId};

use ar_viewer::camera::ViewportSize;
use ar_viewer::render::native::WindowSurfaces;
use ar_viewer::xr::sim::orbit_script;
use ar_viewer::{
    ArViewer, FsModelLoader, HeadlessSurfaces, ModelLoader, SessionSummary, SimulatedRuntime,
    StartControl, StartOutcome, SurfaceFactory, UserNotifier, ViewerConfig,
};

const DEFAULT_FRAMES: u64 = 120;
const PREVIEW_SIZE: (u32, u32) = (1280, 720);
const ORBIT_RADIUS: f32 = 0.5;
const ORBIT_PERIOD_MS: f64 = 4000.0;

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err:?}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = CliOptions::parse()?;
    let mut config = match &options.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config {}", path.display()))?;
            ViewerConfig::from_json(&json)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ViewerConfig::default(),
    };

    let file_name = options
        .model
        .file_name()
        .ok_or_else(|| anyhow!("{} is not a file", options.model.display()))?;
    config.model = file_name.to_string_lossy().into_owned();
    let base = options
        .model
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    let loader = FsModelLoader::new(base);

    if options.headless {
        return run_headless(&options, config, loader);
    }

    match run_preview(&options, config.clone(), loader.clone()) {
        Ok(()) => Ok(()),
        Err(err) => {
            if err.downcast_ref::<WindowInitError>().is_some() {
                eprintln!(
                    "{err}. Falling back to --headless mode (set DISPLAY or install X11 libs to enable the preview window)."
                );
                run_headless(&options, config, loader)
            } else {
                Err(err)
            }
        }
    }
}

fn simulated_runtime(options: &CliOptions) -> SimulatedRuntime {
    SimulatedRuntime::builder()
        .supported(!options.unsupported)
        .pose_script(orbit_script(ORBIT_RADIUS, ORBIT_PERIOD_MS))
        .build()
}

type OutcomeSlot = Rc<RefCell<Option<StartOutcome>>>;

/// Spawns the equivalent of a press on the start control.
fn spawn_start<L, F>(
    pool: &LocalPool,
    viewer: &Rc<ArViewer<SimulatedRuntime, L, F>>,
) -> Result<OutcomeSlot>
where
    L: ModelLoader + 'static,
    F: SurfaceFactory<ar_viewer::SimulatedSession> + 'static,
{
    let slot: OutcomeSlot = Rc::new(RefCell::new(None));
    let viewer = Rc::clone(viewer);
    let result = Rc::clone(&slot);
    pool.spawner()
        .spawn_local(async move {
            let outcome = viewer.start(&ConsoleControl, &ConsoleNotifier).await;
            *result.borrow_mut() = Some(outcome);
        })
        .map_err(|err| anyhow!("failed to spawn session task: {err}"))?;
    Ok(slot)
}

fn run_headless(options: &CliOptions, config: ViewerConfig, loader: FsModelLoader) -> Result<()> {
    let (width, height) = PREVIEW_SIZE;
    let viewer = Rc::new(ArViewer::new(
        Some(simulated_runtime(options)),
        loader,
        HeadlessSurfaces::new(width, height),
        config,
    ));
    let runtime = viewer
        .runtime()
        .cloned()
        .ok_or_else(|| anyhow!("simulated runtime missing"))?;

    let mut pool = LocalPool::new();
    let outcome = spawn_start(&pool, &viewer)?;
    pool.run_until_stalled();

    let frames = options.frames.unwrap_or(DEFAULT_FRAMES);
    let mut delivered = 0;
    while delivered < frames && runtime.pump_frame() {
        delivered += 1;
        pool.run_until_stalled();
    }
    if runtime.end_session() {
        info!("ended simulated session after {delivered} frames");
    }
    pool.run();

    let outcome = outcome.take();
    report(outcome)
}

fn report(outcome: Option<StartOutcome>) -> Result<()> {
    match outcome {
        Some(StartOutcome::Completed(summary)) => {
            print_summary(&summary);
            Ok(())
        }
        Some(StartOutcome::Unsupported) | Some(StartOutcome::AlreadyActive) => Ok(()),
        Some(StartOutcome::Failed(err)) => {
            Err(anyhow::Error::new(err).context("AR session failed to start"))
        }
        None => Err(anyhow!("session task did not finish")),
    }
}

fn print_summary(summary: &SessionSummary) {
    if let Some(node) = &summary.removed_model {
        println!(
            "Loaded model {} ({} primitives, {} triangles)",
            node.name,
            node.mesh.primitives.len(),
            node.mesh.triangle_count()
        );
    }
    println!(
        "Session ended after {} frames ({} with pose)",
        summary.stats.frames_rendered, summary.stats.frames_with_pose
    );
    if let Some(transform) = summary.final_transform() {
        let p = transform.position;
        let q = transform.orientation;
        println!(
            "Final transform pos=({:.2}, {:.2}, {:.2}) rot=({:.2}, {:.2}, {:.2}, {:.2})",
            p.x, p.y, p.z, q.x, q.y, q.z, q.w
        );
    }
    if summary.removals == 1 && summary.remaining_nodes == 0 {
        println!("Model removed from scene");
    }
}

struct ConsoleControl;

impl StartControl for ConsoleControl {
    fn set_visible(&self, visible: bool) {
        if visible {
            println!("Start control visible");
        } else {
            println!("Start control hidden");
        }
    }
}

struct ConsoleNotifier;

impl UserNotifier for ConsoleNotifier {
    fn alert(&self, message: &str) {
        println!("Alert: {message}");
    }
}

fn run_preview(options: &CliOptions, config: ViewerConfig, loader: FsModelLoader) -> Result<()> {
    let default_hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let event_loop = panic::catch_unwind(AssertUnwindSafe(EventLoop::<()>::new));
    panic::set_hook(default_hook);
    let event_loop = event_loop
        .map_err(|panic| WindowInitError::from_panic("event loop", panic))?
        .map_err(|err| WindowInitError::from_error("event loop", err))?;

    let mut app = PreviewApp {
        runtime: simulated_runtime(options),
        config,
        loader,
        frame_limit: options.frames,
        state: None,
        last_error: None,
    };
    event_loop
        .run_app(&mut app)
        .context("preview event loop failed")?;

    app.shutdown();
    if let Some(err) = app.last_error {
        return Err(err);
    }
    let outcome = app.state.as_ref().and_then(|state| state.outcome.take());
    report(outcome)
}

type PreviewViewer = ArViewer<SimulatedRuntime, FsModelLoader, WindowSurfaces>;

struct PreviewApp {
    runtime: SimulatedRuntime,
    config: ViewerConfig,
    loader: FsModelLoader,
    frame_limit: Option<u64>,
    state: Option<PreviewState>,
    last_error: Option<anyhow::Error>,
}

struct PreviewState {
    window: Arc<Window>,
    viewport: Arc<ViewportSize>,
    pool: LocalPool,
    outcome: OutcomeSlot,
    frames: u64,
    _viewer: Rc<PreviewViewer>,
}

impl PreviewApp {
    fn open(&mut self, event_loop: &ActiveEventLoop) -> Result<PreviewState> {
        let (width, height) = PREVIEW_SIZE;
        let window = Arc::new(
            event_loop
                .create_window(
                    Window::default_attributes()
                        .with_title("AR Viewer (simulated session)")
                        .with_inner_size(LogicalSize::new(width as f64, height as f64)),
                )
                .map_err(|err| WindowInitError::from_error("window", err))?,
        );
        let size = window.inner_size();
        let viewport = Arc::new(ViewportSize::new(size.width, size.height));

        let viewer = Rc::new(ArViewer::new(
            Some(self.runtime.clone()),
            self.loader.clone(),
            WindowSurfaces::new(Arc::clone(&window), Arc::clone(&viewport)),
            self.config.clone(),
        ));
        let mut pool = LocalPool::new();
        let outcome = spawn_start(&pool, &viewer)?;
        pool.run_until_stalled();

        Ok(PreviewState {
            window,
            viewport,
            pool,
            outcome,
            frames: 0,
            _viewer: viewer,
        })
    }

    fn shutdown(&mut self) {
        if self.runtime.end_session() {
            info!("preview closed, session ended");
        }
        if let Some(state) = self.state.as_mut() {
            state.pool.run();
        }
    }
}

impl ApplicationHandler for PreviewApp {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }
        match self.open(event_loop) {
            Ok(state) => {
                state.window.request_redraw();
                self.state = Some(state);
            }
            Err(err) => {
                self.last_error = Some(err);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(state) = self.state.as_mut() else {
            return;
        };
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => state.viewport.update(size.width, size.height),
            WindowEvent::RedrawRequested => {
                if self.runtime.pump_frame() {
                    state.frames += 1;
                }
                state.pool.run_until_stalled();

                let limit_reached = self
                    .frame_limit
                    .is_some_and(|limit| state.frames >= limit);
                if state.outcome.borrow().is_some() || limit_reached {
                    if limit_reached {
                        info!("frame limit reached after {} frames", state.frames);
                    }
                    event_loop.exit();
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(state) = &self.state {
            state.window.request_redraw();
        }
    }
}

#[derive(Debug)]
struct WindowInitError {
    message: String,
}

impl WindowInitError {
    fn from_panic(stage: &str, panic: Box<dyn Any + Send>) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {}", panic_message(panic)),
        }
    }

    fn from_error(stage: &str, err: impl fmt::Display) -> Self {
        Self {
            message: format!("failed to initialize {stage}: {err}"),
        }
    }
}

impl fmt::Display for WindowInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for WindowInitError {}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    match panic.downcast::<String>() {
        Ok(msg) => *msg,
        Err(panic) => match panic.downcast::<&'static str>() {
            Ok(msg) => (*msg).to_string(),
            Err(_) => "unknown panic".into(),
        },
    }
}

struct CliOptions {
    model: PathBuf,
    headless: bool,
    frames: Option<u64>,
    config: Option<PathBuf>,
    unsupported: bool,
}

impl CliOptions {
    const USAGE: &'static str =
        "Usage: ar-viewer <model.glb> [--headless] [--frames N] [--config FILE] [--unsupported]";

    fn parse() -> Result<Self> {
        let mut args = env::args().skip(1);
        let Some(model) = args.next() else {
            return Err(anyhow!(Self::USAGE));
        };
        let mut options = Self {
            model: PathBuf::from(model),
            headless: false,
            frames: None,
            config: None,
            unsupported: false,
        };
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--headless" => options.headless = true,
                "--unsupported" => options.unsupported = true,
                "--frames" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--frames expects a number"))?;
                    let frames = value
                        .parse()
                        .with_context(|| format!("invalid frame count {value}"))?;
                    options.frames = Some(frames);
                }
                "--config" => {
                    let value = args
                        .next()
                        .ok_or_else(|| anyhow!("--config expects a file path"))?;
                    options.config = Some(PathBuf::from(value));
                }
                other => {
                    warn!("rejecting argument {other}");
                    return Err(anyhow!("Unknown argument: {other}. {}", Self::USAGE));
                }
            }
        }
        Ok(options)
    }
}
