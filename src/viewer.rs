use std::cell::Cell;

use log::{error, info, warn};

use crate::assets::ModelLoader;
use crate::config::ViewerConfig;
use crate::error::{ViewerError, XrError};
use crate::render::SurfaceFactory;
use crate::session::{bootstrap, ActiveSession, SessionSummary};
use crate::xr::{SessionMode, XrRuntime, XrSession};

/// The button (or any widget) the user presses to enter AR.
pub trait StartControl {
    fn set_visible(&self, visible: bool);
}

/// Blocking user-facing message channel (`window.alert` in the browser).
pub trait UserNotifier {
    fn alert(&self, message: &str);
}

/// What a call to [`ArViewer::start`] ended up doing.
#[derive(Debug)]
pub enum StartOutcome {
    /// No AR support; the user was alerted and nothing else happened.
    Unsupported,
    /// A start was already in progress; the request was ignored.
    AlreadyActive,
    /// The session ran and has ended.
    Completed(SessionSummary),
    /// Setup failed; the error was logged and swallowed.
    Failed(ViewerError),
}

/// Answers whether an AR session can be requested. An absent XR API or a
/// query that fails both read as "not supported".
pub async fn check_support<Rt: XrRuntime>(runtime: Option<&Rt>, mode: SessionMode) -> bool {
    let Some(runtime) = runtime else {
        return false;
    };
    match runtime.is_session_supported(mode).await {
        Ok(supported) => supported,
        Err(err) => {
            warn!("{} support query failed: {err}", mode.as_str());
            false
        }
    }
}

/// Clears the start-in-progress flag even if the start future is dropped.
struct BusyGuard<'a>(&'a Cell<bool>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

/// Ties the XR runtime, the model source and the render surface together
/// behind a single start entry point.
pub struct ArViewer<Rt: XrRuntime, L, F> {
    runtime: Option<Rt>,
    loader: L,
    surfaces: F,
    config: ViewerConfig,
    active: ActiveSession<Rt::Session>,
    busy: Cell<bool>,
}

impl<Rt, L, F> ArViewer<Rt, L, F>
where
    Rt: XrRuntime,
    L: ModelLoader,
    F: SurfaceFactory<Rt::Session>,
{
    /// `runtime` is `None` when the host has no XR device API at all.
    pub fn new(runtime: Option<Rt>, loader: L, surfaces: F, config: ViewerConfig) -> Self {
        Self {
            runtime,
            loader,
            surfaces,
            config,
            active: ActiveSession::new(),
            busy: Cell::new(false),
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn runtime(&self) -> Option<&Rt> {
        self.runtime.as_ref()
    }

    pub async fn is_supported(&self) -> bool {
        check_support(self.runtime.as_ref(), self.config.session_mode).await
    }

    /// True while a session is running.
    pub fn is_running(&self) -> bool {
        self.active.is_active()
    }

    /// Runs one session to its end. Errors are returned, not logged.
    pub async fn bootstrap(&self) -> Result<SessionSummary, ViewerError> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or(ViewerError::SessionRequest(XrError::Unavailable))?;
        bootstrap(
            runtime,
            &self.loader,
            &self.surfaces,
            &self.config,
            &self.active,
        )
        .await
    }

    /// Handles a press of the start control: checks support, hides the
    /// control for the lifetime of the session, and shows it again once the
    /// session is over or failed to start.
    pub async fn start<C, N>(&self, control: &C, notifier: &N) -> StartOutcome
    where
        C: StartControl + ?Sized,
        N: UserNotifier + ?Sized,
    {
        if self.busy.replace(true) {
            info!("start ignored, a session is already starting or running");
            return StartOutcome::AlreadyActive;
        }
        let _busy = BusyGuard(&self.busy);
        self.start_once(control, notifier).await
    }

    async fn start_once<C, N>(&self, control: &C, notifier: &N) -> StartOutcome
    where
        C: StartControl + ?Sized,
        N: UserNotifier + ?Sized,
    {
        if !self.is_supported().await {
            notifier.alert(&self.config.unsupported_message);
            return StartOutcome::Unsupported;
        }

        control.set_visible(false);
        let outcome = match self.bootstrap().await {
            Ok(summary) => StartOutcome::Completed(summary),
            Err(err) => {
                error!("Error starting AR session: {err}");
                StartOutcome::Failed(err)
            }
        };
        control.set_visible(true);
        outcome
    }

    /// Ends the running session. Returns `false` when none was running.
    pub async fn end_session(&self) -> Result<bool, XrError> {
        match self.active.get() {
            Some(session) if !session.has_ended() => {
                session.end().await?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
