use std::cell::RefCell;
use std::rc::Rc;

use futures::executor::{block_on, LocalPool};
use futures::task::LocalSpawnExt;
use futures::FutureExt;
use glam::{Mat4, Quat, Vec3};

use ar_viewer::xr::sim::sequence_script;
use ar_viewer::xr::XrViewInfo;
use ar_viewer::{
    check_support, ArViewer, HeadlessSurfaces, ModelMesh, Pose, SessionMode, SimulatedRuntime,
    StartControl, StartOutcome, StaticModelLoader, UserNotifier, ViewerConfig, ViewerError,
    Viewport,
};

type Viewer = ArViewer<SimulatedRuntime, StaticModelLoader, HeadlessSurfaces>;

#[derive(Clone, Default)]
struct RecordingControl {
    changes: Rc<RefCell<Vec<bool>>>,
}

impl RecordingControl {
    fn changes(&self) -> Vec<bool> {
        self.changes.borrow().clone()
    }
}

impl StartControl for RecordingControl {
    fn set_visible(&self, visible: bool) {
        self.changes.borrow_mut().push(visible);
    }
}

#[derive(Clone, Default)]
struct RecordingNotifier {
    alerts: Rc<RefCell<Vec<String>>>,
}

impl UserNotifier for RecordingNotifier {
    fn alert(&self, message: &str) {
        self.alerts.borrow_mut().push(message.to_string());
    }
}

struct Harness {
    runtime: SimulatedRuntime,
    surfaces: HeadlessSurfaces,
    viewer: Rc<Viewer>,
    control: RecordingControl,
    notifier: RecordingNotifier,
    pool: LocalPool,
    outcome: Rc<RefCell<Option<StartOutcome>>>,
}

impl Harness {
    fn new(runtime: SimulatedRuntime, loader: StaticModelLoader) -> Self {
        let surfaces = HeadlessSurfaces::new(800, 600);
        let viewer = Rc::new(ArViewer::new(
            Some(runtime.clone()),
            loader,
            surfaces.clone(),
            ViewerConfig::default(),
        ));
        Self {
            runtime,
            surfaces,
            viewer,
            control: RecordingControl::default(),
            notifier: RecordingNotifier::default(),
            pool: LocalPool::new(),
            outcome: Rc::new(RefCell::new(None)),
        }
    }

    fn with_cube(runtime: SimulatedRuntime) -> Self {
        Self::new(runtime, StaticModelLoader::new(ModelMesh::unit_cube()))
    }

    /// Presses the start control and runs until the session is waiting on
    /// the host.
    fn press_start(&mut self) {
        let viewer = Rc::clone(&self.viewer);
        let control = self.control.clone();
        let notifier = self.notifier.clone();
        let outcome = Rc::clone(&self.outcome);
        self.pool
            .spawner()
            .spawn_local(async move {
                let result = viewer.start(&control, &notifier).await;
                *outcome.borrow_mut() = Some(result);
            })
            .unwrap();
        self.pool.run_until_stalled();
    }

    fn pump(&mut self, frames: usize) {
        for _ in 0..frames {
            assert!(self.runtime.pump_frame());
            self.pool.run_until_stalled();
        }
    }

    fn finish(&mut self) -> StartOutcome {
        self.runtime.end_session();
        self.pool.run();
        self.outcome.borrow_mut().take().expect("start finished")
    }
}

#[test]
fn support_check_is_false_without_xr_api() {
    let supported = block_on(check_support::<SimulatedRuntime>(
        None,
        SessionMode::ImmersiveAr,
    ));
    assert!(!supported);
}

#[test]
fn failed_support_query_reads_as_unsupported() {
    let runtime = SimulatedRuntime::builder()
        .fail_support_query("SecurityError")
        .build();
    assert!(!block_on(check_support(
        Some(&runtime),
        SessionMode::ImmersiveAr
    )));
}

#[test]
fn unsupported_device_alerts_and_never_requests_a_session() {
    let runtime = SimulatedRuntime::builder().supported(false).build();
    let mut harness = Harness::with_cube(runtime);
    harness.press_start();

    let outcome = harness.outcome.borrow_mut().take();
    assert!(matches!(outcome, Some(StartOutcome::Unsupported)));
    assert_eq!(
        *harness.notifier.alerts.borrow(),
        vec!["WebXR AR not supported on this device.".to_string()]
    );
    assert_eq!(harness.runtime.session_requests(), 0);
    assert!(harness.control.changes().is_empty());
}

#[test]
fn start_control_hidden_only_while_session_runs() {
    let mut harness = Harness::with_cube(SimulatedRuntime::new());
    harness.press_start();
    assert_eq!(harness.control.changes(), vec![false]);
    assert!(harness.viewer.is_running());

    harness.pump(3);
    assert_eq!(harness.control.changes(), vec![false]);

    let outcome = harness.finish();
    assert!(matches!(outcome, StartOutcome::Completed(_)));
    assert_eq!(harness.control.changes(), vec![false, true]);
    assert!(!harness.viewer.is_running());
}

#[test]
fn model_is_placed_in_front_of_the_viewer() {
    let mut harness = Harness::with_cube(SimulatedRuntime::new());
    harness.press_start();
    harness.pump(1);

    // The default runtime reports no pose, so the initial placement stays.
    let frame = harness.surfaces.log().last().unwrap();
    assert_eq!(frame.nodes.len(), 1);
    assert_eq!(frame.nodes[0].1.position, Vec3::new(0.0, 0.0, -2.0));
    harness.finish();
}

#[test]
fn pose_is_copied_to_the_model_each_frame() {
    let runtime = SimulatedRuntime::builder()
        .pose_script(sequence_script(vec![Some(Pose::from_components(
            [1.0, 2.0, 3.0],
            [0.0, 0.0, 0.0, 1.0],
        ))]))
        .build();
    let mut harness = Harness::with_cube(runtime);
    harness.press_start();
    harness.pump(1);

    let frame = harness.surfaces.log().last().unwrap();
    let transform = frame.nodes[0].1;
    assert_eq!(transform.position, Vec3::new(1.0, 2.0, 3.0));
    assert_eq!(transform.orientation, Quat::from_xyzw(0.0, 0.0, 0.0, 1.0));
    harness.finish();
}

#[test]
fn frame_without_pose_still_renders() {
    let moved = Pose::new(Vec3::new(0.2, -0.1, -1.5), Quat::from_rotation_x(0.4));
    let runtime = SimulatedRuntime::builder()
        .pose_script(sequence_script(vec![Some(moved), None]))
        .build();
    let mut harness = Harness::with_cube(runtime);
    harness.press_start();
    harness.pump(2);

    let frames = harness.surfaces.log().frames();
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[1].nodes[0].1, frames[0].nodes[0].1);
    assert_eq!(frames[1].nodes[0].1.position, moved.position);

    match harness.finish() {
        StartOutcome::Completed(summary) => {
            assert_eq!(summary.stats.frames_rendered, 2);
            assert_eq!(summary.stats.frames_with_pose, 1);
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
}

#[test]
fn each_host_view_is_rendered() {
    let eye = |x: i32| XrViewInfo {
        projection: Mat4::perspective_rh_gl(1.2, 1.0, 0.1, 100.0),
        transform: Mat4::IDENTITY,
        viewport: Some(Viewport {
            x,
            y: 0,
            width: 400,
            height: 600,
        }),
    };
    let runtime = SimulatedRuntime::builder()
        .views(vec![eye(0), eye(400)])
        .build();
    let mut harness = Harness::with_cube(runtime);
    harness.press_start();
    harness.pump(2);

    assert_eq!(harness.runtime.frames_delivered(), 2);
    assert_eq!(harness.surfaces.log().last().unwrap().views, 2);
    harness.finish();
}

#[test]
fn session_end_removes_model_once_and_stops_requesting_frames() {
    let mut harness = Harness::with_cube(SimulatedRuntime::new());
    harness.press_start();
    harness.pump(4);
    let requests = harness.runtime.frame_requests();

    let summary = match harness.finish() {
        StartOutcome::Completed(summary) => summary,
        other => panic!("unexpected outcome: {other:?}"),
    };
    assert_eq!(summary.removals, 1);
    assert_eq!(summary.remaining_nodes, 0);
    assert!(summary.removed_model.is_some());

    assert!(!harness.runtime.pump_frame());
    assert_eq!(harness.runtime.frame_requests(), requests);
    assert_eq!(harness.runtime.pending_frames(), 0);
}

#[test]
fn viewer_can_end_its_own_session() {
    let mut harness = Harness::with_cube(SimulatedRuntime::new());
    harness.press_start();
    harness.pump(1);

    let ended = block_on(harness.viewer.end_session()).unwrap();
    assert!(ended);
    harness.pool.run();
    assert!(matches!(
        harness.outcome.borrow_mut().take(),
        Some(StartOutcome::Completed(_))
    ));
    assert!(!block_on(harness.viewer.end_session()).unwrap());
}

#[test]
fn model_load_failure_ends_session_and_restores_control() {
    let mut harness = Harness::new(SimulatedRuntime::new(), StaticModelLoader::missing());
    harness.press_start();

    let outcome = harness.outcome.borrow_mut().take();
    assert!(matches!(
        outcome,
        Some(StartOutcome::Failed(ViewerError::ModelLoad(_)))
    ));
    assert!(!harness.runtime.session_active());
    assert_eq!(harness.runtime.session_requests(), 1);
    assert_eq!(harness.control.changes(), vec![false, true]);
    assert!(harness.surfaces.log().is_empty());
}

#[test]
fn rejected_reference_space_ends_session_and_restores_control() {
    let runtime = SimulatedRuntime::builder()
        .reject_reference_spaces("NotSupportedError")
        .build();
    let mut harness = Harness::with_cube(runtime);
    harness.press_start();

    let outcome = harness.outcome.borrow_mut().take();
    assert!(matches!(
        outcome,
        Some(StartOutcome::Failed(ViewerError::ReferenceSpace(_)))
    ));
    assert!(!harness.runtime.session_active());
    assert_eq!(harness.runtime.frame_requests(), 0);
    assert_eq!(harness.control.changes(), vec![false, true]);
}

#[test]
fn surface_failure_ends_session_and_restores_control() {
    let runtime = SimulatedRuntime::new();
    let surfaces = HeadlessSurfaces::new(800, 600).failing("webgl2 unavailable");
    let viewer = Rc::new(ArViewer::new(
        Some(runtime.clone()),
        StaticModelLoader::new(ModelMesh::unit_cube()),
        surfaces.clone(),
        ViewerConfig::default(),
    ));
    let control = RecordingControl::default();
    let notifier = RecordingNotifier::default();

    let outcome = block_on(viewer.start(&control, &notifier));
    assert!(matches!(
        outcome,
        StartOutcome::Failed(ViewerError::Surface(_))
    ));
    assert!(!runtime.session_active());
    assert_eq!(runtime.frame_requests(), 0);
    assert_eq!(control.changes(), vec![false, true]);
    assert!(surfaces.log().is_empty());
}

#[test]
fn rejected_session_request_is_swallowed() {
    let runtime = SimulatedRuntime::builder()
        .reject_sessions("NotAllowedError")
        .build();
    let mut harness = Harness::with_cube(runtime);
    harness.press_start();

    let outcome = harness.outcome.borrow_mut().take();
    assert!(matches!(
        outcome,
        Some(StartOutcome::Failed(ViewerError::SessionRequest(_)))
    ));
    assert_eq!(harness.control.changes(), vec![false, true]);
}

#[test]
fn second_press_while_running_is_ignored() {
    let mut harness = Harness::with_cube(SimulatedRuntime::new());
    harness.press_start();

    let second = block_on(
        harness
            .viewer
            .start(&harness.control, &harness.notifier),
    );
    assert!(matches!(second, StartOutcome::AlreadyActive));
    assert_eq!(harness.runtime.session_requests(), 1);
    harness.finish();
}

#[test]
fn abandoned_start_does_not_block_later_presses() {
    let mut harness = Harness::with_cube(SimulatedRuntime::new());
    let abandoned = harness
        .viewer
        .start(&harness.control, &harness.notifier)
        .now_or_never();
    assert!(abandoned.is_none());
    assert!(harness.runtime.end_session());

    harness.press_start();
    assert!(harness.viewer.is_running());
    assert_eq!(harness.runtime.session_requests(), 2);
    assert!(matches!(harness.finish(), StartOutcome::Completed(_)));
}
