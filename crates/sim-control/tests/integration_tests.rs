//! Integration tests for simulation control
//!
//! These tests verify:
//! - Control predicates and transitions across the session lifecycle
//! - Edge-triggered GPIO reporting through the controller
//! - Console ordering across ticks and the output callback
//! - Project documents on disk and binary image import/export
//! - The async poll loop under a paused clock

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sim_control::{
    run_poll_loop, ControlError, DocumentError, LedIndicator, OutputChannel, PollCommand,
    PollExit, PollLoop, PollSummary, ProjectDocument, SimulationController, SimulationEvent,
    SimulationState,
};
use sim_package::{PackageError, VirtualFileSet};
use sim_runtime::{BuildError, DeviceRuntime, RuntimeLoader, StepOutcome};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Prints one "x" per tick, forever
    pub const TICKER: &str = "loop\n  print \"x\"\n  wait 1\nend\n";

    pub fn files(main: &str) -> VirtualFileSet {
        let mut files = VirtualFileSet::new();
        files.add("main.script", main.as_bytes().to_vec()).unwrap();
        files
    }

    pub fn built(main: &str) -> SimulationController {
        let mut ctl = SimulationController::new();
        ctl.build(files(main), "test").unwrap();
        ctl
    }

    /// Collects everything pushed to the output handler
    pub fn capture(ctl: &mut SimulationController) -> Arc<Mutex<Vec<(String, OutputChannel)>>> {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        ctl.set_output_handler(move |text, channel| {
            sink.lock().unwrap().push((text.to_string(), channel));
        });
        log
    }

    pub fn gpio_events(events: Vec<SimulationEvent>) -> Vec<sim_control::GpioSample> {
        events
            .into_iter()
            .filter_map(|e| match e {
                SimulationEvent::GpioChanged(sample) => Some(sample),
                _ => None,
            })
            .collect()
    }

    /// Runtime that replays a fixed list of GPIO register values
    pub struct Replay {
        values: Vec<u32>,
        at: usize,
    }

    impl DeviceRuntime for Replay {
        fn step(&mut self) -> StepOutcome {
            self.at += 1;
            StepOutcome::Continue
        }

        fn take_console(&mut self) -> String {
            format!("<{}>", self.at)
        }

        fn gpio_state(&self) -> u32 {
            self.values
                .get(self.at.saturating_sub(1))
                .copied()
                .unwrap_or(0)
        }
    }

    pub struct ReplayLoader(pub Vec<u32>);

    impl RuntimeLoader for ReplayLoader {
        fn load(
            &self,
            _files: &VirtualFileSet,
            _project_name: &str,
        ) -> Result<Box<dyn DeviceRuntime>, BuildError> {
            Ok(Box::new(Replay {
                values: self.0.clone(),
                at: 0,
            }))
        }
    }
}

// ============================================================================
// State Machine Tests
// ============================================================================

mod state_machine_tests {
    use super::*;

    #[test]
    fn predicates_follow_lifecycle() {
        let mut ctl = SimulationController::new();
        assert!(!ctl.can_run());

        ctl.build(helpers::files(helpers::TICKER), "p").unwrap();
        assert!(ctl.can_run());
        assert!(ctl.can_stop());
        assert!(!ctl.can_pause());

        ctl.run().unwrap();
        assert!(ctl.can_pause());
        assert!(!ctl.can_run());

        ctl.pause().unwrap();
        assert!(ctl.can_run());
        assert!(ctl.has_runtime());

        ctl.stop().unwrap();
        assert_eq!(ctl.state(), SimulationState::Idle);
        assert!(!ctl.can_stop());
        assert!(!ctl.has_runtime());
    }

    #[test]
    fn stop_from_any_state_ends_idle() {
        for steps in 0..4 {
            let mut ctl = SimulationController::new();
            if steps >= 1 {
                ctl.build(helpers::files(helpers::TICKER), "p").unwrap();
            }
            if steps >= 2 {
                ctl.run().unwrap();
            }
            if steps >= 3 {
                ctl.pause().unwrap();
            }
            let _ = ctl.stop();
            assert_eq!(ctl.state(), SimulationState::Idle);
            assert!(!ctl.can_stop());
            assert!(!ctl.has_runtime());
        }
    }

    #[test]
    fn run_twice_is_run_once() {
        let mut once = helpers::built(helpers::TICKER);
        once.run().unwrap();

        let mut twice = helpers::built(helpers::TICKER);
        twice.run().unwrap();
        assert_eq!(
            twice.run(),
            Err(ControlError::InvalidTransition {
                action: "run",
                state: SimulationState::Running
            })
        );

        assert_eq!(once.state(), twice.state());
        assert_eq!(once.build_log(), twice.build_log());
        assert_eq!(once.drain_events(), twice.drain_events());
    }

    #[test]
    fn failed_build_leaves_nothing_to_tick() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        assert!(ctl.build(helpers::files("pin 99 high\n"), "p").is_err());

        assert_eq!(ctl.state(), SimulationState::Idle);
        assert!(!ctl.has_runtime());
        assert!(ctl.tick().is_none());
        assert!(ctl.build_log().ends_with("***** 1 error\n"));
    }

    #[test]
    fn rebuild_while_running_returns_to_built() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        ctl.tick();
        ctl.build(helpers::files(helpers::TICKER), "again").unwrap();
        assert_eq!(ctl.state(), SimulationState::Built);
        assert_eq!(ctl.ticks(), 0);
        assert_eq!(ctl.console(), "");
        assert_eq!(ctl.project_name(), "again");
    }

    #[test]
    fn soft_fault_keeps_running() {
        let mut ctl = helpers::built("error \"low battery\"\nloop\n wait 1\nend\n");
        ctl.run().unwrap();
        let report = ctl.tick().unwrap();
        assert_eq!(
            report.outcome,
            StepOutcome::Fault {
                message: "low battery".into(),
                fatal: false
            }
        );
        assert_eq!(ctl.state(), SimulationState::Running);
        assert_eq!(ctl.console(), "*** Error: low battery\n");
    }

    #[test]
    fn fatal_fault_forces_idle() {
        let mut ctl = helpers::built("println \"boot\"\nabort \"watchdog\"\n");
        ctl.run().unwrap();
        ctl.tick().unwrap();
        assert_eq!(ctl.state(), SimulationState::Idle);
        assert!(!ctl.has_runtime());
        assert_eq!(ctl.console(), "boot\n*** Fatal error: watchdog\n");
        assert!(ctl.tick().is_none());
    }

    #[test]
    fn finished_program_goes_idle() {
        let mut ctl = helpers::built("println \"done\"\n");
        ctl.run().unwrap();
        assert_eq!(ctl.tick().unwrap().outcome, StepOutcome::Finished);
        assert_eq!(ctl.state(), SimulationState::Idle);
        assert!(ctl.build_log().ends_with("*** Program started\n*** Finished\n"));
        assert_eq!(ctl.console(), "done\n");
    }
}

// ============================================================================
// GPIO Tests
// ============================================================================

mod gpio_tests {
    use super::*;

    #[test]
    fn edges_reported_only_on_change() {
        let mut ctl =
            SimulationController::with_loader(helpers::ReplayLoader(vec![0x00, 0x04, 0x04, 0x00]));
        ctl.simulate(VirtualFileSet::new(), "replay").unwrap();
        ctl.drain_events();

        let mut changed_at = Vec::new();
        let mut led_states = Vec::new();
        let led = LedIndicator::default();
        for _ in 0..4 {
            let report = ctl.tick().unwrap();
            for sample in helpers::gpio_events(ctl.drain_events()) {
                changed_at.push(report.tick);
                led_states.push((sample.changed & 0x04 != 0, led.update(&sample)));
            }
        }

        assert_eq!(changed_at, vec![2, 4]);
        // Bit 2 set turns the LED off, bit 2 cleared turns it on
        assert_eq!(led_states, vec![(true, Some(false)), (true, Some(true))]);
    }

    #[test]
    fn first_sample_compares_against_zero() {
        let mut ctl = SimulationController::with_loader(helpers::ReplayLoader(vec![0x04]));
        ctl.simulate(VirtualFileSet::new(), "replay").unwrap();
        let report = ctl.tick().unwrap();
        assert_eq!(report.gpio.value, 0x04);
        assert_eq!(report.gpio.changed, 0x04);
    }

    #[test]
    fn script_blink_alternates_led() {
        let mut ctl = helpers::built("loop\n  pin 2 toggle\n  wait 1\nend\n");
        ctl.drain_events();
        ctl.run().unwrap();
        let led = LedIndicator::default();
        let states: Vec<Option<bool>> = (0..4)
            .map(|_| led.update(&ctl.tick().unwrap().gpio))
            .collect();
        assert_eq!(states, vec![Some(false), Some(true), Some(false), Some(true)]);
    }
}

// ============================================================================
// Output Tests
// ============================================================================

mod output_tests {
    use super::*;

    #[test]
    fn console_concatenates_in_tick_order() {
        let mut ctl = SimulationController::with_loader(helpers::ReplayLoader(vec![]));
        ctl.simulate(VirtualFileSet::new(), "replay").unwrap();
        let outputs: Vec<String> = (0..5).map(|_| ctl.tick().unwrap().console).collect();
        assert_eq!(ctl.console(), outputs.concat());
        assert_eq!(ctl.console(), "<1><2><3><4><5>");
    }

    #[test]
    fn handler_sees_both_channels() {
        let mut ctl = SimulationController::new();
        let log = helpers::capture(&mut ctl);
        ctl.simulate(helpers::files("print \"hi\"\n"), "p").unwrap();
        ctl.tick();

        let log = log.lock().unwrap();
        let console: Vec<&str> = log
            .iter()
            .filter(|(_, channel)| *channel == OutputChannel::Console)
            .map(|(text, _)| text.as_str())
            .collect();
        assert_eq!(console, vec!["hi"]);
        assert!(log
            .iter()
            .any(|(text, channel)| channel.is_build() && text == "*** Program started\n"));
    }

    #[test]
    fn stop_clears_console() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        ctl.tick();
        assert_eq!(ctl.console(), "x");
        ctl.stop().unwrap();
        assert_eq!(ctl.console(), "");
        assert!(ctl.build_log().ends_with("*** Stopped\n"));
    }

    #[test]
    fn end_to_end_three_ticks_then_pause() {
        let mut doc = ProjectDocument::new("proj");
        doc.files_mut()
            .add(
                "main.script",
                b"repeat 5\n  print \"t\"\n  wait 1\nend\n".to_vec(),
            )
            .unwrap();

        doc.build().unwrap();
        doc.run().unwrap();
        let outputs: Vec<String> = (0..3).map(|_| doc.tick().unwrap().console).collect();
        doc.pause().unwrap();

        assert_eq!(doc.state(), SimulationState::Paused);
        assert_eq!(doc.controller().console(), outputs.concat());
        assert_eq!(doc.controller().console(), "ttt");
        assert!(doc.tick().is_none());
    }
}

// ============================================================================
// Document Tests
// ============================================================================

mod document_tests {
    use super::*;
    use std::fs;

    #[test]
    fn save_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blink.simproj");

        let mut doc = ProjectDocument::new("blink");
        doc.files_mut()
            .add("main.script", helpers::TICKER.as_bytes().to_vec())
            .unwrap();
        assert!(doc.is_dirty());
        doc.save(&path).unwrap();
        assert!(!doc.is_dirty());

        let mut reopened = ProjectDocument::open(&path).unwrap();
        assert_eq!(reopened.name(), "blink");
        assert_eq!(reopened.files(), doc.files());
        assert!(reopened.load_error().is_none());
        reopened.simulate().unwrap();
        assert_eq!(reopened.tick().unwrap().console, "x");
    }

    #[test]
    fn open_without_files_is_empty_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");
        fs::create_dir_all(path.join("Contents")).unwrap();

        let doc = ProjectDocument::open(&path).unwrap();
        assert!(doc.files().is_empty());
        assert!(doc.load_error().is_some());
    }

    #[test]
    fn saving_keeps_files_the_device_cannot_name() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.simproj");
        let files_dir = path.join("Contents").join("Files");
        fs::create_dir_all(&files_dir).unwrap();
        fs::write(files_dir.join("main.script"), b"halt\n").unwrap();
        fs::write(files_dir.join("My Notes.txt"), b"todo").unwrap();

        let mut doc = ProjectDocument::open(&path).unwrap();
        assert_eq!(doc.files().len(), 1);
        assert_eq!(doc.unrecognized_paths().collect::<Vec<_>>(), vec!["My Notes.txt"]);

        doc.files_mut()
            .add("extra.script", b"halt\n".to_vec())
            .unwrap();
        doc.save_in_place().unwrap();

        assert_eq!(fs::read(files_dir.join("My Notes.txt")).unwrap(), b"todo");
        assert!(files_dir.join("extra.script").exists());
    }

    #[test]
    fn plain_file_does_not_open_as_project() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, b"hello").unwrap();

        assert!(matches!(
            ProjectDocument::open(&path),
            Err(DocumentError::Package(PackageError::NotAPackage(_)))
        ));

        let mut doc = ProjectDocument::new("notes");
        doc.files_mut().add("main.script", b"halt\n".to_vec()).unwrap();
        assert!(doc.save(&path).is_err());
        assert_eq!(fs::read(&path).unwrap(), b"hello");
        assert!(doc.path().is_none());
    }

    #[test]
    fn import_replaces_all_files() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("device.img");

        let mut source = ProjectDocument::new("source");
        source
            .files_mut()
            .add("main.script", b"halt\n".to_vec())
            .unwrap();
        source.export_binary(&image).unwrap();

        let mut target = ProjectDocument::new("target");
        target
            .files_mut()
            .add("old.script", b"halt\n".to_vec())
            .unwrap();
        assert_eq!(target.import_binary(&image).unwrap(), 1);
        assert_eq!(target.files(), source.files());
        assert!(!target.files().contains("old.script"));
    }

    #[test]
    fn corrupt_image_leaves_files_alone() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("bad.img");
        fs::write(&image, b"not an image").unwrap();

        let mut doc = ProjectDocument::new("p");
        doc.files_mut().add("main.script", b"halt\n".to_vec()).unwrap();
        assert!(doc.import_binary(&image).is_err());
        assert!(doc.files().contains("main.script"));
    }
}

// ============================================================================
// Poll Loop Tests
// ============================================================================

mod poll_tests {
    use super::*;
    use tokio::sync::{broadcast, mpsc};
    use tokio::time::sleep;

    fn events() -> broadcast::Sender<SimulationEvent> {
        broadcast::channel(64).0
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_ticking() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        let (tx, rx) = mpsc::channel(8);

        let driver = async {
            sleep(Duration::from_millis(125)).await;
            tx.send(PollCommand::Pause).await.unwrap();
            sleep(Duration::from_millis(500)).await;
            tx.send(PollCommand::Stop).await.unwrap();
        };
        let (summary, ()) = tokio::join!(
            run_poll_loop(&mut ctl, PollLoop::default(), rx, events(), None),
            driver
        );

        // Ticks at 0, 50 and 100 ms
        assert_eq!(
            summary,
            PollSummary {
                ticks: 3,
                exit: PollExit::Idle
            }
        );
        assert_eq!(ctl.state(), SimulationState::Idle);
        assert!(ctl.build_log().ends_with("*** Paused\n*** Stopped\n"));
    }

    #[tokio::test(start_paused = true)]
    async fn run_resumes_ticking() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        let (tx, rx) = mpsc::channel(8);

        let driver = async {
            sleep(Duration::from_millis(125)).await;
            tx.send(PollCommand::Pause).await.unwrap();
            sleep(Duration::from_millis(185)).await;
            tx.send(PollCommand::Run).await.unwrap();
            sleep(Duration::from_millis(110)).await;
            tx.send(PollCommand::Stop).await.unwrap();
        };
        let (summary, ()) = tokio::join!(
            run_poll_loop(&mut ctl, PollLoop::default(), rx, events(), None),
            driver
        );

        // Three ticks before the pause, then 360 and 410 ms after resuming at 310
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.exit, PollExit::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_limit_ends_loop() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        let (_tx, rx) = mpsc::channel(1);

        let summary = run_poll_loop(
            &mut ctl,
            PollLoop::new(Duration::from_millis(10)),
            rx,
            events(),
            Some(4),
        )
        .await;

        assert_eq!(summary.exit, PollExit::TickLimit);
        assert_eq!(ctl.console(), "xxxx");
        assert_eq!(ctl.state(), SimulationState::Running);
    }

    #[tokio::test(start_paused = true)]
    async fn events_are_forwarded() {
        let mut ctl = helpers::built("loop\n  pin 2 toggle\n  wait 1\nend\n");
        ctl.drain_events();
        ctl.run().unwrap();
        let (_tx, rx) = mpsc::channel(1);
        let event_tx = events();
        let mut event_rx = event_tx.subscribe();

        run_poll_loop(&mut ctl, PollLoop::default(), rx, event_tx, Some(2)).await;

        let mut received = Vec::new();
        while let Ok(event) = event_rx.try_recv() {
            received.push(event);
        }
        assert!(matches!(
            received.first(),
            Some(SimulationEvent::StateChanged {
                to: SimulationState::Running,
                ..
            })
        ));
        let samples = helpers::gpio_events(received);
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].value, 0x04);
        assert_eq!(samples[1].value, 0x00);
        assert!(ctl.drain_events().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn finished_program_ends_loop() {
        let mut ctl = helpers::built("println \"a\"\nwait 1\nprintln \"b\"\n");
        ctl.run().unwrap();
        let (_tx, rx) = mpsc::channel(1);

        let summary = run_poll_loop(&mut ctl, PollLoop::default(), rx, events(), None).await;

        assert_eq!(
            summary,
            PollSummary {
                ticks: 2,
                exit: PollExit::Idle
            }
        );
        assert_eq!(ctl.console(), "a\nb\n");
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_leaves_controller_running() {
        let mut ctl = helpers::built(helpers::TICKER);
        ctl.run().unwrap();
        let (tx, rx) = mpsc::channel(1);
        tx.send(PollCommand::Shutdown).await.unwrap();

        let summary = run_poll_loop(&mut ctl, PollLoop::default(), rx, events(), None).await;

        assert_eq!(summary.exit, PollExit::Shutdown);
        assert_eq!(summary.ticks, 0);
        assert_eq!(ctl.state(), SimulationState::Running);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Clone, Copy)]
    enum Action {
        Build,
        BadBuild,
        Run,
        Pause,
        Stop,
        Tick,
    }

    fn action() -> impl Strategy<Value = Action> {
        prop_oneof![
            Just(Action::Build),
            Just(Action::BadBuild),
            Just(Action::Run),
            Just(Action::Pause),
            Just(Action::Stop),
            Just(Action::Tick),
        ]
    }

    proptest! {
        #[test]
        fn runtime_lives_exactly_outside_idle(actions in prop::collection::vec(action(), 0..40)) {
            let mut ctl = SimulationController::new();
            for action in actions {
                match action {
                    Action::Build => { let _ = ctl.build(helpers::files("repeat 3\n wait 1\nend\n"), "p"); }
                    Action::BadBuild => { let _ = ctl.build(helpers::files("nonsense\n"), "p"); }
                    Action::Run => { let _ = ctl.run(); }
                    Action::Pause => { let _ = ctl.pause(); }
                    Action::Stop => { let _ = ctl.stop(); }
                    Action::Tick => { ctl.tick(); }
                }
                prop_assert_eq!(ctl.has_runtime(), ctl.state() != SimulationState::Idle);
                prop_assert_eq!(ctl.can_pause(), ctl.state() == SimulationState::Running);
                prop_assert_eq!(
                    ctl.can_run(),
                    matches!(ctl.state(), SimulationState::Built | SimulationState::Paused)
                );
            }
        }

        #[test]
        fn removing_missing_path_changes_nothing(name in "[a-z]{1,8}\\.script") {
            let mut files = helpers::files("halt\n");
            let before = files.clone();
            if name != "main.script" {
                prop_assert!(files.remove(&name).is_none());
                prop_assert_eq!(files, before);
            }
        }
    }
}
