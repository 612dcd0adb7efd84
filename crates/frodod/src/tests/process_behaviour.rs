//! Behavioural tests covering the daemon lifecycle from bootstrap to shutdown.

use std::cell::RefCell;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use frodo_protocol::ServerMessage;
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};

use crate::context::Collaborators;
use crate::health::HealthReporter;
use crate::process::LaunchError;
use crate::process::launch::{LaunchPlan, run_daemon_with};
use crate::tests::support::{
    FailingConfigLoader, HealthEvent, RecordingHealthReporter, TestConfigLoader,
    TestShutdownSignal, test_collaborators,
};

const WAIT_TIMEOUT: Duration = Duration::from_secs(2);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

type StepResult = Result<(), String>;

#[fixture]
fn world() -> RefCell<ProcessTestWorld> {
    RefCell::new(ProcessTestWorld::new())
}

#[given("a fresh daemon process world")]
fn given_world(world: &RefCell<ProcessTestWorld>) {
    let _ = world;
}

#[when("the daemon starts")]
fn when_daemon_starts(world: &RefCell<ProcessTestWorld>) -> StepResult {
    world.borrow_mut().start_background()
}

#[when("the daemon starts with an invalid configuration")]
fn when_daemon_starts_invalid(world: &RefCell<ProcessTestWorld>) {
    world.borrow_mut().run_with_failing_loader();
}

#[then("the listener becomes ready")]
fn then_listener_ready(world: &RefCell<ProcessTestWorld>) -> StepResult {
    world.borrow().wait_for_ready()
}

#[then("a status command over the socket completes successfully")]
fn then_status_over_socket(world: &RefCell<ProcessTestWorld>) -> StepResult {
    let messages = world.borrow().send_status()?;
    match messages.last() {
        Some(ServerMessage::Completion(completion)) if completion.successful => Ok(()),
        other => Err(format!("expected a successful completion, got {other:?}")),
    }
}

#[when("shutdown is triggered")]
fn when_shutdown_triggered(world: &RefCell<ProcessTestWorld>) {
    world.borrow().shutdown.trigger();
}

#[when("the daemon run completes")]
fn when_daemon_completes(world: &RefCell<ProcessTestWorld>) -> StepResult {
    world.borrow_mut().join_background()
}

#[then("the daemon run succeeds")]
fn then_daemon_succeeds(world: &RefCell<ProcessTestWorld>) {
    let binding = world.borrow();
    let result = binding
        .result
        .as_ref()
        .expect("expected a recorded daemon result");
    assert!(result.is_ok(), "daemon run should succeed: {result:?}");
}

#[then("the daemon run fails during bootstrap")]
fn then_daemon_fails_bootstrap(world: &RefCell<ProcessTestWorld>) {
    let binding = world.borrow();
    let result = binding
        .result
        .as_ref()
        .expect("expected a recorded daemon result");
    assert!(
        matches!(result, Err(LaunchError::Bootstrap { .. })),
        "expected a bootstrap failure, got {result:?}"
    );
}

#[then("the reporter recorded shutdown completion")]
fn then_shutdown_recorded(world: &RefCell<ProcessTestWorld>) {
    let events = world.borrow().reporter.events();
    assert!(
        events.contains(&HealthEvent::ShutdownStarted(String::from("requested"))),
        "events: {events:?}"
    );
    assert_eq!(events.last(), Some(&HealthEvent::ShutdownCompleted));
}

#[then("the reporter recorded bootstrap failure")]
fn then_bootstrap_failure_recorded(world: &RefCell<ProcessTestWorld>) {
    let reporter = Arc::clone(&world.borrow().reporter);
    assert!(reporter.saw(|event| matches!(event, HealthEvent::BootstrapFailed(_))));
    assert!(!reporter.saw(|event| matches!(event, HealthEvent::ListenerReady(_))));
}

#[then("the socket file is removed")]
fn then_socket_removed(world: &RefCell<ProcessTestWorld>) {
    let path = world.borrow().loader.socket_path();
    assert!(
        !Path::new(&path).exists(),
        "socket file should be removed after shutdown"
    );
}

struct ProcessTestWorld {
    loader: TestConfigLoader,
    reporter: Arc<RecordingHealthReporter>,
    shutdown: TestShutdownSignal,
    handle: Option<thread::JoinHandle<Result<(), LaunchError>>>,
    result: Option<Result<(), LaunchError>>,
}

impl ProcessTestWorld {
    fn new() -> Self {
        Self {
            loader: TestConfigLoader::new(),
            reporter: Arc::new(RecordingHealthReporter::default()),
            shutdown: TestShutdownSignal::new(),
            handle: None,
            result: None,
        }
    }

    fn plan<L>(&self, loader: L, collaborators: Collaborators) -> LaunchPlan<L, TestShutdownSignal> {
        LaunchPlan {
            loader,
            shutdown: self.shutdown.clone(),
            reporter: self.reporter.clone() as Arc<dyn HealthReporter>,
            collaborators,
        }
    }

    fn start_background(&mut self) -> StepResult {
        if self.handle.is_some() {
            return Err(String::from("daemon already running"));
        }
        let plan = self.plan(self.loader.clone(), test_collaborators().collaborators);
        self.handle = Some(thread::spawn(move || run_daemon_with(plan)));
        Ok(())
    }

    fn run_with_failing_loader(&mut self) {
        let plan = self.plan(FailingConfigLoader, test_collaborators().collaborators);
        self.result = Some(run_daemon_with(plan));
    }

    fn wait_for_ready(&self) -> StepResult {
        let deadline = Instant::now() + WAIT_TIMEOUT;
        while Instant::now() < deadline {
            if self
                .reporter
                .saw(|event| matches!(event, HealthEvent::ListenerReady(_)))
            {
                return Ok(());
            }
            thread::sleep(POLL_INTERVAL);
        }
        Err(String::from("daemon never reported a ready listener"))
    }

    fn send_status(&self) -> Result<Vec<ServerMessage>, String> {
        let mut stream =
            UnixStream::connect(self.loader.socket_path()).map_err(|error| error.to_string())?;
        stream
            .set_read_timeout(Some(WAIT_TIMEOUT))
            .map_err(|error| error.to_string())?;
        stream
            .write_all(b"{\"id\":\"s-1\",\"command\":{\"type\":\"status\"}}\n")
            .map_err(|error| error.to_string())?;
        BufReader::new(stream)
            .lines()
            .map(|line| {
                let line = line.map_err(|error| error.to_string())?;
                serde_json::from_str(&line).map_err(|error| error.to_string())
            })
            .collect()
    }

    fn join_background(&mut self) -> StepResult {
        let handle = self
            .handle
            .take()
            .ok_or_else(|| String::from("daemon not running"))?;
        match handle.join() {
            Ok(result) => {
                self.result = Some(result);
                Ok(())
            }
            Err(_) => Err(String::from("daemon thread panicked")),
        }
    }
}

impl Drop for ProcessTestWorld {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shutdown.trigger();
            let _ = handle.join();
        }
    }
}

#[scenario(path = "tests/features/daemon_process.feature", index = 0)]
fn daemon_serves_until_shutdown(#[from(world)] world: RefCell<ProcessTestWorld>) {
    drop(world);
}

#[scenario(path = "tests/features/daemon_process.feature", index = 1)]
fn daemon_refuses_invalid_configuration(#[from(world)] world: RefCell<ProcessTestWorld>) {
    drop(world);
}
