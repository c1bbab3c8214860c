//! End-to-end session tests against the in-process mock backend.

mod common;

use std::thread;
use std::time::{Duration, Instant};

use common::{Behavior, MockBackend};
use rdbg_engine::{COMMANDS, CommandOutput, DebugSession, Error, SessionConfig};

fn connect(backend: &MockBackend) -> DebugSession {
    DebugSession::connect(
        SessionConfig {
            endpoint: backend.endpoint().to_string(),
            startup_timeout: Some(Duration::from_secs(5)),
        },
        &COMMANDS,
    )
    .unwrap()
}

/// Notices are forwarded by the target worker, so they may lag the command
/// that provoked them by a poll iteration. Drain through harmless dispatches
/// until `want` notices arrived or the deadline passes.
fn drain_notices(session: &mut DebugSession, want: usize) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(2);
    let mut notices = Vec::new();
    while notices.len() < want && Instant::now() < deadline {
        notices.extend(session.dispatch("help").notices);
        thread::sleep(Duration::from_millis(10));
    }
    notices
}

#[test]
fn full_debugging_scenario() {
    let backend = MockBackend::spawn(Behavior {
        startup_notices: vec!["target registered"],
        continue_notices: vec!["line 2: i := 2", "line 3: return i"],
        ..Behavior::default()
    });
    let mut session = connect(&backend);

    let result = session.dispatch("run f(2)");
    assert!(session.is_active());
    assert!(matches!(result.output, CommandOutput::None));

    // The endpoint notice is consumed during startup and must not reappear
    // as a diagnostic; the scripted startup notice must.
    let startup = drain_notices(&mut session, 1);
    assert_eq!(startup, ["target registered"]);

    match session.dispatch("si").output {
        CommandOutput::Breakpoint(stop) => {
            assert_eq!(stop.target_id, 11);
            assert_eq!(stop.line, 3);
            assert_eq!(stop.signature, "f(integer)");
        }
        other => panic!("unexpected output: {other:?}"),
    }

    match session.dispatch("vars").output {
        CommandOutput::Variables(vars) => {
            assert_eq!(vars.len(), 1);
            assert_eq!(vars[0].name, "i");
            assert_eq!(vars[0].value, "2");
        }
        other => panic!("unexpected output: {other:?}"),
    }

    match session.dispatch("stack").output {
        CommandOutput::Frames(frames) => {
            assert_eq!(frames.len(), 1);
            assert_eq!(frames[0].label, "f(2)");
        }
        other => panic!("unexpected output: {other:?}"),
    }

    match session.dispatch("source").output {
        CommandOutput::Source(text) => assert!(text.contains("RETURN i")),
        other => panic!("unexpected output: {other:?}"),
    }

    assert!(matches!(
        session.dispatch("brset 3").output,
        CommandOutput::None
    ));
    match session.dispatch("brshow").output {
        CommandOutput::Breakpoints(points) => assert_eq!(points.len(), 1),
        other => panic!("unexpected output: {other:?}"),
    }

    session.dispatch("continue");
    let diagnostics = drain_notices(&mut session, 2);
    assert_eq!(diagnostics, ["line 2: i := 2", "line 3: return i"]);

    session.dispatch("stop");
    assert!(!session.is_active());

    // Exactly three connections: setup, target, control.
    assert_eq!(backend.connection_count(), 3);
}

#[test]
fn malformed_call_opens_no_target_connection() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);
    assert_eq!(backend.connection_count(), 1);

    session.dispatch("run f2");
    assert!(!session.is_active());
    assert_eq!(backend.connection_count(), 1);
}

#[test]
fn unresolved_target_fails_the_start_and_closes_its_connection() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);

    session.dispatch("run missing(1)");
    assert!(!session.is_active());
    // The target connection was opened for the catalog lookup, but no
    // control connection followed.
    assert_eq!(backend.connection_count(), 2);

    // The session is still usable afterwards.
    session.dispatch("run f(2)");
    assert!(session.is_active());
    session.dispatch("stop");
}

#[test]
fn session_commands_without_a_session_are_skipped() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);

    for line in ["vars", "stack", "si", "continue", "brset 3"] {
        assert!(matches!(
            session.dispatch(line).output,
            CommandOutput::None
        ));
    }
    assert!(!session.is_active());
}

#[test]
fn stop_without_a_session_is_a_no_op() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);

    session.dispatch("stop");
    session.dispatch("stop");
    assert!(!session.is_active());
}

#[test]
fn second_run_while_active_is_skipped() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);

    session.dispatch("run f(2)");
    assert!(session.is_active());
    let before = backend.connection_count();

    session.dispatch("run g()");
    assert_eq!(backend.connection_count(), before);

    session.dispatch("stop");
}

#[test]
fn unknown_command_is_ignored() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);

    assert!(matches!(
        session.dispatch("frobnicate now").output,
        CommandOutput::None
    ));
}

#[test]
fn routine_listing_needs_no_session() {
    let backend = MockBackend::spawn(Behavior::default());
    let mut session = connect(&backend);

    match session.dispatch("func").output {
        CommandOutput::Routines(routines) => {
            assert_eq!(routines.len(), 2);
            assert_eq!(routines[0].signature, "f(integer)");
            assert_eq!(routines[0].id, 11);
        }
        other => panic!("unexpected output: {other:?}"),
    }
}

#[test]
fn startup_timeout_bounds_the_endpoint_wait() {
    let backend = MockBackend::spawn(Behavior {
        publish_endpoint: false,
        ..Behavior::default()
    });
    let mut session = DebugSession::connect(
        SessionConfig {
            endpoint: backend.endpoint().to_string(),
            startup_timeout: Some(Duration::from_millis(300)),
        },
        &COMMANDS,
    )
    .unwrap();

    assert!(matches!(session.start("f(2)"), Err(Error::StartupTimeout)));
    assert!(!session.is_active());

    // The abandoned worker does not poison the session; commands that need
    // no target still work.
    match session.dispatch("func").output {
        CommandOutput::Routines(routines) => assert_eq!(routines.len(), 2),
        other => panic!("unexpected output: {other:?}"),
    }
}

#[test]
fn missing_extension_is_fatal() {
    let backend = MockBackend::spawn(Behavior {
        extension_available: false,
        ..Behavior::default()
    });
    let result = DebugSession::connect(
        SessionConfig {
            endpoint: backend.endpoint().to_string(),
            startup_timeout: None,
        },
        &COMMANDS,
    );
    assert!(matches!(result, Err(Error::ExtensionMissing(_))));
}
