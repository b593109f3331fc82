// MIDBG - Mediation Flow Debugger
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! End-to-end session scenarios against the scripted mock runtime.

use std::{sync::Arc, time::Duration};

use midbg_common::{DebugError, SourcePosition};
use midbg_engine::{DebugNotification, DebugSession, SessionState, StopReason};
use midbg_integration_tests::test_utils::{init, MockLanguageService, MockRuntime};
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

const SEQ_FILE: &str = "src/main/wso2mi/artifacts/sequences/main_seq.xml";

fn plain_descriptor(mediator_position: &str) -> Value {
    json!({
        "sequence": {
            "sequence-key": "mainSeq",
            "mediator-position": mediator_position
        }
    })
}

fn breakpoint_event(mediator_position: &str) -> Value {
    json!({
        "event": "breakpoint",
        "sequence": {
            "sequence-key": "mainSeq",
            "mediator-position": mediator_position
        }
    })
}

async fn recv_notification(
    rx: &mut UnboundedReceiver<DebugNotification>,
) -> DebugNotification {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a notification")
        .expect("notification channel closed")
}

/// Receive notifications until a `Stopped` arrives, skipping verification
/// updates.
async fn recv_stopped(
    rx: &mut UnboundedReceiver<DebugNotification>,
) -> (StopReason, midbg_common::RuntimeBreakpoint) {
    loop {
        match recv_notification(rx).await {
            DebugNotification::Stopped { reason, breakpoint } => return (reason, breakpoint),
            DebugNotification::BreakpointVerificationChanged(_) => continue,
            other => panic!("expected a stopped notification, got {other:?}"),
        }
    }
}

async fn started_session(
    runtime: &MockRuntime,
    language: Arc<MockLanguageService>,
) -> (DebugSession, UnboundedReceiver<DebugNotification>) {
    let (session, rx) = DebugSession::new(runtime.config(), language);
    session.start().await.expect("session start");
    assert_eq!(session.state(), SessionState::Running);
    (session, rx)
}

#[tokio::test]
async fn test_attach_reissues_breakpoints_before_resuming() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));

    let (session, _rx) = DebugSession::new(runtime.config(), language);

    // registered while disconnected: nothing goes on the wire yet
    let breakpoints =
        session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();
    assert_eq!(breakpoints.len(), 1);
    assert!(breakpoints[0].verified);
    assert!(runtime.commands().is_empty());

    session.start().await.unwrap();
    runtime.wait_for_command(|cmd| cmd["command"] == "resume").await;

    let commands = runtime.commands();
    let clear_idx = commands
        .iter()
        .position(|cmd| cmd["command"] == "clear" && cmd["sequence"]["sequence-key"] == "mainSeq")
        .expect("attach clears the known binding first");
    let set_idx = commands
        .iter()
        .position(|cmd| cmd["command"] == "set" && cmd["sequence"]["sequence-key"] == "mainSeq")
        .expect("attach re-issues the binding");
    let resume_idx = commands
        .iter()
        .position(|cmd| cmd["command"] == "resume")
        .expect("attach resumes last");
    assert!(clear_idx < set_idx);
    assert!(set_idx < resume_idx);

    session.shutdown();
}

#[tokio::test]
async fn test_breakpoint_event_pauses_at_registered_position() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));

    let (session, mut rx) = started_session(&runtime, language).await;
    session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();
    runtime
        .wait_for_command(|cmd| {
            cmd["command"] == "set" && cmd["command-argument"] == "breakpoint"
        })
        .await;

    runtime.push_event(breakpoint_event("0"));

    let (reason, breakpoint) = recv_stopped(&mut rx).await;
    assert_eq!(reason, StopReason::Breakpoint);
    assert!(breakpoint.file_path.ends_with("main_seq.xml"));
    assert_eq!(breakpoint.line, 10);
    assert!(breakpoint.verified);

    assert_eq!(session.state(), SessionState::Paused);
    assert_eq!(session.current_breakpoint().unwrap().line, 10);

    session.shutdown();
}

#[tokio::test]
async fn test_step_over_skips_user_breakpoints_and_reports_step() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));
    language.register(SEQ_FILE, SourcePosition::line(12), plain_descriptor("1"));
    language.register(SEQ_FILE, SourcePosition::line(14), plain_descriptor("2"));
    // from line 10 one step can land on the user breakpoint at 12 or on 14
    language.set_step_targets(
        SEQ_FILE,
        10,
        vec![SourcePosition::line(12), SourcePosition::line(14)],
    );

    let (session, mut rx) = started_session(&runtime, language).await;
    session
        .set_breakpoints(SEQ_FILE, &[SourcePosition::line(10), SourcePosition::line(12)])
        .await
        .unwrap();

    runtime.push_event(breakpoint_event("0"));
    let (reason, _) = recv_stopped(&mut rx).await;
    assert_eq!(reason, StopReason::Breakpoint);

    session.step_over().await.unwrap();

    // only the uncovered target went on the wire as a step breakpoint; the
    // user breakpoint at line 12 keeps its single set from registration
    let commands = runtime.commands();
    let sets_for = |position: &str| {
        commands
            .iter()
            .filter(|cmd| {
                cmd["command"] == "set" && cmd["sequence"]["mediator-position"] == position
            })
            .count()
    };
    assert_eq!(sets_for("1"), 1);
    assert_eq!(sets_for("2"), 1);
    assert!(session.has_ephemeral_breakpoints());

    // execution lands on the pre-existing user breakpoint
    runtime.push_event(breakpoint_event("1"));
    let (reason, breakpoint) = recv_stopped(&mut rx).await;
    assert_eq!(reason, StopReason::Step);
    assert_eq!(breakpoint.line, 12);

    // the leftover step breakpoint is cleared; the user one is untouched
    runtime
        .wait_for_command(|cmd| {
            cmd["command"] == "clear" && cmd["sequence"]["mediator-position"] == "2"
        })
        .await;
    assert!(!session.has_ephemeral_breakpoints());
    assert!(!runtime
        .commands()
        .iter()
        .any(|cmd| cmd["command"] == "clear" && cmd["sequence"]["mediator-position"] == "1"));

    session.shutdown();
}

#[tokio::test]
async fn test_resume_timeout_leaves_session_running() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));

    let (session, mut rx) = started_session(&runtime, language).await;
    session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();
    runtime.push_event(breakpoint_event("0"));
    recv_stopped(&mut rx).await;

    runtime.set_responding(false);
    let err = session.resume().await.unwrap_err();
    assert!(matches!(err, DebugError::Timeout(_)));

    // the resume was sent; its acknowledgement is what never came, so the
    // session stays Running rather than snapping back to Paused
    assert_eq!(session.state(), SessionState::Running);
    assert!(session.current_breakpoint().is_none());

    session.shutdown();
}

#[tokio::test]
async fn test_terminated_during_outstanding_command() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());

    let (session, mut rx) = started_session(&runtime, language).await;
    let session = Arc::new(session);

    runtime.set_responding(false);
    let resume = tokio::spawn({
        let session = Arc::clone(&session);
        async move { session.resume().await }
    });
    runtime.wait_for_command(|cmd| cmd["command"] == "resume").await;

    runtime.push_event(json!({ "event": "terminated" }));

    // the event channel is independent of the stalled command, so the
    // termination is observed while the resume is still outstanding
    let notification = recv_notification(&mut rx).await;
    assert!(matches!(notification, DebugNotification::Terminated));
    assert_eq!(session.state(), SessionState::Terminated);

    // the stalled resume eventually fails on its own timeout
    assert!(resume.await.unwrap().is_err());

    // exactly one terminated notification
    let extra = tokio::time::timeout(Duration::from_millis(200), rx.recv()).await;
    assert!(extra.is_err(), "expected no further notifications, got {extra:?}");

    session.shutdown();
}

#[tokio::test]
async fn test_terminated_drains_step_breakpoints_without_wire_clears() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));
    language.register(SEQ_FILE, SourcePosition::line(14), plain_descriptor("2"));
    language.set_step_targets(SEQ_FILE, 10, vec![SourcePosition::line(14)]);

    let (session, mut rx) = started_session(&runtime, language).await;
    session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();
    runtime.push_event(breakpoint_event("0"));
    recv_stopped(&mut rx).await;

    session.step_over().await.unwrap();
    assert!(session.has_ephemeral_breakpoints());

    runtime.push_event(json!({ "event": "terminated" }));
    let notification = recv_notification(&mut rx).await;
    assert!(matches!(notification, DebugNotification::Terminated));
    assert_eq!(session.state(), SessionState::Terminated);

    // the runtime is gone; the registry is drained locally without issuing
    // clears for the step breakpoint
    assert!(!session.has_ephemeral_breakpoints());
    assert!(!runtime
        .commands()
        .iter()
        .any(|cmd| cmd["command"] == "clear" && cmd["sequence"]["mediator-position"] == "2"));

    session.shutdown();
}

#[tokio::test]
async fn test_resume_after_termination_is_rejected() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());

    let (session, mut rx) = started_session(&runtime, language).await;
    runtime.push_event(json!({ "event": "terminated" }));
    let notification = recv_notification(&mut rx).await;
    assert!(matches!(notification, DebugNotification::Terminated));
    assert_eq!(session.state(), SessionState::Terminated);

    // terminal states stay terminal
    let err = session.resume().await.unwrap_err();
    assert!(matches!(err, DebugError::SessionClosed));
    assert_eq!(session.state(), SessionState::Terminated);

    // no second resume went on the wire; the only one is from attach
    assert_eq!(
        runtime.commands().iter().filter(|cmd| cmd["command"] == "resume").count(),
        1
    );

    session.shutdown();
}

#[tokio::test]
async fn test_late_breakpoint_event_cannot_revive_failed_session() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));

    let (session, mut rx) = DebugSession::new(runtime.config(), language);
    session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();

    // attach stalls on its first command and fails the start
    runtime.set_responding(false);
    let err = session.start().await.unwrap_err();
    assert!(matches!(err, DebugError::Timeout(_)));
    assert_eq!(session.state(), SessionState::Error);

    // the event pump is still alive; a breakpoint event arriving now must
    // not flip the session back to Paused
    runtime.push_event(breakpoint_event("0"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.state(), SessionState::Error);
    assert!(session.current_breakpoint().is_none());

    let extra = tokio::time::timeout(Duration::from_millis(100), rx.recv()).await;
    assert!(extra.is_err(), "expected no notifications, got {extra:?}");

    session.shutdown();
}

#[tokio::test]
async fn test_set_breakpoints_marks_unknown_positions_unverified() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));

    let (session, _rx) = started_session(&runtime, language).await;
    let breakpoints = session
        .set_breakpoints(SEQ_FILE, &[SourcePosition::line(10), SourcePosition::line(99)])
        .await
        .unwrap();

    assert_eq!(breakpoints.len(), 2);
    assert!(breakpoints[0].verified);
    assert!(!breakpoints[1].verified);
    assert_eq!(breakpoints[1].line, 99);

    // no set command for the unbreakable line
    runtime
        .wait_for_command(|cmd| {
            cmd["command"] == "set" && cmd["sequence"]["mediator-position"] == "0"
        })
        .await;
    assert_eq!(
        runtime.commands().iter().filter(|cmd| cmd["command"] == "set").count(),
        1
    );

    session.shutdown();
}

#[tokio::test]
async fn test_clear_breakpoints_issues_wire_clears() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));
    language.register(SEQ_FILE, SourcePosition::line(12), plain_descriptor("1"));

    let (session, _rx) = started_session(&runtime, language).await;
    session
        .set_breakpoints(SEQ_FILE, &[SourcePosition::line(10), SourcePosition::line(12)])
        .await
        .unwrap();

    session.clear_breakpoints(SEQ_FILE).await.unwrap();
    runtime
        .wait_for_command(|cmd| {
            cmd["command"] == "clear" && cmd["sequence"]["mediator-position"] == "0"
        })
        .await;
    runtime
        .wait_for_command(|cmd| {
            cmd["command"] == "clear" && cmd["sequence"]["mediator-position"] == "1"
        })
        .await;

    // re-registering afterwards goes back on the wire as a fresh set
    let breakpoints =
        session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();
    assert!(breakpoints[0].verified);

    session.shutdown();
}

#[tokio::test]
async fn test_fetch_properties_renames_scope_keys() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());
    language.register(SEQ_FILE, SourcePosition::line(10), plain_descriptor("0"));

    let (session, mut rx) = started_session(&runtime, language).await;
    session.set_breakpoints(SEQ_FILE, &[SourcePosition::line(10)]).await.unwrap();
    runtime.push_event(breakpoint_event("0"));
    recv_stopped(&mut rx).await;

    let scopes = session.fetch_properties().await.unwrap();
    assert_eq!(scopes.len(), 6);
    for scope in &scopes {
        // the mock answers every scope with the synapse payload; the wire
        // key must come back renamed to its display label
        assert!(scope.get("synapse-properties").is_none());
        assert_eq!(scope["Synapse Scope Properties"]["prop"], "value");
    }

    // both command arguments were used
    let commands = runtime.commands();
    assert!(commands
        .iter()
        .any(|cmd| cmd["command"] == "get" && cmd["command-argument"] == "variables"));
    assert_eq!(
        commands
            .iter()
            .filter(|cmd| cmd["command"] == "get" && cmd["command-argument"] == "properties")
            .count(),
        5
    );

    session.shutdown();
}

#[tokio::test]
async fn test_event_channel_eof_fails_the_session() {
    init::init_test_environment();
    let runtime = MockRuntime::spawn().await.unwrap();
    let language = Arc::new(MockLanguageService::new());

    let (session, mut rx) = started_session(&runtime, language).await;

    // dropping the runtime closes both sockets
    drop(runtime);

    let notification = recv_notification(&mut rx).await;
    assert!(matches!(notification, DebugNotification::Terminated));
    assert_eq!(session.state(), SessionState::Error);

    session.shutdown();
    // a transport failure is sticky; shutdown does not relabel it
    assert_eq!(session.state(), SessionState::Error);
}
