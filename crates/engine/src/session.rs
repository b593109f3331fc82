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

//! The session coordinator.
//!
//! One [`DebugSession`] exists per debug attempt. It owns both transport
//! channels and the breakpoint registry, drives the
//! connect → attach → resume → pause → step/continue → terminate lifecycle,
//! and turns incoming runtime events into session-level outcomes surfaced to
//! the shell as [`DebugNotification`]s.
//!
//! Breakpoints may be registered before the runtime is reachable; `start`
//! re-issues every known persistent binding during the
//! `AttachingBreakpoints` phase, serially, because the command channel
//! cannot distinguish overlapping responses.

use std::{collections::HashMap, sync::Arc};

use midbg_common::{
    clear_breakpoint_command, normalize_path, properties_command, resume_command,
    set_breakpoint_command, BreakpointDescriptor, DebugError, DebugResult, DebuggerConfig,
    RuntimeBreakpoint, RuntimeEvent, SourcePosition, PROPERTY_CONTEXTS,
    PROPERTY_LABELS,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};

use crate::{
    lang::LanguageService,
    registry::BreakpointRegistry,
    transport::{CommandChannel, EventChannel, EventItem},
};

/// Lifecycle states of a debug session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection attempt has been made yet.
    Disconnected,
    /// Opening the command and event sockets.
    Connecting,
    /// Re-issuing breakpoints registered before the runtime was reachable.
    AttachingBreakpoints,
    /// The runtime is executing.
    Running,
    /// The runtime is paused at a registered position.
    Paused,
    /// The flow terminated or the session was torn down. Terminal.
    Terminated,
    /// An unrecoverable transport failure occurred. Terminal.
    Error,
}

/// Why execution stopped, as surfaced to the shell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Stopped on session entry.
    Entry,
    /// A user breakpoint was hit.
    Breakpoint,
    /// A step operation completed.
    Step,
    /// A data breakpoint was hit.
    DataBreakpoint,
    /// The runtime raised an exception.
    Exception,
}

/// Notifications produced for the IDE shell.
#[derive(Debug, Clone)]
pub enum DebugNotification {
    /// Execution paused; the breakpoint identifies the file/line to reveal.
    Stopped {
        /// Why execution stopped.
        reason: StopReason,
        /// The breakpoint the pause was resolved to.
        breakpoint: RuntimeBreakpoint,
    },
    /// A breakpoint's verification status should be reflected in the editor.
    BreakpointVerificationChanged(RuntimeBreakpoint),
    /// The session ended, either by flow termination or transport failure.
    Terminated,
}

#[derive(Debug)]
pub(crate) struct SessionShared {
    pub(crate) registry: BreakpointRegistry,
    pub(crate) state: SessionState,
    pub(crate) current_pause: Option<RuntimeBreakpoint>,
    pub(crate) current_file: Option<String>,
    pub(crate) stepping: bool,
    pub(crate) next_breakpoint_id: u64,
}

/// One debug attempt against a remote mediation runtime.
pub struct DebugSession {
    config: DebuggerConfig,
    pub(crate) language: Arc<dyn LanguageService>,
    pub(crate) shared: Arc<Mutex<SessionShared>>,
    command: Mutex<Option<Arc<CommandChannel>>>,
    event_channel: Mutex<Option<EventChannel>>,
    pump: Mutex<Option<JoinHandle<()>>>,
    notify_tx: mpsc::UnboundedSender<DebugNotification>,
}

impl DebugSession {
    /// Create a session and the notification stream the shell consumes.
    pub fn new(
        config: DebuggerConfig,
        language: Arc<dyn LanguageService>,
    ) -> (Self, mpsc::UnboundedReceiver<DebugNotification>) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let session = Self {
            config,
            language,
            shared: Arc::new(Mutex::new(SessionShared {
                registry: BreakpointRegistry::new(),
                state: SessionState::Disconnected,
                current_pause: None,
                current_file: None,
                stepping: false,
                next_breakpoint_id: 1,
            })),
            command: Mutex::new(None),
            event_channel: Mutex::new(None),
            pump: Mutex::new(None),
            notify_tx,
        };
        (session, notify_rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.lock().state
    }

    /// The breakpoint the runtime is currently paused at, if any.
    pub fn current_breakpoint(&self) -> Option<RuntimeBreakpoint> {
        self.shared.lock().current_pause.clone()
    }

    /// Track the file the shell is currently inspecting, used for
    /// stack-trace and step queries.
    pub fn set_current_file(&self, file_path: &str) {
        self.shared.lock().current_file = Some(normalize_path(file_path));
    }

    /// The tracked active file.
    pub fn current_file(&self) -> Option<String> {
        self.shared.lock().current_file.clone()
    }

    /// Whether any step-over breakpoints are currently registered.
    pub fn has_ephemeral_breakpoints(&self) -> bool {
        self.shared.lock().registry.has_ephemeral()
    }

    /// Connect both channels, re-issue known breakpoints and resume the
    /// runtime.
    pub async fn start(&self) -> DebugResult<()> {
        {
            let mut shared = self.shared.lock();
            if shared.state != SessionState::Disconnected {
                return Err(DebugError::Protocol(format!(
                    "session already started (state: {:?})",
                    shared.state
                )));
            }
            shared.state = SessionState::Connecting;
        }

        match self.connect_and_attach().await {
            Ok(()) => Ok(()),
            Err(err) => {
                error!(%err, "Failed to start the debug session");
                self.shared.lock().state = SessionState::Error;
                Err(err)
            }
        }
    }

    async fn connect_and_attach(&self) -> DebugResult<()> {
        let command = Arc::new(
            CommandChannel::connect(
                &self.config.host,
                self.config.command_port,
                self.config.command_timeout,
            )
            .await?,
        );
        let (event_channel, event_rx) =
            EventChannel::connect(&self.config.host, self.config.event_port).await?;

        *self.command.lock() = Some(command.clone());
        *self.event_channel.lock() = Some(event_channel);
        *self.pump.lock() = Some(tokio::spawn(event_pump(
            self.shared.clone(),
            command.clone(),
            self.notify_tx.clone(),
            event_rx,
        )));

        self.shared.lock().state = SessionState::AttachingBreakpoints;

        // breakpoints may have been registered while the runtime was not
        // reachable; re-issue them one at a time (the command channel cannot
        // distinguish overlapping responses)
        let bindings = self.shared.lock().registry.persistent_bindings();
        for binding in bindings {
            command.send(&clear_breakpoint_command(&binding.descriptor)).await?;
            command.send(&set_breakpoint_command(&binding.descriptor)).await?;
        }

        command.send(&resume_command()).await?;
        self.shared.lock().state = SessionState::Running;
        info!("Debug session attached and running");
        Ok(())
    }

    /// Replace the breakpoints of a file with the requested positions.
    ///
    /// Validation is delegated to the language service; the requested set is
    /// diffed against the registry's current bindings for the file (removed
    /// positions are wire-cleared, new ones wire-set when attached). Each
    /// newly accepted position gets a fresh breakpoint id; ids are never
    /// reused across the diff. Returns one breakpoint per requested
    /// position, carrying its verification status.
    pub async fn set_breakpoints(
        &self,
        file_path: &str,
        positions: &[SourcePosition],
    ) -> DebugResult<Vec<RuntimeBreakpoint>> {
        self.ensure_accepting_mutations()?;
        let normalized = normalize_path(file_path);

        let validity = self
            .language
            .validate_breakpoints(file_path, positions)
            .await
            .map_err(|err| DebugError::LanguageService(err.to_string()))?;
        let accepted: Vec<SourcePosition> =
            validity.iter().filter(|verdict| verdict.valid).map(|verdict| verdict.position()).collect();

        // clear bindings whose source position is no longer requested
        let removed = {
            let shared = self.shared.lock();
            shared
                .registry
                .persistent_for_file(&normalized)
                .into_iter()
                .filter(|(_, binding)| !accepted.contains(&binding.breakpoint.position()))
                .collect::<Vec<_>>()
        };
        let attached = self.command.lock().clone();
        for (position, binding) in &removed {
            if let Some(command) = &attached {
                command.send(&clear_breakpoint_command(&binding.descriptor)).await?;
            }
            self.shared.lock().registry.remove_persistent(position);
        }

        // fetch descriptors only for genuinely new positions
        let new_positions: Vec<SourcePosition> = {
            let shared = self.shared.lock();
            accepted
                .iter()
                .copied()
                .filter(|position| shared.registry.persistent_at(&normalized, position).is_none())
                .collect()
        };
        let descriptors = if new_positions.is_empty() {
            Vec::new()
        } else {
            self.language
                .breakpoint_info(file_path, &new_positions)
                .await
                .map_err(|err| DebugError::LanguageService(err.to_string()))?
        };
        let mut descriptor_by_position: HashMap<SourcePosition, BreakpointDescriptor> =
            new_positions
                .iter()
                .copied()
                .zip(descriptors)
                .filter_map(|(position, descriptor)| Some((position, descriptor?)))
                .collect();

        let mut results = Vec::with_capacity(validity.len());
        for verdict in &validity {
            let position = verdict.position();

            if !verdict.valid {
                results.push(self.fresh_breakpoint(&normalized, position, false));
                continue;
            }

            if let Some(existing) = {
                let shared = self.shared.lock();
                shared.registry.persistent_at(&normalized, &position).cloned()
            } {
                results.push(existing);
                continue;
            }

            let Some(descriptor) = descriptor_by_position.remove(&position) else {
                // the language service accepted the line but produced no
                // descriptor: degrade this one breakpoint to unverified
                warn!(
                    file = %normalized,
                    line = position.line,
                    "No breakpoint information for position; marking unverified"
                );
                results.push(self.fresh_breakpoint(&normalized, position, false));
                continue;
            };

            let breakpoint = self.fresh_breakpoint(&normalized, position, true);
            let semantic = descriptor.semantic_position();
            self.shared.lock().registry.register_persistent(
                breakpoint.clone(),
                semantic,
                descriptor.clone(),
            )?;
            if let Some(command) = &attached {
                command.send(&set_breakpoint_command(&descriptor)).await?;
            }
            results.push(breakpoint);
        }

        Ok(results)
    }

    /// Remove every breakpoint of a file, issuing a wire-level clear for
    /// each binding before it is dropped from the registry.
    pub async fn clear_breakpoints(&self, file_path: &str) -> DebugResult<()> {
        self.ensure_accepting_mutations()?;

        let descriptors = self.shared.lock().registry.file_descriptors(file_path);
        if let Some(command) = self.command.lock().clone() {
            for descriptor in &descriptors {
                command.send(&clear_breakpoint_command(descriptor)).await?;
            }
        }
        self.shared.lock().registry.clear_for_file(file_path);
        Ok(())
    }

    /// Resume execution after a pause.
    ///
    /// The pause point is cleared before the resume command hits the wire so
    /// a racing pause event cannot be attributed to the old position. A
    /// timeout leaves the session in `Running`; the caller decides whether
    /// to retry or tear down. Once the session has ended, resuming fails
    /// with [`DebugError::SessionClosed`] - terminal states stay terminal.
    pub async fn resume(&self) -> DebugResult<()> {
        self.resume_internal(false).await
    }

    pub(crate) async fn resume_internal(&self, stepping: bool) -> DebugResult<()> {
        let command = self.require_command()?;
        {
            let mut shared = self.shared.lock();
            if matches!(shared.state, SessionState::Terminated | SessionState::Error) {
                return Err(DebugError::SessionClosed);
            }
            shared.stepping = stepping;
            shared.current_pause = None;
            shared.state = SessionState::Running;
        }
        command.send(&resume_command()).await?;
        Ok(())
    }

    /// Query the runtime for the property scopes of the paused message
    /// context, mapping wire keys to display labels.
    ///
    /// Scopes that fail to answer are logged and skipped rather than
    /// failing the whole query.
    pub async fn fetch_properties(&self) -> DebugResult<Vec<Value>> {
        let command = self.require_command()?;
        let mut scopes = Vec::new();
        for context in PROPERTY_CONTEXTS {
            let response = match command.send(&properties_command(context)).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(%err, context, "Property query failed");
                    continue;
                }
            };
            let mut value: Value = serde_json::from_str(&response).map_err(|err| {
                DebugError::Protocol(format!("unparsable property response: {err}"))
            })?;
            if let Some(object) = value.as_object_mut() {
                for (wire_key, label) in PROPERTY_LABELS {
                    if let Some(properties) = object.remove(wire_key) {
                        object.insert(label.to_string(), properties);
                    }
                }
            }
            scopes.push(value);
        }
        Ok(scopes)
    }

    /// Tear the session down: close both sockets and stop the event pump.
    ///
    /// Idempotent - safe to call after a `terminated` event already ended
    /// the session, or more than once.
    pub fn shutdown(&self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
        if let Some(event_channel) = self.event_channel.lock().take() {
            event_channel.shutdown();
        }
        *self.command.lock() = None;

        let mut shared = self.shared.lock();
        shared.registry.clear_all_ephemeral();
        shared.current_pause = None;
        shared.stepping = false;
        if !matches!(shared.state, SessionState::Terminated | SessionState::Error) {
            shared.state = SessionState::Terminated;
            debug!("Debug session shut down");
        }
    }

    pub(crate) fn require_command(&self) -> DebugResult<Arc<CommandChannel>> {
        self.command.lock().clone().ok_or(DebugError::SessionClosed)
    }

    pub(crate) fn fresh_breakpoint(
        &self,
        normalized_path: &str,
        position: SourcePosition,
        verified: bool,
    ) -> RuntimeBreakpoint {
        let mut shared = self.shared.lock();
        let id = shared.next_breakpoint_id;
        shared.next_breakpoint_id += 1;
        RuntimeBreakpoint {
            id,
            file_path: normalized_path.to_string(),
            line: position.line,
            column: position.column,
            verified,
        }
    }

    fn ensure_accepting_mutations(&self) -> DebugResult<()> {
        let state = self.state();
        if matches!(state, SessionState::Terminated | SessionState::Error) {
            return Err(DebugError::SessionClosed);
        }
        Ok(())
    }
}

impl Drop for DebugSession {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.lock().take() {
            pump.abort();
        }
    }
}

/// Turns raw event-channel items into registry lookups, state transitions
/// and shell notifications.
async fn event_pump(
    shared: Arc<Mutex<SessionShared>>,
    command: Arc<CommandChannel>,
    notify: mpsc::UnboundedSender<DebugNotification>,
    mut events: mpsc::UnboundedReceiver<EventItem>,
) {
    while let Some(item) = events.recv().await {
        match item {
            EventItem::Event(RuntimeEvent::Breakpoint(descriptor)) => {
                let position = descriptor.semantic_position();

                let (stopped, step_cleanup) = {
                    let mut state = shared.lock();
                    if matches!(state.state, SessionState::Terminated | SessionState::Error) {
                        // a late event must not resurrect an ended session
                        debug!(?position, "Dropping breakpoint event after session end");
                        (None, Vec::new())
                    } else {
                        match state.registry.resolve_event(&position) {
                            Some(binding) => {
                                let breakpoint = binding.breakpoint.clone();
                                state.current_pause = Some(breakpoint.clone());
                                state.current_file = Some(breakpoint.file_path.clone());
                                state.state = SessionState::Paused;

                                // a step stop is reported as such no matter
                                // which table resolved the event
                                let reason = if state.stepping {
                                    StopReason::Step
                                } else {
                                    StopReason::Breakpoint
                                };
                                let cleanup = if state.stepping {
                                    state.stepping = false;
                                    state.registry.clear_all_ephemeral()
                                } else {
                                    Vec::new()
                                };
                                (Some((reason, breakpoint)), cleanup)
                            }
                            None => {
                                // can legitimately happen for a stale ephemeral
                                // breakpoint concurrently being cleared; the
                                // runtime stays paused until the next resume
                                debug!(
                                    ?position,
                                    "Dropping breakpoint event with no registered binding"
                                );
                                (None, Vec::new())
                            }
                        }
                    }
                };

                if let Some((reason, breakpoint)) = stopped {
                    let _ = notify
                        .send(DebugNotification::BreakpointVerificationChanged(breakpoint.clone()));
                    let _ = notify.send(DebugNotification::Stopped { reason, breakpoint });
                }

                // wire-clear the step-over breakpoints outside the lock;
                // persistent entries are never touched here
                for descriptor in step_cleanup {
                    if let Err(err) = command.send(&clear_breakpoint_command(&descriptor)).await {
                        warn!(%err, "Failed to clear a step-over breakpoint after the step");
                    }
                }
            }
            EventItem::Event(RuntimeEvent::Terminated) => {
                let newly_terminated = {
                    let mut state = shared.lock();
                    if matches!(state.state, SessionState::Terminated | SessionState::Error) {
                        false
                    } else {
                        state.registry.clear_all_ephemeral();
                        state.current_pause = None;
                        state.stepping = false;
                        state.state = SessionState::Terminated;
                        true
                    }
                };
                if newly_terminated {
                    info!("Mediation flow terminated");
                    let _ = notify.send(DebugNotification::Terminated);
                }
                return;
            }
            EventItem::Closed(cause) => {
                let newly_failed = {
                    let mut state = shared.lock();
                    if matches!(state.state, SessionState::Terminated | SessionState::Error) {
                        false
                    } else {
                        state.registry.clear_all_ephemeral();
                        state.current_pause = None;
                        state.stepping = false;
                        state.state = SessionState::Error;
                        true
                    }
                };
                if newly_failed {
                    match cause {
                        Some(err) => error!(%err, "Event channel failed; ending the session"),
                        None => warn!("Event channel closed by the runtime; ending the session"),
                    }
                    let _ = notify.send(DebugNotification::Terminated);
                }
                return;
            }
        }
    }
}
