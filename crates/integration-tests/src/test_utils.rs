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

//! Mock runtime and language service used by the end-to-end tests.

use std::{
    collections::HashMap,
    net::SocketAddr,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use eyre::Result;
use midbg_common::{
    normalize_path, BreakpointDescriptor, BreakpointValidity, DebuggerConfig, SourcePosition,
};
use midbg_engine::LanguageService;
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpListener,
    sync::mpsc,
    task::JoinHandle,
};

/// Test environment initialization helpers.
pub mod init {
    /// Enable logging for a test process; idempotent.
    pub fn init_test_environment() {
        midbg_common::ensure_test_logging();
    }
}

/// A scripted in-process mediation runtime.
///
/// Listens on two ephemeral ports. The command listener records every
/// received command and answers each with a canned acknowledgement (unless
/// responses are suspended, to provoke timeouts); the event listener
/// forwards whatever events the test pushes.
pub struct MockRuntime {
    command_addr: SocketAddr,
    event_addr: SocketAddr,
    commands: Arc<Mutex<Vec<Value>>>,
    responding: Arc<AtomicBool>,
    event_tx: mpsc::UnboundedSender<String>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockRuntime {
    /// Bind both listeners and start serving.
    pub async fn spawn() -> Result<Self> {
        let command_listener = TcpListener::bind("127.0.0.1:0").await?;
        let event_listener = TcpListener::bind("127.0.0.1:0").await?;
        let command_addr = command_listener.local_addr()?;
        let event_addr = event_listener.local_addr()?;

        let commands = Arc::new(Mutex::new(Vec::new()));
        let responding = Arc::new(AtomicBool::new(true));
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<String>();

        let command_task = tokio::spawn({
            let commands = Arc::clone(&commands);
            let responding = Arc::clone(&responding);
            async move {
                let Ok((mut stream, _)) = command_listener.accept().await else { return };
                let mut pending = Vec::new();
                let mut chunk = [0u8; 1024];
                loop {
                    let Ok(read) = stream.read(&mut chunk).await else { return };
                    if read == 0 {
                        return;
                    }
                    pending.extend_from_slice(&chunk[..read]);
                    while let Some(newline) = pending.iter().position(|byte| *byte == b'\n') {
                        let line: Vec<u8> = pending.drain(..=newline).collect();
                        let line = String::from_utf8_lossy(&line[..line.len() - 1]).to_string();
                        let parsed: Value = match serde_json::from_str(&line) {
                            Ok(value) => value,
                            Err(_) => continue,
                        };
                        let response = canned_response(&parsed);
                        commands.lock().unwrap().push(parsed);
                        if responding.load(Ordering::SeqCst) {
                            if stream.write_all(response.to_string().as_bytes()).await.is_err() {
                                return;
                            }
                            if stream.write_all(b"\n").await.is_err() {
                                return;
                            }
                        }
                    }
                }
            }
        });

        let event_task = tokio::spawn(async move {
            let Ok((mut stream, _)) = event_listener.accept().await else { return };
            while let Some(line) = event_rx.recv().await {
                if stream.write_all(line.as_bytes()).await.is_err() {
                    return;
                }
                if stream.write_all(b"\n").await.is_err() {
                    return;
                }
            }
            // sender gone: drop the socket so the engine sees EOF
        });

        Ok(Self {
            command_addr,
            event_addr,
            commands,
            responding,
            event_tx,
            tasks: vec![command_task, event_task],
        })
    }

    /// A session configuration pointing at this mock, with a short command
    /// timeout so timeout scenarios finish quickly.
    pub fn config(&self) -> DebuggerConfig {
        DebuggerConfig {
            host: "127.0.0.1".to_string(),
            command_port: self.command_addr.port(),
            event_port: self.event_addr.port(),
            command_timeout: Duration::from_millis(500),
        }
    }

    /// Push one event frame to the connected event client.
    pub fn push_event(&self, event: Value) {
        let _ = self.event_tx.send(event.to_string());
    }

    /// Every command received so far.
    pub fn commands(&self) -> Vec<Value> {
        self.commands.lock().unwrap().clone()
    }

    /// Suspend or restore command responses. While suspended, commands are
    /// still recorded but never answered, so callers hit their timeout.
    pub fn set_responding(&self, responding: bool) {
        self.responding.store(responding, Ordering::SeqCst);
    }

    /// Wait until a received command satisfies the predicate.
    pub async fn wait_for_command<F>(&self, predicate: F) -> Value
    where
        F: Fn(&Value) -> bool,
    {
        for _ in 0..250 {
            if let Some(found) = self.commands().into_iter().find(|command| predicate(command)) {
                return found;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected command never arrived; got: {:?}", self.commands());
    }
}

impl Drop for MockRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn canned_response(command: &Value) -> Value {
    if command["command"] == "get" {
        // one representative scope payload; enough to exercise the
        // wire-key renaming
        serde_json::json!({ "synapse-properties": { "prop": "value" } })
    } else {
        serde_json::json!({ "command-response": "successful" })
    }
}

type PositionKey = (String, u32, Option<u32>);

/// A scripted language service oracle.
#[derive(Default)]
pub struct MockLanguageService {
    descriptors: Mutex<HashMap<PositionKey, BreakpointDescriptor>>,
    step_targets: Mutex<HashMap<(String, u32), Vec<SourcePosition>>>,
}

impl MockLanguageService {
    /// Create an empty oracle; every position is invalid until registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a breakable position and the raw descriptor it maps to.
    pub fn register(&self, file_path: &str, position: SourcePosition, raw: Value) {
        let descriptor = BreakpointDescriptor::parse(&raw).expect("valid raw descriptor");
        self.descriptors
            .lock()
            .unwrap()
            .insert(key(file_path, &position), descriptor);
    }

    /// Declare the step-over targets reachable from a line.
    pub fn set_step_targets(&self, file_path: &str, from_line: u32, targets: Vec<SourcePosition>) {
        self.step_targets
            .lock()
            .unwrap()
            .insert((normalize_path(file_path), from_line), targets);
    }
}

fn key(file_path: &str, position: &SourcePosition) -> PositionKey {
    (normalize_path(file_path), position.line, position.column)
}

#[async_trait]
impl LanguageService for MockLanguageService {
    async fn validate_breakpoints(
        &self,
        file_path: &str,
        positions: &[SourcePosition],
    ) -> Result<Vec<BreakpointValidity>> {
        let descriptors = self.descriptors.lock().unwrap();
        Ok(positions
            .iter()
            .map(|position| BreakpointValidity {
                line: position.line,
                column: position.column,
                valid: descriptors.contains_key(&key(file_path, position)),
            })
            .collect())
    }

    async fn breakpoint_info(
        &self,
        file_path: &str,
        positions: &[SourcePosition],
    ) -> Result<Vec<Option<BreakpointDescriptor>>> {
        let descriptors = self.descriptors.lock().unwrap();
        Ok(positions
            .iter()
            .map(|position| descriptors.get(&key(file_path, position)).cloned())
            .collect())
    }

    async fn step_over_targets(
        &self,
        file_path: &str,
        position: &SourcePosition,
    ) -> Result<Vec<SourcePosition>> {
        let targets = self.step_targets.lock().unwrap();
        Ok(targets
            .get(&(normalize_path(file_path), position.line))
            .cloned()
            .unwrap_or_default())
    }
}
