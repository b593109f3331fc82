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

//! Transport channels to the mediation runtime.
//!
//! The runtime exposes two independent TCP sockets while running in debug
//! mode. Both frame messages as one JSON object per `\n`-terminated line:
//!
//! - the **command channel** is strict request/response. Frames carry no
//!   correlation ids, so a response is matched to a request purely by being
//!   the next complete frame received; pipelining is forbidden and modeled
//!   explicitly as a one-slot async mutex around the socket.
//! - the **event channel** is push-only. A spawned read loop frames lines,
//!   parses [`RuntimeEvent`]s and forwards them to the session coordinator.

use std::time::Duration;

use midbg_common::{DebugError, DebugResult, RuntimeEvent};
use serde_json::Value;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::timeout,
};
use tracing::{debug, warn};

const READ_CHUNK_SIZE: usize = 4096;

/// Accumulates raw socket bytes and yields complete `\n`-terminated frames.
///
/// A single read may carry several complete frames, a partial frame, or
/// both; every complete line must be drained before waiting for more data,
/// and the trailing partial line is retained and prefixed to the next chunk.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of raw bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.pending.extend_from_slice(chunk);
    }

    /// Pop the next complete frame, without its terminating newline.
    ///
    /// Framing splits on raw bytes and decodes one whole line at a time, so
    /// a multi-byte character straddling two reads is reassembled before
    /// decoding.
    pub fn next_frame(&mut self) -> Option<String> {
        let newline = self.pending.iter().position(|byte| *byte == b'\n')?;
        let frame: Vec<u8> = self.pending.drain(..=newline).collect();
        Some(String::from_utf8_lossy(&frame[..frame.len() - 1]).into_owned())
    }
}

struct CommandIo {
    stream: TcpStream,
    buffer: LineBuffer,
}

impl CommandIo {
    async fn next_frame(&mut self) -> DebugResult<String> {
        loop {
            if let Some(frame) = self.buffer.next_frame() {
                return Ok(frame);
            }
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = self.stream.read(&mut chunk).await?;
            if read == 0 {
                return Err(DebugError::Protocol(
                    "command channel closed by the runtime".to_string(),
                ));
            }
            self.buffer.extend(&chunk[..read]);
        }
    }
}

/// The synchronous request/response channel.
///
/// At most one command may be outstanding at a time; the internal mutex is
/// the sequencing invariant, not an incidental detail, because responses are
/// correlated to requests by frame order alone.
pub struct CommandChannel {
    io: Mutex<CommandIo>,
    response_timeout: Duration,
}

impl CommandChannel {
    /// Connect to the runtime's command port.
    pub async fn connect(host: &str, port: u16, response_timeout: Duration) -> DebugResult<Self> {
        let stream = TcpStream::connect((host, port)).await?;
        debug!(host, port, "Connected to runtime command channel");
        Ok(Self::from_stream(stream, response_timeout))
    }

    /// Wrap an already-connected stream.
    pub fn from_stream(stream: TcpStream, response_timeout: Duration) -> Self {
        Self {
            io: Mutex::new(CommandIo { stream, buffer: LineBuffer::new() }),
            response_timeout,
        }
    }

    /// Send one command and await its response frame.
    ///
    /// Fails with [`DebugError::Timeout`] when no response arrives in time;
    /// the command is never retried here - the caller decides.
    pub async fn send(&self, command: &Value) -> DebugResult<String> {
        let payload = serde_json::to_string(command)
            .map_err(|err| DebugError::Protocol(format!("unserializable command: {err}")))?;

        // one-slot queue: a second caller parks here until the first
        // response frame has been consumed
        let mut io = self.io.lock().await;

        debug!(command = %payload, "Sending runtime command");
        io.stream.write_all(payload.as_bytes()).await?;
        io.stream.write_all(b"\n").await?;

        match timeout(self.response_timeout, io.next_frame()).await {
            Ok(response) => {
                let response = response?;
                debug!(response = %response, "Received command response");
                Ok(response)
            }
            Err(_) => Err(DebugError::Timeout(self.response_timeout)),
        }
    }
}

/// One item delivered by the event channel read loop.
#[derive(Debug)]
pub enum EventItem {
    /// A parsed runtime event.
    Event(RuntimeEvent),
    /// The socket closed; `None` for an orderly EOF, `Some` for an error.
    Closed(Option<std::io::Error>),
}

/// The asynchronous push channel.
///
/// Owns the background read loop; dropping the channel aborts it.
pub struct EventChannel {
    reader: JoinHandle<()>,
}

impl EventChannel {
    /// Connect to the runtime's event port and start the read loop.
    ///
    /// Returns the channel handle and the receiving end of the event stream.
    /// Unparseable event lines are logged and skipped so a single malformed
    /// frame cannot stall the session; a socket error is delivered as a
    /// final [`EventItem::Closed`].
    pub async fn connect(
        host: &str,
        port: u16,
    ) -> DebugResult<(Self, mpsc::UnboundedReceiver<EventItem>)> {
        let stream = TcpStream::connect((host, port)).await?;
        debug!(host, port, "Connected to runtime event channel");

        let (tx, rx) = mpsc::unbounded_channel();
        let reader = tokio::spawn(Self::read_loop(stream, tx));

        Ok((Self { reader }, rx))
    }

    async fn read_loop(mut stream: TcpStream, tx: mpsc::UnboundedSender<EventItem>) {
        let mut buffer = LineBuffer::new();
        let mut chunk = [0u8; READ_CHUNK_SIZE];
        loop {
            match stream.read(&mut chunk).await {
                Ok(0) => {
                    let _ = tx.send(EventItem::Closed(None));
                    return;
                }
                Ok(read) => {
                    buffer.extend(&chunk[..read]);
                    while let Some(frame) = buffer.next_frame() {
                        debug!(event = %frame, "Event received");
                        match RuntimeEvent::parse(&frame) {
                            Ok(event) => {
                                if tx.send(EventItem::Event(event)).is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                // distinct from the expected stale-ephemeral
                                // drop in the coordinator: this line never
                                // reached the registry at all
                                warn!(%err, "Dropping unparseable event frame");
                            }
                        }
                    }
                }
                Err(err) => {
                    let _ = tx.send(EventItem::Closed(Some(err)));
                    return;
                }
            }
        }
    }

    /// Stop the read loop.
    pub fn shutdown(&self) {
        self.reader.abort();
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio::net::TcpListener;

    #[test]
    fn test_line_buffer_joined_frames() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(buffer.next_frame().as_deref(), Some("{\"a\":1}"));
        assert_eq!(buffer.next_frame().as_deref(), Some("{\"b\":2}"));
        assert_eq!(buffer.next_frame(), None);
    }

    #[test]
    fn test_line_buffer_split_frame() {
        let mut buffer = LineBuffer::new();
        buffer.extend(b"{\"comm");
        assert_eq!(buffer.next_frame(), None);
        buffer.extend(b"and\":\"resume\"}\n{\"par");
        assert_eq!(buffer.next_frame().as_deref(), Some("{\"command\":\"resume\"}"));
        assert_eq!(buffer.next_frame(), None);
        buffer.extend(b"tial\":true}\n");
        assert_eq!(buffer.next_frame().as_deref(), Some("{\"partial\":true}"));
    }

    #[test]
    fn test_line_buffer_reassembles_multibyte_char_split_across_reads() {
        let frame = "{\"sequence-key\":\"séq\"}\n".as_bytes();
        // split in the middle of the two-byte 'é'
        let split = frame.iter().position(|byte| *byte == 0xC3).unwrap() + 1;

        let mut buffer = LineBuffer::new();
        buffer.extend(&frame[..split]);
        assert_eq!(buffer.next_frame(), None);
        buffer.extend(&frame[split..]);
        assert_eq!(buffer.next_frame().as_deref(), Some("{\"sequence-key\":\"séq\"}"));
    }

    #[tokio::test]
    async fn test_command_channel_roundtrip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 1024];
            let n = stream.read(&mut buf).await.unwrap();
            assert!(buf[..n].ends_with(b"\n"));
            // respond in two writes to exercise frame accumulation
            stream.write_all(b"{\"command-resp").await.unwrap();
            stream.write_all(b"onse\":\"successful\"}\n").await.unwrap();
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let channel = CommandChannel::from_stream(stream, Duration::from_secs(5));
        let response = channel.send(&json!({"command": "resume"})).await.unwrap();
        assert_eq!(response, "{\"command-response\":\"successful\"}");

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_command_channel_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        // accept but never respond
        let server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let stream = TcpStream::connect(addr).await.unwrap();
        let channel = CommandChannel::from_stream(stream, Duration::from_millis(100));
        let err = channel.send(&json!({"command": "resume"})).await.unwrap_err();
        assert!(matches!(err, DebugError::Timeout(_)));

        server.abort();
    }

    #[tokio::test]
    async fn test_event_channel_delivers_events_and_eof() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream
                .write_all(
                    b"{\"event\":\"breakpoint\",\"sequence\":{\"sequence-key\":\"s\",\"mediator-position\":\"0\"}}\nnot-json\n{\"event\":\"terminated\"}\n",
                )
                .await
                .unwrap();
            // drop => EOF
        });

        let (_channel, mut rx) =
            EventChannel::connect("127.0.0.1", addr.port()).await.unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, EventItem::Event(RuntimeEvent::Breakpoint(_))));
        // the unparseable line is skipped
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, EventItem::Event(RuntimeEvent::Terminated)));
        let third = rx.recv().await.unwrap();
        assert!(matches!(third, EventItem::Closed(None)));

        server.await.unwrap();
    }
}
