//! Event Channel
//!
//! Owns the push connection of one workflow run and turns its bytes into
//! [`StreamEvent`]s:
//! - at most one `start` is delivered
//! - delivery stops after the first terminal event (`complete`, `error`, `cache_hit`)
//! - connection failures become a synthetic `error` event, then the channel closes
//! - malformed payloads are logged and skipped
//!
//! The connection is released on every exit path: terminal event, `close()`,
//! failure, or drop.

use futures::StreamExt;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use super::framing::LineDecoder;
use super::transport::{ByteStream, EventTransport};
use crate::workflow::{parse_event, ParseOutcome, RunRequest, StreamEvent, WorkflowKind};

/// Cloneable close switch for a channel
///
/// Checked before every delivery, so closing from inside an event callback
/// stops the very next event. Closing from another task also wakes a channel
/// that is waiting on the network.
#[derive(Debug, Clone, Default)]
pub struct ChannelHandle(Arc<HandleState>);

#[derive(Debug, Default)]
struct HandleState {
    closed: AtomicBool,
    wake: Notify,
}

impl ChannelHandle {
    /// Idempotent
    pub fn close(&self) {
        if !self.0.closed.swap(true, Ordering::SeqCst) {
            self.0.wake.notify_waiters();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::SeqCst)
    }
}

pub struct EventChannel {
    kind: WorkflowKind,
    stream: Option<ByteStream>,
    decoder: LineDecoder,
    pending: VecDeque<StreamEvent>,
    handle: ChannelHandle,
    started: bool,
    delivered: usize,
}

impl EventChannel {
    /// Connect for a run. A failed connection yields a channel whose only
    /// event is the synthetic connection error.
    pub async fn open<T>(transport: &T, request: &RunRequest) -> Self
    where
        T: EventTransport + ?Sized,
    {
        let mut channel = Self {
            kind: request.kind,
            stream: None,
            decoder: LineDecoder::new(),
            pending: VecDeque::new(),
            handle: ChannelHandle::default(),
            started: false,
            delivered: 0,
        };

        match transport.connect(request).await {
            Ok(stream) => {
                info!(kind = %request.kind, "[EventChannel] Connected to {} stream", request.kind);
                channel.stream = Some(stream);
            }
            Err(e) => {
                warn!(kind = %request.kind, error = %e, "[EventChannel] Connection failed");
                channel.pending.push_back(StreamEvent::connection_failed());
            }
        }

        channel
    }

    pub fn kind(&self) -> WorkflowKind {
        self.kind
    }

    pub fn handle(&self) -> ChannelHandle {
        self.handle.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    /// Whether the network connection is still held
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Stop delivery and release the connection. Safe to call repeatedly.
    pub fn close(&mut self) {
        if !self.handle.is_closed() {
            debug!(kind = %self.kind, "[EventChannel] Closing connection");
        }
        self.handle.close();
        self.release();
    }

    /// Deliver every remaining event to `callback`, in arrival order
    pub async fn on_event<F>(&mut self, mut callback: F)
    where
        F: FnMut(StreamEvent),
    {
        while let Some(event) = self.next_event().await {
            callback(event);
        }
    }

    /// Next event, or `None` once the channel is closed
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        loop {
            if self.handle.is_closed() {
                self.release();
                return None;
            }

            if let Some(event) = self.pending.pop_front() {
                if event.is_terminal() {
                    debug!(kind = %self.kind, event = event.type_name(), "[EventChannel] Terminal event");
                    self.close();
                }
                self.delivered += 1;
                return Some(event);
            }

            let Some(stream) = self.stream.as_mut() else {
                // Stream gone without a terminal event
                self.close();
                return None;
            };

            let state = Arc::clone(&self.handle.0);
            let woken = state.wake.notified();
            if state.closed.load(Ordering::SeqCst) {
                continue;
            }

            let next = tokio::select! {
                _ = woken => continue,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(chunk)) => match self.decoder.push(&chunk) {
                    Ok(payloads) => {
                        for payload in payloads {
                            self.accept_payload(&payload);
                        }
                    }
                    Err(overflow) => {
                        warn!(size = overflow.size, "[EventChannel] Line buffer exceeded maximum size");
                        self.fail_connection();
                    }
                },
                Some(Err(e)) => {
                    warn!(error = %e, "[EventChannel] Stream error");
                    self.fail_connection();
                }
                None => {
                    if let Some(payload) = self.decoder.finish() {
                        self.accept_payload(&payload);
                    }
                    debug!(delivered = self.delivered, "[EventChannel] Stream ended");
                    // Harmless when a terminal event is already queued: it closes the channel first
                    self.fail_connection();
                }
            }
        }
    }

    fn accept_payload(&mut self, payload: &str) {
        match parse_event(payload) {
            ParseOutcome::Event(StreamEvent::Start) if self.started => {
                warn!("[EventChannel] Duplicate start event discarded");
            }
            ParseOutcome::Event(event) => {
                if matches!(event, StreamEvent::Start) {
                    self.started = true;
                }
                self.pending.push_back(event);
            }
            ParseOutcome::Unsupported(event_type) => {
                debug!(event_type = %event_type, "[EventChannel] Unsupported event type ignored");
            }
            ParseOutcome::Malformed(reason) => {
                warn!(reason = %reason, payload = %truncate(payload, 200), "[EventChannel] Failed to parse event");
            }
        }
    }

    /// Drop the connection and queue the synthetic error behind what already arrived
    fn fail_connection(&mut self) {
        self.release();
        self.pending.push_back(StreamEvent::connection_failed());
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            debug!(kind = %self.kind, "[EventChannel] Connection released");
        }
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        self.close();
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
