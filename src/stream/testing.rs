//! Scripted transport for exercising channels and sessions without a server

use async_trait::async_trait;
use futures::stream;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::transport::{ByteStream, EventTransport};
use crate::error::{ClientError, Result};
use crate::workflow::RunRequest;

#[derive(Debug, Clone)]
pub enum Script {
    Chunk(Vec<u8>),
    Fail(String),
}

impl Script {
    pub fn chunk(text: &str) -> Self {
        Script::Chunk(text.as_bytes().to_vec())
    }

    pub fn fail(message: &str) -> Self {
        Script::Fail(message.to_string())
    }

    /// One JSON event per line
    pub fn events(events: &[serde_json::Value]) -> Self {
        let mut text = String::new();
        for event in events {
            text.push_str(&event.to_string());
            text.push('\n');
        }
        Script::chunk(&text)
    }
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

pub struct ScriptedTransport {
    script: Vec<Script>,
    hold_open: bool,
    refuse: bool,
    dropped: Arc<AtomicBool>,
    connects: AtomicUsize,
    last_request: Mutex<Option<RunRequest>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Script>) -> Self {
        Self {
            script,
            hold_open: false,
            refuse: false,
            dropped: Arc::new(AtomicBool::new(false)),
            connects: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::new(Vec::new())
        }
    }

    /// Keep the stream pending after the script instead of ending it
    pub fn held_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn stream_dropped(&self) -> bool {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<RunRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventTransport for ScriptedTransport {
    async fn connect(&self, request: &RunRequest) -> Result<ByteStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        if self.refuse {
            return Err(ClientError::Connection("connection refused".to_string()));
        }

        self.dropped.store(false, Ordering::SeqCst);
        let guard = DropFlag(Arc::clone(&self.dropped));

        let items = stream::iter(self.script.clone().into_iter().map(|item| match item {
            Script::Chunk(bytes) => Ok(bytes),
            Script::Fail(message) => Err(ClientError::Connection(message)),
        }));
        let tail: ByteStream = if self.hold_open {
            stream::pending().boxed()
        } else {
            stream::empty().boxed()
        };

        Ok(items
            .chain(tail)
            .map(move |item| {
                let _alive = &guard;
                item
            })
            .boxed())
    }
}
