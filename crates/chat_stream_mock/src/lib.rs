//! Deterministic scripted implementation of `chat_protocol::StreamTransport`.
//!
//! Scripts are byte-level: a test controls exactly where chunk boundaries
//! fall, when the stream stalls, and whether it fails mid-body. No network is
//! involved.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chat_protocol::{
    is_cancelled, CancellationSignal, ChatApiError, ChatRequest, ChunkStream, StreamTransport,
};
use futures_util::StreamExt;
use serde_json::{json, Value};

/// Stable provider identifier used for explicit startup selection.
pub const MOCK_PROVIDER_ID: &str = "mock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Bytes(Vec<u8>),
    Delay(Duration),
    /// Yields a transport error; the stream ends after it.
    Fail(String),
    /// Never yields again.
    Hang,
}

/// One scripted response body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Script {
    open_error: Option<String>,
    steps: Vec<Step>,
}

impl Script {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails `open_stream` itself, before any body is produced.
    #[must_use]
    pub fn reject(message: impl Into<String>) -> Self {
        Self {
            open_error: Some(message.into()),
            steps: Vec::new(),
        }
    }

    /// Appends one `data: <json>` frame followed by a blank line.
    #[must_use]
    pub fn event(self, event: Value) -> Self {
        self.raw(format!("data: {event}\n\n"))
    }

    #[must_use]
    pub fn raw(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push(Step::Bytes(bytes.into()));
        self
    }

    #[must_use]
    pub fn token(self, content: &str) -> Self {
        self.event(json!({"type": "token", "content": content}))
    }

    #[must_use]
    pub fn message(self, content: &str) -> Self {
        self.event(json!({"type": "message", "content": content}))
    }

    #[must_use]
    pub fn tool_start(self, tool: &str, args: Value) -> Self {
        self.event(json!({"type": "tool_start", "tool": tool, "args": args}))
    }

    #[must_use]
    pub fn tool_complete(self, tool: &str, result: Value) -> Self {
        self.event(json!({"type": "tool_complete", "tool": tool, "result": result}))
    }

    #[must_use]
    pub fn tool_error(self, tool: &str, error: &str) -> Self {
        self.event(json!({"type": "tool_error", "tool": tool, "error": error}))
    }

    #[must_use]
    pub fn done(self) -> Self {
        self.event(json!({"type": "done", "model": MOCK_PROVIDER_ID, "provider": MOCK_PROVIDER_ID}))
    }

    #[must_use]
    pub fn error(self, message: &str) -> Self {
        self.event(json!({"type": "error", "message": message}))
    }

    #[must_use]
    pub fn delay(mut self, delay: Duration) -> Self {
        self.steps.push(Step::Delay(delay));
        self
    }

    #[must_use]
    pub fn fail(mut self, message: impl Into<String>) -> Self {
        self.steps.push(Step::Fail(message.into()));
        self
    }

    #[must_use]
    pub fn hang(mut self) -> Self {
        self.steps.push(Step::Hang);
        self
    }

    /// Re-cuts all byte steps into chunks of at most `size` bytes, ignoring
    /// frame and UTF-8 boundaries. Non-byte steps keep their position.
    #[must_use]
    pub fn rechunk(self, size: usize) -> Self {
        let size = size.max(1);
        let mut steps = Vec::with_capacity(self.steps.len());
        let mut pending: Vec<u8> = Vec::new();

        for step in self.steps {
            match step {
                Step::Bytes(bytes) => pending.extend(bytes),
                other => {
                    flush_chunks(&mut pending, size, &mut steps);
                    steps.push(other);
                }
            }
        }
        flush_chunks(&mut pending, size, &mut steps);

        Self {
            open_error: self.open_error,
            steps,
        }
    }

    #[must_use]
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Concatenated body bytes, ignoring delays and failures.
    #[must_use]
    pub fn body(&self) -> Vec<u8> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                Step::Bytes(bytes) => Some(bytes.as_slice()),
                _ => None,
            })
            .flatten()
            .copied()
            .collect()
    }
}

fn flush_chunks(pending: &mut Vec<u8>, size: usize, steps: &mut Vec<Step>) {
    for chunk in pending.chunks(size) {
        steps.push(Step::Bytes(chunk.to_vec()));
    }
    pending.clear();
}

/// Replays queued [`Script`]s, one per `open_stream` call. With the queue
/// empty it streams a canned demo exchange echoing the query.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<VecDeque<Script>>,
    requests: Mutex<Vec<ChatRequest>>,
    token_delay: Duration,
}

impl ScriptedTransport {
    const DEMO_TOKEN_DELAY_MS: u64 = 30;

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for offline runs: demo exchanges with a visible token cadence.
    #[must_use]
    pub fn demo() -> Self {
        Self {
            token_delay: Duration::from_millis(Self::DEMO_TOKEN_DELAY_MS),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_script(self, script: Script) -> Self {
        self.push_script(script);
        self
    }

    pub fn push_script(&self, script: Script) {
        lock_unpoisoned(&self.scripts).push_back(script);
    }

    #[must_use]
    pub fn requests(&self) -> Vec<ChatRequest> {
        lock_unpoisoned(&self.requests).clone()
    }

    #[must_use]
    pub fn pending_scripts(&self) -> usize {
        lock_unpoisoned(&self.scripts).len()
    }

    fn demo_script(&self, request: &ChatRequest) -> Script {
        let mut script = Script::new()
            .event(json!({"type": "classification", "task_type": "chat", "confidence": 0.9}))
            .token("<think>Echo the question back.</think>");

        let reply = format!("Mock reply to: {}", request.query.trim());
        for word in reply.split_inclusive(' ') {
            script = script.delay(self.token_delay).token(word);
        }

        script
            .delay(self.token_delay)
            .tool_start("search_files", json!({"query": request.query}))
            .delay(self.token_delay)
            .tool_complete("search_files", json!({"matches": 0}))
            .message("No workspace files matched.")
            .done()
    }
}

#[async_trait]
impl StreamTransport for ScriptedTransport {
    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
    ) -> Result<ChunkStream, ChatApiError> {
        lock_unpoisoned(&self.requests).push(request.clone());

        if is_cancelled(cancel) {
            return Err(ChatApiError::Cancelled);
        }

        let queued = lock_unpoisoned(&self.scripts).pop_front();
        let script = match queued {
            Some(script) => script,
            None => {
                tracing::debug!("no scripted response queued; streaming demo exchange");
                self.demo_script(request)
            }
        };

        if let Some(message) = script.open_error {
            return Err(ChatApiError::Unknown(message));
        }

        Ok(play(script.steps))
    }
}

fn play(steps: Vec<Step>) -> ChunkStream {
    futures_util::stream::unfold(steps.into_iter(), |mut steps| async move {
        loop {
            match steps.next()? {
                Step::Bytes(bytes) => return Some((Ok(bytes), steps)),
                Step::Delay(delay) => tokio::time::sleep(delay).await,
                Step::Fail(message) => {
                    return Some((Err(ChatApiError::Unknown(message)), Vec::new().into_iter()))
                }
                Step::Hang => std::future::pending::<()>().await,
            }
        }
    })
    .boxed()
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
