use std::sync::Arc;
use std::time::Duration;

use chat_protocol::transport::{await_or_cancel, CANCEL_POLL_INTERVAL};
use chat_protocol::{ChatRequest, FrameDecoder, StreamTransport};
use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use tokio::time::MissedTickBehavior;

use crate::cancel::CancellationController;
use crate::diff::{
    find_open_document, DiffJob, DiffResolution, DiffSide, FileAccess, NoFileAccess,
    NoOpenDocuments, OpenDocuments, Snapshot,
};
use crate::error::SendError;
use crate::observer::SessionObserver;
use crate::session::{Conversation, ExchangeContext};
use crate::transcript::ExchangeOutcome;

type PendingDiffs = FuturesUnordered<BoxFuture<'static, DiffResolution>>;

/// How long a finalized exchange waits for outstanding diff captures.
pub const DIFF_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs exchanges: opens the stream, feeds frames to the [`Conversation`],
/// runs diff captures, and watches the cancellation flag.
///
/// Everything happens on the calling task; `tokio::select!` multiplexes the
/// next chunk, finished diff reads and a cancellation poll.
pub struct ExchangeDriver {
    transport: Arc<dyn StreamTransport>,
    files: Arc<dyn FileAccess>,
    documents: Arc<dyn OpenDocuments>,
    cancel: CancellationController,
    diff_drain_timeout: Duration,
}

impl ExchangeDriver {
    pub fn new(transport: Arc<dyn StreamTransport>) -> Self {
        Self {
            transport,
            files: Arc::new(NoFileAccess),
            documents: Arc::new(NoOpenDocuments),
            cancel: CancellationController::new(),
            diff_drain_timeout: DIFF_DRAIN_TIMEOUT,
        }
    }

    pub fn with_file_access(mut self, files: Arc<dyn FileAccess>) -> Self {
        self.files = files;
        self
    }

    pub fn with_open_documents(mut self, documents: Arc<dyn OpenDocuments>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationController) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_diff_drain_timeout(mut self, timeout: Duration) -> Self {
        self.diff_drain_timeout = timeout;
        self
    }

    pub fn cancellation(&self) -> &CancellationController {
        &self.cancel
    }

    /// Sends `text` and drives the exchange to its end. The cancellation flag
    /// is not lowered here; callers reset it before a new exchange.
    pub async fn send(
        &self,
        conversation: &mut Conversation,
        text: &str,
        context: ExchangeContext,
        observer: &mut dyn SessionObserver,
    ) -> Result<ExchangeOutcome, SendError> {
        let request = conversation.send_message(text, context, observer)?;
        Ok(self.drive(conversation, request, observer).await)
    }

    /// Streams `request` into the conversation's open exchange until it is
    /// finalized, then drains outstanding diff captures.
    pub async fn drive(
        &self,
        conversation: &mut Conversation,
        request: ChatRequest,
        observer: &mut dyn SessionObserver,
    ) -> ExchangeOutcome {
        if !conversation.is_exchange_active() {
            tracing::debug!("drive called without an open exchange");
            return last_outcome(conversation);
        }

        let signal = self.cancel.signal();
        let opened = await_or_cancel(self.transport.open_stream(&request, &signal), &signal).await;
        let mut stream = match opened {
            Ok(Ok(stream)) => stream,
            Ok(Err(error)) | Err(error) => {
                if error.is_cancelled() || self.cancel.is_cancelled() {
                    conversation.cancel(observer);
                } else {
                    tracing::warn!(%error, "failed to open chat stream");
                    conversation.finish_stream(Some(error.to_string()), observer);
                }
                return last_outcome(conversation);
            }
        };

        let mut decoder = FrameDecoder::default();
        let mut pending = PendingDiffs::new();
        let mut poll = tokio::time::interval(CANCEL_POLL_INTERVAL);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while conversation.is_exchange_active() {
            if self.cancel.is_cancelled() {
                conversation.cancel(observer);
                conversation.skip_pending_diffs();
                tracing::info!(dropped_diffs = pending.len(), "exchange cancelled");
                return last_outcome(conversation);
            }

            tokio::select! {
                biased;
                _ = poll.tick() => {}
                Some(resolution) = pending.next(), if !pending.is_empty() => {
                    conversation.apply_diff_resolution(resolution, observer);
                }
                chunk = stream.next() => match chunk {
                    Some(Ok(bytes)) => {
                        for frame in decoder.feed(&bytes) {
                            let jobs = conversation.apply_frame(&frame, observer);
                            self.schedule(jobs, conversation, &mut pending, observer);
                            if !conversation.is_exchange_active() || self.cancel.is_cancelled() {
                                break;
                            }
                        }
                    }
                    Some(Err(error)) => {
                        tracing::warn!(%error, "chat stream failed");
                        conversation.finish_stream(Some(error.to_string()), observer);
                    }
                    None => {
                        conversation.finish_stream(None, observer);
                    }
                },
            }
        }

        drop(stream);
        decoder.finish();

        let drain = async {
            while !pending.is_empty() {
                if self.cancel.is_cancelled() {
                    break;
                }
                tokio::select! {
                    biased;
                    _ = poll.tick() => {}
                    Some(resolution) = pending.next() => {
                        conversation.apply_diff_resolution(resolution, observer);
                    }
                }
            }
        };
        if tokio::time::timeout(self.diff_drain_timeout, drain).await.is_err() {
            tracing::warn!(
                dropped = pending.len(),
                timeout_ms = self.diff_drain_timeout.as_millis() as u64,
                "diff captures did not finish in time"
            );
        } else if !pending.is_empty() {
            tracing::debug!(dropped = pending.len(), "dropping pending diff captures");
        }
        conversation.skip_pending_diffs();

        last_outcome(conversation)
    }

    fn schedule(
        &self,
        jobs: Vec<DiffJob>,
        conversation: &mut Conversation,
        pending: &mut PendingDiffs,
        observer: &mut dyn SessionObserver,
    ) {
        for job in jobs {
            if job.side == DiffSide::Before {
                if let Some(content) = find_open_document(self.documents.as_ref(), &job.path) {
                    conversation.apply_diff_resolution(job.resolve(Snapshot::Present(content)), observer);
                    continue;
                }
            }
            let files = Arc::clone(&self.files);
            pending.push(async move { job.read(files.as_ref()).await }.boxed());
        }
    }
}

fn last_outcome(conversation: &Conversation) -> ExchangeOutcome {
    conversation
        .last_exchange()
        .map(|exchange| exchange.outcome.clone())
        .unwrap_or(ExchangeOutcome::Truncated { reason: None })
}
