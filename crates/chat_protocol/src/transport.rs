use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::error::ChatApiError;
use crate::payload::ChatRequest;

/// Cancellation flag shared between the UI, the transport and the session driver.
pub type CancellationSignal = Arc<AtomicBool>;

/// Raw body chunks in arrival order. Chunk boundaries carry no meaning.
pub type ChunkStream = BoxStream<'static, Result<Vec<u8>, ChatApiError>>;

pub const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Opens one chat stream. Implemented by the HTTP client and by scripted
/// transports in tests.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open_stream(
        &self,
        request: &ChatRequest,
        cancel: &CancellationSignal,
    ) -> Result<ChunkStream, ChatApiError>;
}

pub fn new_cancellation_signal() -> CancellationSignal {
    Arc::new(AtomicBool::new(false))
}

pub fn is_cancelled(cancel: &CancellationSignal) -> bool {
    cancel.load(Ordering::Acquire)
}

/// Awaits `future` while polling `cancel` every [`CANCEL_POLL_INTERVAL`].
pub async fn await_or_cancel<F>(
    future: F,
    cancel: &CancellationSignal,
) -> Result<F::Output, ChatApiError>
where
    F: Future,
{
    let mut future = Box::pin(future);

    loop {
        if is_cancelled(cancel) {
            return Err(ChatApiError::Cancelled);
        }

        if let Ok(output) = tokio::time::timeout(CANCEL_POLL_INTERVAL, &mut future).await {
            if is_cancelled(cancel) {
                return Err(ChatApiError::Cancelled);
            }
            return Ok(output);
        }
    }
}
