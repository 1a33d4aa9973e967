use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chat_protocol::CancellationSignal;

/// Owns the cancellation flag shared with transports and signal handlers.
#[derive(Debug, Clone, Default)]
pub struct CancellationController {
    signal: CancellationSignal,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps an existing flag, e.g. one registered with a SIGINT handler.
    pub fn from_signal(signal: CancellationSignal) -> Self {
        Self { signal }
    }

    pub fn signal(&self) -> CancellationSignal {
        Arc::clone(&self.signal)
    }

    /// Requests cancellation. Returns `true` only for the call that raised the flag.
    pub fn cancel(&self) -> bool {
        !self.signal.swap(true, Ordering::AcqRel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.signal.load(Ordering::Acquire)
    }

    /// Lowers the flag before a new exchange starts.
    pub fn reset(&self) {
        self.signal.store(false, Ordering::Release);
    }
}

impl From<Arc<AtomicBool>> for CancellationController {
    fn from(signal: Arc<AtomicBool>) -> Self {
        Self::from_signal(signal)
    }
}
