//! Client-side session engine for the agent chat stream.
//!
//! [`Conversation`] is a synchronous state machine: it consumes frames or
//! events, keeps the ordered transcript and tool invocations of the current
//! exchange, and reports every change to a [`SessionObserver`]. The async
//! [`ExchangeDriver`] connects it to a `StreamTransport`, runs diff captures
//! and honours cancellation.

pub mod cancel;
pub mod diff;
pub mod driver;
pub mod error;
pub mod interpreter;
pub mod observer;
pub mod reasoning;
pub mod session;
pub mod transcript;

pub use cancel::CancellationController;
pub use diff::{
    DiffSummary, FileAccess, FileAccessError, FileDiff, InMemoryFiles, OpenDocuments, Snapshot,
};
pub use driver::{ExchangeDriver, DIFF_DRAIN_TIMEOUT};
pub use error::{SendError, SessionError};
pub use interpreter::SessionAction;
pub use observer::{NullObserver, RecordingObserver, SessionObserver};
pub use reasoning::ReasoningFilter;
pub use session::{Conversation, Exchange, ExchangeContext, Phase, STOP_MARKER};
pub use transcript::{
    Advisory, ExchangeOutcome, FinalizedExchange, ToolInvocation, ToolInvocationId, ToolStatus,
    TranscriptBlock,
};
