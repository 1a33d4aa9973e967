use chat_protocol::events::value_text;
use chat_protocol::{parse_event, StreamEvent};
use serde_json::Value;

use crate::transcript::Advisory;

/// Typed instruction for the session state machine, one per wire event.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    AppendToken(String),
    Narrative(String),
    ToolStarted {
        tool: String,
        args: Value,
        call_id: Option<String>,
    },
    ToolCompleted {
        tool: String,
        result: Value,
        call_id: Option<String>,
    },
    ToolFailed {
        tool: String,
        error: String,
        call_id: Option<String>,
    },
    Advisory(Advisory),
    Complete {
        model: Option<String>,
        provider: Option<String>,
    },
    Fail {
        message: String,
    },
}

pub fn interpret(event: StreamEvent) -> SessionAction {
    match event {
        StreamEvent::Token { content } => SessionAction::AppendToken(content),
        StreamEvent::Message { content } => SessionAction::Narrative(content),
        StreamEvent::Classification {
            task_type,
            confidence,
        } => SessionAction::Advisory(Advisory::Classification {
            task_type,
            confidence,
        }),
        StreamEvent::Iteration {
            current,
            max,
            remaining,
        } => SessionAction::Advisory(Advisory::Iteration {
            current,
            max,
            remaining,
        }),
        StreamEvent::IterationWarning { message } => {
            SessionAction::Advisory(Advisory::IterationWarning(message))
        }
        StreamEvent::ToolStart {
            tool,
            args,
            call_id,
        } => SessionAction::ToolStarted {
            tool,
            args,
            call_id,
        },
        StreamEvent::ToolComplete {
            tool,
            result,
            call_id,
        } => SessionAction::ToolCompleted {
            tool,
            result,
            call_id,
        },
        StreamEvent::ToolError {
            tool,
            error,
            call_id,
        } => SessionAction::ToolFailed {
            tool,
            error: value_text(&error),
            call_id,
        },
        StreamEvent::FileTreeUpdated {} => SessionAction::Advisory(Advisory::FileTreeUpdated),
        StreamEvent::Done { model, provider } => SessionAction::Complete { model, provider },
        StreamEvent::Error { message } => SessionAction::Fail { message },
    }
}

/// Parses and interprets one frame payload. Bad frames are logged and skipped.
pub fn interpret_frame(payload: &str) -> Option<SessionAction> {
    match parse_event(payload) {
        Ok(event) => {
            tracing::debug!(kind = event.kind(), "frame");
            Some(interpret(event))
        }
        Err(error) => {
            tracing::warn!(%error, payload = truncate_for_log(payload), "skipping frame");
            None
        }
    }
}

fn truncate_for_log(payload: &str) -> &str {
    const LIMIT: usize = 120;
    match payload.char_indices().nth(LIMIT) {
        Some((index, _)) => &payload[..index],
        None => payload,
    }
}
