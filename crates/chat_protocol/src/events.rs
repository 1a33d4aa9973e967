use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One protocol event as emitted by the agent backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    Token {
        content: String,
    },
    /// Narrative aside rendered as its own block.
    Message {
        content: String,
    },
    Classification {
        #[serde(alias = "taskType")]
        task_type: String,
        #[serde(default)]
        confidence: Option<f64>,
    },
    Iteration {
        current: u32,
        max: u32,
        #[serde(default)]
        remaining: Option<u32>,
    },
    IterationWarning {
        message: String,
    },
    ToolStart {
        tool: String,
        #[serde(default)]
        args: Value,
        #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    ToolComplete {
        tool: String,
        #[serde(default)]
        result: Value,
        #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    ToolError {
        tool: String,
        #[serde(default)]
        error: Value,
        #[serde(default, alias = "id", skip_serializing_if = "Option::is_none")]
        call_id: Option<String>,
    },
    FileTreeUpdated {},
    Done {
        #[serde(default)]
        model: Option<String>,
        #[serde(default)]
        provider: Option<String>,
    },
    Error {
        #[serde(default)]
        message: String,
    },
}

impl StreamEvent {
    /// Wire name of the `type` discriminant.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Message { .. } => "message",
            Self::Classification { .. } => "classification",
            Self::Iteration { .. } => "iteration",
            Self::IterationWarning { .. } => "iteration_warning",
            Self::ToolStart { .. } => "tool_start",
            Self::ToolComplete { .. } => "tool_complete",
            Self::ToolError { .. } => "tool_error",
            Self::FileTreeUpdated {} => "file_tree_updated",
            Self::Done { .. } => "done",
            Self::Error { .. } => "error",
        }
    }

    /// True for events that end the exchange.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done { .. } | Self::Error { .. })
    }
}

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[source] serde_json::Error),

    #[error("frame has no string `type` field")]
    MissingType,

    #[error("unknown event type `{0}`")]
    UnknownType(String),

    #[error("malformed `{event_type}` event: {source}")]
    Shape {
        event_type: String,
        #[source]
        source: serde_json::Error,
    },
}

const KNOWN_TYPES: [&str; 11] = [
    "token",
    "message",
    "classification",
    "iteration",
    "iteration_warning",
    "tool_start",
    "tool_complete",
    "tool_error",
    "file_tree_updated",
    "done",
    "error",
];

/// Parse one frame payload into a typed event.
pub fn parse_event(payload: &str) -> Result<StreamEvent, EventParseError> {
    let value: Value = serde_json::from_str(payload).map_err(EventParseError::Json)?;
    let event_type = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(EventParseError::MissingType)?
        .to_owned();

    if !KNOWN_TYPES.contains(&event_type.as_str()) {
        return Err(EventParseError::UnknownType(event_type));
    }

    serde_json::from_value(value).map_err(|source| EventParseError::Shape { event_type, source })
}

/// Renders a JSON payload as display text: strings verbatim, everything else compact JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
