use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::diff::FileDiff;

/// Client-assigned identity of one tool invocation, monotonic per conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ToolInvocationId(pub u64);

impl fmt::Display for ToolInvocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Running,
    Complete,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolInvocation {
    pub id: ToolInvocationId,
    pub name: String,
    pub call_id: Option<String>,
    pub args: Value,
    pub status: ToolStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub file_path: Option<String>,
    pub diff: Option<FileDiff>,
}

impl ToolInvocation {
    pub fn is_running(&self) -> bool {
        self.status == ToolStatus::Running
    }
}

/// Ordered piece of an assistant turn as it should be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum TranscriptBlock {
    /// Raw token run; reasoning is stripped only when rendering.
    Text(String),
    Narrative(String),
    Tool(ToolInvocationId),
}

/// Backend progress signals that never change the transcript.
#[derive(Debug, Clone, PartialEq)]
pub enum Advisory {
    Classification {
        task_type: String,
        confidence: Option<f64>,
    },
    Iteration {
        current: u32,
        max: u32,
        remaining: Option<u32>,
    },
    IterationWarning(String),
    FileTreeUpdated,
}

impl fmt::Display for Advisory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification {
                task_type,
                confidence: Some(confidence),
            } => write!(f, "task: {task_type} ({:.0}%)", confidence * 100.0),
            Self::Classification { task_type, .. } => write!(f, "task: {task_type}"),
            Self::Iteration { current, max, .. } => write!(f, "iteration {current}/{max}"),
            Self::IterationWarning(message) => write!(f, "warning: {message}"),
            Self::FileTreeUpdated => f.write_str("file tree updated"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed {
        model: Option<String>,
        provider: Option<String>,
    },
    Cancelled,
    /// The backend sent an `error` event.
    Failed {
        message: String,
    },
    /// The stream ended or broke without `done`.
    Truncated {
        reason: Option<String>,
    },
}

impl ExchangeOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Frozen result of one exchange. Only diff fields change after finalize.
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizedExchange {
    pub user_message: String,
    /// Visible assistant text as stored in history.
    pub content: String,
    pub blocks: Vec<TranscriptBlock>,
    pub tools: Vec<ToolInvocation>,
    pub outcome: ExchangeOutcome,
}

impl FinalizedExchange {
    pub fn tool(&self, id: ToolInvocationId) -> Option<&ToolInvocation> {
        self.tools.iter().find(|tool| tool.id == id)
    }

    pub fn tool_by_name(&self, name: &str) -> Option<&ToolInvocation> {
        self.tools.iter().find(|tool| tool.name == name)
    }
}
