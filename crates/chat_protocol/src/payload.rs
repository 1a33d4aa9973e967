use serde::{Deserialize, Serialize};

/// Body of a chat stream request.
///
/// Context fields are sent as `null` when absent; `selected_model: null`
/// asks the backend to route automatically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    pub workspace: Option<String>,
    pub current_file: Option<String>,
    pub file_content: Option<String>,
    pub selected_code: Option<String>,
    pub terminal_output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// `provider/model_key`, or `None` for automatic routing.
    pub selected_model: Option<String>,
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_current_file(
        mut self,
        path: impl Into<String>,
        content: Option<String>,
    ) -> Self {
        self.current_file = Some(path.into());
        self.file_content = content;
        self
    }

    pub fn with_selected_code(mut self, code: impl Into<String>) -> Self {
        self.selected_code = Some(code.into());
        self
    }

    pub fn with_terminal_output(mut self, output: impl Into<String>) -> Self {
        self.terminal_output = Some(output.into());
        self
    }

    pub fn with_error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Pins a model; blank or `auto` selects automatic routing.
    pub fn with_selected_model(mut self, model: Option<String>) -> Self {
        self.selected_model = model
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty() && !value.eq_ignore_ascii_case("auto"));
        self
    }
}
