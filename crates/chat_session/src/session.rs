use chat_protocol::{ChatRequest, StreamEvent};
use serde_json::Value;
use session_store::{ChatSession, HistoryStore};

use crate::diff::{
    is_file_mutating, paths_match, tool_file_path, value_file_path, DiffJob, DiffResolution,
    DiffSide, FileDiff, Snapshot, DELETE_FILE_TOOL,
};
use crate::error::{SendError, SessionError};
use crate::interpreter::{interpret, interpret_frame, SessionAction};
use crate::observer::SessionObserver;
use crate::reasoning::ReasoningFilter;
use crate::transcript::{
    ExchangeOutcome, FinalizedExchange, ToolInvocation, ToolInvocationId, ToolStatus,
    TranscriptBlock,
};

/// Appended to the content of an exchange stopped by the user.
pub const STOP_MARKER: &str = "[Generation stopped]";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    AwaitingFirstEvent,
    Streaming,
    Finalizing,
    Cancelled,
    Errored(String),
}

/// Editor context sent along with a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeContext {
    pub workspace: Option<String>,
    pub current_file: Option<String>,
    pub file_content: Option<String>,
    pub selected_code: Option<String>,
    pub terminal_output: Option<String>,
    pub error_message: Option<String>,
}

/// The in-progress half of an exchange, owned by the [`Conversation`].
#[derive(Debug, Clone, PartialEq)]
pub struct Exchange {
    user_message: String,
    raw: String,
    blocks: Vec<TranscriptBlock>,
    tools: Vec<ToolInvocation>,
}

impl Exchange {
    fn new(user_message: impl Into<String>) -> Self {
        Self {
            user_message: user_message.into(),
            raw: String::new(),
            blocks: Vec::new(),
            tools: Vec::new(),
        }
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    /// Token text as received, reasoning included.
    pub fn raw_text(&self) -> &str {
        &self.raw
    }

    pub fn blocks(&self) -> &[TranscriptBlock] {
        &self.blocks
    }

    pub fn tools(&self) -> &[ToolInvocation] {
        &self.tools
    }

    fn push_token(&mut self, content: &str) {
        self.raw.push_str(content);
        if let Some(TranscriptBlock::Text(text)) = self.blocks.last_mut() {
            text.push_str(content);
        } else {
            self.blocks.push(TranscriptBlock::Text(content.to_owned()));
        }
    }

    /// Running invocation a completion refers to: the wire `call_id` when it
    /// matches, then the most recent one with that name whose target matches
    /// `path`, otherwise the most recently started one with that name.
    fn resolve_running(
        &self,
        tool: &str,
        call_id: Option<&str>,
        path: Option<&str>,
    ) -> Option<usize> {
        let running = |index: &usize| self.tools[*index].is_running();
        if let Some(call_id) = call_id {
            let by_call_id = (0..self.tools.len())
                .rev()
                .filter(running)
                .find(|index| self.tools[*index].call_id.as_deref() == Some(call_id));
            if by_call_id.is_some() {
                return by_call_id;
            }
        }
        if let Some(path) = path {
            let by_path = (0..self.tools.len()).rev().filter(running).find(|index| {
                let open = &self.tools[*index];
                open.name == tool
                    && open
                        .file_path
                        .as_deref()
                        .is_some_and(|target| paths_match(target, path))
            });
            if by_path.is_some() {
                return by_path;
            }
        }
        (0..self.tools.len())
            .rev()
            .filter(running)
            .find(|index| self.tools[*index].name == tool)
    }
}

/// One chat conversation: the active exchange, its phase, and history.
///
/// All mutation goes through `&mut self` methods that report to a
/// [`SessionObserver`] and return any diff captures the caller must run.
#[derive(Debug)]
pub struct Conversation {
    phase: Phase,
    history: HistoryStore,
    reasoning: ReasoningFilter,
    exchange: Option<Exchange>,
    last_exchange: Option<FinalizedExchange>,
    next_tool_id: u64,
}

impl Conversation {
    pub fn new(history: HistoryStore) -> Self {
        Self {
            phase: Phase::Idle,
            history,
            reasoning: ReasoningFilter::default(),
            exchange: None,
            last_exchange: None,
            next_tool_id: 1,
        }
    }

    pub fn with_reasoning_filter(mut self, reasoning: ReasoningFilter) -> Self {
        self.reasoning = reasoning;
        self
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_exchange_active(&self) -> bool {
        self.exchange.is_some()
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn active_session(&self) -> &ChatSession {
        self.history.active()
    }

    pub fn current_exchange(&self) -> Option<&Exchange> {
        self.exchange.as_ref()
    }

    pub fn last_exchange(&self) -> Option<&FinalizedExchange> {
        self.last_exchange.as_ref()
    }

    pub fn selected_model(&self) -> Option<&str> {
        self.history.selected_model()
    }

    /// Assistant text of the in-progress exchange with reasoning removed.
    pub fn visible_text(&self) -> String {
        self.exchange
            .as_ref()
            .map(|exchange| self.reasoning.strip(&exchange.raw))
            .unwrap_or_default()
    }

    /// Records the user message and opens an exchange. The returned request
    /// is what the transport should send.
    pub fn send_message(
        &mut self,
        text: &str,
        context: ExchangeContext,
        observer: &mut dyn SessionObserver,
    ) -> Result<ChatRequest, SendError> {
        if self.exchange.is_some() || !matches!(self.phase, Phase::Idle | Phase::Errored(_)) {
            return Err(SendError::ExchangeActive);
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(SendError::EmptyMessage);
        }

        self.history.active_mut().push_user(text);
        if let Err(error) = self.history.save_active() {
            tracing::warn!(%error, "failed to save session after user message");
        }

        self.exchange = Some(Exchange::new(text));
        self.set_phase(Phase::AwaitingFirstEvent, observer);
        tracing::info!(session = %self.history.active().id, "exchange started");

        Ok(ChatRequest {
            query: text.to_owned(),
            workspace: context.workspace,
            current_file: context.current_file,
            file_content: context.file_content,
            selected_code: context.selected_code,
            terminal_output: context.terminal_output,
            error_message: context.error_message,
            selected_model: self.history.selected_model().map(str::to_owned),
        })
    }

    /// Applies one raw frame payload. Unparseable frames are skipped.
    pub fn apply_frame(
        &mut self,
        payload: &str,
        observer: &mut dyn SessionObserver,
    ) -> Vec<DiffJob> {
        if self.exchange.is_none() {
            tracing::debug!("frame received with no active exchange; ignoring");
            return Vec::new();
        }
        match interpret_frame(payload) {
            Some(action) => self.apply_action(action, observer),
            None => Vec::new(),
        }
    }

    pub fn apply_event(
        &mut self,
        event: StreamEvent,
        observer: &mut dyn SessionObserver,
    ) -> Vec<DiffJob> {
        self.apply_action(interpret(event), observer)
    }

    pub fn apply_action(
        &mut self,
        action: SessionAction,
        observer: &mut dyn SessionObserver,
    ) -> Vec<DiffJob> {
        if self.exchange.is_none() {
            tracing::debug!(?action, "event received with no active exchange; ignoring");
            return Vec::new();
        }

        match action {
            SessionAction::AppendToken(content) => {
                self.enter_streaming(observer);
                self.append_token(&content, observer);
                Vec::new()
            }
            SessionAction::Narrative(text) => {
                self.enter_streaming(observer);
                if let Some(exchange) = self.exchange.as_mut() {
                    exchange.blocks.push(TranscriptBlock::Narrative(text.clone()));
                }
                observer.on_narrative(&text);
                Vec::new()
            }
            SessionAction::ToolStarted {
                tool,
                args,
                call_id,
            } => {
                self.enter_streaming(observer);
                self.start_tool(tool, args, call_id, observer)
            }
            SessionAction::ToolCompleted {
                tool,
                result,
                call_id,
            } => self.complete_tool(&tool, result, call_id.as_deref(), observer),
            SessionAction::ToolFailed {
                tool,
                error,
                call_id,
            } => {
                self.fail_tool(&tool, error, call_id.as_deref(), observer);
                Vec::new()
            }
            SessionAction::Advisory(advisory) => {
                observer.on_advisory(&advisory);
                Vec::new()
            }
            SessionAction::Complete { model, provider } => {
                self.finalize(ExchangeOutcome::Completed { model, provider }, observer);
                Vec::new()
            }
            SessionAction::Fail { message } => {
                self.set_phase(Phase::Errored(message.clone()), observer);
                self.finalize(ExchangeOutcome::Failed { message }, observer);
                Vec::new()
            }
        }
    }

    /// Stops the exchange and finalizes what has arrived so far plus
    /// [`STOP_MARKER`]. Returns `false` when there is nothing to cancel.
    pub fn cancel(&mut self, observer: &mut dyn SessionObserver) -> bool {
        if self.exchange.is_none()
            || !matches!(self.phase, Phase::AwaitingFirstEvent | Phase::Streaming)
        {
            return false;
        }
        self.set_phase(Phase::Cancelled, observer);
        self.finalize(ExchangeOutcome::Cancelled, observer);
        true
    }

    /// The transport ended (or broke) without `done`: keep what arrived.
    pub fn finish_stream(
        &mut self,
        reason: Option<String>,
        observer: &mut dyn SessionObserver,
    ) -> bool {
        if self.exchange.is_none() {
            return false;
        }
        tracing::warn!(
            reason = reason.as_deref().unwrap_or("stream ended"),
            "stream ended without done"
        );
        self.finalize(ExchangeOutcome::Truncated { reason }, observer);
        true
    }

    /// Attaches a captured snapshot to its invocation, in the live exchange
    /// or the last finalized one. Returns `false` if the invocation is unknown.
    pub fn apply_diff_resolution(
        &mut self,
        resolution: DiffResolution,
        observer: &mut dyn SessionObserver,
    ) -> bool {
        let id = resolution.invocation;
        let tool = self
            .exchange
            .as_mut()
            .and_then(|exchange| exchange.tools.iter_mut().find(|tool| tool.id == id))
            .or_else(|| {
                self.last_exchange
                    .as_mut()
                    .and_then(|exchange| exchange.tools.iter_mut().find(|tool| tool.id == id))
            });
        let Some(tool) = tool else {
            tracing::debug!(%id, "diff resolution for unknown invocation");
            return false;
        };
        let Some(diff) = tool.diff.as_mut() else {
            return false;
        };

        diff.set(resolution.side, resolution.snapshot);
        if diff.is_settled() && !diff.skipped {
            observer.on_diff_ready(tool);
        }
        true
    }

    /// Marks every unsettled diff of the last finalized exchange as skipped,
    /// for captures that will never land. Returns how many were skipped.
    pub fn skip_pending_diffs(&mut self) -> usize {
        let Some(exchange) = self.last_exchange.as_mut() else {
            return 0;
        };
        let mut skipped = 0;
        for diff in exchange.tools.iter_mut().filter_map(|tool| tool.diff.as_mut()) {
            if !diff.is_settled() {
                diff.skip();
                skipped += 1;
            }
        }
        skipped
    }

    pub fn start_new(&mut self) -> Result<&ChatSession, SessionError> {
        self.ensure_no_exchange()?;
        self.last_exchange = None;
        Ok(self.history.start_new()?)
    }

    pub fn restore(&mut self, id: &str) -> Result<&ChatSession, SessionError> {
        self.ensure_no_exchange()?;
        let restored = self.history.restore(id)?;
        self.last_exchange = None;
        Ok(restored)
    }

    pub fn clear_history(&mut self) -> Result<(), SessionError> {
        self.ensure_no_exchange()?;
        self.last_exchange = None;
        Ok(self.history.clear_all()?)
    }

    /// `None` selects automatic routing.
    pub fn set_selected_model(&mut self, model: Option<String>) -> Result<(), SessionError> {
        Ok(self.history.set_selected_model(model)?)
    }

    fn ensure_no_exchange(&self) -> Result<(), SessionError> {
        if self.exchange.is_some() {
            return Err(SessionError::ExchangeActive);
        }
        Ok(())
    }

    fn set_phase(&mut self, phase: Phase, observer: &mut dyn SessionObserver) {
        if self.phase == phase {
            return;
        }
        tracing::debug!(from = ?self.phase, to = ?phase, "phase change");
        self.phase = phase;
        observer.on_phase_changed(&self.phase);
    }

    fn enter_streaming(&mut self, observer: &mut dyn SessionObserver) {
        if self.phase == Phase::AwaitingFirstEvent {
            self.set_phase(Phase::Streaming, observer);
        }
    }

    fn append_token(&mut self, content: &str, observer: &mut dyn SessionObserver) {
        let Some(exchange) = self.exchange.as_mut() else {
            return;
        };
        exchange.push_token(content);
        let visible = self.reasoning.strip(&exchange.raw);
        observer.on_text(&visible);
    }

    fn start_tool(
        &mut self,
        tool: String,
        args: Value,
        call_id: Option<String>,
        observer: &mut dyn SessionObserver,
    ) -> Vec<DiffJob> {
        let Some(exchange) = self.exchange.as_mut() else {
            return Vec::new();
        };
        if let Some(call_id) = call_id.as_deref() {
            let duplicate = exchange
                .tools
                .iter()
                .any(|open| open.is_running() && open.call_id.as_deref() == Some(call_id));
            if duplicate {
                tracing::warn!(
                    tool = tool.as_str(),
                    call_id,
                    "duplicate tool_start for a running call; skipping"
                );
                return Vec::new();
            }
        }

        let id = ToolInvocationId(self.next_tool_id);
        self.next_tool_id += 1;

        let file_path = if is_file_mutating(&tool) {
            tool_file_path(&args, None)
        } else {
            None
        };
        let invocation = ToolInvocation {
            id,
            name: tool,
            call_id,
            args,
            status: ToolStatus::Running,
            result: None,
            error: None,
            diff: file_path.as_ref().map(|path| FileDiff::pending(path.as_str())),
            file_path: file_path.clone(),
        };
        exchange.blocks.push(TranscriptBlock::Tool(id));
        observer.on_tool_started(&invocation);
        exchange.tools.push(invocation);

        file_path
            .map(|path| {
                vec![DiffJob {
                    invocation: id,
                    side: DiffSide::Before,
                    path,
                }]
            })
            .unwrap_or_default()
    }

    fn complete_tool(
        &mut self,
        tool: &str,
        result: Value,
        call_id: Option<&str>,
        observer: &mut dyn SessionObserver,
    ) -> Vec<DiffJob> {
        let Some(exchange) = self.exchange.as_mut() else {
            return Vec::new();
        };
        let result_path = value_file_path(&result);
        let Some(index) = exchange.resolve_running(tool, call_id, result_path.as_deref()) else {
            tracing::warn!(tool, call_id, "tool_complete matches no running invocation; skipping");
            return Vec::new();
        };

        let invocation = &mut exchange.tools[index];
        invocation.status = ToolStatus::Complete;
        let mut jobs = Vec::new();

        if is_file_mutating(&invocation.name) {
            if invocation.file_path.is_none() {
                invocation.file_path = tool_file_path(&invocation.args, Some(&result));
            }
            let foreign_result = match (&invocation.file_path, &result_path) {
                (Some(target), Some(reported)) => !paths_match(target, reported),
                _ => false,
            };
            if let Some(diff) = invocation.diff.as_mut() {
                if foreign_result {
                    tracing::warn!(
                        tool,
                        path = %diff.path,
                        reported = result_path.as_deref().unwrap_or_default(),
                        "tool_complete reports a different file; skipping diff"
                    );
                    diff.skip();
                } else if invocation.name == DELETE_FILE_TOOL {
                    diff.set(DiffSide::After, Snapshot::Absent);
                } else if let Some(content) = result.get("content").and_then(Value::as_str) {
                    diff.set(DiffSide::After, Snapshot::Present(content.to_owned()));
                } else {
                    jobs.push(DiffJob {
                        invocation: invocation.id,
                        side: DiffSide::After,
                        path: diff.path.clone(),
                    });
                }
            }
        }

        invocation.result = Some(result);
        observer.on_tool_finished(invocation);
        if invocation
            .diff
            .as_ref()
            .is_some_and(|diff| diff.is_settled() && !diff.skipped)
        {
            observer.on_diff_ready(invocation);
        }
        jobs
    }

    fn fail_tool(
        &mut self,
        tool: &str,
        error: String,
        call_id: Option<&str>,
        observer: &mut dyn SessionObserver,
    ) {
        let Some(exchange) = self.exchange.as_mut() else {
            return;
        };
        let Some(index) = exchange.resolve_running(tool, call_id, None) else {
            tracing::warn!(tool, call_id, "tool_error matches no running invocation; skipping");
            return;
        };

        let invocation = &mut exchange.tools[index];
        invocation.status = ToolStatus::Error;
        invocation.error = Some(error);
        if let Some(diff) = invocation.diff.as_mut() {
            diff.skip();
        }
        observer.on_tool_finished(invocation);
    }

    fn finalize(&mut self, outcome: ExchangeOutcome, observer: &mut dyn SessionObserver) {
        let Some(exchange) = self.exchange.take() else {
            return;
        };
        self.set_phase(Phase::Finalizing, observer);

        let visible = self.reasoning.strip(&exchange.raw);
        let content = match &outcome {
            ExchangeOutcome::Cancelled => append_paragraph(visible, STOP_MARKER),
            ExchangeOutcome::Failed { message } => {
                append_paragraph(visible, &format!("Error: {message}"))
            }
            ExchangeOutcome::Completed { .. } | ExchangeOutcome::Truncated { .. } => visible,
        };

        if !content.is_empty() {
            self.history.active_mut().push_assistant(content.clone());
        }
        let saved = self.history.save_active();

        let finalized = FinalizedExchange {
            user_message: exchange.user_message,
            content,
            blocks: exchange.blocks,
            tools: exchange.tools,
            outcome,
        };
        tracing::info!(
            outcome = ?finalized.outcome,
            tools = finalized.tools.len(),
            "exchange finalized"
        );
        observer.on_finalized(&finalized);
        self.last_exchange = Some(finalized);

        match saved {
            Ok(()) => self.set_phase(Phase::Idle, observer),
            Err(error) => {
                tracing::warn!(%error, "failed to save history at finalize");
                self.set_phase(
                    Phase::Errored(format!("failed to save history: {error}")),
                    observer,
                );
            }
        }
    }
}

fn append_paragraph(text: String, paragraph: &str) -> String {
    if text.is_empty() {
        paragraph.to_owned()
    } else {
        format!("{text}\n\n{paragraph}")
    }
}
