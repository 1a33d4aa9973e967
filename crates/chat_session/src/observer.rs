use crate::session::Phase;
use crate::transcript::{Advisory, FinalizedExchange, ToolInvocation};

/// Receives session changes as they are applied. Every method defaults to a
/// no-op so renderers implement only what they draw.
pub trait SessionObserver {
    fn on_phase_changed(&mut self, _phase: &Phase) {}

    /// Full visible assistant text (reasoning stripped) after a token.
    fn on_text(&mut self, _visible: &str) {}

    fn on_narrative(&mut self, _text: &str) {}

    fn on_tool_started(&mut self, _tool: &ToolInvocation) {}

    fn on_tool_finished(&mut self, _tool: &ToolInvocation) {}

    fn on_diff_ready(&mut self, _tool: &ToolInvocation) {}

    fn on_advisory(&mut self, _advisory: &Advisory) {}

    fn on_finalized(&mut self, _exchange: &FinalizedExchange) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NullObserver;

impl SessionObserver for NullObserver {}

#[derive(Debug, Clone, PartialEq)]
pub enum ObservedEvent {
    Phase(Phase),
    Text(String),
    Narrative(String),
    ToolStarted(ToolInvocation),
    ToolFinished(ToolInvocation),
    DiffReady(ToolInvocation),
    Advisory(Advisory),
    Finalized(Box<FinalizedExchange>),
}

/// Keeps every callback in order; used by headless tests and replays.
#[derive(Debug, Clone, Default)]
pub struct RecordingObserver {
    pub events: Vec<ObservedEvent>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phases(&self) -> Vec<Phase> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::Phase(phase) => Some(phase.clone()),
                _ => None,
            })
            .collect()
    }

    /// Last visible text reported by `on_text`.
    pub fn last_text(&self) -> Option<&str> {
        self.events.iter().rev().find_map(|event| match event {
            ObservedEvent::Text(text) => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn diffs(&self) -> Vec<&ToolInvocation> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ObservedEvent::DiffReady(tool) => Some(tool),
                _ => None,
            })
            .collect()
    }

    pub fn finalized(&self) -> Option<&FinalizedExchange> {
        self.events.iter().rev().find_map(|event| match event {
            ObservedEvent::Finalized(exchange) => Some(exchange.as_ref()),
            _ => None,
        })
    }
}

impl SessionObserver for RecordingObserver {
    fn on_phase_changed(&mut self, phase: &Phase) {
        self.events.push(ObservedEvent::Phase(phase.clone()));
    }

    fn on_text(&mut self, visible: &str) {
        self.events.push(ObservedEvent::Text(visible.to_owned()));
    }

    fn on_narrative(&mut self, text: &str) {
        self.events.push(ObservedEvent::Narrative(text.to_owned()));
    }

    fn on_tool_started(&mut self, tool: &ToolInvocation) {
        self.events.push(ObservedEvent::ToolStarted(tool.clone()));
    }

    fn on_tool_finished(&mut self, tool: &ToolInvocation) {
        self.events.push(ObservedEvent::ToolFinished(tool.clone()));
    }

    fn on_diff_ready(&mut self, tool: &ToolInvocation) {
        self.events.push(ObservedEvent::DiffReady(tool.clone()));
    }

    fn on_advisory(&mut self, advisory: &Advisory) {
        self.events.push(ObservedEvent::Advisory(advisory.clone()));
    }

    fn on_finalized(&mut self, exchange: &FinalizedExchange) {
        self.events
            .push(ObservedEvent::Finalized(Box::new(exchange.clone())));
    }
}
