use std::io::Write;

use chat_session::{
    Advisory, ExchangeOutcome, FinalizedExchange, Phase, SessionObserver, ToolInvocation,
    ToolStatus,
};

/// Line-oriented transcript renderer for a plain terminal.
///
/// Assistant text is written as deltas of the exchange's visible text, which
/// keeps growing across tool and narrative lines. When the visible
/// text stops extending what was already printed (a reasoning tag closed over
/// text shown earlier), the full text is reprinted on a new line.
pub struct TerminalRenderer<W: Write> {
    out: W,
    printed: String,
    /// Output ends mid-line.
    open_line: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            printed: String::new(),
            open_line: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Err(error) = self
            .out
            .write_all(text.as_bytes())
            .and_then(|()| self.out.flush())
        {
            tracing::debug!(%error, "failed to write transcript output");
            return;
        }
        self.open_line = !text.ends_with('\n');
    }

    fn write_line(&mut self, line: &str) {
        if self.open_line {
            self.write_text("\n");
        }
        self.write_text(&format!("{line}\n"));
    }
}

impl<W: Write> SessionObserver for TerminalRenderer<W> {
    fn on_phase_changed(&mut self, phase: &Phase) {
        match phase {
            Phase::AwaitingFirstEvent => self.printed.clear(),
            Phase::Errored(message) if message.starts_with("failed to save") => {
                self.write_line(&format!("[warning] {message}"));
            }
            _ => {}
        }
    }

    fn on_text(&mut self, visible: &str) {
        if let Some(delta) = visible.strip_prefix(self.printed.as_str()) {
            self.write_text(delta);
        } else {
            if self.open_line {
                self.write_text("\n");
            }
            self.write_text(visible);
        }
        self.printed = visible.to_owned();
    }

    fn on_narrative(&mut self, text: &str) {
        self.write_line(text);
    }

    fn on_tool_started(&mut self, tool: &ToolInvocation) {
        let target = tool.file_path.as_deref().unwrap_or("");
        let line = format!("[{}] {} {target}", tool.id, tool.name);
        self.write_line(line.trim_end());
    }

    fn on_tool_finished(&mut self, tool: &ToolInvocation) {
        let line = match tool.status {
            ToolStatus::Error => format!(
                "[{}] {} failed: {}",
                tool.id,
                tool.name,
                tool.error.as_deref().unwrap_or("unknown error")
            ),
            _ => format!("[{}] {} done", tool.id, tool.name),
        };
        self.write_line(&line);
    }

    fn on_diff_ready(&mut self, tool: &ToolInvocation) {
        let Some(diff) = &tool.diff else {
            return;
        };
        let line = match (diff.changed, diff.summary) {
            (Some(true), Some(summary)) => format!(
                "[{}] {} +{} -{}",
                tool.id, diff.path, summary.added, summary.removed
            ),
            (Some(false), _) => format!("[{}] {} unchanged", tool.id, diff.path),
            _ => format!("[{}] {} diff unavailable", tool.id, diff.path),
        };
        self.write_line(&line);
    }

    fn on_advisory(&mut self, advisory: &Advisory) {
        if let Advisory::IterationWarning(_) = advisory {
            self.write_line(&format!("[note] {advisory}"));
        }
    }

    fn on_finalized(&mut self, exchange: &FinalizedExchange) {
        match &exchange.outcome {
            ExchangeOutcome::Cancelled | ExchangeOutcome::Failed { .. } => {
                let tail = exchange
                    .content
                    .strip_prefix(self.printed.as_str())
                    .unwrap_or(&exchange.content)
                    .trim_start()
                    .to_owned();
                self.write_line(&tail);
            }
            ExchangeOutcome::Truncated {
                reason: Some(reason),
            } => self.write_line(&format!("[connection lost: {reason}]")),
            ExchangeOutcome::Completed { .. } | ExchangeOutcome::Truncated { reason: None } => {
                if self.open_line {
                    self.write_text("\n");
                }
            }
        }
        self.printed.clear();
    }
}
