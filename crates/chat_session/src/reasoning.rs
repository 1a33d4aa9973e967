use regex::Regex;

use crate::error::SessionError;

pub const DEFAULT_OPEN_DELIMITER: &str = "<think>";
pub const DEFAULT_CLOSE_DELIMITER: &str = "</think>";

/// Removes model reasoning segments from assistant text.
///
/// Closed `open…close` pairs are removed non-greedily, then an unterminated
/// trailing segment (still streaming) is cut, then the result is trimmed.
/// Passes repeat until nothing changes, so `strip(strip(x)) == strip(x)`.
#[derive(Debug, Clone)]
pub struct ReasoningFilter {
    closed: Regex,
    unterminated: Regex,
}

impl Default for ReasoningFilter {
    fn default() -> Self {
        Self::new(DEFAULT_OPEN_DELIMITER, DEFAULT_CLOSE_DELIMITER)
            .expect("escaped default delimiters always compile")
    }
}

impl ReasoningFilter {
    pub fn new(open: &str, close: &str) -> Result<Self, SessionError> {
        let open = regex::escape(open);
        let close = regex::escape(close);
        Ok(Self {
            closed: Regex::new(&format!("(?s){open}.*?{close}"))?,
            unterminated: Regex::new(&format!("(?s){open}.*\\z"))?,
        })
    }

    #[must_use]
    pub fn strip(&self, text: &str) -> String {
        let mut current = self.strip_once(text);
        loop {
            let next = self.strip_once(&current);
            if next == current {
                return current;
            }
            current = next;
        }
    }

    fn strip_once(&self, text: &str) -> String {
        let without_closed = self.closed.replace_all(text, "");
        let without_tail = self.unterminated.replace(&without_closed, "");
        without_tail.trim().to_owned()
    }
}
