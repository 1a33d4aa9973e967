//! Before/after capture for file-mutating tools.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use similar::{ChangeTag, TextDiff};

use crate::transcript::ToolInvocationId;

pub const FILE_MUTATING_TOOLS: [&str; 5] = [
    "create_file",
    "modify_file",
    "delete_file",
    "write_file",
    "edit_file",
];

pub const DELETE_FILE_TOOL: &str = "delete_file";

pub type FileAccessError = Box<dyn std::error::Error + Send + Sync>;

/// Cold reads of workspace files. `Ok(None)` means the file does not exist.
#[async_trait]
pub trait FileAccess: Send + Sync {
    async fn read_file(&self, path: &str) -> Result<Option<String>, FileAccessError>;
}

/// The editor's open-document model, consulted before any cold read.
pub trait OpenDocuments: Send + Sync {
    fn open_paths(&self) -> Vec<String>;
    fn content(&self, path: &str) -> Option<String>;
}

/// No editor attached.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpenDocuments;

impl OpenDocuments for NoOpenDocuments {
    fn open_paths(&self) -> Vec<String> {
        Vec::new()
    }

    fn content(&self, _path: &str) -> Option<String> {
        None
    }
}

/// No file access; every read reports the file as missing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoFileAccess;

#[async_trait]
impl FileAccess for NoFileAccess {
    async fn read_file(&self, _path: &str) -> Result<Option<String>, FileAccessError> {
        Ok(None)
    }
}

/// In-memory path → content map usable as both collaborators.
#[derive(Debug, Default)]
pub struct InMemoryFiles {
    files: Mutex<BTreeMap<String, String>>,
}

impl InMemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, path: impl Into<String>, content: impl Into<String>) -> Self {
        self.insert(path, content);
        self
    }

    pub fn insert(&self, path: impl Into<String>, content: impl Into<String>) {
        lock_unpoisoned(&self.files).insert(path.into(), content.into());
    }

    pub fn remove(&self, path: &str) {
        lock_unpoisoned(&self.files).remove(path);
    }
}

impl OpenDocuments for InMemoryFiles {
    fn open_paths(&self) -> Vec<String> {
        lock_unpoisoned(&self.files).keys().cloned().collect()
    }

    fn content(&self, path: &str) -> Option<String> {
        lock_unpoisoned(&self.files).get(path).cloned()
    }
}

#[async_trait]
impl FileAccess for InMemoryFiles {
    async fn read_file(&self, path: &str) -> Result<Option<String>, FileAccessError> {
        Ok(find_open_document(self, path))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "content", rename_all = "snake_case")]
pub enum Snapshot {
    Present(String),
    /// The file did not exist.
    Absent,
    /// The read failed; this side cannot be diffed.
    Unavailable(String),
}

impl Snapshot {
    pub fn is_captured(&self) -> bool {
        !matches!(self, Self::Unavailable(_))
    }

    fn normalized(&self) -> Option<String> {
        match self {
            Self::Present(content) => Some(content.replace("\r\n", "\n")),
            Self::Absent => Some(String::new()),
            Self::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffSide {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDiff {
    pub path: String,
    pub before: Option<Snapshot>,
    pub after: Option<Snapshot>,
    /// Set when the tool failed; the diff is never computed.
    pub skipped: bool,
    pub changed: Option<bool>,
    pub summary: Option<DiffSummary>,
}

impl FileDiff {
    pub fn pending(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            before: None,
            after: None,
            skipped: false,
            changed: None,
            summary: None,
        }
    }

    pub fn set(&mut self, side: DiffSide, snapshot: Snapshot) {
        match side {
            DiffSide::Before => self.before = Some(snapshot),
            DiffSide::After => self.after = Some(snapshot),
        }
        self.recompute();
    }

    pub fn skip(&mut self) {
        self.skipped = true;
        self.changed = None;
        self.summary = None;
    }

    /// Both sides are known, successfully or not.
    pub fn is_settled(&self) -> bool {
        self.skipped || (self.before.is_some() && self.after.is_some())
    }

    fn recompute(&mut self) {
        if self.skipped {
            return;
        }
        let before = self.before.as_ref().and_then(Snapshot::normalized);
        let after = self.after.as_ref().and_then(Snapshot::normalized);
        let (Some(before), Some(after)) = (before, after) else {
            self.changed = None;
            self.summary = None;
            return;
        };

        self.changed = Some(before != after);
        self.summary = Some(summarize(&before, &after));
    }
}

pub fn summarize(before: &str, after: &str) -> DiffSummary {
    let diff = TextDiff::from_lines(before, after);
    let mut summary = DiffSummary::default();
    for change in diff.iter_all_changes() {
        match change.tag() {
            ChangeTag::Insert => summary.added += 1,
            ChangeTag::Delete => summary.removed += 1,
            ChangeTag::Equal => {}
        }
    }
    summary
}

/// Work item handed to the driver: capture one side of one invocation's diff.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffJob {
    pub invocation: ToolInvocationId,
    pub side: DiffSide,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffResolution {
    pub invocation: ToolInvocationId,
    pub side: DiffSide,
    pub snapshot: Snapshot,
}

impl DiffJob {
    pub fn resolve(&self, snapshot: Snapshot) -> DiffResolution {
        DiffResolution {
            invocation: self.invocation,
            side: self.side,
            snapshot,
        }
    }

    /// Runs the cold read for this job.
    pub async fn read(self, files: &dyn FileAccess) -> DiffResolution {
        let snapshot = match files.read_file(&self.path).await {
            Ok(Some(content)) => Snapshot::Present(content),
            Ok(None) => Snapshot::Absent,
            Err(error) => {
                tracing::warn!(path = %self.path, %error, "file read for diff failed");
                Snapshot::Unavailable(error.to_string())
            }
        };
        self.resolve(snapshot)
    }
}

pub fn is_file_mutating(tool: &str) -> bool {
    FILE_MUTATING_TOOLS.contains(&tool)
}

/// Target path of a file tool: `args.path`, `args.file_path`, then `result.path`.
pub fn tool_file_path(args: &Value, result: Option<&Value>) -> Option<String> {
    value_file_path(args).or_else(|| result.and_then(value_file_path))
}

/// Non-blank `path` or `file_path` field of a tool argument or result object.
pub fn value_file_path(value: &Value) -> Option<String> {
    ["path", "file_path"]
        .iter()
        .find_map(|key| value.get(key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(str::to_owned)
}

/// Normalizes separators to `/` and drops leading `./` segments.
pub fn normalize_path(path: &str) -> String {
    let mut normalized = path.trim().replace('\\', "/");
    while let Some(rest) = normalized.strip_prefix("./") {
        normalized = rest.to_owned();
    }
    normalized
}

/// Exact match, or one path is a suffix of the other on a segment boundary.
pub fn paths_match(left: &str, right: &str) -> bool {
    let left = normalize_path(left);
    let right = normalize_path(right);
    if left.is_empty() || right.is_empty() {
        return false;
    }
    left == right || is_segment_suffix(&left, &right) || is_segment_suffix(&right, &left)
}

fn is_segment_suffix(long: &str, short: &str) -> bool {
    long.len() > short.len()
        && long.ends_with(short)
        && long.as_bytes()[long.len() - short.len() - 1] == b'/'
}

/// Finds the open document for `path`, preferring an exact match.
pub fn find_open_document(documents: &dyn OpenDocuments, path: &str) -> Option<String> {
    let wanted = normalize_path(path);
    let paths = documents.open_paths();
    let exact = paths.iter().find(|open| normalize_path(open) == wanted);
    let matched = exact.or_else(|| paths.iter().find(|open| paths_match(open, &wanted)))?;
    documents.content(matched)
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn path_matching_normalizes_and_respects_segments() {
        assert!(paths_match("./src/a.py", "src/a.py"));
        assert!(paths_match("C:\\ws\\src\\a.py", "src/a.py"));
        assert!(paths_match("a.py", "/home/me/ws/a.py"));
        assert!(!paths_match("/ws/data.py", "a.py"));
        assert!(!paths_match("", "a.py"));
    }

    #[test]
    fn open_document_prefers_exact_match_over_suffix() {
        let docs = InMemoryFiles::new()
            .with_file("/ws/lib/a.py", "suffix")
            .with_file("a.py", "exact");
        assert_eq!(find_open_document(&docs, "./a.py").as_deref(), Some("exact"));
        assert_eq!(
            find_open_document(&docs, "lib/a.py").as_deref(),
            Some("suffix")
        );
        assert_eq!(find_open_document(&docs, "b.py"), None);
    }

    #[test]
    fn tool_path_falls_back_to_result_path() {
        assert_eq!(
            tool_file_path(&json!({"file_path": " x.rs "}), None).as_deref(),
            Some("x.rs")
        );
        assert_eq!(
            tool_file_path(&json!({}), Some(&json!({"path": "y.rs"}))).as_deref(),
            Some("y.rs")
        );
        assert_eq!(tool_file_path(&json!({"path": ""}), None), None);
    }

    #[test]
    fn changed_requires_both_sides_captured() {
        let mut diff = FileDiff::pending("a.py");
        diff.set(DiffSide::After, Snapshot::Present("print(1)\n".to_owned()));
        assert_eq!(diff.changed, None);

        diff.set(DiffSide::Before, Snapshot::Absent);
        assert_eq!(diff.changed, Some(true));
        assert_eq!(diff.summary, Some(DiffSummary { added: 1, removed: 0 }));

        diff.set(DiffSide::Before, Snapshot::Unavailable("io".to_owned()));
        assert_eq!(diff.changed, None);
        assert!(diff.is_settled());
    }

    #[test]
    fn absent_and_empty_compare_equal_and_line_endings_normalize() {
        let mut diff = FileDiff::pending("a.py");
        diff.set(DiffSide::Before, Snapshot::Absent);
        diff.set(DiffSide::After, Snapshot::Present(String::new()));
        assert_eq!(diff.changed, Some(false));

        let mut diff = FileDiff::pending("b.py");
        diff.set(DiffSide::Before, Snapshot::Present("a\r\nb\r\n".to_owned()));
        diff.set(DiffSide::After, Snapshot::Present("a\nb\n".to_owned()));
        assert_eq!(diff.changed, Some(false));
    }

    #[test]
    fn skipped_diff_never_reports_change() {
        let mut diff = FileDiff::pending("a.py");
        diff.skip();
        diff.set(DiffSide::Before, Snapshot::Present("x".to_owned()));
        diff.set(DiffSide::After, Snapshot::Present("y".to_owned()));
        assert_eq!(diff.changed, None);
    }
}
