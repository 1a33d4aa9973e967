//! Bounded chat history persisted through a small key/value seam.

mod error;
mod paths;
mod schema;
mod storage;
mod store;

pub use error::StoreError;
pub use paths::{default_history_dir, storage_file_name, HISTORY_DIR};
pub use schema::{derive_title, ChatSession, Role, SessionMessage, DEFAULT_TITLE, TITLE_MAX_CHARS};
pub use storage::{FileStorage, KeyValueStorage, MemoryStorage};
pub use store::{HistoryStore, MAX_SESSIONS, SELECTED_MODEL_KEY, SESSIONS_KEY};
