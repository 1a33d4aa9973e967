#![allow(dead_code)]

use chat_session::{Conversation, ExchangeContext, RecordingObserver};
use serde_json::{json, Value};
use session_store::{HistoryStore, MemoryStorage};

pub fn conversation() -> (Conversation, MemoryStorage) {
    let storage = MemoryStorage::new();
    let conversation = Conversation::new(HistoryStore::open(storage.clone()));
    (conversation, storage)
}

/// A conversation with `text` already sent.
pub fn sent(text: &str) -> (Conversation, MemoryStorage, RecordingObserver) {
    let (mut conversation, storage) = conversation();
    let mut observer = RecordingObserver::new();
    conversation
        .send_message(text, ExchangeContext::default(), &mut observer)
        .expect("send should be accepted");
    (conversation, storage, observer)
}

pub fn token(content: &str) -> String {
    json!({"type": "token", "content": content}).to_string()
}

pub fn tool_start(tool: &str, args: Value) -> String {
    json!({"type": "tool_start", "tool": tool, "args": args}).to_string()
}

pub fn tool_start_with_id(tool: &str, call_id: &str) -> String {
    json!({"type": "tool_start", "tool": tool, "args": {}, "call_id": call_id}).to_string()
}

pub fn tool_complete(tool: &str, result: Value) -> String {
    json!({"type": "tool_complete", "tool": tool, "result": result}).to_string()
}

pub fn tool_complete_with_id(tool: &str, call_id: &str, result: Value) -> String {
    json!({"type": "tool_complete", "tool": tool, "result": result, "call_id": call_id})
        .to_string()
}

pub fn done() -> String {
    json!({"type": "done", "model": "m", "provider": "p"}).to_string()
}
