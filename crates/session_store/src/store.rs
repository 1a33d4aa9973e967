use serde::de::DeserializeOwned;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::schema::ChatSession;
use crate::storage::KeyValueStorage;

pub const MAX_SESSIONS: usize = 20;
pub const SESSIONS_KEY: &str = "chat_sessions";
pub const SELECTED_MODEL_KEY: &str = "selected_model";

/// Most-recent-first archive of past sessions plus the active one.
pub struct HistoryStore {
    storage: Box<dyn KeyValueStorage>,
    sessions: Vec<ChatSession>,
    active: ChatSession,
    selected_model: Option<String>,
}

impl std::fmt::Debug for HistoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryStore")
            .field("sessions", &self.sessions.len())
            .field("active", &self.active.id)
            .field("selected_model", &self.selected_model)
            .finish_non_exhaustive()
    }
}

impl HistoryStore {
    /// Loads persisted state. Unreadable or malformed values fall back to
    /// defaults; the store always opens.
    pub fn open(storage: impl KeyValueStorage + 'static) -> Self {
        let storage: Box<dyn KeyValueStorage> = Box::new(storage);
        let mut sessions: Vec<ChatSession> =
            load_or_default(storage.as_ref(), SESSIONS_KEY).unwrap_or_default();
        sessions.retain(|session| !session.is_empty());
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        sessions.truncate(MAX_SESSIONS);
        let selected_model = load_or_default::<Option<String>>(storage.as_ref(), SELECTED_MODEL_KEY)
            .flatten()
            .filter(|model| !model.trim().is_empty());

        tracing::debug!(sessions = sessions.len(), "history loaded");

        Self {
            storage,
            sessions,
            active: ChatSession::new(),
            selected_model,
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    #[must_use]
    pub fn active(&self) -> &ChatSession {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut ChatSession {
        &mut self.active
    }

    #[must_use]
    pub fn selected_model(&self) -> Option<&str> {
        self.selected_model.as_deref()
    }

    /// Upserts `session` at the front with a refreshed timestamp. Sessions
    /// without messages are never persisted.
    pub fn save(&mut self, session: &ChatSession) -> Result<(), StoreError> {
        if session.is_empty() {
            return Ok(());
        }

        let mut updated = session.clone();
        updated.timestamp = OffsetDateTime::now_utc();
        if updated.id == self.active.id {
            self.active.timestamp = updated.timestamp;
        }

        self.sessions.retain(|existing| existing.id != updated.id);
        self.sessions.insert(0, updated);
        while self.sessions.len() > MAX_SESSIONS {
            self.evict_oldest();
        }

        self.persist_sessions()
    }

    pub fn save_active(&mut self) -> Result<(), StoreError> {
        let active = self.active.clone();
        self.save(&active)
    }

    /// Makes the saved session `id` active, replacing the current one.
    pub fn restore(&mut self, id: &str) -> Result<&ChatSession, StoreError> {
        let session = self
            .sessions
            .iter()
            .find(|session| session.id == id)
            .cloned()
            .ok_or_else(|| StoreError::UnknownSession { id: id.to_owned() })?;
        self.active = session;
        Ok(&self.active)
    }

    /// Persists the active session (if it has messages) and starts a fresh one.
    pub fn start_new(&mut self) -> Result<&ChatSession, StoreError> {
        self.save_active()?;
        self.active = ChatSession::new();
        Ok(&self.active)
    }

    pub fn clear_all(&mut self) -> Result<(), StoreError> {
        self.sessions.clear();
        self.active = ChatSession::new();
        self.storage.remove(SESSIONS_KEY)
    }

    pub fn set_selected_model(&mut self, model: Option<String>) -> Result<(), StoreError> {
        let model = model
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let encoded = serde_json::to_string(&model)
            .map_err(|source| StoreError::json_serialize(SELECTED_MODEL_KEY, source))?;
        self.storage.set(SELECTED_MODEL_KEY, &encoded)?;
        self.selected_model = model;
        Ok(())
    }

    fn evict_oldest(&mut self) {
        // Ties go to the entry furthest from the front.
        let oldest = self
            .sessions
            .iter()
            .enumerate()
            .rev()
            .min_by_key(|(_, session)| session.timestamp)
            .map(|(index, _)| index);
        if let Some(index) = oldest {
            let evicted = self.sessions.remove(index);
            tracing::debug!(id = %evicted.id, "evicted oldest session");
        }
    }

    fn persist_sessions(&mut self) -> Result<(), StoreError> {
        let encoded = serde_json::to_string(&self.sessions)
            .map_err(|source| StoreError::json_serialize(SESSIONS_KEY, source))?;
        self.storage.set(SESSIONS_KEY, &encoded)
    }
}

fn load_or_default<T: DeserializeOwned>(storage: &dyn KeyValueStorage, key: &str) -> Option<T> {
    let raw = match storage.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(error) => {
            tracing::warn!(key, %error, "stored value unreadable; using default");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(error) => {
            tracing::warn!(key, %error, "stored value malformed; using default");
            None
        }
    }
}
