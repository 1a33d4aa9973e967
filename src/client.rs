use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chat_protocol::transport::new_cancellation_signal;
use chat_protocol::{CancellationSignal, ChatApiClient, ChatApiError, ModelInfo};
use chat_session::{
    CancellationController, Conversation, ExchangeContext, ExchangeDriver, ExchangeOutcome,
    FileAccess, FileAccessError, SendError, SessionError, SessionObserver,
};
use chat_stream_mock::{ScriptedTransport, MOCK_PROVIDER_ID};
use session_store::{FileStorage, HistoryStore, MemoryStorage};
use thiserror::Error;

use crate::config::{EnvConfig, TransportKind};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Api(#[from] ChatApiError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Send(#[from] SendError),
}

/// Workspace reads through the backend's file endpoint.
struct BackendFiles {
    api: Arc<ChatApiClient>,
    cancel: CancellationSignal,
}

#[async_trait]
impl FileAccess for BackendFiles {
    async fn read_file(&self, path: &str) -> Result<Option<String>, FileAccessError> {
        Ok(self.api.read_file(path, &self.cancel).await?)
    }
}

/// Conversation, driver and transport wired together for the terminal.
pub struct ChatClient {
    conversation: Conversation,
    driver: ExchangeDriver,
    api: Option<Arc<ChatApiClient>>,
    workspace: Option<String>,
}

impl ChatClient {
    pub fn new(conversation: Conversation, driver: ExchangeDriver) -> Self {
        Self {
            conversation,
            driver,
            api: None,
            workspace: None,
        }
    }

    /// Builds the client described by `config`. History lives under
    /// `config.history_dir(cwd)` unless the config is ephemeral. The configured
    /// model only seeds the selection when none is stored yet.
    pub fn from_config(config: &EnvConfig, cwd: &Path) -> Result<Self, ClientError> {
        let history = if config.ephemeral {
            HistoryStore::open(MemoryStorage::new())
        } else {
            HistoryStore::open(FileStorage::new(config.history_dir(cwd)))
        };
        let mut conversation = Conversation::new(history);
        if let Some(model) = &config.model {
            if conversation.selected_model().is_none() {
                conversation.set_selected_model(Some(model.clone()))?;
            }
        }

        let cancel = CancellationController::new();
        let (driver, api) = match config.transport {
            TransportKind::Http => {
                let api = Arc::new(ChatApiClient::new(config.api_config())?);
                let files = BackendFiles {
                    api: Arc::clone(&api),
                    cancel: cancel.signal(),
                };
                let driver = ExchangeDriver::new(api.clone()).with_file_access(Arc::new(files));
                (driver, Some(api))
            }
            TransportKind::Mock => {
                tracing::info!("using the offline demo transport");
                (ExchangeDriver::new(Arc::new(ScriptedTransport::demo())), None)
            }
        };

        Ok(Self {
            conversation,
            driver: driver.with_cancellation(cancel),
            api,
            workspace: config.workspace.clone(),
        })
    }

    pub fn with_workspace(mut self, workspace: impl Into<String>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn conversation_mut(&mut self) -> &mut Conversation {
        &mut self.conversation
    }

    pub fn cancellation(&self) -> &CancellationController {
        self.driver.cancellation()
    }

    /// Runs one exchange to completion. A cancel raised before this call is
    /// discarded; one raised while it runs stops the exchange.
    pub async fn send(
        &mut self,
        text: &str,
        observer: &mut dyn SessionObserver,
    ) -> Result<ExchangeOutcome, ClientError> {
        self.driver.cancellation().reset();
        let context = ExchangeContext {
            workspace: self.workspace.clone(),
            ..ExchangeContext::default()
        };
        Ok(self
            .driver
            .send(&mut self.conversation, text, context, observer)
            .await?)
    }

    /// Models offered by the backend. The offline transport offers one.
    pub async fn list_models(&self) -> Result<Vec<ModelInfo>, ClientError> {
        let Some(api) = &self.api else {
            return Ok(vec![ModelInfo {
                provider: MOCK_PROVIDER_ID.to_owned(),
                model_name: "Scripted demo".to_owned(),
                model_key: "demo".to_owned(),
                display_name: None,
            }]);
        };
        Ok(api.list_models(&new_cancellation_signal()).await?)
    }
}
