use std::sync::Arc;

use chat_session::{
    Conversation, ExchangeDriver, ExchangeOutcome, NullObserver, RecordingObserver,
};
use chat_stream_mock::{Script, ScriptedTransport};
use pretty_assertions::assert_eq;
use quasar_chat::{ChatClient, EnvConfig, TransportKind};
use session_store::{HistoryStore, MemoryStorage, Role};

fn mock_config(dir: &std::path::Path) -> EnvConfig {
    EnvConfig {
        transport: TransportKind::Mock,
        history_dir: Some(dir.to_path_buf()),
        ..EnvConfig::default()
    }
}

#[tokio::test]
async fn demo_exchange_is_persisted_across_clients() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = mock_config(dir.path());

    let mut client = ChatClient::from_config(&config, dir.path()).expect("client");
    let outcome = client
        .send("hello there", &mut NullObserver)
        .await
        .expect("send");
    assert!(outcome.is_completed());
    let id = client.conversation().active_session().id.clone();

    let reopened = ChatClient::from_config(&config, dir.path()).expect("client");
    let sessions = reopened.conversation().history().sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].id, id);
    assert_eq!(sessions[0].title, "hello there");
    assert_eq!(sessions[0].messages[1].role, Role::Assistant);
    assert_eq!(sessions[0].messages[1].content, "Mock reply to: hello there");
}

#[test]
fn stored_model_choice_outlives_the_configured_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EnvConfig {
        model: Some("groq/llama".to_owned()),
        ..mock_config(dir.path())
    };

    let mut client = ChatClient::from_config(&config, dir.path()).expect("client");
    assert_eq!(client.conversation().selected_model(), Some("groq/llama"));
    client
        .conversation_mut()
        .set_selected_model(Some("cerebras/qwen".to_owned()))
        .expect("model");

    let reopened = ChatClient::from_config(&config, dir.path()).expect("client");
    assert_eq!(reopened.conversation().selected_model(), Some("cerebras/qwen"));
}

#[tokio::test]
async fn stale_cancel_is_cleared_before_sending() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut client = ChatClient::from_config(&mock_config(dir.path()), dir.path()).expect("client");
    client.cancellation().cancel();

    let outcome = client.send("hi", &mut NullObserver).await.expect("send");

    assert!(outcome.is_completed());
}

#[tokio::test]
async fn ephemeral_history_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EnvConfig {
        ephemeral: true,
        ..mock_config(&dir.path().join("history"))
    };
    let mut client = ChatClient::from_config(&config, dir.path()).expect("client");
    client.send("hi", &mut NullObserver).await.expect("send");

    assert_eq!(client.conversation().history().sessions().len(), 1);
    assert!(!dir.path().join("history").exists());
}

#[tokio::test]
async fn configured_model_and_workspace_reach_the_request() {
    let transport = Arc::new(
        ScriptedTransport::new().with_script(Script::new().token("ok").done()),
    );
    let mut conversation = Conversation::new(HistoryStore::open(MemoryStorage::new()));
    conversation
        .set_selected_model(Some("groq/llama".to_owned()))
        .expect("model");
    let mut client = ChatClient::new(conversation, ExchangeDriver::new(transport.clone()))
        .with_workspace("/ws");
    let mut observer = RecordingObserver::new();

    let outcome = client.send("go", &mut observer).await.expect("send");

    assert_eq!(
        outcome,
        ExchangeOutcome::Completed {
            model: Some("mock".to_owned()),
            provider: Some("mock".to_owned())
        }
    );
    let request = transport.requests().remove(0);
    assert_eq!(request.workspace.as_deref(), Some("/ws"));
    assert_eq!(request.selected_model.as_deref(), Some("groq/llama"));
    assert_eq!(observer.last_text(), Some("ok"));
}

#[tokio::test]
async fn offline_transport_lists_its_demo_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let client = ChatClient::from_config(&mock_config(dir.path()), dir.path()).expect("client");
    let models = client.list_models().await.expect("models");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].selection_key(), "mock/demo");
}

#[test]
fn http_transport_rejects_invalid_base_url() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = EnvConfig {
        api_base_url: "ftp://example.com".to_owned(),
        ephemeral: true,
        ..EnvConfig::default()
    };
    assert!(ChatClient::from_config(&config, dir.path()).is_err());
}
