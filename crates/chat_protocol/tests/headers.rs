use chat_protocol::headers::{build_headers, provider_keys_header};
use chat_protocol::{ChatApiConfig, ChatApiError, ChatRequest};

#[test]
fn headers_carry_provider_keys_as_json_arrays() {
    let config = ChatApiConfig::default()
        .with_provider_keys("Groq", vec!["k1".to_owned(), " ".to_owned(), "k2".to_owned()])
        .with_provider_keys("cerebras", vec!["c1".to_owned()])
        .with_ollama_url("http://localhost:11434");

    let headers = build_headers(&config, None).expect("headers");

    assert_eq!(headers.get("x-groq-keys").map(String::as_str), Some(r#"["k1","k2"]"#));
    assert_eq!(headers.get("x-cerebras-keys").map(String::as_str), Some(r#"["c1"]"#));
    assert_eq!(
        headers.get("x-ollama-url").map(String::as_str),
        Some("http://localhost:11434")
    );
    assert_eq!(
        headers.get("accept").map(String::as_str),
        Some("text/event-stream")
    );
    assert_eq!(
        headers.get("content-type").map(String::as_str),
        Some("application/json")
    );
}

#[test]
fn providers_without_keys_send_no_header() {
    let config = ChatApiConfig::default()
        .with_provider_keys("groq", vec!["k".to_owned()])
        .with_provider_keys("groq", Vec::new());
    let headers = build_headers(&config, None).expect("headers");
    assert!(!headers.contains_key(&provider_keys_header("groq")));
    assert!(!headers.contains_key("x-ollama-url"));
}

#[test]
fn user_agent_prefers_explicit_then_config_then_default() {
    let config = ChatApiConfig::default().with_user_agent("configured/1");
    let headers = build_headers(&config, Some("explicit/2")).expect("headers");
    assert_eq!(headers.get("user-agent").map(String::as_str), Some("explicit/2"));

    let headers = build_headers(&config, None).expect("headers");
    assert_eq!(headers.get("user-agent").map(String::as_str), Some("configured/1"));

    let headers = build_headers(&ChatApiConfig::default(), None).expect("headers");
    let ua = headers.get("user-agent").expect("default user agent");
    assert!(ua.starts_with("quasar-chat/"), "{ua}");
}

#[test]
fn extra_headers_are_lowercased_and_override_defaults() {
    let config = ChatApiConfig::default().insert_header("X-Trace", " abc ");
    let headers = build_headers(&config, None).expect("headers");
    assert_eq!(headers.get("x-trace").map(String::as_str), Some("abc"));
}

#[test]
fn provider_names_with_invalid_characters_are_rejected() {
    let config = ChatApiConfig::default().with_provider_keys("my provider", vec!["k".to_owned()]);
    assert!(matches!(
        build_headers(&config, None),
        Err(ChatApiError::InvalidHeader { .. })
    ));
}

#[test]
fn request_serializes_auto_model_as_null() {
    let request = ChatRequest::new("hello")
        .with_workspace("/ws")
        .with_selected_model(Some("auto".to_owned()));
    let value = serde_json::to_value(&request).expect("serializes");

    assert_eq!(value["query"], "hello");
    assert_eq!(value["workspace"], "/ws");
    assert!(value["selected_model"].is_null());
    assert!(value["current_file"].is_null());
    assert!(value.get("error_message").is_none());

    let pinned = ChatRequest::new("x").with_selected_model(Some(" groq/llama ".to_owned()));
    assert_eq!(pinned.selected_model.as_deref(), Some("groq/llama"));
}
