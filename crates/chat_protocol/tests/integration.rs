use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use chat_protocol::events::StreamEvent;
use chat_protocol::transport::new_cancellation_signal;
use chat_protocol::{parse_event, ChatApiClient, ChatApiConfig, ChatApiError, ChatRequest, FrameDecoder};
use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Duration};

#[derive(Clone)]
struct ResponseChunk {
    delay_ms: u64,
    bytes: Vec<u8>,
}

#[derive(Clone)]
struct ScriptedResponse {
    status: u16,
    content_type: &'static str,
    chunks: Vec<ResponseChunk>,
}

/// One-connection-per-request HTTP/1.1 server that replays a fixed response
/// and records the raw request it received.
struct ScriptedServer {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: JoinHandle<()>,
}

impl ScriptedServer {
    async fn new(response: ScriptedResponse) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("local TCP listener should bind");
        let addr = listener.local_addr().expect("listener address");
        let requests = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let requests = Arc::clone(&requests);
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let response = response.clone();
                    let requests = Arc::clone(&requests);
                    tokio::spawn(async move {
                        serve_one(socket, response, requests).await;
                    });
                }
            }
        });

        Self {
            base_url: format!("http://{addr}"),
            requests,
            handle,
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().expect("request log").clone()
    }
}

impl Drop for ScriptedServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve_one(
    mut socket: TcpStream,
    response: ScriptedResponse,
    requests: Arc<Mutex<Vec<String>>>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    requests.lock().expect("request log").push(request);

    let head = format!(
        "HTTP/1.1 {} Scripted\r\ncontent-type: {}\r\nconnection: close\r\n\r\n",
        response.status, response.content_type
    );
    if socket.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    for chunk in response.chunks {
        if chunk.delay_ms > 0 {
            sleep(Duration::from_millis(chunk.delay_ms)).await;
        }
        if socket.write_all(&chunk.bytes).await.is_err() {
            return;
        }
        let _ = socket.flush().await;
    }
    let _ = socket.shutdown().await;
}

async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buffer = Vec::new();
    let mut chunk = [0_u8; 4096];
    loop {
        let read = socket.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        let text = String::from_utf8_lossy(&buffer).to_string();
        let Some(head_end) = text.find("\r\n\r\n") else {
            continue;
        };
        let content_length = text[..head_end]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.trim()
                    .eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        if buffer.len() >= head_end + 4 + content_length {
            return Some(text);
        }
    }
}

fn sse(frames: &[&str]) -> Vec<u8> {
    frames
        .iter()
        .map(|frame| format!("data: {frame}\n\n"))
        .collect::<String>()
        .into_bytes()
}

fn respond(status: u16, content_type: &'static str, chunks: Vec<Vec<u8>>) -> ScriptedResponse {
    ScriptedResponse {
        status,
        content_type,
        chunks: chunks
            .into_iter()
            .map(|bytes| ResponseChunk { delay_ms: 0, bytes })
            .collect(),
    }
}

async fn collect_events(client: &ChatApiClient, request: &ChatRequest) -> Vec<StreamEvent> {
    let cancel = new_cancellation_signal();
    let mut stream = client
        .open_stream(request, &cancel)
        .await
        .expect("stream opens");
    let mut decoder = FrameDecoder::default();
    let mut events = Vec::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.expect("chunk");
        for frame in decoder.feed(&chunk) {
            events.push(parse_event(&frame).expect("frame parses"));
        }
    }
    events
}

#[tokio::test]
async fn stream_delivers_frames_split_across_writes() {
    let body = sse(&[
        r#"{"type":"token","content":"Hel"}"#,
        r#"{"type":"token","content":"lo"}"#,
        r#"{"type":"done","model":"m","provider":"p"}"#,
    ]);
    let (first, second) = body.split_at(17);
    let server = ScriptedServer::new(ScriptedResponse {
        status: 200,
        content_type: "text/event-stream",
        chunks: vec![
            ResponseChunk {
                delay_ms: 0,
                bytes: first.to_vec(),
            },
            ResponseChunk {
                delay_ms: 30,
                bytes: second.to_vec(),
            },
        ],
    })
    .await;

    let config = ChatApiConfig::new(&server.base_url)
        .with_provider_keys("groq", vec!["gk".to_owned()]);
    let client = ChatApiClient::new(config).expect("client");
    let events = collect_events(&client, &ChatRequest::new("hi").with_workspace("/ws")).await;

    assert_eq!(events.len(), 3);
    assert_eq!(
        events[2],
        StreamEvent::Done {
            model: Some("m".to_owned()),
            provider: Some("p".to_owned())
        }
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    let request = requests[0].to_ascii_lowercase();
    assert!(request.starts_with("post /api/agent/chat/stream "), "{request}");
    assert!(request.contains("x-groq-keys: [\"gk\"]"), "{request}");
    assert!(request.contains("\"query\":\"hi\""), "{request}");
    assert!(request.contains("\"selected_model\":null"), "{request}");
}

#[tokio::test]
async fn error_status_surfaces_backend_detail() {
    let server = ScriptedServer::new(respond(
        500,
        "application/json",
        vec![br#"{"detail":"provider exploded"}"#.to_vec()],
    ))
    .await;
    let client = ChatApiClient::new(ChatApiConfig::new(&server.base_url)).expect("client");

    let error = client
        .open_stream(&ChatRequest::new("hi"), &new_cancellation_signal())
        .await
        .err()
        .expect("status error");
    match error {
        ChatApiError::Status(status, message) => {
            assert_eq!(status.as_u16(), 500);
            assert_eq!(message, "provider exploded");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn cancelled_signal_short_circuits_before_connecting() {
    let server = ScriptedServer::new(respond(200, "text/event-stream", vec![sse(&[])])).await;
    let client = ChatApiClient::new(ChatApiConfig::new(&server.base_url)).expect("client");
    let cancel = new_cancellation_signal();
    cancel.store(true, Ordering::Release);

    let error = client
        .open_stream(&ChatRequest::new("hi"), &cancel)
        .await
        .err()
        .expect("cancelled");
    assert!(error.is_cancelled());
    assert!(server.requests().is_empty());
}

#[tokio::test]
async fn read_file_returns_content_and_none_for_missing() {
    let found = ScriptedServer::new(respond(
        200,
        "application/json",
        vec![br#"{"content":"print(1)\n","path":"a.py"}"#.to_vec()],
    ))
    .await;
    let client = ChatApiClient::new(ChatApiConfig::new(&found.base_url)).expect("client");
    let content = client
        .read_file("src/a.py", &new_cancellation_signal())
        .await
        .expect("read succeeds");
    assert_eq!(content.as_deref(), Some("print(1)\n"));
    let request = found.requests().remove(0);
    assert!(request.starts_with("GET /api/files/read?path=src%2Fa.py "), "{request}");

    let missing = ScriptedServer::new(respond(
        404,
        "application/json",
        vec![br#"{"detail":"File not found"}"#.to_vec()],
    ))
    .await;
    let client = ChatApiClient::new(ChatApiConfig::new(&missing.base_url)).expect("client");
    assert_eq!(
        client
            .read_file("gone.py", &new_cancellation_signal())
            .await
            .expect("missing file is not an error"),
        None
    );
}

#[tokio::test]
async fn list_models_parses_catalogue() {
    let server = ScriptedServer::new(respond(
        200,
        "application/json",
        vec![br#"{"models":[{"provider":"groq","model_name":"Llama","model_key":"llama-3","display_name":"Llama 3"}]}"#.to_vec()],
    ))
    .await;
    let client = ChatApiClient::new(ChatApiConfig::new(format!("{}/api", server.base_url)))
        .expect("client");

    let models = client
        .list_models(&new_cancellation_signal())
        .await
        .expect("models");
    assert_eq!(models.len(), 1);
    assert_eq!(models[0].selection_key(), "groq/llama-3");
    assert!(server.requests()[0].starts_with("GET /api/agent/models/list "));
}
