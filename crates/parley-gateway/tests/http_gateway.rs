//! Drives `HuggingFaceGateway` against a loopback HTTP stub.

use parley_core::config::{GatewayConfig, GenerationConfig};
use parley_core::AudioPayload;
use parley_gateway::{GatewayError, HuggingFaceGateway, InferenceGateway};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// A request as seen by the stub server.
#[derive(Debug)]
struct Captured {
    request_line: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Captured {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Serve exactly one request with a canned response.
async fn serve_once(
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
) -> (String, JoinHandle<Captured>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base_url = format!("http://{}/models", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut raw = Vec::new();
        let mut chunk = [0u8; 4096];

        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            assert!(n > 0, "client closed before sending headers");
            raw.extend_from_slice(&chunk[..n]);
            if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };

        let head = String::from_utf8_lossy(&raw[..header_end]).to_string();
        let mut lines = head.split("\r\n");
        let request_line = lines.next().unwrap_or_default().to_string();
        let headers: Vec<(String, String)> = lines
            .filter(|l| !l.is_empty())
            .filter_map(|l| l.split_once(':'))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();
        let content_length = headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
            .and_then(|(_, v)| v.parse::<usize>().ok())
            .unwrap_or(0);

        let mut body_bytes = raw[header_end..].to_vec();
        while body_bytes.len() < content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            body_bytes.extend_from_slice(&chunk[..n]);
        }

        let reason = if status < 400 { "OK" } else { "Error" };
        let mut response = format!(
            "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            reason,
            content_type,
            body.len()
        )
        .into_bytes();
        response.extend_from_slice(&body);
        stream.write_all(&response).await.unwrap();
        stream.shutdown().await.ok();

        Captured {
            request_line,
            headers,
            body: body_bytes,
        }
    });

    (base_url, handle)
}

fn gateway(base_url: String, token: Option<&str>) -> HuggingFaceGateway {
    let config = GatewayConfig {
        base_url,
        request_timeout_secs: Some(10),
        ..GatewayConfig::default()
    };
    HuggingFaceGateway::new(
        &config,
        &GenerationConfig::default(),
        token.map(|t| t.to_string()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_generate_response_posts_parameters() {
    let (url, server) = serve_once(
        200,
        "application/json",
        br#"[{"generated_text":"Hi there!"}]"#.to_vec(),
    )
    .await;
    let gw = gateway(url, Some("hf_secret"));

    let text = gw.generate_response("Hello").await.unwrap();
    assert_eq!(text, "Hi there!");

    let captured = server.await.unwrap();
    assert_eq!(
        captured.request_line,
        "POST /models/facebook/blenderbot-400M-distill HTTP/1.1"
    );
    assert_eq!(captured.header("authorization"), Some("Bearer hf_secret"));
    let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(body["inputs"], "Hello");
    assert_eq!(body["parameters"]["max_new_tokens"], 100);
}

#[tokio::test]
async fn test_generate_response_surfaces_service_errors() {
    let (url, server) = serve_once(
        503,
        "application/json",
        br#"{"error":"Model is currently loading"}"#.to_vec(),
    )
    .await;
    let gw = gateway(url, None);

    let err = gw.generate_response("Hello").await.unwrap_err();
    match err {
        GatewayError::Status { status, body } => {
            assert_eq!(status, 503);
            assert!(body.contains("currently loading"));
        }
        other => panic!("expected status error, got {:?}", other),
    }

    let captured = server.await.unwrap();
    assert!(captured.header("authorization").is_none());
}

#[tokio::test]
async fn test_speech_to_text_uploads_raw_audio() {
    let (url, server) =
        serve_once(200, "application/json", br#"{"text":"merhaba"}"#.to_vec()).await;
    let gw = gateway(url, Some("hf_secret"));

    let audio = AudioPayload::wav(b"RIFF....WAVE".to_vec());
    let text = gw.speech_to_text(audio).await.unwrap();
    assert_eq!(text, "merhaba");

    let captured = server.await.unwrap();
    assert_eq!(
        captured.request_line,
        "POST /models/openai/whisper-base HTTP/1.1"
    );
    assert_eq!(captured.header("content-type"), Some("audio/wav"));
    assert_eq!(captured.body, b"RIFF....WAVE");
}

#[tokio::test]
async fn test_text_to_speech_returns_audio_bytes() {
    let (url, server) = serve_once(200, "audio/flac", vec![0x66, 0x4c, 0x61, 0x43]).await;
    let gw = gateway(url, Some("hf_secret"));

    let audio = gw.text_to_speech("hello").await.unwrap();
    assert_eq!(audio.content_type, "audio/flac");
    assert_eq!(audio.data, b"fLaC");

    let captured = server.await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&captured.body).unwrap();
    assert_eq!(body["inputs"], "hello");
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gw = gateway(format!("http://{}/models", addr), None);
    let err = gw.generate_response("Hello").await.unwrap_err();
    assert!(matches!(err, GatewayError::Transport(_)));
}
