//! End-to-end tests for `/messages` streaming against a local mock server.

use anthropic_stream::stream::Delta;
use anthropic_stream::*;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const MESSAGE_START: &str = "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"123333\",\"type\":\"message\",\"role\":\"assistant\",\"model\":\"claude-3-opus-20240229\",\"content\":[],\"stop_reason\":null,\"stop_sequence\":null,\"usage\":{\"input_tokens\":844,\"output_tokens\":2}}}\n\n";

fn frame(event: &str, data: serde_json::Value) -> String {
    format!("event: {}\ndata: {}\n\n", event, data)
}

fn tool_use_stream() -> String {
    let mut body = String::from(MESSAGE_START);
    body.push_str(&frame(
        "content_block_start",
        serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}),
    ));
    body.push_str("event: ping\ndata: {\"type\": \"ping\"}\n\n");
    for text in ["Let me ", "check the ", "weather."] {
        body.push_str(&frame(
            "content_block_delta",
            serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":text}}),
        ));
    }
    body.push_str(&frame(
        "content_block_stop",
        serde_json::json!({"type":"content_block_stop","index":0}),
    ));
    body.push_str(&frame(
        "content_block_start",
        serde_json::json!({"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_01T1x1fJ34qAmk2tNTrN7Up6","name":"get_weather","input":{}}}),
    ));
    for part in ["", "{\"location\":", " \"San Francisco, CA\"}"] {
        body.push_str(&frame(
            "content_block_delta",
            serde_json::json!({"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":part}}),
        ));
    }
    body.push_str(&frame(
        "content_block_stop",
        serde_json::json!({"type":"content_block_stop","index":1}),
    ));
    body.push_str(&frame(
        "message_delta",
        serde_json::json!({"type":"message_delta","delta":{"stop_reason":"tool_use","stop_sequence":null},"usage":{"output_tokens":89}}),
    ));
    body.push_str(&frame("message_stop", serde_json::json!({"type":"message_stop"})));
    body
}

/// `message_start`, `noise` unrecognized lines, then a one-block message.
fn noisy_stream(noise: usize) -> String {
    let mut body = String::from(MESSAGE_START);
    body.push_str(&"fake: {}\n".repeat(noise));
    body.push_str(&frame(
        "content_block_start",
        serde_json::json!({"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}),
    ));
    body.push_str(&frame(
        "content_block_delta",
        serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello!"}}),
    ));
    body.push_str(&frame(
        "content_block_stop",
        serde_json::json!({"type":"content_block_stop","index":0}),
    ));
    body.push_str(&frame("message_stop", serde_json::json!({"type":"message_stop"})));
    body
}

async fn serve(body: String) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

fn client(server: &MockServer, limit: usize) -> Client {
    Client::new(
        ClientConfig::new("test-key")
            .with_base_url(format!("{}/v1", server.uri()))
            .with_empty_messages_limit(limit),
    )
}

fn request() -> MessagesRequest {
    MessagesRequest {
        model: "claude-3-opus-20240229".into(),
        messages: vec![Message::user("What is the weather in San Francisco?")],
        max_tokens: 1024,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_messages_stream_text_and_tool_use() {
    let server = serve(tool_use_stream()).await;

    let log = Arc::new(Mutex::new(Vec::<String>::new()));
    let (l1, l2, l3, l4, l5, l6, l7) = (
        log.clone(),
        log.clone(),
        log.clone(),
        log.clone(),
        log.clone(),
        log.clone(),
        log.clone(),
    );
    let text = Arc::new(Mutex::new(String::new()));
    let text_cb = text.clone();

    let response = client(&server, 300)
        .create_messages_stream(
            MessagesStreamRequest::new(request())
                .on_message_start(move |e| l1.lock().unwrap().push(format!("start:{}", e.message.id)))
                .on_content_block_start(move |e| {
                    l2.lock().unwrap().push(format!("block_start:{}", e.index))
                })
                .on_content_block_delta(move |e| {
                    l3.lock().unwrap().push(format!("delta:{}", e.index));
                    if let Delta::TextDelta { text } = &e.delta {
                        text_cb.lock().unwrap().push_str(text);
                    }
                })
                .on_content_block_stop(move |e| {
                    l4.lock().unwrap().push(format!("block_stop:{}", e.index))
                })
                .on_message_delta(move |_| l5.lock().unwrap().push("message_delta".into()))
                .on_message_stop(move || l6.lock().unwrap().push("message_stop".into()))
                .on_ping(move || l7.lock().unwrap().push("ping".into())),
            CancellationToken::new(),
        )
        .await
        .expect("stream should succeed");

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "start:123333",
            "block_start:0",
            "ping",
            "delta:0",
            "delta:0",
            "delta:0",
            "block_stop:0",
            "block_start:1",
            "delta:1",
            "delta:1",
            "delta:1",
            "block_stop:1",
            "message_delta",
            "message_stop",
        ]
    );
    assert_eq!(*text.lock().unwrap(), "Let me check the weather.");

    assert_eq!(response.id, "123333");
    assert_eq!(response.role, Role::Assistant);
    assert_eq!(response.stop_reason.as_deref(), Some("tool_use"));
    assert_eq!(response.usage.input_tokens, 844);
    assert_eq!(response.usage.output_tokens, 89);
    assert_eq!(response.text(), "Let me check the weather.");
    assert_eq!(
        response.content[1],
        ContentBlock::ToolUse {
            id: "toolu_01T1x1fJ34qAmk2tNTrN7Up6".into(),
            name: "get_weather".into(),
            input: serde_json::json!({"location": "San Francisco, CA"}),
        }
    );
}

#[tokio::test]
async fn test_empty_messages_below_limit() {
    let limit = 100;
    let server = serve(noisy_stream(limit - 1)).await;
    let response = client(&server, limit)
        .create_messages_stream(
            MessagesStreamRequest::new(request()),
            CancellationToken::new(),
        )
        .await
        .expect("stream should succeed");
    assert_eq!(response.text(), "Hello!");
}

#[tokio::test]
async fn test_empty_messages_above_limit() {
    let limit = 100;
    let server = serve(noisy_stream(limit + 1)).await;
    let result = client(&server, limit)
        .create_messages_stream(
            MessagesStreamRequest::new(request()),
            CancellationToken::new(),
        )
        .await;
    match result {
        Err(e @ StreamError::EmptyMessageLimitExceeded { .. }) => assert!(!e.is_retryable()),
        other => panic!("expected limit error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_trailing_noise_lines_above_limit() {
    let limit = 100;
    let mut body = String::from(MESSAGE_START);
    body.push_str(&"fake: {}\n".repeat(limit + 1));
    let server = serve(body).await;

    let result = client(&server, limit)
        .create_messages_stream(
            MessagesStreamRequest::new(request()),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(
        result,
        Err(StreamError::EmptyMessageLimitExceeded { limit: 100 })
    ));
}

#[tokio::test]
async fn test_oversized_frame_rejected() {
    let mut body = String::from(MESSAGE_START);
    body.push_str("event: content_block_delta\ndata: ");
    body.push_str(&"x".repeat(8 * 1024));
    let server = serve(body).await;

    let result = Client::new(
        ClientConfig::new("test-key")
            .with_base_url(format!("{}/v1", server.uri()))
            .with_max_frame_bytes(1024),
    )
    .create_messages_stream(
        MessagesStreamRequest::new(request()),
        CancellationToken::new(),
    )
    .await;
    assert!(matches!(
        result,
        Err(StreamError::FrameTooLarge { limit: 1024 })
    ));
}

#[tokio::test]
async fn test_delta_without_block_start() {
    let mut body = String::from(MESSAGE_START);
    body.push_str(&frame(
        "content_block_delta",
        serde_json::json!({"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"orphan"}}),
    ));
    body.push_str(&frame("message_stop", serde_json::json!({"type":"message_stop"})));
    let server = serve(body).await;

    let result = client(&server, 300)
        .create_messages_stream(
            MessagesStreamRequest::new(request()),
            CancellationToken::new(),
        )
        .await;
    assert!(matches!(result, Err(StreamError::Consistency(_))));
}

#[tokio::test]
async fn test_mid_stream_overloaded_error() {
    let mut body = String::from(MESSAGE_START);
    body.push_str(&frame(
        "error",
        serde_json::json!({"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}),
    ));
    body.push_str(&noisy_stream(0));
    let server = serve(body).await;

    let result = client(&server, 300)
        .create_messages_stream(
            MessagesStreamRequest::new(request()),
            CancellationToken::new(),
        )
        .await;
    match result {
        Err(e) => {
            assert!(e.is_retryable());
            assert!(e.api_error().is_some_and(ApiError::is_overloaded));
        }
        Ok(response) => panic!("expected error, got {:?}", response),
    }
}

#[tokio::test]
async fn test_malformed_known_event_is_decode_error() {
    let mut body = String::from(MESSAGE_START);
    body.push_str("event: content_block_start\ndata: {\"index\": \"zero\"}\n\n");
    let server = serve(body).await;

    let result = client(&server, 300)
        .create_messages_stream(
            MessagesStreamRequest::new(request()),
            CancellationToken::new(),
        )
        .await;
    match result {
        Err(StreamError::Decode { event, .. }) => assert_eq!(event, "content_block_start"),
        other => panic!("expected decode error, got {:?}", other),
    }
}
