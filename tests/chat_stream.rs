use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::routing::post;
use axum::Router;
use notion2api::auth::build_allowed_key_set;
use notion2api::config::{AppConfig, ClientAuthConfig, NotionConfig, ServerConfig};
use notion2api::routing::dispatch_request;
use notion2api::state::AppState;
use notion2api::transport::NotionTransport;

fn build_state(base_url: String, allowed_keys: Vec<String>) -> Arc<AppState> {
    let config = AppConfig {
        server: ServerConfig::default(),
        notion: NotionConfig {
            base_url,
            token_v2: "v02:mock-token".to_string(),
            space_id: "space-0000".to_string(),
            user_id: "user-0000".to_string(),
            ..NotionConfig::default()
        },
        client_authentication: ClientAuthConfig { allowed_keys },
        ..AppConfig::default()
    };

    let allowed_client_keys = build_allowed_key_set(&config);
    let transport =
        NotionTransport::new(&config.server, &config.notion).expect("build transport");
    Arc::new(AppState::new(config, transport, allowed_client_keys))
}

async fn spawn_mock_notion(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind mock upstream");
    let addr = listener.local_addr().expect("local addr");
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://{addr}"), server)
}

fn inference_object(content: &str) -> String {
    serde_json::json!({
        "type": "agent-inference",
        "value": [{"type": "text", "content": content}],
    })
    .to_string()
}

fn chat_request(body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).expect("serialize")))
        .expect("build request")
}

async fn read_sse_events(response: Response) -> Vec<String> {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    let text = String::from_utf8(body.to_vec()).expect("utf8 body");
    text.split("\n\n")
        .filter(|frame| !frame.is_empty())
        .map(|frame| {
            frame
                .strip_prefix("data: ")
                .expect("data prefix")
                .to_string()
        })
        .collect()
}

fn delta_of(event: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(event).ok()?;
    json["choices"][0]["delta"]["content"]
        .as_str()
        .map(ToString::to_string)
}

#[tokio::test]
async fn test_chat_completion_streams_deltas_and_done() {
    let app = Router::new().route(
        "/api/v3/runInferenceTranscript",
        post(|| async {
            // Cumulative snapshots plus a record-map tail, split so one JSON
            // object straddles a chunk boundary.
            let snapshot_a = inference_object("Hel");
            let snapshot_b = inference_object("Hello, world");
            let record = serde_json::json!({
                "type": "record-map",
                "recordMap": {"thread_message": {"m1": {"value": {"value": {"step": {
                    "type": "agent-inference",
                    "value": [{"type": "text", "content": "Hello, world!"}],
                }}}}}},
            })
            .to_string();
            let split = snapshot_b.len() / 2;
            let chunks = vec![
                snapshot_a,
                snapshot_b[..split].to_string(),
                snapshot_b[split..].to_string(),
                record,
            ];
            let stream = futures_util::stream::iter(
                chunks
                    .into_iter()
                    .map(|chunk| Ok::<_, Infallible>(bytes::Bytes::from(chunk))),
            );
            Body::from_stream(stream)
        }),
    );
    let (base_url, server) = spawn_mock_notion(app).await;

    let state = build_state(base_url, Vec::new());
    let request = chat_request(serde_json::json!({
        "model": "claude-opus-4.5",
        "messages": [{"role": "user", "content": "hi"}],
        "stream": true
    }));

    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
    assert_eq!(response.headers()["x-accel-buffering"], "no");

    let events = read_sse_events(response).await;
    assert_eq!(events.last().map(String::as_str), Some("[DONE]"));

    let deltas: Vec<String> = events[..events.len() - 1]
        .iter()
        .map(|event| delta_of(event).expect("delta frame"))
        .collect();
    assert_eq!(deltas.concat(), "Hello, world!");

    let first: serde_json::Value = serde_json::from_str(&events[0]).expect("chunk json");
    assert_eq!(first["object"], "chat.completion.chunk");
    assert_eq!(first["model"], "notion-ai");
    assert!(first["id"].as_str().unwrap().starts_with("chatcmpl-"));
    assert!(first["choices"][0]["finish_reason"].is_null());

    server.abort();
}

#[tokio::test]
async fn test_upstream_rejection_becomes_sse_error_frame() {
    let app = Router::new().route(
        "/api/v3/runInferenceTranscript",
        post(|| async {
            (
                StatusCode::UNAUTHORIZED,
                axum::Json(serde_json::json!({"error": {"message": "Invalid token"}})),
            )
        }),
    );
    let (base_url, server) = spawn_mock_notion(app).await;

    let state = build_state(base_url, Vec::new());
    let request = chat_request(serde_json::json!({
        "model": "gpt-5",
        "messages": [{"role": "user", "content": "hi"}]
    }));

    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    // The stream contract holds even on failure: HTTP 200, one error frame,
    // no terminal sentinel.
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");

    let events = read_sse_events(response).await;
    assert_eq!(events.len(), 1);
    let frame: serde_json::Value = serde_json::from_str(&events[0]).expect("error frame");
    assert_eq!(frame["error"]["type"], "server_error");
    let message = frame["error"]["message"].as_str().unwrap();
    assert!(message.contains("401"));
    assert!(message.contains("token_v2"));

    server.abort();
}

#[tokio::test]
async fn test_mid_stream_collapse_aborts_with_error_frame() {
    let app = Router::new().route(
        "/api/v3/runInferenceTranscript",
        post(|| async {
            // The delay lets the first chunk flush before the body errors.
            let stream = futures_util::stream::unfold(0u8, |step| async move {
                match step {
                    0 => Some((
                        Ok::<bytes::Bytes, std::io::Error>(bytes::Bytes::from(inference_object(
                            "partial",
                        ))),
                        1,
                    )),
                    1 => {
                        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                        Some((
                            Err(std::io::Error::new(
                                std::io::ErrorKind::ConnectionReset,
                                "reset",
                            )),
                            2,
                        ))
                    }
                    _ => None,
                }
            });
            Body::from_stream(stream)
        }),
    );
    let (base_url, server) = spawn_mock_notion(app).await;

    let state = build_state(base_url, Vec::new());
    let request = chat_request(serde_json::json!({
        "messages": [{"role": "user", "content": "hi"}]
    }));

    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let events = read_sse_events(response).await;
    assert!(events.len() >= 2);
    assert_eq!(
        delta_of(&events[0]).as_deref(),
        Some("partial")
    );
    let last: serde_json::Value =
        serde_json::from_str(events.last().unwrap()).expect("error frame");
    assert_eq!(last["error"]["type"], "server_error");
    assert_ne!(events.last().map(String::as_str), Some("[DONE]"));

    server.abort();
}

#[tokio::test]
async fn test_client_auth_rejected_before_upstream() {
    // No mock upstream: an auth failure must never produce upstream traffic.
    let state = build_state("http://127.0.0.1:9".to_string(), vec!["good-key".into()]);

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("authorization", "Bearer wrong-key")
        .header("content-type", "application/json")
        .body(Body::from(
            serde_json::to_vec(&serde_json::json!({
                "messages": [{"role": "user", "content": "hi"}]
            }))
            .expect("serialize"),
        ))
        .expect("build request");

    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["error"]["type"], "authentication_error");
}

#[tokio::test]
async fn test_models_endpoint_via_dispatch() {
    let state = build_state("http://127.0.0.1:9".to_string(), Vec::new());

    let request = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .body(Body::empty())
        .expect("build request");

    let response = dispatch_request(state, Arc::<str>::from(""), request)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(json["object"], "list");
    assert_eq!(json["data"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_base_path_scopes_all_routes() {
    let state = build_state("http://127.0.0.1:9".to_string(), Vec::new());

    let outside = Request::builder()
        .method("GET")
        .uri("/v1/models")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(Arc::clone(&state), Arc::<str>::from("/notion"), outside)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let inside = Request::builder()
        .method("GET")
        .uri("/notion/v1/models")
        .body(Body::empty())
        .expect("build request");
    let response = dispatch_request(state, Arc::<str>::from("/notion"), inside)
        .await
        .expect("dispatch");
    assert_eq!(response.status(), StatusCode::OK);
}
