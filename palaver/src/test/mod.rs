//! End-to-end tests for the relay pipeline against a mocked upstream service.
//!
//! Each test stands up a wiremock server playing the assistant API, builds
//! the full router around it, and drives requests through `axum_test`'s
//! `TestServer` - the same path production traffic takes. Mocks are mounted
//! per test so no two matchers overlap.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::http::StatusCode;
use axum_test::TestServer;
use axum_test::multipart::{MultipartForm, Part};
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use crate::assistant::AssistantClient;
use crate::config::{AssistantConfig, Config};
use crate::tools::ToolRegistry;
use crate::{AppState, build_router};

/// Relay configuration pointed at a mocked upstream, with polling tightened
/// so timeout tests finish quickly.
fn test_config(upstream: &MockServer) -> Config {
    Config {
        assistant: AssistantConfig {
            base_url: url::Url::parse(&format!("{}/v1", upstream.uri())).unwrap(),
            api_key: Some("sk-test".to_string()),
            assistant_id: Some("asst_test".to_string()),
            vector_store_id: None,
            poll_interval: Duration::from_millis(10),
            poll_max_attempts: 5,
            request_timeout: Duration::from_secs(5),
        },
        ..Config::default()
    }
}

fn test_server(config: Config) -> TestServer {
    test_server_with_tools(config, ToolRegistry::new())
}

/// Install the rustls crypto provider once per test process.
///
/// `reqwest` is built with the `rustls-no-provider` feature, so a provider
/// must be installed before any `Client` is constructed. Production does this
/// in `main`; tests build clients directly and need the same setup.
fn ensure_crypto_provider() {
    use std::sync::Once;
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();
    });
}

fn test_server_with_tools(config: Config, tools: ToolRegistry) -> TestServer {
    ensure_crypto_provider();
    let assistant = Arc::new(AssistantClient::new(&config.assistant).expect("client built"));
    let state = AppState {
        config,
        assistant,
        tools: Arc::new(tools),
    };
    TestServer::new(build_router(state).expect("router built")).expect("test server")
}

/// Responds with each body in turn, repeating the last one once exhausted.
/// Used to walk a run through multiple statuses across polls.
struct StatusSequence {
    responses: Vec<Value>,
    hits: AtomicUsize,
}

impl StatusSequence {
    fn new(responses: Vec<Value>) -> Self {
        Self {
            responses,
            hits: AtomicUsize::new(0),
        }
    }
}

impl Respond for StatusSequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let n = self.hits.fetch_add(1, Ordering::SeqCst);
        let body = &self.responses[n.min(self.responses.len() - 1)];
        ResponseTemplate::new(200).set_body_json(body.clone())
    }
}

async fn mock_thread_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/threads"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "thread_new"})))
        .mount(server)
        .await;
}

async fn mock_message_post(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/threads/[^/]+/messages$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_user"})))
        .mount(server)
        .await;
}

async fn mock_run_create(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/threads/[^/]+/runs$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
        .mount(server)
        .await;
}

async fn mock_run_statuses(server: &MockServer, statuses: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/threads/[^/]+/runs/run_1$"))
        .respond_with(StatusSequence::new(statuses))
        .mount(server)
        .await;
}

async fn mock_run_completed(server: &MockServer) {
    mock_run_statuses(server, vec![json!({"id": "run_1", "status": "completed"})]).await;
}

async fn mock_message_list(server: &MockServer, data: Value) {
    Mock::given(method("GET"))
        .and(path_regex(r"^/v1/threads/[^/]+/messages$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": data})))
        .mount(server)
        .await;
}

/// A single assistant reply with the given content parts.
fn assistant_reply(content: Value) -> Value {
    json!([{
        "id": "msg_reply",
        "role": "assistant",
        "created_at": 1700000100,
        "content": content,
    }])
}

#[test_log::test(tokio::test)]
async fn test_empty_request_is_rejected_without_upstream_calls() {
    let upstream = MockServer::start().await;
    let server = test_server(test_config(&upstream));

    let response = server.post("/api/v1/chat").json(&json!({})).await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["category"], "empty_request");

    let requests = upstream.received_requests().await.unwrap();
    assert!(requests.is_empty(), "upstream was contacted: {requests:?}");
}

#[test_log::test(tokio::test)]
async fn test_whitespace_message_counts_as_empty() {
    let upstream = MockServer::start().await;
    let server = test_server(test_config(&upstream));

    let response = server.post("/api/v1/chat").json(&json!({"message": "   \n  "})).await;

    response.assert_status_bad_request();
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_missing_boundary_is_malformed_multipart() {
    let upstream = MockServer::start().await;
    let server = test_server(test_config(&upstream));

    let response = server
        .post("/api/v1/chat")
        .content_type("multipart/form-data")
        .bytes("--x\r\nwhatever".into())
        .await;

    response.assert_status_bad_request();
    let body: Value = response.json();
    assert_eq!(body["category"], "malformed_multipart");
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_wrong_method_gets_structured_405() {
    let upstream = MockServer::start().await;
    let server = test_server(test_config(&upstream));

    let response = server.get("/api/v1/chat").await;

    response.assert_status(StatusCode::METHOD_NOT_ALLOWED);
    let body: Value = response.json();
    assert_eq!(body["category"], "method_not_allowed");
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[test_log::test(tokio::test)]
async fn test_unsupported_content_type_is_named() {
    let upstream = MockServer::start().await;
    let server = test_server(test_config(&upstream));

    let response = server
        .post("/api/v1/chat")
        .content_type("text/plain")
        .bytes("hello".into())
        .await;

    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    let body: Value = response.json();
    assert_eq!(body["category"], "unsupported_content_type");
    assert!(body["error"].as_str().unwrap().contains("text/plain"));
}

#[test_log::test(tokio::test)]
async fn test_json_message_yields_reply_and_new_thread() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_completed(&upstream).await;
    mock_message_list(
        &upstream,
        assistant_reply(json!([
            {"type": "text", "text": {"value": "Hello"}},
            {"type": "text", "text": {"value": "world"}}
        ])),
    )
    .await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "hi"})).await;

    response.assert_status_ok();
    let body: Value = response.json();
    // Ordered text segments join with a newline
    assert_eq!(body["message"], "Hello\nworld");
    assert_eq!(body["threadId"], "thread_new");
}

#[test_log::test(tokio::test)]
async fn test_supplied_thread_id_is_reused_not_recreated() {
    let upstream = MockServer::start().await;
    // Deliberately no thread-creation mock: creating one would 404 and fail
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_completed(&upstream).await;
    mock_message_list(
        &upstream,
        assistant_reply(json!([{"type": "text", "text": {"value": "continuing"}}])),
    )
    .await;

    let server = test_server(test_config(&upstream));
    let response = server
        .post("/api/v1/chat")
        .json(&json!({"message": "hi again", "threadId": "thread_existing"}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["threadId"], "thread_existing");

    let requests = upstream.received_requests().await.unwrap();
    assert!(
        !requests.iter().any(|r| r.url.path() == "/v1/threads"),
        "a new thread was created despite the supplied handle"
    );
    assert!(
        requests
            .iter()
            .any(|r| r.url.path() == "/v1/threads/thread_existing/messages"),
        "the supplied thread was not used"
    );
}

#[test_log::test(tokio::test)]
async fn test_file_only_request_uses_placeholder_and_references_asset() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_completed(&upstream).await;
    mock_message_list(
        &upstream,
        assistant_reply(json!([{"type": "text", "text": {"value": "Got your file"}}])),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-abc", "filename": "report.csv"})))
        .expect(1)
        .mount(&upstream)
        .await;

    // The outbound message must carry the placeholder text and the asset id
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/threads/[^/]+/messages$"))
        .and(body_string_contains("file attached"))
        .and(body_string_contains("file-abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_user"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let form = MultipartForm::new().add_text("message", "").add_part(
        "file",
        Part::bytes(b"a,b\n1,2\n".as_slice()).file_name("report.csv").mime_type("text/csv"),
    );

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").multipart(form).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Got your file");
}

#[test_log::test(tokio::test)]
async fn test_failed_run_surfaces_upstream_error() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_statuses(
        &upstream,
        vec![json!({
            "id": "run_1",
            "status": "failed",
            "last_error": {"code": "server_error", "message": "model crashed"}
        })],
    )
    .await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "hi"})).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["category"], "upstream_run_failed");
    assert!(body["error"].as_str().unwrap().contains("failed"));
    assert_eq!(body["details"]["code"], "server_error");
    assert!(body.get("message").is_none(), "failure must not carry a reply: {body}");
}

#[test_log::test(tokio::test)]
async fn test_cancelled_run_surfaces_terminal_status() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_statuses(&upstream, vec![json!({"id": "run_1", "status": "cancelled"})]).await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "hi"})).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["category"], "upstream_run_failed");
    assert!(body["error"].as_str().unwrap().contains("cancelled"));
}

#[test_log::test(tokio::test)]
async fn test_exhausted_poll_ceiling_is_a_timeout_not_a_success() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_statuses(&upstream, vec![json!({"id": "run_1", "status": "in_progress"})]).await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "hi"})).await;

    response.assert_status(StatusCode::GATEWAY_TIMEOUT);
    let body: Value = response.json();
    assert_eq!(body["category"], "upstream_run_timeout");
    assert!(body.get("message").is_none());

    // Exactly the configured number of polls, no more
    let polls = upstream
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|r| r.url.path().contains("/runs/run_1"))
        .count();
    assert_eq!(polls, 5);
}

#[test_log::test(tokio::test)]
async fn test_thread_without_assistant_reply_is_an_upstream_error() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_completed(&upstream).await;
    mock_message_list(
        &upstream,
        json!([{
            "id": "msg_user",
            "role": "user",
            "created_at": 1700000000,
            "content": [{"type": "text", "text": {"value": "hello?"}}],
        }]),
    )
    .await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "hello?"})).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["category"], "no_assistant_reply");
}

#[test_log::test(tokio::test)]
async fn test_generated_file_streams_back_as_attachment() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_completed(&upstream).await;
    mock_message_list(
        &upstream,
        json!([{
            "id": "msg_reply",
            "role": "assistant",
            "created_at": 1700000100,
            "content": [{"type": "text", "text": {"value": "Here is the analysis"}}],
            "attachments": [{"file_id": "file-gen"}],
        }]),
    )
    .await;

    Mock::given(method("GET"))
        .and(path("/v1/files/file-gen"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-gen", "filename": "analysis.pdf"})))
        .mount(&upstream)
        .await;

    Mock::given(method("GET"))
        .and(path("/v1/files/file-gen/content"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"%PDF-1.4 generated".as_slice()))
        .mount(&upstream)
        .await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "make me a report"})).await;

    response.assert_status_ok();
    assert_eq!(
        response.headers().get("content-type").map(|v| v.to_str().unwrap()),
        Some("application/pdf")
    );
    assert_eq!(
        response.headers().get("content-disposition").map(|v| v.to_str().unwrap()),
        Some("attachment; filename=\"analysis.pdf\"")
    );
    assert_eq!(&response.as_bytes()[..], b"%PDF-1.4 generated");
}

#[test_log::test(tokio::test)]
async fn test_pending_tool_calls_are_resolved_and_polling_resumes() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    // First poll asks for a tool output; the next reports completion
    mock_run_statuses(
        &upstream,
        vec![
            json!({
                "id": "run_1",
                "status": "requires_action",
                "required_action": {
                    "type": "submit_tool_outputs",
                    "submit_tool_outputs": {
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "analyze_dataset", "arguments": "{\"column\": \"price\"}"}
                        }]
                    }
                }
            }),
            json!({"id": "run_1", "status": "completed"}),
        ],
    )
    .await;
    mock_message_list(
        &upstream,
        assistant_reply(json!([{"type": "text", "text": {"value": "Computed."}}])),
    )
    .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/threads/[^/]+/runs/run_1/submit_tool_outputs$"))
        .and(body_string_contains("call_1"))
        .and(body_string_contains("linear"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let mut tools = ToolRegistry::new();
    tools.register("analyze_dataset", |args| async move {
        assert_eq!(args["column"], "price");
        Ok(r#"{"model": "linear", "r2": 0.98}"#.to_string())
    });

    let server = test_server_with_tools(test_config(&upstream), tools);
    let response = server.post("/api/v1/chat").json(&json!({"message": "analyze my data"})).await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Computed.");
}

#[test_log::test(tokio::test)]
async fn test_unknown_tool_call_submits_error_output() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_message_post(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_statuses(
        &upstream,
        vec![
            json!({
                "id": "run_1",
                "status": "requires_action",
                "required_action": {
                    "type": "submit_tool_outputs",
                    "submit_tool_outputs": {
                        "tool_calls": [{
                            "id": "call_9",
                            "type": "function",
                            "function": {"name": "launch_rockets", "arguments": "{}"}
                        }]
                    }
                }
            }),
            json!({"id": "run_1", "status": "completed"}),
        ],
    )
    .await;
    mock_message_list(
        &upstream,
        assistant_reply(json!([{"type": "text", "text": {"value": "Done anyway"}}])),
    )
    .await;

    // The relay must still answer the call, with a structured error output
    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/threads/[^/]+/runs/run_1/submit_tool_outputs$"))
        .and(body_string_contains("call_9"))
        .and(body_string_contains("unsupported tool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "run_1", "status": "queued"})))
        .expect(1)
        .mount(&upstream)
        .await;

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").json(&json!({"message": "do something odd"})).await;

    response.assert_status_ok();
}

#[test_log::test(tokio::test)]
async fn test_upload_rejection_propagates_upstream_detail() {
    let upstream = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({"error": {"message": "Invalid file format", "type": "invalid_request_error"}})),
        )
        .mount(&upstream)
        .await;

    let form = MultipartForm::new().add_text("message", "here you go").add_part(
        "file",
        Part::bytes(b"broken".as_slice()).file_name("data.csv").mime_type("text/csv"),
    );

    let server = test_server(test_config(&upstream));
    let response = server.post("/api/v1/chat").multipart(form).await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["category"], "upstream_upload_failed");
    assert_eq!(body["details"]["error"]["message"], "Invalid file format");

    // Upload happens before any thread or run exists
    let requests = upstream.received_requests().await.unwrap();
    assert!(!requests.iter().any(|r| r.url.path() == "/v1/threads"));
}

#[test_log::test(tokio::test)]
async fn test_json_data_url_attachment_is_uploaded() {
    let upstream = MockServer::start().await;
    mock_thread_create(&upstream).await;
    mock_run_create(&upstream).await;
    mock_run_completed(&upstream).await;
    mock_message_list(
        &upstream,
        assistant_reply(json!([{"type": "text", "text": {"value": "Received"}}])),
    )
    .await;

    Mock::given(method("POST"))
        .and(path("/v1/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "file-b64", "filename": "data.csv"})))
        .expect(1)
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path_regex(r"^/v1/threads/[^/]+/messages$"))
        .and(body_string_contains("file-b64"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "msg_user"})))
        .expect(1)
        .mount(&upstream)
        .await;

    use base64::Engine;
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"a,b\n1,2\n");

    let server = test_server(test_config(&upstream));
    let response = server
        .post("/api/v1/chat")
        .json(&json!({
            "message": "crunch these numbers",
            "file": format!("data:text/csv;base64,{encoded}"),
            "fileName": "data.csv",
        }))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["message"], "Received");
}

#[test_log::test(tokio::test)]
async fn test_healthz() {
    let upstream = MockServer::start().await;
    let server = test_server(test_config(&upstream));

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("OK");
}
