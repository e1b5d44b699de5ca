//! Integration tests for the webhook → pipeline → sheet path.
//!
//! Each test spins up a mock upstream (LINE content/reply, Gemini,
//! token endpoint, Sheets append) and the real webhook router, each on a
//! random port, then posts signed webhook bodies with reqwest.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use async_trait::async_trait;

use ocr_sheets::channels::signature::{SIGNATURE_HEADER, sign};
use ocr_sheets::channels::{LineChannel, MediaSource, ReplySender, WebhookState, webhook_routes};
use ocr_sheets::config::{GeminiConfig, LineConfig};
use ocr_sheets::error::{ChannelError, ExtractionError, SinkError};
use ocr_sheets::extraction::{GeminiExtractor, TextExtractor};
use ocr_sheets::ledger::{DeliveryLedger, JsonFileLedger};
use ocr_sheets::pipeline::processor::{ERROR_REPLY, EXTRACTION_FAILED_REPLY, SUCCESS_REPLY};
use ocr_sheets::pipeline::{ImageProcessor, ProcessorDeps, Row};
use ocr_sheets::sheets::{GoogleSheetsSink, RowSink, ServiceAccountKey, SheetTarget};

const SECRET: &str = "test-channel-secret";
const TEST_KEY_PEM: &str = include_str!("fixtures/test_service_account_key.pem");
const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0];

// ── Mock upstream ───────────────────────────────────────────────────

#[derive(Default)]
struct Upstream {
    replies: Mutex<Vec<Value>>,
    appends: Mutex<Vec<(String, Value)>>,
    token_requests: Mutex<usize>,
    /// Text Gemini returns; empty means a candidate with no parts.
    gemini_text: Mutex<String>,
}

impl Upstream {
    fn reply_texts(&self) -> Vec<String> {
        self.replies
            .lock()
            .unwrap()
            .iter()
            .map(|r| r["messages"][0]["text"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

async fn content(Path(id): Path<String>) -> Result<Vec<u8>, StatusCode> {
    if id == "missing" {
        return Err(StatusCode::NOT_FOUND);
    }
    Ok(PNG.to_vec())
}

async fn reply(State(up): State<Arc<Upstream>>, Json(body): Json<Value>) -> StatusCode {
    up.replies.lock().unwrap().push(body);
    StatusCode::OK
}

async fn generate(State(up): State<Arc<Upstream>>, Json(body): Json<Value>) -> Json<Value> {
    assert_eq!(body["contents"][0]["parts"][1]["inline_data"]["mime_type"], "image/png");
    let text = up.gemini_text.lock().unwrap().clone();
    if text.is_empty() {
        return Json(json!({"candidates": [{"finishReason": "STOP"}]}));
    }
    Json(json!({"candidates": [{"content": {"parts": [{"text": text}]}}]}))
}

async fn token(State(up): State<Arc<Upstream>>, body: String) -> Json<Value> {
    assert!(body.contains("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer"));
    *up.token_requests.lock().unwrap() += 1;
    Json(json!({"access_token": "mock-token", "expires_in": 3600, "token_type": "Bearer"}))
}

async fn append(
    State(up): State<Arc<Upstream>>,
    Path((spreadsheet_id, _rest)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    if spreadsheet_id == "broken" {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    up.appends.lock().unwrap().push((spreadsheet_id, body));
    StatusCode::OK
}

async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn start_upstream(up: Arc<Upstream>) -> String {
    let app = Router::new()
        .route("/v2/bot/message/{id}/content", get(content))
        .route("/v2/bot/message/reply", post(reply))
        .route("/v1beta/models/{*model}", post(generate))
        .route("/token", post(token))
        .route("/v4/spreadsheets/{id}/values/{*rest}", post(append))
        .with_state(up);
    serve(app).await
}

// ── Service under test ──────────────────────────────────────────────

struct Service {
    url: String,
    upstream: Arc<Upstream>,
    ledger: Arc<JsonFileLedger>,
    _dir: tempfile::TempDir,
}

async fn start_service(spreadsheet_id: &str, gemini_text: &str) -> Service {
    let upstream = Arc::new(Upstream::default());
    *upstream.gemini_text.lock().unwrap() = gemini_text.to_string();
    let base = start_upstream(upstream.clone()).await;

    let line = Arc::new(
        LineChannel::new(&LineConfig {
            channel_access_token: SecretString::from("line-token"),
            channel_secret: SecretString::from(SECRET),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
        .with_base_urls(&base, &base),
    );
    let extractor = GeminiExtractor::new(&GeminiConfig {
        api_key: SecretString::from("g-key"),
        model: "gemini-1.5-flash".into(),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
    .with_base_url(&base);

    let key = ServiceAccountKey::from_json(
        &json!({
            "client_email": "ocr@project.iam.gserviceaccount.com",
            "private_key": TEST_KEY_PEM,
            "token_uri": format!("{base}/token"),
        })
        .to_string(),
    )
    .unwrap();
    let sink = GoogleSheetsSink::new(key, reqwest::Client::new())
        .unwrap()
        .with_base_url(&base);

    let dir = tempfile::tempdir().unwrap();
    let ledger = Arc::new(JsonFileLedger::new(dir.path().join("saved_messages.json")));

    let processor = ImageProcessor::new(
        ProcessorDeps {
            media: line.clone(),
            replies: line,
            extractor: Arc::new(extractor),
            sink: Arc::new(sink),
            ledger: ledger.clone(),
        },
        SheetTarget::new(spreadsheet_id, "Sheet1!A1"),
    );

    let url = serve(webhook_routes(WebhookState {
        processor: Arc::new(processor),
        channel_secret: SecretString::from(SECRET),
    }))
    .await;

    Service { url, upstream, ledger, _dir: dir }
}

fn image_body(message_id: &str) -> String {
    json!({
        "destination": "Ubot",
        "events": [{
            "type": "message",
            "replyToken": format!("rt-{message_id}"),
            "message": {"type": "image", "id": message_id},
            "deliveryContext": {"isRedelivery": false}
        }]
    })
    .to_string()
}

async fn post_signed(url: &str, body: &str) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("{url}/callback"))
        .header(SIGNATURE_HEADER, sign(SECRET.as_bytes(), body.as_bytes()))
        .body(body.to_string())
        .send()
        .await
        .unwrap()
}

// ── End-to-end ──────────────────────────────────────────────────────

#[tokio::test]
async fn image_is_saved_once_across_redeliveries() {
    let svc = start_service("sheet-1", "```\nitem\tqty\napple, 3\n```").await;
    let body = image_body("msg123");

    let resp = post_signed(&svc.url, &body).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");

    assert_eq!(svc.upstream.reply_texts(), vec![SUCCESS_REPLY]);
    assert_eq!(svc.upstream.replies.lock().unwrap()[0]["replyToken"], "rt-msg123");

    let appends = svc.upstream.appends.lock().unwrap().clone();
    assert_eq!(appends.len(), 1);
    let (id, payload) = &appends[0];
    assert_eq!(id, "sheet-1");
    let values = payload["values"].as_array().unwrap();
    assert_eq!(values.len(), 3);
    assert_eq!(values[0][1], "LINE Message ID: msg123");
    assert_eq!(values[1], json!(["item", "qty"]));
    assert_eq!(values[2], json!(["apple", "3"]));
    assert!(svc.ledger.has("msg123").await.unwrap());

    // Redelivery: acknowledged, nothing else happens.
    let resp = post_signed(&svc.url, &body).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(svc.upstream.replies.lock().unwrap().len(), 1);
    assert_eq!(svc.upstream.appends.lock().unwrap().len(), 1);
    assert_eq!(svc.ledger.entries().await.unwrap(), vec!["msg123"]);
}

#[tokio::test]
async fn token_is_reused_between_appends() {
    let svc = start_service("sheet-1", "a,b").await;
    post_signed(&svc.url, &image_body("m1")).await;
    post_signed(&svc.url, &image_body("m2")).await;

    assert_eq!(svc.upstream.appends.lock().unwrap().len(), 2);
    assert_eq!(*svc.upstream.token_requests.lock().unwrap(), 1);
}

#[tokio::test]
async fn empty_extraction_replies_and_records() {
    let svc = start_service("sheet-1", "").await;

    let resp = post_signed(&svc.url, &image_body("blank")).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(svc.upstream.reply_texts(), vec![EXTRACTION_FAILED_REPLY]);
    assert!(svc.upstream.appends.lock().unwrap().is_empty());
    assert!(svc.ledger.has("blank").await.unwrap());
}

#[tokio::test]
async fn sheet_failure_replies_error_and_is_retried_on_redelivery() {
    let svc = start_service("broken", "a,b").await;
    let body = image_body("msg123");

    let resp = post_signed(&svc.url, &body).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(svc.upstream.reply_texts(), vec![ERROR_REPLY]);
    assert!(!svc.ledger.has("msg123").await.unwrap());

    post_signed(&svc.url, &body).await;
    assert_eq!(svc.upstream.reply_texts(), vec![ERROR_REPLY, ERROR_REPLY]);
}

#[tokio::test]
async fn missing_content_replies_error() {
    let svc = start_service("sheet-1", "a,b").await;

    post_signed(&svc.url, &image_body("missing")).await;
    assert_eq!(svc.upstream.reply_texts(), vec![ERROR_REPLY]);
    assert!(svc.upstream.appends.lock().unwrap().is_empty());
    assert!(!svc.ledger.has("missing").await.unwrap());
}

#[tokio::test]
async fn bad_signature_is_rejected_before_processing() {
    let svc = start_service("sheet-1", "a,b").await;
    let body = image_body("msg123");

    let resp = reqwest::Client::new()
        .post(format!("{}/callback", svc.url))
        .header(SIGNATURE_HEADER, sign(b"wrong-secret", body.as_bytes()))
        .body(body)
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 400);
    assert!(svc.upstream.replies.lock().unwrap().is_empty());
    assert!(svc.ledger.entries().await.unwrap().is_empty());
}

// ── Router-only tests with stub collaborators ──────────────────────

struct NoMedia;

#[async_trait]
impl MediaSource for NoMedia {
    async fn fetch_content(&self, message_id: &str) -> Result<Vec<u8>, ChannelError> {
        Err(ChannelError::DownloadFailed {
            message_id: message_id.to_string(),
            status: 500,
        })
    }
}

struct FailingReplies;

#[async_trait]
impl ReplySender for FailingReplies {
    async fn reply(&self, _reply_token: &str, _text: &str) -> Result<(), ChannelError> {
        Err(ChannelError::SendFailed {
            name: "stub".into(),
            reason: "offline".into(),
        })
    }
}

struct NoText;

#[async_trait]
impl TextExtractor for NoText {
    fn model_name(&self) -> &str {
        "none"
    }
    async fn extract(&self, _image: &[u8]) -> Result<Option<String>, ExtractionError> {
        Ok(None)
    }
}

struct NullSink;

#[async_trait]
impl RowSink for NullSink {
    async fn append(&self, _target: &SheetTarget, _rows: &[Row]) -> Result<(), SinkError> {
        Ok(())
    }
}

fn stub_router(dir: &tempfile::TempDir) -> Router {
    let processor = ImageProcessor::new(
        ProcessorDeps {
            media: Arc::new(NoMedia),
            replies: Arc::new(FailingReplies),
            extractor: Arc::new(NoText),
            sink: Arc::new(NullSink),
            ledger: Arc::new(JsonFileLedger::new(dir.path().join("ledger.json"))),
        },
        SheetTarget::new("s", "Sheet1!A1"),
    );
    webhook_routes(WebhookState {
        processor: Arc::new(processor),
        channel_secret: SecretString::from(SECRET),
    })
}

fn callback_request(body: &str, signature: Option<String>) -> Request<Body> {
    let mut req = Request::post("/callback");
    if let Some(sig) = signature {
        req = req.header(SIGNATURE_HEADER, sig);
    }
    req.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn missing_signature_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let resp = stub_router(&dir)
        .oneshot(callback_request(&image_body("x"), None))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_signature_is_400() {
    let dir = tempfile::tempdir().unwrap();
    let resp = stub_router(&dir)
        .oneshot(callback_request(&image_body("x"), Some("%%%".into())))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn non_image_events_are_acknowledged() {
    let dir = tempfile::tempdir().unwrap();
    let body = json!({"events": [
        {"type": "follow", "replyToken": "rt"},
        {"type": "message", "replyToken": "rt", "message": {"type": "text", "id": "1", "text": "hi"}}
    ]})
    .to_string();
    let sig = sign(SECRET.as_bytes(), body.as_bytes());

    let resp = stub_router(&dir)
        .oneshot(callback_request(&body, Some(sig)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
    assert_eq!(&bytes[..], b"OK");
}

#[tokio::test]
async fn signed_garbage_body_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let sig = sign(SECRET.as_bytes(), b"not json");
    let resp = stub_router(&dir)
        .oneshot(callback_request("not json", Some(sig)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn undeliverable_error_reply_is_500() {
    let dir = tempfile::tempdir().unwrap();
    let body = image_body("x");
    let sig = sign(SECRET.as_bytes(), body.as_bytes());
    let resp = stub_router(&dir)
        .oneshot(callback_request(&body, Some(sig)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn health_check() {
    let dir = tempfile::tempdir().unwrap();
    let resp = stub_router(&dir)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
