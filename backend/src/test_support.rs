//! In-process stand-in for the remote prediction platform and its token endpoint.

use actix_multipart::Multipart;
use actix_web::dev::ServerHandle;
use actix_web::error::PayloadError;
use actix_web::http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use actix_web::http::StatusCode;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};
use serde_json::{json, Value};
use futures::stream;
use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::auth::models::ServiceAccountKey;
use crate::auth::token_service::{TokenService, TokenSource};
use crate::config::ModelPath;
use crate::interpret::ClassList;
use crate::pipeline::Pipeline;
use crate::predict::client::build_http_client;
use crate::predict::PredictionClient;

pub const PRIVATE_KEY: &str = include_str!("../testdata/service_account_key.pem");
pub const PUBLIC_KEY: &str = include_str!("../testdata/service_account_pub.pem");

const ISSUED_TOKEN: &str = "mock-access-token";

pub fn test_key(token_uri: &str) -> ServiceAccountKey {
    ServiceAccountKey {
        client_email: "gateway@demo-project.iam.gserviceaccount.com".to_string(),
        private_key: PRIVATE_KEY.to_string(),
        private_key_id: Some("key-1".to_string()),
        token_uri: token_uri.to_string(),
    }
}

pub fn model_path() -> ModelPath {
    ModelPath {
        project: "demo-project".into(),
        region: "us-central1".into(),
        model: "food_vision".into(),
        version: None,
    }
}

/// A pipeline wired to `remote` with a static token and a 1 MiB upload cap.
pub fn pipeline_for(remote: &MockRemote, classes: &[&str], timeout: Duration) -> Pipeline {
    let http_client = build_http_client(timeout).unwrap();
    let tokens = Arc::new(TokenService::new(
        http_client.clone(),
        TokenSource::Static(remote.issued_token()),
    ));
    let client = PredictionClient::new(http_client, tokens, &remote.base_url, &model_path(), timeout).unwrap();
    let classes = ClassList::new(classes.iter().map(|c| c.to_string()).collect());
    Pipeline::new(client, classes, 1024 * 1024)
}

const BOUNDARY: &str = "----gateway-test-boundary";

/// One multipart part: field name, optional filename, content.
pub type Part<'a> = (&'a str, Option<&'a str>, &'a [u8]);

/// Content type and encoded body of a `multipart/form-data` request.
pub fn multipart_body(parts: &[Part<'_>]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    for (name, filename, content) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: application/octet-stream\r\n\r\n",
                    name, filename
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
            ),
        }
        body.extend_from_slice(content);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    (format!("multipart/form-data; boundary={}", BOUNDARY), body)
}

pub fn multipart_payload(parts: &[Part<'_>]) -> Multipart {
    let (content_type, body) = multipart_body(parts);
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_str(&content_type).unwrap());
    Multipart::new(
        &headers,
        stream::once(async move { Ok::<_, PayloadError>(web::Bytes::from(body)) }),
    )
}

pub fn file_upload(content: &[u8]) -> Multipart {
    multipart_payload(&[("file", Some("upload.jpg"), content)])
}

#[derive(Clone, Debug)]
pub enum PredictBehavior {
    /// `{"predictions": [scores]}`
    Scores(Vec<f32>),
    /// Arbitrary status and body.
    Raw(StatusCode, Value),
    /// Sleeps before answering with a single score.
    Delay(Duration),
    /// Scores are the mean R, G and B values of the submitted image, so the
    /// winning class depends on the image's dominant channel.
    ByColor,
}

struct MockState {
    behavior: PredictBehavior,
    predict_hits: Arc<AtomicUsize>,
    token_hits: Arc<AtomicUsize>,
    reject_tokens: Arc<AtomicBool>,
    last_predict_path: Mutex<Option<String>>,
    last_token_form: Mutex<Option<HashMap<String, String>>>,
}

pub struct MockRemote {
    pub base_url: String,
    pub predict_hits: Arc<AtomicUsize>,
    pub token_hits: Arc<AtomicUsize>,
    reject_tokens: Arc<AtomicBool>,
    state: web::Data<MockState>,
    handle: ServerHandle,
}

impl MockRemote {
    pub async fn start(behavior: PredictBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let predict_hits = Arc::new(AtomicUsize::new(0));
        let token_hits = Arc::new(AtomicUsize::new(0));
        let reject_tokens = Arc::new(AtomicBool::new(false));
        let state = web::Data::new(MockState {
            behavior,
            predict_hits: predict_hits.clone(),
            token_hits: token_hits.clone(),
            reject_tokens: reject_tokens.clone(),
            last_predict_path: Mutex::new(None),
            last_token_form: Mutex::new(None),
        });

        let app_state = state.clone();
        let server = HttpServer::new(move || {
            App::new()
                .app_data(app_state.clone())
                .app_data(web::PayloadConfig::new(32 * 1024 * 1024))
                .route("/token", web::post().to(token))
                .route("/v1/{resource:.*}", web::post().to(predict))
        })
        .workers(2)
        .disable_signals()
        .listen(listener)
        .unwrap()
        .run();

        let handle = server.handle();
        actix_web::rt::spawn(server);

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            predict_hits,
            token_hits,
            reject_tokens,
            state,
            handle,
        }
    }

    pub fn with_rejected_tokens(self) -> Self {
        self.reject_tokens.store(true, Ordering::SeqCst);
        self
    }

    pub fn token_uri(&self) -> String {
        format!("{}/token", self.base_url)
    }

    pub fn issued_token(&self) -> String {
        ISSUED_TOKEN.to_string()
    }

    pub fn last_predict_path(&self) -> Option<String> {
        self.state.last_predict_path.lock().unwrap().clone()
    }

    pub fn last_token_form(&self) -> Option<HashMap<String, String>> {
        self.state.last_token_form.lock().unwrap().clone()
    }
}

impl Drop for MockRemote {
    fn drop(&mut self) {
        // Dropping the returned future still delivers the stop command.
        let _ = self.handle.stop(false);
    }
}

async fn token(state: web::Data<MockState>, form: web::Form<HashMap<String, String>>) -> HttpResponse {
    state.token_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_token_form.lock().unwrap() = Some(form.into_inner());

    if state.reject_tokens.load(Ordering::SeqCst) {
        return HttpResponse::Unauthorized().json(json!({
            "error": "invalid_grant",
            "error_description": "Invalid JWT Signature."
        }));
    }

    HttpResponse::Ok().json(json!({
        "access_token": ISSUED_TOKEN,
        "expires_in": 3599,
        "token_type": "Bearer"
    }))
}

async fn predict(state: web::Data<MockState>, req: HttpRequest, body: web::Bytes) -> HttpResponse {
    state.predict_hits.fetch_add(1, Ordering::SeqCst);
    *state.last_predict_path.lock().unwrap() = Some(req.path().to_string());

    let expected = format!("Bearer {}", ISSUED_TOKEN);
    let authorized = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == expected)
        .unwrap_or(false);
    if !authorized {
        return HttpResponse::Unauthorized().json(json!({"error": "invalid credentials"}));
    }

    let request: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(e) => return HttpResponse::BadRequest().json(json!({"error": e.to_string()})),
    };
    let Some(instance) = single_instance(&request) else {
        return HttpResponse::BadRequest().json(json!({"error": "expected one 224x224x3 instance"}));
    };

    match &state.behavior {
        PredictBehavior::Scores(scores) => HttpResponse::Ok().json(json!({"predictions": [scores]})),
        PredictBehavior::Raw(status, body) => HttpResponse::build(*status).json(body),
        PredictBehavior::Delay(delay) => {
            actix_web::rt::time::sleep(*delay).await;
            HttpResponse::Ok().json(json!({"predictions": [[1.0]]}))
        }
        PredictBehavior::ByColor => {
            HttpResponse::Ok().json(json!({"predictions": [channel_means(instance)]}))
        }
    }
}

fn single_instance(request: &Value) -> Option<&Vec<Value>> {
    let instances = request.get("instances")?.as_array()?;
    if instances.len() != 1 {
        return None;
    }
    let rows = instances[0].as_array()?;
    let first_pixel = rows.first()?.as_array()?.first()?.as_array()?;
    (rows.len() == 224 && first_pixel.len() == 3).then_some(rows)
}

fn channel_means(rows: &[Value]) -> Vec<f64> {
    let mut sums = [0.0f64; 3];
    let mut count = 0.0;
    for pixel in rows.iter().filter_map(Value::as_array).flatten() {
        if let Some(channels) = pixel.as_array() {
            for (sum, value) in sums.iter_mut().zip(channels) {
                *sum += value.as_f64().unwrap_or(0.0);
            }
            count += 1.0;
        }
    }
    sums.iter().map(|s| s / count / 255.0).collect()
}
