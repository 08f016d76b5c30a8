// Copyright 2025 Kore Ledger, SL
// SPDX-License-Identifier: Apache-2.0

// Generation client against a mock of the remote job API

use generation::{
    Credentials, Error, FixedInterval, GenerationClient, GenerationConfig,
    GenerationRequest, ImageSource, Orchestrator,
};

use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use std::time::Duration;

const MODELS: &str = "/key/api/v1/models";
const RUN: &str = "/key/api/v1/text2image/run";
const STATUS: &str = "/key/api/v1/text2image/status/task-1";

async fn client(server: &MockServer) -> GenerationClient {
    let config = GenerationConfig::default()
        .with_base_url(&format!("{}/key/api/v1/", server.uri()));
    GenerationClient::new(&config)
        .unwrap()
        .with_poll_strategy(FixedInterval::new(Duration::from_millis(10)))
        .with_wait_timeout(Duration::from_secs(5))
}

fn request() -> GenerationRequest {
    GenerationRequest::new(Credentials::new("key", "secret"), "sea view")
}

async fn mount_models(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(MODELS))
        .and(header("X-Key", "Key key"))
        .and(header("X-Secret", "Secret secret"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": 4, "name": "Kandinsky", "version": 3.1, "type": "TEXT2IMAGE" }
        ])))
        .mount(server)
        .await;
}

async fn mount_run(server: &MockServer, status: &str) {
    Mock::given(method("POST"))
        .and(path(RUN))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({ "uuid": "task-1", "status": status })),
        )
        .mount(server)
        .await;
}

async fn mount_status(server: &MockServer, body: serde_json::Value, times: Option<u64>) {
    let mock = Mock::given(method("GET"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_json(body));
    match times {
        Some(times) => mock.up_to_n_times(times).with_priority(1),
        None => mock,
    }
    .mount(server)
    .await;
}

fn done(image: &str) -> serde_json::Value {
    json!({ "uuid": "task-1", "status": "DONE", "images": [image], "censored": false })
}

fn processing() -> serde_json::Value {
    json!({ "uuid": "task-1", "status": "PROCESSING" })
}

#[tokio::test]
async fn test_processing_then_done() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    mount_status(&server, processing(), Some(2)).await;
    mount_status(&server, done("aGVsbG8="), None).await;

    let client = client(&server).await;
    let image = client.generate_one(&request()).await.unwrap();
    assert_eq!(image, b"hello");
    assert_eq!(client.model(&request().credentials), Some(4));
}

#[tokio::test]
async fn test_remote_failure_reason() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    mount_status(&server, processing(), Some(1)).await;
    mount_status(
        &server,
        json!({ "uuid": "task-1", "status": "FAIL", "errorDescription": "quota exceeded" }),
        None,
    )
    .await;

    let result = client(&server).await.generate_one(&request()).await;
    assert_eq!(result, Err(Error::Generation("quota exceeded".to_owned())));
}

#[tokio::test]
async fn test_submit_not_initial_is_protocol_error() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "PROCESSING").await;
    Mock::given(method("GET"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_json(done("aGVsbG8=")))
        .expect(0)
        .mount(&server)
        .await;

    let result = client(&server).await.generate_one(&request()).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn test_unauthorized_model_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MODELS))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(RUN))
        .respond_with(ResponseTemplate::new(201))
        .expect(0)
        .mount(&server)
        .await;

    let client = client(&server).await;
    assert_eq!(client.generate_one(&request()).await, Err(Error::Auth));
    assert_eq!(client.model(&request().credentials), None);
}

#[tokio::test]
async fn test_unauthorized_submit() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    Mock::given(method("POST"))
        .and(path(RUN))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = client(&server).await.generate_one(&request()).await;
    assert_eq!(result, Err(Error::Auth));
}

#[tokio::test]
async fn test_unauthorized_poll_aborts() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    Mock::given(method("GET"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server).await.generate_one(&request()).await;
    assert_eq!(result, Err(Error::Auth));
}

#[tokio::test]
async fn test_processing_until_deadline() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    mount_status(&server, processing(), None).await;

    let client = client(&server)
        .await
        .with_wait_timeout(Duration::from_millis(200));
    let started = std::time::Instant::now();
    assert_eq!(client.generate_one(&request()).await, Err(Error::Timeout));
    assert!(started.elapsed() >= Duration::from_millis(200));
}

#[tokio::test]
async fn test_censored_image() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    mount_status(
        &server,
        json!({ "uuid": "task-1", "status": "DONE", "images": ["aGVsbG8="], "censored": true }),
        None,
    )
    .await;

    let result = client(&server).await.generate_one(&request()).await;
    assert_eq!(result, Err(Error::Censored));
}

#[tokio::test]
async fn test_transient_answers_keep_polling() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    Mock::given(method("GET"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(500))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .up_to_n_times(1)
        .with_priority(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(STATUS))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "uuid": "task-1", "status": "QUEUED" })),
        )
        .up_to_n_times(1)
        .with_priority(3)
        .mount(&server)
        .await;
    mount_status(&server, done("aGk="), None).await;

    let image = client(&server).await.generate_one(&request()).await.unwrap();
    assert_eq!(image, b"hi");
}

#[tokio::test]
async fn test_model_is_fetched_once() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MODELS))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 9, "name": "m", "version": 1.0, "type": "TEXT2IMAGE" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_run(&server, "INITIAL").await;
    mount_status(&server, done("aGVsbG8="), None).await;

    let client = client(&server).await;
    client.generate_one(&request()).await.unwrap();
    client.generate_one(&request()).await.unwrap();
    assert_eq!(client.model(&request().credentials), Some(9));
}

#[tokio::test]
async fn test_model_is_cached_per_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MODELS))
        .and(header("X-Key", "Key key"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([{ "id": 9, "name": "m", "version": 1.0, "type": "TEXT2IMAGE" }])),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(MODELS))
        .and(header("X-Key", "Key other"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    mount_run(&server, "INITIAL").await;
    mount_status(&server, done("aGVsbG8="), None).await;

    let client = client(&server).await;
    client.generate_one(&request()).await.unwrap();
    let other = GenerationRequest::new(Credentials::new("other", "secret"), "sea view");
    assert_eq!(client.generate_one(&other).await, Err(Error::Auth));
    assert_eq!(client.model(&request().credentials), Some(9));
    assert_eq!(client.model(&other.credentials), None);
}

#[tokio::test]
async fn test_empty_model_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(MODELS))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let result = client(&server).await.generate_one(&request()).await;
    assert!(matches!(result, Err(Error::Protocol(_))));
}

#[tokio::test]
async fn test_submission_body() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    Mock::given(method("POST"))
        .and(path(RUN))
        .and(header("X-Key", "Key key"))
        .and(body_string_contains("name=\"params\""))
        .and(body_string_contains("application/json"))
        .and(body_string_contains(
            "\"generateParams\":{\"query\":\"sea view\"}",
        ))
        .and(body_string_contains("\"negativePromptUnclip\":\"neon\""))
        .and(body_string_contains("name=\"model_id\""))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "uuid": "task-1", "status": "INITIAL" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let mut request = request();
    request.negative_prompt = "neon".to_owned();
    let client = client(&server).await;
    let task = client.submit(&request, 4).await.unwrap();
    assert_eq!(task, "task-1");
}

#[tokio::test]
async fn test_orchestrated_round() {
    let server = MockServer::start().await;
    mount_models(&server).await;
    mount_run(&server, "INITIAL").await;
    mount_status(&server, done("aGVsbG8="), None).await;

    let orchestrator = Orchestrator::new(client(&server).await, GenerationConfig::default());
    let mut request = request();
    request.count = 3;
    let images = orchestrator
        .generate(&request, 2)
        .await
        .into_result()
        .unwrap();
    assert_eq!(images, vec![b"hello".to_vec(); 3]);
}
