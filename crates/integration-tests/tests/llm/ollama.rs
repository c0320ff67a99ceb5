use axum::http::StatusCode;
use integration_tests::{TestServer, llms::OllamaMock};
use serde_json::json;

use super::{FAST_PACING, ask, chat_request};

#[tokio::test]
async fn streams_exact_frames() {
    let mut builder = TestServer::builder();
    builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("ollama", "llama3", "Hi")).await;

    assert_eq!(response.status, 200);
    assert!(response.content_type.starts_with("text/event-stream"));

    insta::assert_snapshot!(response.body.replace('\n', "\\n"), @r#"data: {"content": "Hel", "model": "llama3"}\n\ndata: {"content": "lo", "model": "llama3"}\n\n"#);
}

#[tokio::test]
async fn provider_name_is_case_insensitive() {
    let mut builder = TestServer::builder();
    builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("Ollama", "llama3", "Hi")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "Hello");
}

#[tokio::test]
async fn active_turn_is_wrapped_in_the_answer_template() {
    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;

    let conversation = json!([
        { "role": "system", "content": "Be brief." },
        { "role": "user", "content": "What is Rust?" },
        { "role": "assistant", "content": "A language." },
        { "role": "user", "content": "Who made it?" },
    ]);

    let response = server.client.chat(chat_request("ollama", "llama3", conversation)).await;
    assert_eq!(response.status, 200);

    let requests = ollama.requests_to("/api/chat");
    assert_eq!(requests.len(), 1);

    let body = &requests[0].body;
    assert_eq!(body["model"], "llama3");
    assert_eq!(body["stream"], true);

    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[0], json!({ "role": "system", "content": "Be brief." }));
    assert_eq!(messages[2], json!({ "role": "assistant", "content": "A language." }));

    let prompt = messages[3]["content"].as_str().unwrap();
    assert_eq!(messages[3]["role"], "user");
    assert!(prompt.starts_with("You are an AI assistant designed to provide detailed"));
    assert!(prompt.contains("User Question: Who made it?"));
    assert!(!prompt.contains("Context:"));
}

#[tokio::test]
async fn placeholder_messages_are_dropped() {
    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;

    let conversation = json!([
        { "role": "assistant", "content": "undefined" },
        { "role": "user", "content": "   " },
        { "role": "assistant", "content": null },
        { "role": "user", "content": "Hi" },
    ]);

    let response = server.client.chat(chat_request("ollama", "llama3", conversation)).await;
    assert_eq!(response.status, 200);

    let requests = ollama.requests_to("/api/chat");
    let messages = requests[0].body["messages"].as_array().unwrap();

    assert_eq!(messages.len(), 1);
    assert!(messages[0]["content"].as_str().unwrap().contains("User Question: Hi"));
}

#[tokio::test]
async fn empty_conversation_is_rejected() {
    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;

    let conversation = json!([{ "role": "user", "content": "UNDEFINED" }]);
    let response = server.client.chat(chat_request("ollama", "llama3", conversation)).await;

    assert_eq!(response.status, 400);
    insta::assert_snapshot!(response.body, @r#"{"detail":"Conversation has no messages after filtering"}"#);
    assert!(ollama.requests().is_empty());
}

#[tokio::test]
async fn unknown_role_is_rejected_with_detail() {
    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;

    let conversation = json!([{ "role": "tool", "content": "42" }]);
    let response = server.client.chat(chat_request("ollama", "llama3", conversation)).await;

    assert_eq!(response.status, 400);
    assert!(response.content_type.starts_with("application/json"));

    let body: serde_json::Value = serde_json::from_str(&response.body).unwrap();
    let detail = body["detail"].as_str().unwrap();

    assert!(detail.starts_with("Invalid request: "), "{detail}");
    assert!(detail.contains("unknown variant `tool`"), "{detail}");
    assert!(ollama.requests().is_empty());
}

#[tokio::test]
async fn unsupported_provider_is_rejected() {
    let server = TestServer::builder().build(FAST_PACING).await;
    let response = server.client.chat(ask("foo", "bar", "Hi")).await;

    assert_eq!(response.status, 400);
    insta::assert_snapshot!(response.body, @r#"{"detail":"Unsupported provider: foo"}"#);
}

#[tokio::test]
async fn upstream_rejection_is_reported_in_band() {
    let mut builder = TestServer::builder();
    builder
        .spawn_provider(OllamaMock::new().with_failure(StatusCode::NOT_FOUND, "model 'nope' not found"))
        .await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("ollama", "nope", "Hi")).await;

    assert_eq!(response.status, 200);
    insta::assert_json_snapshot!(response.events(), @r#"
    [
      {
        "error": "Model not found: model 'nope' not found"
      }
    ]
    "#);
}

#[tokio::test]
async fn mid_stream_error_ends_the_stream() {
    let mut builder = TestServer::builder();
    builder
        .spawn_provider(
            OllamaMock::new()
                .with_deltas(["one ", "two ", "three"])
                .with_stream_error(2, "out of memory"),
        )
        .await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("ollama", "llama3", "Count")).await;

    assert_eq!(response.status, 200);
    insta::assert_json_snapshot!(response.events(), @r#"
    [
      {
        "content": "one ",
        "model": "llama3"
      },
      {
        "content": "two ",
        "model": "llama3"
      },
      {
        "error": "out of memory"
      }
    ]
    "#);
}

#[tokio::test]
async fn unreachable_upstream_is_reported_in_band() {
    let config = indoc::indoc! {r#"
        [llm]
        stream_pacing = "1ms"

        [llm.providers.ollama]
        base_url = "http://127.0.0.1:1"
    "#};

    let server = TestServer::builder().build(config).await;
    let response = server.client.chat(ask("ollama", "llama3", "Hi")).await;

    assert_eq!(response.status, 200);

    let events = response.events();
    assert_eq!(events.len(), 1);
    assert!(events[0]["error"].as_str().unwrap().starts_with("Connection error:"));
}

#[tokio::test]
async fn pull_progress_is_passed_through() {
    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;

    let response = server
        .client
        .post("/api/ollama/pull", &json!({ "model": "llama3" }))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "application/x-ndjson");

    let body = response.text().await.unwrap();
    let lines: Vec<serde_json::Value> = body.lines().map(|line| serde_json::from_str(line).unwrap()).collect();

    assert_eq!(
        lines,
        vec![
            json!({ "status": "pulling manifest" }),
            json!({ "status": "downloading", "completed": 512, "total": 1024 }),
            json!({ "status": "success" }),
        ]
    );

    let requests = ollama.requests_to("/api/pull");
    assert_eq!(requests[0].body, json!({ "model": "llama3", "stream": true }));
}

#[tokio::test]
async fn failed_pull_is_an_error_response() {
    let mut builder = TestServer::builder();
    builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(FAST_PACING).await;

    let response = server
        .client
        .post("/api/ollama/pull", &json!({ "model": "missing" }))
        .await
        .unwrap();

    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    insta::assert_json_snapshot!(body, @r#"
    {
      "detail": "Model not found: pull model manifest: file does not exist"
    }
    "#);
}
