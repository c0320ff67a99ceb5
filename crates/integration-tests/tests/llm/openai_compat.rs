use integration_tests::{TestServer, llms::OpenAiCompatMock};
use serde_json::json;

use super::{FAST_PACING, ask};

#[tokio::test]
async fn every_gateway_streams_its_deltas() {
    for provider in ["huggingface", "openrouter", "groq"] {
        let mut builder = TestServer::builder();
        let gateway = builder
            .spawn_provider(OpenAiCompatMock::new(provider).with_configured_key("configured-key"))
            .await;

        let server = builder.build(FAST_PACING).await;
        let response = server.client.chat(ask(provider, "some/model", "Hi")).await;

        assert_eq!(response.status, 200, "{provider}");
        assert_eq!(response.text(), "Hi there", "{provider}");
        assert!(response.events().iter().all(|event| event["model"] == "some/model"));

        let requests = gateway.requests_to("/chat/completions");
        assert_eq!(requests.len(), 1, "{provider}");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer configured-key"));
        assert_eq!(requests[0].body["stream"], true);
        assert_eq!(requests[0].body["model"], "some/model");
    }
}

#[tokio::test]
async fn client_key_takes_precedence() {
    let mut builder = TestServer::builder();
    let groq = builder
        .spawn_provider(
            OpenAiCompatMock::new("groq")
                .with_configured_key("configured-key")
                .with_expected_key("client-key"),
        )
        .await;

    let server = builder.build(FAST_PACING).await;

    let request = json!({
        "conversation": [{ "role": "user", "content": "Hi" }],
        "model": { "provider": "groq", "name": "llama-3.1-8b-instant", "key": "client-key" },
    });

    let response = server.client.chat(request).await;

    assert_eq!(response.text(), "Hi there");
    assert_eq!(
        groq.requests()[0].authorization.as_deref(),
        Some("Bearer client-key")
    );
}

#[tokio::test]
async fn missing_key_is_reported_in_band() {
    let mut builder = TestServer::builder();
    let groq = builder.spawn_provider(OpenAiCompatMock::new("groq")).await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("groq", "llama-3.1-8b-instant", "Hi")).await;

    assert_eq!(response.status, 200);
    insta::assert_json_snapshot!(response.events(), @r#"
    [
      {
        "error": "Authentication failed: No API key was provided for groq and none is configured"
      }
    ]
    "#);
    assert!(groq.requests().is_empty());
}

#[tokio::test]
async fn rejected_key_is_reported_in_band() {
    let mut builder = TestServer::builder();
    builder
        .spawn_provider(
            OpenAiCompatMock::new("openrouter")
                .with_configured_key("stale-key")
                .with_expected_key("fresh-key"),
        )
        .await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("openrouter", "openai/gpt-4o", "Hi")).await;

    assert_eq!(response.status, 200);
    insta::assert_json_snapshot!(response.events(), @r#"
    [
      {
        "error": "Authentication failed: Invalid API Key"
      }
    ]
    "#);
}

#[tokio::test]
async fn error_chunk_ends_the_stream() {
    let mut builder = TestServer::builder();
    builder
        .spawn_provider(
            OpenAiCompatMock::new("huggingface")
                .with_configured_key("hf-key")
                .with_deltas(["a", "b", "c"])
                .with_stream_error(1, "Model is overloaded"),
        )
        .await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("huggingface", "meta-llama/Llama-3.1-8B", "Hi")).await;

    insta::assert_json_snapshot!(response.events(), @r#"
    [
      {
        "content": "a",
        "model": "meta-llama/Llama-3.1-8B"
      },
      {
        "error": "Model is overloaded"
      }
    ]
    "#);
}
