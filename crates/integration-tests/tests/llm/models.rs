use integration_tests::{
    TestServer,
    llms::{GeminiMock, OllamaMock, OpenAiCompatMock},
};

#[tokio::test]
async fn ollama_lists_local_models() {
    let mut builder = TestServer::builder();
    builder
        .spawn_provider(OllamaMock::new().with_models(["llama3:latest", "qwen2.5:7b"]))
        .await;

    let server = builder.build("").await;
    let (status, body) = server.client.models("ollama", "").await;

    assert_eq!(status, 200);
    insta::assert_json_snapshot!(body, @r#"
    {
      "data": [
        {
          "id": "llama3:latest"
        },
        {
          "id": "qwen2.5:7b"
        }
      ]
    }
    "#);
}

#[tokio::test]
async fn gemini_catalog_is_curated() {
    let mut builder = TestServer::builder();
    let gemini = builder.spawn_provider(GeminiMock::new()).await;

    let server = builder.build("").await;
    let (status, body) = server.client.models("GEMINI", "").await;

    assert_eq!(status, 200);
    insta::assert_json_snapshot!(body, @r#"
    {
      "data": [
        {
          "id": "gemini-2.5-flash"
        },
        {
          "id": "gemini-2.0-flash"
        },
        {
          "id": "gemma-3-4b-it"
        },
        {
          "id": "gemma-3-27b-it"
        }
      ]
    }
    "#);

    assert_eq!(gemini.requests()[0].authorization.as_deref(), Some("gemini-test-key"));
}

#[tokio::test]
async fn gateway_listing_uses_the_client_key() {
    let mut builder = TestServer::builder();
    let groq = builder
        .spawn_provider(OpenAiCompatMock::new("groq").with_expected_key("gsk-client"))
        .await;

    let server = builder.build("").await;
    let (status, body) = server.client.models("groq", "gsk-client").await;

    assert_eq!(status, 200);
    assert_eq!(body["data"][0]["id"], "llama-3.1-8b-instant");
    assert_eq!(groq.requests()[0].authorization.as_deref(), Some("Bearer gsk-client"));
}

#[tokio::test]
async fn gateway_listing_without_key_fails() {
    let mut builder = TestServer::builder();
    builder.spawn_provider(OpenAiCompatMock::new("groq")).await;

    let server = builder.build("").await;
    let (status, body) = server.client.models("groq", "  ").await;

    assert_eq!(status, 400);
    insta::assert_json_snapshot!(body, @r#"
    {
      "detail": "Authentication failed: No API key was provided for groq and none is configured"
    }
    "#);
}

#[tokio::test]
async fn openrouter_listing_is_public() {
    let mut builder = TestServer::builder();
    let openrouter = builder.spawn_provider(OpenAiCompatMock::new("openrouter")).await;

    let server = builder.build("").await;
    let (status, body) = server.client.models("openrouter", "").await;

    assert_eq!(status, 200);
    assert_eq!(body["data"].as_array().unwrap().len(), 2);
    assert_eq!(openrouter.requests()[0].authorization, None);
}

#[tokio::test]
async fn huggingface_listing_is_not_supported() {
    let server = TestServer::builder().build("").await;
    let (status, body) = server.client.models("huggingface", "hf-key").await;

    assert_eq!(status, 400);
    insta::assert_json_snapshot!(body, @r#"
    {
      "detail": "Model listing is not supported for provider 'huggingface'"
    }
    "#);
}

#[tokio::test]
async fn unknown_provider_is_rejected() {
    let server = TestServer::builder().build("").await;
    let (status, body) = server.client.models("foo", "").await;

    assert_eq!(status, 400);
    insta::assert_json_snapshot!(body, @r#"
    {
      "detail": "Unsupported provider: foo"
    }
    "#);
}
