use std::sync::atomic::Ordering;

use integration_tests::{TestServer, llms::GeminiMock};
use serde_json::json;

use super::{FAST_PACING, ask, chat_request};

#[tokio::test]
async fn single_turn_streams_without_replay() {
    let mock = GeminiMock::new();
    let generate_calls = mock.generate_calls();

    let mut builder = TestServer::builder();
    let gemini = builder.spawn_provider(mock).await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("gemini", "gemini-2.0-flash", "Salut")).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "Bonjour");
    assert_eq!(generate_calls.load(Ordering::SeqCst), 0);

    let requests = gemini.requests_to(":streamGenerateContent");
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].authorization.as_deref(), Some("gemini-test-key"));
    assert_eq!(requests[0].path, "/models/gemini-2.0-flash:streamGenerateContent");
}

#[tokio::test]
async fn history_is_replayed_turn_by_turn() {
    let mock = GeminiMock::new();
    let generate_calls = mock.generate_calls();

    let mut builder = TestServer::builder();
    let gemini = builder.spawn_provider(mock).await;

    let server = builder.build(FAST_PACING).await;

    let conversation = json!([
        { "role": "system", "content": "Answer in French." },
        { "role": "user", "content": "first" },
        { "role": "assistant", "content": "premier" },
        { "role": "user", "content": "second" },
        { "role": "user", "content": "third" },
    ]);

    let response = server
        .client
        .chat(chat_request("gemini", "models/gemini-2.0-flash", conversation))
        .await;

    assert_eq!(response.text(), "Bonjour");
    assert_eq!(generate_calls.load(Ordering::SeqCst), 2);

    let replayed = gemini.requests_to(":generateContent");
    assert_eq!(replayed[0].body["contents"], json!([{ "role": "user", "parts": [{ "text": "first" }] }]));
    assert_eq!(
        replayed[0].body["systemInstruction"],
        json!({ "parts": [{ "text": "Answer in French." }] })
    );

    let streamed = gemini.requests_to(":streamGenerateContent");
    assert_eq!(streamed.len(), 1);

    let contents = streamed[0].body["contents"].as_array().unwrap();
    assert_eq!(contents.len(), 5);

    // The client's own answer wins over the replayed one; the unanswered turn keeps the replay.
    assert_eq!(contents[1], json!({ "role": "model", "parts": [{ "text": "premier" }] }));
    assert_eq!(contents[2], json!({ "role": "user", "parts": [{ "text": "second" }] }));
    assert_eq!(contents[3], json!({ "role": "model", "parts": [{ "text": "replayed" }] }));

    assert_eq!(contents[4]["role"], "user");
    assert!(
        contents[4]["parts"][0]["text"]
            .as_str()
            .unwrap()
            .contains("User Question: third")
    );

    assert_eq!(
        streamed[0].body["generationConfig"],
        json!({ "responseMimeType": "text/plain" })
    );
}

#[tokio::test]
async fn missing_key_is_reported_in_band() {
    let mut builder = TestServer::builder();
    let gemini = builder.spawn_provider(GeminiMock::new().without_configured_key()).await;

    let server = builder.build(FAST_PACING).await;
    let response = server.client.chat(ask("gemini", "gemini-2.0-flash", "Hi")).await;

    assert_eq!(response.status, 200);
    insta::assert_json_snapshot!(response.events(), @r#"
    [
      {
        "error": "Authentication failed: No API key was provided for gemini and none is configured"
      }
    ]
    "#);
    assert!(gemini.requests().is_empty());
}
