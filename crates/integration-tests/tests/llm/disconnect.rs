use std::time::{Duration, Instant};

use integration_tests::{TestServer, llms::OllamaMock};

use super::ask;

/// Slow enough that the full stream would outlive the test by far.
const SLOW_STREAM: &str = indoc::indoc! {r#"
    [server.health]
    enabled = true

    [llm]
    stream_pacing = "200ms"
"#};

async fn in_flight(server: &TestServer) -> u64 {
    let health: serde_json::Value = server.client.get("/health").await.json().await.unwrap();
    health["in_flight"].as_u64().unwrap()
}

#[tokio::test]
async fn disconnect_stops_the_stream() {
    let deltas = (0..50).map(|i| format!("{i} "));

    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new().with_deltas(deltas)).await;

    let server = builder.build(SLOW_STREAM).await;

    let mut response = server.client.post("/api/chat", &ask("ollama", "llama3", "Count")).await.unwrap();
    assert_eq!(response.status(), 200);

    let first = response.chunk().await.unwrap().unwrap();
    assert!(std::str::from_utf8(&first).unwrap().starts_with(r#"data: {"content": "0 ", "model": "llama3"}"#));
    assert_eq!(in_flight(&server).await, 1);

    let disconnected_at = Instant::now();
    drop(response);

    // Finishing all 50 frames would take ten seconds.
    while in_flight(&server).await > 0 {
        assert!(
            disconnected_at.elapsed() < Duration::from_secs(5),
            "the stream kept running after the client went away"
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(ollama.requests_to("/api/chat").len(), 1);

    // The relay keeps serving after the abandoned stream.
    let response = server
        .client
        .post("/api/chat", &ask("ollama", "llama3", "Again"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(in_flight(&server).await, 1);
}
