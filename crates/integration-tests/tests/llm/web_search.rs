use indoc::formatdoc;
use integration_tests::{TestServer, llms::OllamaMock};
use serde_json::json;

use super::FAST_PACING;

fn search_config(cmd: &str) -> String {
    formatdoc! {r#"
        {FAST_PACING}
        [search]
        enabled = true
        cmd = {cmd}
        timeout = "5s"
    "#}
}

fn searching(question: &str, web_search: bool) -> serde_json::Value {
    json!({
        "conversation": [{ "role": "user", "content": question }],
        "model": { "provider": "ollama", "name": "llama3" },
        "web_search": web_search,
    })
}

async fn sent_prompt(cmd: &str, web_search: bool) -> String {
    let mut builder = TestServer::builder();
    let ollama = builder.spawn_provider(OllamaMock::new()).await;

    let server = builder.build(&search_config(cmd)).await;
    let response = server.client.chat(searching("What is the capital?", web_search)).await;

    assert_eq!(response.status, 200);
    assert_eq!(response.text(), "Hello");

    let requests = ollama.requests_to("/api/chat");
    requests[0].body["messages"][0]["content"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn retrieved_context_grounds_the_prompt() {
    let prompt = sent_prompt(r#"["echo", "Paris   is the capital."]"#, true).await;

    assert!(prompt.starts_with("You are an AI assistant tasked with providing detailed answers based solely on the given context."));
    assert!(prompt.contains("Context: Paris is the capital. What is the capital?"));
    assert!(prompt.contains("User Question: What is the capital?"));
}

#[tokio::test]
async fn retrieval_only_runs_when_requested() {
    let prompt = sent_prompt(r#"["echo", "Paris is the capital."]"#, false).await;

    assert!(!prompt.contains("Context:"));
    assert!(prompt.contains("User Question: What is the capital?"));
}

#[tokio::test]
async fn failing_retrieval_degrades_to_the_plain_prompt() {
    let prompt = sent_prompt(r#"["false"]"#, true).await;

    assert!(!prompt.contains("Context:"));
    assert!(prompt.contains("User Question: What is the capital?"));
}

#[tokio::test]
async fn missing_retrieval_program_degrades_to_the_plain_prompt() {
    let prompt = sent_prompt(r#"["/definitely/not/a/search/tool"]"#, true).await;

    assert!(!prompt.contains("Context:"));
}
