mod disconnect;
mod gemini;
mod models;
mod ollama;
mod openai_compat;
mod web_search;

use serde_json::{Value, json};

/// Short pacing so the streams finish quickly.
const FAST_PACING: &str = indoc::indoc! {r#"
    [llm]
    stream_pacing = "1ms"
"#};

fn chat_request(provider: &str, model: &str, conversation: Value) -> Value {
    json!({
        "conversation": conversation,
        "model": { "provider": provider, "name": model },
    })
}

fn ask(provider: &str, model: &str, question: &str) -> Value {
    chat_request(provider, model, json!([{ "role": "user", "content": question }]))
}
