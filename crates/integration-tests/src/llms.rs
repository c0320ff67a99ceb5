mod common;
pub mod gemini;
pub mod ollama;
pub mod openai;

pub use common::{RecordedRequest, SpawnedProvider, TestLlmProvider};
pub use gemini::GeminiMock;
pub use ollama::OllamaMock;
pub use openai::OpenAiCompatMock;
