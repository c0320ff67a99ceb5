//! Instruction templates wrapped around the user's question before dispatch.

use std::sync::LazyLock;

use indoc::formatdoc;
use regex::Regex;

use crate::messages::Message;

static HORIZONTAL_WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\S\n]+").expect("valid regex"));

/// Wraps `query` in the answer template, grounding it on `context` when retrieval produced any.
///
/// Runs of spaces and tabs are collapsed to a single space across the whole prompt,
/// retrieved context included. Line breaks are kept.
pub fn build_prompt(query: &str, context: Option<&str>) -> Message {
    let prompt = match context.filter(|context| !context.trim().is_empty()) {
        Some(context) => with_context(query, context),
        None => without_context(query),
    };

    Message::user(HORIZONTAL_WHITESPACE.replace_all(&prompt, " "))
}

fn with_context(query: &str, context: &str) -> String {
    formatdoc! {"
        You are an AI assistant tasked with providing detailed answers based solely on the given context. Your goal is to analyze the information provided and formulate a comprehensive, well-structured response to the question.
         Context: {context}
         User Question: {query}
         Important Instruction to follow strictly-
        \x20
         To answer the question:
         1. Thoroughly analyze the context, identifying key information relevant to the question.
         2. Organize your thoughts and plan your response to ensure a logical flow of information.
         3. Formulate a detailed answer that directly addresses the question, using only the information provided in the context.
         4. Ensure your answer is comprehensive, covering all relevant aspects found in the context.
         5. If the context doesn't contain sufficient information to fully answer the question, state this clearly in your response.
        \x20
         Format your response as follows:
         1. Use clear, concise language.
         2. Organize your answer into paragraphs for readability.
         3. Use bullet points or numbered lists where appropriate to break down complex information.
         4. If relevant, include any headings or subheadings to structure your response.
         5. Ensure proper grammar, punctuation, and spelling throughout your answer.
        \x20
         Important: Base your entire response solely on the information provided in the context. Do not include any external knowledge or assumptions not present in the given text."
    }
}

fn without_context(query: &str) -> String {
    formatdoc! {"
        You are an AI assistant designed to provide detailed and informative answers to user questions. Your goal is to analyze the question, draw upon your vast knowledge base, and formulate a comprehensive, well-structured response.
         User Question: {query}
         Important Instruction to follow strictly-
        \x20
         To answer the question:
         1. Thoroughly analyze the question, identifying key information and its underlying intent.
         2. Organize your thoughts and plan your response to ensure a logical flow of information and a clear articulation of your understanding.
         3. Formulate a detailed answer that directly addresses the question, drawing upon your extensive knowledge and reasoning capabilities.
         4. Ensure your answer is comprehensive, covering all relevant aspects and perspectives.
         5. Acknowledge any limitations in your knowledge or understanding, and suggest avenues for further exploration if appropriate.
        \x20
         Format your response as follows:
         1. Use clear, concise, and accurate language.
         2. Organize your answer into paragraphs for readability and a clear progression of ideas.
         3. Use bullet points or numbered lists where appropriate to break down complex information or present a series of related points.
         4. If relevant, include any headings or subheadings to structure your response.
         5. Ensure proper grammar, punctuation, and spelling throughout your answer.
        \x20
         Important: Base your entire response solely on the information provided in the context. Do not include any external knowledge or assumptions not present in the given text."
    }
}

#[cfg(test)]
mod tests {
    use crate::messages::Role;

    use super::*;

    #[test]
    fn prompt_without_context() {
        let message = build_prompt("What is Rust?", None);

        assert_eq!(message.role, Role::User);
        assert!(message.content.starts_with("You are an AI assistant designed to provide detailed"));
        assert!(message.content.contains("\n User Question: What is Rust?\n Important Instruction to follow strictly-\n \n To answer the question:\n"));
        assert!(message.content.contains("throughout your answer.\n \n Important: Base your entire response"));
        assert!(message.content.lines().all(|line| !line.is_empty()));
    }

    #[test]
    fn separator_lines_hold_a_single_space() {
        let message = build_prompt("Who won?", Some("Team A won."));

        let separators = message.content.lines().filter(|line| line.trim().is_empty()).collect::<Vec<_>>();

        assert_eq!(separators, [" ", " ", " "]);
    }

    #[test]
    fn context_is_embedded_and_collapsed() {
        let message = build_prompt("Who won?", Some("Team\t\tA   won\nthe final."));

        assert!(message.content.starts_with("You are an AI assistant tasked with providing detailed answers"));
        assert!(message.content.contains("\n Context: Team A won\nthe final.\n User Question: Who won?\n"));
    }

    #[test]
    fn blank_context_uses_the_plain_template() {
        let message = build_prompt("Hi", Some("  \n "));

        assert!(message.content.starts_with("You are an AI assistant designed to provide"));
        assert!(!message.content.contains("Context:"));
    }

    #[test]
    fn no_runs_of_spaces_remain() {
        let message = build_prompt("a    b", Some("c \t d"));

        assert!(!message.content.contains("  "));
        assert!(!message.content.contains('\t'));
    }
}
