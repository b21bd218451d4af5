//! services/api/src/adapters/followup_llm.rs
//!
//! This module contains the adapter for the follow-up-generating LLM.
//! It implements the `FollowupGenerationService` port from the `core` crate
//! against any OpenAI-compatible chat-completion endpoint (by default
//! Google's Gemini compatibility endpoint).

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use followup_core::{
    domain::FollowupDraft,
    ports::{FollowupGenerationService, PortError, PortResult},
};
use regex::Regex;

/// The user-content template. The prompt's content is NOT part of this; it
/// travels verbatim as the system message.
const USER_CONTENT_TEMPLATE: &str = r#"Original Question: {question}

User's Answer: {answer}

Please generate exactly 1 thoughtful follow-up question based on the user's answer above, along with a clear reason explaining why this follow-up question is needed.

Format your response as a JSON object with exactly these two fields:
{
    "question": "Your follow-up question here?",
    "reason": "Explanation of why this follow-up question is needed"
}

Make sure the question ends with a question mark and the reason is a clear, concise explanation. Even if no question is generated, please provide a reason."#;

const MAX_OUTPUT_TOKENS: u32 = 1000;

//=========================================================================================
// Response Parsing
//=========================================================================================

/// How the provider's reply was understood. Both variants normalize to the
/// same `FollowupDraft` contract; the tag exists so each path can be tested
/// on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFollowup {
    /// The reply was the requested two-field JSON object.
    Structured { question: String, reason: String },
    /// The reply was free-form text; the question was salvaged
    /// heuristically.
    Heuristic { question: String, reason: String },
}

impl ParsedFollowup {
    /// Applies the output contract: the question always ends with `?`.
    pub fn normalize(self) -> FollowupDraft {
        let (question, reason) = match self {
            ParsedFollowup::Structured { question, reason }
            | ParsedFollowup::Heuristic { question, reason } => (question, reason),
        };
        let mut question = question.trim().to_string();
        if !question.is_empty() && !question.ends_with('?') {
            question.push('?');
        }
        FollowupDraft {
            question,
            reason: reason.trim().to_string(),
        }
    }
}

/// Strips a Markdown code fence (```json ... ``` or ``` ... ```) if the
/// whole reply is wrapped in one. Gemini likes to fence its JSON.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[derive(serde::Deserialize)]
struct StructuredReply {
    question: String,
    reason: String,
}

/// Parses a provider reply. Strict JSON first; anything else falls back to
/// taking the FIRST question-mark-terminated run of text as the question and
/// the remainder as the reason. No question mark at all means the entire
/// reply is the question and the reason stays empty. Malformed input never
/// errors; that is the point of the fallback.
pub fn parse_followup_reply(raw: &str) -> ParsedFollowup {
    let cleaned = strip_code_fence(raw);

    if let Ok(reply) = serde_json::from_str::<StructuredReply>(cleaned) {
        return ParsedFollowup::Structured {
            question: reply.question,
            reason: reply.reason,
        };
    }

    // Policy: when several sentences end in '?', only the first one is the
    // follow-up; everything after it is treated as rationale.
    let question_run = Regex::new(r"(?s)[^?]*\?").unwrap();
    match question_run.find(cleaned) {
        Some(found) => ParsedFollowup::Heuristic {
            question: found.as_str().trim().to_string(),
            reason: cleaned[found.end()..].trim().to_string(),
        },
        None => ParsedFollowup::Heuristic {
            question: cleaned.trim().to_string(),
            reason: String::new(),
        },
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `FollowupGenerationService` using an
/// OpenAI-compatible LLM endpoint.
#[derive(Clone)]
pub struct OpenAiFollowupAdapter {
    client: Client<OpenAIConfig>,
}

impl OpenAiFollowupAdapter {
    /// Creates a new `OpenAiFollowupAdapter`. The model is chosen per call
    /// from the prompt driving the run, not fixed at construction.
    pub fn new(client: Client<OpenAIConfig>) -> Self {
        Self { client }
    }
}

//=========================================================================================
// `FollowupGenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl FollowupGenerationService for OpenAiFollowupAdapter {
    /// Issues one chat-completion request and parses the reply into a
    /// follow-up draft. JSON-malformed-but-delivered replies go through the
    /// heuristic parser; transport and provider errors propagate as
    /// `Connectivity`.
    async fn generate_followup(
        &self,
        prompt_context: &str,
        question: &str,
        answer: &str,
        model: &str,
        temperature: f64,
    ) -> PortResult<FollowupDraft> {
        let user_content = USER_CONTENT_TEMPLATE
            .replace("{question}", question)
            .replace("{answer}", answer);

        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(prompt_context)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user_content)
                .build()
                .map_err(|e| PortError::Unexpected(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(temperature as f32)
            .max_completion_tokens(MAX_OUTPUT_TOKENS)
            .n(1)
            .build()
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        // Exactly one attempt; retries are the caller's business if ever.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Connectivity(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| {
                PortError::Connectivity("Generation API returned no text content".to_string())
            })?;

        Ok(parse_followup_reply(&content).normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_structured_json_reply() {
        let raw = r#"{"question": "What backend technologies do you use?", "reason": "To assess technical depth"}"#;
        let parsed = parse_followup_reply(raw);
        assert_eq!(
            parsed,
            ParsedFollowup::Structured {
                question: "What backend technologies do you use?".into(),
                reason: "To assess technical depth".into(),
            }
        );
    }

    #[test]
    fn parses_code_fenced_json_reply() {
        let raw = "```json\n{\"question\": \"How large is the team?\", \"reason\": \"Scope\"}\n```";
        let parsed = parse_followup_reply(raw);
        assert!(matches!(parsed, ParsedFollowup::Structured { .. }));
        let draft = parsed.normalize();
        assert_eq!(draft.question, "How large is the team?");
        assert_eq!(draft.reason, "Scope");
    }

    #[test]
    fn appends_question_mark_when_missing() {
        // A structured reply whose question forgot its question mark.
        let raw = r#"{"question":"What backend technologies do you use","reason":"To assess technical depth"}"#;
        let draft = parse_followup_reply(raw).normalize();
        assert_eq!(draft.question, "What backend technologies do you use?");
        assert_eq!(draft.reason, "To assess technical depth");
    }

    #[test]
    fn malformed_json_falls_back_to_first_question_run() {
        let raw = "Here is my idea. What made you choose that stack? It matters because context.";
        let parsed = parse_followup_reply(raw);
        match parsed {
            ParsedFollowup::Heuristic { question, reason } => {
                assert_eq!(
                    question,
                    "Here is my idea. What made you choose that stack?"
                );
                assert_eq!(reason, "It matters because context.");
            }
            other => panic!("Expected Heuristic, got {:?}", other),
        }
    }

    #[test]
    fn only_the_first_question_run_is_taken() {
        let raw = "Why that? Why not this? Trailing thoughts.";
        let draft = parse_followup_reply(raw).normalize();
        assert_eq!(draft.question, "Why that?");
        assert_eq!(draft.reason, "Why not this? Trailing thoughts.");
    }

    #[test]
    fn no_question_mark_means_whole_reply_is_the_question() {
        let raw = "Tell me more about the deployment setup";
        let parsed = parse_followup_reply(raw);
        match &parsed {
            ParsedFollowup::Heuristic { question, reason } => {
                assert_eq!(question, "Tell me more about the deployment setup");
                assert!(reason.is_empty());
            }
            other => panic!("Expected Heuristic, got {:?}", other),
        }
        // Normalization still enforces the trailing question mark.
        let draft = parsed.normalize();
        assert_eq!(draft.question, "Tell me more about the deployment setup?");
        assert_eq!(draft.reason, "");
    }

    #[test]
    fn structured_reply_with_extra_fields_still_parses() {
        let raw = r#"{"question":"And then?","reason":"Continuity","confidence":0.9}"#;
        let draft = parse_followup_reply(raw).normalize();
        assert_eq!(draft.question, "And then?");
        assert_eq!(draft.reason, "Continuity");
    }

    #[test]
    fn whitespace_is_trimmed_during_normalization() {
        let raw = "```\n{\"question\": \"  Where does it run? \", \"reason\": \" Ops \"}\n```";
        let draft = parse_followup_reply(raw).normalize();
        assert_eq!(draft.question, "Where does it run?");
        assert_eq!(draft.reason, "Ops");
    }
}
