//! Chat-completion gateway for the three reflective use cases.
//!
//! Every call asks the model for a JSON object. The reply is parsed leniently:
//! anything the model gets wrong degrades to empty fields instead of an error.
//! Transport failures and non-2xx answers become `AppError::Llm` carrying the
//! upstream message. Nothing is retried.

use crate::error::AppError;
use crate::models::{Category, Highlight};
use serde::Deserialize;
use serde_json::{json, Value};

const CATEGORY_SYSTEM_PROMPT: &str = "You classify user decision prompts into exactly one category: career, relationship, or others. Return compact JSON only.";

const REFLECT_SYSTEM_PROMPT: &str = "You are a Mirror, not an Oracle. Your role is to reflect back insights about the user's decision-making context: questions they might not have asked, patterns you notice, and a brief summary, without prescribing what they should do. Be concise and supportive.";

const HIGHLIGHTS_SYSTEM_PROMPT: &str = "You analyze past decision highlights and return practical, concise coaching. Return JSON only.";

#[derive(Clone)]
pub struct LlmGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Categorization {
    pub category: Category,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reflection {
    pub questions: Vec<String>,
    pub summary: String,
    pub pattern_hint: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightAnalysis {
    pub pattern: String,
    pub guidance: String,
    pub next_action: String,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlmGateway {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Sends one system + user exchange and returns the raw content of the first choice
    /// (`"{}"` when the model answered nothing).
    async fn complete_json(&self, system: &str, user: &str) -> Result<String, AppError> {
        let request = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
            "response_format": { "type": "json_object" },
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Llm(upstream_message(status, &body)));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(e.to_string()))?;

        Ok(completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_else(|| "{}".to_string()))
    }

    pub async fn categorize(&self, context: &str) -> Result<Categorization, AppError> {
        let prompt = format!(
            "Classify this decision context into one category.\n\nContext:\n{context}\n\n\
             Return JSON with keys: \"category\" (\"career\" | \"relationship\" | \"others\") and \"reason\" (short sentence)."
        );
        let content = self.complete_json(CATEGORY_SYSTEM_PROMPT, &prompt).await?;

        let parsed: Value = serde_json::from_str(&content).unwrap_or(Value::Null);
        Ok(Categorization {
            category: Category::normalize(parsed.get("category")),
            reason: string_field(&parsed, "reason"),
        })
    }

    pub async fn reflect(&self, context: &str) -> Result<Reflection, AppError> {
        let prompt = if context.trim().is_empty() {
            "The user has not shared context yet. Respond with a JSON object containing: \
             \"questions\" (array of 2-3 generic reflective questions), \"summary\" (empty string), \
             \"patternHint\" (empty string)."
                .to_string()
        } else {
            format!(
                "The user shared this decision context:\n\n{context}\n\n\
                 Respond with a JSON object containing exactly these keys: \"questions\" (array of 2-4 reflective questions), \
                 \"summary\" (1-2 sentence summary), \"patternHint\" (one short observation about a pattern)."
            )
        };
        let content = self.complete_json(REFLECT_SYSTEM_PROMPT, &prompt).await?;

        let parsed: Value = serde_json::from_str(&content).unwrap_or(Value::Null);
        let questions = parsed
            .get("questions")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Ok(Reflection {
            questions,
            summary: string_field(&parsed, "summary"),
            pattern_hint: string_field(&parsed, "patternHint"),
        })
    }

    pub async fn analyze_highlights(
        &self,
        highlights: &[Highlight],
    ) -> Result<HighlightAnalysis, AppError> {
        let prompt = format!(
            "Analyze these past highlights and return JSON with exactly these keys:\n\
             \"pattern\" (1-2 sentences), \"guidance\" (1-2 sentences), \"nextAction\" (one concrete action).\n\n\
             Highlights:\n{}",
            render_highlights(highlights)
        );
        let content = self.complete_json(HIGHLIGHTS_SYSTEM_PROMPT, &prompt).await?;

        let parsed: Value = serde_json::from_str(&content).unwrap_or(Value::Null);
        Ok(HighlightAnalysis {
            pattern: string_field(&parsed, "pattern"),
            guidance: string_field(&parsed, "guidance"),
            next_action: string_field(&parsed, "nextAction"),
        })
    }
}

/// A missing or non-string field reads as empty without affecting its siblings.
fn string_field(parsed: &Value, key: &str) -> String {
    parsed
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

/// Numbered, blank-line separated blocks; empty fields read as `n/a` (`unknown` for category).
pub fn render_highlights(highlights: &[Highlight]) -> String {
    fn or<'a>(value: &'a str, fallback: &'a str) -> &'a str {
        if value.is_empty() {
            fallback
        } else {
            value
        }
    }

    highlights
        .iter()
        .enumerate()
        .map(|(i, h)| {
            format!(
                "#{}\nCategory: {}\nDecision: {}\nReaction: {}\nInsight: {}",
                i + 1,
                or(&h.category, "unknown"),
                or(&h.decision, "n/a"),
                or(&h.reaction, "n/a"),
                or(&h.insight, "n/a"),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prefers the provider's `error.message`; falls back to the raw body, then the status line.
fn upstream_message(status: reqwest::StatusCode, body: &str) -> String {
    let from_json = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        v.pointer("/error/message")
            .and_then(Value::as_str)
            .map(str::to_string)
    });
    match from_json {
        Some(message) => message,
        None if !body.trim().is_empty() => format!("{status}: {}", body.trim()),
        None => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway(server: &MockServer) -> LlmGateway {
        LlmGateway::new(
            reqwest::Client::new(),
            format!("{}/v1", server.uri()),
            "sk-test",
            "gpt-4o-mini",
        )
    }

    fn completion(content: &str) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "choices": [{ "message": { "role": "assistant", "content": content } }]
        }))
    }

    #[tokio::test]
    async fn test_categorize_normalizes_category() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({
                "model": "gpt-4o-mini",
                "response_format": { "type": "json_object" }
            })))
            .respond_with(completion(r#"{"category":"CAREER","reason":"Job offer."}"#))
            .expect(1)
            .mount(&server)
            .await;

        let result = gateway(&server).categorize("Take the job?").await.unwrap();
        assert_eq!(result.category, Category::Career);
        assert_eq!(result.reason, "Job offer.");
    }

    #[tokio::test]
    async fn test_unparseable_content_degrades_to_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion("not json at all"))
            .mount(&server)
            .await;

        let reflection = gateway(&server).reflect("ctx").await.unwrap();
        assert_eq!(reflection, Reflection::default());

        let categorization = gateway(&server).categorize("ctx").await.unwrap();
        assert_eq!(categorization.category, Category::Others);
        assert_eq!(categorization.reason, "");
    }

    #[tokio::test]
    async fn test_reflect_parses_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(
                r#"{"questions":["What would you regret?","Who benefits?"],"summary":"You want change.","patternHint":"Safety first."}"#,
            ))
            .mount(&server)
            .await;

        let reflection = gateway(&server).reflect("Move abroad?").await.unwrap();
        assert_eq!(reflection.questions.len(), 2);
        assert_eq!(reflection.summary, "You want change.");
        assert_eq!(reflection.pattern_hint, "Safety first.");
    }

    #[tokio::test]
    async fn test_mistyped_field_keeps_the_others() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(
                r#"{"questions":"What scares you?","summary":"kept","patternHint":"also kept"}"#,
            ))
            .mount(&server)
            .await;

        let reflection = gateway(&server).reflect("Move abroad?").await.unwrap();
        assert!(reflection.questions.is_empty());
        assert_eq!(reflection.summary, "kept");
        assert_eq!(reflection.pattern_hint, "also kept");

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(completion(
                r#"{"pattern":["not","a","string"],"guidance":"Sleep on it.","nextAction":7}"#,
            ))
            .mount(&server)
            .await;

        let highlights = [Highlight {
            category: "career".to_string(),
            decision: "Quit?".to_string(),
            reaction: "Relieved".to_string(),
            insight: String::new(),
        }];
        let analysis = gateway(&server).analyze_highlights(&highlights).await.unwrap();
        assert_eq!(analysis.pattern, "");
        assert_eq!(analysis.guidance, "Sleep on it.");
        assert_eq!(analysis.next_action, "");
    }

    #[tokio::test]
    async fn test_upstream_error_message_is_echoed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({
                "error": { "message": "You exceeded your current quota" }
            })))
            .mount(&server)
            .await;

        let err = gateway(&server).reflect("ctx").await.unwrap_err();
        assert!(matches!(err, AppError::Llm(msg) if msg == "You exceeded your current quota"));
    }

    #[test]
    fn test_render_highlights() {
        let highlights = vec![
            Highlight {
                category: "career".into(),
                decision: "Quit?".into(),
                reaction: "Relieved".into(),
                insight: String::new(),
            },
            Highlight {
                category: String::new(),
                decision: "Move?".into(),
                reaction: String::new(),
                insight: "Stay.".into(),
            },
        ];
        assert_eq!(
            render_highlights(&highlights),
            "#1\nCategory: career\nDecision: Quit?\nReaction: Relieved\nInsight: n/a\n\n\
             #2\nCategory: unknown\nDecision: Move?\nReaction: n/a\nInsight: Stay."
        );
    }
}
