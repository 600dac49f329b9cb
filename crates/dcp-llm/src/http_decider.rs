//! `OpenAI`-compatible chat-completions decider.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::decision::{DecisionRequest, PruneDecider, PruneDecision, parse_decision};
use crate::errors::DecisionError;
use crate::model_selector::ModelHandle;
use crate::prompt::{DECISION_SYSTEM_PROMPT, decision_schema, render_user_prompt};

/// Default request timeout for a decision call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Sends the decision prompt to `{base_url}/chat/completions` and parses
/// the first choice.
#[derive(Clone, Debug)]
pub struct HttpDecider {
    client: reqwest::Client,
}

impl HttpDecider {
    /// Create a decider with the default timeout.
    pub fn new() -> Result<Self, DecisionError> {
        Self::with_timeout(DEFAULT_TIMEOUT)
    }

    /// Create a decider with a custom timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self, DecisionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    /// Wrap an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn build_body(model: &ModelHandle, request: &DecisionRequest) -> Value {
        json!({
            "model": model.model.model_id,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": DECISION_SYSTEM_PROMPT},
                {"role": "user", "content": render_user_prompt(request)},
            ],
            "response_format": {
                "type": "json_schema",
                "json_schema": {
                    "name": "prune_decision",
                    "strict": true,
                    "schema": decision_schema(),
                }
            }
        })
    }
}

#[async_trait]
impl PruneDecider for HttpDecider {
    async fn decide(
        &self,
        model: &ModelHandle,
        request: &DecisionRequest,
    ) -> Result<PruneDecision, DecisionError> {
        debug!(
            session_id = %request.session_id,
            model = %model.model,
            candidates = request.candidate_ids.len(),
            "requesting prune decision"
        );

        let url = format!("{}/chat/completions", model.base_url.trim_end_matches('/'));
        let mut builder = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/json")
            .json(&Self::build_body(model, request));
        if let Some(key) = model.api_key.as_deref() {
            builder = builder.header(AUTHORIZATION, format!("Bearer {key}"));
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = parse_api_error(&body, status.as_u16());
            warn!(status = status.as_u16(), %message, "decision call rejected");
            return Err(DecisionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| DecisionError::malformed("response has no message content"))?;
        parse_decision(content)
    }
}

fn parse_api_error(body: &str, status: u16) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|json| json["error"]["message"].as_str().map(String::from))
        .unwrap_or_else(|| format!("HTTP {status}: {body}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model_selector::SelectionSource;
    use assert_matches::assert_matches;
    use dcp_core::{CallId, ModelRef};
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn handle(base_url: String) -> ModelHandle {
        ModelHandle {
            model: ModelRef::new("openai", "gpt-5-mini"),
            base_url,
            api_key: Some("sk-test".into()),
            source: SelectionSource::Fallback,
        }
    }

    fn request() -> DecisionRequest {
        DecisionRequest {
            session_id: "ses_1".into(),
            candidate_ids: vec![CallId::new("a"), CallId::new("b")],
            session_summary: "[assistant] read(a.rs)".into(),
            reason: None,
        }
    }

    fn completion(content: &str) -> Value {
        json!({"choices": [{"message": {"role": "assistant", "content": content}}]})
    }

    #[tokio::test]
    async fn decide_parses_first_choice() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-5-mini", "temperature": 0})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"pruned_tool_call_ids": ["A"], "reasoning": "superseded"}"#,
            )))
            .expect(1)
            .mount(&server)
            .await;

        let decider = HttpDecider::new().unwrap();
        let decision = decider.decide(&handle(server.uri()), &request()).await.unwrap();
        assert_eq!(decision.pruned_tool_call_ids, vec![CallId::new("a")]);
        assert_eq!(decision.reasoning, "superseded");
    }

    #[tokio::test]
    async fn api_error_message_is_extracted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .set_body_json(json!({"error": {"message": "rate limited"}})),
            )
            .mount(&server)
            .await;

        let decider = HttpDecider::new().unwrap();
        let err = decider
            .decide(&handle(server.uri()), &request())
            .await
            .unwrap_err();
        assert_matches!(err, DecisionError::Api { status: 429, ref message } if message == "rate limited");
    }

    #[tokio::test]
    async fn missing_content_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let decider = HttpDecider::new().unwrap();
        let err = decider
            .decide(&handle(server.uri()), &request())
            .await
            .unwrap_err();
        assert_matches!(err, DecisionError::Malformed { .. });
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_tolerated() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                r#"{"pruned_tool_call_ids": [], "reasoning": "keep all"}"#,
            )))
            .mount(&server)
            .await;

        let decider = HttpDecider::new().unwrap();
        let decision = decider
            .decide(&handle(format!("{}/", server.uri())), &request())
            .await
            .unwrap();
        assert!(decision.pruned_tool_call_ids.is_empty());
    }

    #[test]
    fn non_json_error_body_falls_back_to_status() {
        assert_eq!(parse_api_error("oops", 502), "HTTP 502: oops");
    }
}
