use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

use crate::types::AiDecision;

const BASE_URL: &str = "https://openrouter.ai/api/v1";
const RETRY_PAUSE: Duration = Duration::from_millis(500);
const MAX_REASON_CHARS: usize = 160;

const SYSTEM_PROMPT: &str =
    "You are a content moderation classifier. Return ONLY valid JSON. No markdown.";

/// OpenRouter-backed moderation classifier.
///
/// Constructed once at startup; `classify` is safe to call concurrently.
/// With no API key configured every call returns `None` without touching the
/// network.
pub struct Classifier {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    labels: String,
}

impl Classifier {
    /// `labels` is the CSV accept-set embedded into the prompt.
    pub fn new(
        api_key: Option<String>,
        model: String,
        timeout_sec: u64,
        labels: String,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_sec))
            .build()?;
        Ok(Self {
            client,
            api_key,
            model,
            labels,
        })
    }

    /// Classify one message. `None` means "no usable decision": missing key,
    /// transport failure after the retry, or a response that does not match
    /// the schema. Never propagates an error.
    pub async fn classify(&self, text: &str) -> Option<AiDecision> {
        let api_key = self.api_key.as_deref()?;

        for attempt in 0..2u8 {
            match self.request(api_key, text).await {
                Ok(decision) => return decision,
                Err(e) => {
                    warn!(attempt = attempt + 1, error = %e, "classifier request failed");
                    if attempt == 0 {
                        tokio::time::sleep(RETRY_PAUSE).await;
                    }
                }
            }
        }
        None
    }

    /// One transport round-trip. `Err` means transient and retriable;
    /// `Ok(None)` means the response arrived but failed the schema.
    async fn request(&self, api_key: &str, text: &str) -> Result<Option<AiDecision>, reqwest::Error> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": self.user_prompt(text)},
            ],
            "temperature": 0,
            "max_tokens": 200,
        });

        let resp = self
            .client
            .post(format!("{BASE_URL}/chat/completions"))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let payload: Value = resp.json().await?;
        let content = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .unwrap_or_default();

        let decision = parse_decision(content);
        if decision.is_none() {
            debug!(%content, "classifier returned an unusable response");
        }
        Ok(decision)
    }

    fn user_prompt(&self, text: &str) -> String {
        format!(
            "Your task is NOT to flag mentions alone. You must determine whether \
             the message PROMOTES, ENCOURAGES, or ADVERTISES prohibited content.\n\
             Important rules:\n\
             - If gambling/scam is mentioned ONLY to criticize, complain, warn, or \
             discuss negatively, it is NOT prohibited.\n\
             - Mention without promotion = allowed.\n\
             - Promotion, encouragement, instruction, or advertisement = prohibited.\n\
             Classify the following message. Detect prohibited topics: \
             gambling/betting/casino, or fraud/scam/deception/fake investment. \
             Allowed labels: {labels}.\n\n\
             Return JSON with schema: {{\"is_prohibited\": boolean, \
             \"label\": \"gambling\"|\"fraud\"|\"other\"|\"none\", \
             \"confidence\": number, \"reason\": string}}\n\n\
             Message: {text}",
            labels = self.labels,
        )
    }
}

/// Decode the model's content string into a decision, coercing loose types.
/// Any shape that cannot be coerced yields `None`.
fn parse_decision(content: &str) -> Option<AiDecision> {
    let parsed: Value = serde_json::from_str(content.trim()).ok()?;
    let obj = parsed.as_object()?;

    let is_prohibited = match obj.get("is_prohibited") {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|f| f != 0.0),
        Some(Value::String(s)) => s.trim().parse::<bool>().ok()?,
        _ => false,
    };
    let confidence = match obj.get("confidence") {
        Some(Value::Number(n)) => n.as_f64()?,
        Some(Value::String(s)) => s.trim().parse::<f64>().ok()?,
        _ => 0.0,
    };
    let label = match obj.get("label") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => "none".to_string(),
    };
    let reason: String = match obj.get("reason") {
        Some(Value::String(s)) => s.chars().take(MAX_REASON_CHARS).collect(),
        _ => String::new(),
    };

    Some(AiDecision {
        is_prohibited,
        label,
        confidence,
        reason,
    })
}
