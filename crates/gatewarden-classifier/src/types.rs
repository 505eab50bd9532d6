use serde::{Deserialize, Serialize};

/// Structured verdict from the external classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AiDecision {
    pub is_prohibited: bool,
    pub label: String,
    pub confidence: f64,
    /// Human-readable justification, clamped to 160 chars.
    pub reason: String,
}
