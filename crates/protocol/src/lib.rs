use anyhow::Result;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const API_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct QueryRequest {
    pub query: String,
}

/// One cited evidence passage.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct SourceDoc {
    /// Chunk id
    pub id: String,
    pub title: String,
    pub source: String,
    /// Human-readable section name (`Plot Ending`)
    pub section: String,
    pub snippet: String,
    /// Rerank score capped at 1.0
    pub score: f32,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, JsonSchema)]
pub struct QueryResponse {
    pub answer: String,
    pub sources: Vec<SourceDoc>,
    pub hallucination_score: f32,
    pub latency_ms: f64,
    pub confidence: f32,
    #[serde(default)]
    pub is_hallucinated: bool,
    /// Lower-case intent label the query was classified as
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct ErrorEnvelope {
    pub code: String,
    pub message: String,
    pub hint: Option<String>,
}

impl ErrorEnvelope {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            hint: None,
        }
    }

    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, JsonSchema)]
pub struct HealthResponse {
    pub status: String,
    pub schema_version: u32,
    pub version: String,
}

impl HealthResponse {
    pub fn ok(version: impl Into<String>) -> Self {
        Self {
            status: "ok".to_string(),
            schema_version: API_SCHEMA_VERSION,
            version: version.into(),
        }
    }
}

pub fn serialize_json<T: Serialize>(value: &T) -> Result<String> {
    serde_json::to_string(value).map_err(Into::into)
}

/// JSON Schemas of every HTTP payload, keyed by type name.
pub fn api_schemas() -> Result<serde_json::Value> {
    Ok(serde_json::json!({
        "schema_version": API_SCHEMA_VERSION,
        "QueryRequest": serde_json::to_value(schemars::schema_for!(QueryRequest))?,
        "QueryResponse": serde_json::to_value(schemars::schema_for!(QueryResponse))?,
        "ErrorEnvelope": serde_json::to_value(schemars::schema_for!(ErrorEnvelope))?,
        "HealthResponse": serde_json::to_value(schemars::schema_for!(HealthResponse))?,
    }))
}
