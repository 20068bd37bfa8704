//! Request/response bodies for the REST API.

use serde::{Deserialize, Serialize};
use silica_core::storage::SessionInfo;

#[derive(Debug, Deserialize)]
pub struct CreateSessionRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub name: String,
    pub model: String,
    pub created_at: String,
    pub updated_at: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
}

impl From<SessionInfo> for SessionResponse {
    fn from(info: SessionInfo) -> Self {
        Self {
            id: info.id,
            name: info.name,
            model: info.model,
            created_at: info.created_at.to_rfc3339(),
            updated_at: info.updated_at.to_rfc3339(),
            input_tokens: info.input_tokens,
            output_tokens: info.output_tokens,
            cost_usd: info.cost_usd,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub role: String,
    pub content: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub session: SessionResponse,
    pub turns: Vec<TurnResponse>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct StartJobRequest {
    pub top_module: String,
    pub verilog_files: Vec<String>,
    #[serde(default)]
    pub clock_period_ns: Option<f64>,
    #[serde(default)]
    pub utilization: Option<u32>,
    #[serde(default)]
    pub aspect_ratio: Option<f64>,
    #[serde(default)]
    pub core_margin: Option<f64>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub restart_stuck: bool,
}

#[derive(Debug, Deserialize)]
pub struct WaitJobRequest {
    #[serde(default)]
    pub max_wait_secs: Option<u64>,
}

/// Incoming frame on the WebSocket chat transport.
#[derive(Debug, Deserialize)]
pub struct WsClientMessage {
    pub message: String,
}
