//! Real model backend adapter. Model selection and inference are owned by
//! the remote service; this adapter only shapes the request and response
//! onto the [`super::EngineAdapter`] contract.

use super::{EngineAdapter, EngineRequest, EngineResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Adapter over an external "copilot-sdk" style HTTP endpoint. The core
/// never assumes anything about what is behind `base_url` beyond the
/// request/response shape below.
pub struct CopilotSdkEngine {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct WireRequest<'a> {
    prompt: &'a str,
    model: &'a str,
    working_dir: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    output: String,
    #[serde(default)]
    tool_call_count: u32,
    #[serde(default)]
    error: Option<String>,
}

impl CopilotSdkEngine {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl EngineAdapter for CopilotSdkEngine {
    async fn execute(&self, request: EngineRequest) -> Result<EngineResponse, String> {
        let remaining = request
            .deadline
            .saturating_duration_since(std::time::Instant::now());
        if remaining == Duration::ZERO {
            return Err("deadline already elapsed before dispatch".into());
        }

        let body = WireRequest {
            prompt: &request.prompt,
            model: &request.model_id,
            working_dir: request.working_dir.display().to_string(),
        };

        let send = self
            .client
            .post(format!("{}/execute", self.base_url))
            .json(&body)
            .timeout(remaining);

        tokio::select! {
            _ = request.cancel.cancelled() => Err("cancelled".to_string()),
            result = send.send() => {
                let resp = result.map_err(|e| e.to_string())?;
                let wire: WireResponse = resp.json().await.map_err(|e| e.to_string())?;
                Ok(EngineResponse {
                    success: wire.error.is_none(),
                    output: wire.output,
                    tool_call_count: wire.tool_call_count,
                    error: wire.error,
                })
            }
        }
    }
}
