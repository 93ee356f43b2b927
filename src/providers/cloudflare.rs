//! Cloudflare Workers AI provider.
//!
//! Calls the REST `ai/run` endpoint:
//! `POST {base}/accounts/{account_id}/ai/run/{model}` with `{ messages }`,
//! and reads the generated text from `result.response`.

use crate::providers::traits::{ChatMessage, Provider};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CLOUDFLARE_BASE_URL: &str = "https://api.cloudflare.com/client/v4";
pub const DEFAULT_WORKERS_AI_MODEL: &str = "@cf/meta/llama-3-8b-instruct";

pub struct WorkersAiProvider {
    base_url: String,
    account_id: Option<String>,
    api_token: Option<String>,
    client: Client,
}

impl WorkersAiProvider {
    pub fn new(
        base_url: Option<&str>,
        account_id: Option<&str>,
        api_token: Option<&str>,
        timeout: Duration,
    ) -> Self {
        Self {
            base_url: base_url
                .unwrap_or(DEFAULT_CLOUDFLARE_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            account_id: account_id
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(ToString::to_string),
            api_token: api_token.map(ToString::to_string),
            client: Client::builder()
                .timeout(timeout)
                .connect_timeout(Duration::from_secs(10))
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    fn run_url(&self, account_id: &str, model: &str) -> String {
        format!(
            "{}/accounts/{account_id}/ai/run/{}",
            self.base_url,
            model.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Serialize)]
struct RunRequest<'a> {
    messages: &'a [ChatMessage],
    temperature: f64,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    result: Option<RunResult>,
    #[serde(default)]
    errors: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct RunResult {
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    message: String,
}

#[async_trait]
impl Provider for WorkersAiProvider {
    async fn chat_with_history(
        &self,
        messages: &[ChatMessage],
        model: &str,
        temperature: f64,
    ) -> anyhow::Result<String> {
        let account_id = self.account_id.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "cloudflare account id not set. Set provider.account_id or CLOUDFLARE_ACCOUNT_ID."
            )
        })?;
        let api_token = self.api_token.as_deref().ok_or_else(|| {
            anyhow::anyhow!(
                "cloudflare API token not set. Set provider.api_key or CLOUDFLARE_API_TOKEN."
            )
        })?;

        let response = self
            .client
            .post(self.run_url(account_id, model))
            .bearer_auth(api_token)
            .json(&RunRequest {
                messages,
                temperature,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(super::api_error("cloudflare", response).await);
        }

        let body: RunResponse = response.json().await?;

        if body.success == Some(false) {
            let detail = body
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            anyhow::bail!(
                "cloudflare run failed: {}",
                super::sanitize_api_error(&detail)
            );
        }

        body.result
            .and_then(|r| r.response)
            .ok_or_else(|| anyhow::anyhow!("No response from cloudflare (missing result.response)"))
    }

    fn name(&self) -> &str {
        "cloudflare"
    }
}
