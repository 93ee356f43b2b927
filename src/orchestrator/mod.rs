//! Per-request chat orchestration.
//!
//! Validates input, appends the message through the session's single
//! writer, hands the committed history to the generation provider, and
//! packages the reply. Holds no state across requests.

pub mod error;

pub use error::{RelayError, MISSING_FIELDS_MESSAGE};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::observability::RelayMetrics;
use crate::providers::{self, ChatMessage, Provider};
use crate::sessions::{self, SessionRegistry};

/// Successful result of one chat turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    pub session_id: String,
    pub history: Vec<String>,
    pub reply: String,
}

pub struct ChatOrchestrator {
    sessions: Arc<SessionRegistry>,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f64,
    generation_timeout: Duration,
    metrics: RelayMetrics,
}

impl ChatOrchestrator {
    pub fn new(
        sessions: Arc<SessionRegistry>,
        provider: Arc<dyn Provider>,
        model: &str,
        temperature: f64,
        generation_timeout: Duration,
        metrics: RelayMetrics,
    ) -> Self {
        Self {
            sessions,
            provider,
            model: model.to_string(),
            temperature,
            generation_timeout,
            metrics,
        }
    }

    /// Wire storage, provider and metrics from config.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let registry = sessions::create_session_registry(&config.sessions, &config.data_dir)?;
        let provider: Arc<dyn Provider> = Arc::from(providers::create_provider(&config.provider)?);

        Ok(Self::new(
            Arc::new(registry),
            provider,
            &config.provider.model,
            config.provider.temperature,
            Duration::from_secs(config.provider.timeout_secs),
            RelayMetrics::new()?,
        ))
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Run one chat turn for `session_id`.
    pub async fn handle_chat(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<ChatReply, RelayError> {
        let result = self.run_turn(session_id, message).await;

        match &result {
            Ok(reply) => {
                self.metrics.record_chat("ok");
                tracing::info!(
                    session_id,
                    history_len = reply.history.len(),
                    "Chat turn completed"
                );
            }
            Err(e) => {
                self.metrics.record_chat(e.outcome());
                if e.is_client_error() {
                    tracing::debug!(session_id, error = %e, "Rejected chat request");
                } else {
                    tracing::warn!(session_id, error = %e, "Chat turn failed");
                }
            }
        }

        result
    }

    async fn run_turn(&self, session_id: &str, message: &str) -> Result<ChatReply, RelayError> {
        if session_id.is_empty() || message.is_empty() {
            return Err(RelayError::InvalidRequest(MISSING_FIELDS_MESSAGE.to_string()));
        }

        let store = self.sessions.resolve(session_id);
        let history = store.append(message).await?;
        // Release the handle before the slow provider call.
        drop(store);

        let reply = self.generate(&history).await?;

        Ok(ChatReply {
            session_id: session_id.to_string(),
            history,
            reply,
        })
    }

    async fn generate(&self, history: &[String]) -> Result<String, RelayError> {
        // Every stored entry goes out as a user turn; replies are never stored.
        let messages: Vec<ChatMessage> = history.iter().map(ChatMessage::user).collect();

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.generation_timeout,
            self.provider
                .chat_with_history(&messages, &self.model, self.temperature),
        )
        .await;
        self.metrics
            .observe_generation(started.elapsed().as_secs_f64());

        match outcome {
            Ok(Ok(text)) => {
                tracing::debug!(
                    provider = self.provider.name(),
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    "Generation completed"
                );
                Ok(text)
            }
            Ok(Err(e)) => Err(RelayError::GenerationFailed(format!("{e:#}"))),
            Err(_) => Err(RelayError::GenerationFailed(format!(
                "{} did not respond within {}s",
                self.provider.name(),
                self.generation_timeout.as_secs_f64()
            ))),
        }
    }
}
