use crate::providers::cloudflare::DEFAULT_WORKERS_AI_MODEL;
use crate::sessions::{DEFAULT_MAX_HISTORY, SUPPORTED_BACKENDS};
use anyhow::{Context, Result};
use directories::UserDirs;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
#[cfg(unix)]
use tokio::fs::File;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Env var naming the config directory; `--config-dir` sets it too.
pub const CONFIG_DIR_ENV: &str = "CHATRELAY_CONFIG_DIR";

const CONFIG_FILE_NAME: &str = "config.toml";

// ── Top-level config ──────────────────────────────────────────────

/// Top-level chatrelay configuration, loaded from `config.toml`.
///
/// Resolution order: `CHATRELAY_CONFIG_DIR` env → `~/.chatrelay/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// Directory holding config.toml and the default session database - computed, not serialized
    #[serde(skip)]
    pub data_dir: PathBuf,

    /// HTTP gateway configuration (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Text-generation backend configuration (`[provider]`).
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Session history configuration (`[sessions]`).
    #[serde(default)]
    pub sessions: SessionsConfig,
}

// ── Gateway ──────────────────────────────────────────────────────

/// Gateway server configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GatewayConfig {
    /// Gateway port (default: 8787)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 127.0.0.1)
    #[serde(default = "default_gateway_host")]
    pub host: String,
    /// Upper bound on a whole HTTP request, generation included. Default: `60`.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Maximum accepted request body size in bytes. Default: `65536`.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_gateway_port() -> u16 {
    8787
}

fn default_gateway_host() -> String {
    "127.0.0.1".into()
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
            request_timeout_secs: default_request_timeout_secs(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

// ── Provider ─────────────────────────────────────────────────────

/// Generation backend configuration (`[provider]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProviderConfig {
    /// Provider kind: `"cloudflare"` (Workers AI) or `"openai"` (any OpenAI-compatible API).
    #[serde(default = "default_provider_kind")]
    pub kind: String,
    /// Base URL override (e.g. `"http://10.0.0.1:8000/v1"` for a local vLLM).
    #[serde(default)]
    pub api_url: Option<String>,
    /// API key or token. Overridden by `CHATRELAY_API_KEY` or `API_KEY`.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Cloudflare account id (required for `kind = "cloudflare"`).
    #[serde(default)]
    pub account_id: Option<String>,
    /// Model routed through the provider. Default: `"@cf/meta/llama-3-8b-instruct"`.
    #[serde(default = "default_provider_model")]
    pub model: String,
    /// Sampling temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Timeout for one generation call in seconds; expiry fails the request. Default: `30`.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_provider_kind() -> String {
    "cloudflare".into()
}

fn default_provider_model() -> String {
    DEFAULT_WORKERS_AI_MODEL.into()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_provider_timeout_secs() -> u64 {
    30
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: default_provider_kind(),
            api_url: None,
            api_key: None,
            account_id: None,
            model: default_provider_model(),
            temperature: default_temperature(),
            timeout_secs: default_provider_timeout_secs(),
        }
    }
}

// ── Sessions ─────────────────────────────────────────────────────

/// Session history configuration (`[sessions]` section).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionsConfig {
    /// Storage backend: `"sqlite"` (durable) or `"memory"`. Default: `"sqlite"`.
    #[serde(default = "default_sessions_backend")]
    pub backend: String,
    /// Messages retained per session; older ones are evicted first. Default: `10`.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// SQLite database path. Default: `<config dir>/sessions.db`.
    #[serde(default)]
    pub db_path: Option<PathBuf>,
}

fn default_sessions_backend() -> String {
    "sqlite".into()
}

fn default_max_history() -> usize {
    DEFAULT_MAX_HISTORY
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            backend: default_sessions_backend(),
            max_history: default_max_history(),
            db_path: None,
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_config_dir().unwrap_or_else(|_| PathBuf::from(".chatrelay"));

        Self {
            config_path: data_dir.join(CONFIG_FILE_NAME),
            data_dir,
            gateway: GatewayConfig::default(),
            provider: ProviderConfig::default(),
            sessions: SessionsConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".chatrelay"))
}

/// Resolve the config directory: `CHATRELAY_CONFIG_DIR` when set, else `~/.chatrelay`.
pub fn resolve_config_dir() -> Result<PathBuf> {
    match std::env::var(CONFIG_DIR_ENV) {
        Ok(dir) if !dir.trim().is_empty() => Ok(PathBuf::from(dir.trim())),
        _ => default_config_dir(),
    }
}

fn env_nonempty(names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        std::env::var(name)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    })
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let dir = resolve_config_dir()?;
        Self::load_or_init_in(&dir).await
    }

    /// Load `config.toml` from `dir`, writing defaults there on first run.
    pub async fn load_or_init_in(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE_NAME);

        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let initialized = !config_path.exists();
        let mut config = if initialized {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.data_dir = dir.to_path_buf();
            config.save().await?;

            // Restrict permissions on newly created config file (may contain API keys)
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }
            config
        } else {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config.data_dir = dir.to_path_buf();
            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(
            path = %config.config_path.display(),
            initialized,
            provider = %config.provider.kind,
            backend = %config.sessions.backend,
            "Config loaded"
        );
        Ok(config)
    }

    /// Validate configuration values that would cause runtime failures.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.gateway.request_timeout_secs == 0 {
            anyhow::bail!("gateway.request_timeout_secs must be greater than 0");
        }
        if self.gateway.max_body_bytes == 0 {
            anyhow::bail!("gateway.max_body_bytes must be greater than 0");
        }

        let kind = self.provider.kind.trim().to_ascii_lowercase();
        if !crate::providers::list_providers()
            .iter()
            .any(|p| p.name == kind)
        {
            anyhow::bail!("provider.kind is unknown ({})", self.provider.kind);
        }
        if self.provider.model.trim().is_empty() {
            anyhow::bail!("provider.model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            anyhow::bail!("provider.temperature must be between 0.0 and 2.0");
        }
        if self.provider.timeout_secs == 0 {
            anyhow::bail!("provider.timeout_secs must be greater than 0");
        }

        let backend = self.sessions.backend.trim().to_ascii_lowercase();
        if !SUPPORTED_BACKENDS.contains(&backend.as_str()) {
            anyhow::bail!(
                "sessions.backend is unknown ({}); expected one of: {}",
                self.sessions.backend,
                SUPPORTED_BACKENDS.join(", ")
            );
        }
        if self.sessions.max_history == 0 {
            anyhow::bail!("sessions.max_history must be greater than 0");
        }

        Ok(())
    }

    /// Apply environment variable overrides to config
    pub fn apply_env_overrides(&mut self) {
        // API Key: CHATRELAY_API_KEY or API_KEY (generic)
        if let Some(key) = env_nonempty(&["CHATRELAY_API_KEY", "API_KEY"]) {
            self.provider.api_key = Some(key);
        }

        if let Some(kind) = env_nonempty(&["CHATRELAY_PROVIDER"]) {
            self.provider.kind = kind;
        }

        if let Some(model) = env_nonempty(&["CHATRELAY_MODEL"]) {
            self.provider.model = model;
        }

        if let Some(url) = env_nonempty(&["CHATRELAY_API_URL"]) {
            self.provider.api_url = Some(url);
        }

        if let Some(account) = env_nonempty(&["CHATRELAY_ACCOUNT_ID", "CLOUDFLARE_ACCOUNT_ID"]) {
            self.provider.account_id = Some(account);
        }

        // Gateway port: CHATRELAY_GATEWAY_PORT or PORT
        if let Some(port_str) = env_nonempty(&["CHATRELAY_GATEWAY_PORT", "PORT"]) {
            match port_str.parse::<u16>() {
                Ok(port) => self.gateway.port = port,
                Err(_) => tracing::warn!(value = %port_str, "Ignoring invalid gateway port override"),
            }
        }

        // Gateway host: CHATRELAY_GATEWAY_HOST or HOST
        if let Some(host) = env_nonempty(&["CHATRELAY_GATEWAY_HOST", "HOST"]) {
            self.gateway.host = host;
        }

        if let Some(raw) = env_nonempty(&["CHATRELAY_MAX_HISTORY"]) {
            match raw.parse::<usize>() {
                Ok(n) if n > 0 => self.sessions.max_history = n,
                _ => tracing::warn!(value = %raw, "Ignoring invalid CHATRELAY_MAX_HISTORY"),
            }
        }
    }

    /// Serialize to TOML with the API key replaced by a placeholder.
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut masked = self.clone();
        if masked.provider.api_key.is_some() {
            masked.provider.api_key = Some("***MASKED***".into());
        }
        toml::to_string_pretty(&masked).context("Failed to serialize config")
    }

    pub async fn save(&self) -> Result<()> {
        let toml_str = toml::to_string_pretty(self).context("Failed to serialize config")?;

        let parent_dir = self
            .config_path
            .parent()
            .context("Config path must have a parent directory")?;

        fs::create_dir_all(parent_dir).await.with_context(|| {
            format!(
                "Failed to create config directory: {}",
                parent_dir.display()
            )
        })?;

        let file_name = self
            .config_path
            .file_name()
            .and_then(|v| v.to_str())
            .unwrap_or(CONFIG_FILE_NAME);
        let temp_path = parent_dir.join(format!(".{file_name}.tmp-{}", uuid::Uuid::new_v4()));

        let mut temp_file = OpenOptions::new()
            .create_new(true)
            .write(true)
            .open(&temp_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to create temporary config file: {}",
                    temp_path.display()
                )
            })?;
        temp_file
            .write_all(toml_str.as_bytes())
            .await
            .context("Failed to write temporary config contents")?;
        temp_file
            .sync_all()
            .await
            .context("Failed to fsync temporary config file")?;
        drop(temp_file);

        if let Err(e) = fs::rename(&temp_path, &self.config_path).await {
            let _ = fs::remove_file(&temp_path).await;
            anyhow::bail!("Failed to atomically replace config file: {e}");
        }

        sync_directory(parent_dir).await
    }
}

async fn sync_directory(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let dir = File::open(path)
            .await
            .with_context(|| format!("Failed to open directory for fsync: {}", path.display()))?;
        dir.sync_all()
            .await
            .with_context(|| format!("Failed to fsync directory metadata: {}", path.display()))?;
        Ok(())
    }

    #[cfg(not(unix))]
    {
        let _ = path;
        Ok(())
    }
}
