//! Provider subsystem for text-generation backends.
//!
//! Each backend implements the [`Provider`] trait defined in [`traits`] and is
//! registered in the factory function [`create_provider`] by its canonical
//! string key. The relay treats every backend as an opaque function from an
//! ordered message list to one generated reply.

pub mod cloudflare;
pub mod compatible;
pub mod traits;

pub use traits::{ChatMessage, Provider};

use crate::config::ProviderConfig;
use std::time::Duration;

const MAX_API_ERROR_CHARS: usize = 200;

fn is_secret_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':')
}

fn token_end(input: &str, from: usize) -> usize {
    let mut end = from;
    for (i, c) in input[from..].char_indices() {
        if is_secret_char(c) {
            end = from + i + c.len_utf8();
        } else {
            break;
        }
    }
    end
}

/// Scrub known secret-like token prefixes from provider error strings.
///
/// Redacts bearer tokens and keys with prefixes like `sk-`, `gsk_` and
/// `Bearer `.
pub fn scrub_secret_patterns(input: &str) -> String {
    const PREFIXES: [&str; 4] = ["sk-", "gsk_", "Bearer ", "cf-"];

    let mut scrubbed = input.to_string();

    for prefix in PREFIXES {
        let mut search_from = 0;
        while let Some(rel) = scrubbed[search_from..].find(prefix) {
            let start = search_from + rel;
            let content_start = start + prefix.len();
            let end = token_end(&scrubbed, content_start);

            if end == content_start {
                search_from = content_start;
                continue;
            }

            scrubbed.replace_range(start..end, "[REDACTED]");
            search_from = start + "[REDACTED]".len();
        }
    }

    scrubbed
}

/// Sanitize API error text by scrubbing secrets and truncating length.
pub fn sanitize_api_error(input: &str) -> String {
    let scrubbed = scrub_secret_patterns(input);

    if scrubbed.chars().count() <= MAX_API_ERROR_CHARS {
        return scrubbed;
    }

    let mut end = MAX_API_ERROR_CHARS;
    while end > 0 && !scrubbed.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}...", &scrubbed[..end])
}

/// Build a sanitized provider error from a failed HTTP response.
pub async fn api_error(provider: &str, response: reqwest::Response) -> anyhow::Error {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<failed to read provider error body>".to_string());
    let sanitized = sanitize_api_error(&body);
    anyhow::anyhow!("{provider} API error ({status}): {sanitized}")
}

/// Resolve the credential for a provider: explicit config first, then env vars.
fn resolve_provider_credential(kind: &str, credential_override: Option<&str>) -> Option<String> {
    if let Some(raw_override) = credential_override {
        let trimmed_override = raw_override.trim();
        if !trimmed_override.is_empty() {
            return Some(trimmed_override.to_owned());
        }
    }

    let provider_env_candidates: &[&str] = match kind {
        "cloudflare" => &["CLOUDFLARE_API_TOKEN"],
        "openai" => &["OPENAI_API_KEY"],
        _ => &[],
    };

    provider_env_candidates
        .iter()
        .chain(&["CHATRELAY_API_KEY", "API_KEY"])
        .find_map(|name| {
            std::env::var(name)
                .ok()
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}

/// Factory: create the provider described by `[provider]` config.
pub fn create_provider(config: &ProviderConfig) -> anyhow::Result<Box<dyn Provider>> {
    let kind = config.kind.trim().to_ascii_lowercase();
    let credential = resolve_provider_credential(&kind, config.api_key.as_deref());
    let timeout = Duration::from_secs(config.timeout_secs.max(1));

    match kind.as_str() {
        "cloudflare" => Ok(Box::new(cloudflare::WorkersAiProvider::new(
            config.api_url.as_deref(),
            config.account_id.as_deref(),
            credential.as_deref(),
            timeout,
        ))),
        "openai" => Ok(Box::new(compatible::OpenAiCompatibleProvider::new(
            "openai",
            config
                .api_url
                .as_deref()
                .unwrap_or(compatible::DEFAULT_OPENAI_BASE_URL),
            credential.as_deref(),
            timeout,
        ))),
        _ => anyhow::bail!(
            "Unknown provider: {}. Supported: {}",
            config.kind,
            list_providers()
                .iter()
                .map(|p| p.name)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

/// Information about a supported provider for display purposes.
pub struct ProviderInfo {
    /// Canonical name used in config (e.g. `"cloudflare"`)
    pub name: &'static str,
    /// Human-readable display name
    pub display_name: &'static str,
}

/// Return the list of all known providers for display in `chatrelay providers`.
pub fn list_providers() -> Vec<ProviderInfo> {
    vec![
        ProviderInfo {
            name: "cloudflare",
            display_name: "Cloudflare Workers AI",
        },
        ProviderInfo {
            name: "openai",
            display_name: "OpenAI-compatible /chat/completions",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(kind: &str) -> ProviderConfig {
        ProviderConfig {
            kind: kind.into(),
            api_key: Some("provider-test-credential".into()),
            ..ProviderConfig::default()
        }
    }

    #[test]
    fn factory_cloudflare() {
        let provider = create_provider(&config("cloudflare")).unwrap();
        assert_eq!(provider.name(), "cloudflare");
    }

    #[test]
    fn factory_openai_is_case_insensitive() {
        let provider = create_provider(&config(" OpenAI ")).unwrap();
        assert_eq!(provider.name(), "openai");
    }

    #[test]
    fn factory_unknown_provider_errors() {
        let msg = create_provider(&config("nonexistent"))
            .err()
            .unwrap()
            .to_string();
        assert!(msg.contains("Unknown provider"));
        assert!(msg.contains("cloudflare"));
    }

    #[test]
    fn listed_providers_are_constructible() {
        for info in list_providers() {
            assert!(
                create_provider(&config(info.name)).is_ok(),
                "listed provider should be constructible: {}",
                info.name
            );
        }
    }

    #[test]
    fn sanitize_scrubs_sk_prefix() {
        let out = sanitize_api_error("request failed: sk-1234567890abcdef");
        assert!(!out.contains("sk-1234567890abcdef"));
        assert!(out.contains("[REDACTED]"));
    }

    #[test]
    fn sanitize_scrubs_bearer_header_echo() {
        let out = scrub_secret_patterns("got header Bearer abc.def-123 from client");
        assert_eq!(out, "got header [REDACTED] from client");
    }

    #[test]
    fn sanitize_truncates_long_error() {
        let result = sanitize_api_error(&"a".repeat(400));
        assert!(result.len() <= 203);
        assert!(result.ends_with("..."));
    }

    #[test]
    fn sanitize_no_secret_no_change() {
        let input = "simple upstream timeout";
        assert_eq!(sanitize_api_error(input), input);
    }

    #[test]
    fn bare_prefix_is_left_alone() {
        assert_eq!(scrub_secret_patterns("trailing sk-"), "trailing sk-");
    }

    #[test]
    fn resolve_provider_credential_prefers_explicit_argument() {
        let resolved = resolve_provider_credential("openai", Some("  explicit-key  "));
        assert_eq!(resolved, Some("explicit-key".to_string()));
    }
}
