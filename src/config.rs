//! Runtime configuration, read once at startup and handed to constructors.
//!
//! Nothing below the CLI layer reads the environment; components receive the
//! struct they need so tests can build them against fakes.

use std::env;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_SEARCH_ENDPOINT: &str = "https://api.tavily.com/search";
const DEFAULT_GATEWAY_URL: &str = "http://127.0.0.1:8787/";
const DEFAULT_ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_ANTHROPIC_MODEL: &str = "claude-3-sonnet-20240229";
const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 1000;
const DEFAULT_PROXY_BIND: &str = "127.0.0.1:8787";

/// Reference search provider settings.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub endpoint: String,
    /// `None` keeps the transport default.
    pub timeout: Option<Duration>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_SEARCH_ENDPOINT.to_string(),
            timeout: None,
        }
    }
}

impl SearchConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.api_key = non_empty_var("SEARCH_API_KEY").or_else(|| non_empty_var("TAVILY_API_KEY"));
        if let Some(endpoint) = non_empty_var("SEARCH_ENDPOINT") {
            cfg.endpoint = endpoint;
        }
        cfg.timeout = secs_var("SEARCH_TIMEOUT_SECS");
        cfg
    }
}

/// Where the generation intermediary lives and how to authenticate to it.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub url: String,
    pub token: Option<String>,
    pub timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_GATEWAY_URL.to_string(),
            token: None,
            timeout: None,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(url) = non_empty_var("GATEWAY_URL") {
            cfg.url = url;
        } else if let Some(base) = non_empty_var("SUPABASE_URL") {
            cfg.url = format!("{}/functions/v1/claude-proxy", base.trim_end_matches('/'));
        }
        cfg.token = non_empty_var("GATEWAY_TOKEN").or_else(|| non_empty_var("SUPABASE_ANON_KEY"));
        cfg.timeout = secs_var("GATEWAY_TIMEOUT_SECS");
        cfg
    }
}

/// Settings for `copydesk proxy`, the only process that holds the provider key.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    pub api_key: String,
    pub upstream_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub anthropic_version: String,
    pub bind: SocketAddr,
}

impl ProxyConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = non_empty_var("ANTHROPIC_API_KEY")
            .ok_or_else(|| anyhow::anyhow!("Missing ANTHROPIC_API_KEY environment variable"))?;
        let bind = non_empty_var("PROXY_BIND").unwrap_or_else(|| DEFAULT_PROXY_BIND.to_string());
        Ok(Self {
            api_key,
            upstream_url: non_empty_var("ANTHROPIC_BASE_URL").unwrap_or_else(|| DEFAULT_ANTHROPIC_URL.to_string()),
            model: non_empty_var("ANTHROPIC_MODEL").unwrap_or_else(|| DEFAULT_ANTHROPIC_MODEL.to_string()),
            max_tokens: non_empty_var("ANTHROPIC_MAX_TOKENS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_MAX_TOKENS),
            anthropic_version: non_empty_var("ANTHROPIC_VERSION")
                .unwrap_or_else(|| DEFAULT_ANTHROPIC_VERSION.to_string()),
            bind: bind
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid PROXY_BIND {bind}: {e}"))?,
        })
    }
}

/// Everything the pipeline needs besides the database pool.
#[derive(Clone, Debug, Default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub gateway: GatewayConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            search: SearchConfig::from_env(),
            gateway: GatewayConfig::from_env(),
        }
    }
}

// Values are trimmed; a key pasted with a trailing newline is still a valid key.
fn non_empty_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn secs_var(key: &str) -> Option<Duration> {
    non_empty_var(key)
        .and_then(|v| v.parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_public_search_and_local_gateway() {
        let search = SearchConfig::default();
        assert_eq!(search.endpoint, "https://api.tavily.com/search");
        assert!(search.timeout.is_none());

        let gateway = GatewayConfig::default();
        assert_eq!(gateway.url, "http://127.0.0.1:8787/");
        assert!(gateway.token.is_none());
    }

    #[test]
    fn unset_variables_are_none() {
        assert!(non_empty_var("COPYDESK_TEST_SURELY_UNSET_VAR").is_none());
        assert!(secs_var("COPYDESK_TEST_SURELY_UNSET_VAR").is_none());
    }
}
