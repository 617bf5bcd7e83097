use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::provider::{ProviderDescriptor, ProviderId};
use crate::types::routing::RoutingMode;

/// Top-level gateway configuration.
///
/// Assembled by the loader from environment variables (with an optional
/// TOML file override); validated before the gateway starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Primary provider in static routing mode.
    pub provider: ProviderId,
    pub routing: RoutingConfig,
    /// Connection details per configured provider.
    pub providers: HashMap<ProviderId, ProviderDescriptor>,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub tools: ToolConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embeddings: Option<EmbeddingConfig>,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// Routing mode, tier table, and fallback policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_mode")]
    pub mode: RoutingMode,
    /// All four tiers must be set for tier routing; otherwise static.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tiers: Option<TierConfig>,
    #[serde(default)]
    pub fallback_enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_provider: Option<ProviderId>,
}

fn default_mode() -> RoutingMode {
    RoutingMode::Heuristic
}

/// One `provider:model` pair per complexity bucket.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierConfig {
    pub simple: TierTarget,
    pub medium: TierTarget,
    pub complex: TierTarget,
    pub reasoning: TierTarget,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TierTarget {
    pub provider: ProviderId,
    pub model: String,
}

/// Retry parameters for non-streaming dispatches.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 1_000,
            max_backoff_ms: 30_000,
            backoff_multiplier: 2.0,
            jitter: true,
        }
    }
}

/// Circuit breaker thresholds, shared by all provider breakers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Seconds the breaker stays open before admitting a probe.
    pub open_secs: u64,
    /// Consecutive half-open successes that close it again.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_secs: 60,
            success_threshold: 2,
        }
    }
}

/// Connection pool tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PoolConfig {
    pub max_idle_per_host: usize,
    pub idle_timeout_secs: u64,
    pub request_timeout_secs: u64,
    /// Outer wall clock for SSE consumption (the SSE client itself has no
    /// body-read timeout).
    pub sse_wall_clock_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 50,
            idle_timeout_secs: 30,
            request_timeout_secs: 60,
            sse_wall_clock_secs: 600,
        }
    }
}

/// Tool catalog injection and selection knobs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Whether the built-in catalog is injected for local providers.
    /// Cloud providers always receive it when the request carries no tools.
    pub inject_for_local: bool,
    /// Estimated token budget for injected tool schemas.
    pub token_budget: u32,
    /// Hard cap on tool count for Ollama.
    pub ollama_max_tools: usize,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            inject_for_local: false,
            token_budget: 2_000,
            ollama_max_tools: 8,
        }
    }
}

/// Memory subsystem parameters.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryConfig {
    pub enabled: bool,
    /// Candidates below this surprise score are discarded.
    pub surprise_threshold: f64,
    /// How many recent same-type memories the surprise score compares against.
    pub recent_window: u32,
    /// How many recent memories the insert-time dedup inspects.
    pub dedup_lookback: u32,
    pub decay_half_life_days: f64,
    pub max_age_days: u32,
    pub max_count: u32,
    /// Records whose effective score falls below this are eviction-eligible.
    pub min_effective_score: f64,
    pub maintenance_interval_minutes: u32,
    /// Memories injected into the system prompt per request.
    pub inject_top_k: u32,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            surprise_threshold: 0.3,
            recent_window: 100,
            dedup_lookback: 5,
            decay_half_life_days: 30.0,
            max_age_days: 180,
            max_count: 10_000,
            min_effective_score: 0.05,
            maintenance_interval_minutes: 60,
            inject_top_k: 5,
        }
    }
}

/// Embedding backend for the analyzer's similarity adjustment. Optional;
/// absent API key disables it.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: u32,
    #[serde(default = "default_embedding_base_url")]
    pub base_url: String,
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
}

fn default_embedding_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_embedding_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

/// Cost-savings estimation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CostConfig {
    /// What the tokens would have cost on a cloud provider, $ per million.
    pub cloud_rate_per_mtok: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            cloud_rate_per_mtok: 3.0,
        }
    }
}

/// Front-door server settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    /// Directory holding `sessions.db`.
    pub data_dir: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            data_dir: ".".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let retry = RetryConfig::default();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_backoff_ms, 1_000);
        assert_eq!(retry.max_backoff_ms, 30_000);

        let breaker = BreakerConfig::default();
        assert_eq!(breaker.failure_threshold, 5);
        assert_eq!(breaker.open_secs, 60);
        assert_eq!(breaker.success_threshold, 2);

        let memory = MemoryConfig::default();
        assert_eq!(memory.surprise_threshold, 0.3);
        assert_eq!(memory.recent_window, 100);
        assert_eq!(memory.dedup_lookback, 5);
        assert_eq!(memory.decay_half_life_days, 30.0);
    }

    #[test]
    fn test_config_toml_roundtrip() {
        let toml_src = r#"
            provider = "ollama"

            [routing]
            mode = "aggressive"
            fallback_enabled = true
            fallback_provider = "openai"

            [providers.ollama]
            id = "ollama"
            endpoint = "http://localhost:11434"
            timeout_secs = 120

            [providers.openai]
            id = "openai"
            endpoint = "https://api.openai.com"
            api_key = "sk-test"
            model = "gpt-4o"
            timeout_secs = 60
        "#;
        let config: GatewayConfig = toml::from_str(toml_src).unwrap();
        assert_eq!(config.provider, ProviderId::Ollama);
        assert_eq!(config.routing.mode, RoutingMode::Aggressive);
        assert_eq!(
            config.routing.fallback_provider,
            Some(ProviderId::Openai)
        );
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.retry.max_attempts, 3);
    }
}
