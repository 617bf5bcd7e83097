//! Configuration assembly: an optional TOML baseline overlaid with
//! environment variables, then cross-validated. The gateway refuses to
//! start on any validation failure.

mod validation;

use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use switchboard_common::config::{
    EmbeddingConfig, GatewayConfig, RoutingConfig, TierConfig, TierTarget,
};
use switchboard_common::types::provider::{ProviderDescriptor, ProviderId};
use switchboard_common::types::routing::RoutingMode;

pub use validation::validate;

const ENV_PREFIX: &str = "SWITCHBOARD";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {what}: {detail}")]
    Parse { what: String, detail: String },

    #[error("{0}")]
    UnknownProvider(String),

    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Load the complete gateway configuration.
pub fn load_config() -> Result<GatewayConfig, ConfigError> {
    let mut config = match env_str("CONFIG_FILE") {
        Some(path) => {
            let path = PathBuf::from(path);
            tracing::info!(path = %path.display(), "Loading configuration file");
            let content =
                std::fs::read_to_string(&path).map_err(|e| ConfigError::FileRead {
                    path: path.clone(),
                    source: e,
                })?;
            toml::from_str(&content).map_err(|e| ConfigError::Parse {
                what: path.display().to_string(),
                detail: e.to_string(),
            })?
        }
        None => default_config()?,
    };

    apply_env_overrides(&mut config)?;
    validation::validate(&config)?;

    tracing::info!(
        provider = %config.provider,
        providers = config.providers.len(),
        tier_mode = config.routing.tiers.is_some(),
        fallback = config.routing.fallback_enabled,
        "Configuration loaded"
    );

    Ok(config)
}

fn default_config() -> Result<GatewayConfig, ConfigError> {
    let provider = required_provider()?;
    Ok(GatewayConfig {
        provider,
        routing: RoutingConfig {
            mode: RoutingMode::Heuristic,
            tiers: None,
            fallback_enabled: false,
            fallback_provider: None,
        },
        providers: HashMap::new(),
        retry: Default::default(),
        breaker: Default::default(),
        pool: Default::default(),
        tools: Default::default(),
        memory: Default::default(),
        embeddings: None,
        cost: Default::default(),
        server: Default::default(),
    })
}

fn required_provider() -> Result<ProviderId, ConfigError> {
    let raw = env_str("PROVIDER").ok_or_else(|| {
        let valid: Vec<&str> = ProviderId::ALL.iter().map(|p| p.as_str()).collect();
        ConfigError::UnknownProvider(format!(
            "{}_PROVIDER is not set (valid values: {})",
            ENV_PREFIX,
            valid.join(", ")
        ))
    })?;
    parse_provider(&raw)
}

fn parse_provider(raw: &str) -> Result<ProviderId, ConfigError> {
    ProviderId::from_str(raw).map_err(ConfigError::UnknownProvider)
}

fn apply_env_overrides(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    if let Some(raw) = env_str("PROVIDER") {
        config.provider = parse_provider(&raw)?;
    }

    if let Some(raw) = env_str("ROUTING_MODE") {
        config.routing.mode = match raw.as_str() {
            "aggressive" => RoutingMode::Aggressive,
            "heuristic" => RoutingMode::Heuristic,
            "conservative" => RoutingMode::Conservative,
            other => {
                return Err(ConfigError::Parse {
                    what: format!("{}_ROUTING_MODE", ENV_PREFIX),
                    detail: format!(
                        "unknown mode '{}' (valid: aggressive, heuristic, conservative)",
                        other
                    ),
                })
            }
        };
    }

    if let Some(enabled) = env_parse::<bool>("FALLBACK_ENABLED")? {
        config.routing.fallback_enabled = enabled;
    }
    if let Some(raw) = env_str("FALLBACK_PROVIDER") {
        config.routing.fallback_provider = Some(parse_provider(&raw)?);
    }

    load_tiers(config)?;
    load_providers(config)?;

    if let Some(v) = env_parse("RETRY_MAX_ATTEMPTS")? {
        config.retry.max_attempts = v;
    }
    if let Some(v) = env_parse("RETRY_INITIAL_BACKOFF_MS")? {
        config.retry.initial_backoff_ms = v;
    }
    if let Some(v) = env_parse("RETRY_MAX_BACKOFF_MS")? {
        config.retry.max_backoff_ms = v;
    }
    if let Some(v) = env_parse("BREAKER_FAILURE_THRESHOLD")? {
        config.breaker.failure_threshold = v;
    }
    if let Some(v) = env_parse("BREAKER_OPEN_SECS")? {
        config.breaker.open_secs = v;
    }
    if let Some(v) = env_parse("BREAKER_SUCCESS_THRESHOLD")? {
        config.breaker.success_threshold = v;
    }

    if let Some(v) = env_parse("INJECT_TOOLS_LOCAL")? {
        config.tools.inject_for_local = v;
    }
    if let Some(v) = env_parse("TOOL_TOKEN_BUDGET")? {
        config.tools.token_budget = v;
    }

    if let Some(v) = env_parse("MEMORY_ENABLED")? {
        config.memory.enabled = v;
    }
    if let Some(v) = env_parse("MEMORY_SURPRISE_THRESHOLD")? {
        config.memory.surprise_threshold = v;
    }
    if let Some(v) = env_parse("MEMORY_MAX_AGE_DAYS")? {
        config.memory.max_age_days = v;
    }
    if let Some(v) = env_parse("MEMORY_MAX_COUNT")? {
        config.memory.max_count = v;
    }
    if let Some(v) = env_parse("MEMORY_DEDUP_LOOKBACK")? {
        config.memory.dedup_lookback = v;
    }
    if let Some(v) = env_parse("MEMORY_DECAY_HALF_LIFE_DAYS")? {
        config.memory.decay_half_life_days = v;
    }

    if let Some(v) = env_parse("CLOUD_RATE_PER_MTOK")? {
        config.cost.cloud_rate_per_mtok = v;
    }
    if let Some(v) = env_parse("PORT")? {
        config.server.port = v;
    }
    if let Some(v) = env_str("DATA_DIR") {
        config.server.data_dir = v;
    }

    if let Some(model) = env_str("EMBEDDINGS_MODEL") {
        config.embeddings = Some(EmbeddingConfig {
            model,
            dimensions: env_parse("EMBEDDINGS_DIMENSIONS")?.unwrap_or(256),
            base_url: env_str("EMBEDDINGS_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".into()),
            api_key_env: env_str("EMBEDDINGS_API_KEY_ENV")
                .unwrap_or_else(|| "OPENAI_API_KEY".into()),
        });
    }

    Ok(())
}

/// Tier settings: all four must be present to enable tier routing; a
/// partial set disables it entirely.
fn load_tiers(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    let raw: Vec<Option<String>> = ["TIER_SIMPLE", "TIER_MEDIUM", "TIER_COMPLEX", "TIER_REASONING"]
        .iter()
        .map(|name| env_str(name))
        .collect();

    if raw.iter().all(Option::is_none) {
        return Ok(());
    }
    if raw.iter().any(Option::is_none) {
        tracing::warn!("Partial tier settings — tier routing disabled, falling back to static");
        config.routing.tiers = None;
        return Ok(());
    }

    let mut targets = Vec::with_capacity(4);
    for (name, value) in ["TIER_SIMPLE", "TIER_MEDIUM", "TIER_COMPLEX", "TIER_REASONING"]
        .iter()
        .zip(raw.into_iter().flatten())
    {
        let (provider, model) = value.split_once(':').ok_or_else(|| ConfigError::Parse {
            what: format!("{}_{}", ENV_PREFIX, name),
            detail: format!("expected provider:model, got '{}'", value),
        })?;
        targets.push(TierTarget {
            provider: parse_provider(provider)?,
            model: model.to_string(),
        });
    }

    let mut targets = targets.into_iter();
    config.routing.tiers = Some(TierConfig {
        simple: targets.next().unwrap(),
        medium: targets.next().unwrap(),
        complex: targets.next().unwrap(),
        reasoning: targets.next().unwrap(),
    });
    Ok(())
}

/// Per-provider endpoint/key/model/timeout from env triples, e.g.
/// `SWITCHBOARD_OLLAMA_ENDPOINT`, `SWITCHBOARD_AZURE_OPENAI_API_KEY`.
fn load_providers(config: &mut GatewayConfig) -> Result<(), ConfigError> {
    for provider in ProviderId::ALL {
        let key = provider.as_str().to_uppercase().replace('-', "_");
        let endpoint = env_str(&format!("{}_ENDPOINT", key));
        let api_key = env_str(&format!("{}_API_KEY", key));
        let model = env_str(&format!("{}_MODEL", key));
        let deployment = env_str(&format!("{}_DEPLOYMENT", key));
        let timeout_secs: Option<u64> = env_parse(&format!("{}_TIMEOUT_SECS", key))?;

        if endpoint.is_none()
            && api_key.is_none()
            && model.is_none()
            && deployment.is_none()
            && timeout_secs.is_none()
        {
            continue;
        }

        let entry = config
            .providers
            .entry(provider)
            .or_insert_with(|| ProviderDescriptor {
                id: provider,
                endpoint: String::new(),
                api_key: None,
                model: None,
                deployment: None,
                timeout_secs: 60,
            });

        if let Some(endpoint) = endpoint {
            entry.endpoint = endpoint;
        }
        if api_key.is_some() {
            entry.api_key = api_key;
        }
        if model.is_some() {
            entry.model = model;
        }
        if deployment.is_some() {
            entry.deployment = deployment;
        }
        if let Some(timeout) = timeout_secs {
            entry.timeout_secs = timeout;
        }
    }
    Ok(())
}

fn env_str(name: &str) -> Option<String> {
    std::env::var(format!("{}_{}", ENV_PREFIX, name))
        .ok()
        .filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(name: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match env_str(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<T>().map(Some).map_err(|e| ConfigError::Parse {
            what: format!("{}_{}", ENV_PREFIX, name),
            detail: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_provider_rejects_unknown_with_listing() {
        let err = parse_provider("definitely-not-real").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("unknown provider"));
        assert!(message.contains("ollama"));
        assert!(message.contains("bedrock"));
    }

    #[test]
    fn test_parse_provider_accepts_all_known() {
        for p in ProviderId::ALL {
            assert_eq!(parse_provider(p.as_str()).unwrap(), p);
        }
    }
}
