use switchboard_common::config::GatewayConfig;
#[cfg(test)]
use switchboard_common::types::provider::ProviderId;

use super::ConfigError;

/// Validate the assembled configuration.
///
/// Checks sane ranges on numeric parameters and cross-validates provider
/// references. The gateway refuses to start on any failure; every problem
/// is reported at once.
pub fn validate(config: &GatewayConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_providers(config, &mut errors);
    validate_routing(config, &mut errors);
    validate_retry(config, &mut errors);
    validate_breaker(config, &mut errors);
    validate_memory(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation(errors.join("; ")))
    }
}

fn validate_providers(config: &GatewayConfig, errors: &mut Vec<String>) {
    match config.providers.get(&config.provider) {
        None => errors.push(format!(
            "primary provider '{}' has no configuration (set {}_{}_ENDPOINT)",
            config.provider,
            super::ENV_PREFIX,
            config.provider.as_str().to_uppercase().replace('-', "_")
        )),
        Some(descriptor) if descriptor.endpoint.is_empty() => {
            errors.push(format!(
                "primary provider '{}' has an empty endpoint",
                config.provider
            ));
        }
        Some(_) => {}
    }

    for (id, descriptor) in &config.providers {
        if descriptor.id != *id {
            errors.push(format!(
                "provider table key '{}' does not match descriptor id '{}'",
                id, descriptor.id
            ));
        }
        if descriptor.timeout_secs == 0 {
            errors.push(format!("provider '{}' timeout_secs must be > 0", id));
        }
    }
}

fn validate_routing(config: &GatewayConfig, errors: &mut Vec<String>) {
    let routing = &config.routing;

    if routing.fallback_enabled {
        match routing.fallback_provider {
            None => errors.push("fallback is enabled but no fallback provider is set".into()),
            Some(fallback) => {
                if fallback.is_local() {
                    errors.push(format!(
                        "local provider '{}' cannot be the fallback (local providers are \
                         what fallback recovers from)",
                        fallback
                    ));
                }
                if !config.providers.contains_key(&fallback) {
                    errors.push(format!(
                        "fallback provider '{}' has no configuration",
                        fallback
                    ));
                }
            }
        }
    }

    if let Some(fallback) = routing.fallback_provider {
        if fallback.is_local() {
            // Rejected even when currently disabled, so a later toggle
            // cannot activate a bad target.
            if !routing.fallback_enabled {
                errors.push(format!(
                    "local provider '{}' cannot be configured as fallback",
                    fallback
                ));
            }
        }
    }

    if let Some(tiers) = &routing.tiers {
        for (name, target) in [
            ("simple", &tiers.simple),
            ("medium", &tiers.medium),
            ("complex", &tiers.complex),
            ("reasoning", &tiers.reasoning),
        ] {
            if target.model.is_empty() {
                errors.push(format!("tier '{}' has an empty model", name));
            }
            if !config.providers.contains_key(&target.provider) {
                errors.push(format!(
                    "tier '{}' references unconfigured provider '{}'",
                    name, target.provider
                ));
            }
        }
    }
}

fn validate_retry(config: &GatewayConfig, errors: &mut Vec<String>) {
    let retry = &config.retry;
    if retry.max_attempts == 0 {
        errors.push("retry.max_attempts must be > 0".into());
    }
    if retry.initial_backoff_ms == 0 {
        errors.push("retry.initial_backoff_ms must be > 0".into());
    }
    if retry.max_backoff_ms < retry.initial_backoff_ms {
        errors.push("retry.max_backoff_ms must be >= initial_backoff_ms".into());
    }
    if retry.backoff_multiplier < 1.0 {
        errors.push("retry.backoff_multiplier must be >= 1.0".into());
    }
}

fn validate_breaker(config: &GatewayConfig, errors: &mut Vec<String>) {
    let breaker = &config.breaker;
    if breaker.failure_threshold == 0 {
        errors.push("breaker.failure_threshold must be > 0".into());
    }
    if breaker.open_secs == 0 {
        errors.push("breaker.open_secs must be > 0".into());
    }
    if breaker.success_threshold == 0 {
        errors.push("breaker.success_threshold must be > 0".into());
    }
}

fn validate_memory(config: &GatewayConfig, errors: &mut Vec<String>) {
    let memory = &config.memory;
    if !(0.0..=1.0).contains(&memory.surprise_threshold) {
        errors.push("memory.surprise_threshold must be between 0.0 and 1.0".into());
    }
    if memory.decay_half_life_days <= 0.0 {
        errors.push("memory.decay_half_life_days must be > 0".into());
    }
    if memory.recent_window == 0 {
        errors.push("memory.recent_window must be > 0".into());
    }
    if memory.max_count == 0 {
        errors.push("memory.max_count must be > 0".into());
    }
}
