//! Provider selection: static and tier-based routing over the analyzer's
//! report, plus the fallback policy the dispatcher consults.

use switchboard_common::config::{GatewayConfig, TierConfig};
use switchboard_common::types::provider::ProviderId;
use switchboard_common::types::routing::{RoutingDecision, RoutingMethod};

use crate::analyzer::{ComplexityReport, Recommendation};

pub struct Router {
    primary: ProviderId,
    tiers: Option<TierConfig>,
    fallback_enabled: bool,
    fallback_provider: Option<ProviderId>,
    /// Local providers present in the config, in preference order.
    configured_locals: Vec<ProviderId>,
}

impl Router {
    pub fn new(config: &GatewayConfig) -> Self {
        let mut configured_locals: Vec<ProviderId> =
            [ProviderId::Ollama, ProviderId::Lmstudio, ProviderId::Llamacpp]
                .into_iter()
                .filter(|p| config.providers.contains_key(p))
                .collect();
        if config.provider.is_local() {
            // The configured primary wins among locals.
            configured_locals.retain(|p| *p != config.provider);
            configured_locals.insert(0, config.provider);
        }

        Self {
            primary: config.provider,
            tiers: config.routing.tiers.clone(),
            fallback_enabled: config.routing.fallback_enabled,
            fallback_provider: config.routing.fallback_provider,
            configured_locals,
        }
    }

    pub fn fallback_enabled(&self) -> bool {
        self.fallback_enabled && self.fallback_provider.is_some()
    }

    pub fn fallback_provider(&self) -> Option<ProviderId> {
        self.fallback_provider
    }

    /// Pick the provider (and tier model) for one request.
    pub fn route(&self, report: &ComplexityReport) -> RoutingDecision {
        let mut decision = match &self.tiers {
            Some(tiers) => self.route_by_tier(tiers, report),
            None => self.route_static(report),
        };

        decision.score = report.score;
        decision.threshold = report.threshold;
        decision.mode = report.mode;
        decision
    }

    fn route_static(&self, report: &ComplexityReport) -> RoutingDecision {
        let (provider, method) = match report.forced {
            Some(Recommendation::Local) if !self.primary.is_local() => {
                match self.configured_locals.first() {
                    Some(local) => (*local, RoutingMethod::Complexity),
                    None => (self.primary, RoutingMethod::Static),
                }
            }
            Some(Recommendation::Cloud) if self.primary.is_local() => {
                match self.fallback_provider {
                    Some(cloud) => (cloud, RoutingMethod::Complexity),
                    None => (self.primary, RoutingMethod::Static),
                }
            }
            _ => (self.primary, RoutingMethod::Static),
        };

        if method == RoutingMethod::Complexity {
            tracing::debug!(
                provider = %provider,
                primary = %self.primary,
                "Force pattern redirected routing"
            );
        }

        RoutingDecision {
            provider,
            model: None,
            method,
            score: 0,
            threshold: 0,
            mode: report.mode,
            fallback_reason: None,
            stream_forced_off: false,
        }
    }

    fn route_by_tier(&self, tiers: &TierConfig, report: &ComplexityReport) -> RoutingDecision {
        // Force patterns still win over the score bucket.
        let target = match report.forced {
            Some(Recommendation::Local) => &tiers.simple,
            Some(Recommendation::Cloud) => &tiers.reasoning,
            None => match report.score {
                0..=25 => &tiers.simple,
                26..=50 => &tiers.medium,
                51..=75 => &tiers.complex,
                _ => &tiers.reasoning,
            },
        };

        RoutingDecision {
            provider: target.provider,
            model: Some(target.model.clone()),
            method: RoutingMethod::Tier,
            score: 0,
            threshold: 0,
            mode: report.mode,
            fallback_reason: None,
            stream_forced_off: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use switchboard_common::config::{RoutingConfig, TierTarget};
    use switchboard_common::types::provider::ProviderDescriptor;
    use switchboard_common::types::routing::RoutingMode;

    use crate::analyzer::ScoreBreakdown;
    use crate::tools::select::TaskClass;

    fn descriptor(id: ProviderId) -> ProviderDescriptor {
        ProviderDescriptor {
            id,
            endpoint: "http://localhost".into(),
            api_key: None,
            model: None,
            deployment: None,
            timeout_secs: 60,
        }
    }

    fn config(primary: ProviderId, providers: &[ProviderId]) -> GatewayConfig {
        let providers: HashMap<ProviderId, ProviderDescriptor> = providers
            .iter()
            .map(|p| (*p, descriptor(*p)))
            .collect();
        GatewayConfig {
            provider: primary,
            routing: RoutingConfig {
                mode: RoutingMode::Heuristic,
                tiers: None,
                fallback_enabled: true,
                fallback_provider: Some(ProviderId::Openai),
            },
            providers,
            retry: Default::default(),
            breaker: Default::default(),
            pool: Default::default(),
            tools: Default::default(),
            memory: Default::default(),
            embeddings: None,
            cost: Default::default(),
            server: Default::default(),
        }
    }

    fn report(score: u32, forced: Option<Recommendation>) -> ComplexityReport {
        ComplexityReport {
            score,
            breakdown: ScoreBreakdown::default(),
            mode: RoutingMode::Heuristic,
            threshold: 40,
            recommendation: forced.unwrap_or(if score >= 40 {
                Recommendation::Cloud
            } else {
                Recommendation::Local
            }),
            forced,
            classification: TaskClass::Conversational,
        }
    }

    fn tiers() -> TierConfig {
        TierConfig {
            simple: TierTarget {
                provider: ProviderId::Ollama,
                model: "qwen2.5:7b".into(),
            },
            medium: TierTarget {
                provider: ProviderId::Ollama,
                model: "qwen2.5:32b".into(),
            },
            complex: TierTarget {
                provider: ProviderId::AzureOpenai,
                model: "gpt-4o".into(),
            },
            reasoning: TierTarget {
                provider: ProviderId::AzureOpenai,
                model: "o3".into(),
            },
        }
    }

    #[test]
    fn test_static_mode_returns_primary() {
        let router = Router::new(&config(ProviderId::Openai, &[ProviderId::Openai]));
        let decision = router.route(&report(90, None));
        assert_eq!(decision.provider, ProviderId::Openai);
        assert_eq!(decision.method, RoutingMethod::Static);
        assert_eq!(decision.score, 90);
    }

    #[test]
    fn test_force_local_redirects_to_configured_local() {
        let router = Router::new(&config(
            ProviderId::Openai,
            &[ProviderId::Openai, ProviderId::Ollama],
        ));
        let decision = router.route(&report(5, Some(Recommendation::Local)));
        assert_eq!(decision.provider, ProviderId::Ollama);
        assert_eq!(decision.method, RoutingMethod::Complexity);
    }

    #[test]
    fn test_force_local_without_local_stays_static() {
        let router = Router::new(&config(ProviderId::Openai, &[ProviderId::Openai]));
        let decision = router.route(&report(5, Some(Recommendation::Local)));
        assert_eq!(decision.provider, ProviderId::Openai);
        assert_eq!(decision.method, RoutingMethod::Static);
    }

    #[test]
    fn test_force_cloud_from_local_primary_uses_fallback() {
        let router = Router::new(&config(
            ProviderId::Ollama,
            &[ProviderId::Ollama, ProviderId::Openai],
        ));
        let decision = router.route(&report(95, Some(Recommendation::Cloud)));
        assert_eq!(decision.provider, ProviderId::Openai);
        assert_eq!(decision.method, RoutingMethod::Complexity);
    }

    #[test]
    fn test_tier_buckets() {
        let mut cfg = config(ProviderId::Ollama, &[ProviderId::Ollama]);
        cfg.routing.tiers = Some(tiers());
        let router = Router::new(&cfg);

        let simple = router.route(&report(10, None));
        assert_eq!(simple.provider, ProviderId::Ollama);
        assert_eq!(simple.model.as_deref(), Some("qwen2.5:7b"));
        assert_eq!(simple.method, RoutingMethod::Tier);

        let medium = router.route(&report(40, None));
        assert_eq!(medium.model.as_deref(), Some("qwen2.5:32b"));

        let complex = router.route(&report(70, None));
        assert_eq!(complex.provider, ProviderId::AzureOpenai);
        assert_eq!(complex.model.as_deref(), Some("gpt-4o"));

        let reasoning = router.route(&report(90, None));
        assert_eq!(reasoning.model.as_deref(), Some("o3"));
    }

    #[test]
    fn test_high_scoring_request_avoids_local_tier() {
        // "Refactor the entire codebase" style score lands in reasoning.
        let mut cfg = config(ProviderId::Ollama, &[ProviderId::Ollama]);
        cfg.routing.tiers = Some(tiers());
        let router = Router::new(&cfg);
        let decision = router.route(&report(80, None));
        assert_eq!(decision.provider, ProviderId::AzureOpenai);
        assert_ne!(decision.provider, ProviderId::Ollama);
    }

    #[test]
    fn test_fallback_policy_accessors() {
        let router = Router::new(&config(ProviderId::Ollama, &[ProviderId::Ollama]));
        assert!(router.fallback_enabled());
        assert_eq!(router.fallback_provider(), Some(ProviderId::Openai));

        let mut cfg = config(ProviderId::Ollama, &[ProviderId::Ollama]);
        cfg.routing.fallback_enabled = false;
        assert!(!Router::new(&cfg).fallback_enabled());
    }
}
