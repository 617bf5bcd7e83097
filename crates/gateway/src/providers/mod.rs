//! Per-family endpoint templates and authentication.
//!
//! Each family has a fixed path shape and auth style; dispatch code is
//! shared per family and parameterized by the descriptor.

use reqwest::RequestBuilder;

use switchboard_common::types::provider::{ProviderDescriptor, ProviderFamily, ProviderId};
use switchboard_common::GatewayError;

use crate::translate::anthropic::ANTHROPIC_VERSION;

const DEFAULT_AZURE_API_VERSION: &str = "2024-10-21";

/// Build the dispatch URL for a provider and resolved model.
pub fn endpoint_url(desc: &ProviderDescriptor, model: &str) -> Result<String, GatewayError> {
    let base = desc.endpoint.trim_end_matches('/');
    if base.is_empty() {
        return Err(GatewayError::Config(format!(
            "provider {} has no endpoint configured",
            desc.id
        )));
    }

    let url = match desc.id {
        // Deployment-scoped chat URL.
        ProviderId::AzureOpenai => {
            let deployment = desc.deployment.as_deref().unwrap_or(model);
            with_api_version(&format!(
                "{}/openai/deployments/{}/chat/completions",
                base, deployment
            ))
        }
        ProviderId::AzureResponses => with_api_version(&format!("{}/openai/responses", base)),
        ProviderId::Bedrock => format!("{}/model/{}/converse", base, model),
        ProviderId::Ollama => format!("{}/api/chat", base),
        // The Anthropic-compatible surface takes its full path from config.
        ProviderId::Anthropic => base.to_string(),
        // The SSE endpoint is the configured URL verbatim.
        ProviderId::Tinyfish => base.to_string(),
        // Plain OpenAI-compatible servers.
        ProviderId::Openai | ProviderId::Openrouter | ProviderId::Llamacpp
        | ProviderId::Lmstudio => {
            if base.ends_with("/chat/completions") {
                base.to_string()
            } else if base.ends_with("/v1") {
                format!("{}/chat/completions", base)
            } else {
                format!("{}/v1/chat/completions", base)
            }
        }
    };

    Ok(url)
}

fn with_api_version(url: &str) -> String {
    if url.contains("api-version=") {
        url.to_string()
    } else {
        format!("{}?api-version={}", url, DEFAULT_AZURE_API_VERSION)
    }
}

/// Attach the family's auth headers.
///
/// Missing credentials are a config error for every family except the
/// unauthenticated local ones.
pub fn apply_headers(
    builder: RequestBuilder,
    desc: &ProviderDescriptor,
) -> Result<RequestBuilder, GatewayError> {
    let key = || {
        desc.api_key.clone().filter(|k| !k.is_empty()).ok_or_else(|| {
            GatewayError::Config(format!("provider {} has no api key configured", desc.id))
        })
    };

    let builder = match desc.id.family() {
        ProviderFamily::OllamaNative => builder,
        ProviderFamily::AnthropicNative => builder
            .header("x-api-key", key()?)
            .header("anthropic-version", ANTHROPIC_VERSION),
        ProviderFamily::BedrockConverse => builder.bearer_auth(key()?),
        ProviderFamily::TinyFishSse => builder.header("X-API-Key", key()?),
        ProviderFamily::AzureResponses => azure_auth(builder, desc, key()?),
        ProviderFamily::OpenAiChat => match desc.id {
            ProviderId::AzureOpenai => azure_auth(builder, desc, key()?),
            // llama.cpp and LM Studio accept any bearer token; send one only
            // if configured.
            ProviderId::Llamacpp | ProviderId::Lmstudio => match &desc.api_key {
                Some(k) if !k.is_empty() => builder.bearer_auth(k),
                _ => builder,
            },
            _ => builder.bearer_auth(key()?),
        },
    };

    Ok(builder)
}

/// Azure uses `api-key` on classic endpoints and Bearer on the
/// services.ai.azure.com surface.
fn azure_auth(builder: RequestBuilder, desc: &ProviderDescriptor, key: String) -> RequestBuilder {
    if desc.endpoint.contains("services.ai.azure.com") {
        builder.bearer_auth(key)
    } else {
        builder.header("api-key", key)
    }
}

/// Model sent upstream: explicit tier override, then the descriptor's
/// default, then the caller's model id.
pub fn resolve_model<'a>(
    desc: &'a ProviderDescriptor,
    tier_model: Option<&'a str>,
    requested_model: &'a str,
) -> &'a str {
    tier_model
        .or(desc.model.as_deref())
        .unwrap_or(requested_model)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: ProviderId, endpoint: &str) -> ProviderDescriptor {
        ProviderDescriptor {
            id,
            endpoint: endpoint.into(),
            api_key: Some("k".into()),
            model: None,
            deployment: None,
            timeout_secs: 60,
        }
    }

    #[test]
    fn test_openai_chat_path() {
        let d = descriptor(ProviderId::Openai, "https://api.openai.com");
        assert_eq!(
            endpoint_url(&d, "gpt-4o").unwrap(),
            "https://api.openai.com/v1/chat/completions"
        );
        let d = descriptor(ProviderId::Lmstudio, "http://localhost:1234/v1");
        assert_eq!(
            endpoint_url(&d, "m").unwrap(),
            "http://localhost:1234/v1/chat/completions"
        );
    }

    #[test]
    fn test_azure_deployment_scoped() {
        let mut d = descriptor(ProviderId::AzureOpenai, "https://example.openai.azure.com");
        d.deployment = Some("gpt4o-prod".into());
        let url = endpoint_url(&d, "gpt-4o").unwrap();
        assert_eq!(
            url,
            format!(
                "https://example.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version={}",
                DEFAULT_AZURE_API_VERSION
            )
        );
    }

    #[test]
    fn test_azure_responses_path() {
        let d = descriptor(ProviderId::AzureResponses, "https://example.openai.azure.com");
        let url = endpoint_url(&d, "m").unwrap();
        assert!(url.starts_with("https://example.openai.azure.com/openai/responses?api-version="));
    }

    #[test]
    fn test_bedrock_model_in_path() {
        let d = descriptor(ProviderId::Bedrock, "https://bedrock-runtime.us-east-1.amazonaws.com");
        assert_eq!(
            endpoint_url(&d, "anthropic.claude-3-5-sonnet").unwrap(),
            "https://bedrock-runtime.us-east-1.amazonaws.com/model/anthropic.claude-3-5-sonnet/converse"
        );
    }

    #[test]
    fn test_ollama_chat_path() {
        let d = descriptor(ProviderId::Ollama, "http://localhost:11434");
        assert_eq!(
            endpoint_url(&d, "m").unwrap(),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn test_empty_endpoint_is_config_error() {
        let d = descriptor(ProviderId::Openai, "");
        assert!(matches!(
            endpoint_url(&d, "m"),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn test_resolve_model_precedence() {
        let mut d = descriptor(ProviderId::Openai, "https://api.openai.com");
        assert_eq!(resolve_model(&d, None, "caller-model"), "caller-model");
        d.model = Some("configured".into());
        assert_eq!(resolve_model(&d, None, "caller-model"), "configured");
        assert_eq!(resolve_model(&d, Some("tiered"), "caller-model"), "tiered");
    }
}
