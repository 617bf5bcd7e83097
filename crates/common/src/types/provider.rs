use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A configured upstream provider.
///
/// Providers group into families that share a wire shape; dispatch and
/// translation are implemented once per family.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderId {
    Openai,
    AzureOpenai,
    AzureResponses,
    Openrouter,
    Anthropic,
    Bedrock,
    Ollama,
    Llamacpp,
    Lmstudio,
    Tinyfish,
}

/// A wire-format family. All providers in a family share request/response
/// translation, auth header construction, and URL templating.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ProviderFamily {
    /// OpenAI chat-completions and every compatible endpoint.
    OpenAiChat,
    /// Azure OpenAI Responses surface (chat shape with `max_completion_tokens`).
    AzureResponses,
    /// Anthropic-style Messages REST surface.
    AnthropicNative,
    /// AWS Bedrock Converse.
    BedrockConverse,
    /// Ollama's native `/api/chat`.
    OllamaNative,
    /// SSE-streaming browser-automation endpoint.
    TinyFishSse,
}

impl ProviderId {
    /// Every recognized identifier, in the order shown in startup errors.
    pub const ALL: [ProviderId; 10] = [
        ProviderId::Openai,
        ProviderId::AzureOpenai,
        ProviderId::AzureResponses,
        ProviderId::Openrouter,
        ProviderId::Anthropic,
        ProviderId::Bedrock,
        ProviderId::Ollama,
        ProviderId::Llamacpp,
        ProviderId::Lmstudio,
        ProviderId::Tinyfish,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::AzureOpenai => "azure-openai",
            Self::AzureResponses => "azure-responses",
            Self::Openrouter => "openrouter",
            Self::Anthropic => "anthropic",
            Self::Bedrock => "bedrock",
            Self::Ollama => "ollama",
            Self::Llamacpp => "llamacpp",
            Self::Lmstudio => "lmstudio",
            Self::Tinyfish => "tinyfish",
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            Self::Openai | Self::AzureOpenai | Self::Openrouter | Self::Llamacpp
            | Self::Lmstudio => ProviderFamily::OpenAiChat,
            Self::AzureResponses => ProviderFamily::AzureResponses,
            Self::Anthropic => ProviderFamily::AnthropicNative,
            Self::Bedrock => ProviderFamily::BedrockConverse,
            Self::Ollama => ProviderFamily::OllamaNative,
            Self::Tinyfish => ProviderFamily::TinyFishSse,
        }
    }

    /// Local inference servers. Forbidden as fallback targets and subject to
    /// the consecutive same-role compaction pass.
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Ollama | Self::Llamacpp | Self::Lmstudio)
    }
}

impl ProviderFamily {
    /// Whether the gateway can pass the upstream's stream through unchanged.
    /// Only the Anthropic-native surface emits events in the canonical
    /// shape; every other family gets `stream` forced off until a canonical
    /// SSE translator exists. The TinyFish stream is consumed internally.
    pub fn supports_stream_passthrough(&self) -> bool {
        matches!(self, Self::AnthropicNative)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ProviderId::ALL
            .iter()
            .find(|p| p.as_str() == s)
            .copied()
            .ok_or_else(|| {
                let valid: Vec<&str> = ProviderId::ALL.iter().map(|p| p.as_str()).collect();
                format!(
                    "unknown provider '{}' (valid values: {})",
                    s,
                    valid.join(", ")
                )
            })
    }
}

/// Connection details for one configured provider.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub id: ProviderId,
    /// Base endpoint URL. Family code appends the path shape.
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Default model when the tier table does not override it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Azure deployment name, where the URL is deployment-scoped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment: Option<String>,
    pub timeout_secs: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_roundtrip() {
        for p in ProviderId::ALL {
            assert_eq!(p.as_str().parse::<ProviderId>().unwrap(), p);
        }
    }

    #[test]
    fn test_unknown_provider_lists_valid_values() {
        let err = "gpt5-cloud".parse::<ProviderId>().unwrap_err();
        assert!(err.contains("unknown provider"));
        assert!(err.contains("openai"));
        assert!(err.contains("tinyfish"));
    }

    #[test]
    fn test_local_families() {
        assert!(ProviderId::Ollama.is_local());
        assert!(ProviderId::Llamacpp.is_local());
        assert!(ProviderId::Lmstudio.is_local());
        assert!(!ProviderId::Openai.is_local());
        assert!(!ProviderId::Bedrock.is_local());
    }

    #[test]
    fn test_openai_chat_family_members() {
        assert_eq!(ProviderId::Lmstudio.family(), ProviderFamily::OpenAiChat);
        assert_eq!(ProviderId::Llamacpp.family(), ProviderFamily::OpenAiChat);
        assert_eq!(ProviderId::Openrouter.family(), ProviderFamily::OpenAiChat);
        assert_eq!(ProviderId::Ollama.family(), ProviderFamily::OllamaNative);
    }
}
