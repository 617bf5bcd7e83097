use std::time::Duration;

use switchboard_common::config::PoolConfig;
use switchboard_common::GatewayError;

/// Process-lifetime HTTP clients.
///
/// `https` and `http` are keep-alive pooled clients with a request timeout.
/// `sse` is a separate client with no body-read timeout — streams may be
/// long-lived; the dispatcher bounds total consumption with an outer wall
/// clock instead.
pub struct HttpPools {
    https: reqwest::Client,
    http: reqwest::Client,
    sse: reqwest::Client,
    pub sse_wall_clock: Duration,
}

impl HttpPools {
    pub fn new(config: &PoolConfig) -> Result<Self, GatewayError> {
        let base = || {
            reqwest::Client::builder()
                .pool_max_idle_per_host(config.max_idle_per_host)
                .pool_idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        };

        let https = base()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Config(format!("https client: {}", e)))?;

        let http = base()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Config(format!("http client: {}", e)))?;

        // No total timeout: the response body is an open stream. Connect
        // timeout still applies.
        let sse = base()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GatewayError::Config(format!("sse client: {}", e)))?;

        Ok(Self {
            https,
            http,
            sse,
            sse_wall_clock: Duration::from_secs(config.sse_wall_clock_secs),
        })
    }

    /// Pooled client for a given endpoint URL.
    pub fn client_for(&self, endpoint: &str) -> &reqwest::Client {
        if endpoint.starts_with("http://") {
            &self.http
        } else {
            &self.https
        }
    }

    /// The long-lived client for SSE endpoints.
    pub fn sse_client(&self) -> &reqwest::Client {
        &self.sse
    }
}
