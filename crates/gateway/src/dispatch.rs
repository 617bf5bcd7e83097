//! The dispatcher: analyze → route → translate → send (under breaker and
//! retry policy) → translate back, with a one-shot fallback when a local
//! primary fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::Value;

use switchboard_common::config::GatewayConfig;
use switchboard_common::types::provider::{ProviderDescriptor, ProviderFamily, ProviderId};
use switchboard_common::types::routing::{RoutingDecision, RoutingMethod};
use switchboard_common::types::{
    CanonicalRequest, CanonicalResponse, ContentBlock, StopReason, SystemPrompt, Usage,
};
use switchboard_common::GatewayError;

use crate::analyzer::ComplexityAnalyzer;
use crate::breaker::BreakerRegistry;
use crate::decisions::DecisionLog;
use crate::memory::MemoryStore;
use crate::metrics as dispatch_metrics;
use crate::pool::HttpPools;
use crate::providers;
use crate::retry::with_retries;
use crate::router::Router;
use crate::sse::SseDecoder;
use crate::tools;
use crate::translate;

// ---------------------------------------------------------------------------
// Transport abstraction
// ---------------------------------------------------------------------------

pub struct TransportRequest<'a> {
    pub descriptor: &'a ProviderDescriptor,
    pub url: String,
    pub body: Value,
}

pub struct TransportResponse {
    pub body: Vec<u8>,
}

/// An upstream byte stream handed back to the front door (or consumed
/// internally for the SSE automation family).
pub struct StreamHandle {
    pub content_type: String,
    pub stream: BoxStream<'static, Result<Bytes, reqwest::Error>>,
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Object-safe upstream transport, mockable in tests.
pub trait ProviderTransport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, GatewayError>> + Send + 'a>>;

    fn send_streaming<'a>(
        &'a self,
        request: TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<StreamHandle, GatewayError>> + Send + 'a>>;
}

/// Production transport over the pooled clients.
pub struct HttpTransport {
    pools: Arc<HttpPools>,
}

impl HttpTransport {
    pub fn new(pools: Arc<HttpPools>) -> Self {
        Self { pools }
    }

    async fn post(
        &self,
        request: &TransportRequest<'_>,
        streaming: bool,
    ) -> Result<reqwest::Response, GatewayError> {
        let client = if streaming {
            self.pools.sse_client()
        } else {
            self.pools.client_for(&request.descriptor.endpoint)
        };

        let builder = client
            .post(&request.url)
            .timeout(Duration::from_secs(request.descriptor.timeout_secs))
            .json(&request.body);
        let builder = providers::apply_headers(builder, request.descriptor)?;

        let response = builder.send().await.map_err(classify_reqwest_error)?;
        let status = response.status();

        if status.is_success() {
            return Ok(response);
        }

        let status_code = status.as_u16();
        if status_code == 429 {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok());
            return Err(GatewayError::RateLimited { retry_after });
        }

        let body = response.text().await.unwrap_or_default();
        if status_code >= 500 {
            return Err(GatewayError::ServerError {
                status: status_code,
                message: truncate(&body, 500),
            });
        }

        // 4xx: a schema complaint about tools is its own class so the
        // dispatcher can fall back to a provider that accepts them.
        let lowered = body.to_lowercase();
        if lowered.contains("tool") && (lowered.contains("schema") || lowered.contains("function"))
        {
            Err(GatewayError::ToolIncompatible(truncate(&body, 500)))
        } else {
            Err(GatewayError::InvalidRequest(format!(
                "{}: {}",
                status_code,
                truncate(&body, 500)
            )))
        }
    }
}

impl ProviderTransport for HttpTransport {
    fn send<'a>(
        &'a self,
        request: TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self.post(&request, false).await?;
            let body = response
                .bytes()
                .await
                .map_err(classify_reqwest_error)?
                .to_vec();
            Ok(TransportResponse { body })
        })
    }

    fn send_streaming<'a>(
        &'a self,
        request: TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<StreamHandle, GatewayError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self.post(&request, true).await?;
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("text/event-stream")
                .to_string();
            Ok(StreamHandle {
                content_type,
                stream: response.bytes_stream().boxed(),
            })
        })
    }
}

fn classify_reqwest_error(e: reqwest::Error) -> GatewayError {
    if e.is_timeout() {
        GatewayError::Timeout(e.to_string())
    } else {
        GatewayError::Transport(e.to_string())
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        text.to_string()
    } else {
        let mut end = max;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &text[..end])
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

pub enum DispatchOutcome {
    Complete(Box<CanonicalResponse>, RoutingDecision),
    Stream(StreamHandle, RoutingDecision),
}

impl std::fmt::Debug for DispatchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Complete(resp, decision) => f
                .debug_tuple("Complete")
                .field(resp)
                .field(decision)
                .finish(),
            Self::Stream(stream, decision) => f
                .debug_tuple("Stream")
                .field(stream)
                .field(decision)
                .finish(),
        }
    }
}

pub struct Dispatcher {
    config: Arc<GatewayConfig>,
    breakers: Arc<BreakerRegistry>,
    router: Router,
    analyzer: ComplexityAnalyzer,
    memory: Option<Arc<MemoryStore>>,
    decisions: Arc<DecisionLog>,
    transport: Arc<dyn ProviderTransport>,
    sse_wall_clock: Duration,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<GatewayConfig>,
        breakers: Arc<BreakerRegistry>,
        router: Router,
        analyzer: ComplexityAnalyzer,
        memory: Option<Arc<MemoryStore>>,
        decisions: Arc<DecisionLog>,
        transport: Arc<dyn ProviderTransport>,
        sse_wall_clock: Duration,
    ) -> Self {
        Self {
            config,
            breakers,
            router,
            analyzer,
            memory,
            decisions,
            transport,
            sse_wall_clock,
        }
    }

    /// Full request lifecycle. Returns either a translated response or an
    /// opaque stream handle for passthrough.
    pub async fn dispatch(
        &self,
        mut request: CanonicalRequest,
    ) -> Result<DispatchOutcome, GatewayError> {
        let report = self.analyzer.analyze(&request).await;
        let mut decision = self.router.route(&report);

        self.augment_from_memory(&mut request).await;

        let primary = decision.provider;
        let tier_model = decision.model.clone();
        let result = self
            .dispatch_to(primary, tier_model.as_deref(), &request, &report, &mut decision)
            .await;

        let outcome = match result {
            Ok(outcome) => Ok(outcome),
            Err(primary_error) => {
                if self.should_fall_back(primary, &primary_error) {
                    let fallback = self
                        .router
                        .fallback_provider()
                        .expect("fallback_enabled implies provider");
                    let reason = categorize(&primary_error);
                    tracing::warn!(
                        primary = %primary,
                        fallback = %fallback,
                        reason,
                        error = %primary_error,
                        "Primary provider failed, attempting fallback"
                    );
                    dispatch_metrics::record_fallback_attempt(primary, fallback, reason);

                    decision.provider = fallback;
                    decision.method = RoutingMethod::Fallback;
                    decision.model = None;
                    decision.fallback_reason = Some(reason.to_string());

                    // Full re-dispatch: the fallback family has its own wire
                    // shape, so translation runs again.
                    let fallback_result = self
                        .dispatch_to(fallback, None, &request, &report, &mut decision)
                        .await;
                    dispatch_metrics::record_fallback_outcome(
                        fallback,
                        fallback_result.is_ok(),
                    );
                    // The fallback's error is the more actionable one.
                    fallback_result
                } else {
                    Err(primary_error)
                }
            }
        }?;

        self.decisions.push(decision_of(&outcome).clone());

        if let DispatchOutcome::Complete(response, _) = &outcome {
            self.remember(&request, response).await;
        }

        Ok(outcome)
    }

    fn should_fall_back(&self, primary: ProviderId, error: &GatewayError) -> bool {
        primary.is_local() && self.router.fallback_enabled() && error.is_fallback_eligible()
    }

    /// One provider attempt: breaker gate, translation, send (retried for
    /// non-streaming), translate back.
    async fn dispatch_to(
        &self,
        provider: ProviderId,
        tier_model: Option<&str>,
        request: &CanonicalRequest,
        report: &crate::analyzer::ComplexityReport,
        decision: &mut RoutingDecision,
    ) -> Result<DispatchOutcome, GatewayError> {
        let descriptor = self.config.providers.get(&provider).ok_or_else(|| {
            GatewayError::Config(format!("provider {} is not configured", provider))
        })?;

        let breaker = self.breakers.for_provider(provider);
        breaker.check()?;

        let family = provider.family();
        let model = providers::resolve_model(descriptor, tier_model, &request.model);
        let url = providers::endpoint_url(descriptor, model)?;

        let selected = tools::select::select_tools(
            &tools::effective_tools(&request.tools, provider, &self.config.tools),
            report.classification,
            report.mode,
            provider,
            &self.config.tools,
        );

        let stream_wanted = request.stream;
        let stream_allowed = family.supports_stream_passthrough();
        if stream_wanted && !stream_allowed && family != ProviderFamily::TinyFishSse {
            tracing::debug!(provider = %provider, "Streaming not passthrough-capable, forcing off");
            decision.stream_forced_off = true;
        }
        let stream = stream_wanted && stream_allowed;

        let body = self.build_body(provider, request, model, &selected, stream)?;

        dispatch_metrics::record_attempt(provider);
        let start = std::time::Instant::now();

        if family == ProviderFamily::TinyFishSse {
            // Consumed internally until the COMPLETE event; never retried.
            let result = self
                .consume_automation_stream(descriptor, url, body, &request.model)
                .await;
            return self.finish_attempt(provider, &breaker, start, result.map(|r| {
                DispatchOutcome::Complete(Box::new(r), decision.clone())
            }));
        }

        if stream {
            // Streaming is a single attempt; errors surface to the caller.
            let result = self
                .transport
                .send_streaming(TransportRequest {
                    descriptor,
                    url,
                    body,
                })
                .await
                .map(|handle| DispatchOutcome::Stream(handle, decision.clone()));
            return self.finish_attempt(provider, &breaker, start, result);
        }

        let requested_model = request.model.clone();
        let result = with_retries(&self.config.retry, provider.as_str(), || {
            let body = body.clone();
            let url = url.clone();
            let requested_model = requested_model.clone();
            let breaker = Arc::clone(&breaker);
            async move {
                let attempt = self
                    .transport
                    .send(TransportRequest {
                        descriptor,
                        url,
                        body,
                    })
                    .await
                    .and_then(|response| {
                        parse_family_response(family, &response.body, &requested_model)
                    });

                match &attempt {
                    Ok(_) => breaker.record_success(),
                    Err(e) if e.counts_toward_breaker() => breaker.record_failure(),
                    Err(_) => {}
                }
                attempt
            }
        })
        .await;

        match result {
            Ok(response) => {
                dispatch_metrics::record_success(provider, start.elapsed().as_secs_f64());
                dispatch_metrics::record_usage(
                    provider,
                    response.usage,
                    self.config.cost.cloud_rate_per_mtok,
                );
                Ok(DispatchOutcome::Complete(
                    Box::new(response),
                    decision.clone(),
                ))
            }
            Err(e) => {
                dispatch_metrics::record_failure(provider, e.kind());
                Err(e)
            }
        }
    }

    /// Shared success/failure accounting for single-attempt paths.
    fn finish_attempt(
        &self,
        provider: ProviderId,
        breaker: &crate::breaker::CircuitBreaker,
        start: std::time::Instant,
        result: Result<DispatchOutcome, GatewayError>,
    ) -> Result<DispatchOutcome, GatewayError> {
        match &result {
            Ok(outcome) => {
                breaker.record_success();
                dispatch_metrics::record_success(provider, start.elapsed().as_secs_f64());
                if let DispatchOutcome::Complete(response, _) = outcome {
                    dispatch_metrics::record_usage(
                        provider,
                        response.usage,
                        self.config.cost.cloud_rate_per_mtok,
                    );
                }
            }
            Err(e) => {
                if e.counts_toward_breaker() {
                    breaker.record_failure();
                }
                dispatch_metrics::record_failure(provider, e.kind());
            }
        }
        result
    }

    fn build_body(
        &self,
        provider: ProviderId,
        request: &CanonicalRequest,
        model: &str,
        selected: &[switchboard_common::types::ToolDefinition],
        stream: bool,
    ) -> Result<Value, GatewayError> {
        let body = match provider.family() {
            ProviderFamily::OpenAiChat => {
                let mut body =
                    translate::openai::build_chat_body(request, model, selected, stream, false);
                // Local OpenAI-compatible servers reject consecutive
                // same-role messages.
                if provider.is_local() {
                    translate::compact_same_role_openai(&mut body.messages);
                }
                serde_json::to_value(body)?
            }
            ProviderFamily::AzureResponses => serde_json::to_value(
                translate::openai::build_chat_body(request, model, selected, stream, true),
            )?,
            ProviderFamily::AnthropicNative => serde_json::to_value(
                translate::anthropic::build_messages_body(request, model, selected, stream),
            )?,
            ProviderFamily::BedrockConverse => {
                serde_json::to_value(translate::bedrock::build_converse_body(request, selected))?
            }
            ProviderFamily::OllamaNative => {
                let ollama_tools = tools::to_ollama_tools(selected);
                serde_json::to_value(translate::ollama::build_chat_body(
                    request,
                    model,
                    &ollama_tools,
                    stream,
                ))?
            }
            ProviderFamily::TinyFishSse => {
                let mut body = serde_json::json!({
                    "goal": request.last_user_text(),
                    "browserProfile": "default",
                });
                if let Some(url) = request
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("url"))
                    .and_then(Value::as_str)
                {
                    body["url"] = Value::String(url.to_string());
                }
                if let Some(proxy) = request
                    .metadata
                    .as_ref()
                    .and_then(|m| m.get("proxy"))
                    .cloned()
                {
                    body["proxy"] = proxy;
                }
                body
            }
        };
        Ok(body)
    }

    /// Consume the browser-automation SSE stream until its COMPLETE event.
    /// A COMPLETE with non-success status is a provider error, not a
    /// transport error.
    async fn consume_automation_stream(
        &self,
        descriptor: &ProviderDescriptor,
        url: String,
        body: Value,
        requested_model: &str,
    ) -> Result<CanonicalResponse, GatewayError> {
        let handle = self
            .transport
            .send_streaming(TransportRequest {
                descriptor,
                url,
                body,
            })
            .await?;

        let consume = async {
            let mut decoder = SseDecoder::new();
            let mut stream = handle.stream;
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(classify_reqwest_error)?;
                for frame in decoder.decode(&chunk) {
                    if frame.event.as_deref() != Some("COMPLETE") {
                        continue;
                    }
                    let payload = frame.json().ok_or_else(|| {
                        GatewayError::MalformedResponse("COMPLETE event is not JSON".into())
                    })?;
                    let status = payload
                        .get("status")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string();
                    if status != "COMPLETED" && status != "SUCCESS" {
                        return Err(GatewayError::ServerError {
                            status: 502,
                            message: format!("automation run ended with status {}", status),
                        });
                    }
                    let result = payload
                        .get("resultJson")
                        .map(|v| match v {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        })
                        .unwrap_or_default();
                    return Ok(CanonicalResponse::new(
                        requested_model,
                        vec![ContentBlock::text(result)],
                        StopReason::EndTurn,
                        Usage::default(),
                    ));
                }
            }
            Err(GatewayError::MalformedResponse(
                "stream ended without a COMPLETE event".into(),
            ))
        };

        match tokio::time::timeout(self.sse_wall_clock, consume).await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::Timeout(format!(
                "automation stream exceeded {}s wall clock",
                self.sse_wall_clock.as_secs()
            ))),
        }
    }

    /// Prepend retrieved memories to the system prompt.
    async fn augment_from_memory(&self, request: &mut CanonicalRequest) {
        let Some(memory) = &self.memory else { return };
        let Some(session) = request.session_id() else {
            return;
        };
        let query = request.last_user_text();
        if query.is_empty() {
            return;
        }
        if let Some(context) = memory.context_for(&session, &query).await {
            let system = match request.system_text() {
                Some(existing) => format!("{}\n\n{}", context, existing),
                None => context,
            };
            request.system = Some(SystemPrompt::Text(system));
        }
    }

    /// Extract memories from the assistant's text. Never fails the request.
    async fn remember(&self, request: &CanonicalRequest, response: &CanonicalResponse) {
        let Some(memory) = &self.memory else { return };
        let text = response.text();
        if text.is_empty() {
            return;
        }
        let session = request.session_id();
        memory
            .remember(session.as_ref(), &text, Some(&response.id))
            .await;
    }
}

fn decision_of(outcome: &DispatchOutcome) -> &RoutingDecision {
    match outcome {
        DispatchOutcome::Complete(_, decision) => decision,
        DispatchOutcome::Stream(_, decision) => decision,
    }
}

fn parse_family_response(
    family: ProviderFamily,
    body: &[u8],
    requested_model: &str,
) -> Result<CanonicalResponse, GatewayError> {
    match family {
        ProviderFamily::OpenAiChat | ProviderFamily::AzureResponses => {
            translate::openai::parse_chat_response(body, requested_model)
        }
        ProviderFamily::AnthropicNative => {
            translate::anthropic::parse_messages_response(body, requested_model)
        }
        ProviderFamily::BedrockConverse => {
            translate::bedrock::parse_converse_response(body, requested_model)
        }
        ProviderFamily::OllamaNative => {
            translate::ollama::parse_chat_response(body, requested_model)
        }
        ProviderFamily::TinyFishSse => Err(GatewayError::Internal(
            "automation responses are assembled from the stream".into(),
        )),
    }
}

/// Failure category attached to fallback reasons and metrics.
pub fn categorize(error: &GatewayError) -> &'static str {
    match error {
        GatewayError::CircuitOpen(_) => "circuit_breaker",
        GatewayError::Timeout(_) => "timeout",
        GatewayError::Transport(_) | GatewayError::Config(_) => "service_unavailable",
        GatewayError::ToolIncompatible(_) => "tool_incompatible",
        GatewayError::RateLimited { .. } => "rate_limited",
        _ => "error",
    }
}
