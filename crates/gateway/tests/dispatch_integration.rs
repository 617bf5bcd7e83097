//! End-to-end dispatcher tests over a mock transport: translation, breaker
//! interaction, fallback policy, tier routing, and memory extraction.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::{json, Value};

use switchboard_common::config::{GatewayConfig, RetryConfig, RoutingConfig, TierConfig, TierTarget};
use switchboard_common::types::provider::{ProviderDescriptor, ProviderId};
use switchboard_common::types::routing::{RoutingMethod, RoutingMode};
use switchboard_common::types::{CanonicalRequest, ContentBlock, StopReason};
use switchboard_common::GatewayError;

use switchboard_gateway::analyzer::ComplexityAnalyzer;
use switchboard_gateway::breaker::BreakerRegistry;
use switchboard_gateway::decisions::DecisionLog;
use switchboard_gateway::dispatch::{
    DispatchOutcome, Dispatcher, ProviderTransport, StreamHandle, TransportRequest,
    TransportResponse,
};
use switchboard_gateway::memory::{MemoryFilter, MemoryStore};
use switchboard_gateway::router::Router;

// ---------------------------------------------------------------------------
// Mock transport
// ---------------------------------------------------------------------------

type Responder =
    Box<dyn Fn(ProviderId, &Value) -> Result<TransportResponse, GatewayError> + Send + Sync>;

struct MockTransport {
    responder: Responder,
    calls: std::sync::Mutex<Vec<(ProviderId, String, Value)>>,
    stream_body: Option<Vec<u8>>,
}

impl MockTransport {
    fn new(responder: Responder) -> Self {
        Self {
            responder,
            calls: std::sync::Mutex::new(Vec::new()),
            stream_body: None,
        }
    }

    fn with_stream(body: &[u8]) -> Self {
        Self {
            responder: Box::new(|_, _| {
                Err(GatewayError::Internal("not a batch provider".into()))
            }),
            calls: std::sync::Mutex::new(Vec::new()),
            stream_body: Some(body.to_vec()),
        }
    }

    fn calls_for(&self, provider: ProviderId) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _, _)| *p == provider)
            .count()
    }

    fn last_body(&self) -> Value {
        self.calls.lock().unwrap().last().unwrap().2.clone()
    }

    fn last_url(&self) -> String {
        self.calls.lock().unwrap().last().unwrap().1.clone()
    }
}

impl ProviderTransport for MockTransport {
    fn send<'a>(
        &'a self,
        request: TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, GatewayError>> + Send + 'a>> {
        let provider = request.descriptor.id;
        self.calls
            .lock()
            .unwrap()
            .push((provider, request.url.clone(), request.body.clone()));
        let result = (self.responder)(provider, &request.body);
        Box::pin(async move { result })
    }

    fn send_streaming<'a>(
        &'a self,
        request: TransportRequest<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<StreamHandle, GatewayError>> + Send + 'a>> {
        let provider = request.descriptor.id;
        self.calls
            .lock()
            .unwrap()
            .push((provider, request.url.clone(), request.body.clone()));
        let body = self.stream_body.clone();
        Box::pin(async move {
            let body = body.ok_or_else(|| GatewayError::Internal("no stream configured".into()))?;
            let chunks: Vec<Result<axum::body::Bytes, reqwest::Error>> =
                vec![Ok(axum::body::Bytes::from(body))];
            Ok(StreamHandle {
                content_type: "text/event-stream".into(),
                stream: futures::stream::iter(chunks).boxed(),
            })
        })
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

fn descriptor(id: ProviderId, endpoint: &str) -> ProviderDescriptor {
    ProviderDescriptor {
        id,
        endpoint: endpoint.into(),
        api_key: Some("key".into()),
        model: None,
        deployment: None,
        timeout_secs: 30,
    }
}

fn base_config(primary: ProviderId) -> GatewayConfig {
    let mut providers = HashMap::new();
    providers.insert(
        ProviderId::Ollama,
        descriptor(ProviderId::Ollama, "http://localhost:11434"),
    );
    providers.insert(
        ProviderId::Openai,
        descriptor(ProviderId::Openai, "https://api.openai.com"),
    );
    providers.insert(
        ProviderId::AzureOpenai,
        descriptor(ProviderId::AzureOpenai, "https://example.openai.azure.com"),
    );
    providers.insert(
        ProviderId::Tinyfish,
        descriptor(ProviderId::Tinyfish, "https://sse.tinyfish.example/run"),
    );

    GatewayConfig {
        provider: primary,
        routing: RoutingConfig {
            mode: RoutingMode::Heuristic,
            tiers: None,
            fallback_enabled: true,
            fallback_provider: Some(ProviderId::Openai),
        },
        providers,
        retry: RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            backoff_multiplier: 2.0,
            jitter: false,
        },
        breaker: Default::default(),
        pool: Default::default(),
        tools: Default::default(),
        memory: Default::default(),
        embeddings: None,
        cost: Default::default(),
        server: Default::default(),
    }
}

fn dispatcher_with(
    config: GatewayConfig,
    transport: Arc<MockTransport>,
    memory: Option<Arc<MemoryStore>>,
) -> Dispatcher {
    let config = Arc::new(config);
    Dispatcher::new(
        Arc::clone(&config),
        Arc::new(BreakerRegistry::new(config.breaker.clone())),
        Router::new(&config),
        ComplexityAnalyzer::new(config.routing.mode, None),
        memory,
        Arc::new(DecisionLog::new(16)),
        transport,
        Duration::from_secs(5),
    )
}

fn user_request(text: &str) -> CanonicalRequest {
    serde_json::from_value(json!({
        "model": "claude-sonnet",
        "messages": [{"role": "user", "content": text}],
    }))
    .unwrap()
}

fn openai_ok(text: &str) -> Result<TransportResponse, GatewayError> {
    Ok(TransportResponse {
        body: json!({
            "choices": [{
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 1}
        })
        .to_string()
        .into_bytes(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_simple_request_translates_roundtrip() {
    let transport = Arc::new(MockTransport::new(Box::new(|_, _| openai_ok("Hi"))));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Openai),
        Arc::clone(&transport),
        None,
    );

    let outcome = dispatcher
        .dispatch(user_request("Read the config file and summarize it"))
        .await
        .unwrap();
    let (response, decision) = match outcome {
        DispatchOutcome::Complete(response, decision) => (response, decision),
        _ => panic!("Expected a complete response"),
    };

    assert_eq!(response.model, "claude-sonnet");
    assert_eq!(response.stop_reason, StopReason::EndTurn);
    assert_eq!(response.usage.input_tokens, 1);
    assert_eq!(response.usage.output_tokens, 1);
    assert!(
        matches!(&response.content[0], ContentBlock::Text { text } if text == "Hi"),
        "unexpected content {:?}",
        response.content
    );
    assert_eq!(decision.provider, ProviderId::Openai);
    assert_eq!(decision.method, RoutingMethod::Static);

    // The wire body was chat-completions shaped, with the catalog injected.
    let body = transport.last_body();
    assert_eq!(body["messages"][0]["role"], "user");
    assert!(body["tools"].as_array().map(|t| !t.is_empty()).unwrap_or(false));
    assert!(transport.last_url().ends_with("/v1/chat/completions"));
}

#[tokio::test]
async fn test_transient_errors_retried_then_succeed() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    let transport = Arc::new(MockTransport::new(Box::new(move |_, _| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(GatewayError::ServerError {
                status: 503,
                message: "overloaded".into(),
            })
        } else {
            openai_ok("recovered")
        }
    })));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Openai),
        Arc::clone(&transport),
        None,
    );

    let outcome = dispatcher
        .dispatch(user_request("Summarize the design document"))
        .await
        .unwrap();
    match outcome {
        DispatchOutcome::Complete(response, _) => assert_eq!(response.text(), "recovered"),
        _ => panic!("Expected a complete response"),
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_local_failure_falls_back_once() {
    let transport = Arc::new(MockTransport::new(Box::new(|provider, _| match provider {
        ProviderId::Ollama => Err(GatewayError::Transport("connection refused".into())),
        ProviderId::Openai => openai_ok("from fallback"),
        other => panic!("unexpected provider {}", other),
    })));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Ollama),
        Arc::clone(&transport),
        None,
    );

    let outcome = dispatcher.dispatch(user_request("Hello")).await.unwrap();
    let (response, decision) = match outcome {
        DispatchOutcome::Complete(response, decision) => (response, decision),
        _ => panic!("Expected a complete response"),
    };

    assert_eq!(response.text(), "from fallback");
    assert_eq!(decision.provider, ProviderId::Openai);
    assert_eq!(decision.method, RoutingMethod::Fallback);
    assert_eq!(decision.fallback_reason.as_deref(), Some("service_unavailable"));

    // Primary exhausted its retry budget, fallback used exactly one call.
    assert_eq!(transport.calls_for(ProviderId::Ollama), 3);
    assert_eq!(transport.calls_for(ProviderId::Openai), 1);
}

#[tokio::test]
async fn test_open_breaker_skips_network_and_falls_back() {
    let transport = Arc::new(MockTransport::new(Box::new(|provider, _| match provider {
        ProviderId::Ollama => Err(GatewayError::Transport("connection refused".into())),
        _ => openai_ok("cloud"),
    })));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Ollama),
        Arc::clone(&transport),
        None,
    );

    // Two dispatches burn through 6 transport attempts; the breaker trips
    // at the default threshold of 5.
    for _ in 0..2 {
        dispatcher.dispatch(user_request("Hello")).await.unwrap();
    }
    let after_trip = transport.calls_for(ProviderId::Ollama);
    assert_eq!(after_trip, 6);

    // Breaker now open: no further Ollama traffic, fallback reason changes.
    let outcome = dispatcher.dispatch(user_request("Hello")).await.unwrap();
    let decision = match outcome {
        DispatchOutcome::Complete(_, decision) => decision,
        _ => panic!("Expected a complete response"),
    };
    assert_eq!(transport.calls_for(ProviderId::Ollama), after_trip);
    assert_eq!(decision.method, RoutingMethod::Fallback);
    assert_eq!(decision.fallback_reason.as_deref(), Some("circuit_breaker"));
}

#[tokio::test]
async fn test_cloud_primary_never_falls_back() {
    let transport = Arc::new(MockTransport::new(Box::new(|_, _| {
        Err(GatewayError::Transport("connection refused".into()))
    })));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Openai),
        Arc::clone(&transport),
        None,
    );

    let error = dispatcher
        .dispatch(user_request("Summarize the design document"))
        .await
        .unwrap_err();
    assert!(matches!(error, GatewayError::Transport(_)));
    assert_eq!(transport.calls_for(ProviderId::Ollama), 0);
}

#[tokio::test]
async fn test_fallback_disabled_surfaces_primary_error() {
    let transport = Arc::new(MockTransport::new(Box::new(|_, _| {
        Err(GatewayError::Transport("connection refused".into()))
    })));
    let mut config = base_config(ProviderId::Ollama);
    config.routing.fallback_enabled = false;
    config.routing.fallback_provider = None;
    let dispatcher = dispatcher_with(config, Arc::clone(&transport), None);

    let error = dispatcher.dispatch(user_request("Hello")).await.unwrap_err();
    assert!(matches!(error, GatewayError::Transport(_)));
    assert_eq!(transport.calls_for(ProviderId::Openai), 0);
}

#[tokio::test]
async fn test_invalid_request_not_retried_not_fallback() {
    let transport = Arc::new(MockTransport::new(Box::new(|_, _| {
        Err(GatewayError::InvalidRequest("400: bad body".into()))
    })));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Ollama),
        Arc::clone(&transport),
        None,
    );

    let error = dispatcher.dispatch(user_request("Hello")).await.unwrap_err();
    assert!(matches!(error, GatewayError::InvalidRequest(_)));
    assert_eq!(transport.calls_for(ProviderId::Ollama), 1);
    assert_eq!(transport.calls_for(ProviderId::Openai), 0);
}

#[tokio::test]
async fn test_tier_routing_sends_complex_work_to_cloud() {
    let transport = Arc::new(MockTransport::new(Box::new(|provider, _| match provider {
        ProviderId::AzureOpenai => openai_ok("cloud answer"),
        other => panic!("complex request landed on {}", other),
    })));

    let mut config = base_config(ProviderId::Ollama);
    config.routing.tiers = Some(TierConfig {
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
    });
    let dispatcher = dispatcher_with(config, Arc::clone(&transport), None);

    let outcome = dispatcher
        .dispatch(user_request(
            "Refactor the entire codebase to use microservices",
        ))
        .await
        .unwrap();
    let decision = match outcome {
        DispatchOutcome::Complete(_, decision) => decision,
        _ => panic!("Expected a complete response"),
    };

    assert_eq!(decision.method, RoutingMethod::Tier);
    assert_eq!(decision.provider, ProviderId::AzureOpenai);
    assert!(decision.score >= 75, "score was {}", decision.score);
    assert_eq!(transport.calls_for(ProviderId::Ollama), 0);

    // The tier model overrode the caller's model on the wire, while the
    // deployment-scoped Azure URL carried it in the path.
    let url = transport.last_url();
    assert!(url.contains("/openai/deployments/"), "url was {}", url);
}

#[tokio::test]
async fn test_stream_forced_off_for_chat_family() {
    let transport = Arc::new(MockTransport::new(Box::new(|_, _| openai_ok("batch"))));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Openai),
        Arc::clone(&transport),
        None,
    );

    let mut request = user_request("Summarize the design document");
    request.stream = true;
    let outcome = dispatcher.dispatch(request).await.unwrap();
    let decision = match outcome {
        DispatchOutcome::Complete(_, decision) => decision,
        _ => panic!("Stream should have been forced off"),
    };
    assert!(decision.stream_forced_off);
    assert_ne!(transport.last_body()["stream"], json!(true));
}

#[tokio::test]
async fn test_automation_stream_consumed_to_completion() {
    let sse = b"data: {\"status\":\"RUNNING\"}\n\n\
event: COMPLETE\ndata: {\"status\":\"COMPLETED\",\"resultJson\":\"{\\\"price\\\":42}\"}\n\n";
    let transport = Arc::new(MockTransport::with_stream(sse));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Tinyfish),
        Arc::clone(&transport),
        None,
    );

    let mut request = user_request("Find the price of the item");
    request.metadata = Some(json!({"url": "https://shop.example"}));

    let outcome = dispatcher.dispatch(request).await.unwrap();
    let response = match outcome {
        DispatchOutcome::Complete(response, _) => response,
        _ => panic!("Expected an assembled response"),
    };
    assert!(response.text().contains("price"));

    let body = transport.last_body();
    assert_eq!(body["url"], "https://shop.example");
    assert_eq!(body["goal"], "Find the price of the item");
}

#[tokio::test]
async fn test_automation_failure_status_is_provider_error() {
    let sse = b"event: COMPLETE\ndata: {\"status\":\"FAILED\"}\n\n";
    let transport = Arc::new(MockTransport::with_stream(sse));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Tinyfish),
        Arc::clone(&transport),
        None,
    );

    let error = dispatcher
        .dispatch(user_request("Do the thing"))
        .await
        .unwrap_err();
    assert!(matches!(error, GatewayError::ServerError { .. }));
}

#[tokio::test]
async fn test_memory_extracted_after_response() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        MemoryStore::connect(
            &dir.path().join("sessions.db"),
            switchboard_common::config::MemoryConfig::default(),
        )
        .await
        .unwrap(),
    );

    let transport = Arc::new(MockTransport::new(Box::new(|_, _| {
        openai_ok("Let's use TypeScript for the API layer.")
    })));
    let dispatcher = dispatcher_with(
        base_config(ProviderId::Openai),
        Arc::clone(&transport),
        Some(Arc::clone(&store)),
    );

    let mut request = user_request("What language should the API use?");
    request.metadata = Some(json!({"session_id": "sess-7"}));
    dispatcher.dispatch(request).await.unwrap();

    let hits = store
        .search(
            "API layer",
            &MemoryFilter {
                session_id: Some("sess-7".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert!(hits[0].content.contains("TypeScript"));
}
