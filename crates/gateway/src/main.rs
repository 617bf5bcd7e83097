use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde_json::{json, Value};

use switchboard_common::config::GatewayConfig;
use switchboard_common::GatewayError;
use switchboard_gateway::analyzer::ComplexityAnalyzer;
use switchboard_gateway::breaker::BreakerRegistry;
use switchboard_gateway::config;
use switchboard_gateway::decisions::DecisionLog;
use switchboard_gateway::dispatch::{DispatchOutcome, Dispatcher, HttpTransport};
use switchboard_gateway::embeddings::EmbeddingClient;
use switchboard_gateway::memory::MemoryStore;
use switchboard_gateway::pool::HttpPools;
use switchboard_gateway::router::Router as ProviderRouter;
use switchboard_gateway::tools;
use switchboard_gateway::translate::responses;

const EXIT_CONFIG: u8 = 64;
const EXIT_RUNTIME: u8 = 70;

/// Shared application state accessible from axum handlers.
struct AppState {
    config: Arc<GatewayConfig>,
    dispatcher: Arc<Dispatcher>,
    memory: Option<Arc<MemoryStore>>,
    decisions: Arc<DecisionLog>,
    metrics_handle: PrometheusHandle,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("start") => {}
        other => {
            eprintln!("usage: switchboard start");
            if let Some(unknown) = other {
                eprintln!("unknown subcommand: {}", unknown);
            }
            return ExitCode::from(EXIT_CONFIG);
        }
    }

    tracing::info!("Switchboard gateway starting");

    // Load configuration — fail loudly on misconfiguration.
    let gateway_config = match config::load_config() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration — refusing to start");
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    // Install Prometheus metrics recorder.
    let metrics_handle = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            tracing::error!(error = %e, "Failed to install metrics recorder");
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    // Connection pools.
    let pools = match HttpPools::new(&gateway_config.pool) {
        Ok(pools) => Arc::new(pools),
        Err(e) => {
            tracing::error!(error = %e, "Failed to build HTTP clients");
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    // Memory store — degraded operation without it, never a startup failure.
    let memory = if gateway_config.memory.enabled {
        let db_path = PathBuf::from(&gateway_config.server.data_dir).join("sessions.db");
        match MemoryStore::connect(&db_path, gateway_config.memory.clone()).await {
            Ok(store) => {
                let store = Arc::new(store);
                let _maintenance = MemoryStore::spawn_maintenance(Arc::clone(&store));
                Some(store)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Memory store unavailable — continuing without memory");
                None
            }
        }
    } else {
        None
    };

    // Optional embedding client for the analyzer's similarity adjustment.
    let embedding_client = gateway_config
        .embeddings
        .clone()
        .and_then(EmbeddingClient::new)
        .map(Arc::new);

    let breakers = Arc::new(BreakerRegistry::new(gateway_config.breaker.clone()));
    let decisions = Arc::new(DecisionLog::new(256));
    let analyzer = ComplexityAnalyzer::new(gateway_config.routing.mode, embedding_client);
    let provider_router = ProviderRouter::new(&gateway_config);
    let transport = Arc::new(HttpTransport::new(Arc::clone(&pools)));

    let dispatcher = Arc::new(Dispatcher::new(
        Arc::clone(&gateway_config),
        Arc::clone(&breakers),
        provider_router,
        analyzer,
        memory.clone(),
        Arc::clone(&decisions),
        transport,
        pools.sse_wall_clock,
    ));

    // Periodic breaker state gauges.
    {
        let breakers = Arc::clone(&breakers);
        tokio::spawn(async move {
            let interval = std::time::Duration::from_secs(30);
            loop {
                tokio::time::sleep(interval).await;
                breakers.report_metrics();
            }
        });
    }

    let state = Arc::new(AppState {
        config: Arc::clone(&gateway_config),
        dispatcher,
        memory,
        decisions,
        metrics_handle,
    });

    let app = Router::new()
        .route("/messages", post(messages_handler))
        .route("/responses", post(responses_handler))
        .route("/health/live", get(health_live_handler))
        .route("/health/ready", get(health_ready_handler))
        .route("/metrics", get(metrics_handler))
        .route("/internal/decisions", get(decisions_handler))
        .with_state(state);

    let port = gateway_config.server.port;
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(error = %e, port, "Failed to bind TCP listener");
            return ExitCode::from(EXIT_RUNTIME);
        }
    };

    tracing::info!(port, provider = %gateway_config.provider, "Switchboard listening");

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "HTTP server error");
        return ExitCode::from(EXIT_RUNTIME);
    }

    ExitCode::SUCCESS
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /messages — canonical-shape requests.
async fn messages_handler(
    State(state): State<Arc<AppState>>,
    Json(mut body): Json<Value>,
) -> Response {
    // Tool declarations may arrive pre-converted to the OpenAI shape.
    if let Some(tools) = body.get_mut("tools") {
        tools::normalize_tool_declarations(tools);
    }

    let request = match serde_json::from_value(body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(&GatewayError::InvalidRequest(format!(
                "malformed request body: {}",
                e
            )))
        }
    };

    run_dispatch(&state, request).await
}

/// POST /responses — the alternate input shape, mapped through the shim.
async fn responses_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Response {
    let request = match responses::responses_to_canonical(&body) {
        Ok(request) => request,
        Err(e) => return error_response(&e),
    };

    run_dispatch(&state, request).await
}

async fn run_dispatch(
    state: &Arc<AppState>,
    request: switchboard_common::types::CanonicalRequest,
) -> Response {
    match state.dispatcher.dispatch(request).await {
        Ok(DispatchOutcome::Complete(response, decision)) => {
            let mut body = match serde_json::to_value(&*response) {
                Ok(body) => body,
                Err(e) => return error_response(&GatewayError::Serialization(e)),
            };
            if let Ok(decision) = serde_json::to_value(&decision) {
                body["switchboard_routing"] = decision;
            }
            (StatusCode::OK, Json(body)).into_response()
        }
        Ok(DispatchOutcome::Stream(handle, _decision)) => Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, handle.content_type)
            .body(Body::from_stream(handle.stream))
            .unwrap_or_else(|_| StatusCode::INTERNAL_SERVER_ERROR.into_response()),
        Err(e) => error_response(&e),
    }
}

fn error_response(error: &GatewayError) -> Response {
    let status =
        StatusCode::from_u16(error.http_status()).unwrap_or(StatusCode::BAD_GATEWAY);
    let body = json!({
        "error": {
            "kind": error.kind(),
            "message": error.to_string(),
        }
    });
    (status, Json(body)).into_response()
}

/// GET /health/live — process is up.
async fn health_live_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "provider": state.config.provider.as_str(),
        "checks": {},
    }))
}

/// GET /health/ready — dependencies are reachable.
async fn health_ready_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let memory_ok = match &state.memory {
        Some(store) => store.health_check().await.is_ok(),
        None => true,
    };
    let provider_ok = state
        .config
        .providers
        .get(&state.config.provider)
        .map(|d| !d.endpoint.is_empty())
        .unwrap_or(false);

    let ready = memory_ok && provider_ok;
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let body = json!({
        "status": if ready { "ready" } else { "unavailable" },
        "provider": state.config.provider.as_str(),
        "checks": {
            "memory": if memory_ok { "ok" } else { "failed" },
            "provider_config": if provider_ok { "ok" } else { "failed" },
        }
    });

    (status, Json(body))
}

/// GET /metrics — Prometheus render.
async fn metrics_handler(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}

/// GET /internal/decisions — recent routing decisions, newest first.
async fn decisions_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.decisions.snapshot())
}
