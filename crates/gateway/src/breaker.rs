use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use switchboard_common::config::BreakerConfig;
use switchboard_common::types::provider::ProviderId;
use switchboard_common::GatewayError;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation — all calls pass through.
    Closed,
    /// Breaker tripped — calls are rejected until the window elapses.
    Open,
    /// Window elapsed — probe calls admitted until the success threshold.
    HalfOpen,
}

struct CircuitInner {
    state: CircuitState,
    failure_count: u32,
    /// Consecutive probe successes while half-open.
    success_count: u32,
    open_until: Option<Instant>,
}

/// A per-provider circuit breaker.
///
/// Opens after `failure_threshold` consecutive failures, stays open for the
/// configured window, then admits probes; `success_threshold` consecutive
/// probe successes close it, any probe failure reopens it for a full window.
pub struct CircuitBreaker {
    provider: ProviderId,
    config: BreakerConfig,
    /// Guards all mutable state. std::sync::Mutex because it is never held
    /// across await points.
    inner: Mutex<CircuitInner>,
}

impl CircuitBreaker {
    pub fn new(provider: ProviderId, config: BreakerConfig) -> Self {
        Self {
            provider,
            config,
            inner: Mutex::new(CircuitInner {
                state: CircuitState::Closed,
                failure_count: 0,
                success_count: 0,
                open_until: None,
            }),
        }
    }

    /// Admit or reject a call. Rejection returns the distinguished
    /// `circuit_breaker_open` error without touching the network.
    pub fn check(&self) -> Result<(), GatewayError> {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => {
                let elapsed = inner
                    .open_until
                    .map(|t| Instant::now() >= t)
                    .unwrap_or(true);
                if elapsed {
                    inner.state = CircuitState::HalfOpen;
                    inner.success_count = 0;
                    tracing::info!(
                        provider = %self.provider,
                        "Circuit breaker transitioning to half-open"
                    );
                    Ok(())
                } else {
                    Err(GatewayError::CircuitOpen(self.provider))
                }
            }
            CircuitState::HalfOpen => Ok(()),
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count = 0;

        match inner.state {
            CircuitState::Closed => {}
            CircuitState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    inner.state = CircuitState::Closed;
                    inner.success_count = 0;
                    inner.open_until = None;
                    tracing::info!(
                        provider = %self.provider,
                        "Circuit breaker closing after successful probes"
                    );
                    metrics::counter!(
                        "breaker.recoveries",
                        "provider" => self.provider.as_str()
                    )
                    .increment(1);
                }
            }
            CircuitState::Open => {
                // A success while nominally open means the window raced with
                // an in-flight call; treat it as a probe success.
                inner.state = CircuitState::HalfOpen;
                inner.success_count = 1;
            }
        }
    }

    /// Record a failed call.
    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();

        match inner.state {
            CircuitState::HalfOpen => {
                // Any probe failure reopens for a full window.
                self.trip(&mut inner);
            }
            CircuitState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.trip(&mut inner);
                }
            }
            CircuitState::Open => {
                inner.failure_count += 1;
            }
        }
    }

    fn trip(&self, inner: &mut CircuitInner) {
        inner.state = CircuitState::Open;
        inner.success_count = 0;
        inner.open_until = Some(Instant::now() + Duration::from_secs(self.config.open_secs));
        tracing::warn!(
            provider = %self.provider,
            failures = inner.failure_count,
            threshold = self.config.failure_threshold,
            open_secs = self.config.open_secs,
            "Circuit breaker OPEN"
        );
        metrics::counter!("breaker.trips", "provider" => self.provider.as_str()).increment(1);
    }

    pub fn current_state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }

    pub fn provider(&self) -> ProviderId {
        self.provider
    }

    #[cfg(test)]
    fn force_window_elapsed(&self) {
        self.inner.lock().unwrap().open_until = Some(Instant::now());
    }
}

/// Registry of breakers, one per provider, created lazily on first use.
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<ProviderId, std::sync::Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_provider(&self, provider: ProviderId) -> std::sync::Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(provider)
            .or_insert_with(|| {
                std::sync::Arc::new(CircuitBreaker::new(provider, self.config.clone()))
            })
            .clone()
    }

    /// Emit gauge metrics for all instantiated breakers.
    pub fn report_metrics(&self) {
        let breakers = self.breakers.lock().unwrap();
        for breaker in breakers.values() {
            let state_value = match breaker.current_state() {
                CircuitState::Closed => 0.0,
                CircuitState::HalfOpen => 0.5,
                CircuitState::Open => 1.0,
            };
            metrics::gauge!("breaker.state", "provider" => breaker.provider().as_str())
                .set(state_value);
        }
    }
}
