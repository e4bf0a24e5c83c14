//! Process-wide engine handle
//!
//! The engine is built at most once per process. Construction is serialized
//! behind an async mutex so concurrent first requests wait for the same
//! attempt instead of racing. Failed attempts are retried after an
//! exponential backoff, up to a fixed number of attempts; after that the
//! slot stays degraded until restart.
//!
//! The outcome of the last failed attempt is mirrored into a snapshot that
//! `/health` reads without touching the construction lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tokio::sync::{Mutex, OnceCell};

use super::provider::{EngineFactory, OcrEngine};
use super::types::EngineError;

/// When and how often a failed construction is retried
#[derive(Debug, Clone, Copy)]
pub struct InitPolicy {
    pub max_attempts: u32,
    /// Wait after the first failure; doubles after each further failure
    pub backoff: Duration,
}

impl Default for InitPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Longest wait between two construction attempts
const MAX_BACKOFF: Duration = Duration::from_secs(24 * 60 * 60);

impl InitPolicy {
    fn delay_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(16);
        self.backoff.saturating_mul(1u32 << doublings).min(MAX_BACKOFF)
    }
}

#[derive(Debug)]
enum InitState {
    Untried,
    Backoff {
        attempts: u32,
        last_error: String,
        retry_at: Instant,
    },
    Degraded {
        attempts: u32,
        last_error: String,
    },
}

/// Last failed construction, as reported by [`EngineSlot::status`]
#[derive(Debug, Clone)]
struct Failure {
    attempts: u32,
    last_error: String,
    degraded: bool,
}

/// Engine readiness as seen by `/health`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineStatus {
    /// Nothing has asked for the engine yet
    NotLoaded,
    /// A construction attempt is in flight
    Initializing,
    Ready,
    /// Construction failed; another attempt is allowed later
    Retrying { attempts: u32, last_error: String },
    /// Construction failed too often; restart required
    Degraded { attempts: u32, last_error: String },
}

impl EngineStatus {
    /// Whether `/health` should report the service as usable
    pub fn is_healthy(&self) -> bool {
        matches!(self, Self::NotLoaded | Self::Initializing | Self::Ready)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::NotLoaded => "not_loaded",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Retrying { .. } => "retrying",
            Self::Degraded { .. } => "degraded",
        }
    }
}

/// Lazily built, shared OCR engine
pub struct EngineSlot {
    factory: Arc<dyn EngineFactory>,
    policy: InitPolicy,
    engine: OnceCell<Arc<dyn OcrEngine>>,
    state: Mutex<InitState>,
    failure: RwLock<Option<Failure>>,
}

impl EngineSlot {
    pub fn new(factory: Arc<dyn EngineFactory>, policy: InitPolicy) -> Self {
        Self {
            factory,
            policy: InitPolicy {
                max_attempts: policy.max_attempts.max(1),
                ..policy
            },
            engine: OnceCell::new(),
            state: Mutex::new(InitState::Untried),
            failure: RwLock::new(None),
        }
    }

    /// Get the engine, building it if this is the first use.
    ///
    /// Returns [`EngineError::Unavailable`] while in backoff, once degraded,
    /// or when this call's construction attempt fails.
    pub async fn get(&self) -> Result<Arc<dyn OcrEngine>, EngineError> {
        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        let mut state = self.state.lock().await;

        // Another caller may have finished construction while we waited
        if let Some(engine) = self.engine.get() {
            return Ok(Arc::clone(engine));
        }

        let previous_attempts = match &*state {
            InitState::Untried => 0,
            InitState::Degraded { last_error, .. } => {
                return Err(EngineError::Unavailable(last_error.clone()));
            }
            InitState::Backoff {
                attempts,
                last_error,
                retry_at,
            } => {
                let now = Instant::now();
                if now < *retry_at {
                    return Err(EngineError::Unavailable(format!(
                        "{} (next attempt in {}ms)",
                        last_error,
                        retry_at.duration_since(now).as_millis()
                    )));
                }
                *attempts
            }
        };

        let attempt = previous_attempts + 1;
        tracing::info!(
            engine = self.factory.name(),
            attempt,
            max_attempts = self.policy.max_attempts,
            "Initializing OCR engine"
        );

        match self.factory.build().await {
            Ok(engine) => {
                tracing::info!(engine = engine.name(), "OCR engine initialized successfully");
                // Only reachable once: every builder holds the state lock
                let _ = self.engine.set(Arc::clone(&engine));
                *state = InitState::Untried;
                *self.failure.write() = None;
                Ok(engine)
            }
            Err(e) => {
                let last_error = e.to_string();
                let delay = self.policy.delay_after(attempt);
                // No retry once attempts run out or the deadline is unrepresentable
                let retry_at = Some(attempt)
                    .filter(|attempt| *attempt < self.policy.max_attempts)
                    .and_then(|_| Instant::now().checked_add(delay));

                let degraded = match retry_at {
                    None => {
                        tracing::error!(
                            attempt,
                            "Failed to initialize OCR engine, giving up until restart: {}",
                            last_error
                        );
                        *state = InitState::Degraded {
                            attempts: attempt,
                            last_error: last_error.clone(),
                        };
                        true
                    }
                    Some(retry_at) => {
                        tracing::error!(
                            attempt,
                            retry_in_ms = delay.as_millis() as u64,
                            "Failed to initialize OCR engine: {}",
                            last_error
                        );
                        *state = InitState::Backoff {
                            attempts: attempt,
                            last_error: last_error.clone(),
                            retry_at,
                        };
                        false
                    }
                };

                *self.failure.write() = Some(Failure {
                    attempts: attempt,
                    last_error: last_error.clone(),
                    degraded,
                });
                Err(EngineError::Unavailable(last_error))
            }
        }
    }

    /// Current readiness. Never waits on an in-flight construction.
    ///
    /// A recorded failure wins over lock contention: while a retry is in
    /// flight the slot still reports the previous failure.
    pub fn status(&self) -> EngineStatus {
        if self.engine.initialized() {
            return EngineStatus::Ready;
        }

        if let Some(failure) = self.failure.read().clone() {
            return if failure.degraded {
                EngineStatus::Degraded {
                    attempts: failure.attempts,
                    last_error: failure.last_error,
                }
            } else {
                EngineStatus::Retrying {
                    attempts: failure.attempts,
                    last_error: failure.last_error,
                }
            };
        }

        match self.state.try_lock() {
            Ok(_) => EngineStatus::NotLoaded,
            Err(_) => EngineStatus::Initializing,
        }
    }
}
