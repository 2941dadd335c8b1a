//! Circuit breaker guarding the remote embedding and LLM endpoints.

use parking_lot::Mutex;
use std::time::{Duration, Instant};

use crate::error::Error;

/// Circuit breaker configuration
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before the circuit opens
    pub failure_threshold: u32,
    /// Consecutive successes in half-open before the circuit closes
    pub success_threshold: u32,
    /// How long an open circuit waits before probing
    pub open_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
enum State {
    Closed { consecutive_failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { consecutive_successes: u32 },
}

/// Failure-counting breaker: closed → open after repeated failures,
/// open → half-open after a timeout, half-open → closed after enough
/// successes (or straight back to open on any failure).
pub struct CircuitBreaker {
    state: Mutex<State>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            state: Mutex::new(State::Closed {
                consecutive_failures: 0,
            }),
            config,
        }
    }

    /// Check whether a request may proceed
    pub fn allow_request(&self) -> Result<(), Error> {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } | State::HalfOpen { .. } => Ok(()),
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.config.open_timeout {
                    tracing::info!("circuit breaker transitioning to half-open");
                    *state = State::HalfOpen {
                        consecutive_successes: 0,
                    };
                    Ok(())
                } else {
                    Err(Error::CircuitBreakerOpen)
                }
            }
        }
    }

    /// Record a successful call
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed { .. } => {
                *state = State::Closed {
                    consecutive_failures: 0,
                };
            }
            State::HalfOpen {
                consecutive_successes,
            } => {
                let successes = consecutive_successes + 1;
                if successes >= self.config.success_threshold {
                    tracing::info!("circuit breaker closing after successful probes");
                    *state = State::Closed {
                        consecutive_failures: 0,
                    };
                } else {
                    *state = State::HalfOpen {
                        consecutive_successes: successes,
                    };
                }
            }
            State::Open { .. } => {}
        }
    }

    /// Record a failed call
    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        match *state {
            State::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.config.failure_threshold {
                    tracing::warn!(failures, "circuit breaker opening");
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                } else {
                    *state = State::Closed {
                        consecutive_failures: failures,
                    };
                }
            }
            State::HalfOpen { .. } => {
                tracing::warn!("circuit breaker reopening, probe failed");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }

    /// Whether the circuit currently rejects requests
    pub fn is_open(&self) -> bool {
        matches!(*self.state.lock(), State::Open { opened_at } if opened_at.elapsed() < self.config.open_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker(failure_threshold: u32, open_timeout: Duration) -> CircuitBreaker {
        CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold,
            success_threshold: 1,
            open_timeout,
        })
    }

    #[test]
    fn opens_after_threshold() {
        let cb = breaker(2, Duration::from_secs(60));
        assert!(cb.allow_request().is_ok());
        cb.record_failure();
        assert!(cb.allow_request().is_ok());
        cb.record_failure();
        assert!(cb.allow_request().is_err());
        assert!(cb.is_open());
    }

    #[test]
    fn probes_after_timeout_and_closes_on_success() {
        let cb = breaker(1, Duration::from_millis(0));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(5));

        assert!(cb.allow_request().is_ok());
        cb.record_success();
        assert!(cb.allow_request().is_ok());
        assert!(!cb.is_open());
    }

    #[test]
    fn reopens_when_probe_fails() {
        let cb = breaker(1, Duration::from_millis(0));
        cb.record_failure();
        std::thread::sleep(Duration::from_millis(5));
        assert!(cb.allow_request().is_ok());

        cb.record_failure();
        let cb_blocked = CircuitBreaker::new(CircuitBreakerConfig {
            failure_threshold: 1,
            success_threshold: 1,
            open_timeout: Duration::from_secs(60),
        });
        cb_blocked.record_failure();
        assert!(cb_blocked.allow_request().is_err());
    }

    #[test]
    fn success_resets_failure_count() {
        let cb = breaker(2, Duration::from_secs(60));
        cb.record_failure();
        cb.record_success();
        cb.record_failure();
        assert!(cb.allow_request().is_ok());
    }
}
