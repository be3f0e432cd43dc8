//! Per-instance circuit breaker transitions
//!
//! Every [`ServiceInstance`] embeds its own breaker state; the methods
//! here are the only writers of `circuit_state`, `failure_count`,
//! `is_healthy`, and `weight`. Probe outcomes and caller-reported
//! business outcomes feed the same two hooks.
//!
//! The breaker is asymmetric: health probing ignores circuit state, so
//! Open instances keep being probed and can recover, while request
//! selection excludes them. Recovery promotion (Open to HalfOpen after
//! the recovery timeout) is driven by the health cycle, not by these
//! hooks.

use crate::config::DiscoveryConfig;
use crate::types::{CircuitState, ServiceInstance};
use std::time::SystemTime;
use tracing::{debug, info, warn};

impl ServiceInstance {
    /// Records a successful probe or business call
    ///
    /// Marks the instance healthy, clears the failure streak, stores the
    /// observed latency, and closes the circuit if it was Open or on
    /// probation. Weight grows multiplicatively when the latency beat
    /// the fast-response threshold, capped at `config.max_weight`.
    pub fn record_success(&mut self, latency_ms: u64, config: &DiscoveryConfig) {
        self.is_healthy = true;
        self.failure_count = 0;
        self.response_time_ms = latency_ms;
        self.last_health_check_at = SystemTime::now();

        match self.circuit_state {
            CircuitState::HalfOpen => {
                self.circuit_state = CircuitState::Closed;
                info!(instance_id = %self.id, "Circuit closed for recovered instance");
            }
            CircuitState::Open => {
                // Open instances are still probed; a success short-circuits
                // the probation step.
                self.circuit_state = CircuitState::Closed;
                info!(instance_id = %self.id, "Circuit closed directly from open state");
            }
            CircuitState::Closed => {}
        }

        if latency_ms < config.fast_response_threshold.as_millis() as u64 {
            self.weight = (self.weight * config.weight_growth).min(config.max_weight);
        }

        debug!(
            instance_id = %self.id,
            latency_ms,
            weight = self.weight,
            "Recorded success"
        );
    }

    /// Records a failed probe or business call
    ///
    /// Marks the instance unhealthy, extends the failure streak, stamps
    /// the failure time, and decays the weight. Crossing the configured
    /// threshold opens the circuit; an already-Open circuit stays Open
    /// until the health cycle promotes it to probation.
    pub fn record_failure(&mut self, config: &DiscoveryConfig) {
        self.is_healthy = false;
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure_at = Some(SystemTime::now());
        self.last_health_check_at = SystemTime::now();
        self.weight *= config.weight_decay;

        if self.failure_count >= config.failure_threshold {
            match self.circuit_state {
                CircuitState::Closed => {
                    self.circuit_state = CircuitState::Open;
                    warn!(
                        instance_id = %self.id,
                        failure_count = self.failure_count,
                        "Circuit opened for unhealthy instance"
                    );
                }
                CircuitState::HalfOpen => {
                    self.circuit_state = CircuitState::Open;
                    warn!(instance_id = %self.id, "Probation failed, circuit reopened");
                }
                CircuitState::Open => {}
            }
        }

        debug!(
            instance_id = %self.id,
            failure_count = self.failure_count,
            weight = self.weight,
            "Recorded failure"
        );
    }

    /// Returns whether an Open circuit has served its recovery timeout
    ///
    /// Always `false` for non-Open circuits. An Open circuit with no
    /// recorded failure time is considered overdue.
    pub fn recovery_due(&self, config: &DiscoveryConfig) -> bool {
        if self.circuit_state != CircuitState::Open {
            return false;
        }
        match self.last_failure_at {
            Some(failed_at) => SystemTime::now()
                .duration_since(failed_at)
                .map(|elapsed| elapsed > config.recovery_timeout)
                .unwrap_or(false),
            None => true,
        }
    }

    /// Moves an Open circuit to probation
    ///
    /// The failure streak is kept: one more failure while on probation
    /// reopens the circuit immediately, one success closes it.
    pub fn begin_probation(&mut self) {
        if self.circuit_state == CircuitState::Open {
            self.circuit_state = CircuitState::HalfOpen;
            info!(instance_id = %self.id, "Circuit half-open, instance on probation");
        }
    }
}
