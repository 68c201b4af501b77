//! Orchestrator configuration: the watchdog idle window and egress queue
//! capacity knobs named in the external interfaces design.

use crate::error::{Error, Result};
use std::time::Duration;

/// Validated idle-window duration for the streaming keepalive watchdog.
///
/// Defaults to 30 seconds, matching the "O(30s)" default named in the
/// configuration contract. Zero-length windows are rejected: a watchdog
/// that never fires is not a watchdog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleWindow(Duration);

impl IdleWindow {
    pub fn new(duration: Duration) -> Result<Self> {
        if duration.is_zero() {
            return Err(Error::config("idle window must be greater than zero"));
        }
        Ok(Self(duration))
    }

    pub fn value(&self) -> Duration {
        self.0
    }
}

impl Default for IdleWindow {
    fn default() -> Self {
        Self(Duration::from_secs(30))
    }
}

/// Validated bounded-channel capacity for the ingress/egress queues.
///
/// Defaults to 100 chunks, matching the "O(100)" default. Zero capacity
/// would make every send block forever on an empty channel, so it is
/// rejected at construction rather than deadlocking a transaction later.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCapacity(usize);

impl QueueCapacity {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("queue capacity must be greater than zero"));
        }
        Ok(Self(capacity))
    }

    pub fn value(&self) -> usize {
        self.0
    }
}

impl Default for QueueCapacity {
    fn default() -> Self {
        Self(100)
    }
}

/// Configuration the orchestrator receives at construction, alongside the
/// policy instance, backend client, transaction-context factory, and
/// recorder factory (those are supplied as constructor arguments, not
/// config, since they are behavior, not knobs).
#[derive(Debug, Clone, Copy)]
pub struct OrchestratorConfig {
    idle_window: IdleWindow,
    queue_capacity: QueueCapacity,
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    pub fn idle_window(&self) -> Duration {
        self.idle_window.value()
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.value()
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            idle_window: IdleWindow::default(),
            queue_capacity: QueueCapacity::default(),
        }
    }
}

/// Builder for [`OrchestratorConfig`]. Follows the same pattern as the
/// request-side option builders: every setter validates eagerly and
/// returns `Result<Self>` so a misconfigured knob fails at the call site,
/// not deep inside the orchestrator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrchestratorConfigBuilder {
    idle_window: Option<IdleWindow>,
    queue_capacity: Option<QueueCapacity>,
}

impl OrchestratorConfigBuilder {
    pub fn idle_window(mut self, duration: Duration) -> Result<Self> {
        self.idle_window = Some(IdleWindow::new(duration)?);
        Ok(self)
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Result<Self> {
        self.queue_capacity = Some(QueueCapacity::new(capacity)?);
        Ok(self)
    }

    pub fn build(self) -> OrchestratorConfig {
        OrchestratorConfig {
            idle_window: self.idle_window.unwrap_or_default(),
            queue_capacity: self.queue_capacity.unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_named_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.idle_window(), Duration::from_secs(30));
        assert_eq!(config.queue_capacity(), 100);
    }

    #[test]
    fn test_zero_idle_window_rejected() {
        assert!(IdleWindow::new(Duration::ZERO).is_err());
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        assert!(QueueCapacity::new(0).is_err());
    }

    #[test]
    fn test_builder_overrides_defaults() {
        let config = OrchestratorConfig::builder()
            .idle_window(Duration::from_secs(5))
            .unwrap()
            .queue_capacity(16)
            .unwrap()
            .build();
        assert_eq!(config.idle_window(), Duration::from_secs(5));
        assert_eq!(config.queue_capacity(), 16);
    }

    #[test]
    fn test_builder_invalid_capacity_propagates_error() {
        let result = OrchestratorConfig::builder().queue_capacity(0);
        assert!(result.is_err());
    }
}
