//! Observability sinks: a closed set of destinations (stdout, database,
//! pubsub, span) plus the routing table that maps an event-type class to a
//! list of sink names.
//!
//! Grounded on the fire-and-forget fan-out in
//! `aspy::ProxyState::send_event` — `record()` never awaits sink I/O on the
//! critical path, and a sink failure is logged and dropped, never
//! propagated. The routing table itself is explicit injected state (a
//! `SinkRouter` value constructed once and passed to the orchestrator),
//! not a process-wide global.

use crate::event::PolicyEvent;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The closed set of sink kinds a router can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SinkName {
    Stdout,
    Database,
    Pubsub,
    Span,
}

impl SinkName {
    fn as_str(&self) -> &'static str {
        match self {
            SinkName::Stdout => "stdout",
            SinkName::Database => "database",
            SinkName::Pubsub => "pubsub",
            SinkName::Span => "span",
        }
    }
}

/// A destination for observability records. Implementors must not let a
/// failure propagate past `write` as a panic; `write` returning `Err` is
/// caught by the router and logged, never surfaced to the transaction.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn write(&self, event: &PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Structured line-JSON sink, for log shippers (e.g. Loki) tailing stdout.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl Sink for StdoutSink {
    async fn write(&self, event: &PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let line = serde_json::to_string(event)?;
        println!("{line}");
        Ok(())
    }
}

/// Persistent event store. The transport is injected so tests can use an
/// in-memory stand-in without a real database.
pub struct DatabaseSink {
    writer: Arc<dyn Fn(&PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> + Send + Sync>,
}

impl DatabaseSink {
    pub fn new(
        writer: impl Fn(&PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            writer: Arc::new(writer),
        }
    }
}

#[async_trait]
impl Sink for DatabaseSink {
    async fn write(&self, event: &PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (self.writer)(event)
    }
}

/// Live stream to a UI, via a bounded channel. Fire-and-forget: a full or
/// closed channel is treated as sink failure, not a transaction failure.
pub struct PubsubSink {
    sender: mpsc::Sender<PolicyEvent>,
}

impl PubsubSink {
    pub fn new(sender: mpsc::Sender<PolicyEvent>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl Sink for PubsubSink {
    async fn write(&self, event: &PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.sender
            .send(event.clone())
            .await
            .map_err(|e| -> Box<dyn std::error::Error + Send + Sync> { Box::new(e) })
    }
}

/// Attribute/event attached to the current `tracing` span — the
/// Rust-idiomatic reading of "trace span" sink.
#[derive(Debug, Default)]
pub struct SpanSink;

#[async_trait]
impl Sink for SpanSink {
    async fn write(&self, event: &PolicyEvent) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::Span::current().record("event_type", tracing::field::display(&event.event_type));
        tracing::event!(tracing::Level::DEBUG, event_type = %event.event_type, fields = %event.fields);
        Ok(())
    }
}

/// Maps an event-type class (a prefix like `"policy."` or `"transaction."`,
/// or an exact event type) to the sink names that should receive it, plus a
/// default list for unrecognized types.
#[derive(Clone)]
pub struct SinkRouter {
    sinks: HashMap<SinkName, Arc<dyn Sink>>,
    routes: HashMap<String, Vec<SinkName>>,
    default_route: Vec<SinkName>,
}

impl SinkRouter {
    pub fn builder() -> SinkRouterBuilder {
        SinkRouterBuilder::default()
    }

    /// Fan out `event` to every sink its event type routes to. Never
    /// blocks the caller on sink I/O failure; each sink write runs to
    /// completion but a failure is logged and does not stop delivery to
    /// the remaining sinks.
    pub async fn dispatch(&self, event: &PolicyEvent) {
        // Prefer the longest matching prefix so a specific route (e.g.
        // "policy.tool_call_blocked") wins over a broader one ("policy.")
        // registered alongside it, regardless of HashMap iteration order.
        let names = self
            .routes
            .iter()
            .filter(|(prefix, _)| event.event_type.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map(|(_, names)| names.as_slice())
            .unwrap_or(&self.default_route);

        for name in names {
            let Some(sink) = self.sinks.get(name) else {
                continue;
            };
            if let Err(err) = sink.write(event).await {
                tracing::warn!(
                    sink = name.as_str(),
                    event_type = %event.event_type,
                    error = %err,
                    "observability sink failed"
                );
            }
        }
    }
}

#[derive(Default)]
pub struct SinkRouterBuilder {
    sinks: HashMap<SinkName, Arc<dyn Sink>>,
    routes: HashMap<String, Vec<SinkName>>,
    default_route: Vec<SinkName>,
}

impl SinkRouterBuilder {
    pub fn sink(mut self, name: SinkName, sink: Arc<dyn Sink>) -> Self {
        self.sinks.insert(name, sink);
        self
    }

    /// Route every event type starting with `prefix` to `names`, e.g.
    /// `.route("transaction.", vec![SinkName::Database, SinkName::Stdout])`.
    pub fn route(mut self, prefix: impl Into<String>, names: Vec<SinkName>) -> Self {
        self.routes.insert(prefix.into(), names);
        self
    }

    pub fn default_route(mut self, names: Vec<SinkName>) -> Self {
        self.default_route = names;
        self
    }

    pub fn build(self) -> SinkRouter {
        SinkRouter {
            sinks: self.sinks,
            routes: self.routes,
            default_route: self.default_route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingSink(Arc<Mutex<Vec<String>>>);

    #[async_trait]
    impl Sink for RecordingSink {
        async fn write(
            &self,
            event: &PolicyEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            self.0.lock().unwrap().push(event.event_type.clone());
            Ok(())
        }
    }

    struct FailingSink;

    #[async_trait]
    impl Sink for FailingSink {
        async fn write(
            &self,
            _event: &PolicyEvent,
        ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
            Err("disk full".into())
        }
    }

    #[tokio::test]
    async fn test_routes_by_event_type_prefix() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = SinkRouter::builder()
            .sink(SinkName::Database, Arc::new(RecordingSink(log.clone())))
            .route("transaction.", vec![SinkName::Database])
            .build();

        let event = PolicyEvent::new("transaction.request_recorded", json!({}));
        router.dispatch(&event).await;

        assert_eq!(log.lock().unwrap().as_slice(), ["transaction.request_recorded"]);
    }

    #[tokio::test]
    async fn test_unrecognized_type_falls_back_to_default_route() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = SinkRouter::builder()
            .sink(SinkName::Stdout, Arc::new(RecordingSink(log.clone())))
            .default_route(vec![SinkName::Stdout])
            .build();

        let event = PolicyEvent::new("custom.unrouted_type", json!({}));
        router.dispatch(&event).await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_stop_delivery_to_other_sinks() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let router = SinkRouter::builder()
            .sink(SinkName::Database, Arc::new(FailingSink))
            .sink(SinkName::Stdout, Arc::new(RecordingSink(log.clone())))
            .route("policy.", vec![SinkName::Database, SinkName::Stdout])
            .build();

        let event = PolicyEvent::new("policy.content_blocked", json!({}));
        router.dispatch(&event).await;

        assert_eq!(log.lock().unwrap().len(), 1);
    }
}
