//! Per-call identity, scratchpad, and the `record()` entry point.
//!
//! Grounded on `aspy::ProxyState::send_event`'s non-blocking fan-out
//! pattern: `record()` builds the enriched event and hands it to the
//! `SinkRouter`, never awaiting sink I/O in a way that can back-pressure
//! the request path beyond the router's own per-sink write.

use crate::event::PolicyEvent;
use crate::sinks::SinkRouter;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Per-transaction mutable mapping for policy-private state.
///
/// Resolves the "per-call scratchpad" open question as a generic
/// `TypeId`-keyed map with typed accessors (Design Notes §9(d), option b):
/// the orchestrator is written once, generic over the wire `Api`, and is
/// never generic over a specific policy's state type, so it cannot name a
/// policy-specific scratchpad struct at its own boundary. A policy defines
/// whatever type it needs and stores at most one instance of it per
/// transaction.
#[derive(Default)]
pub struct Scratchpad {
    values: HashMap<TypeId, Box<dyn Any + Send>>,
}

impl Scratchpad {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.values
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.values
            .get_mut(&TypeId::of::<T>())
            .and_then(|v| v.downcast_mut::<T>())
    }

    pub fn insert<T: Send + 'static>(&mut self, value: T) {
        self.values.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Get the current value, initializing it with `T::default()` first if
    /// absent.
    pub fn get_or_insert_default<T: Send + Default + 'static>(&mut self) -> &mut T {
        self.values
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Box::new(T::default()))
            .downcast_mut::<T>()
            .expect("TypeId collision is unreachable for distinct types")
    }
}

/// Per-call envelope: identity, parent trace context, scratchpad, and the
/// `record()` sink.
///
/// Created by the orchestrator when a call enters; freed once the policy
/// pipeline and the recorder have both quiesced. Owned exclusively by the
/// orchestrator for the lifetime of a call — hooks and the assembler
/// borrow it, nothing else holds it.
pub struct TransactionContext {
    transaction_id: String,
    trace_id: Option<String>,
    span_id: Option<String>,
    scratchpad: std::sync::Mutex<Scratchpad>,
    router: Arc<SinkRouter>,
}

impl TransactionContext {
    pub fn new(router: Arc<SinkRouter>) -> Self {
        Self {
            transaction_id: Uuid::new_v4().to_string(),
            trace_id: None,
            span_id: None,
            scratchpad: std::sync::Mutex::new(Scratchpad::new()),
            router,
        }
    }

    /// Run `f` against the scratchpad under its internal lock.
    ///
    /// Hooks only ever see a shared `&TransactionContext` (they never run
    /// concurrently within one transaction per the concurrency model, so a
    /// blocking `std::sync::Mutex` is sufficient), so mutation goes through
    /// this accessor rather than a public field.
    pub fn with_scratchpad<R>(&self, f: impl FnOnce(&mut Scratchpad) -> R) -> R {
        let mut guard = self.scratchpad.lock().expect("scratchpad mutex poisoned");
        f(&mut guard)
    }

    /// Attach parent trace/span identifiers (e.g. from an inbound HTTP
    /// request's trace headers).
    pub fn with_trace(mut self, trace_id: impl Into<String>, span_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self.span_id = Some(span_id.into());
        self
    }

    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Enrich `event` with this transaction's identity and fan it out to
    /// the configured sinks.
    ///
    /// Non-blocking from the caller's perspective, per the contract: the
    /// fan-out itself runs on a spawned task rather than being awaited
    /// here, so a slow or backpressured sink (e.g. `PubsubSink` awaiting a
    /// full bounded channel) never stalls the request path that called
    /// `record`. Sink I/O failures are caught inside the router and never
    /// propagate here or to the spawned task's caller.
    pub async fn record(&self, event: PolicyEvent) {
        let enriched = event.enrich(
            &self.transaction_id,
            self.trace_id.as_deref(),
            self.span_id.as_deref(),
        );
        tracing::debug!(
            transaction_id = %self.transaction_id,
            event_type = %enriched.event_type,
            "recording event"
        );
        let router = self.router.clone();
        tokio::spawn(async move {
            router.dispatch(&enriched).await;
        });
    }
}
