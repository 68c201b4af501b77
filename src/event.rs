//! The observability event shape and the well-known event-type names the
//! recorder and policies emit.

use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

/// Event types the transaction recorder always emits.
pub mod event_types {
    pub const CLIENT_REQUEST: &str = "pipeline.client_request";
    pub const REQUEST_RECORDED: &str = "transaction.request_recorded";
    pub const STREAMING_RESPONSE_RECORDED: &str = "transaction.streaming_response_recorded";
    pub const NON_STREAMING_RESPONSE_RECORDED: &str =
        "transaction.non_streaming_response_recorded";
    pub const POLICY_ERROR: &str = "transaction.policy_error";
    /// A policy's voluntary rejection of a request or response (as opposed
    /// to an unexpected hook failure) — `Error::PolicyViolation`.
    pub const POLICY_VIOLATION: &str = "transaction.policy_violation";
}

/// A structured observability record.
///
/// Created with a dotted `event_type` name and arbitrary `fields`; enriched
/// with `transaction_id`, parent trace/span ids, and a timestamp by
/// [`crate::transaction::TransactionContext::record`] before being routed to
/// sinks. Policies construct these directly via
/// [`PolicyEvent::new`]; the recorder uses the constants above.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PolicyEvent {
    pub event_type: String,
    pub fields: Value,
    pub transaction_id: Option<String>,
    pub trace_id: Option<String>,
    pub span_id: Option<String>,
    pub timestamp_unix_ms: Option<u128>,
}

impl PolicyEvent {
    pub fn new(event_type: impl Into<String>, fields: Value) -> Self {
        Self {
            event_type: event_type.into(),
            fields,
            transaction_id: None,
            trace_id: None,
            span_id: None,
            timestamp_unix_ms: None,
        }
    }

    /// Enrich with transaction/trace identity and a timestamp. Called once,
    /// by the transaction context, immediately before fan-out — never by
    /// the event's original author.
    pub(crate) fn enrich(
        mut self,
        transaction_id: &str,
        trace_id: Option<&str>,
        span_id: Option<&str>,
    ) -> Self {
        self.transaction_id = Some(transaction_id.to_string());
        self.trace_id = trace_id.map(str::to_string);
        self.span_id = span_id.map(str::to_string);
        self.timestamp_unix_ms = Some(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0),
        );
        self
    }
}
