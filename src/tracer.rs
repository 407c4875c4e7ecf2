//! C7 — Tracer: best-effort span emission around each call.

use crate::logging::log_warn;
use rust_decimal::Decimal;
use std::collections::HashMap;

/// Attributes set on a span for a single call (§4.7).
#[derive(Debug, Clone, Default)]
pub struct SpanAttributes {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub tenant_id: Option<String>,
    pub session_id: Option<String>,
    pub run_id: Option<String>,
    pub step_id: Option<String>,
    pub extra: HashMap<String, String>,
}

/// Final status recorded when a span closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanStatus {
    Ok,
    Error,
    Blocked,
}

/// A tracer never throws; a missing backend degrades to a no-op (§4.7, §9).
pub trait Tracer: Send + Sync {
    fn start_span(&self, attrs: SpanAttributes) -> Box<dyn SpanHandle>;
}

pub trait SpanHandle: Send {
    fn set(&mut self, key: &str, value: String);
    fn close(self: Box<Self>, status: SpanStatus);
}

/// Tracer backed by `tracing`'s span machinery. The crate already depends on
/// `tracing` for logging, so no new dependency is needed for this component.
pub struct TracingSpanTracer;

impl Tracer for TracingSpanTracer {
    fn start_span(&self, attrs: SpanAttributes) -> Box<dyn SpanHandle> {
        let span = tracing::info_span!(
            "llm_call",
            provider = attrs.provider.as_deref().unwrap_or(""),
            model = attrs.model.as_deref().unwrap_or(""),
            tenant_id = attrs.tenant_id.as_deref().unwrap_or(""),
            session_id = attrs.session_id.as_deref().unwrap_or(""),
            run_id = attrs.run_id.as_deref().unwrap_or(""),
            step_id = attrs.step_id.as_deref().unwrap_or(""),
        );
        let _enter = span.enter();
        Box::new(TracingSpanHandle { span: span.clone() })
    }
}

struct TracingSpanHandle {
    span: tracing::Span,
}

impl SpanHandle for TracingSpanHandle {
    fn set(&mut self, key: &str, value: String) {
        let _enter = self.span.enter();
        // tracing spans can't add fields after creation without a fixed schema;
        // record as a debug event scoped to the span instead.
        tracing::debug!(field = key, value = %value, "span attribute");
    }

    fn close(self: Box<Self>, status: SpanStatus) {
        let _enter = self.span.enter();
        match status {
            SpanStatus::Ok => tracing::debug!(status = "ok", "span closed"),
            SpanStatus::Error => tracing::debug!(status = "error", "span closed"),
            SpanStatus::Blocked => tracing::debug!(status = "blocked", "span closed"),
        }
    }
}

/// No-op tracer used when no backend is configured; also the default test double.
pub struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_span(&self, _attrs: SpanAttributes) -> Box<dyn SpanHandle> {
        Box::new(NoopSpanHandle)
    }
}

struct NoopSpanHandle;

impl SpanHandle for NoopSpanHandle {
    fn set(&mut self, _key: &str, _value: String) {}
    fn close(self: Box<Self>, _status: SpanStatus) {}
}

/// Records final token/cost attributes on a span, swallowing any failure.
///
/// Span emission failures never propagate into the call path (§4.7, §9).
pub fn record_call_outcome(
    span: &mut dyn SpanHandle,
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
    cost_usd: Decimal,
    cache_hit: bool,
    retries: u32,
) {
    let attrs: [(&str, String); 6] = [
        ("tokens.prompt", prompt_tokens.to_string()),
        ("tokens.completion", completion_tokens.to_string()),
        ("tokens.total", total_tokens.to_string()),
        ("cost.usd", cost_usd.to_string()),
        ("cache.hit", cache_hit.to_string()),
        ("retries", retries.to_string()),
    ];
    for (key, value) in attrs {
        span.set(key, value);
    }
}

/// Wraps a fallible span operation so a backend failure degrades to a
/// logged warning instead of failing the call.
pub fn best_effort<F: FnOnce() -> Result<(), String>>(op: F) {
    if let Err(e) = op() {
        log_warn!(error = %e, "tracer operation failed, continuing");
    }
}
