/*!
 * Structured Tracing
 * Subscriber setup and spans for blocking condition variable operations
 *
 * Features:
 * - Env-filtered output (RUST_LOG, default: info)
 * - Optional JSON output for log shipping
 * - Duration recorded on every blocking operation span
 */

use std::time::Instant;
use tracing::{debug, span, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - WAKE_COND_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var("WAKE_COND_TRACE_JSON")
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        debug!(json = use_json, "structured tracing initialized");
    }
    installed
}

/// Span covering one blocking operation (a context-aware wait or signal)
pub struct BlockingSpan {
    span: tracing::Span,
    start: Instant,
    operation: &'static str,
}

impl BlockingSpan {
    pub fn new(operation: &'static str, requested: usize) -> Self {
        let span = span!(
            Level::TRACE,
            "cond_blocking",
            operation = operation,
            requested = requested,
            duration_us = tracing::field::Empty,
            woken = tracing::field::Empty,
            result = tracing::field::Empty,
        );

        Self {
            span,
            start: Instant::now(),
            operation,
        }
    }

    /// Enter the span for the current thread
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    pub fn record_woken(&self, woken: usize) {
        self.span.record("woken", woken);
    }

    pub fn record_result(&self, result: &'static str) {
        self.span.record("result", result);
    }
}

impl Drop for BlockingSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();
        tracing::trace!(
            operation = self.operation,
            duration_us = duration.as_micros() as u64,
            "blocking operation finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test_tracing() {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("trace"))
            .with(tracing_subscriber::fmt::layer().compact().with_test_writer())
            .try_init();
    }

    #[test]
    fn test_blocking_span_records_fields() {
        init_test_tracing();

        let span = BlockingSpan::new("signal_with_context", 3);
        {
            let _entered = span.enter();
            span.record_woken(2);
            span.record_result("interrupted");
        }
        // Span drops and logs its duration
    }

    #[test]
    fn test_init_tracing_twice_is_harmless() {
        init_test_tracing();
        assert!(!init_tracing());
    }
}
