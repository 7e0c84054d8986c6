//! Resolution metrics and tracing spans.
//!
//! Instruments are created from the global meter provider; the library never
//! installs an exporter. Hosts that want metrics install a provider before the
//! first resolve.

#[cfg(feature = "metrics")]
pub use self::otel::{ResolveMetrics, METRICS};

#[cfg(feature = "metrics")]
mod otel {
    use once_cell::sync::Lazy;
    use opentelemetry::{
        global,
        metrics::{Counter, Histogram},
        KeyValue,
    };
    use std::time::Duration;

    pub static METRICS: Lazy<ResolveMetrics> = Lazy::new(ResolveMetrics::init);

    pub struct ResolveMetrics {
        pub store_calls_total: Counter<u64>,
        pub resolve_duration: Histogram<f64>,
        pub resolve_failures_total: Counter<u64>,
        pub levels_total: Counter<u64>,
    }

    impl ResolveMetrics {
        pub fn init() -> Self {
            let meter = global::meter("lifeline");

            let store_calls_total = meter
                .u64_counter("lifeline_store_calls_total")
                .with_description("Data store calls issued by the resolver")
                .build();

            let resolve_duration = meter
                .f64_histogram("lifeline_resolve_duration_seconds")
                .with_description("Duration of a full resolve, primary lookup to populated set")
                .build();

            let resolve_failures_total = meter
                .u64_counter("lifeline_resolve_failures_total")
                .with_description("Resolves aborted by a store, directive or hydration failure")
                .build();

            let levels_total = meter
                .u64_counter("lifeline_levels_total")
                .with_description("Include levels walked")
                .build();

            Self {
                store_calls_total,
                resolve_duration,
                resolve_failures_total,
                levels_total,
            }
        }

        pub fn record_store_call(&self, kind: &'static str) {
            self.store_calls_total.add(1, &[KeyValue::new("kind", kind)]);
        }

        pub fn record_resolve(&self, elapsed: Duration) {
            self.resolve_duration.record(elapsed.as_secs_f64(), &[]);
        }

        pub fn record_failure(&self, reason: &'static str) {
            self.resolve_failures_total.add(1, &[KeyValue::new("reason", reason)]);
        }

        pub fn record_level(&self) {
            self.levels_total.add(1, &[]);
        }
    }
}

/// Span constructors used around resolver stages
#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    pub fn resolve_span(resource_type: &str) -> Span {
        info_span!("lifeline.resolve", resource_type = %resource_type)
    }

    pub fn level_span(depth: usize, lookups: usize) -> Span {
        info_span!("lifeline.level", depth, lookups)
    }

    pub fn related_lookup_span(owner_type: &str, relation: &str, owners: usize) -> Span {
        info_span!("lifeline.find_related", owner_type = %owner_type, relation = %relation, owners)
    }

    pub fn hydrate_span(resource_type: &str, keys: usize) -> Span {
        info_span!("lifeline.hydrate", resource_type = %resource_type, keys)
    }
}
