use std::time::Duration;

use anyhow::Result;
#[cfg(test)]
use mockall::automock;
use opentelemetry::KeyValue;
use opentelemetry::metrics::{Counter, Histogram, MeterProvider as _};
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};

const METER_NAME: &str = "sizing-webhook";

/// Outcome of an admission review, used as metric attribute.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The embedded object was decoded into a typed resource.
    Decoded,
    /// The review could not be decoded and the request was denied.
    Rejected,
    /// The object kind is not handled, the request is allowed unchanged.
    Unsupported,
    /// A patch was attached to the response.
    Mutated,
    /// The request is allowed without patch.
    Unchanged,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Decoded => "decoded",
            Outcome::Rejected => "rejected",
            Outcome::Unsupported => "unsupported",
            Outcome::Mutated => "mutated",
            Outcome::Unchanged => "unchanged",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sink of the admission metrics.
#[cfg_attr(test, automock)]
pub trait MetricsRecorder: Send + Sync {
    fn add_admission_review(&self, outcome: Outcome, kind: &str);

    fn add_mutation_error(&self, mutator: &str, kind: &str);

    fn record_admission_review_latency(&self, outcome: Outcome, kind: &str, latency: Duration);
}

/// OpenTelemetry backed recorder.
pub struct OtelRecorder {
    admission_reviews_total: Counter<u64>,
    mutation_errors_total: Counter<u64>,
    admission_review_latency: Histogram<u64>,
}

impl OtelRecorder {
    pub fn new(meter_provider: &SdkMeterProvider) -> Self {
        let meter = meter_provider.meter(METER_NAME);

        Self {
            admission_reviews_total: meter
                .u64_counter("sizing_webhook_admission_reviews")
                .with_description("Admission reviews handled, by outcome and kind")
                .build(),
            mutation_errors_total: meter
                .u64_counter("sizing_webhook_mutation_errors")
                .with_description("Mutation policies that failed, by mutator and kind")
                .build(),
            admission_review_latency: meter
                .u64_histogram("sizing_webhook_admission_review_latency")
                .with_description("Time spent handling an admission review")
                .with_unit("ms")
                .build(),
        }
    }
}

impl MetricsRecorder for OtelRecorder {
    fn add_admission_review(&self, outcome: Outcome, kind: &str) {
        self.admission_reviews_total.add(
            1,
            &[
                KeyValue::new("outcome", outcome.as_str()),
                KeyValue::new("kind", kind.to_owned()),
            ],
        );
    }

    fn add_mutation_error(&self, mutator: &str, kind: &str) {
        self.mutation_errors_total.add(
            1,
            &[
                KeyValue::new("mutator", mutator.to_owned()),
                KeyValue::new("kind", kind.to_owned()),
            ],
        );
    }

    fn record_admission_review_latency(&self, outcome: Outcome, kind: &str, latency: Duration) {
        self.admission_review_latency.record(
            latency.as_millis().try_into().unwrap_or(u64::MAX),
            &[
                KeyValue::new("outcome", outcome.as_str()),
                KeyValue::new("kind", kind.to_owned()),
            ],
        );
    }
}

/// Create a meter provider whose instruments are collected by a Prometheus
/// registry. The registry is what the metrics endpoint renders.
pub fn setup_metrics() -> Result<(SdkMeterProvider, Registry)> {
    let registry = Registry::new();
    let exporter = opentelemetry_prometheus::exporter()
        .with_registry(registry.clone())
        .build()?;
    let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

    Ok((meter_provider, registry))
}

/// Render the registry in the Prometheus text exposition format.
pub fn render(registry: &Registry) -> Result<(String, String)> {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&registry.gather(), &mut buffer)?;

    Ok((encoder.format_type().to_owned(), String::from_utf8(buffer)?))
}
