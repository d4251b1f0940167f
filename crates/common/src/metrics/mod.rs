//! Metrics and observability utilities
//!
//! Prometheus metrics for the citation graph engine with standardized
//! naming conventions.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};

/// Metrics prefix for all CaseGraph metrics
pub const METRICS_PREFIX: &str = "casegraph";

/// Register all metric descriptions
pub fn register_metrics() {
    describe_counter!(
        format!("{}_extraction_runs_total", METRICS_PREFIX),
        Unit::Count,
        "Total citation extraction runs, labelled by outcome"
    );

    describe_histogram!(
        format!("{}_extraction_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "End-to-end citation extraction latency in seconds"
    );

    describe_counter!(
        format!("{}_extraction_spans_total", METRICS_PREFIX),
        Unit::Count,
        "Citation spans returned by the extractor, labelled by resolution"
    );

    describe_counter!(
        format!("{}_citations_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total citation edges persisted, labelled by creation source"
    );

    describe_counter!(
        format!("{}_documents_deleted_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents removed, including cascade victims"
    );

    tracing::info!("Metrics registered");
}

/// Record the outcome of one extraction run
pub fn record_extraction(duration_secs: f64, resolved: usize, unresolved: usize, success: bool) {
    let outcome = if success { "completed" } else { "failed" };

    counter!(
        format!("{}_extraction_runs_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_extraction_duration_seconds", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .record(duration_secs);

    counter!(
        format!("{}_extraction_spans_total", METRICS_PREFIX),
        "resolution" => "resolved".to_string()
    )
    .increment(resolved as u64);

    counter!(
        format!("{}_extraction_spans_total", METRICS_PREFIX),
        "resolution" => "unresolved".to_string()
    )
    .increment(unresolved as u64);
}

/// Record persisted citation edges
pub fn record_citations_created(count: usize, creation_source: &str) {
    counter!(
        format!("{}_citations_created_total", METRICS_PREFIX),
        "source" => creation_source.to_string()
    )
    .increment(count as u64);
}

/// Record a document deletion (including cascade victims)
pub fn record_documents_deleted(count: usize) {
    counter!(format!("{}_documents_deleted_total", METRICS_PREFIX)).increment(count as u64);
}
