use anyhow::Result;
use once_cell::sync::Lazy;
use prometheus::{
    opts, register_histogram_vec, register_int_counter, register_int_counter_vec, Encoder,
    HistogramVec, IntCounter, IntCounterVec, TextEncoder,
};

pub static PROXIED_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "gateway_proxied_requests_total",
            "Requests forwarded upstream, by service and final status"
        ),
        &["service", "status"]
    )
    .unwrap()
});

pub static UPSTREAM_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    register_histogram_vec!(
        "gateway_upstream_duration_seconds",
        "Histogram of upstream exchange times",
        &["service"]
    )
    .unwrap()
});

pub static UPSTREAM_FAILURES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "gateway_upstream_failures_total",
            "Upstream exchanges that failed at the transport level"
        ),
        &["service"]
    )
    .unwrap()
});

pub static AUTH_REJECTIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        opts!(
            "gateway_auth_rejections_total",
            "Requests rejected by API key authentication"
        ),
        &["code"]
    )
    .unwrap()
});

pub static THROTTLED_REQUESTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "gateway_throttled_requests_total",
        "Requests rejected by the per-key rate limit"
    ))
    .unwrap()
});

pub static UNKNOWN_SERVICE_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    register_int_counter!(opts!(
        "gateway_unknown_service_total",
        "Requests for a missing or inactive service"
    ))
    .unwrap()
});

pub fn gather_metrics() -> Result<String> {
    let mut buffer = vec![];
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    encoder.encode(&metric_families, &mut buffer)?;

    Ok(String::from_utf8(buffer)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_includes_registered_counters() {
        THROTTLED_REQUESTS_TOTAL.inc();
        AUTH_REJECTIONS_TOTAL
            .with_label_values(&["missing_api_key"])
            .inc();

        let text = gather_metrics().unwrap();
        assert!(text.contains("gateway_throttled_requests_total"));
        assert!(text.contains("gateway_auth_rejections_total{code=\"missing_api_key\"}"));
    }
}
