use std::time::Duration;

use evm_ingest_observability::{meter, Counter, Histogram, KeyValue};

#[derive(Clone)]
pub struct GatewayMetrics {
    pub response: Counter<u64>,
    pub retry: Counter<u64>,
    pub duration: Histogram<f64>,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        let meter = meter("evm_ingest_gateway");

        Self {
            response: meter
                .u64_counter("gateway.response")
                .with_description("successful gateway responses")
                .build(),
            retry: meter
                .u64_counter("gateway.retry")
                .with_description("gateway requests retried after a transient failure")
                .build(),
            duration: meter
                .f64_histogram("gateway.request.duration")
                .with_description("gateway request duration, including retries")
                .with_unit("s")
                .build(),
        }
    }

    pub fn record_response(&self, url: &str, elapsed: Duration) {
        let attributes = [KeyValue::new("url", url.to_string())];
        self.response.add(1, &attributes);
        self.duration.record(elapsed.as_secs_f64(), &attributes);
    }

    pub fn record_retry(&self, url: &str) {
        self.retry.add(1, &[KeyValue::new("url", url.to_string())]);
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
