//! Metric names shared by the providers and the retriever.

pub const PROVIDER_REQUESTS: &str = "fit_history_provider_requests_total";
pub const PROVIDER_FAILURES: &str = "fit_history_provider_failures_total";
pub const CONSENT_REQUESTS: &str = "fit_history_consent_requests_total";

pub fn record_request(operation: &'static str) {
    metrics::counter!(PROVIDER_REQUESTS, "operation" => operation).increment(1);
}

pub fn record_failure(operation: &'static str) {
    metrics::counter!(PROVIDER_FAILURES, "operation" => operation).increment(1);
}

pub fn record_consent_request() {
    metrics::counter!(CONSENT_REQUESTS).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_recorder_is_noop() {
        record_request("read_sessions");
        record_failure("read_sessions");
        record_consent_request();
    }
}
