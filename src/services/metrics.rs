use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::time::Duration;

/// Prometheus collectors for the service, each instance owns its registry.
pub struct MetricsService {
    registry: Registry,
    numbers_consumed: IntCounterVec,
    consume_failures: IntCounterVec,
    users_created: IntCounter,
    http_requests: IntCounterVec,
    request_duration: HistogramVec,
}

impl MetricsService {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let numbers_consumed = IntCounterVec::new(
            Opts::new("phone_numbers_consumed_total", "Phone numbers handed out"),
            &["policy"],
        )?;
        let consume_failures = IntCounterVec::new(
            Opts::new(
                "phone_number_consume_failures_total",
                "Rejected or failed consumption requests",
            ),
            &["kind"],
        )?;
        let users_created = IntCounter::new("users_created_total", "Users created by admins")?;
        let http_requests = IntCounterVec::new(
            Opts::new("http_requests_total", "HTTP requests by status class"),
            &["class"],
        )?;
        let request_duration = HistogramVec::new(
            HistogramOpts::new("request_duration_seconds", "HTTP request latency"),
            &["endpoint"],
        )?;

        registry.register(Box::new(numbers_consumed.clone()))?;
        registry.register(Box::new(consume_failures.clone()))?;
        registry.register(Box::new(users_created.clone()))?;
        registry.register(Box::new(http_requests.clone()))?;
        registry.register(Box::new(request_duration.clone()))?;

        Ok(Self {
            registry,
            numbers_consumed,
            consume_failures,
            users_created,
            http_requests,
            request_duration,
        })
    }

    pub fn record_consumed(&self, policy: &str, count: u64) {
        self.numbers_consumed.with_label_values(&[policy]).inc_by(count);
    }

    pub fn record_consume_failure(&self, kind: &str) {
        self.consume_failures.with_label_values(&[kind]).inc();
    }

    pub fn record_user_created(&self) {
        self.users_created.inc();
    }

    pub fn record_request(&self, endpoint: &str, status: u16, duration: Duration) {
        let class = match status {
            500..=599 => "5xx",
            400..=499 => "4xx",
            300..=399 => "3xx",
            _ => "2xx",
        };
        self.http_requests.with_label_values(&[class]).inc();
        self.request_duration
            .with_label_values(&[endpoint])
            .observe(duration.as_secs_f64());
    }

    pub fn render(&self) -> anyhow::Result<(String, String)> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        Ok((encoder.format_type().to_string(), String::from_utf8(buffer)?))
    }
}
