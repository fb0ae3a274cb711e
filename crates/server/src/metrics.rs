use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, OnceLock,
    },
};

use sotto_common::room::RoomKind;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EndpointMetricKey {
    endpoint: String,
    method: String,
}

pub struct ServerMetrics {
    request_duration_count: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_duration_sum_ms: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_errors_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    request_rate_total: Mutex<HashMap<EndpointMetricKey, u64>>,
    events_published_total: Mutex<HashMap<String, u64>>,
    events_delivered_total: AtomicU64,
    events_dropped_total: AtomicU64,
    active_subscribers: AtomicU64,
    presence_errors_total: AtomicU64,
}

static GLOBAL_METRICS: OnceLock<Arc<ServerMetrics>> = OnceLock::new();

impl Default for ServerMetrics {
    fn default() -> Self {
        Self {
            request_duration_count: Mutex::new(HashMap::new()),
            request_duration_sum_ms: Mutex::new(HashMap::new()),
            request_errors_total: Mutex::new(HashMap::new()),
            request_rate_total: Mutex::new(HashMap::new()),
            events_published_total: Mutex::new(HashMap::new()),
            events_delivered_total: AtomicU64::new(0),
            events_dropped_total: AtomicU64::new(0),
            active_subscribers: AtomicU64::new(0),
            presence_errors_total: AtomicU64::new(0),
        }
    }
}

pub fn set_global_metrics(metrics: Arc<ServerMetrics>) {
    let _ = GLOBAL_METRICS.set(metrics);
}

fn global_metrics() -> Option<&'static Arc<ServerMetrics>> {
    GLOBAL_METRICS.get()
}

pub fn record_http_request(method: &str, path: &str, status_code: u16, latency_ms: u64) {
    if let Some(metrics) = global_metrics() {
        metrics.record_http_request(method, path, status_code, latency_ms);
    }
}

pub fn record_publish(kind: RoomKind, delivered: usize, dropped: usize) {
    if let Some(metrics) = global_metrics() {
        metrics.record_publish(kind, delivered, dropped);
    }
}

pub fn increment_active_subscribers() {
    if let Some(metrics) = global_metrics() {
        metrics.active_subscribers.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn decrement_active_subscribers() {
    if let Some(metrics) = global_metrics() {
        let _ = metrics.active_subscribers.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |current| Some(current.saturating_sub(1)),
        );
    }
}

pub fn increment_presence_errors() {
    if let Some(metrics) = global_metrics() {
        metrics.presence_errors_total.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn render() -> String {
    global_metrics().map(|metrics| metrics.render_prometheus()).unwrap_or_default()
}

impl ServerMetrics {
    pub fn record_http_request(&self, method: &str, path: &str, status_code: u16, latency_ms: u64) {
        let key = EndpointMetricKey {
            endpoint: normalize_endpoint(path),
            method: method.to_ascii_uppercase(),
        };

        increment_counter(&self.request_rate_total, &key, 1);
        increment_counter(&self.request_duration_sum_ms, &key, latency_ms);
        increment_counter(&self.request_duration_count, &key, 1);
        if status_code >= 400 {
            increment_counter(&self.request_errors_total, &key, 1);
        }
    }

    pub fn record_publish(&self, kind: RoomKind, delivered: usize, dropped: usize) {
        {
            let mut guard =
                self.events_published_total.lock().expect("metrics map lock poisoned");
            let value = guard.entry(kind.as_str().to_string()).or_insert(0);
            *value = value.saturating_add(1);
        }
        self.events_delivered_total.fetch_add(delivered as u64, Ordering::SeqCst);
        self.events_dropped_total.fetch_add(dropped as u64, Ordering::SeqCst);
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP sotto_request_rate_total Total HTTP requests by endpoint.\n");
        output.push_str("# TYPE sotto_request_rate_total counter\n");
        append_counter_lines(&mut output, "sotto_request_rate_total", &self.request_rate_total);

        output.push_str(
            "# HELP sotto_request_errors_total Total HTTP error responses by endpoint.\n",
        );
        output.push_str("# TYPE sotto_request_errors_total counter\n");
        append_counter_lines(&mut output, "sotto_request_errors_total", &self.request_errors_total);

        output.push_str("# HELP sotto_request_duration_ms_sum Sum of HTTP request latency in milliseconds by endpoint.\n");
        output.push_str("# TYPE sotto_request_duration_ms_sum counter\n");
        append_counter_lines(
            &mut output,
            "sotto_request_duration_ms_sum",
            &self.request_duration_sum_ms,
        );

        output.push_str("# HELP sotto_request_duration_ms_count Count of HTTP request latency samples by endpoint.\n");
        output.push_str("# TYPE sotto_request_duration_ms_count counter\n");
        append_counter_lines(
            &mut output,
            "sotto_request_duration_ms_count",
            &self.request_duration_count,
        );

        output.push_str("# HELP sotto_events_published_total Total events published by room kind.\n");
        output.push_str("# TYPE sotto_events_published_total counter\n");
        append_label_counter_lines(
            &mut output,
            "sotto_events_published_total",
            "kind",
            &self.events_published_total,
        );

        output.push_str(
            "# HELP sotto_events_delivered_total Total event deliveries enqueued to subscribers.\n",
        );
        output.push_str("# TYPE sotto_events_delivered_total counter\n");
        output.push_str(&format!(
            "sotto_events_delivered_total {}\n",
            self.events_delivered_total.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP sotto_events_dropped_total Total deliveries dropped on full or closed channels.\n",
        );
        output.push_str("# TYPE sotto_events_dropped_total counter\n");
        output.push_str(&format!(
            "sotto_events_dropped_total {}\n",
            self.events_dropped_total.load(Ordering::SeqCst)
        ));

        output.push_str("# HELP sotto_active_subscribers Currently connected stream subscribers.\n");
        output.push_str("# TYPE sotto_active_subscribers gauge\n");
        output.push_str(&format!(
            "sotto_active_subscribers {}\n",
            self.active_subscribers.load(Ordering::SeqCst)
        ));

        output.push_str(
            "# HELP sotto_presence_errors_total Total presence backend failures (absorbed).\n",
        );
        output.push_str("# TYPE sotto_presence_errors_total counter\n");
        output.push_str(&format!(
            "sotto_presence_errors_total {}\n",
            self.presence_errors_total.load(Ordering::SeqCst)
        ));

        output
    }
}

fn normalize_endpoint(path: &str) -> String {
    if path.is_empty() {
        return "/".to_string();
    }

    let mut normalized_segments = Vec::new();
    for segment in path.split('/').filter(|segment| !segment.is_empty()) {
        if segment.parse::<sotto_common::room::RoomId>().is_ok() {
            normalized_segments.push("{room}".to_string());
            continue;
        }

        if segment.chars().all(|character| character.is_ascii_digit()) {
            normalized_segments.push("{number}".to_string());
            continue;
        }

        normalized_segments.push(segment.to_string());
    }

    if normalized_segments.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", normalized_segments.join("/"))
    }
}

fn increment_counter(
    counters: &Mutex<HashMap<EndpointMetricKey, u64>>,
    key: &EndpointMetricKey,
    amount: u64,
) {
    let mut guard = counters.lock().expect("metrics map lock poisoned");
    let value = guard.entry(key.clone()).or_insert(0);
    *value = value.saturating_add(amount);
}

fn append_counter_lines(
    output: &mut String,
    metric_name: &str,
    counters: &Mutex<HashMap<EndpointMetricKey, u64>>,
) {
    let guard = counters.lock().expect("metrics map lock poisoned");
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by(|(a, _), (b, _)| (&a.endpoint, &a.method).cmp(&(&b.endpoint, &b.method)));
    for (key, value) in entries {
        output.push_str(&format!(
            "{metric_name}{{endpoint=\"{}\",method=\"{}\"}} {value}\n",
            key.endpoint, key.method
        ));
    }
}

fn append_label_counter_lines(
    output: &mut String,
    metric_name: &str,
    label: &str,
    counters: &Mutex<HashMap<String, u64>>,
) {
    let guard = counters.lock().expect("metrics map lock poisoned");
    let mut entries: Vec<_> = guard.iter().collect();
    entries.sort_by_key(|(key, _)| key.to_owned());
    for (key, value) in entries {
        output.push_str(&format!("{metric_name}{{{label}=\"{key}\"}} {value}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_numeric_and_room_segments() {
        assert_eq!(normalize_endpoint("/v1/rooms/topic:42/events"), "/v1/rooms/{room}/events");
        assert_eq!(normalize_endpoint("/v1/users/123"), "/v1/users/{number}");
        assert_eq!(normalize_endpoint(""), "/");
        assert_eq!(normalize_endpoint("/healthz"), "/healthz");
    }

    #[test]
    fn records_http_requests_and_errors() {
        let metrics = ServerMetrics::default();
        metrics.record_http_request("get", "/healthz", 200, 3);
        metrics.record_http_request("get", "/healthz", 500, 7);

        let rendered = metrics.render_prometheus();
        assert!(rendered
            .contains("sotto_request_rate_total{endpoint=\"/healthz\",method=\"GET\"} 2"));
        assert!(rendered
            .contains("sotto_request_errors_total{endpoint=\"/healthz\",method=\"GET\"} 1"));
        assert!(rendered
            .contains("sotto_request_duration_ms_sum{endpoint=\"/healthz\",method=\"GET\"} 10"));
    }

    #[test]
    fn records_publish_outcomes_by_kind() {
        let metrics = ServerMetrics::default();
        metrics.record_publish(RoomKind::Topic, 3, 1);
        metrics.record_publish(RoomKind::Topic, 2, 0);
        metrics.record_publish(RoomKind::Breaking, 0, 0);

        let rendered = metrics.render_prometheus();
        assert!(rendered.contains("sotto_events_published_total{kind=\"topic\"} 2"));
        assert!(rendered.contains("sotto_events_published_total{kind=\"breaking\"} 1"));
        assert!(rendered.contains("sotto_events_delivered_total 5"));
        assert!(rendered.contains("sotto_events_dropped_total 1"));
    }

    #[test]
    fn subscriber_gauge_never_underflows() {
        let metrics = ServerMetrics::default();
        let _ = metrics.active_subscribers.fetch_update(
            Ordering::SeqCst,
            Ordering::SeqCst,
            |current| Some(current.saturating_sub(1)),
        );
        assert_eq!(metrics.active_subscribers.load(Ordering::SeqCst), 0);
    }
}
