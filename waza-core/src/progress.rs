//! Progress Bus: a structured event stream delivered synchronously to
//! registered listener objects rather than over an mpsc channel, so a
//! slow listener can be bounded with a short deadline instead of risking
//! an unbounded backlog.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// A listener callback's budget before the bus gives up waiting on it.
const LISTENER_DEADLINE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialStatus {
    Started,
    Passed,
    Failed,
    Error,
    Cancelled,
}

/// One structured progress event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressEventKind,
    pub test_index: usize,
    pub test_total: usize,
    pub test_name: String,
    pub run_number: Option<u32>,
    pub status: Option<TrialStatus>,
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub details: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressEventKind {
    BenchmarkStart,
    BenchmarkComplete,
    TestStart,
    TestComplete,
    TestCached,
    RunStart,
    RunComplete,
    EnginePrompt,
    EngineResponse,
    GraderResult,
}

impl ProgressEvent {
    pub fn new(kind: ProgressEventKind, test_index: usize, test_total: usize, test_name: impl Into<String>) -> Self {
        Self {
            kind,
            test_index,
            test_total,
            test_name: test_name.into(),
            run_number: None,
            status: None,
            duration_ms: None,
            details: HashMap::new(),
        }
    }

    pub fn with_run(mut self, run_number: u32) -> Self {
        self.run_number = Some(run_number);
        self
    }

    pub fn with_status(mut self, status: TrialStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    /// Truncates payload-bearing details (engine prompt/response text) to
    /// a bounded length before they go out on the bus.
    pub fn with_truncated_detail(mut self, key: &str, value: &str) -> Self {
        const MAX_LEN: usize = 500;
        let truncated = if value.len() > MAX_LEN {
            let boundary = (0..=MAX_LEN).rfind(|&i| value.is_char_boundary(i)).unwrap_or(0);
            format!("{}... [truncated]", &value[..boundary])
        } else {
            value.to_string()
        };
        self.details.insert(key.to_string(), truncated);
        self
    }
}

/// A registered consumer of the progress stream. Implementations must
/// not assume ordering across tasks in parallel mode.
#[async_trait]
pub trait ProgressListener: Send + Sync {
    async fn on_event(&self, event: &ProgressEvent);
}

/// Fan-out point. Delivery is at-most-once and synchronous to the
/// emitting trial; each listener gets its own defensive clone of the
/// event and a bounded deadline so one slow listener cannot stall the
/// scheduler indefinitely.
#[derive(Clone, Default)]
pub struct ProgressBus {
    listeners: Vec<Arc<dyn ProgressListener>>,
}

impl ProgressBus {
    pub fn new() -> Self {
        Self { listeners: vec![] }
    }

    pub fn register(&mut self, listener: Arc<dyn ProgressListener>) {
        self.listeners.push(listener);
    }

    pub async fn emit(&self, event: ProgressEvent) {
        for listener in &self.listeners {
            let listener = listener.clone();
            let event = event.clone();
            let delivery = async move { listener.on_event(&event).await };
            if tokio::time::timeout(LISTENER_DEADLINE, delivery).await.is_err() {
                warn!(
                    kind = ?event.kind,
                    test = %event.test_name,
                    "progress listener exceeded delivery deadline, event dropped for it"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingListener(Arc<AtomicUsize>);

    #[async_trait]
    impl ProgressListener for CountingListener {
        async fn on_event(&self, _event: &ProgressEvent) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct StuckListener;

    #[async_trait]
    impl ProgressListener for StuckListener {
        async fn on_event(&self, _event: &ProgressEvent) {
            tokio::time::sleep(Duration::from_secs(10)).await;
        }
    }

    #[tokio::test]
    async fn delivers_to_all_registered_listeners() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut bus = ProgressBus::new();
        bus.register(Arc::new(CountingListener(counter.clone())));
        bus.register(Arc::new(CountingListener(counter.clone())));

        bus.emit(ProgressEvent::new(ProgressEventKind::BenchmarkStart, 0, 1, "bench"))
            .await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn slow_listener_does_not_hang_emit() {
        let mut bus = ProgressBus::new();
        bus.register(Arc::new(StuckListener));

        let start = std::time::Instant::now();
        bus.emit(ProgressEvent::new(ProgressEventKind::TestStart, 0, 1, "t"))
            .await;
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn truncates_long_payloads() {
        let long = "x".repeat(1000);
        let event = ProgressEvent::new(ProgressEventKind::EnginePrompt, 0, 1, "t")
            .with_truncated_detail("prompt", &long);
        assert!(event.details["prompt"].len() < 1000);
    }

    #[test]
    fn truncation_does_not_split_a_multibyte_character() {
        let long = "é".repeat(400);
        let event = ProgressEvent::new(ProgressEventKind::EnginePrompt, 0, 1, "t")
            .with_truncated_detail("prompt", &long);
        assert!(event.details["prompt"].ends_with("... [truncated]"));
    }
}
