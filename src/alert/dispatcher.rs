//! Ordered-fallback alert dispatch.
//!
//! Backends are tried one at a time, in configuration order, each bounded by
//! the attempt timeout. The first success ends the chain. If every backend
//! fails the alert is logged and recorded, and the caller gets a non-delivered
//! outcome; nothing propagates as an error.

use super::backend::{build_backends, NotificationBackend};
use super::message::compose;
use super::{AlertOutcome, AlertRequest, AttemptRecord, DeliveryError};
use crate::config::{AlertConfig, AlertPolicy};
use crate::error::Result;
use crate::risk::RiskLevel;
use crate::storage::{write_blocking, EventSink, NullSink};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub struct AlertDispatcher {
    policy: AlertPolicy,
    attempt_timeout: Duration,
    subject_prefix: String,
    backends: Vec<Box<dyn NotificationBackend>>,
    sink: Arc<dyn EventSink>,
}

pub struct AlertDispatcherBuilder {
    policy: AlertPolicy,
    attempt_timeout: Duration,
    subject_prefix: String,
    backends: Vec<Box<dyn NotificationBackend>>,
    sink: Arc<dyn EventSink>,
}

impl Default for AlertDispatcherBuilder {
    fn default() -> Self {
        let defaults = AlertConfig::default();
        Self {
            policy: defaults.policy,
            attempt_timeout: Duration::from_secs(defaults.attempt_timeout_secs),
            subject_prefix: defaults.subject_prefix,
            backends: Vec::new(),
            sink: Arc::new(NullSink),
        }
    }
}

impl AlertDispatcherBuilder {
    pub fn policy(mut self, policy: AlertPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    /// Append a backend to the end of the fallback chain
    pub fn backend(mut self, backend: Box<dyn NotificationBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn build(self) -> AlertDispatcher {
        AlertDispatcher {
            policy: self.policy,
            attempt_timeout: self.attempt_timeout,
            subject_prefix: self.subject_prefix,
            backends: self.backends,
            sink: self.sink,
        }
    }
}

impl AlertDispatcher {
    pub fn builder() -> AlertDispatcherBuilder {
        AlertDispatcherBuilder::default()
    }

    /// Build from configuration; backends are instantiated in list order.
    pub fn from_config(config: &AlertConfig, data_dir: &Path, sink: Arc<dyn EventSink>) -> Result<Self> {
        let timeout = Duration::from_secs(config.attempt_timeout_secs.max(1));
        let mut builder = Self::builder()
            .policy(config.policy)
            .attempt_timeout(timeout)
            .subject_prefix(config.subject_prefix.clone())
            .sink(sink);
        for backend in build_backends(&config.backends, data_dir, timeout)? {
            builder = builder.backend(backend);
        }
        Ok(builder.build())
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn should_send(&self, level: RiskLevel) -> bool {
        match self.policy {
            AlertPolicy::Always => true,
            AlertPolicy::AtOrAbove { level: min } => level >= min,
            AlertPolicy::Never => false,
        }
    }

    /// Deliver one alert. Consumes the request; never returns an error.
    pub async fn dispatch(&self, request: AlertRequest) -> AlertOutcome {
        if !self.should_send(request.level) {
            debug!(
                mine_id = %request.mine_id,
                level = %request.level,
                policy = ?self.policy,
                "alert suppressed by policy"
            );
            let outcome = AlertOutcome::suppressed();
            self.record(request, outcome.clone()).await;
            return outcome;
        }

        let message = compose(&request, &self.subject_prefix);
        let mut outcome = AlertOutcome::default();

        for backend in &self.backends {
            let started = Instant::now();
            let result = match tokio::time::timeout(self.attempt_timeout, backend.send(&message)).await {
                Ok(r) => r,
                Err(_) => Err(DeliveryError::Timeout(self.attempt_timeout)),
            };
            let elapsed_ms = started.elapsed().as_millis() as u64;

            match result {
                Ok(()) => {
                    outcome.attempts.push(AttemptRecord {
                        backend: backend.name().to_string(),
                        success: true,
                        error: None,
                        elapsed_ms,
                    });
                    outcome.delivered = true;
                    outcome.channel_used = Some(backend.name().to_string());
                    info!(
                        mine_id = %request.mine_id,
                        level = %request.level,
                        backend = backend.name(),
                        elapsed_ms,
                        "alert delivered"
                    );
                    break;
                }
                Err(e) => {
                    warn!(
                        mine_id = %request.mine_id,
                        backend = backend.name(),
                        error = %e,
                        "alert backend failed; trying next"
                    );
                    outcome.attempts.push(AttemptRecord {
                        backend: backend.name().to_string(),
                        success: false,
                        error: Some(e.to_string()),
                        elapsed_ms,
                    });
                }
            }
        }

        if !outcome.delivered {
            warn!(
                mine_id = %request.mine_id,
                level = %request.level,
                probability = request.probability,
                attempts = outcome.attempts.len(),
                "all alert backends failed; alert logged only"
            );
        }

        self.record(request, outcome.clone()).await;
        outcome
    }

    async fn record(&self, request: AlertRequest, outcome: AlertOutcome) {
        let mine_id = request.mine_id.clone();
        let sink = Arc::clone(&self.sink);
        if let Err(e) = write_blocking(move || sink.record_alert(&request, &outcome)).await {
            warn!(mine_id = %mine_id, error = %e, "alert log write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::OutboundMessage;
    use crate::error::AgentError;
    use crate::risk::RiskAssessment;
    use crate::storage::MemorySink;
    use std::sync::Mutex;

    enum Behaviour {
        Succeed,
        Fail,
        Hang,
    }

    struct ScriptedBackend {
        name: String,
        behaviour: Behaviour,
        calls: Arc<Mutex<Vec<String>>>,
    }

    fn scripted(name: &str, behaviour: Behaviour, calls: &Arc<Mutex<Vec<String>>>) -> Box<dyn NotificationBackend> {
        Box::new(ScriptedBackend {
            name: name.to_string(),
            behaviour,
            calls: calls.clone(),
        })
    }

    #[async_trait::async_trait]
    impl NotificationBackend for ScriptedBackend {
        fn name(&self) -> &str {
            &self.name
        }

        async fn send(&self, _message: &OutboundMessage) -> std::result::Result<(), DeliveryError> {
            self.calls.lock().unwrap().push(self.name.clone());
            match self.behaviour {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(DeliveryError::Rejected {
                    status: 503,
                    body: "unavailable".into(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok(())
                }
            }
        }
    }

    struct BrokenSink;

    impl EventSink for BrokenSink {
        fn record_assessment(&self, _a: &RiskAssessment) -> crate::error::Result<()> {
            Err(AgentError::Config("store offline".into()))
        }

        fn record_alert(&self, _r: &AlertRequest, _o: &AlertOutcome) -> crate::error::Result<()> {
            Err(AgentError::Config("store offline".into()))
        }
    }

    /// Holds the calling thread like a locked SQLite file would.
    struct SlowSink(Duration);

    impl EventSink for SlowSink {
        fn record_assessment(&self, _a: &RiskAssessment) -> crate::error::Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }

        fn record_alert(&self, _r: &AlertRequest, _o: &AlertOutcome) -> crate::error::Result<()> {
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    fn request(level: RiskLevel) -> AlertRequest {
        AlertRequest {
            mine_id: "M1".into(),
            mine_name: "North Pit".into(),
            location: "Bench 2".into(),
            recipient_email: "ops@example.com".into(),
            probability: 0.7,
            level,
            drivers: Vec::new(),
            stale_reading: false,
        }
    }

    #[tokio::test]
    async fn stops_at_first_success_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::builder()
            .backend(scripted("a", Behaviour::Fail, &calls))
            .backend(scripted("b", Behaviour::Fail, &calls))
            .backend(scripted("c", Behaviour::Succeed, &calls))
            .backend(scripted("d", Behaviour::Succeed, &calls))
            .build();

        let outcome = dispatcher.dispatch(request(RiskLevel::High)).await;
        assert!(outcome.delivered);
        assert_eq!(outcome.channel_used.as_deref(), Some("c"));
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(outcome.attempts.len(), 3);
        assert!(!outcome.attempts[0].success);
        assert!(outcome.attempts[2].success);
    }

    #[tokio::test]
    async fn exhaustion_returns_undelivered_and_records() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::new(MemorySink::new());
        let dispatcher = AlertDispatcher::builder()
            .backend(scripted("a", Behaviour::Fail, &calls))
            .backend(scripted("b", Behaviour::Fail, &calls))
            .sink(sink.clone())
            .build();

        let outcome = dispatcher.dispatch(request(RiskLevel::Critical)).await;
        assert!(!outcome.delivered);
        assert!(outcome.channel_used.is_none());
        assert_eq!(*calls.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(sink.alerts().len(), 1);
        assert!(!sink.alerts()[0].1.delivered);
    }

    #[tokio::test]
    async fn no_backends_is_not_an_error() {
        let outcome = AlertDispatcher::builder()
            .build()
            .dispatch(request(RiskLevel::Low))
            .await;
        assert!(!outcome.delivered);
        assert!(outcome.attempts.is_empty());
    }

    #[tokio::test]
    async fn hung_backend_times_out_and_chain_continues() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::builder()
            .attempt_timeout(Duration::from_millis(50))
            .backend(scripted("slow", Behaviour::Hang, &calls))
            .backend(scripted("fast", Behaviour::Succeed, &calls))
            .build();

        let started = Instant::now();
        let outcome = dispatcher.dispatch(request(RiskLevel::High)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(outcome.channel_used.as_deref(), Some("fast"));
        let err = outcome.attempts[0].error.as_deref().unwrap();
        assert!(err.contains("timed out"), "{err}");
    }

    #[tokio::test]
    async fn policy_gates_by_level() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::builder()
            .policy(AlertPolicy::AtOrAbove {
                level: RiskLevel::High,
            })
            .backend(scripted("a", Behaviour::Succeed, &calls))
            .build();

        let low = dispatcher.dispatch(request(RiskLevel::Medium)).await;
        assert!(low.suppressed);
        assert!(!low.delivered);
        assert!(calls.lock().unwrap().is_empty());

        let high = dispatcher.dispatch(request(RiskLevel::High)).await;
        assert!(high.delivered);

        let never = AlertDispatcher::builder().policy(AlertPolicy::Never).build();
        assert!(!never.should_send(RiskLevel::Critical));
        let always = AlertDispatcher::builder().build();
        assert!(always.should_send(RiskLevel::Low));
    }

    #[tokio::test]
    async fn sink_failure_does_not_affect_outcome() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let dispatcher = AlertDispatcher::builder()
            .backend(scripted("a", Behaviour::Succeed, &calls))
            .sink(Arc::new(BrokenSink))
            .build();
        let outcome = dispatcher.dispatch(request(RiskLevel::High)).await;
        assert!(outcome.delivered);
    }

    #[tokio::test]
    async fn slow_sink_does_not_block_the_runtime() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = {
            let ticks = ticks.clone();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    ticks.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        let dispatcher = AlertDispatcher::builder()
            .sink(Arc::new(SlowSink(Duration::from_millis(300))))
            .build();
        let outcome = dispatcher.dispatch(request(RiskLevel::High)).await;
        ticker.abort();

        assert!(!outcome.delivered);
        // single-threaded test runtime: the ticker only advances if the write left it
        assert!(ticks.load(Ordering::SeqCst) >= 3, "ticks: {}", ticks.load(Ordering::SeqCst));
    }

    #[test]
    fn from_config_keeps_backend_order() {
        let config: AlertConfig = serde_json::from_str(
            r#"{ "backends": [
                { "kind": "outbox", "name": "spool", "path": "out.ndjson" },
                { "kind": "webhook", "name": "ops", "url": "https://hooks.example/ops" }
            ] }"#,
        )
        .unwrap();
        let dispatcher = AlertDispatcher::from_config(&config, Path::new("/tmp"), Arc::new(NullSink)).unwrap();
        assert_eq!(dispatcher.backend_names(), vec!["spool", "ops"]);
        assert_eq!(dispatcher.policy(), AlertPolicy::Always);
    }
}
