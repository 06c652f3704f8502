//! App watcher behaviour tests.
//!
//! Drive an `AppWatcher` through an in-memory envelope channel and a
//! counting registry, the same way the daemon drives it through the
//! firehose and the Prometheus registry.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use prometheus::core::Collector;
use tokio::sync::mpsc;

use paasmon_core::App;
use paasmon_events::*;

const EVENTUALLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Counts (un)register calls without keeping the instruments.
#[derive(Default)]
struct FakeRegistry {
    counts: Mutex<(usize, usize)>,
}

impl FakeRegistry {
    fn register_call_count(&self) -> usize {
        self.counts.lock().unwrap().0
    }

    fn unregister_call_count(&self) -> usize {
        self.counts.lock().unwrap().1
    }
}

impl MetricsRegistry for FakeRegistry {
    fn register(&self, _collector: Box<dyn Collector>) -> prometheus::Result<()> {
        self.counts.lock().unwrap().0 += 1;
        Ok(())
    }

    fn unregister(&self, _collector: Box<dyn Collector>) -> bool {
        self.counts.lock().unwrap().1 += 1;
        true
    }
}

/// Returns the prepared receiver once.
struct FakeStreamProvider {
    stream: Mutex<Option<EnvelopeStream>>,
}

impl StreamProvider for FakeStreamProvider {
    fn open_stream_for<'a>(
        &'a self,
        app: &'a App,
    ) -> BoxFuture<'a, Result<EnvelopeStream, StreamError>> {
        let stream = self.stream.lock().unwrap().take();
        Box::pin(async move {
            stream.ok_or_else(|| StreamError::Subscribe {
                app: app.guid.clone(),
                reason: "stream already taken".to_string(),
            })
        })
    }
}

struct FailingStreamProvider;

impl StreamProvider for FailingStreamProvider {
    fn open_stream_for<'a>(
        &'a self,
        _app: &'a App,
    ) -> BoxFuture<'a, Result<EnvelopeStream, StreamError>> {
        Box::pin(async {
            Err(StreamError::Connect {
                address: "127.0.0.1:1".to_string(),
                reason: "connection refused".to_string(),
            })
        })
    }
}

struct Harness {
    watcher: AppWatcher,
    registry: Arc<FakeRegistry>,
    events: mpsc::Sender<Envelope>,
}

fn test_app(instances: u32) -> App {
    App {
        guid: "33333333-3333-3333-3333-333333333333".to_string(),
        name: "foo".to_string(),
        instances,
        space_url: "/v2/spaces/123".to_string(),
        state: Default::default(),
    }
}

async fn start_watcher(instances: u32) -> Harness {
    let (events, rx) = mpsc::channel(10);
    let provider = FakeStreamProvider {
        stream: Mutex::new(Some(rx)),
    };
    let registry = Arc::new(FakeRegistry::default());
    let watcher = AppWatcher::new(test_app(instances), registry.clone(), &provider)
        .await
        .unwrap();
    Harness {
        watcher,
        registry,
        events,
    }
}

/// Poll `check` until it holds or the timeout expires.
async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + EVENTUALLY_TIMEOUT;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn crash_envelope(index: u32) -> Envelope {
    Envelope::LogMessage(LogMessage {
        message: format!(
            "App instance exited with guid 4630f6ba-8ddc-41f1-afea-1905332d6660 payload: \
             {{\"instance\"=>\"bc932892-f191-4fe2-60c3-7090\", \"index\"=>{index}, \"reason\"=>\"CRASHED\", \
             \"exit_description\"=>\"APP/PROC/WEB: Exited with status 137\", \"crash_count\"=>1, \
             \"crash_timestamp\"=>1512569260335558205, \"version\"=>\"d24b0422-0c88-4692-bf52-505091890e7d\"}}"
        )
        .into_bytes(),
        message_type: MessageType::Out,
        source_type: "API".to_string(),
        source_instance: "1".to_string(),
        app_id: "4630f6ba-8ddc-41f1-afea-1905332d6660".to_string(),
        timestamp: 0,
    })
}

fn log_envelope(message: &str, message_type: MessageType, source_type: &str) -> Envelope {
    Envelope::LogMessage(LogMessage {
        message: message.as_bytes().to_vec(),
        message_type,
        source_type: source_type.to_string(),
        source_instance: "1".to_string(),
        app_id: "4630f6ba-8ddc-41f1-afea-1905332d6660".to_string(),
        timestamp: 0,
    })
}

fn request_envelope(index: i32, status_code: i32) -> Envelope {
    Envelope::HttpStartStop(HttpStartStop {
        start_timestamp: 0,
        stop_timestamp: Duration::from_millis(11).as_nanos() as i64,
        status_code,
        instance_index: Some(index),
        method: Some("GET".to_string()),
        uri: Some("/".to_string()),
    })
}

#[tokio::test]
async fn registers_metrics_on_startup() {
    let h = start_watcher(1).await;
    assert_eq!(h.registry.register_call_count(), METRICS_PER_INSTANCE);
    assert_eq!(h.watcher.instances().await.keys().copied().collect::<Vec<_>>(), vec![0]);
    h.watcher.close().await;
}

#[tokio::test]
async fn registers_metrics_for_every_instance() {
    let h = start_watcher(3).await;
    assert_eq!(h.registry.register_call_count(), 3 * METRICS_PER_INSTANCE);
    h.watcher.close().await;
    assert_eq!(h.registry.unregister_call_count(), 3 * METRICS_PER_INSTANCE);
}

#[tokio::test]
async fn unregisters_metrics_on_close() {
    let h = start_watcher(1).await;
    h.watcher.close().await;
    assert_eq!(h.registry.unregister_call_count(), METRICS_PER_INSTANCE);
    assert!(h.watcher.instances().await.is_empty());
}

#[tokio::test]
async fn stream_failure_registers_nothing() {
    let registry = Arc::new(FakeRegistry::default());
    let result = AppWatcher::new(test_app(2), registry.clone(), &FailingStreamProvider).await;

    assert!(matches!(result, Err(WatcherError::Stream(_))));
    assert_eq!(registry.register_call_count(), 0);
}

#[tokio::test]
async fn registers_more_metrics_when_new_instances_are_created() {
    let h = start_watcher(1).await;
    h.watcher.update_instance_count(2).await.unwrap();

    assert_eq!(h.registry.register_call_count(), 2 * METRICS_PER_INSTANCE);
    assert_eq!(h.registry.unregister_call_count(), 0);
    assert_eq!(h.watcher.instances().await.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    h.watcher.close().await;
}

#[tokio::test]
async fn unregisters_some_metrics_when_old_instances_are_deleted() {
    let h = start_watcher(1).await;
    h.watcher.update_instance_count(2).await.unwrap();
    assert_eq!(h.registry.register_call_count(), 2 * METRICS_PER_INSTANCE);

    h.watcher.update_instance_count(1).await.unwrap();
    assert_eq!(h.registry.unregister_call_count(), METRICS_PER_INSTANCE);
    assert_eq!(h.watcher.instance_count().await, 1);
    assert!(h.watcher.metrics_for_instance(1).await.is_none());
    h.watcher.close().await;
}

#[tokio::test]
async fn resize_counts_follow_the_difference() {
    let h = start_watcher(4).await;
    h.watcher.update_instance_count(1).await.unwrap();
    assert_eq!(h.registry.unregister_call_count(), 3 * METRICS_PER_INSTANCE);

    h.watcher.update_instance_count(0).await.unwrap();
    assert_eq!(h.registry.unregister_call_count(), 4 * METRICS_PER_INSTANCE);
    assert!(h.watcher.instances().await.is_empty());

    h.watcher.update_instance_count(2).await.unwrap();
    assert_eq!(h.registry.register_call_count(), 6 * METRICS_PER_INSTANCE);
    assert_eq!(h.watcher.instances().await.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    h.watcher.close().await;
}

#[tokio::test]
async fn sets_container_metrics_for_an_instance() {
    let h = start_watcher(1).await;
    let set = h.watcher.metrics_for_instance(0).await.unwrap();

    h.events
        .send(Envelope::ContainerMetric(ContainerMetric {
            instance_index: Some(0),
            cpu_percentage: Some(10.0),
            disk_bytes: Some(512),
            disk_bytes_quota: Some(1024),
            memory_bytes: Some(1024),
            memory_bytes_quota: Some(4096),
        }))
        .await
        .unwrap();

    assert!(eventually(|| set.memory_utilization.get() == 25.0).await);
    assert_eq!(set.cpu.get(), 10.0);
    assert_eq!(set.disk_bytes.get(), 512.0);
    assert_eq!(set.memory_bytes.get(), 1024.0);
    // 512 / 1024 * 100
    assert_eq!(set.disk_utilization.get(), 50.0);
    h.watcher.close().await;
}

#[tokio::test]
async fn increments_the_crashes_metric() {
    let h = start_watcher(1).await;
    let set = h.watcher.metrics_for_instance(0).await.unwrap();

    h.events.send(crash_envelope(0)).await.unwrap();
    assert!(eventually(|| set.crashes.get() == 1).await);

    h.events.send(crash_envelope(0)).await.unwrap();
    assert!(eventually(|| set.crashes.get() == 2).await);
    h.watcher.close().await;
}

#[tokio::test]
async fn does_not_increment_crashes_for_other_log_messages() {
    let h = start_watcher(1).await;
    let set = h.watcher.metrics_for_instance(0).await.unwrap();

    let non_crashes = [
        // Source type is not API.
        log_envelope(
            "dora.dcarley.dev.cloudpipelineapps.digital - [2017-12-06T14:05:45.897+0000] \"GET / HTTP/1.1\" 200 0 13 \
             response_time:0.018321645 app_id:\"4630f6ba-8ddc-41f1-afea-1905332d6660\" app_index:\"0\"\n",
            MessageType::Out,
            "RTR",
        ),
        // Error channel.
        log_envelope("[2017-12-06 14:06:41] INFO  WEBrick 1.3.1", MessageType::Err, "APP/PROC/WEB"),
        // Error channel with an otherwise valid crash line.
        match crash_envelope(0) {
            Envelope::LogMessage(mut log) => {
                log.message_type = MessageType::Err;
                Envelope::LogMessage(log)
            }
            other => other,
        },
        // Missing prefix.
        log_envelope(
            "Updated app with guid 4630f6ba-8ddc-41f1-afea-1905332d6660 ({\"state\"=>\"STOPPED\"})",
            MessageType::Out,
            "API",
        ),
        // No payload.
        log_envelope("Process has crashed with type: \"web\"", MessageType::Out, "API"),
        // Reason is not CRASHED.
        log_envelope(
            "Test without CRASHED payload: \"reason\"=>\"NOT_CRASHED\"",
            MessageType::Out,
            "API",
        ),
        log_envelope(
            "App instance exited with guid 4630f6ba payload: {\"index\"=>0, \"reason\"=>\"STOPPED\"}",
            MessageType::Out,
            "API",
        ),
    ];
    for envelope in non_crashes {
        h.events.send(envelope).await.unwrap();
    }

    // A request sent after them proves they were all consumed.
    h.events.send(request_envelope(0, 200)).await.unwrap();
    assert!(eventually(|| set.request_count("2xx") == 1).await);
    assert_eq!(set.crashes.get(), 0);
    h.watcher.close().await;
}

#[tokio::test]
async fn increments_the_request_metric_per_status_range() {
    for (status_range, status_code) in [("2xx", 226), ("3xx", 302), ("4xx", 418), ("5xx", 507)] {
        let h = start_watcher(1).await;
        let set = h.watcher.metrics_for_instance(0).await.unwrap();

        h.events.send(request_envelope(0, status_code)).await.unwrap();
        assert!(
            eventually(|| set.request_count(status_range) == 1).await,
            "{status_range} not incremented"
        );

        h.events.send(request_envelope(0, status_code)).await.unwrap();
        assert!(eventually(|| set.request_count(status_range) == 2).await);

        assert_eq!(set.response_time.get_sample_count(), 2);
        h.watcher.close().await;
    }
}

#[tokio::test]
async fn ignores_envelopes_for_unknown_instances() {
    let h = start_watcher(1).await;
    let set = h.watcher.metrics_for_instance(0).await.unwrap();

    h.events.send(request_envelope(3, 200)).await.unwrap();
    h.events.send(crash_envelope(7)).await.unwrap();
    h.events
        .send(Envelope::ContainerMetric(ContainerMetric {
            instance_index: Some(1),
            cpu_percentage: Some(99.0),
            ..Default::default()
        }))
        .await
        .unwrap();
    h.events.send(Envelope::Other).await.unwrap();
    h.events.send(request_envelope(0, 302)).await.unwrap();

    assert!(eventually(|| set.request_count("3xx") == 1).await);
    assert!(h.watcher.is_running().await);
    assert_eq!(set.request_count("2xx"), 0);
    assert_eq!(set.crashes.get(), 0);
    assert_eq!(set.cpu.get(), 0.0);
    assert_eq!(h.watcher.instance_count().await, 1);
    h.watcher.close().await;
}

#[tokio::test]
async fn envelopes_for_removed_instances_are_dropped() {
    let h = start_watcher(2).await;
    let removed = h.watcher.metrics_for_instance(1).await.unwrap();
    h.watcher.update_instance_count(1).await.unwrap();

    h.events.send(crash_envelope(1)).await.unwrap();
    h.events.send(crash_envelope(0)).await.unwrap();

    let kept = h.watcher.metrics_for_instance(0).await.unwrap();
    assert!(eventually(|| kept.crashes.get() == 1).await);
    assert_eq!(removed.crashes.get(), 0);
    h.watcher.close().await;
}

#[tokio::test]
async fn concurrent_resizes_leave_a_consistent_table() {
    let h = Arc::new(start_watcher(1).await);

    let mut tasks = Vec::new();
    for count in [5u32, 2, 8, 3] {
        let h = h.clone();
        tasks.push(tokio::spawn(async move {
            h.watcher.update_instance_count(count).await.unwrap();
            for i in 0..count {
                let _ = h.events.send(request_envelope(i as i32, 200)).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let count = h.watcher.instance_count().await;
    let indices: Vec<u32> = h.watcher.instances().await.keys().copied().collect();
    assert_eq!(indices, (0..count).collect::<Vec<_>>());

    let registered = h.registry.register_call_count() - h.registry.unregister_call_count();
    assert_eq!(registered, count as usize * METRICS_PER_INSTANCE);
    h.watcher.close().await;
}
