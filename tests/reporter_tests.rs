//! Reporter queueing, flush-guard and persistence tests

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use common::{wait_until, RecordingTransport};
use faultline::config::ReporterConfig;
use faultline::events::ErrorEvent;
use faultline::manager::{ErrorContext, Fault, ManagedError};
use faultline::platform::{MemoryReportStore, ReportStore};
use faultline::reporter::ErrorReporter;
use faultline::{ErrorSeverity, PlatformInfo};

fn reporter_with(
    config: ReporterConfig,
    transport: Arc<RecordingTransport>,
    store: Arc<MemoryReportStore>,
) -> ErrorReporter {
    ErrorReporter::new(
        config,
        PlatformInfo::host("reporter-tests", "0.0.0"),
        transport,
        store,
    )
}

fn captured(message: &str) -> ErrorEvent {
    ErrorEvent::Captured(ManagedError::from_fault(
        Fault::new(message).with_context(ErrorContext::new("tests", "reporting")),
    ))
}

/// Two flushes back-to-back while one is pending produce exactly one send
#[tokio::test]
async fn test_in_flight_guard_prevents_concurrent_sends() {
    let (transport, gate) = RecordingTransport::gated();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 100,
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        store,
    );

    reporter.observe(&captured("request timeout one"));

    let background = {
        let reporter = reporter.clone();
        tokio::spawn(async move { reporter.flush().await })
    };

    // Wait until the first flush is parked inside the transport
    wait_until(|| transport.send_calls.load(Ordering::SeqCst) == 1).await;

    // New report arrives while the send is pending
    reporter.observe(&captured("request timeout two"));
    assert_eq!(reporter.queue_len(), 1);

    // A second flush must be a no-op while the first is in flight
    reporter.flush().await;
    assert_eq!(transport.send_calls.load(Ordering::SeqCst), 1);
    assert_eq!(reporter.queue_len(), 1, "pending report stays queued");

    gate.add_permits(1);
    background.await.expect("flush task");

    // Now the guard is released and the second report can go out
    gate.add_permits(1);
    reporter.flush().await;
    assert_eq!(transport.send_calls.load(Ordering::SeqCst), 2);
    assert_eq!(reporter.queue_len(), 0);
}

/// Failed sends push reports back to the front of the queue and persist a
/// capped backup
#[tokio::test]
async fn test_send_failure_requeues_and_persists_capped() {
    let transport = RecordingTransport::failing();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 100,
            store_cap: 2,
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        Arc::clone(&store),
    );

    for message in ["first timeout", "second timeout", "third timeout"] {
        reporter.observe(&captured(message));
    }

    reporter.flush().await;

    // Everything is back in the queue, original order preserved
    assert_eq!(reporter.queue_len(), 3);

    // The backup keeps only the newest store_cap reports
    let stored = store.load().expect("load backup");
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[0].message, "second timeout");
    assert_eq!(stored[1].message, "third timeout");
}

/// Stored reports are resent and the backup cleared on success
#[tokio::test]
async fn test_retry_stored_reports_clears_backup() {
    let transport = RecordingTransport::failing();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 100,
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        Arc::clone(&store),
    );

    reporter.observe(&captured("doomed timeout"));
    reporter.flush().await;
    assert_eq!(store.load().expect("load").len(), 1);

    // Nothing stored can be sent while the endpoint is down
    assert!(reporter.retry_stored_reports().await.is_err());
    assert_eq!(store.load().expect("load").len(), 1);

    // Endpoint recovers
    transport.fail_sends.store(false, Ordering::SeqCst);
    let delivered = reporter
        .retry_stored_reports()
        .await
        .expect("stored reports should send");
    assert_eq!(delivered, 1);
    assert!(store.load().expect("load").is_empty());

    // Empty backup is a cheap no-op
    assert_eq!(reporter.retry_stored_reports().await.expect("empty"), 0);
}

/// Critical errors trigger an immediate background flush
#[tokio::test]
async fn test_critical_severity_flushes_immediately() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 100,
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        store,
    );

    reporter.observe(&captured("fatal inventory corruption"));

    wait_until(|| transport.sent_report_count() == 1).await;
    assert_eq!(transport.sent_report_count(), 1);
    assert_eq!(reporter.queue_len(), 0);
}

/// Reaching the batch size triggers a flush without waiting for the timer
#[tokio::test]
async fn test_batch_size_triggers_flush() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 3,
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        store,
    );

    reporter.observe(&captured("timeout a"));
    reporter.observe(&captured("timeout b"));
    assert_eq!(transport.send_calls.load(Ordering::SeqCst), 0);

    reporter.observe(&captured("timeout c"));
    wait_until(|| transport.sent_report_count() == 3).await;
    assert_eq!(transport.sent_report_count(), 3);
}

/// The interval task flushes queued reports on its own
#[tokio::test(start_paused = true)]
async fn test_interval_flush() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 100,
            flush_interval: Duration::from_secs(30),
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        store,
    );
    reporter.start();
    // Let the spawned task create its interval at the current paused instant
    tokio::task::yield_now().await;

    reporter.observe(&captured("slow-burn timeout"));
    assert_eq!(transport.sent_report_count(), 0);

    tokio::time::advance(Duration::from_secs(31)).await;
    wait_until(|| transport.sent_report_count() == 1).await;
    assert_eq!(transport.sent_report_count(), 1);

    reporter.shutdown().await;
}

/// Shutdown performs one final best-effort flush
#[tokio::test]
async fn test_shutdown_flushes_remaining() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            batch_size: 100,
            ..ReporterConfig::default()
        },
        Arc::clone(&transport),
        store,
    );
    reporter.start();

    reporter.observe(&captured("last-minute timeout"));
    reporter.shutdown().await;

    assert_eq!(transport.sent_report_count(), 1);
    assert_eq!(reporter.queue_len(), 0);
}

/// Severity below the threshold never reaches the queue
#[tokio::test]
async fn test_threshold_gate() {
    let transport = RecordingTransport::new();
    let store = Arc::new(MemoryReportStore::new());
    let reporter = reporter_with(
        ReporterConfig {
            severity_threshold: ErrorSeverity::High,
            batch_size: 100,
            ..ReporterConfig::default()
        },
        transport,
        store,
    );

    // Unknown category classifies as Medium, below a High threshold
    reporter.observe(&captured("some odd failure"));
    assert_eq!(reporter.queue_len(), 0);

    reporter.observe(&captured("request timeout"));
    assert_eq!(reporter.queue_len(), 1);
}
