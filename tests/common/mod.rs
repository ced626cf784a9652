//! Shared helpers for the integration test suites

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use faultline::error::TransportError;
use faultline::logger::ErrorLogEntry;
use faultline::reporter::ReportBatch;
use faultline::ReportTransport;

/// A transport that records everything it is asked to send
///
/// Behavior is switchable: it can fail every send, or park inside
/// `send_reports` until a semaphore permit is released, which lets tests
/// observe an in-flight send.
pub struct RecordingTransport {
    pub batches: Mutex<Vec<ReportBatch>>,
    pub entries: Mutex<Vec<ErrorLogEntry>>,
    pub send_calls: AtomicUsize,
    pub fail_sends: AtomicBool,
    gate: Option<Arc<Semaphore>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            gate: None,
        })
    }

    pub fn failing() -> Arc<Self> {
        let transport = Self::new();
        transport.fail_sends.store(true, Ordering::SeqCst);
        transport
    }

    /// Sends block until a permit is added to the returned semaphore
    pub fn gated() -> (Arc<Self>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let transport = Arc::new(Self {
            batches: Mutex::new(Vec::new()),
            entries: Mutex::new(Vec::new()),
            send_calls: AtomicUsize::new(0),
            fail_sends: AtomicBool::new(false),
            gate: Some(Arc::clone(&gate)),
        });
        (transport, gate)
    }

    pub fn sent_report_count(&self) -> usize {
        self.batches
            .lock()
            .expect("batches lock")
            .iter()
            .map(|batch| batch.reports.len())
            .sum()
    }
}

#[async_trait]
impl ReportTransport for RecordingTransport {
    async fn send_reports(&self, batch: &ReportBatch) -> Result<(), TransportError> {
        self.send_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate closed");
            permit.forget();
        }

        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("test transport down".to_string()));
        }

        self.batches.lock().expect("batches lock").push(batch.clone());
        Ok(())
    }

    async fn send_log_entry(&self, entry: &ErrorLogEntry) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Unavailable("test transport down".to_string()));
        }

        self.entries.lock().expect("entries lock").push(entry.clone());
        Ok(())
    }
}

/// Yield to the runtime until `condition` holds or the budget runs out
pub async fn wait_until<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
}
