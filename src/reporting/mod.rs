//! Background delivery of completion reports.
//!
//! Reports are queued on a bounded channel and delivered by a single worker
//! task, so a slow or failing gateway never delays the caller. Delivery
//! failures are logged and counted, never returned.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::gateway::TransactionGateway;
use crate::observability::MetricsCollector;
use crate::types::CompletionReport;

enum Command {
    Report {
        transaction_id: String,
        report: CompletionReport,
    },
    Flush(oneshot::Sender<()>),
    Shutdown,
}

/// Fire-and-forget completion reporter.
///
/// The worker is spawned on the current Tokio runtime the first time a report
/// is queued.
pub struct CompletionReporter {
    sender: mpsc::Sender<Command>,
    receiver: Mutex<Option<mpsc::Receiver<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    gateway: Arc<dyn TransactionGateway>,
    metrics: Arc<dyn MetricsCollector>,
}

impl CompletionReporter {
    /// Creates a reporter with a queue of `capacity` reports.
    pub fn new(
        gateway: Arc<dyn TransactionGateway>,
        metrics: Arc<dyn MetricsCollector>,
        capacity: usize,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            worker: Mutex::new(None),
            gateway,
            metrics,
        }
    }

    /// Queues a report without waiting. A full or closed queue drops the
    /// report with a warning.
    pub fn report(&self, transaction_id: impl Into<String>, report: CompletionReport) {
        self.ensure_worker();

        let transaction_id = transaction_id.into();
        let command = Command::Report {
            transaction_id,
            report,
        };

        if let Err(err) = self.sender.try_send(command) {
            let (reason, command) = match err {
                mpsc::error::TrySendError::Full(command) => ("queue full", command),
                mpsc::error::TrySendError::Closed(command) => ("reporter stopped", command),
            };
            if let Command::Report { transaction_id, .. } = command {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    reason,
                    "Dropping completion report"
                );
            }
            self.metrics.record_completion_dropped();
        }
    }

    /// Waits until every report queued before this call has been handled.
    pub async fn flush(&self) {
        self.ensure_worker();

        let (ack, done) = oneshot::channel();
        if self.sender.send(Command::Flush(ack)).await.is_err() {
            return;
        }
        let _ = done.await;
    }

    /// Delivers queued reports, then stops the worker. Reports queued after
    /// shutdown are dropped.
    pub async fn shutdown(&self) {
        let worker = self.worker.lock().take();
        // Never-started worker: drop the receiver so later reports fail fast.
        if self.receiver.lock().take().is_some() {
            tracing::debug!("Completion reporter shut down before first report");
        }

        let Some(worker) = worker else {
            return;
        };

        if self.sender.send(Command::Shutdown).await.is_err() {
            tracing::debug!("Completion worker already stopped");
        }

        if let Err(err) = worker.await {
            tracing::error!(error = %err, "Completion worker terminated abnormally");
        }
    }

    fn ensure_worker(&self) {
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };

        let gateway = Arc::clone(&self.gateway);
        let metrics = Arc::clone(&self.metrics);
        let span = tracing::debug_span!("completion_worker");
        let handle = tokio::spawn(run_worker(receiver, gateway, metrics).instrument(span));
        *self.worker.lock() = Some(handle);
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Command>,
    gateway: Arc<dyn TransactionGateway>,
    metrics: Arc<dyn MetricsCollector>,
) {
    tracing::debug!("Completion worker started");

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Report {
                transaction_id,
                report,
            } => match gateway.complete(&transaction_id, &report).await {
                Ok(()) => {
                    metrics.record_completion(true);
                    tracing::debug!(
                        transaction_id = %transaction_id,
                        outcome = ?report.outcome,
                        "Completion reported"
                    );
                }
                Err(err) => {
                    metrics.record_completion(false);
                    tracing::warn!(
                        transaction_id = %transaction_id,
                        error = %err,
                        "Failed to report completion"
                    );
                }
            },
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => break,
        }
    }

    receiver.close();
    while let Ok(command) = receiver.try_recv() {
        match command {
            Command::Report { transaction_id, .. } => {
                metrics.record_completion_dropped();
                tracing::warn!(transaction_id = %transaction_id, "Dropping completion report after shutdown");
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
            Command::Shutdown => {}
        }
    }

    tracing::debug!("Completion worker stopped");
}

impl std::fmt::Debug for CompletionReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionReporter")
            .field("capacity", &self.sender.max_capacity())
            .field("running", &self.worker.lock().is_some())
            .finish()
    }
}
