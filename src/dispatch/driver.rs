//! Periodic driver running dispatch cycles on a background thread.

use super::dispatcher::Dispatcher;
use super::types::{CycleReport, CycleStatus};
use crate::error::Result;
use crossbeam_channel::{bounded, select, tick, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Fires [`Dispatcher::run_cycle`] on a fixed interval until stopped.
///
/// Stopping waits for an in-flight cycle to drain.
pub struct PeriodicDriver {
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicDriver {
    /// Start ticking every `interval`.
    pub fn spawn(dispatcher: Arc<Dispatcher>, interval: Duration) -> Result<Self> {
        Self::spawn_inner(dispatcher, interval, None)
    }

    /// Like [`spawn`](Self::spawn), forwarding every report to `reports`.
    pub fn spawn_with_reports(
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
        reports: Sender<CycleReport>,
    ) -> Result<Self> {
        Self::spawn_inner(dispatcher, interval, Some(reports))
    }

    fn spawn_inner(
        dispatcher: Arc<Dispatcher>,
        interval: Duration,
        reports: Option<Sender<CycleReport>>,
    ) -> Result<Self> {
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::Builder::new()
            .name("feedwatch-dispatch".into())
            .spawn(move || {
                let ticker = tick(interval);
                tracing::info!(interval_secs = interval.as_secs(), "Dispatch driver started");

                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            let report = dispatcher.run_cycle();
                            if report.status == CycleStatus::Completed && !report.fired.is_empty() {
                                tracing::info!(
                                    fired = report.fired.len(),
                                    removed = report.removed().len(),
                                    elapsed_ms = report.elapsed.as_millis() as u64,
                                    "Dispatch cycle finished"
                                );
                            }
                            if let Some(reports) = &reports {
                                let _ = reports.send(report);
                            }
                        }
                    }
                }

                tracing::info!("Dispatch driver stopped");
            })?;

        Ok(Self {
            stop_tx,
            handle: Some(handle),
        })
    }

    /// Stop ticking and wait for the current cycle to finish.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        let _ = self.stop_tx.try_send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("Dispatch driver thread panicked");
            }
        }
    }
}

impl Drop for PeriodicDriver {
    fn drop(&mut self) {
        self.shutdown();
    }
}
