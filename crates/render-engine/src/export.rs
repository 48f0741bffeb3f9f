//! Exporter: the final encode with progress, timeout and cancellation.
//!
//! State machine:
//!
//! ```text
//! Idle ──► Exporting ──┬──► Completed
//!                      ├──► Failed
//!                      ├──► Cancelled   (token set, or memory pressure Critical)
//!                      └──► TimedOut    (wall-clock ceiling for the mode)
//! ```
//!
//! While exporting, a monitor task polls the memory monitor and the
//! cancellation token every `poll_interval`. Either trigger resolves the
//! export immediately; the encode future is dropped rather than awaited.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reelsmith_common::config::ExportLimits;
use reelsmith_common::error::{CancelReason, ReelError, ReelResult, RenderPhase};
use reelsmith_plan_model::RenderMode;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::encoder::{ExportJob, MediaEncoder};
use crate::monitor::{MemoryMonitor, PressureBand};

/// Highest progress reported before the export has actually completed.
const MAX_PENDING_PROGRESS: f64 = 0.999;

/// Lifecycle of one export.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ExportState {
    Idle = 0,
    Exporting = 1,
    Completed = 2,
    Failed = 3,
    Cancelled = 4,
    TimedOut = 5,
}

impl ExportState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => ExportState::Idle,
            1 => ExportState::Exporting,
            2 => ExportState::Completed,
            3 => ExportState::Failed,
            4 => ExportState::Cancelled,
            _ => ExportState::TimedOut,
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, ExportState::Idle | ExportState::Exporting)
    }
}

/// Longest export ceiling accepted from config or the command line.
const MAX_TIMEOUT_SECS: f64 = 86_400.0;

/// Clamp a ceiling in seconds to `[1 ms, 24 h]`.
pub fn timeout_from_secs(secs: f64) -> Duration {
    if secs.is_nan() {
        return Duration::from_millis(1);
    }
    Duration::from_secs_f64(secs.clamp(0.001, MAX_TIMEOUT_SECS))
}

/// Time limits for one export.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExportSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ExportSettings {
    /// Pick the ceiling for `mode` from configured limits.
    pub fn for_mode(limits: &ExportLimits, mode: RenderMode) -> Self {
        let secs = match mode {
            RenderMode::Fast => limits.fast_timeout_secs,
            RenderMode::Full => limits.full_timeout_secs,
        };
        Self {
            timeout: timeout_from_secs(secs),
            poll_interval: Duration::from_millis(limits.poll_interval_ms.max(1)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs a single export; not reusable once terminal.
pub struct Exporter {
    encoder: Arc<dyn MediaEncoder>,
    monitor: Arc<MemoryMonitor>,
    settings: ExportSettings,
    state: Arc<AtomicU8>,
}

impl Exporter {
    pub fn new(
        encoder: Arc<dyn MediaEncoder>,
        monitor: Arc<MemoryMonitor>,
        settings: ExportSettings,
    ) -> Self {
        Self {
            encoder,
            monitor,
            settings,
            state: Arc::new(AtomicU8::new(ExportState::Idle as u8)),
        }
    }

    pub fn state(&self) -> ExportState {
        ExportState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Encode `job`, reporting monotonic progress in `[0, 1]`.
    ///
    /// `1.0` is reported only on completion, and nothing is reported after a
    /// terminal state.
    pub async fn export<F>(
        &self,
        job: &ExportJob,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> ReelResult<PathBuf>
    where
        F: Fn(f64) + Send + Sync,
    {
        self.state
            .compare_exchange(
                ExportState::Idle as u8,
                ExportState::Exporting as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map_err(|current| {
                ReelError::encoding(
                    RenderPhase::Export,
                    format!(
                        "exporter already used (state {:?})",
                        ExportState::from_u8(current)
                    ),
                )
            })?;

        let started = Instant::now();
        tracing::info!(
            output = %job.output.display(),
            backend = self.encoder.name(),
            timeout_secs = self.settings.timeout.as_secs_f64(),
            "Starting export"
        );

        let last = Mutex::new(0.0f64);
        let state = self.state.clone();
        let gate = |value: f64| {
            if ExportState::from_u8(state.load(Ordering::SeqCst)) != ExportState::Exporting {
                return;
            }
            let value = value.clamp(0.0, MAX_PENDING_PROGRESS);
            let Ok(mut last) = last.lock() else {
                return;
            };
            if value > *last {
                *last = value;
                on_progress(value);
            }
        };
        gate(0.0);

        let (abort_tx, abort_rx) = oneshot::channel();
        let watcher = tokio::spawn(watch(
            self.monitor.clone(),
            cancel.clone(),
            self.settings.poll_interval,
            abort_tx,
        ));

        let outcome = tokio::select! {
            result = self.encoder.export(job, &gate) => match result {
                Ok(()) => Ok(()),
                Err(e) => Err((ExportState::Failed, e)),
            },
            reason = abort_rx => {
                let reason = reason.unwrap_or(CancelReason::Requested);
                Err((
                    ExportState::Cancelled,
                    ReelError::cancelled(RenderPhase::Export, reason),
                ))
            }
            _ = tokio::time::sleep(self.settings.timeout) => Err((
                ExportState::TimedOut,
                ReelError::TimedOut {
                    limit_secs: self.settings.timeout.as_secs_f64(),
                },
            )),
        };
        watcher.abort();

        match outcome {
            Ok(()) => {
                on_progress(1.0);
                self.state
                    .store(ExportState::Completed as u8, Ordering::SeqCst);
                tracing::info!(
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Export finished"
                );
                Ok(job.output.clone())
            }
            Err((terminal, err)) => {
                self.state.store(terminal as u8, Ordering::SeqCst);
                tracing::warn!(
                    state = ?terminal,
                    error = %err,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Export did not complete"
                );
                Err(err)
            }
        }
    }
}

/// Poll memory pressure and the token until one of them fires.
async fn watch(
    monitor: Arc<MemoryMonitor>,
    cancel: CancellationToken,
    poll_interval: Duration,
    mut abort: oneshot::Sender<CancelReason>,
) {
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        // The receiver goes away when the export future is dropped.
        tokio::select! {
            _ = abort.closed() => return,
            _ = ticker.tick() => {}
        }
        if cancel.is_cancelled() {
            tracing::info!("Export cancellation requested");
            let _ = abort.send(CancelReason::Requested);
            return;
        }
        if let Some(status) = monitor.sample_blocking().await {
            if status.band == PressureBand::Critical {
                tracing::warn!(
                    used_mb = status.used_mb(),
                    "Critical memory pressure during export"
                );
                let _ = abort.send(CancelReason::MemoryPressure);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_by_mode() {
        let limits = ExportLimits::default();
        assert_eq!(
            ExportSettings::for_mode(&limits, RenderMode::Fast).timeout,
            Duration::from_secs(25)
        );
        let full = ExportSettings::for_mode(&limits, RenderMode::Full);
        assert_eq!(full.timeout, Duration::from_secs(60));
        assert_eq!(full.poll_interval, Duration::from_millis(500));
    }

    #[test]
    fn test_timeout_is_clamped() {
        assert_eq!(timeout_from_secs(1e300), Duration::from_secs(86_400));
        assert_eq!(timeout_from_secs(f64::INFINITY), Duration::from_secs(86_400));
        assert_eq!(timeout_from_secs(0.0), Duration::from_millis(1));
        assert_eq!(timeout_from_secs(f64::NAN), Duration::from_millis(1));
        assert_eq!(timeout_from_secs(2.5), Duration::from_millis(2500));

        let limits = ExportLimits {
            full_timeout_secs: 1e300,
            ..ExportLimits::default()
        };
        assert_eq!(
            ExportSettings::for_mode(&limits, RenderMode::Full).timeout,
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!ExportState::Idle.is_terminal());
        assert!(!ExportState::Exporting.is_terminal());
        for state in [
            ExportState::Completed,
            ExportState::Failed,
            ExportState::Cancelled,
            ExportState::TimedOut,
        ] {
            assert!(state.is_terminal());
            assert_eq!(ExportState::from_u8(state as u8), state);
        }
    }
}
