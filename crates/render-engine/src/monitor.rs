//! Memory pressure and phase timing.
//!
//! The memory figure is the resident size of this process plus any direct
//! child processes (the encoder runs as a child). Readings are classified
//! into three bands against configured thresholds; only `Critical` has an
//! effect on a render (it aborts the export).

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reelsmith_common::config::MemoryLimits;
use reelsmith_common::error::RenderPhase;
use serde::Serialize;

/// Coarse memory pressure level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureBand {
    Normal,
    Elevated,
    Critical,
}

/// A single memory reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MemoryStatus {
    pub used_bytes: u64,
    pub band: PressureBand,
}

impl MemoryStatus {
    pub fn used_mb(&self) -> f64 {
        self.used_bytes as f64 / (1024.0 * 1024.0)
    }
}

/// Classify `used_bytes` against the limits.
pub fn classify(used_bytes: u64, limits: &MemoryLimits) -> PressureBand {
    if used_bytes >= limits.critical_bytes() {
        PressureBand::Critical
    } else if used_bytes >= limits.elevated_bytes() {
        PressureBand::Elevated
    } else {
        PressureBand::Normal
    }
}

/// Source of raw memory readings.
pub trait MemoryProbe: Send + Sync {
    /// Resident bytes attributed to the render, if a reading is possible.
    fn used_bytes(&self) -> Option<u64>;
}

/// Reads resident memory of this process and its children via `sysinfo`.
pub struct SysinfoProbe {
    system: Mutex<sysinfo::System>,
    pid: Option<sysinfo::Pid>,
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let pid = sysinfo::get_current_pid()
            .map_err(|e| tracing::warn!(error = e, "Cannot resolve own pid for memory probe"))
            .ok();
        Self {
            system: Mutex::new(sysinfo::System::new()),
            pid,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryProbe for SysinfoProbe {
    fn used_bytes(&self) -> Option<u64> {
        let pid = self.pid?;
        let mut system = self.system.lock().ok()?;
        system.refresh_processes();

        let own = system.process(pid)?.memory();
        let children: u64 = system
            .processes()
            .values()
            .filter(|process| process.parent() == Some(pid))
            .map(|process| process.memory())
            .sum();
        Some(own + children)
    }
}

/// Samples a probe, classifies the result, and tracks the peak.
pub struct MemoryMonitor {
    probe: Box<dyn MemoryProbe>,
    limits: MemoryLimits,
    peak_bytes: AtomicU64,
}

impl MemoryMonitor {
    pub fn new(probe: Box<dyn MemoryProbe>, limits: MemoryLimits) -> Self {
        Self {
            probe,
            limits,
            peak_bytes: AtomicU64::new(0),
        }
    }

    /// Monitor backed by [`SysinfoProbe`].
    pub fn system(limits: MemoryLimits) -> Self {
        Self::new(Box::new(SysinfoProbe::new()), limits)
    }

    /// Take a reading. Returns `None` when the probe cannot measure.
    pub fn sample(&self) -> Option<MemoryStatus> {
        let used_bytes = self.probe.used_bytes()?;
        self.peak_bytes.fetch_max(used_bytes, Ordering::Relaxed);
        let band = classify(used_bytes, &self.limits);
        if band != PressureBand::Normal {
            tracing::debug!(used_bytes, band = ?band, "Memory pressure reading");
        }
        Some(MemoryStatus { used_bytes, band })
    }

    /// [`sample`](Self::sample) on the blocking pool; process-table scans stay off the runtime.
    pub async fn sample_blocking(self: &Arc<Self>) -> Option<MemoryStatus> {
        let monitor = Arc::clone(self);
        tokio::task::spawn_blocking(move || monitor.sample())
            .await
            .ok()
            .flatten()
    }

    /// Highest reading seen so far.
    pub fn peak_bytes(&self) -> u64 {
        self.peak_bytes.load(Ordering::Relaxed)
    }

    pub fn limits(&self) -> &MemoryLimits {
        &self.limits
    }
}

/// Wall time spent in each render phase.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PhaseTimings {
    phases: BTreeMap<RenderPhase, Duration>,
}

impl PhaseTimings {
    pub fn record(&mut self, phase: RenderPhase, elapsed: Duration) {
        *self.phases.entry(phase).or_default() += elapsed;
    }

    /// Run `f`, charging its wall time to `phase`.
    pub async fn time<F, T>(&mut self, phase: RenderPhase, f: F) -> T
    where
        F: std::future::Future<Output = T>,
    {
        let started = Instant::now();
        let out = f.await;
        self.record(phase, started.elapsed());
        out
    }

    pub fn get(&self, phase: RenderPhase) -> Duration {
        self.phases.get(&phase).copied().unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.phases.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RenderPhase, Duration)> + '_ {
        self.phases.iter().map(|(phase, d)| (*phase, *d))
    }
}
