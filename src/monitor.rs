//! Fixed-interval sweeps over every target.
//!
//! Each sweep probes all targets concurrently under a shared deadline. Probe
//! tasks only return results; this task alone renders them, feeds the
//! journal and flushes it once every probe of the sweep has settled.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::AppConfig;
use crate::console::{Console, Frame, Row, flush_note};
use crate::log_buffer::LogRecord;
use crate::persist::{FlushReport, Filesystem, Journal, LogSettings};
use crate::ping::{PingStatistics, ProbeOutcome, Target};
use crate::ping_executor::{DEFAULT_PROBE_TIMEOUT, Prober};
use crate::status::{DEFAULT_DEGRADED_THRESHOLD_MS, StatusRenderer};

#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub interval: Duration,
    pub probe_timeout: Duration,
    pub sweep_slack: Duration,
    /// `None` runs one probe per target at once.
    pub max_concurrent_probes: Option<usize>,
    pub degraded_threshold_ms: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            sweep_slack: Duration::from_millis(500),
            max_concurrent_probes: None,
            degraded_threshold_ms: DEFAULT_DEGRADED_THRESHOLD_MS,
        }
    }
}

impl From<&AppConfig> for MonitorSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            interval: config.interval(),
            probe_timeout: config.probe_timeout(),
            sweep_slack: config.sweep_slack(),
            max_concurrent_probes: config.max_concurrent_probes,
            degraded_threshold_ms: config.degraded_threshold_ms,
        }
    }
}

impl MonitorSettings {
    /// Number of probes allowed in flight for `targets` targets.
    pub fn lanes(&self, targets: usize) -> usize {
        let targets = targets.max(1);
        self.max_concurrent_probes.unwrap_or(targets).clamp(1, targets)
    }

    /// Time a whole sweep may take: one probe budget per wave of probes,
    /// plus slack.
    pub fn sweep_deadline(&self, targets: usize) -> Duration {
        let waves = targets.max(1).div_ceil(self.lanes(targets));
        self.probe_timeout * waves as u32 + self.sweep_slack
    }
}

/// What one sweep observed.
#[derive(Debug)]
pub struct SweepReport {
    pub rows: Vec<Row>,
    /// Set when the rollover to a new day flushed the previous day's file.
    pub rotation: Option<FlushReport>,
    pub interrupted: bool,
}

/// Final state after an interrupt.
#[derive(Debug)]
pub struct ShutdownReport {
    pub sweeps: u64,
    pub flush: FlushReport,
    /// Records that could not be saved and are lost with the process.
    pub unsaved: usize,
}

pub struct Monitor<P, C, F: Filesystem> {
    targets: Vec<Target>,
    prober: Arc<P>,
    clock: C,
    journal: Journal<F>,
    renderer: StatusRenderer,
    console: Console,
    stats: PingStatistics,
    settings: MonitorSettings,
    sweeps: u64,
}

impl<P, C, F> Monitor<P, C, F>
where
    P: Prober + 'static,
    C: Clock,
    F: Filesystem + Clone,
{
    pub fn new(
        targets: Vec<Target>,
        prober: P,
        clock: C,
        fs: F,
        log_settings: &LogSettings,
        settings: MonitorSettings,
        console: Console,
    ) -> Self {
        let journal = Journal::new(fs, log_settings, clock.now().date_naive());
        Self {
            targets,
            prober: Arc::new(prober),
            clock,
            journal,
            renderer: StatusRenderer::new(settings.degraded_threshold_ms),
            console,
            stats: PingStatistics::default(),
            settings,
            sweeps: 0,
        }
    }
}

impl<P, C, F> Monitor<P, C, F>
where
    P: Prober + 'static,
    C: Clock,
    F: Filesystem,
{
    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn journal(&self) -> &Journal<F> {
        &self.journal
    }

    pub fn stats(&self) -> &PingStatistics {
        &self.stats
    }

    /// Sweep until `shutdown` is cancelled, then flush what is left.
    pub async fn run(mut self, shutdown: CancellationToken) -> ShutdownReport {
        info!(
            "monitoring {} target(s) every {:?}, sweep deadline {:?}",
            self.targets.len(),
            self.settings.interval,
            self.settings.sweep_deadline(self.distinct_addresses())
        );

        while !shutdown.is_cancelled() {
            if self.sweep(&shutdown).await.interrupted {
                break;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }

        self.stop()
    }

    /// One full cycle: collect results, then flush them.
    pub async fn sweep(&mut self, shutdown: &CancellationToken) -> SweepReport {
        let report = self.collect(shutdown).await;
        if !report.interrupted {
            self.persist();
        }
        report
    }

    /// Roll the journal over if the day changed, probe every target and queue
    /// the rendered results. Nothing is written to disk here.
    pub async fn collect(&mut self, shutdown: &CancellationToken) -> SweepReport {
        self.sweeps += 1;
        let rotation = self.journal.rotate_if_date_changed(self.clock.now().date_naive());

        let outcomes = self.probe_all(shutdown).await;

        let mut rows = Vec::with_capacity(outcomes.len());
        for (target, outcome) in self.targets.iter().zip(outcomes) {
            let Some(outcome) = outcome else {
                continue;
            };
            let status = self.renderer.render(&outcome);
            let record = LogRecord::new(self.clock.now(), &target.name, &target.address, &status.text);
            self.journal.record(record, !outcome.is_success());
            self.stats.record(&outcome);
            rows.push(Row {
                name: target.name.clone(),
                address: target.address.clone(),
                status,
            });
        }

        let interrupted = shutdown.is_cancelled();
        if !interrupted {
            let frame = Frame {
                now: self.clock.now(),
                interval: self.settings.interval,
                rows: &rows,
                stats: &self.stats,
            };
            if let Err(e) = self.console.draw(&frame) {
                debug!("console draw failed: {e}");
            }
            if let Some(rotation) = &rotation {
                let note = format!("📅 new day, previous logs: {}", flush_note(rotation, self.journal.buffered()));
                self.say(&note);
            }
        }

        SweepReport {
            rows,
            rotation,
            interrupted,
        }
    }

    /// Flush both streams. Failures keep the records buffered for the next
    /// cycle and are noted on the console.
    pub fn persist(&mut self) -> FlushReport {
        let report = self.journal.flush();
        for err in report.failures() {
            warn!("{err}");
        }
        let note = flush_note(&report, self.journal.buffered());
        self.say(&note);
        report
    }

    /// Final best-effort flush. Consumes the monitor so it runs only once.
    pub fn stop(mut self) -> ShutdownReport {
        self.say("\n🛑 monitoring stopped");
        let pending = self.journal.buffered();
        let flush = self.journal.flush();
        let unsaved = self.journal.buffered();

        for err in flush.failures() {
            warn!("final flush: {err}");
        }
        let note = if pending == 0 {
            "✅ no cached records left to save".to_string()
        } else if unsaved == 0 {
            format!("✅ saved {pending} cached record(s) on exit")
        } else {
            format!("⚠️ could not save {unsaved} cached record(s) on exit")
        };
        self.say(&note);
        info!("stopped after {} sweep(s)", self.sweeps);

        ShutdownReport {
            sweeps: self.sweeps,
            flush,
            unsaved,
        }
    }

    fn distinct_addresses(&self) -> usize {
        let mut addresses: Vec<&str> = self.targets.iter().map(|t| t.address.as_str()).collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses.len()
    }

    fn say(&mut self, line: &str) {
        if let Err(e) = self.console.message(line) {
            debug!("console write failed: {e}");
        }
    }

    /// Probe every address at most once. Targets sharing an address share
    /// its outcome. Results come back indexed by target; `None` marks a
    /// target that was never probed because of shutdown.
    async fn probe_all(&self, shutdown: &CancellationToken) -> Vec<Option<ProbeOutcome>> {
        let mut addresses: Vec<&str> = Vec::new();
        let mut slot_of: HashMap<&str, usize> = HashMap::new();
        let slots: Vec<usize> = self
            .targets
            .iter()
            .map(|target| {
                *slot_of.entry(target.address.as_str()).or_insert_with(|| {
                    addresses.push(&target.address);
                    addresses.len() - 1
                })
            })
            .collect();

        let count = addresses.len();
        let limiter = Arc::new(Semaphore::new(self.settings.lanes(count)));
        let mut tasks = JoinSet::new();
        let mut task_slots = HashMap::with_capacity(count);

        for (slot, address) in addresses.iter().enumerate() {
            let prober = Arc::clone(&self.prober);
            let limiter = Arc::clone(&limiter);
            let shutdown = shutdown.clone();
            let address = address.to_string();
            let handle = tasks.spawn(async move {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => None,
                    outcome = async {
                        let _permit = limiter.acquire().await.ok()?;
                        if shutdown.is_cancelled() {
                            return None;
                        }
                        Some(prober.probe(&address).await)
                    } => outcome,
                }
            });
            task_slots.insert(handle.id(), slot);
        }

        let mut outcomes = vec![None; count];
        let mut settled = vec![false; count];
        let deadline = tokio::time::sleep(self.settings.sweep_deadline(count));
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                joined = tasks.join_next_with_id() => match joined {
                    Some(Ok((id, outcome))) => {
                        if let Some(&slot) = task_slots.get(&id) {
                            settled[slot] = true;
                            outcomes[slot] = outcome;
                        }
                    }
                    Some(Err(e)) => {
                        warn!("probe task failed: {e}");
                        if let Some(&slot) = task_slots.get(&e.id()) {
                            settled[slot] = true;
                            outcomes[slot] = Some(ProbeOutcome::Timeout);
                        }
                    }
                    None => break,
                },
                _ = shutdown.cancelled() => break,
                _ = &mut deadline => {
                    for (slot, _) in settled.iter().enumerate().filter(|(_, done)| !**done) {
                        debug!("{} missed the sweep deadline", addresses[slot]);
                        outcomes[slot] = Some(ProbeOutcome::Timeout);
                    }
                    break;
                }
            }
        }

        tasks.abort_all();
        slots.into_iter().map(|slot| outcomes[slot]).collect()
    }
}
