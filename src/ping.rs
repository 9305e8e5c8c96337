use std::fmt;

use crate::os_guess::OsGuess;

/// A named endpoint to monitor. Identity is the address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub name: String,
    pub address: String,
}

impl Target {
    /// Builds a target, falling back to the address when no name is given.
    pub fn new(name: Option<&str>, address: &str) -> Self {
        let address = address.trim().to_string();
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => address.clone(),
        };
        Self { name, address }
    }
}

/// Classified result of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeOutcome {
    Success { latency_ms: u64, os_guess: OsGuess },
    DnsError,
    /// The probe ran cleanly but the target never answered.
    HostUnreachable,
    /// Timed out, or the probe could not be run or interpreted at all.
    Timeout,
}

impl ProbeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProbeOutcome::Success { .. })
    }

    pub fn latency_ms(&self) -> Option<u64> {
        match self {
            ProbeOutcome::Success { latency_ms, .. } => Some(*latency_ms),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeOutcome::Success { latency_ms, os_guess } => {
                write!(f, "success {latency_ms}ms ({os_guess:?})")
            }
            ProbeOutcome::DnsError => f.write_str("dns error"),
            ProbeOutcome::HostUnreachable => f.write_str("host unreachable"),
            ProbeOutcome::Timeout => f.write_str("timeout"),
        }
    }
}

/// Aggregate counters over every probe of the session.
#[derive(Debug, Clone, Default)]
pub struct PingStatistics {
    pub total_pings: u64,
    pub successful_pings: u64,
    pub failed_pings: u64,
    pub total_response_time: u64,
    pub loss_rate: f64,
    pub mean_response_time: f64,
}

impl PingStatistics {
    pub fn record(&mut self, outcome: &ProbeOutcome) {
        self.total_pings += 1;
        match outcome.latency_ms() {
            Some(latency) => {
                self.successful_pings += 1;
                self.total_response_time += latency;
            }
            None => self.failed_pings += 1,
        }

        self.loss_rate = (self.failed_pings as f64 / self.total_pings as f64) * 100.0;
        self.mean_response_time = if self.successful_pings > 0 {
            self.total_response_time as f64 / self.successful_pings as f64
        } else {
            0.0
        };
    }
}
