use crossterm::style::Color;

use crate::ping::ProbeOutcome;

/// Replies at or above this latency are shown as degraded.
pub const DEFAULT_DEGRADED_THRESHOLD_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Normal,
    Degraded,
    Failure,
}

impl Tier {
    pub fn color(self) -> Color {
        match self {
            Tier::Normal => Color::Green,
            Tier::Degraded => Color::Yellow,
            Tier::Failure => Color::Red,
        }
    }
}

/// Rendered status text plus the tier used to colour it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub tier: Tier,
}

#[derive(Debug, Clone, Copy)]
pub struct StatusRenderer {
    degraded_threshold_ms: u64,
}

impl Default for StatusRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_DEGRADED_THRESHOLD_MS)
    }
}

impl StatusRenderer {
    pub fn new(degraded_threshold_ms: u64) -> Self {
        Self { degraded_threshold_ms }
    }

    pub fn tier(&self, outcome: &ProbeOutcome) -> Tier {
        match outcome.latency_ms() {
            Some(latency) if latency < self.degraded_threshold_ms => Tier::Normal,
            Some(_) => Tier::Degraded,
            None => Tier::Failure,
        }
    }

    pub fn render(&self, outcome: &ProbeOutcome) -> StatusLine {
        let tier = self.tier(outcome);
        let text = match outcome {
            ProbeOutcome::DnsError => "⚠️ DNS resolution failed".to_string(),
            ProbeOutcome::HostUnreachable => "🔴 host unreachable".to_string(),
            ProbeOutcome::Timeout => "❌ packet loss".to_string(),
            ProbeOutcome::Success { latency_ms, os_guess } => {
                let marker = if tier == Tier::Normal { "🟢" } else { "🟠" };
                match os_guess.label() {
                    Some(os) => format!("{marker} {latency_ms}ms ({os})"),
                    None => format!("{marker} {latency_ms}ms"),
                }
            }
        };
        StatusLine { text, tier }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::os_guess::OsGuess;

    #[test]
    fn test_failure_texts() {
        let renderer = StatusRenderer::default();
        assert_eq!(renderer.render(&ProbeOutcome::DnsError).text, "⚠️ DNS resolution failed");
        assert_eq!(renderer.render(&ProbeOutcome::HostUnreachable).text, "🔴 host unreachable");
        assert_eq!(renderer.render(&ProbeOutcome::Timeout).text, "❌ packet loss");
        assert_eq!(renderer.render(&ProbeOutcome::Timeout).tier, Tier::Failure);
    }

    #[test]
    fn test_latency_tiers_split_at_threshold() {
        let renderer = StatusRenderer::default();
        let fast = ProbeOutcome::Success { latency_ms: 49, os_guess: OsGuess::Unknown };
        let slow = ProbeOutcome::Success { latency_ms: 50, os_guess: OsGuess::Unknown };

        assert_eq!(renderer.render(&fast), StatusLine { text: "🟢 49ms".into(), tier: Tier::Normal });
        assert_eq!(renderer.render(&slow), StatusLine { text: "🟠 50ms".into(), tier: Tier::Degraded });
    }

    #[test]
    fn test_os_guess_suffix() {
        let renderer = StatusRenderer::default();
        let outcome = ProbeOutcome::Success { latency_ms: 12, os_guess: OsGuess::Windows };
        assert_eq!(renderer.render(&outcome).text, "🟢 12ms (Windows)");
    }

    #[test]
    fn test_custom_threshold() {
        let renderer = StatusRenderer::new(10);
        let outcome = ProbeOutcome::Success { latency_ms: 12, os_guess: OsGuess::Router };
        assert_eq!(renderer.render(&outcome).tier, Tier::Degraded);
    }

    #[test]
    fn test_render_never_empty() {
        let renderer = StatusRenderer::default();
        let outcomes = [
            ProbeOutcome::DnsError,
            ProbeOutcome::HostUnreachable,
            ProbeOutcome::Timeout,
            ProbeOutcome::Success { latency_ms: 0, os_guess: OsGuess::Unknown },
            ProbeOutcome::Success { latency_ms: u64::MAX, os_guess: OsGuess::MobileOrUnixLike },
        ];
        for outcome in &outcomes {
            assert!(!renderer.render(outcome).text.is_empty());
        }
    }
}
