use std::borrow::Cow;
use std::net::IpAddr;
use std::process::Stdio;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use surge_ping::{Client, Config, ICMP, IcmpPacket, PingIdentifier, PingSequence};
use thiserror::Error;
use tokio::process::Command;

use crate::os_guess::OsGuess;
use crate::ping::ProbeOutcome;
use crate::reply_parser::{EchoReply, ReplyParser};

pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(1500);
pub const DEFAULT_PING_WAIT: Duration = Duration::from_millis(1000);

/// Why a probe did not produce a reply.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("could not resolve {0}")]
    Resolution(String),

    #[error("no reply from target")]
    Unreachable,

    #[error("probe failed: {0}")]
    Execution(String),

    #[error("probe exceeded its {0:?} budget")]
    Budget(Duration),
}

impl From<Result<EchoReply, ProbeError>> for ProbeOutcome {
    fn from(result: Result<EchoReply, ProbeError>) -> Self {
        match result {
            Ok(reply) => ProbeOutcome::Success {
                latency_ms: reply.latency_ms,
                os_guess: OsGuess::from_optional_ttl(reply.ttl),
            },
            Err(ProbeError::Resolution(_)) => ProbeOutcome::DnsError,
            Err(ProbeError::Unreachable) => ProbeOutcome::HostUnreachable,
            Err(ProbeError::Execution(_)) | Err(ProbeError::Budget(_)) => ProbeOutcome::Timeout,
        }
    }
}

/// One reachability measurement against a single address.
///
/// Implementations never fail: every problem is folded into the outcome.
#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, address: &str) -> ProbeOutcome;
}

/// Sanitize hostname by keeping only valid characters (alphanumeric, dots, hyphens)
/// Returns None if the result is empty
fn sanitize_hostname(hostname: &str) -> Option<String> {
    // Also handle case where user included port like "example.com:8080"
    let hostname = hostname.split(':').next().unwrap_or(hostname);

    let sanitized: String = hostname
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '.' || *c == '-')
        .collect();

    if sanitized.is_empty() {
        None
    } else {
        Some(sanitized)
    }
}

/// Resolve an address or hostname to an IP address
pub async fn resolve_target(target: &str) -> Result<IpAddr, ProbeError> {
    let target = target.trim();
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(ip);
    }

    let sanitized =
        sanitize_hostname(target).ok_or_else(|| ProbeError::Resolution(target.to_string()))?;

    match tokio::net::lookup_host((sanitized.as_str(), 0)).await {
        Ok(mut addrs) => addrs
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| ProbeError::Resolution(target.to_string())),
        Err(e) => {
            debug!("resolution of {target} failed: {e}");
            Err(ProbeError::Resolution(target.to_string()))
        }
    }
}

/// Probes by running the system `ping` command once and parsing its output.
#[derive(Debug, Clone)]
pub struct CommandProber {
    program: String,
    wait: Duration,
    budget: Duration,
    parser: ReplyParser,
}

impl Default for CommandProber {
    fn default() -> Self {
        Self::new(ReplyParser::default(), DEFAULT_PING_WAIT, DEFAULT_PROBE_TIMEOUT)
    }
}

impl CommandProber {
    pub fn new(parser: ReplyParser, wait: Duration, budget: Duration) -> Self {
        Self {
            program: "ping".to_string(),
            wait,
            budget,
            parser,
        }
    }

    /// Use another executable in place of `ping`.
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn ping_args(&self, ip: IpAddr) -> Vec<String> {
        let wait_ms = self.wait.as_millis().max(1);
        let mut args: Vec<String> = if cfg!(target_os = "windows") {
            vec!["-n".into(), "1".into(), "-w".into(), wait_ms.to_string()]
        } else if cfg!(target_os = "macos") {
            vec!["-c".into(), "1".into(), "-W".into(), wait_ms.to_string()]
        } else {
            // iputils takes whole seconds.
            let wait_secs = self.wait.as_secs().max(1);
            vec!["-c".into(), "1".into(), "-W".into(), wait_secs.to_string()]
        };
        args.push(ip.to_string());
        args
    }

    async fn run(&self, address: &str) -> Result<EchoReply, ProbeError> {
        let ip = resolve_target(address).await?;

        let output = Command::new(&self.program)
            .args(self.ping_args(ip))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ProbeError::Execution(format!("{}: {e}", self.program)))?;

        if !output.status.success() {
            return Err(ProbeError::Execution(format!("{} exited with {}", self.program, output.status)));
        }

        let stdout = decode_output(&output.stdout);
        self.parser.parse(&stdout).ok_or(ProbeError::Unreachable)
    }
}

/// Ping output as text. Output that is not UTF-8 is read as GBK, the code
/// page Chinese-locale Windows consoles write in.
fn decode_output(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            let (text, had_errors) = encoding_rs::GBK.decode_without_bom_handling(bytes);
            if had_errors {
                debug!("ping output is neither UTF-8 nor GBK, undecodable bytes replaced");
            }
            text
        }
    }
}

#[async_trait]
impl Prober for CommandProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let result = match tokio::time::timeout(self.budget, self.run(address)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Budget(self.budget)),
        };
        if let Err(e) = &result {
            debug!("probe of {address}: {e}");
        }
        result.into()
    }
}

/// Probes with a raw ICMP echo request through `surge-ping`.
pub struct IcmpProber {
    v4: Client,
    v6: Option<Client>,
    wait: Duration,
    budget: Duration,
    next_identifier: AtomicU16,
}

impl IcmpProber {
    pub fn new(wait: Duration, budget: Duration) -> std::io::Result<Self> {
        let v4 = Client::new(&Config::default())?;
        let v6 = match Client::new(&Config::builder().kind(ICMP::V6).build()) {
            Ok(client) => Some(client),
            Err(e) => {
                debug!("IPv6 ICMP socket unavailable: {e}");
                None
            }
        };
        Ok(Self {
            v4,
            v6,
            wait,
            budget,
            next_identifier: AtomicU16::new(1),
        })
    }

    async fn run(&self, address: &str) -> Result<EchoReply, ProbeError> {
        let ip = resolve_target(address).await?;
        let client = match ip {
            IpAddr::V4(_) => &self.v4,
            IpAddr::V6(_) => self
                .v6
                .as_ref()
                .ok_or_else(|| ProbeError::Execution("no IPv6 ICMP socket".to_string()))?,
        };

        let identifier = self.next_identifier.fetch_add(1, Ordering::Relaxed);
        let mut pinger = client.pinger(ip, PingIdentifier(identifier)).await;
        pinger.timeout(self.wait);

        match pinger.ping(PingSequence(0), &[0; 56]).await {
            Ok((packet, rtt)) => {
                let ttl = match packet {
                    // Depending on the socket type surge-ping may not see the IP header.
                    IcmpPacket::V4(reply) => Option::<u8>::from(reply.get_ttl()),
                    IcmpPacket::V6(_) => None,
                };
                Ok(EchoReply {
                    latency_ms: (rtt.as_secs_f64() * 1000.0).round() as u64,
                    ttl,
                })
            }
            Err(e) => Err(ProbeError::Execution(e.to_string())),
        }
    }
}

#[async_trait]
impl Prober for IcmpProber {
    async fn probe(&self, address: &str) -> ProbeOutcome {
        let result = match tokio::time::timeout(self.budget, self.run(address)).await {
            Ok(result) => result,
            Err(_) => Err(ProbeError::Budget(self.budget)),
        };
        if let Err(e) = &result {
            debug!("icmp probe of {address}: {e}");
        }
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_hostname() {
        assert_eq!(sanitize_hostname("example.com:8080"), Some("example.com".to_string()));
        assert_eq!(sanitize_hostname("exa mple.com"), Some("example.com".to_string()));
        assert_eq!(sanitize_hostname("!!!"), None);
    }

    #[tokio::test]
    async fn test_resolve_ip_literal() {
        assert_eq!(resolve_target("10.0.0.1").await.unwrap(), "10.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(resolve_target(" ::1 ").await.unwrap(), "::1".parse::<IpAddr>().unwrap());
    }

    #[tokio::test]
    async fn test_resolve_garbage_is_resolution_error() {
        assert!(matches!(resolve_target("???").await, Err(ProbeError::Resolution(_))));
    }

    #[test]
    fn test_error_taxonomy_maps_to_outcomes() {
        let outcome: ProbeOutcome = Err(ProbeError::Resolution("x".into())).into();
        assert_eq!(outcome, ProbeOutcome::DnsError);
        let outcome: ProbeOutcome = Err(ProbeError::Unreachable).into();
        assert_eq!(outcome, ProbeOutcome::HostUnreachable);
        let outcome: ProbeOutcome = Err(ProbeError::Execution("boom".into())).into();
        assert_eq!(outcome, ProbeOutcome::Timeout);
        let outcome: ProbeOutcome = Err(ProbeError::Budget(DEFAULT_PROBE_TIMEOUT)).into();
        assert_eq!(outcome, ProbeOutcome::Timeout);
    }

    #[test]
    fn test_reply_maps_to_success_with_guess() {
        let outcome: ProbeOutcome = Ok(EchoReply { latency_ms: 12, ttl: Some(124) }).into();
        assert_eq!(outcome, ProbeOutcome::Success { latency_ms: 12, os_guess: OsGuess::Windows });
        let outcome: ProbeOutcome = Ok(EchoReply { latency_ms: 1, ttl: None }).into();
        assert_eq!(outcome, ProbeOutcome::Success { latency_ms: 1, os_guess: OsGuess::Unknown });
    }

    #[tokio::test]
    async fn test_missing_program_is_timeout() {
        let prober = CommandProber::default().with_program("definitely-not-a-ping-binary");
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::Timeout);
    }

    #[tokio::test]
    async fn test_unresolvable_address_is_dns_error() {
        let prober = CommandProber::default().with_program("definitely-not-a-ping-binary");
        assert_eq!(prober.probe("%%%").await, ProbeOutcome::DnsError);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_clean_exit_without_reply_is_unreachable() {
        let prober = CommandProber::default().with_program("true");
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::HostUnreachable);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failed_exit_is_timeout() {
        let prober = CommandProber::default().with_program("false");
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::Timeout);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_budget_overrun_is_timeout() {
        let prober = CommandProber::new(
            ReplyParser::default(),
            Duration::from_secs(5),
            Duration::from_millis(100),
        )
        .with_program("sleep");
        // `sleep -c 1 -W 5 127.0.0.1` fails fast on bad args or is killed by the budget.
        assert_eq!(prober.probe("127.0.0.1").await, ProbeOutcome::Timeout);
    }

    #[test]
    fn test_decode_output() {
        assert_eq!(decode_output(b"time=4ms"), "time=4ms");

        let (gbk, _, _) = encoding_rs::GBK.encode("字节=32 时间=4ms");
        assert!(std::str::from_utf8(&gbk).is_err());
        assert_eq!(decode_output(&gbk), "字节=32 时间=4ms");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gbk_reply_is_parsed() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let reply = dir.path().join("reply.txt");
        let (gbk, _, _) = encoding_rs::GBK.encode("来自 10.0.0.1 的回复: 字节=32 时间=4ms TTL=64\r\n");
        std::fs::write(&reply, &gbk).unwrap();

        let script = dir.path().join("fake_ping.sh");
        std::fs::write(&script, format!("#!/bin/sh\ncat '{}'\n", reply.display())).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let prober = CommandProber::default().with_program(script.to_string_lossy());
        assert_eq!(
            prober.probe("127.0.0.1").await,
            ProbeOutcome::Success { latency_ms: 4, os_guess: OsGuess::MobileOrUnixLike }
        );
    }

    #[test]
    fn test_ping_args_single_probe() {
        let prober = CommandProber::default();
        let args = prober.ping_args("10.0.0.1".parse().unwrap());
        assert_eq!(args.last().map(String::as_str), Some("10.0.0.1"));
        assert!(args.iter().any(|a| a == "1"));
    }
}
