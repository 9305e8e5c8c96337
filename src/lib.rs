//! Continuous host reachability monitor.
//!
//! Every sweep probes each target once, classifies the reply, shows it on a
//! full-screen status display and queues it for the per-day log files.

pub mod cli;
pub mod clock;
pub mod config;
pub mod console;
pub mod hosts;
pub mod log_buffer;
pub mod monitor;
pub mod os_guess;
pub mod persist;
pub mod ping;
pub mod ping_executor;
pub mod reply_parser;
pub mod status;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{AppConfig, ProbeBackend};
pub use console::Console;
pub use hosts::load_hosts;
pub use log_buffer::{LogBuffer, LogRecord};
pub use monitor::{Monitor, MonitorSettings, ShutdownReport, SweepReport};
pub use os_guess::OsGuess;
pub use persist::{DailyLog, FlushReport, Filesystem, Journal, LogSettings, MockFilesystem, PersistError, RealFilesystem};
pub use ping::{PingStatistics, ProbeOutcome, Target};
pub use ping_executor::{CommandProber, IcmpProber, Prober};
pub use status::{StatusLine, StatusRenderer, Tier};
