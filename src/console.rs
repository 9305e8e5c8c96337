use std::io::{self, Write};
use std::time::Duration;

use chrono::{DateTime, Local};
use crossterm::cursor::MoveTo;
use crossterm::queue;
use crossterm::style::{Print, ResetColor, SetForegroundColor};
use crossterm::terminal::{Clear, ClearType};

use crate::persist::{FlushReport, PersistError};
use crate::ping::PingStatistics;
use crate::status::StatusLine;

const RULE_WIDTH: usize = 60;

/// One target's line in the status display.
#[derive(Debug, Clone)]
pub struct Row {
    pub name: String,
    pub address: String,
    pub status: StatusLine,
}

pub struct Frame<'a> {
    pub now: DateTime<Local>,
    pub interval: Duration,
    pub rows: &'a [Row],
    pub stats: &'a PingStatistics,
}

/// Full-screen status display, redrawn every sweep.
pub struct Console {
    out: Box<dyn Write + Send>,
    redraw: bool,
}

impl Console {
    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()), true)
    }

    /// `redraw` clears the screen before every frame.
    pub fn new(out: Box<dyn Write + Send>, redraw: bool) -> Self {
        Self { out, redraw }
    }

    pub fn draw(&mut self, frame: &Frame<'_>) -> io::Result<()> {
        if self.redraw {
            queue!(self.out, Clear(ClearType::All), MoveTo(0, 0))?;
        }

        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.out, "{rule}")?;
        writeln!(
            self.out,
            "  Host monitor | {} | every {}ms",
            frame.now.format("%Y-%m-%d %H:%M:%S"),
            frame.interval.as_millis()
        )?;
        writeln!(self.out, "{rule}\n")?;

        for row in frame.rows {
            queue!(
                self.out,
                Print(format!("{:<15} | {:<15} | ", row.name, row.address)),
                SetForegroundColor(row.status.tier.color()),
                Print(&row.status.text),
                ResetColor,
                Print("\n")
            )?;
        }

        let stats = frame.stats;
        writeln!(
            self.out,
            "\nprobes {} | ok {} | failed {} | loss {:.1}% | mean {:.1}ms",
            stats.total_pings,
            stats.successful_pings,
            stats.failed_pings,
            stats.loss_rate,
            stats.mean_response_time
        )?;
        self.out.flush()
    }

    pub fn message(&mut self, line: &str) -> io::Result<()> {
        writeln!(self.out, "{line}")?;
        self.out.flush()
    }
}

/// One-line summary of a flush for the status display.
pub fn flush_note(report: &FlushReport, still_buffered: usize) -> String {
    match report.failures().next() {
        None if report.written() == 0 => "✅ nothing new to save".to_string(),
        None => format!("✅ saved {} record(s) to disk", report.written()),
        Some(PersistError::Locked { path, .. }) => format!(
            "⚠️ {} is in use, {still_buffered} record(s) kept in memory",
            path.display()
        ),
        Some(err) => format!("⚠️ log write failed ({err}), {still_buffered} record(s) kept in memory"),
    }
}
