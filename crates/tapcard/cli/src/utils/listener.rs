use std::io::Write;

use colored::Colorize;
use nexum_tapcard::{DelayDisplay, TaskError, TaskListener, TaskReport};

/// Prints task progress and security delay countdowns to stderr
#[derive(Debug, Default)]
pub struct ConsoleListener;

impl TaskListener for ConsoleListener {
    fn on_progress(&self, percent: u8) {
        eprintln!("{}", progress_line(percent).dimmed());
    }

    fn on_security_delay(&self, _remaining_ms: u32, display: DelayDisplay) {
        if let Some(line) = countdown_line(display) {
            eprint!("\r{}", line.yellow());
            let _ = std::io::stderr().flush();
        }
    }

    fn on_completed(&self, _report: &TaskReport) {
        eprintln!();
    }

    fn on_failed(&self, error: &TaskError) {
        eprintln!("\n{} {error}", "Task failed:".red().bold());
    }

    fn on_cancelled(&self) {
        eprintln!("\n{}", "Task cancelled".yellow());
    }
}

fn progress_line(percent: u8) -> String {
    format!("[{percent:>3}%]")
}

/// Countdown text, rounded up to whole seconds
fn countdown_line(display: DelayDisplay) -> Option<String> {
    match display {
        DelayDisplay::Hidden => None,
        DelayDisplay::Countdown(ms) => {
            Some(format!("Security delay, keep the card on the reader: {:>3}s", ms.div_ceil(1000)))
        }
    }
}
