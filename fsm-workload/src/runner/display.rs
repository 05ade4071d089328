//! Colored terminal display for run reports.
//!
//! Provides colorized output for TTY stderr. Falls back to plain text when
//! stderr is not a terminal or `NO_COLOR` is set.

use std::io::{IsTerminal, Write};

use super::report::{RunReport, WorkerPhase};
use super::suite::SuiteReport;

// ---------------------------------------------------------------------------
// ANSI escape helpers
// ---------------------------------------------------------------------------

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const RED: &str = "\x1b[31m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BOLD_RED: &str = "\x1b[1;31m";
    pub const BOLD_GREEN: &str = "\x1b[1;32m";
    pub const BOLD_YELLOW: &str = "\x1b[1;33m";
    pub const BOLD_CYAN: &str = "\x1b[1;36m";
}

/// Whether to emit ANSI color codes.
fn use_color() -> bool {
    std::io::stderr().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

// ---------------------------------------------------------------------------
// Formatting helpers
// ---------------------------------------------------------------------------

/// Format a `u64` with comma separators.
fn fmt_num(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a duration as a human-readable string.
fn fmt_duration(d: std::time::Duration) -> String {
    let total_ms = d.as_millis();
    if total_ms < 1000 {
        format!("{}ms", total_ms)
    } else if total_ms < 60_000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        let mins = d.as_secs() / 60;
        let secs = d.as_secs() % 60;
        format!("{}m {:02}s", mins, secs)
    }
}

const RULE_WIDTH: usize = 56;

/// Print a section header like: `━━━ Title ━━━━━━━━━━━━━━━━━━━━━━`
fn section_header(w: &mut impl Write, title: &str, color: bool, style: &str) {
    let prefix = "━━━ ";
    let content_len = prefix.chars().count() + title.chars().count() + 1;
    let trail = RULE_WIDTH.saturating_sub(content_len).max(3);
    let rule = "━".repeat(trail);

    if color {
        let _ = writeln!(w, "\n{style}{prefix}{title} {rule}{}", ansi::RESET);
    } else {
        let _ = writeln!(w, "\n{prefix}{title} {rule}");
    }
}

fn phase_icon(phase: WorkerPhase, color: bool) -> &'static str {
    match (phase, color) {
        (WorkerPhase::Completed, true) => "\x1b[32m✓\x1b[0m",
        (WorkerPhase::FailedFatally, true) => "\x1b[1;31m✗\x1b[0m",
        (_, true) => "\x1b[33m○\x1b[0m",
        (WorkerPhase::Completed, false) => "✓",
        (WorkerPhase::FailedFatally, false) => "✗",
        (_, false) => "○",
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Print a run report to stderr with colors if supported.
pub fn eprint_report(report: &RunReport) {
    let color = use_color();
    let mut w = std::io::stderr().lock();
    write_report(&mut w, report, color);
}

/// Print a suite report to stderr with colors if supported.
pub fn eprint_suite_report(report: &SuiteReport) {
    let color = use_color();
    let mut w = std::io::stderr().lock();

    section_header(
        &mut w,
        &format!("Suite ({:?})", report.mode),
        color,
        ansi::BOLD_CYAN,
    );
    let failed = report.failed().count();
    let _ = writeln!(
        w,
        "  {} workload(s)   {} failed   {}",
        report.runs.len(),
        failed,
        fmt_duration(report.wall_time)
    );
    for run in &report.runs {
        write_report(&mut w, run, color);
    }
    let _ = writeln!(w);
}

fn write_report(w: &mut impl Write, report: &RunReport, color: bool) {
    section_header(
        w,
        &format!("Workload '{}'", report.workload),
        color,
        ansi::BOLD_CYAN,
    );

    let (dim, reset) = if color {
        (ansi::DIM, ansi::RESET)
    } else {
        ("", "")
    };

    if let Some(reason) = &report.skipped {
        let style = if color { ansi::BOLD_YELLOW } else { "" };
        let _ = writeln!(w, "  {style}○ skipped{reset}  {reason}");
        return;
    }

    let (icon, style) = if report.is_success() {
        ("✓ passed", ansi::BOLD_GREEN)
    } else {
        ("✗ failed", ansi::BOLD_RED)
    };
    let style = if color { style } else { "" };
    let _ = writeln!(
        w,
        "  {} workers   {} steps   {} skipped checks   {style}{icon}{reset}",
        report.workers.len(),
        fmt_num(report.total_steps()),
        fmt_num(report.skipped_checks()),
    );
    let _ = writeln!(
        w,
        "  {dim}seed={}  collection={}  ownership={:?}  {}{reset}",
        report.seed,
        report.collection,
        report.ownership,
        fmt_duration(report.wall_time),
    );
    if let Some(topology) = &report.topology {
        let _ = writeln!(
            w,
            "  {dim}topology={:?}  shards={}  routers={}  epoch={}{reset}",
            topology.kind,
            topology.shard_names.len(),
            topology.router_count,
            topology.epoch,
        );
    }

    if report.workers.len() > 1 || !report.failures.is_empty() {
        let _ = writeln!(w);
        for worker in &report.workers {
            let _ = writeln!(
                w,
                "  {}  tid {:<4} {:<10} {:>8} steps   ended in '{}'",
                phase_icon(worker.phase, color),
                worker.tid,
                worker.phase.to_string(),
                fmt_num(worker.steps),
                worker.final_state,
            );
        }
    }

    let groups = report.failure_groups();
    if !groups.is_empty() {
        section_header(w, "Failures", color, ansi::BOLD_RED);
        for group in &groups {
            let (red, bold) = if color {
                (ansi::BOLD_RED, ansi::BOLD)
            } else {
                ("", "")
            };
            let _ = writeln!(
                w,
                "  {red}✗{reset}  {bold}{}{reset}  in state '{}'  ({} worker(s))",
                group.message,
                group.state,
                group.workers.len(),
            );
            let tids: Vec<String> = group
                .workers
                .iter()
                .map(|(tid, step)| format!("{tid}@{step}"))
                .collect();
            let _ = writeln!(w, "     {dim}tid@step: {}{reset}", tids.join(", "));
        }
    }

    if let Some(err) = &report.teardown_error {
        section_header(w, "Teardown", color, ansi::BOLD_RED);
        let red = if color { ansi::RED } else { "" };
        let _ = writeln!(w, "  {red}✗{reset}  {err}");
    }

    if report.skipped_checks() > 0 && report.is_success() {
        let yellow = if color { ansi::YELLOW } else { "" };
        let _ = writeln!(
            w,
            "\n  {yellow}○{reset}  {} conditional check(s) were not enforced under {:?} ownership",
            fmt_num(report.skipped_checks()),
            report.ownership,
        );
    }
}
