//! Terminal status view.
//!
//! Redrawn after every sample and upload completion: the latest reading
//! per metric with a trend arrow and sparkline, the upload schedule, the
//! display state and a truecolor copy of the LED matrix.

use std::fmt::Write as _;
use std::io::{self, Write};

use chrono::Local;
use embassy_time::Instant;
use embedded_graphics::prelude::RgbColor;
use log::debug;

use sensemon_core::display::{LedFrame, MATRIX_SIZE};
use sensemon_core::run_loop::{LoopObserver, Snapshot};
use sensemon_core::sensors::MetricHistory;
use sensemon_core::upload::{UploadCompletion, UploadPhase};
use sensemon_core::{APP_NAME, Metric};

const SPARK_BLOCKS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const SPARK_WIDTH: usize = 40;

/// Changes smaller than this fraction of the previous value read as flat.
const DELTA_FACTOR: f32 = 0.02;

const RULE: &str = "────────────────────────────────────────────────────────────────";
const RESET: &str = "\x1b[0m";
const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Rising,
    Falling,
    Flat,
}

impl Trend {
    pub fn between(previous: f32, latest: f32) -> Self {
        let delta = latest - previous;
        if delta.abs() <= previous.abs() * DELTA_FACTOR {
            Self::Flat
        } else if delta > 0.0 {
            Self::Rising
        } else {
            Self::Falling
        }
    }

    const fn arrow(self) -> char {
        match self {
            Self::Rising => '↑',
            Self::Falling => '↓',
            Self::Flat => '↔',
        }
    }
}

/// One block per value, scaled to the min/max of `values`.
pub fn sparkline(values: &[f32]) -> String {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(*v), hi.max(*v)));
    let span = max - min;
    values
        .iter()
        .map(|v| {
            if span <= f32::EPSILON {
                SPARK_BLOCKS[SPARK_BLOCKS.len() / 2]
            } else {
                let level = ((v - min) / span * (SPARK_BLOCKS.len() - 1) as f32).round() as usize;
                SPARK_BLOCKS[level.min(SPARK_BLOCKS.len() - 1)]
            }
        })
        .collect()
}

/// `1h 05m`, `4m 10s` or `9s`.
pub fn format_secs(secs: u64) -> String {
    match secs {
        s if s >= 3600 => format!("{}h {:02}m", s / 3600, (s % 3600) / 60),
        s if s >= 60 => format!("{}m {:02}s", s / 60, s % 60),
        s => format!("{s}s"),
    }
}

fn secs_between(earlier: Instant, later: Instant) -> u64 {
    later.saturating_duration_since(earlier).as_secs()
}

fn metric_line(out: &mut String, metric: Metric, history: &MetricHistory, rounding: u8) {
    let Some(latest) = history.latest() else {
        let _ = writeln!(out, "{:<12} {:>10}", metric.label(), "--");
        return;
    };
    let trend = history
        .previous()
        .map_or(Trend::Flat, |prev| Trend::between(prev.value, latest.value));
    let values: Vec<f32> = history.recent(SPARK_WIDTH).map(|r| r.value).collect();
    let marker = if latest.synthetic { " (sim)" } else { "" };
    let _ = writeln!(
        out,
        "{:<12} {:>10.prec$} {:<4} {}  {}{}",
        metric.label(),
        latest.rounded(rounding),
        latest.unit.symbol(),
        trend.arrow(),
        sparkline(&values),
        marker,
        prec = usize::from(rounding),
    );
}

fn upload_line(out: &mut String, metric: Metric, snapshot: &Snapshot<'_>) {
    let uploads = snapshot.uploads;
    let target = uploads.target(metric);
    let state = uploads.state(metric);
    let status = if !target.enabled {
        String::from("disabled")
    } else {
        match state.phase {
            UploadPhase::Sending => String::from("sending"),
            UploadPhase::Backoff => match state.backoff_until {
                Some(until) => format!("throttled, {} left", format_secs(secs_between(snapshot.now, until))),
                None => String::from("throttled"),
            },
            UploadPhase::Idle => match state.last_success {
                Some(at) => format!("ok {} ago", format_secs(secs_between(at, snapshot.now))),
                None if state.failures > 0 => format!("{} failed", state.failures),
                None => String::from("waiting"),
            },
        }
    };
    let _ = writeln!(
        out,
        "  {:<12} {:<28} {} ok / {} failed",
        metric.label(),
        status,
        state.successes,
        state.failures
    );
}

fn frame_lines(out: &mut String, frame: &LedFrame) {
    for row in frame.pixels().chunks(MATRIX_SIZE) {
        out.push_str("  ");
        for pixel in row {
            let _ = write!(out, "\x1b[38;2;{};{};{}m██", pixel.r(), pixel.g(), pixel.b());
        }
        out.push_str(RESET);
        out.push('\n');
    }
}

/// Full screen contents for `snapshot`, without the clear sequence.
pub fn render(snapshot: &Snapshot<'_>, clock: &str) -> String {
    let mut out = String::new();
    let uptime = secs_between(snapshot.started_at, snapshot.now);
    let _ = writeln!(
        out,
        "{APP_NAME} v{}    {clock}    up {}",
        env!("CARGO_PKG_VERSION"),
        format_secs(uptime)
    );
    out.push_str(RULE);
    out.push('\n');

    for metric in Metric::ALL {
        metric_line(&mut out, metric, snapshot.history(metric), snapshot.rounding);
    }
    out.push_str(RULE);
    out.push('\n');

    let uploads = snapshot.uploads;
    let next = match uploads.next_due() {
        Some(at) => format_secs(secs_between(snapshot.now, at)),
        None if uploads.enabled_count() == 0 => String::from("off"),
        None => String::from("-"),
    };
    let _ = writeln!(out, "Uploads: {} cycles, next in {next}", uploads.cycles());
    for metric in Metric::ALL {
        upload_line(&mut out, metric, snapshot);
    }
    out.push_str(RULE);
    out.push('\n');

    let display = snapshot.display;
    let power = match (display.powered, display.blanked) {
        (false, _) => "off",
        (true, true) => "asleep",
        (true, false) => "on",
    };
    let _ = writeln!(
        out,
        "Display: {} / {}° / {power}",
        display.mode.name(),
        display.rotation.degrees()
    );
    frame_lines(&mut out, snapshot.frame);
    out
}

fn repaint(out: &mut impl Write, screen: &str) -> io::Result<()> {
    out.write_all(CLEAR_SCREEN.as_bytes())?;
    out.write_all(screen.as_bytes())?;
    out.flush()
}

/// [`LoopObserver`] that repaints the terminal.
pub struct Console {
    out: io::Stdout,
}

impl Console {
    pub fn new() -> Self {
        Self { out: io::stdout() }
    }

    fn paint(&mut self, snapshot: &Snapshot<'_>) {
        let clock = Local::now().format("%H:%M:%S").to_string();
        let screen = render(snapshot, &clock);
        if let Err(err) = repaint(&mut self.out.lock(), &screen) {
            debug!("Console write failed: {err}");
        }
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopObserver for Console {
    fn on_sample(&mut self, snapshot: &Snapshot<'_>) {
        self.paint(snapshot);
    }

    fn on_upload(&mut self, _completion: &UploadCompletion, snapshot: &Snapshot<'_>) {
        self.paint(snapshot);
    }
}
