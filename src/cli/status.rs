use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::audio::{PositionUpdate, StreamMonitor};
use crate::error::AppError;
use crate::models::{StreamState, StreamStats};

/// How often the status line is refreshed while a stream plays
pub const STATUS_INTERVAL: Duration = Duration::from_millis(100);

/// Single-line playback status formatter for the CLI
pub struct StatusLine;

impl StatusLine {
    /// Compact status, e.g. "▶ tone | 00:01 / 00:03 [████░░░░] 33% | vol 80%"
    pub fn format(name: &str, update: &PositionUpdate, volume: f32) -> String {
        let mut line = format!(
            "{} {} | {}",
            Self::format_state(update.state),
            Self::truncate(name, 24),
            Self::format_duration(update.position)
        );

        if let (Some(progress), Some(remaining)) = (update.progress, update.remaining) {
            line.push_str(&format!(
                " / {} [{}] {}%",
                Self::format_duration(update.position + remaining),
                Self::create_progress_bar(progress, 20),
                (progress * 100.0) as u8
            ));
        }

        line.push_str(&format!(" | vol {}%", (volume * 100.0).round() as u8));
        line
    }

    /// Summary printed once a stream has finished
    pub fn format_summary(name: &str, state: Option<StreamState>, stats: &StreamStats, position: Duration) -> String {
        let outcome = match state {
            Some(StreamState::Drained) => "finished",
            Some(StreamState::Stopped) if stats.errored => "halted by an error",
            Some(StreamState::Stopped) => "stopped",
            Some(StreamState::Started) => "still playing",
            None => "never started",
        };
        let mut summary = format!(
            "{}: {} after {} ({} frames, {} callbacks)",
            name,
            outcome,
            Self::format_duration(position),
            stats.frames_delivered,
            stats.callbacks
        );
        if stats.overruns > 0 {
            summary.push_str(&format!(", {} late callbacks", stats.overruns));
        }
        summary
    }

    pub fn format_state(state: Option<StreamState>) -> &'static str {
        match state {
            Some(StreamState::Started) => "▶",
            Some(StreamState::Stopped) => "⏹",
            Some(StreamState::Drained) => "✓",
            None => "·",
        }
    }

    /// Format duration as MM:SS or HH:MM:SS for longer streams
    pub fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
        } else {
            format!("{:02}:{:02}", minutes, seconds)
        }
    }

    pub fn create_progress_bar(progress: f32, width: usize) -> String {
        let filled = ((progress.clamp(0.0, 1.0) * width as f32) as usize).min(width);
        format!("{}{}", "█".repeat(filled), "░".repeat(width - filled))
    }

    /// Truncate to `max_len` characters, marking the cut with an ellipsis
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len || max_len <= 3 {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len - 3).collect();
            format!("{}...", kept)
        }
    }

    pub fn display_error(error: &AppError) {
        for line in Self::format_error(error) {
            eprintln!("{}", line);
        }
    }

    pub fn format_error(error: &AppError) -> Vec<String> {
        let mut lines = vec![format!("Error [{}]: {}", error.severity().as_str(), error.user_message())];
        lines.extend(error.recovery_suggestions().into_iter().map(|s| format!("  • {}", s)));
        if error.is_recoverable() {
            lines.push("  • Run the command again once the problem is fixed".to_string());
        }
        lines
    }
}

/// Refresh a status line every [`STATUS_INTERVAL`] until the stream stops
/// running or `interrupted` is set. Returns the last observed state.
pub async fn watch<W: Write>(
    monitor: StreamMonitor,
    total_frames: Option<u64>,
    interrupted: Arc<AtomicBool>,
    mut out: W,
) -> Option<StreamState> {
    let mut interval = tokio::time::interval(STATUS_INTERVAL);

    loop {
        interval.tick().await;

        let update = monitor.position_update(total_frames);
        let line = StatusLine::format(monitor.name(), &update, monitor.volume());
        // Status output is best effort
        let _ = write!(out, "\r{}\x1b[K", line);
        let _ = out.flush();

        if interrupted.load(Ordering::Relaxed) || !monitor.lifecycle().is_running() {
            let _ = writeln!(out);
            return update.state;
        }
    }
}
