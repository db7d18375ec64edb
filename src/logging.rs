use log::{debug, error, info, trace, warn};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};

use crate::models::StreamParams;

/// Environment variable selecting the log level
pub const LOG_LEVEL_ENV: &str = "ASTREAM_LOG_LEVEL";

/// Engine event for logging and debugging
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EngineEventType,
    pub duration: Option<Duration>,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEventType {
    ContextCreated,
    ContextDestroyed,
    StreamCreated,
    StreamStarted,
    StreamStopped,
    StreamDrained,
    StreamErrored,
    StreamDestroyed,
    BackendError,
    CallbackOverrun,
}

impl EngineEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineEventType::ContextCreated => "CONTEXT_CREATED",
            EngineEventType::ContextDestroyed => "CONTEXT_DESTROYED",
            EngineEventType::StreamCreated => "STREAM_CREATED",
            EngineEventType::StreamStarted => "STREAM_STARTED",
            EngineEventType::StreamStopped => "STREAM_STOPPED",
            EngineEventType::StreamDrained => "STREAM_DRAINED",
            EngineEventType::StreamErrored => "STREAM_ERRORED",
            EngineEventType::StreamDestroyed => "STREAM_DESTROYED",
            EngineEventType::BackendError => "BACKEND_ERROR",
            EngineEventType::CallbackOverrun => "CALLBACK_OVERRUN",
        }
    }
}

/// Event history shared by a context and its streams.
///
/// Streams only record events on state transitions, never per buffer, so
/// the history lock is never taken on the steady-state render path.
#[derive(Clone)]
pub struct EngineLogger {
    events: Arc<Mutex<VecDeque<EngineEvent>>>,
    max_events: usize,
}

impl EngineLogger {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::new())),
            max_events: 1000, // Keep last 1000 events
        }
    }

    /// Initialize the `log` backend. Level comes from `ASTREAM_LOG_LEVEL`.
    pub fn init() -> Result<(), Box<dyn std::error::Error>> {
        let log_level = std::env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());

        let mut builder = env_logger::Builder::new();

        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(
                buf,
                "{} [{}] [{}:{}] {}",
                chrono::Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.file().unwrap_or("unknown"),
                record.line().unwrap_or(0),
                record.args()
            )
        });

        builder.filter_level(parse_level(&log_level));
        builder.try_init()?;

        info!("Logging initialized with level: {}", log_level);
        Ok(())
    }

    fn history(&self) -> MutexGuard<'_, VecDeque<EngineEvent>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record an event and mirror it to the `log` facade
    pub fn log_event(&self, event_type: EngineEventType, details: String, duration: Option<Duration>) {
        match event_type {
            EngineEventType::ContextCreated
            | EngineEventType::ContextDestroyed
            | EngineEventType::StreamStarted
            | EngineEventType::StreamStopped
            | EngineEventType::StreamDrained => {
                info!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::StreamCreated | EngineEventType::StreamDestroyed => {
                debug!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::CallbackOverrun => {
                warn!("[{}] {}", event_type.as_str(), details);
            }
            EngineEventType::StreamErrored | EngineEventType::BackendError => {
                error!("[{}] {}", event_type.as_str(), details);
            }
        }

        let event = EngineEvent {
            timestamp: Utc::now(),
            event_type,
            duration,
            details,
        };

        let mut events = self.history();
        events.push_back(event);
        while events.len() > self.max_events {
            events.pop_front();
        }
    }

    pub fn log_context_created(&self, name: &str, backend: &str) {
        self.log_event(
            EngineEventType::ContextCreated,
            format!("Context '{}' created on backend '{}'", name, backend),
            None,
        );
    }

    pub fn log_context_destroyed(&self, name: &str) {
        self.log_event(EngineEventType::ContextDestroyed, format!("Context '{}' destroyed", name), None);
    }

    pub fn log_stream_created(&self, name: &str, params: &StreamParams, latency_frames: u32) {
        self.log_event(
            EngineEventType::StreamCreated,
            format!(
                "Stream '{}' created ({}, latency {} frames / {:.1}ms)",
                name,
                params.describe(),
                latency_frames,
                params.frames_to_duration(latency_frames as u64).as_secs_f64() * 1000.0
            ),
            None,
        );
    }

    pub fn log_stream_started(&self, name: &str) {
        self.log_event(EngineEventType::StreamStarted, format!("Stream '{}' started", name), None);
    }

    pub fn log_stream_stopped(&self, name: &str, position: u64) {
        self.log_event(
            EngineEventType::StreamStopped,
            format!("Stream '{}' stopped at frame {}", name, position),
            None,
        );
    }

    pub fn log_stream_drained(&self, name: &str, position: u64) {
        self.log_event(
            EngineEventType::StreamDrained,
            format!("Stream '{}' drained after {} frames", name, position),
            None,
        );
    }

    pub fn log_stream_errored(&self, name: &str, reason: &str) {
        self.log_event(
            EngineEventType::StreamErrored,
            format!("Stream '{}' halted: {}", name, reason),
            None,
        );
    }

    pub fn log_stream_destroyed(&self, name: &str, position: u64) {
        self.log_event(
            EngineEventType::StreamDestroyed,
            format!("Stream '{}' destroyed at frame {}", name, position),
            None,
        );
    }

    pub fn log_backend_error(&self, name: &str, error: &str) {
        self.log_event(
            EngineEventType::BackendError,
            format!("Backend error on stream '{}': {}", name, error),
            None,
        );
    }

    pub fn log_callback_overruns(&self, name: &str, overruns: u64, callbacks: u64) {
        self.log_event(
            EngineEventType::CallbackOverrun,
            format!(
                "{} of {} data callbacks of stream '{}' ran past their deadline",
                overruns, callbacks, name
            ),
            None,
        );
    }

    /// Most recent `count` events, oldest first
    pub fn get_recent_events(&self, count: usize) -> Vec<EngineEvent> {
        let events = self.history();
        let skip = events.len().saturating_sub(count);
        events.iter().skip(skip).cloned().collect()
    }

    pub fn clear_events(&self) {
        self.history().clear();
    }

    pub fn get_event_statistics(&self) -> EventStatistics {
        let events = self.history();
        let mut stats = EventStatistics::default();

        for event in events.iter() {
            match event.event_type {
                EngineEventType::StreamStarted => stats.starts += 1,
                EngineEventType::StreamStopped => stats.stops += 1,
                EngineEventType::StreamDrained => stats.drains += 1,
                EngineEventType::StreamErrored => stats.errors += 1,
                EngineEventType::BackendError => stats.backend_errors += 1,
                EngineEventType::CallbackOverrun => stats.overrun_reports += 1,
                _ => {}
            }
        }

        stats.total_events = events.len();
        stats
    }
}

impl Default for EngineLogger {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_level(level: &str) -> log::LevelFilter {
    match level.to_lowercase().as_str() {
        "trace" => log::LevelFilter::Trace,
        "debug" => log::LevelFilter::Debug,
        "info" => log::LevelFilter::Info,
        "warn" => log::LevelFilter::Warn,
        "error" => log::LevelFilter::Error,
        "off" => log::LevelFilter::Off,
        _ => log::LevelFilter::Info,
    }
}

/// Statistics about logged events
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStatistics {
    pub total_events: usize,
    pub starts: usize,
    pub stops: usize,
    pub drains: usize,
    pub errors: usize,
    pub backend_errors: usize,
    pub overrun_reports: usize,
}

/// Timer utility for measuring control operations
pub struct OperationTimer {
    start_time: Instant,
    operation_name: String,
}

impl OperationTimer {
    pub fn new(operation_name: String) -> Self {
        trace!("Starting operation: {}", operation_name);
        Self {
            start_time: Instant::now(),
            operation_name,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    pub fn finish(self) -> Duration {
        let duration = self.elapsed();
        trace!("Completed operation '{}' in {:.2}ms", self.operation_name, duration.as_secs_f64() * 1000.0);
        duration
    }

    pub fn finish_with_threshold(self, threshold: Duration) -> Duration {
        let duration = self.elapsed();
        if duration > threshold {
            warn!(
                "Operation '{}' took {:.2}ms (threshold: {:.2}ms)",
                self.operation_name,
                duration.as_secs_f64() * 1000.0,
                threshold.as_secs_f64() * 1000.0
            );
        } else {
            debug!("Completed operation '{}' in {:.2}ms", self.operation_name, duration.as_secs_f64() * 1000.0);
        }
        duration
    }
}

/// Macro for timing operations
#[macro_export]
macro_rules! time_operation {
    ($name:expr, $code:block) => {{
        let timer = $crate::logging::OperationTimer::new($name.to_string());
        let result = $code;
        let _duration = timer.finish();
        result
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SampleFormat;
    use std::thread;

    #[test]
    fn test_engine_logger_creation() {
        let logger = EngineLogger::new();
        assert_eq!(logger.max_events, 1000);
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_log_event() {
        let logger = EngineLogger::new();
        logger.log_stream_started("music");

        let events = logger.get_recent_events(1);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].details, "Stream 'music' started");
        assert_eq!(events[0].event_type, EngineEventType::StreamStarted);
    }

    #[test]
    fn test_event_history_limit() {
        let mut logger = EngineLogger::new();
        logger.max_events = 3;

        for i in 0..5 {
            logger.log_event(EngineEventType::StreamStarted, format!("Event {}", i), None);
        }

        let events = logger.get_recent_events(10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].details, "Event 2");
        assert_eq!(events[2].details, "Event 4");
    }

    #[test]
    fn test_recent_events_returns_newest_in_order() {
        let logger = EngineLogger::new();
        for i in 0..4 {
            logger.log_event(EngineEventType::StreamStopped, format!("Event {}", i), None);
        }
        let details: Vec<_> = logger.get_recent_events(2).into_iter().map(|e| e.details).collect();
        assert_eq!(details, vec!["Event 2".to_string(), "Event 3".to_string()]);
    }

    #[test]
    fn test_event_statistics() {
        let logger = EngineLogger::new();
        logger.log_stream_started("a");
        logger.log_stream_stopped("a", 10);
        logger.log_stream_started("a");
        logger.log_stream_drained("a", 20);
        logger.log_stream_errored("b", "callback error");
        logger.log_backend_error("b", "device lost");
        logger.log_stream_created("c", &StreamParams::new(SampleFormat::U8, 8000, 1), 800);

        let stats = logger.get_event_statistics();
        assert_eq!(stats.total_events, 7);
        assert_eq!(stats.starts, 2);
        assert_eq!(stats.stops, 1);
        assert_eq!(stats.drains, 1);
        assert_eq!(stats.errors, 1);
        assert_eq!(stats.backend_errors, 1);
    }

    #[test]
    fn test_clear_events() {
        let logger = EngineLogger::new();
        logger.log_context_created("ctx", "null");
        assert_eq!(logger.get_recent_events(10).len(), 1);

        logger.clear_events();
        assert!(logger.get_recent_events(10).is_empty());
    }

    #[test]
    fn test_clones_share_history() {
        let logger = EngineLogger::new();
        let clone = logger.clone();
        let handle = thread::spawn(move || clone.log_context_destroyed("ctx"));
        handle.join().unwrap();
        assert_eq!(logger.get_event_statistics().total_events, 1);
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), log::LevelFilter::Debug);
        assert_eq!(parse_level("off"), log::LevelFilter::Off);
        assert_eq!(parse_level("bogus"), log::LevelFilter::Info);
    }

    #[test]
    fn test_operation_timer() {
        let timer = OperationTimer::new("test_operation".to_string());
        thread::sleep(Duration::from_millis(10));
        let duration = timer.finish();
        assert!(duration >= Duration::from_millis(10));
    }

    #[test]
    fn test_time_operation_macro_returns_value() {
        let value = crate::time_operation!("compute", { 40 + 2 });
        assert_eq!(value, 42);
    }
}
