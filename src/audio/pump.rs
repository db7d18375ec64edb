use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::audio::buffer::{apply_volume, OutputBuffer};
use crate::audio::state::Lifecycle;
use crate::audio::stream::StreamCore;
use crate::models::{StreamParams, StreamState};

/// Render-side handle of a stream, owned by its backend endpoint.
///
/// The endpoint calls [`render`](Self::render) once per device buffer from
/// its render thread. Only one thread may render a given stream at a time.
#[derive(Clone)]
pub struct RenderPump {
    core: Arc<StreamCore>,
}

impl RenderPump {
    pub(crate) fn new(core: Arc<StreamCore>) -> Self {
        Self { core }
    }

    pub fn params(&self) -> StreamParams {
        self.core.params
    }

    pub fn latency_frames(&self) -> u32 {
        self.core.latency_frames
    }

    /// Fill `output` with up to `output.len() / frame_bytes` frames.
    ///
    /// Returns the number of valid frames at the front of `output`; the
    /// endpoint is responsible for silencing the rest. `deadline` is the time
    /// budget for this buffer, normally its playback duration.
    pub fn render(&self, output: &mut [u8], deadline: Duration) -> usize {
        let core = &self.core;

        match core.state.load() {
            Lifecycle::Started => {}
            Lifecycle::Draining => {
                // The short buffer was consumed by the previous request
                if core.state.transition(Lifecycle::Draining, Lifecycle::Drained) {
                    core.notify(StreamState::Drained);
                }
                return 0;
            }
            _ => return 0,
        }

        let mut buffer = OutputBuffer::new(output, &core.params);
        let requested = buffer.frames();
        if requested == 0 {
            return 0;
        }

        // Held until this buffer's effects are committed: a stop waits on it,
        // so nothing below can land after the stop has returned.
        let Some(mut callback) = core.try_data_callback() else {
            return 0;
        };
        // A stop may have won the race for the lock we now hold
        if core.state.load() != Lifecycle::Started {
            return 0;
        }
        let run = core.run();

        let began = Instant::now();
        let result = callback.fill(&mut buffer);
        core.record_callback(began.elapsed(), deadline);

        if core.run() != run {
            return 0;
        }
        let written = match result {
            Ok(written) => written,
            Err(e) => {
                core.error_stop(&e.to_string());
                return 0;
            }
        };

        let delivered = if written > requested {
            if core.first_overflow() {
                log::warn!(
                    "Data callback of stream '{}' reported {} frames for a {} frame request",
                    core.name, written, requested
                );
            }
            requested
        } else {
            written
        };

        let frame_bytes = buffer.frame_bytes();
        let format = buffer.format();
        apply_volume(&mut buffer.bytes_mut()[..delivered * frame_bytes], format, core.volume.get());
        core.position.advance(delivered as u64);

        if delivered < requested {
            core.state.transition(Lifecycle::Started, Lifecycle::Draining);
        }
        drop(callback);
        delivered
    }

    /// Fold a device failure reported by the endpoint into the state machine
    pub fn report_device_error(&self, message: &str) {
        self.core.logger.log_backend_error(&self.core.name, message);
        self.core.error_stop(message);
    }

    /// Whether the stream currently wants render callbacks
    pub fn is_active(&self) -> bool {
        self.core.state.load().is_running()
    }
}
