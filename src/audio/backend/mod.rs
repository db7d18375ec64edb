//! Platform endpoints the render pump is driven by.
//!
//! A backend opens one [`OutputEndpoint`] per stream. The endpoint owns the
//! render thread: while started it repeatedly hands the stream's
//! [`RenderPump`] a buffer of N frames, takes back 0..=N valid frames and
//! fills the rest with silence itself.

pub mod cpal_backend;
pub mod null;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::audio::pump::RenderPump;
use crate::error::AudioError;
use crate::models::StreamParams;

/// Process-wide audio subsystem shared by every stream of a context
pub trait AudioBackend: Send + Sync {
    /// Short identifier, e.g. "cpal" or "null"
    fn id(&self) -> &'static str;

    /// Check that the backend can currently drive an output device
    fn check_available(&self) -> Result<(), AudioError>;

    /// Maximum channel count the output device accepts
    fn max_channel_count(&self) -> Result<u16, AudioError>;

    /// Sample rate the output device prefers
    fn preferred_sample_rate(&self) -> Result<u32, AudioError>;

    /// Smallest latency in frames the backend can honor for `params`
    fn min_latency(&self, params: &StreamParams) -> Result<u32, AudioError>;

    /// Check that the device accepts `params` exactly.
    ///
    /// Returns `AudioError::InvalidFormat` if it does not. Called before any
    /// endpoint is opened.
    fn check_format(&self, params: &StreamParams) -> Result<(), AudioError>;

    /// Open an endpoint that will drive `pump` once started
    fn open_output(
        &self,
        name: &str,
        params: &StreamParams,
        latency_frames: u32,
        pump: RenderPump,
    ) -> Result<Box<dyn OutputEndpoint>, AudioError>;
}

/// One opened output endpoint. Dropping it releases the endpoint and joins
/// any thread it owns.
pub trait OutputEndpoint: Send {
    /// Begin scheduling render callbacks. Returns once scheduling is accepted.
    fn start(&mut self) -> Result<(), AudioError>;

    /// Halt render callbacks. No-op if not started.
    fn stop(&mut self) -> Result<(), AudioError>;
}

/// Raise the calling render thread's scheduling priority where supported
pub(crate) fn raise_render_priority() {
    #[cfg(target_os = "macos")]
    unsafe {
        let thread = libc::pthread_self();
        let mut policy: libc::c_int = 0;
        let mut param: libc::sched_param = std::mem::zeroed();

        if libc::pthread_getschedparam(thread, &mut policy, &mut param) == 0 {
            param.sched_priority = 63;
            if libc::pthread_setschedparam(thread, libc::SCHED_FIFO, &param) != 0 {
                log::debug!("Could not raise render thread priority");
            }
        }
    }
}

/// Backends selectable from configuration and the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Cpal,
    Null,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Cpal => "cpal",
            BackendKind::Null => "null",
        }
    }

    /// Instantiate the backend, selecting `device` when given
    pub fn create(&self, device: Option<&str>) -> Result<Arc<dyn AudioBackend>, AudioError> {
        match self {
            BackendKind::Cpal => {
                let backend = match device {
                    Some(name) => cpal_backend::CpalBackend::with_device(name)?,
                    None => cpal_backend::CpalBackend::new()?,
                };
                Ok(Arc::new(backend))
            }
            BackendKind::Null => Ok(Arc::new(null::NullBackend::new())),
        }
    }
}

impl Default for BackendKind {
    fn default() -> Self {
        BackendKind::Cpal
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "cpal" => Ok(BackendKind::Cpal),
            "null" | "none" => Ok(BackendKind::Null),
            other => Err(format!("unknown backend '{}' (expected cpal or null)", other)),
        }
    }
}
