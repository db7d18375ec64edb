pub mod backend;
pub mod buffer;
pub mod context;
pub mod device;
pub mod position;
pub mod pump;
pub mod state;
pub mod stream;

#[cfg(test)]
pub mod tests;

use crate::error::CallbackError;
use crate::models::StreamState;

pub use backend::{AudioBackend, BackendKind, OutputEndpoint};
pub use backend::cpal_backend::CpalBackend;
pub use backend::null::NullBackend;
pub use buffer::{OutputBuffer, ShadowBuffer};
pub use context::Context;
pub use device::{DeviceCapabilities, DeviceManager};
pub use position::{FrameCounter, PositionUpdate, VolumeControl};
pub use pump::RenderPump;
pub use state::Lifecycle;
pub use stream::{Stream, StreamMonitor};

/// Lower bound on the latency a stream may request, in frames
pub const MIN_LATENCY_FRAMES: u32 = 1;
/// Upper bound on the latency a stream may request, in frames
pub const MAX_LATENCY_FRAMES: u32 = 96_000;
pub const MAX_CHANNELS: u16 = 32;
pub const MAX_SAMPLE_RATE: u32 = 768_000;

/// Producer of audio frames, invoked on the backend's render thread.
///
/// Must write `0..=buffer.frames()` frames and return how many it wrote.
/// Returning fewer than requested ends the stream (it drains); returning
/// `Err` halts it immediately. Must not block.
pub trait DataCallback: Send {
    fn fill(&mut self, buffer: &mut OutputBuffer<'_>) -> Result<usize, CallbackError>;
}

impl<F> DataCallback for F
where
    F: FnMut(&mut OutputBuffer<'_>) -> Result<usize, CallbackError> + Send,
{
    fn fill(&mut self, buffer: &mut OutputBuffer<'_>) -> Result<usize, CallbackError> {
        self(buffer)
    }
}

/// Receiver of stream state changes. The return value is advisory only.
pub trait StateCallback: Send {
    fn on_state(&mut self, state: StreamState) -> Result<(), CallbackError>;
}

impl<F> StateCallback for F
where
    F: FnMut(StreamState) -> Result<(), CallbackError> + Send,
{
    fn on_state(&mut self, state: StreamState) -> Result<(), CallbackError> {
        self(state)
    }
}
