pub mod audio;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;

pub use audio::{Context, Stream, StreamMonitor};
pub use error::{AppError, AudioError, CallbackError};
pub use models::{SampleFormat, StreamParams, StreamState, StreamStats};
