//! Stream lifecycle tests driven by a scripted backend.
//!
//! The scripted backend never spawns a thread: tests call
//! [`RenderPump::render`](crate::audio::RenderPump::render) themselves and so
//! play the part of the device's render thread.

mod scripted;
