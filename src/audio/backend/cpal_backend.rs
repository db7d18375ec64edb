use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{BufferSize, SampleRate, StreamConfig};
use log::{debug, info, warn};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use super::{raise_render_priority, AudioBackend, OutputEndpoint};
use crate::audio::buffer::{fill_silence, PcmSample, ShadowBuffer};
use crate::audio::device::{self, DeviceCapabilities, DeviceManager};
use crate::audio::pump::RenderPump;
use crate::error::AudioError;
use crate::models::{SampleFormat, StreamParams};

/// Output through the platform's default cpal host.
///
/// cpal streams are not `Send` on every platform, so each endpoint builds and
/// owns its stream on a dedicated `audio-output` thread and is driven through
/// a command channel.
pub struct CpalBackend {
    device_name: String,
    explicit: bool,
}

impl CpalBackend {
    /// Use the host's default output device
    pub fn new() -> Result<Self, AudioError> {
        let device_name = DeviceManager::new().default_device_name()?;
        info!("Using default output device '{}'", device_name);
        Ok(Self { device_name, explicit: false })
    }

    /// Use the output device called `name`
    pub fn with_device(name: &str) -> Result<Self, AudioError> {
        DeviceManager::new().find_device(name)?;
        info!("Using output device '{}'", name);
        Ok(Self {
            device_name: name.to_string(),
            explicit: true,
        })
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    fn device(&self) -> Result<cpal::Device, AudioError> {
        let manager = DeviceManager::new();
        if self.explicit {
            manager.find_device(&self.device_name)
        } else {
            manager.default_device()
        }
    }

    fn capabilities(&self) -> Result<DeviceCapabilities, AudioError> {
        let device = self.device()?;
        device::capabilities(&device, None)
    }
}

impl AudioBackend for CpalBackend {
    fn id(&self) -> &'static str {
        "cpal"
    }

    fn check_available(&self) -> Result<(), AudioError> {
        self.device().map(|_| ())
    }

    fn max_channel_count(&self) -> Result<u16, AudioError> {
        Ok(self.capabilities()?.max_channels())
    }

    fn preferred_sample_rate(&self) -> Result<u32, AudioError> {
        Ok(self.capabilities()?.default_sample_rate)
    }

    fn min_latency(&self, params: &StreamParams) -> Result<u32, AudioError> {
        let caps = self.capabilities()?;
        // Devices that do not report a range get 10ms
        Ok(caps
            .min_buffer_frames(params)
            .unwrap_or(params.rate / 100)
            .max(1))
    }

    fn check_format(&self, params: &StreamParams) -> Result<(), AudioError> {
        let caps = self.capabilities()?;
        if caps.supports(params) {
            Ok(())
        } else {
            Err(AudioError::invalid_format(format!(
                "device '{}' does not support {}",
                caps.name,
                params.describe()
            )))
        }
    }

    fn open_output(
        &self,
        name: &str,
        params: &StreamParams,
        latency_frames: u32,
        pump: RenderPump,
    ) -> Result<Box<dyn OutputEndpoint>, AudioError> {
        let device = self.device()?;
        let (commands, receiver) = mpsc::channel();
        let (ready, ready_receiver) = mpsc::channel();
        let stream_params = *params;

        let handle = thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || {
                raise_render_priority();

                let stream = match open_stream(&device, &stream_params, latency_frames, pump) {
                    Ok(stream) => {
                        let _ = ready.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready.send(Err(e));
                        return;
                    }
                };
                serve_commands(stream, receiver);
            })
            .map_err(|e| AudioError::Backend(format!("Failed to create audio thread: {}", e)))?;

        let opened = ready_receiver
            .recv()
            .map_err(|_| AudioError::Backend("audio thread exited before opening the device".to_string()))
            .and_then(|result| result);

        let endpoint = CpalEndpoint {
            name: name.to_string(),
            commands,
            handle: Some(handle),
            playing: false,
        };
        // On failure dropping the endpoint joins the finished thread
        opened.map(|()| Box::new(endpoint) as Box<dyn OutputEndpoint>)
    }
}

enum EndpointCommand {
    Play(Sender<Result<(), AudioError>>),
    Pause(Sender<Result<(), AudioError>>),
}

fn serve_commands(stream: cpal::Stream, commands: Receiver<EndpointCommand>) {
    // Runs until the endpoint drops its sender
    while let Ok(command) = commands.recv() {
        match command {
            EndpointCommand::Play(reply) => {
                let result = stream
                    .play()
                    .map_err(|e| AudioError::Backend(format!("Failed to start output stream: {}", e)));
                let _ = reply.send(result);
            }
            EndpointCommand::Pause(reply) => {
                let result = stream
                    .pause()
                    .map_err(|e| AudioError::Backend(format!("Failed to pause output stream: {}", e)));
                let _ = reply.send(result);
            }
        }
    }

    if let Err(e) = stream.pause() {
        debug!("Pausing output stream on shutdown failed: {}", e);
    }
}

fn open_stream(
    device: &cpal::Device,
    params: &StreamParams,
    latency_frames: u32,
    pump: RenderPump,
) -> Result<cpal::Stream, AudioError> {
    let mut config = StreamConfig {
        channels: params.channels,
        sample_rate: SampleRate(params.rate),
        buffer_size: BufferSize::Fixed(latency_frames),
    };

    match build_for_format(device, &config, params, latency_frames, pump.clone()) {
        Ok(stream) => Ok(stream),
        Err(e) => {
            warn!(
                "Device rejected a {} frame buffer ({}), using its default buffer size",
                latency_frames, e
            );
            config.buffer_size = BufferSize::Default;
            build_for_format(device, &config, params, latency_frames, pump)
                .map_err(|e| AudioError::Backend(format!("Failed to build output stream: {}", e)))
        }
    }
}

fn build_for_format(
    device: &cpal::Device,
    config: &StreamConfig,
    params: &StreamParams,
    latency_frames: u32,
    pump: RenderPump,
) -> Result<cpal::Stream, cpal::BuildStreamError> {
    match params.format {
        SampleFormat::U8 => build_stream::<u8>(device, config, latency_frames, pump),
        SampleFormat::S16LE => build_stream::<i16>(device, config, latency_frames, pump),
        SampleFormat::F32LE => build_stream::<f32>(device, config, latency_frames, pump),
    }
}

/// Build a typed output stream feeding the pump through a byte staging buffer
fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    latency_frames: u32,
    pump: RenderPump,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: PcmSample + cpal::SizedSample,
{
    let params = pump.params();
    let frame_bytes = params.frame_bytes();
    let channels = params.channels as usize;
    let mut shadow = ShadowBuffer::with_capacity_frames(&params, latency_frames as usize);
    let error_pump = pump.clone();

    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
            let frames = data.len() / channels;
            let staging = shadow.staging(frames * frame_bytes);
            let delivered = pump.render(staging, params.frames_to_duration(frames as u64));
            fill_silence(&mut staging[delivered * frame_bytes..], params.format);
            shadow.copy_to(&mut data[..frames * channels]);
        },
        move |err| error_pump.report_device_error(&err.to_string()),
        None,
    )
}

struct CpalEndpoint {
    name: String,
    commands: Sender<EndpointCommand>,
    handle: Option<JoinHandle<()>>,
    playing: bool,
}

impl CpalEndpoint {
    fn request(&self, command: fn(Sender<Result<(), AudioError>>) -> EndpointCommand) -> Result<(), AudioError> {
        let (reply, response) = mpsc::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| AudioError::Backend(format!("audio thread of '{}' is gone", self.name)))?;
        response
            .recv()
            .map_err(|_| AudioError::Backend(format!("audio thread of '{}' did not answer", self.name)))?
    }
}

impl OutputEndpoint for CpalEndpoint {
    fn start(&mut self) -> Result<(), AudioError> {
        self.request(EndpointCommand::Play)?;
        self.playing = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), AudioError> {
        if !self.playing {
            return Ok(());
        }
        self.request(EndpointCommand::Pause)?;
        self.playing = false;
        Ok(())
    }
}

impl Drop for CpalEndpoint {
    fn drop(&mut self) {
        // Closing the channel ends the command loop, which drops the stream
        let (closed, _) = mpsc::channel();
        drop(std::mem::replace(&mut self.commands, closed));

        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Audio thread of '{}' panicked", self.name);
            }
        }
    }
}
