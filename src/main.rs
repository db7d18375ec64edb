use audio_stream_engine::audio::{BackendKind, Context, DeviceManager, OutputBuffer};
use audio_stream_engine::cli::status::{self, StatusLine};
use audio_stream_engine::cli::{decode_file, CliApp, Commands, OutputArgs, PcmSource, ToneSource};
use audio_stream_engine::config::{ConfigManager, EngineConfig};
use audio_stream_engine::error::{AppError, CallbackError};
use audio_stream_engine::logging::{EngineLogger, LOG_LEVEL_ENV};
use audio_stream_engine::models::{StreamParams, StreamState, StreamStats};
use log::{debug, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;


/// Amplitude of generated tones
const TONE_AMPLITUDE: f32 = 0.5;

/// Outcome of one played stream
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub state: Option<StreamState>,
    pub stats: StreamStats,
}

/// Main application controller that runs one CLI command
pub struct AppController {
    config: EngineConfig,
    interrupted: Arc<AtomicBool>,
    show_status: bool,
}

impl AppController {
    /// Load the configuration file and apply command line overrides
    pub fn new(output: &OutputArgs) -> Self {
        let config = match ConfigManager::new() {
            Ok(manager) => manager.get_config().clone(),
            Err(e) => {
                warn!("Using default configuration: {}", e);
                EngineConfig::default()
            }
        };
        Self::with_config(output.apply(&config))
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            interrupted: Arc::new(AtomicBool::new(false)),
            show_status: true,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stop printing the live status line
    pub fn quiet(mut self) -> Self {
        self.show_status = false;
        self
    }

    /// Flag that makes a playing stream stop; set by Ctrl-C
    pub fn interrupt_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    pub fn install_interrupt_handler(&self) {
        let interrupted = self.interrupt_flag();
        if let Err(e) = ctrlc::set_handler(move || {
            interrupted.store(true, Ordering::Relaxed);
        }) {
            warn!("Could not install Ctrl-C handler: {}", e);
        }
    }

    pub async fn execute_command(&mut self, command: Commands) -> Result<(), AppError> {
        match command {
            Commands::Tone { freq, seconds } => {
                let report = self.play_tone(freq, seconds).await?;
                debug!("Tone finished: {:?}", report);
            }
            Commands::Play { path } => {
                let report = self.play_file(&CliApp::expand_path(&path)).await?;
                debug!("Playback finished: {:?}", report);
            }
            Commands::Devices => self.list_devices()?,
        }
        Ok(())
    }

    pub async fn play_tone(&self, freq: f32, seconds: f32) -> Result<PlaybackReport, AppError> {
        let params = self.config.stream_params();
        let mut tone = ToneSource::new(freq, seconds, params.rate, TONE_AMPLITUDE);
        let total = tone.remaining_frames();

        let name = format!("tone {} Hz", freq);
        self.run_stream(&name, params, Some(total), move |buffer: &mut OutputBuffer<'_>| tone.fill(buffer))
            .await
    }

    pub async fn play_file(&self, path: &Path) -> Result<PlaybackReport, AppError> {
        info!("Decoding {}", path.display());
        let audio = decode_file(path)?;
        // The engine never resamples: open the stream at the file's own rate
        let params = StreamParams::new(self.config.format, audio.rate, audio.channels);
        let total = audio.total_frames();
        let mut source = PcmSource::new(audio);

        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.run_stream(&name, params, Some(total), move |buffer: &mut OutputBuffer<'_>| source.fill(buffer))
            .await
    }

    async fn run_stream<D>(
        &self,
        name: &str,
        params: StreamParams,
        total_frames: Option<u64>,
        data: D,
    ) -> Result<PlaybackReport, AppError>
    where
        D: FnMut(&mut OutputBuffer<'_>) -> Result<usize, CallbackError> + Send + 'static,
    {
        let context = Context::from_config("astream", &self.config)?;
        let latency = self.config.default_latency_frames;
        match context.min_latency(&params) {
            Ok(min) if latency < min => warn!("Latency of {} frames is below the backend minimum of {}", latency, min),
            Ok(_) => {}
            Err(e) => debug!("Backend did not report a minimum latency: {}", e),
        }

        let stream = context.stream_init(name, params, latency, data, |state: StreamState| -> Result<(), CallbackError> {
            debug!("Stream state: {}", state);
            Ok(())
        })?;
        stream.set_volume(self.config.default_volume)?;
        stream.start()?;

        let monitor = stream.monitor();
        let interrupted = self.interrupt_flag();
        if self.show_status {
            status::watch(monitor, total_frames, interrupted, std::io::stdout()).await;
        } else {
            status::watch(monitor, total_frames, interrupted, std::io::sink()).await;
        }

        stream.stop()?;
        let report = PlaybackReport {
            state: stream.state(),
            stats: stream.stats(),
        };
        if self.show_status {
            let position = params.frames_to_duration(report.stats.frames_delivered);
            println!("{}", StatusLine::format_summary(name, report.state, &report.stats, position));
        }

        stream.destroy();
        context.destroy();
        Ok(report)
    }

    fn list_devices(&self) -> Result<(), AppError> {
        if self.config.backend == BackendKind::Null {
            println!("null backend: renders to a discarded buffer, no devices");
            return Ok(());
        }

        let manager = DeviceManager::new();
        let devices = manager.list_devices()?;
        println!("Output devices on {}:", manager.host_name());
        if devices.is_empty() {
            println!("  (none)");
        }
        for device in devices {
            println!("  {}", device.summary());
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    if std::env::var(LOG_LEVEL_ENV).is_err() {
        std::env::set_var(LOG_LEVEL_ENV, "warn");
    }
    if let Err(e) = EngineLogger::init() {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }

    let cli = CliApp::parse();
    let mut app = AppController::new(&cli.output);
    app.install_interrupt_handler();

    if let Err(e) = app.execute_command(cli.command).await {
        log::log!(e.severity().log_level(), "{}", e);
        StatusLine::display_error(&e);
        std::process::exit(1);
    }
}
