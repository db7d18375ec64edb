use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::audio::position::clamp_volume;
use crate::audio::{BackendKind, MAX_LATENCY_FRAMES, MIN_LATENCY_FRAMES};
use crate::error::ConfigError;
use crate::models::{SampleFormat, StreamParams};

/// Engine configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub backend: BackendKind,
    pub preferred_device: Option<String>,
    pub default_latency_frames: u32,
    pub default_volume: f32,
    pub sample_rate: u32,
    pub channels: u16,
    pub format: SampleFormat,
}

impl EngineConfig {
    /// Stream parameters for streams opened with the configured defaults
    pub fn stream_params(&self) -> StreamParams {
        StreamParams::new(self.format, self.sample_rate, self.channels)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Cpal,
            preferred_device: None,
            default_latency_frames: 4096,
            default_volume: 0.8,
            sample_rate: 48000,
            channels: 2,
            format: SampleFormat::F32LE,
        }
    }
}

/// Configuration manager for loading and saving settings
pub struct ConfigManager {
    config: EngineConfig,
    config_path: PathBuf,
}

impl ConfigManager {
    /// Load `~/.config/astream/config.toml`, falling back to defaults
    pub fn new() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path()?;
        Ok(Self::with_path(config_path))
    }

    /// Manage the configuration stored at `config_path`
    pub fn with_path(config_path: PathBuf) -> Self {
        let config = match Self::load_config(&config_path) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring unreadable config {}: {}", config_path.display(), e);
                EngineConfig::default()
            }
        };
        Self { config, config_path }
    }

    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn update_config<F>(&mut self, updater: F) -> Result<(), ConfigError>
    where
        F: FnOnce(&mut EngineConfig),
    {
        updater(&mut self.config);
        self.save_config()
    }

    pub fn set_backend(&mut self, backend: BackendKind) -> Result<(), ConfigError> {
        self.config.backend = backend;
        self.save_config()
    }

    pub fn set_volume(&mut self, volume: f32) -> Result<(), ConfigError> {
        self.config.default_volume = clamp_volume(volume);
        self.save_config()
    }

    pub fn set_preferred_device(&mut self, device: Option<String>) -> Result<(), ConfigError> {
        self.config.preferred_device = device;
        self.save_config()
    }

    pub fn set_latency_frames(&mut self, latency_frames: u32) -> Result<(), ConfigError> {
        self.config.default_latency_frames = latency_frames.clamp(MIN_LATENCY_FRAMES, MAX_LATENCY_FRAMES);
        self.save_config()
    }

    pub fn set_stream_params(&mut self, params: StreamParams) -> Result<(), ConfigError> {
        self.config.format = params.format;
        self.config.sample_rate = params.rate;
        self.config.channels = params.channels;
        self.save_config()
    }

    pub fn reset_to_defaults(&mut self) -> Result<(), ConfigError> {
        self.config = EngineConfig::default();
        self.save_config()
    }

    fn get_config_path() -> Result<PathBuf, ConfigError> {
        let config_dir = dirs::home_dir()
            .ok_or(ConfigError::ConfigDirNotFound)?
            .join(".config")
            .join("astream");

        Ok(config_dir.join("config.toml"))
    }

    fn load_config(path: &Path) -> Result<EngineConfig, ConfigError> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(EngineConfig::default());
        }

        let config_content = std::fs::read_to_string(path).map_err(ConfigError::IoError)?;
        let config: EngineConfig = toml::from_str(&config_content).map_err(ConfigError::DeserializationError)?;
        Ok(config)
    }

    pub fn save_config(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigError::IoError)?;
        }

        let config_content = toml::to_string_pretty(&self.config).map_err(ConfigError::SerializationError)?;
        std::fs::write(&self.config_path, config_content).map_err(ConfigError::IoError)?;
        debug!("Saved config to {}", self.config_path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_config_manager() -> (ConfigManager, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("astream").join("config.toml");
        (ConfigManager::with_path(config_path), temp_dir)
    }

    #[test]
    fn test_engine_config_default() {
        let config = EngineConfig::default();

        assert_eq!(config.backend, BackendKind::Cpal);
        assert_eq!(config.preferred_device, None);
        assert_eq!(config.default_latency_frames, 4096);
        assert_eq!(config.default_volume, 0.8);
        assert_eq!(
            config.stream_params(),
            StreamParams::new(SampleFormat::F32LE, 48000, 2)
        );
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        assert_eq!(manager.get_config(), &EngineConfig::default());
        assert!(!manager.config_path().exists());
    }

    #[test]
    fn test_save_and_load_config() {
        let (mut manager, _temp_dir) = create_test_config_manager();

        manager
            .update_config(|config| {
                config.backend = BackendKind::Null;
                config.preferred_device = Some("Test Device".to_string());
                config.format = SampleFormat::S16LE;
            })
            .unwrap();

        let reloaded = ConfigManager::with_path(manager.config_path().to_path_buf());
        assert_eq!(reloaded.get_config().backend, BackendKind::Null);
        assert_eq!(reloaded.get_config().preferred_device, Some("Test Device".to_string()));
        assert_eq!(reloaded.get_config().format, SampleFormat::S16LE);
    }

    #[test]
    fn test_setters_clamp() {
        let (mut manager, _temp_dir) = create_test_config_manager();

        manager.set_volume(1.7).unwrap();
        assert_eq!(manager.get_config().default_volume, 1.0);
        manager.set_volume(-0.3).unwrap();
        assert_eq!(manager.get_config().default_volume, 0.0);

        manager.set_latency_frames(0).unwrap();
        assert_eq!(manager.get_config().default_latency_frames, MIN_LATENCY_FRAMES);
        manager.set_latency_frames(u32::MAX).unwrap();
        assert_eq!(manager.get_config().default_latency_frames, MAX_LATENCY_FRAMES);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::create_dir_all(manager.config_path().parent().unwrap()).unwrap();
        fs::write(manager.config_path(), "backend = \"null\"\nsample_rate = 44100\n").unwrap();

        let loaded = ConfigManager::with_path(manager.config_path().to_path_buf());
        assert_eq!(loaded.get_config().backend, BackendKind::Null);
        assert_eq!(loaded.get_config().sample_rate, 44100);
        assert_eq!(loaded.get_config().channels, 2);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let (manager, _temp_dir) = create_test_config_manager();
        fs::create_dir_all(manager.config_path().parent().unwrap()).unwrap();
        fs::write(manager.config_path(), "default_volume = \"loud\"").unwrap();

        assert!(ConfigManager::load_config(manager.config_path()).is_err());
        let loaded = ConfigManager::with_path(manager.config_path().to_path_buf());
        assert_eq!(loaded.get_config(), &EngineConfig::default());
    }

    #[test]
    fn test_reset_to_defaults() {
        let (mut manager, _temp_dir) = create_test_config_manager();
        manager.set_backend(BackendKind::Null).unwrap();
        manager.reset_to_defaults().unwrap();
        assert_eq!(manager.get_config(), &EngineConfig::default());
        assert!(manager.config_path().exists());
    }
}
