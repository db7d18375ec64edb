use thiserror::Error;

/// Top-level error for the `astream` application
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl AppError {
    /// Get user-friendly error message with suggested solutions
    pub fn user_message(&self) -> String {
        match self {
            AppError::Audio(err) => err.user_message(),
            AppError::File(err) => Self::format_file_error(err),
            AppError::Decode(msg) => format!("Failed to decode audio file: {}", msg),
            AppError::Config(err) => err.user_message(),
        }
    }

    /// Get suggested recovery actions for the error
    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AppError::Audio(err) => err.recovery_suggestions(),
            AppError::File(_) => vec![
                "Check that the file path is correct".to_string(),
                "Check file permissions".to_string(),
            ],
            AppError::Decode(_) => vec![
                "Verify the file is a supported audio format".to_string(),
                "Try playing the file in another audio player to confirm corruption".to_string(),
            ],
            AppError::Config(err) => err.recovery_suggestions(),
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AppError::Audio(AudioError::InvalidFormat { .. }) => ErrorSeverity::Warning,
            AppError::Audio(AudioError::DeviceNotFound { .. }) => ErrorSeverity::Error,
            AppError::Audio(_) => ErrorSeverity::Critical,
            AppError::File(_) => ErrorSeverity::Error,
            AppError::Decode(_) => ErrorSeverity::Error,
            AppError::Config(_) => ErrorSeverity::Warning,
        }
    }

    /// Whether running the command again can succeed without other changes
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Audio(err) => err.is_recoverable(),
            AppError::Config(err) => err.is_recoverable(),
            AppError::File(_) | AppError::Decode(_) => false,
        }
    }

    fn format_file_error(err: &std::io::Error) -> String {
        match err.kind() {
            std::io::ErrorKind::NotFound => "File or directory not found".to_string(),
            std::io::ErrorKind::PermissionDenied => "Permission denied - cannot access file".to_string(),
            _ => format!("File system error: {}", err),
        }
    }
}

/// Error severity levels for logging and user feedback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl ErrorSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorSeverity::Info => "INFO",
            ErrorSeverity::Warning => "WARNING",
            ErrorSeverity::Error => "ERROR",
            ErrorSeverity::Critical => "CRITICAL",
        }
    }

    pub fn log_level(&self) -> log::Level {
        match self {
            ErrorSeverity::Info => log::Level::Info,
            ErrorSeverity::Warning => log::Level::Warn,
            ErrorSeverity::Error => log::Level::Error,
            ErrorSeverity::Critical => log::Level::Error,
        }
    }
}

/// Engine errors returned by context and stream operations
#[derive(Debug, Error)]
pub enum AudioError {
    /// The backend could not be brought up (no device, host unavailable)
    #[error("Audio initialization failed: {0}")]
    InitializationFailed(String),

    /// The requested format, rate or channel combination is not supported
    #[error("Invalid stream format: {reason}")]
    InvalidFormat { reason: String },

    /// Catch-all for backend failures after creation
    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Device not found: {device}")]
    DeviceNotFound { device: String },
}

impl AudioError {
    pub fn invalid_format(reason: impl Into<String>) -> Self {
        AudioError::InvalidFormat { reason: reason.into() }
    }

    pub fn user_message(&self) -> String {
        match self {
            AudioError::InitializationFailed(msg) => {
                format!("Failed to initialize audio system: {}", msg)
            }
            AudioError::InvalidFormat { reason } => {
                format!("The requested stream format is not supported: {}", reason)
            }
            AudioError::Backend(msg) => {
                format!("Audio output failed: {}", msg)
            }
            AudioError::DeviceNotFound { device } => {
                format!("Audio device '{}' is not available or has been disconnected", device)
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            AudioError::InitializationFailed(_) => vec![
                "Check that an audio output device is connected".to_string(),
                "Verify audio drivers are properly installed".to_string(),
                "Use '--backend null' to run without an audio device".to_string(),
            ],
            AudioError::InvalidFormat { .. } => vec![
                "Supported encodings: u8, s16le, f32le".to_string(),
                "Try the device's preferred sample rate (see 'astream devices')".to_string(),
                "Try a different channel count".to_string(),
            ],
            AudioError::Backend(_) => vec![
                "Check that no other application holds the device exclusively".to_string(),
                "Restart the stream".to_string(),
            ],
            AudioError::DeviceNotFound { .. } => vec![
                "Use 'astream devices' to see available audio devices".to_string(),
                "Omit '--device' to use the default output device".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        match self {
            AudioError::InitializationFailed(_) => true, // Can retry initialization
            AudioError::InvalidFormat { .. } => false,
            AudioError::Backend(_) => true,
            AudioError::DeviceNotFound { .. } => true, // Can fall back to default device
        }
    }
}

/// Error sentinel returned by a data callback.
///
/// Returning it halts the stream: the callback is not invoked again and the
/// state callback receives `Stopped`. State callbacks may also return it,
/// which is logged and otherwise ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackError {
    pub message: Option<String>,
}

impl CallbackError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: Some(message.into()) }
    }
}

impl std::fmt::Display for CallbackError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.message {
            Some(message) => write!(f, "callback error: {}", message),
            None => write!(f, "callback error"),
        }
    }
}

impl std::error::Error for CallbackError {}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    ConfigDirNotFound,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] toml::ser::Error),

    #[error("Deserialization error: {0}")]
    DeserializationError(#[from] toml::de::Error),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            ConfigError::ConfigDirNotFound => {
                "Cannot find or create configuration directory".to_string()
            }
            ConfigError::IoError(err) => {
                format!("Cannot access configuration file: {}", err)
            }
            ConfigError::SerializationError(_) => {
                "Failed to save configuration settings".to_string()
            }
            ConfigError::DeserializationError(_) => {
                "Configuration file is corrupted or has invalid format".to_string()
            }
        }
    }

    pub fn recovery_suggestions(&self) -> Vec<String> {
        match self {
            ConfigError::ConfigDirNotFound => vec![
                "Check that you have write permissions to your home directory".to_string(),
                "Try creating the directory manually: ~/.config/astream/".to_string(),
            ],
            ConfigError::IoError(_) => vec![
                "Check file permissions for the configuration directory".to_string(),
                "Ensure the disk is not full".to_string(),
            ],
            ConfigError::SerializationError(_) => vec![
                "Configuration will use default values".to_string(),
            ],
            ConfigError::DeserializationError(_) => vec![
                "Delete the configuration file to reset to defaults".to_string(),
                "Check the configuration file format manually".to_string(),
            ],
        }
    }

    pub fn is_recoverable(&self) -> bool {
        true // Every config failure can fall back to defaults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::invalid_format("48000 Hz, 64 channels");
        assert!(err.to_string().contains("48000 Hz, 64 channels"));
        assert!(err.user_message().contains("not supported"));
        assert!(!err.is_recoverable());

        let err = AudioError::InitializationFailed("no device".to_string());
        assert!(err.is_recoverable());
        assert!(!err.recovery_suggestions().is_empty());
    }

    #[test]
    fn test_callback_error_display() {
        assert_eq!(CallbackError::default().to_string(), "callback error");
        assert_eq!(CallbackError::new("decoder failed").to_string(), "callback error: decoder failed");
    }

    #[test]
    fn test_app_error_severity() {
        let err = AppError::Audio(AudioError::invalid_format("x"));
        assert_eq!(err.severity(), ErrorSeverity::Warning);
        assert_eq!(err.severity().log_level(), log::Level::Warn);

        let err = AppError::Audio(AudioError::Backend("device busy".to_string()));
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert_eq!(err.severity().as_str(), "CRITICAL");
    }

    #[test]
    fn test_app_error_from_conversions() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: AppError = io.into();
        assert_eq!(err.user_message(), "File or directory not found");

        let err: AppError = AudioError::Backend("stream 'x' has been destroyed".to_string()).into();
        assert!(matches!(err, AppError::Audio(AudioError::Backend(_))));
    }

    #[test]
    fn test_app_error_recoverability() {
        assert!(AppError::Audio(AudioError::Backend("device busy".to_string())).is_recoverable());
        assert!(!AppError::Audio(AudioError::invalid_format("x")).is_recoverable());
        assert!(AppError::Config(ConfigError::ConfigDirNotFound).is_recoverable());
        assert!(!AppError::Decode("bad header".to_string()).is_recoverable());
    }
}
