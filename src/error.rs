use thiserror::Error;

/// Top-level emulator error type
#[derive(Debug, Error)]
pub enum EmulatorError {
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Output error: {0}")]
    Output(#[from] OutputError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("File error: {0}")]
    File(#[from] std::io::Error),
}

/// Errors from the track decode path
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Cannot open file: {path}")]
    OpenFailed { path: String },

    #[error("Unsupported format: {details}")]
    UnsupportedFormat { details: String },

    #[error("No decodable audio track in file")]
    NoAudioTrack,

    #[error("Decode failed: {details}")]
    DecodeFailed { details: String },

    #[error("Seek failed: {details}")]
    SeekFailed { details: String },
}

/// Errors from the audio output path
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("No output device available")]
    NoDevice,

    #[error("Cannot open output stream: {details}")]
    OpenFailed { details: String },

    #[error("Output stream error: {details}")]
    StreamError { details: String },
}

/// Configuration file errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid value for {key}: {details}")]
    InvalidValue { key: String, details: String },
}
