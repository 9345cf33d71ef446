use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    // Wire errors
    #[error("Invalid serial line: {0:?}")]
    InvalidLine(String),

    #[error("Line too long: {size} bytes (max {max_size})")]
    LineTooLong { size: usize, max_size: usize },

    #[error("Unknown device signal: {0}")]
    UnknownSignal(i64),

    // Registry errors
    #[error("Invalid gondola entry: {0}")]
    InvalidGondola(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
