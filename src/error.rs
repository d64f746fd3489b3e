use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SequencerError {
    #[error("grid needs at least one row and one column, got {rows} rows and {columns} columns")]
    InvalidDimension { rows: usize, columns: usize },
    #[error("tempo must be a positive number of beats per minute, got {0}")]
    InvalidTempo(f64),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("could not read config file")]
    Io(#[from] std::io::Error),
    #[error("could not parse config file")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config")]
    Invalid(#[from] SequencerError),
}

#[derive(Error, Debug)]
pub enum MidiError {
    #[error("failed to create MIDI output")]
    Init(#[from] midir::InitError),
    #[error("no MIDI port at index {0}")]
    InvalidPort(usize),
    #[error("no MIDI port named {0}")]
    UnknownPort(String),
    #[error("failed to connect: {0}")]
    Connect(String),
    #[error("failed to send transport message")]
    Send(#[from] midir::SendError),
}

pub type SequencerResult<T> = Result<T, SequencerError>;
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type MidiResult<T> = Result<T, MidiError>;
