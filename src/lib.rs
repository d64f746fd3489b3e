/// PIANOROLL - a grid step sequencer with a clock-driven playhead
///
/// This library provides the core components for a piano-roll style sequencer:
/// - Grid model with per-cell activation and flash state
/// - Transport that maps clock time onto grid columns
/// - Audio clock source for driving the transport
/// - MIDI transport output for keeping other devices in sync

pub mod audio;
pub mod config;
pub mod error;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types
pub use audio::{default_clock, AudioClock, Clock, SystemClock};
pub use config::Config;
pub use error::{ConfigError, MidiError, SequencerError};
pub use midi::{MidiOutputDevice, TransportMessage, TransportSink};
pub use sequencer::playback::{PlaybackEvent, Transport};
pub use sequencer::{Cell, CellState, Grid, GridLine, LineKind, Meter};
