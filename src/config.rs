/// Session configuration, read from a JSON file named by `PIANOROLL_CONFIG`
/// Missing fields take the defaults below.
use crate::error::ConfigResult;
use crate::sequencer::playback::Transport;
use crate::sequencer::{Grid, Meter};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_ENV: &str = "PIANOROLL_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub rows: usize,
    pub bars: usize,
    pub beats_per_bar: usize,
    pub subdivisions_per_beat: usize,
    pub tempo: f64,
    pub canvas_width: f32,
    pub canvas_height: f32,
    /// MIDI port to connect the transport sink to at startup.
    pub midi_port: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rows: 12,
            bars: 2,
            beats_per_bar: 4,
            subdivisions_per_beat: 4,
            tempo: 60.0,
            canvas_width: 1600.0,
            canvas_height: 800.0,
            midi_port: None,
        }
    }
}

impl Config {
    pub fn from_json(json: &str) -> ConfigResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json(&json)?;
        info!("loaded config from {}", path.display());
        Ok(config)
    }

    /// Config from the file in `PIANOROLL_CONFIG`, or defaults when it is unset.
    pub fn from_env() -> ConfigResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn meter(&self) -> Meter {
        Meter::new(self.bars, self.beats_per_bar, self.subdivisions_per_beat)
    }

    pub fn build_transport(&self) -> ConfigResult<Transport> {
        let grid = Grid::new(self.rows, self.meter())?;
        Ok(Transport::new(grid, self.tempo)?)
    }
}
