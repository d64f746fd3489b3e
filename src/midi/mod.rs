/// MIDI transport output using midir
/// Mirrors start/stop to an external device so a note-playback engine can follow along.
use crate::error::{MidiError, MidiResult};
use log::{debug, info, warn};
use midir::{MidiOutput, MidiOutputConnection};

const CLIENT_NAME: &str = "pianoroll transport";

const START: u8 = 0xFA;
const STOP: u8 = 0xFC;
const SONG_POSITION: u8 = 0xF2;

/// Transport parameters sent to dependent systems on start, stop and tempo change.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub playing: bool,
    pub tempo: f64,
    pub beats_per_bar: usize,
    pub subdivisions_per_beat: usize,
    pub current_bar: usize,
    /// Clock time, in seconds, at which the current bar began.
    pub current_bar_started: f64,
}

/// Receives transport notifications from the owner of the playback engine.
pub trait TransportSink {
    fn notify(&mut self, message: &TransportMessage) -> MidiResult<()>;
}

pub struct MidiOutputDevice {
    connection: Option<MidiOutputConnection>,
    playing: bool,
}

impl MidiOutputDevice {
    pub fn new() -> Self {
        Self {
            connection: None,
            playing: false,
        }
    }

    pub fn available_ports() -> Vec<String> {
        match MidiOutput::new(CLIENT_NAME) {
            Ok(midi_out) => midi_out
                .ports()
                .iter()
                .filter_map(|p| midi_out.port_name(p).ok())
                .collect(),
            Err(e) => {
                warn!("MIDI unavailable: {}", e);
                vec![]
            }
        }
    }

    pub fn connect(&mut self, port_index: usize) -> MidiResult<()> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;

        let ports = midi_out.ports();
        let port = ports
            .get(port_index)
            .ok_or(MidiError::InvalidPort(port_index))?;
        let name = midi_out.port_name(port).unwrap_or_default();

        let connection = midi_out
            .connect(port, "pianoroll")
            .map_err(|e| MidiError::Connect(e.to_string()))?;

        info!("connected MIDI transport to {}", name);
        self.connection = Some(connection);
        Ok(())
    }

    pub fn connect_by_name(&mut self, name: &str) -> MidiResult<usize> {
        let index = Self::available_ports()
            .iter()
            .position(|port| port == name)
            .ok_or_else(|| MidiError::UnknownPort(name.to_string()))?;
        self.connect(index)?;
        Ok(index)
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    pub fn disconnect(&mut self) {
        if let Some(connection) = self.connection.take() {
            let _ = connection.close();
        }
    }

    fn send(&mut self, bytes: &[u8]) -> MidiResult<()> {
        if let Some(ref mut conn) = self.connection {
            conn.send(bytes)?;
        }
        Ok(())
    }
}

impl TransportSink for MidiOutputDevice {
    fn notify(&mut self, message: &TransportMessage) -> MidiResult<()> {
        let bytes = transport_bytes(self.playing, message);
        self.playing = message.playing;
        if bytes.is_empty() {
            // MIDI real-time messages carry no tempo
            debug!("tempo now {} bpm", message.tempo);
            return Ok(());
        }
        self.send(&bytes)
    }
}

impl Default for MidiOutputDevice {
    fn default() -> Self {
        Self::new()
    }
}

/// Bytes to send when moving from `was_playing` to the state in `message`.
/// Playback always restarts from the top, so Start is preceded by a song position of zero.
fn transport_bytes(was_playing: bool, message: &TransportMessage) -> Vec<u8> {
    match (was_playing, message.playing) {
        (false, true) => vec![SONG_POSITION, 0, 0, START],
        (true, false) => vec![STOP],
        _ => vec![],
    }
}
