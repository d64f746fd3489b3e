/// Playback engine - maps clock time onto grid columns and flashes the cells the playhead crosses
/// Clock readings are passed in by the caller, so the engine itself never reads a clock.
use super::Grid;
use crate::error::{SequencerError, SequencerResult};
use crate::midi::TransportMessage;
use log::{debug, info, trace};

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    StepAdvanced(usize),
}

#[derive(Debug)]
pub struct Transport {
    grid: Grid,
    bpm: f64,
    subdivision_duration: f64,
    start_time: Option<f64>,
    elapsed: f64,
    playhead_position: f64,
    // unwrapped subdivision counter of the last flash pass
    last_step: Option<u64>,
    events: Vec<PlaybackEvent>,
}

fn validate_tempo(bpm: f64) -> SequencerResult<f64> {
    if bpm.is_finite() && bpm > 0.0 {
        Ok(bpm)
    } else {
        Err(SequencerError::InvalidTempo(bpm))
    }
}

impl Transport {
    pub fn new(grid: Grid, bpm: f64) -> SequencerResult<Self> {
        let bpm = validate_tempo(bpm)?;
        let subdivision_duration = Self::duration_for(bpm, grid.meter().subdivisions_per_beat());

        Ok(Self {
            grid,
            bpm,
            subdivision_duration,
            start_time: None,
            elapsed: 0.0,
            playhead_position: 0.0,
            last_step: None,
            events: Vec::new(),
        })
    }

    fn duration_for(bpm: f64, subdivisions_per_beat: usize) -> f64 {
        (60.0 / bpm) / subdivisions_per_beat as f64
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Input handling edits cells through here, running or not.
    pub fn grid_mut(&mut self) -> &mut Grid {
        &mut self.grid
    }

    pub fn is_running(&self) -> bool {
        self.start_time.is_some()
    }

    pub fn start_time(&self) -> Option<f64> {
        self.start_time
    }

    pub fn tempo(&self) -> f64 {
        self.bpm
    }

    /// Seconds per column.
    pub fn subdivision_duration(&self) -> f64 {
        self.subdivision_duration
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn playhead_position(&self) -> f64 {
        self.playhead_position
    }

    pub fn current_column(&self) -> usize {
        // floor, so an exact boundary belongs to the lower column
        (self.playhead_position.floor() as usize).min(self.grid.columns() - 1)
    }

    pub fn current_bar(&self) -> usize {
        self.grid.meter().bar_of(self.current_column())
    }

    pub fn start(&mut self, now: f64) {
        self.start_time = Some(now);
        self.elapsed = 0.0;
        self.playhead_position = 0.0;
        self.last_step = None;
        info!("transport started at {:.3}s, {} bpm", now, self.bpm);
    }

    pub fn stop(&mut self) {
        self.start_time = None;
        self.playhead_position = 0.0;
        self.last_step = None;
        for cell in self.grid.cells_mut() {
            cell.end_flash();
        }
        info!("transport stopped after {:.3}s", self.elapsed);
    }

    /// Change tempo without moving the start time, so the same elapsed time
    /// maps onto columns at the new rate.
    pub fn set_tempo(&mut self, bpm: f64) -> SequencerResult<()> {
        let bpm = validate_tempo(bpm)?;
        self.bpm = bpm;
        self.subdivision_duration = Self::duration_for(bpm, self.grid.meter().subdivisions_per_beat());
        if self.is_running() {
            self.playhead_position = self.position_at(self.elapsed);
        }
        debug!(
            "tempo set to {} bpm, subdivision {:.4}s",
            bpm, self.subdivision_duration
        );
        Ok(())
    }

    fn position_at(&self, elapsed: f64) -> f64 {
        let columns = self.grid.columns() as f64;
        let position = (elapsed / self.subdivision_duration).rem_euclid(columns);
        // rem_euclid may round up to `columns`
        if position >= columns {
            0.0
        } else {
            position
        }
    }

    /// Advance the playhead to clock time `now`. Called once per frame.
    pub fn tick(&mut self, now: f64) {
        let Some(start_time) = self.start_time else {
            return;
        };

        self.elapsed = (now - start_time).max(0.0);
        self.playhead_position = self.position_at(self.elapsed);

        for cell in self.grid.cells_mut() {
            cell.expire_flash(now);
        }

        let step = (self.elapsed / self.subdivision_duration).floor() as u64;
        if self.last_step == Some(step) {
            return;
        }
        self.last_step = Some(step);

        let col = self.current_column();
        let revert_at = now + self.subdivision_duration;
        for cell in self.grid.column_mut(col) {
            if cell.is_active() {
                trace!("flash ({}, {}) until {:.3}s", cell.col(), cell.row(), revert_at);
                cell.flash(revert_at);
            }
        }
        self.events.push(PlaybackEvent::StepAdvanced(col));
    }

    pub fn poll_events(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.events)
    }

    /// Transport state for an external sink, stamped with clock time `now`.
    pub fn transport_message(&self, now: f64) -> TransportMessage {
        let meter = self.grid.meter();
        let bar_duration = self.subdivision_duration * meter.subdivisions_per_bar() as f64;
        let current_bar_started = match self.start_time {
            Some(_) => now - (self.elapsed % bar_duration),
            None => now,
        };

        TransportMessage {
            playing: self.is_running(),
            tempo: self.bpm,
            beats_per_bar: meter.beats_per_bar(),
            subdivisions_per_beat: meter.subdivisions_per_beat(),
            current_bar: if self.is_running() { self.current_bar() } else { 0 },
            current_bar_started,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::{CellState, Meter};

    const EPS: f64 = 1e-9;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    // 12 rows, 2 bars of 4/4 with 4 subdivisions per beat: 32 columns
    fn transport(bpm: f64) -> Transport {
        let grid = Grid::new(12, Meter::new(2, 4, 4)).unwrap();
        Transport::new(grid, bpm).unwrap()
    }

    #[test]
    fn test_initially_stopped() {
        let t = transport(60.0);
        assert!(!t.is_running());
        assert_eq!(t.start_time(), None);
        assert_eq!(t.playhead_position(), 0.0);
        assert!(close(t.subdivision_duration(), 0.25));
    }

    #[test]
    fn test_rejects_invalid_tempo() {
        let grid = Grid::create_cells(1, 4).unwrap();
        assert_eq!(
            Transport::new(grid.clone(), 0.0).unwrap_err(),
            SequencerError::InvalidTempo(0.0)
        );
        assert!(Transport::new(grid.clone(), -10.0).is_err());
        assert!(Transport::new(grid, f64::NAN).is_err());

        let mut t = transport(60.0);
        assert!(t.set_tempo(0.0).is_err());
        assert!(t.set_tempo(-120.0).is_err());
        assert!(t.set_tempo(f64::INFINITY).is_err());
        assert_eq!(t.tempo(), 60.0);
        assert!(close(t.subdivision_duration(), 0.25));
    }

    #[test]
    fn test_column_at_quarter_second() {
        let mut t = transport(60.0);
        t.start(10.0);
        t.tick(10.25);
        assert!(close(t.elapsed(), 0.25));
        assert_eq!(t.current_column(), 1);
    }

    #[test]
    fn test_tick_while_stopped_does_nothing() {
        let mut t = transport(60.0);
        t.grid_mut().set_active(0, 0);
        t.tick(5.0);
        assert_eq!(t.playhead_position(), 0.0);
        assert_eq!(t.elapsed(), 0.0);
        assert_eq!(t.grid().state(0, 0), Some(CellState::Active));
        assert!(t.poll_events().is_empty());
    }

    #[test]
    fn test_playhead_wraps() {
        let mut t = transport(60.0);
        t.start(0.0);
        // one full pass is 32 * 0.25 = 8s
        t.tick(8.0);
        assert_eq!(t.current_column(), 0);
        t.tick(8.0 + 31.5 * 0.25);
        assert_eq!(t.current_column(), 31);
        t.tick(1000.1);
        assert!(t.playhead_position() < 32.0);
    }

    #[test]
    fn test_playhead_stays_in_range() {
        for bpm in [1.0, 33.3, 60.0, 97.0, 120.0, 240.0, 999.0] {
            let mut t = transport(bpm);
            t.start(0.0);
            let mut now = 0.0;
            while now < 120.0 {
                t.tick(now);
                let pos = t.playhead_position();
                assert!((0.0..32.0).contains(&pos), "bpm {} at {}: {}", bpm, now, pos);
                assert!(t.current_column() < 32);
                now += 0.0171;
            }
        }
    }

    #[test]
    fn test_boundary_belongs_to_lower_column() {
        let mut t = transport(60.0);
        t.start(0.0);
        t.tick(0.5);
        assert_eq!(t.current_column(), 2);
        t.tick(0.5 - 1e-6);
        assert_eq!(t.current_column(), 1);
    }

    #[test]
    fn test_tempo_change_keeps_elapsed() {
        let mut t = transport(60.0);
        t.start(0.0);
        t.tick(1.0);
        assert_eq!(t.current_column(), 4);

        t.set_tempo(120.0).unwrap();
        assert!(t.is_running());
        assert_eq!(t.start_time(), Some(0.0));
        assert!(close(t.elapsed(), 1.0));
        assert!(close(t.subdivision_duration(), 0.125));
        assert_eq!(t.current_column(), 8);

        t.tick(1.0);
        assert_eq!(t.current_column(), 8);
    }

    #[test]
    fn test_set_tempo_while_stopped() {
        let mut t = transport(60.0);
        t.set_tempo(90.0).unwrap();
        assert!(!t.is_running());
        assert_eq!(t.playhead_position(), 0.0);
        assert_eq!(t.tempo(), 90.0);
    }

    #[test]
    fn test_flash_lifecycle() {
        let mut t = transport(60.0);
        t.grid_mut().set_active(2, 0);
        t.start(0.0);

        t.tick(0.3);
        assert_eq!(t.grid().state(2, 0), Some(CellState::Active));

        t.tick(0.51);
        assert_eq!(t.grid().state(2, 0), Some(CellState::Flashing));

        // later frames in the same column do not extend the flash
        t.tick(0.7);
        assert_eq!(t.grid().state(2, 0), Some(CellState::Flashing));

        t.tick(0.51 + 0.25 - 1e-6);
        assert_eq!(t.grid().state(2, 0), Some(CellState::Flashing));

        t.tick(0.51 + 0.25);
        assert_eq!(t.grid().state(2, 0), Some(CellState::Active));
        assert!(t.grid().is_active(2, 0));
    }

    #[test]
    fn test_only_active_cells_flash() {
        let mut t = transport(60.0);
        t.grid_mut().set_active(0, 3);
        t.start(0.0);
        t.tick(0.0);
        assert_eq!(t.grid().state(0, 3), Some(CellState::Flashing));
        for row in (0..12).filter(|&r| r != 3) {
            assert_eq!(t.grid().state(0, row), Some(CellState::Idle));
        }
    }

    #[test]
    fn test_flash_retriggers_on_wrap() {
        let grid = Grid::create_cells(1, 1).unwrap();
        let mut t = Transport::new(grid, 60.0).unwrap();
        t.grid_mut().set_active(0, 0);
        t.start(0.0);

        // one column: every subdivision re-enters column 0
        t.tick(0.0);
        assert_eq!(t.grid().get_cell(0, 0).unwrap().revert_at(), Some(1.0));
        t.tick(1.0);
        assert_eq!(t.grid().state(0, 0), Some(CellState::Flashing));
        assert_eq!(t.grid().get_cell(0, 0).unwrap().revert_at(), Some(2.0));
    }

    #[test]
    fn test_tempo_change_mid_flash_still_reverts() {
        let mut t = transport(60.0);
        t.grid_mut().set_active(1, 0);
        t.start(0.0);
        t.tick(0.25);
        assert_eq!(t.grid().state(1, 0), Some(CellState::Flashing));

        // the pending expiry keeps the old duration
        t.set_tempo(240.0).unwrap();
        t.tick(0.3);
        assert_eq!(t.current_column(), 4);
        assert_eq!(t.grid().state(1, 0), Some(CellState::Flashing));
        t.tick(0.5);
        assert_eq!(t.grid().state(1, 0), Some(CellState::Active));
    }

    #[test]
    fn test_deactivate_mid_flash() {
        let mut t = transport(60.0);
        t.grid_mut().set_active(0, 0);
        t.start(0.0);
        t.tick(0.0);
        t.grid_mut().toggle_active(0, 0);
        assert_eq!(t.grid().state(0, 0), Some(CellState::Idle));
        t.tick(0.3);
        assert_eq!(t.grid().state(0, 0), Some(CellState::Idle));
    }

    #[test]
    fn test_stop_clears_flash() {
        let mut t = transport(60.0);
        t.grid_mut().set_active(0, 0);
        t.grid_mut().set_active(5, 5);
        t.start(0.0);
        t.tick(0.01);
        assert_eq!(t.grid().state(0, 0), Some(CellState::Flashing));

        t.stop();
        assert!(!t.is_running());
        assert_eq!(t.playhead_position(), 0.0);
        assert_eq!(t.grid().state(0, 0), Some(CellState::Active));
        assert_eq!(t.grid().active_count(), 2);
    }

    #[test]
    fn test_restart_resets_position() {
        let mut t = transport(60.0);
        t.start(0.0);
        t.tick(5.3);
        assert!(t.playhead_position() > 0.0);

        t.stop();
        t.start(7.0);
        assert_eq!(t.playhead_position(), 0.0);
        assert_eq!(t.elapsed(), 0.0);
        t.tick(7.0);
        assert_eq!(t.current_column(), 0);
    }

    #[test]
    fn test_step_events() {
        let mut t = transport(60.0);
        t.start(0.0);
        t.tick(0.0);
        t.tick(0.1);
        t.tick(0.26);
        t.tick(0.8);
        assert_eq!(
            t.poll_events(),
            vec![
                PlaybackEvent::StepAdvanced(0),
                PlaybackEvent::StepAdvanced(1),
                PlaybackEvent::StepAdvanced(3),
            ]
        );
        assert!(t.poll_events().is_empty());
    }

    #[test]
    fn test_edits_while_stopped() {
        let mut t = transport(60.0);
        t.grid_mut().toggle_active(4, 4);
        assert!(t.grid().is_active(4, 4));
        t.start(0.0);
        t.tick(1.0);
        assert_eq!(t.grid().state(4, 4), Some(CellState::Flashing));
    }

    #[test]
    fn test_transport_message() {
        let mut t = transport(60.0);
        let msg = t.transport_message(3.0);
        assert!(!msg.playing);
        assert_eq!(msg.current_bar, 0);
        assert_eq!(msg.current_bar_started, 3.0);

        // a bar is 4s at 60 bpm
        t.start(10.0);
        t.tick(15.0);
        let msg = t.transport_message(15.0);
        assert!(msg.playing);
        assert_eq!(msg.tempo, 60.0);
        assert_eq!(msg.beats_per_bar, 4);
        assert_eq!(msg.subdivisions_per_beat, 4);
        assert_eq!(msg.current_bar, 1);
        assert!(close(msg.current_bar_started, 14.0));
    }
}
