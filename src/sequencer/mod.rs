/// Grid model - cell activation and visual state, addressed by (column, row)
/// Columns are time subdivisions, rows are lanes. The grid never reads a clock;
/// flashing is driven from the playback engine.
use crate::error::{SequencerError, SequencerResult};
pub mod playback;

/// Visual state of a cell. Rendering derives colour from this, never the reverse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellState {
    #[default]
    Idle,
    Active,
    Flashing,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    col: usize,
    row: usize,
    active: bool,
    state: CellState,
    // clock time at which a flash ends
    revert_at: Option<f64>,
}

impl Cell {
    fn new(col: usize, row: usize) -> Self {
        Self {
            col,
            row,
            active: false,
            state: CellState::Idle,
            revert_at: None,
        }
    }

    pub fn col(&self) -> usize {
        self.col
    }

    pub fn row(&self) -> usize {
        self.row
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> CellState {
        self.state
    }

    pub fn revert_at(&self) -> Option<f64> {
        self.revert_at
    }

    fn set_active(&mut self, active: bool) {
        self.active = active;
        self.state = if active {
            CellState::Active
        } else {
            CellState::Idle
        };
        self.revert_at = None;
    }

    /// Start a flash on an active cell. Inactive cells are left alone.
    pub(crate) fn flash(&mut self, revert_at: f64) {
        if self.active {
            self.state = CellState::Flashing;
            self.revert_at = Some(revert_at);
        }
    }

    /// End the flash if it is due. Safe to call any number of times.
    pub(crate) fn expire_flash(&mut self, now: f64) {
        if let Some(at) = self.revert_at {
            if now >= at {
                self.end_flash();
            }
        }
    }

    pub(crate) fn end_flash(&mut self) {
        self.revert_at = None;
        if self.state == CellState::Flashing {
            self.state = if self.active {
                CellState::Active
            } else {
                CellState::Idle
            };
        }
    }
}

/// Bars, beats per bar and subdivisions per beat. One column is one subdivision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Meter {
    bars: usize,
    beats_per_bar: usize,
    subdivisions_per_beat: usize,
}

impl Meter {
    pub fn new(bars: usize, beats_per_bar: usize, subdivisions_per_beat: usize) -> Self {
        Self {
            bars,
            beats_per_bar,
            subdivisions_per_beat,
        }
    }

    pub fn bars(&self) -> usize {
        self.bars
    }

    pub fn beats_per_bar(&self) -> usize {
        self.beats_per_bar
    }

    pub fn subdivisions_per_beat(&self) -> usize {
        self.subdivisions_per_beat
    }

    pub fn subdivisions_per_bar(&self) -> usize {
        self.subdivisions_per_beat * self.beats_per_bar
    }

    pub fn columns(&self) -> usize {
        self.bars * self.subdivisions_per_bar()
    }

    pub fn is_beat_start(&self, col: usize) -> bool {
        col.checked_rem(self.subdivisions_per_beat) == Some(0)
    }

    pub fn is_bar_start(&self, col: usize) -> bool {
        col.checked_rem(self.subdivisions_per_bar()) == Some(0)
    }

    pub fn bar_of(&self, col: usize) -> usize {
        col.checked_div(self.subdivisions_per_bar()).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Beat,
    Bar,
}

/// A vertical line drawn at the left edge of `col`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridLine {
    pub col: usize,
    pub kind: LineKind,
}

#[derive(Debug, Clone)]
pub struct Grid {
    cells: Vec<Vec<Cell>>,
    meter: Meter,
}

impl Grid {
    pub fn new(rows: usize, meter: Meter) -> SequencerResult<Self> {
        let columns = meter.columns();
        if rows == 0 || columns == 0 {
            return Err(SequencerError::InvalidDimension { rows, columns });
        }

        let cells = (0..rows)
            .map(|row| (0..columns).map(|col| Cell::new(col, row)).collect())
            .collect();

        Ok(Self { cells, meter })
    }

    /// Plain `rows × cols` grid with a single bar of `cols` subdivisions.
    pub fn create_cells(rows: usize, cols: usize) -> SequencerResult<Self> {
        if rows == 0 || cols == 0 {
            return Err(SequencerError::InvalidDimension { rows, columns: cols });
        }
        Self::new(rows, Meter::new(1, 1, cols))
    }

    pub fn rows(&self) -> usize {
        self.cells.len()
    }

    pub fn columns(&self) -> usize {
        self.meter.columns()
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }

    pub fn cell_count(&self) -> usize {
        self.rows() * self.columns()
    }

    pub fn get_cell(&self, col: usize, row: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|cells| cells.get(col))
    }

    pub(crate) fn get_cell_mut(&mut self, col: usize, row: usize) -> Option<&mut Cell> {
        self.cells.get_mut(row).and_then(|cells| cells.get_mut(col))
    }

    pub fn is_active(&self, col: usize, row: usize) -> bool {
        self.get_cell(col, row)
            .map(Cell::is_active)
            .unwrap_or(false)
    }

    pub fn state(&self, col: usize, row: usize) -> Option<CellState> {
        self.get_cell(col, row).map(Cell::state)
    }

    pub fn set_active(&mut self, col: usize, row: usize) {
        if let Some(cell) = self.get_cell_mut(col, row) {
            cell.set_active(true);
        }
    }

    pub fn set_inactive(&mut self, col: usize, row: usize) {
        if let Some(cell) = self.get_cell_mut(col, row) {
            cell.set_active(false);
        }
    }

    pub fn toggle_active(&mut self, col: usize, row: usize) {
        if let Some(cell) = self.get_cell_mut(col, row) {
            let active = cell.is_active();
            cell.set_active(!active);
        }
    }

    pub fn clear(&mut self) {
        for cell in self.cells.iter_mut().flatten() {
            cell.set_active(false);
        }
    }

    /// All cells, row by row.
    pub fn cells(&self) -> impl Iterator<Item = &Cell> {
        self.cells.iter().flatten()
    }

    pub(crate) fn cells_mut(&mut self) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut().flatten()
    }

    /// Cells of one column, top to bottom. Empty for an out-of-range column.
    pub(crate) fn column_mut(&mut self, col: usize) -> impl Iterator<Item = &mut Cell> {
        self.cells.iter_mut().filter_map(move |cells| cells.get_mut(col))
    }

    pub fn active_count(&self) -> usize {
        self.cells().filter(|cell| cell.is_active()).count()
    }

    pub fn cell_size(&self, width: f32, height: f32) -> (f32, f32) {
        (width / self.columns() as f32, height / self.rows() as f32)
    }

    pub fn cell_origin(&self, col: usize, row: usize, width: f32, height: f32) -> Option<(f32, f32)> {
        let cell = self.get_cell(col, row)?;
        let (w, h) = self.cell_size(width, height);
        Some((cell.col() as f32 * w, cell.row() as f32 * h))
    }

    /// Map a point on a `width × height` canvas to the cell under it.
    pub fn cell_at(&self, x: f32, y: f32, width: f32, height: f32) -> Option<(usize, usize)> {
        if !(width > 0.0 && height > 0.0) || x < 0.0 || y < 0.0 {
            return None;
        }

        let (w, h) = self.cell_size(width, height);
        let col = (x / w).floor() as usize;
        let row = (y / h).floor() as usize;

        if col < self.columns() && row < self.rows() {
            Some((col, row))
        } else {
            None
        }
    }

    /// Beat and bar boundaries, left to right. A bar boundary is not repeated as a beat.
    pub fn grid_lines(&self) -> Vec<GridLine> {
        (0..self.columns())
            .filter_map(|col| {
                if self.meter.is_bar_start(col) {
                    Some(GridLine { col, kind: LineKind::Bar })
                } else if self.meter.is_beat_start(col) {
                    Some(GridLine { col, kind: LineKind::Beat })
                } else {
                    None
                }
            })
            .collect()
    }
}
