#[cfg(feature = "gui")]
use anyhow::Context;
#[cfg(feature = "gui")]
use eframe::egui;
#[cfg(feature = "gui")]
use log::{info, trace, warn};

#[cfg(feature = "gui")]
use pianoroll::{
    default_clock, CellState, Clock, Config, LineKind, MidiOutputDevice, PlaybackEvent, Transport,
    TransportSink,
};

#[cfg(feature = "gui")]
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::from_env().context("failed to load config")?;
    let app = PianoRollApp::new(&config).context("failed to build sequencer")?;

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([config.canvas_width + 16.0, config.canvas_height + 90.0])
            .with_title("PIANOROLL - Step Sequencer"),
        ..Default::default()
    };

    eframe::run_native(
        "PIANOROLL",
        options,
        Box::new(move |_cc| Ok(Box::new(app))),
    )
    .map_err(|e| anyhow::anyhow!("{}", e))
}

#[cfg(not(feature = "gui"))]
fn main() {
    eprintln!("This binary requires the 'gui' feature to be enabled");
    std::process::exit(1);
}

#[cfg(feature = "gui")]
struct PianoRollApp {
    transport: Transport,
    clock: Box<dyn Clock>,
    midi_output: MidiOutputDevice,

    // UI state
    available_midi_ports: Vec<String>,
    selected_port: Option<usize>,
    canvas_size: egui::Vec2,
    bpm: f64,
}

#[cfg(feature = "gui")]
impl PianoRollApp {
    fn new(config: &Config) -> anyhow::Result<Self> {
        let transport = config.build_transport()?;
        let available_midi_ports = MidiOutputDevice::available_ports();

        let mut midi_output = MidiOutputDevice::new();
        let selected_port = match &config.midi_port {
            Some(name) => match midi_output.connect_by_name(name) {
                Ok(index) => Some(index),
                Err(e) => {
                    warn!("MIDI port {}: {}", name, e);
                    None
                }
            },
            None => None,
        };

        info!(
            "{} rows x {} columns at {} bpm",
            transport.grid().rows(),
            transport.grid().columns(),
            transport.tempo()
        );

        Ok(Self {
            bpm: transport.tempo(),
            transport,
            clock: default_clock(),
            midi_output,
            available_midi_ports,
            selected_port,
            canvas_size: egui::vec2(config.canvas_width, config.canvas_height),
        })
    }

    fn handle_playback_events(&mut self) {
        for event in self.transport.poll_events() {
            match event {
                PlaybackEvent::StepAdvanced(col) => trace!("step {}", col),
            }
        }
    }

    fn notify_sink(&mut self) {
        let message = self.transport.transport_message(self.clock.now());
        if let Err(e) = self.midi_output.notify(&message) {
            warn!("transport sink: {}", e);
        }
    }

    fn start_playback(&mut self) {
        self.transport.start(self.clock.now());
        self.notify_sink();
    }

    fn stop_playback(&mut self) {
        self.transport.stop();
        self.notify_sink();
    }

    fn change_tempo(&mut self, bpm: f64) {
        match self.transport.set_tempo(bpm) {
            Ok(()) => self.notify_sink(),
            Err(e) => {
                warn!("{}", e);
                self.bpm = self.transport.tempo();
            }
        }
    }

    fn cell_color(state: CellState) -> egui::Color32 {
        match state {
            CellState::Idle => egui::Color32::WHITE,
            CellState::Active => egui::Color32::from_rgb(255, 0, 0),
            CellState::Flashing => egui::Color32::from_rgb(0, 255, 0),
        }
    }

    fn draw_grid(&mut self, ui: &mut egui::Ui) {
        let size = self.canvas_size.min(ui.available_size());
        let (response, painter) = ui.allocate_painter(size, egui::Sense::click());
        let rect = response.rect;

        let grid = self.transport.grid();
        let (w, h) = grid.cell_size(rect.width(), rect.height());

        for cell in grid.cells() {
            let min = rect.min + egui::vec2(cell.col() as f32 * w, cell.row() as f32 * h);
            let cell_rect = egui::Rect::from_min_size(min, egui::vec2(w, h));
            painter.rect_filled(cell_rect, 0.0, Self::cell_color(cell.state()));
            painter.rect_stroke(cell_rect, 0.0, egui::Stroke::new(1.0, egui::Color32::BLACK));
        }

        for line in grid.grid_lines() {
            let x = rect.left() + line.col as f32 * w;
            let stroke = match line.kind {
                LineKind::Beat => egui::Stroke::new(4.0, egui::Color32::BLACK),
                LineKind::Bar => egui::Stroke::new(8.0, egui::Color32::BLUE),
            };
            painter.vline(x, rect.y_range(), stroke);
        }

        if self.transport.is_running() {
            let x = rect.left() + self.transport.playhead_position() as f32 * w;
            let playhead = egui::Rect::from_min_size(egui::pos2(x, rect.top()), egui::vec2(w / 10.0, rect.height()));
            painter.rect_filled(playhead, 0.0, egui::Color32::from_rgb(0, 255, 0));
        }

        if response.clicked() {
            if let Some(pos) = response.interact_pointer_pos() {
                let local = pos - rect.min;
                let target = grid.cell_at(local.x, local.y, rect.width(), rect.height());
                if let Some((col, row)) = target {
                    self.transport.grid_mut().toggle_active(col, row);
                }
            }
        }
    }
}

#[cfg(feature = "gui")]
impl eframe::App for PianoRollApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();

        self.transport.tick(self.clock.now());
        self.handle_playback_events();

        egui::CentralPanel::default().show(ctx, |ui| {
            // Transport controls
            let mut selected_port_changed = None;
            ui.horizontal(|ui| {
                let is_playing = self.transport.is_running();

                if is_playing {
                    if ui.button("⏸ Stop").clicked() {
                        self.stop_playback();
                    }
                } else if ui.button("▶ Start").clicked() {
                    self.start_playback();
                }

                ui.add_space(20.0);

                ui.label("BPM:");
                if ui
                    .add(egui::Slider::new(&mut self.bpm, 20.0..=300.0).step_by(1.0))
                    .changed()
                {
                    self.change_tempo(self.bpm);
                }

                if ui.button("Clear").clicked() {
                    self.transport.grid_mut().clear();
                }

                ui.add_space(20.0);

                ui.label("MIDI Transport:");
                if self.available_midi_ports.is_empty() {
                    ui.label("No MIDI ports available");
                } else {
                    egui::ComboBox::from_id_source("midi_port")
                        .selected_text(
                            self.selected_port
                                .and_then(|i| self.available_midi_ports.get(i))
                                .map(String::as_str)
                                .unwrap_or("Select port..."),
                        )
                        .show_ui(ui, |ui| {
                            for (i, port_name) in self.available_midi_ports.iter().enumerate() {
                                if ui
                                    .selectable_label(self.selected_port == Some(i), port_name)
                                    .clicked()
                                {
                                    selected_port_changed = Some(i);
                                }
                            }
                        });
                }
            });

            if let Some(port_idx) = selected_port_changed {
                match self.midi_output.connect(port_idx) {
                    Ok(()) => self.selected_port = Some(port_idx),
                    Err(e) => warn!("{}", e),
                }
            }

            ui.add_space(10.0);
            self.draw_grid(ui);
        });
    }
}
