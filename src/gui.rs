// src/gui.rs
use eframe::egui;
use egui::Color32;
use egui_plot::{Line, Plot, PlotPoints};
use std::collections::BTreeMap;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::{Duration, Instant};

use crate::config::BridgeConfig;
use crate::engine;
use crate::types::*;
use crate::visualizer;

const MAX_LOG_LINES: usize = 8;
const MAX_SCORE_POINTS: usize = 500;
/// Messages handled per frame; pad updates beyond this only refresh state.
const MAX_MESSAGES_PER_FRAME: usize = 64;

pub struct SnakeBridgeApp {
    connection: ConnectionState,
    ports: Vec<String>,
    selected_port: Option<String>,
    status: GameStatus,
    devices: BTreeMap<usize, DeviceSnapshot>,
    last_command: Option<char>,
    started: Instant,
    score_history: Vec<[f64; 2]>,
    log_messages: Vec<String>,
    rx: Receiver<BridgeMessage>,
    tx_cmd: Sender<GuiCommand>,
}

impl SnakeBridgeApp {
    pub fn new(config: BridgeConfig) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let selected_port = config.port.clone();
        engine::spawn_thread(config, tx, rx_cmd);
        Self {
            connection: ConnectionState::Disconnected,
            ports: Vec::new(),
            selected_port,
            status: GameStatus::default(),
            devices: BTreeMap::new(),
            last_command: None,
            started: Instant::now(),
            score_history: vec![[0.0, 0.0]],
            log_messages: vec!["Snake bridge ready.".to_owned()],
            rx,
            tx_cmd,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > MAX_LOG_LINES {
            self.log_messages.remove(0);
        }
    }

    fn forward_keys(&self, ctx: &egui::Context) {
        let events = ctx.input(|i| i.events.clone());
        for event in events {
            if let egui::Event::Key { key, pressed, .. } = event {
                let name = key.name().to_owned();
                let cmd = if pressed {
                    GuiCommand::KeyDown(name)
                } else {
                    GuiCommand::KeyUp(name)
                };
                self.tx_cmd.send(cmd).ok();
            }
        }
    }

    fn drain_messages(&mut self) {
        let mut count = 0;
        while let Ok(msg) = self.rx.try_recv() {
            count += 1;
            if count > MAX_MESSAGES_PER_FRAME {
                match msg {
                    BridgeMessage::DeviceUpdated(s) => {
                        self.devices.insert(s.index, s);
                    }
                    other => self.apply(other),
                }
                continue;
            }
            self.apply(msg);
        }
    }

    fn apply(&mut self, msg: BridgeMessage) {
        match msg {
            BridgeMessage::Log(s) => self.log(&s),
            BridgeMessage::Connection(state) => {
                self.log(state.label());
                self.connection = state;
            }
            BridgeMessage::Ports(ports) => {
                if self.selected_port.is_none() {
                    self.selected_port = ports.first().cloned();
                }
                self.ports = ports;
            }
            BridgeMessage::Status(status) => {
                if status.score != self.status.score {
                    let t = self.started.elapsed().as_secs_f64();
                    self.score_history.push([t, status.score as f64]);
                    if self.score_history.len() > MAX_SCORE_POINTS {
                        self.score_history.remove(0);
                    }
                }
                if status.game_over && !self.status.game_over {
                    self.log("💀 Game over");
                }
                self.status = status;
            }
            BridgeMessage::CommandSent(c) => self.last_command = Some(c),
            BridgeMessage::DeviceAdded(s) => {
                self.log(&format!("🎮 add: {} {}", s.index, s.id));
                self.devices.insert(s.index, s);
            }
            BridgeMessage::DeviceUpdated(s) => {
                self.devices.insert(s.index, s);
            }
            BridgeMessage::DeviceRemoved(index) => {
                self.log(&format!("🎮 remove: {index}"));
                self.devices.remove(&index);
            }
        }
    }

    fn connection_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            egui::ComboBox::from_label("Port")
                .selected_text(self.selected_port.clone().unwrap_or_else(|| "-".into()))
                .show_ui(ui, |ui| {
                    for p in &self.ports {
                        ui.selectable_value(&mut self.selected_port, Some(p.clone()), p.as_str());
                    }
                });
            if ui.button("🔄").clicked() {
                self.tx_cmd.send(GuiCommand::RefreshPorts).ok();
            }
        });

        let btn_txt = if self.connection.is_connected() {
            "Disconnect"
        } else {
            "Connect Arduino"
        };
        if ui.button(btn_txt).clicked() {
            self.tx_cmd
                .send(GuiCommand::Connect(self.selected_port.clone()))
                .ok();
        }

        let color = match self.connection {
            ConnectionState::Connected(_) => Color32::GREEN,
            ConnectionState::Disconnected => Color32::GRAY,
            _ => Color32::RED,
        };
        ui.label(egui::RichText::new(self.connection.label()).color(color).strong());
    }

    fn status_panel(&self, ui: &mut egui::Ui) {
        ui.label(format!("Score: {}", self.status.score));
        ui.label(format!("Level: {}", self.status.level));
        if self.status.game_over {
            ui.label(
                egui::RichText::new("GAME OVER - press Space or A to restart")
                    .color(Color32::YELLOW),
            );
        }
        visualizer::draw_head(ui, self.status.head);
        if let Some(c) = self.last_command {
            ui.monospace(format!("last command: {c}"));
        }
    }
}

impl Drop for SnakeBridgeApp {
    fn drop(&mut self) {
        self.tx_cmd.send(GuiCommand::Shutdown).ok();
    }
}

impl eframe::App for SnakeBridgeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. keyboard -> engine
        self.forward_keys(ctx);

        // 2. engine -> UI state
        self.drain_messages();

        // 3. draw
        let mut visuals = egui::Visuals::dark();
        visuals.widgets.noninteractive.bg_fill = Color32::from_rgb(10, 10, 15);
        ctx.set_visuals(visuals);

        egui::SidePanel::left("L").min_width(260.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Snake Bridge");
            ui.label(visualizer::running_marker(self.started.elapsed().as_secs_f64()));
            ui.separator();
            self.connection_panel(ui);
            ui.separator();
            self.status_panel(ui);
            ui.separator();
            ui.label("Keys: WASD / arrows, Space restarts");
            ui.add_space(10.0);
            egui::ScrollArea::vertical().max_height(140.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            Plot::new("score_plot")
                .height(140.0)
                .include_y(0.0)
                .auto_bounds_x()
                .show(ui, |plot_ui| {
                    plot_ui.line(
                        Line::new(PlotPoints::new(self.score_history.clone()))
                            .name("score")
                            .color(Color32::from_rgb(0, 255, 255)),
                    );
                });
            ui.separator();
            egui::ScrollArea::vertical().show(ui, |ui| {
                if self.devices.is_empty() {
                    ui.label("No gamepads. Press a button on a pad to wake it.");
                }
                for pad in self.devices.values() {
                    visualizer::draw_device(ui, pad);
                    ui.separator();
                }
            });
        });

        ctx.request_repaint_after(Duration::from_millis(16));
    }
}
