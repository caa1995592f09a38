// src/visualizer.rs
use crate::types::DeviceSnapshot;
use eframe::egui;
use egui::{Color32, Pos2, Stroke, Vec2};

const STICK_RADIUS: f32 = 40.0;
const BUTTON_RADIUS: f32 = 16.0;
const BUTTONS_PER_ROW: usize = 8;

/// Debug view of one pad: header, one circle per axis pair, one per button.
pub fn draw_device(ui: &mut egui::Ui, pad: &DeviceSnapshot) {
    let outline = Color32::from_rgb(136, 136, 136);
    let text_color = Color32::from_rgb(204, 204, 204);

    ui.horizontal(|ui| {
        ui.label(egui::RichText::new(format!("#{}", pad.index)).strong());
        ui.label(pad.id.as_str());
    });
    ui.label(format!(
        "mapping: {}",
        if pad.mapping.is_empty() { "-" } else { pad.mapping.as_str() }
    ));

    // axes, in (x, y) pairs
    let pairs = (pad.axes.len() + 1) / 2;
    if pairs > 0 {
        let cell = STICK_RADIUS * 2.0 + 20.0;
        let (response, painter) = ui.allocate_painter(
            Vec2::new(cell * pairs as f32, cell + 14.0),
            egui::Sense::hover(),
        );
        let origin = response.rect.min;
        for pair in 0..pairs {
            let x = pad.axes.get(pair * 2).copied().unwrap_or(0.0);
            let y = pad.axes.get(pair * 2 + 1).copied().unwrap_or(0.0);
            let c = origin + Vec2::new(cell * pair as f32 + cell / 2.0, cell / 2.0);
            painter.circle_stroke(c, STICK_RADIUS, Stroke::new(1.0, outline));
            painter.line_segment(
                [c - Vec2::new(0.0, STICK_RADIUS), c + Vec2::new(0.0, STICK_RADIUS)],
                Stroke::new(1.0, outline),
            );
            painter.line_segment(
                [c - Vec2::new(STICK_RADIUS, 0.0), c + Vec2::new(STICK_RADIUS, 0.0)],
                Stroke::new(1.0, outline),
            );
            painter.circle_filled(c + Vec2::new(x, y) * STICK_RADIUS, 5.0, Color32::RED);
            painter.text(
                c + Vec2::new(0.0, STICK_RADIUS + 4.0),
                egui::Align2::CENTER_TOP,
                format!("{x:5.2},{y:5.2}"),
                egui::FontId::monospace(11.0),
                text_color,
            );
        }
    }

    // buttons
    if !pad.buttons.is_empty() {
        let cell = BUTTON_RADIUS * 2.0 + 8.0;
        let rows = (pad.buttons.len() + BUTTONS_PER_ROW - 1) / BUTTONS_PER_ROW;
        let cols = pad.buttons.len().min(BUTTONS_PER_ROW);
        let (response, painter) = ui.allocate_painter(
            Vec2::new(cell * cols as f32, cell * rows as f32),
            egui::Sense::hover(),
        );
        let origin = response.rect.min;
        for (i, button) in pad.buttons.iter().enumerate() {
            let col = (i % BUTTONS_PER_ROW) as f32;
            let row = (i / BUTTONS_PER_ROW) as f32;
            let c = origin + Vec2::new(col * cell + cell / 2.0, row * cell + cell / 2.0);
            painter.circle_stroke(c, BUTTON_RADIUS, Stroke::new(1.0, outline));
            let fill = if button.pressed { Color32::RED } else { Color32::GRAY };
            painter.circle_filled(c, BUTTON_RADIUS * button.value.clamp(0.0, 1.0), fill);
            painter.text(
                c,
                egui::Align2::CENTER_CENTER,
                format!("{:.2}", button.value),
                egui::FontId::monospace(9.0),
                text_color,
            );
            painter.text(
                c - Vec2::splat(BUTTON_RADIUS),
                egui::Align2::LEFT_TOP,
                i.to_string(),
                egui::FontId::proportional(9.0),
                text_color,
            );
        }
    }
}

/// Tiny frame counter so a frozen UI is visible.
pub fn running_marker(seconds: f64) -> String {
    format!("{:02}", ((seconds * 60.0) as u64) % 100)
}

/// Board-cell marker for the reported head position.
pub fn draw_head(ui: &mut egui::Ui, head: Option<(i32, i32)>) {
    let size = Vec2::new(160.0, 20.0);
    let (response, painter) = ui.allocate_painter(size, egui::Sense::hover());
    let text = match head {
        Some((x, y)) => format!("head at ({x}, {y})"),
        None => "head unknown".to_owned(),
    };
    let pos: Pos2 = response.rect.left_center();
    painter.text(
        pos,
        egui::Align2::LEFT_CENTER,
        text,
        egui::FontId::proportional(13.0),
        Color32::from_rgb(0, 255, 255),
    );
}
