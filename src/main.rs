// src/main.rs
mod config;
mod engine;
mod error;
mod gui;
mod input;
mod protocol;
mod registry;
mod serial;
mod types;
mod visualizer;

use anyhow::{anyhow, Context, Result};
use eframe::egui;

use crate::config::BridgeConfig;

fn main() -> Result<()> {
    env_logger::init();
    let config = BridgeConfig::load().context("loading bridge configuration")?;
    log::info!(
        "starting: baud {}, {:?}, {:?} positions",
        config.baud_rate,
        config.connect_mode,
        config.position_convention
    );
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1100.0, 760.0])
        .with_min_inner_size([800.0, 560.0])
        .with_title("Snake Bridge");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        "Snake Bridge",
        options,
        Box::new(move |_cc| Box::new(gui::SnakeBridgeApp::new(config))),
    )
    .map_err(|e| anyhow!("GUI failed: {e}"))
}
