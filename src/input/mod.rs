// src/input/mod.rs
pub mod gamepad;
pub mod gate;
pub mod keyboard;
pub mod reducer;

pub use reducer::InputReducer;
