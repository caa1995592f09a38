// src/protocol/mod.rs
pub mod command;
pub mod parser;

pub use command::{encode, Command};
pub use parser::{parse_line, PositionConvention};
