use std::collections::HashMap;

use crate::types::{DeviceSnapshot, Direction};

/// Stick axis pairs as (horizontal, vertical) indices.
pub const STICKS: [(usize, usize); 2] = [(0, 1), (2, 3)];
/// D-pad buttons in check order: up, down, left, right.
pub const DPAD: [(usize, Direction); 4] = [
    (12, Direction::Up),
    (13, Direction::Down),
    (14, Direction::Left),
    (15, Direction::Right),
];
pub const SPEED_DOWN_BUTTONS: [usize; 2] = [4, 6];
pub const SPEED_UP_BUTTONS: [usize; 2] = [5, 7];

/// Direction of one stick. Vertical wins only with a strictly larger
/// magnitude; the winning component must clear the dead zone.
pub fn stick_direction(horizontal: f32, vertical: f32, dead_zone: f32) -> Direction {
    if vertical.abs() > horizontal.abs() {
        if vertical < -dead_zone {
            Direction::Up
        } else if vertical > dead_zone {
            Direction::Down
        } else {
            Direction::None
        }
    } else if horizontal < -dead_zone {
        Direction::Left
    } else if horizontal > dead_zone {
        Direction::Right
    } else {
        Direction::None
    }
}

/// First pressed D-pad button, only on pads exposing the full layout.
pub fn dpad_direction(pad: &DeviceSnapshot) -> Direction {
    if pad.buttons.len() < 16 {
        return Direction::None;
    }
    DPAD.iter()
        .find(|(button, _)| pad.is_pressed(*button))
        .map(|(_, d)| *d)
        .unwrap_or(Direction::None)
}

/// Direction candidates of one pad for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PadReading {
    /// In evaluation order: left stick, right stick, D-pad.
    pub candidates: Vec<Direction>,
    pub boost_eligible: bool,
}

impl PadReading {
    pub fn active(&self) -> bool {
        !self.candidates.is_empty()
    }
}

pub fn read_pad(pad: &DeviceSnapshot, dead_zone: f32, boost_threshold: f32) -> PadReading {
    let mut reading = PadReading::default();
    for (h, v) in STICKS {
        let (Some(&x), Some(&y)) = (pad.axes.get(h), pad.axes.get(v)) else {
            continue;
        };
        let d = stick_direction(x, y, dead_zone);
        if d.is_some() {
            reading.candidates.push(d);
        }
        if x.abs() > boost_threshold || y.abs() > boost_threshold {
            reading.boost_eligible = true;
        }
    }
    let d = dpad_direction(pad);
    if d.is_some() {
        reading.candidates.push(d);
    }
    reading
}

/// Press edges per device, so held buttons fire once.
#[derive(Clone, Debug, Default)]
pub struct ButtonEdges {
    previous: HashMap<usize, Vec<bool>>,
}

impl ButtonEdges {
    /// Buttons that went from released to pressed since the last call.
    pub fn rising(&mut self, pad: &DeviceSnapshot) -> Vec<usize> {
        let now: Vec<bool> = pad.buttons.iter().map(|b| b.pressed).collect();
        let before = self.previous.get(&pad.index);
        let rising = now
            .iter()
            .enumerate()
            .filter(|(i, pressed)| {
                **pressed && !before.and_then(|b| b.get(*i).copied()).unwrap_or(false)
            })
            .map(|(i, _)| i)
            .collect();
        self.previous.insert(pad.index, now);
        rising
    }

    pub fn forget(&mut self, index: usize) {
        self.previous.remove(&index);
    }
}
