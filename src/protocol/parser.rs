//! Inbound line protocol of the game controller.
//!
//! Lines are newline-terminated text. Recognized forms:
//!
//! ```text
//! Dot position: (3, 4)     1-based head position
//! Snake head: (3, 4)       0-based head position
//! SCORE:42
//! LEVEL_UP:3 / LEVEL_DOWN:2
//! GAME_OVER:<anything>
//! GAME_RESET
//! ```
//!
//! Anything else is ignored.
use serde::{Deserialize, Serialize};

use crate::types::GameStatus;

/// How the position message numbers its coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionConvention {
    /// `Dot position: (x, y)`, coordinates start at 1 on the wire.
    #[default]
    OneBased,
    /// `Snake head: (x, y)`, coordinates already start at 0.
    ZeroBased,
}

impl PositionConvention {
    pub fn label(self) -> &'static str {
        match self {
            PositionConvention::OneBased => "Dot position:",
            PositionConvention::ZeroBased => "Snake head:",
        }
    }

    fn offset(self) -> i32 {
        match self {
            PositionConvention::OneBased => 1,
            PositionConvention::ZeroBased => 0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LevelChange {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    PositionUpdate { x: i32, y: i32 },
    ScoreUpdate(i64),
    LevelUpdate { level: i64, change: LevelChange },
    GameOver,
    GameReset,
}

/// Decodes one trimmed line. Position and status tags are independent, so a
/// single line can produce two events.
pub fn parse_line(line: &str, convention: PositionConvention) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    if let Some(idx) = line.find(convention.label()) {
        let rest = &line[idx + convention.label().len()..];
        if let Some((x, y)) = find_pair(rest) {
            let off = convention.offset();
            events.push(DeviceEvent::PositionUpdate {
                x: x - off,
                y: y - off,
            });
        }
    }
    if let Some(event) = parse_status(line) {
        events.push(event);
    }
    events
}

fn parse_status(line: &str) -> Option<DeviceEvent> {
    if let Some(v) = line.strip_prefix("SCORE:") {
        return parse_int(v).map(DeviceEvent::ScoreUpdate);
    }
    if let Some(v) = line.strip_prefix("LEVEL_UP:") {
        return parse_int(v).map(|level| DeviceEvent::LevelUpdate {
            level,
            change: LevelChange::Up,
        });
    }
    if let Some(v) = line.strip_prefix("LEVEL_DOWN:") {
        return parse_int(v).map(|level| DeviceEvent::LevelUpdate {
            level,
            change: LevelChange::Down,
        });
    }
    if line.starts_with("GAME_OVER:") {
        return Some(DeviceEvent::GameOver);
    }
    if line == "GAME_RESET" {
        return Some(DeviceEvent::GameReset);
    }
    None
}

/// Leading integer of `s`; trailing text is ignored.
fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (sign, digits) = match s.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<i64>().ok().map(|n| sign * n)
}

/// First `(<digits>,<spaces><digits>)` in `s`.
fn find_pair(s: &str) -> Option<(i32, i32)> {
    let mut search = s;
    while let Some(open) = search.find('(') {
        search = &search[open + 1..];
        if let Some(pair) = pair_at(search) {
            return Some(pair);
        }
    }
    None
}

fn pair_at(s: &str) -> Option<(i32, i32)> {
    let (x, rest) = take_digits(s)?;
    let rest = rest.strip_prefix(',')?.trim_start();
    let (y, rest) = take_digits(rest)?;
    rest.starts_with(')').then_some((x, y))
}

fn take_digits(s: &str) -> Option<(i32, &str)> {
    let end = s
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    if end == 0 {
        return None;
    }
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}

impl GameStatus {
    pub fn apply(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::PositionUpdate { x, y } => self.head = Some((x, y)),
            DeviceEvent::ScoreUpdate(n) => self.score = n,
            DeviceEvent::LevelUpdate { level, .. } => self.level = level,
            DeviceEvent::GameOver => self.game_over = true,
            DeviceEvent::GameReset => {
                self.score = 0;
                self.level = 1;
                self.game_over = false;
            }
        }
    }
}
