use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::types::Direction;

/// Logical direction of a key identifier (letter or arrow alias).
pub fn key_direction(key: &str) -> Direction {
    match key {
        "w" | "arrowup" | "up" => Direction::Up,
        "s" | "arrowdown" | "down" => Direction::Down,
        "a" | "arrowleft" | "left" => Direction::Left,
        "d" | "arrowright" | "right" => Direction::Right,
        _ => Direction::None,
    }
}

pub fn is_restart_key(key: &str) -> bool {
    matches!(key, "space" | " ")
}

pub fn normalize(key: &str) -> String {
    key.to_ascii_lowercase()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyPress {
    /// First key-down of a key that was not held.
    Fresh,
    /// Auto-repeat of a held key.
    Repeat,
}

/// Fixed-period timer that only runs while a directional key is held.
#[derive(Clone, Debug)]
pub struct RepeatTimer {
    period: Duration,
    next: Option<Instant>,
}

impl RepeatTimer {
    pub fn new(period: Duration) -> Self {
        Self { period, next: None }
    }

    pub fn arm(&mut self, now: Instant) {
        if self.next.is_none() {
            self.next = Some(now + self.period);
        }
    }

    pub fn cancel(&mut self) {
        self.next = None;
    }

    pub fn is_armed(&self) -> bool {
        self.next.is_some()
    }

    /// True once per elapsed period. Missed periods collapse into one fire.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next {
            Some(due) if now >= due => {
                let mut next = due + self.period;
                if next <= now {
                    next = now + self.period;
                }
                self.next = Some(next);
                true
            }
            _ => false,
        }
    }
}

/// Held keys and the repeat timer they drive.
#[derive(Clone, Debug)]
pub struct KeyboardState {
    held: HashMap<String, Instant>,
    timer: RepeatTimer,
}

impl KeyboardState {
    pub fn new(repeat_period: Duration) -> Self {
        Self {
            held: HashMap::new(),
            timer: RepeatTimer::new(repeat_period),
        }
    }

    pub fn press(&mut self, key: &str, now: Instant) -> KeyPress {
        if self.held.contains_key(key) {
            return KeyPress::Repeat;
        }
        self.held.insert(key.to_owned(), now);
        if key_direction(key).is_some() {
            self.timer.arm(now);
        }
        KeyPress::Fresh
    }

    pub fn release(&mut self, key: &str) {
        self.held.remove(key);
        if !self.any_direction_held() {
            self.timer.cancel();
        }
    }

    pub fn any_direction_held(&self) -> bool {
        self.held.keys().any(|k| key_direction(k).is_some())
    }

    /// Held direction by priority: Up, Down, Left, Right.
    pub fn held_direction(&self) -> Direction {
        Direction::ALL
            .into_iter()
            .find(|d| self.held.keys().any(|k| key_direction(k) == *d))
            .unwrap_or(Direction::None)
    }

    /// Runs the repeat timer. Returns the direction to evaluate when it
    /// fires; cancels itself when no directional key is held.
    pub fn repeat_tick(&mut self, now: Instant) -> Direction {
        if !self.timer.fire(now) {
            return Direction::None;
        }
        let direction = self.held_direction();
        if !direction.is_some() {
            self.timer.cancel();
        }
        direction
    }

    pub fn timer_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /// A directional key held at least `hold` whose direction does not
    /// reverse `last_sent`.
    pub fn boost_eligible(&self, now: Instant, hold: Duration, last_sent: Direction) -> bool {
        self.held.iter().any(|(key, since)| {
            let d = key_direction(key);
            d.is_some()
                && d != last_sent.opposite()
                && now.saturating_duration_since(*since) >= hold
        })
    }
}
