use log::{debug, info};
use std::time::{Duration, Instant};

use crate::config::{BridgeConfig, RestartButtons};
use crate::input::gamepad::{read_pad, ButtonEdges, SPEED_DOWN_BUTTONS, SPEED_UP_BUTTONS};
use crate::input::gate::CommandGate;
use crate::input::keyboard::{self, KeyPress, KeyboardState};
use crate::protocol::Command;
use crate::types::{DeviceSnapshot, Direction, GameStatus, InputState};

/// Reduces keyboard and gamepad input to one command stream.
///
/// All entry points take the current instant so the caller owns the clock.
/// Produced commands accumulate until [`InputReducer::take_commands`].
pub struct InputReducer {
    gate: CommandGate,
    keyboard: KeyboardState,
    edges: ButtonEdges,
    latches: InputState,
    last_sent: Direction,
    boost_sent: bool,
    pad_active: bool,
    pad_boost: bool,
    boost_enabled: bool,
    key_boost_hold: Duration,
    dead_zone: f32,
    boost_threshold: f32,
    speed_buttons: bool,
    restart_buttons: RestartButtons,
    outbox: Vec<Command>,
}

impl InputReducer {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            gate: CommandGate::new(config.min_command_interval()),
            keyboard: KeyboardState::new(config.key_repeat()),
            edges: ButtonEdges::default(),
            latches: InputState::default(),
            last_sent: Direction::None,
            boost_sent: false,
            pad_active: false,
            pad_boost: false,
            boost_enabled: config.boost,
            key_boost_hold: config.key_boost_hold(),
            dead_zone: config.dead_zone,
            boost_threshold: config.boost_threshold,
            speed_buttons: config.speed_buttons,
            restart_buttons: config.restart_buttons,
            outbox: Vec::new(),
        }
    }

    pub fn key_down(&mut self, key: &str, now: Instant, status: &GameStatus) {
        let key = keyboard::normalize(key);
        let press = self.keyboard.press(&key, now);
        if press == KeyPress::Repeat {
            return;
        }
        if keyboard::is_restart_key(&key)
            && status.game_over
            && self.restart_buttons.enabled()
        {
            info!("restart requested from keyboard");
            self.outbox.push(Command::Restart);
            return;
        }
        let direction = keyboard::key_direction(&key);
        if direction.is_some() {
            self.offer(direction, now);
        }
    }

    pub fn key_up(&mut self, key: &str) {
        self.keyboard.release(&keyboard::normalize(key));
    }

    /// One pass of the keyboard repeat timer.
    pub fn keyboard_tick(&mut self, now: Instant) {
        let direction = self.keyboard.repeat_tick(now);
        if direction.is_some() {
            self.offer(direction, now);
        }
    }

    /// One animation-frame pass over every tracked pad.
    pub fn gamepad_frame(&mut self, pads: &[DeviceSnapshot], now: Instant, status: &GameStatus) {
        self.pad_active = false;
        self.pad_boost = false;
        for pad in pads {
            let reading = read_pad(pad, self.dead_zone, self.boost_threshold);
            for direction in &reading.candidates {
                self.offer(*direction, now);
            }
            self.pad_active |= reading.active();
            self.pad_boost |= reading.boost_eligible;
            self.pad_buttons(pad, status);
        }
    }

    fn pad_buttons(&mut self, pad: &DeviceSnapshot, status: &GameStatus) {
        let rising = self.edges.rising(pad);
        if self.speed_buttons {
            for b in &rising {
                if SPEED_UP_BUTTONS.contains(b) {
                    self.outbox.push(Command::SpeedUp);
                } else if SPEED_DOWN_BUTTONS.contains(b) {
                    self.outbox.push(Command::SpeedDown);
                }
            }
        }
        if status.game_over && rising.iter().any(|b| self.restart_buttons.matches(*b)) {
            info!("restart requested from pad {}", pad.index);
            self.outbox.push(Command::Restart);
        }
    }

    /// Settles the boost state from everything seen this frame.
    pub fn resolve_boost(&mut self, now: Instant) {
        let active = self.pad_active || self.keyboard.any_direction_held();
        let desired = if active {
            self.pad_boost
                || self
                    .keyboard
                    .boost_eligible(now, self.key_boost_hold, self.last_sent)
        } else {
            self.latches.clear();
            false
        };
        if self.boost_enabled && desired != self.boost_sent {
            debug!("boost {}", if desired { "on" } else { "off" });
            self.boost_sent = desired;
            self.outbox.push(Command::Boost(desired));
        }
    }

    /// Full tick: pads, keyboard repeat, boost.
    pub fn frame(&mut self, pads: &[DeviceSnapshot], now: Instant, status: &GameStatus) {
        self.gamepad_frame(pads, now, status);
        self.keyboard_tick(now);
        self.resolve_boost(now);
    }

    /// A fresh session knows nothing about boost; the next frame re-sends it.
    pub fn reset_boost(&mut self) {
        self.boost_sent = false;
    }

    /// A boost byte that never reached the device. Retried next frame.
    pub fn boost_undelivered(&mut self, on: bool) {
        self.boost_sent = !on;
    }

    pub fn forget_device(&mut self, index: usize) {
        self.edges.forget(index);
    }

    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.outbox)
    }

    pub fn latches(&self) -> InputState {
        self.latches
    }

    pub fn last_sent(&self) -> Direction {
        self.last_sent
    }

    pub fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    fn offer(&mut self, direction: Direction, now: Instant) {
        if !self.gate.try_pass(now) {
            return;
        }
        self.latches.latch(direction);
        self.last_sent = direction;
        self.outbox.push(Command::Move(direction));
    }
}
