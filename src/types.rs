// src/types.rs
use serde::{Deserialize, Serialize};

/// Logical snake direction. `None` never reaches the wire.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
    #[default]
    None,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn opposite(self) -> Direction {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
            Direction::None => Direction::None,
        }
    }

    pub fn is_some(self) -> bool {
        self != Direction::None
    }
}

/// Per-direction latch set.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InputState {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
}

impl InputState {
    pub fn latch(&mut self, direction: Direction) {
        match direction {
            Direction::Up => self.up = true,
            Direction::Down => self.down = true,
            Direction::Left => self.left = true,
            Direction::Right => self.right = true,
            Direction::None => {}
        }
    }

    pub fn clear(&mut self) {
        *self = InputState::default();
    }

    pub fn any(&self) -> bool {
        self.up || self.down || self.left || self.right
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ButtonState {
    pub pressed: bool,
    pub value: f32,
}

/// Full state of one gamepad at one poll, in standard-gamepad layout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeviceSnapshot {
    pub index: usize,
    pub id: String,
    pub mapping: String,
    pub axes: Vec<f32>,
    pub buttons: Vec<ButtonState>,
}

impl DeviceSnapshot {
    pub fn is_pressed(&self, button: usize) -> bool {
        self.buttons.get(button).map(|b| b.pressed).unwrap_or(false)
    }
}

/// Telemetry reported by the game controller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GameStatus {
    pub score: i64,
    pub level: i64,
    pub game_over: bool,
    pub head: Option<(i32, i32)>,
}

impl Default for GameStatus {
    fn default() -> Self {
        Self {
            score: 0,
            level: 1,
            game_over: false,
            head: None,
        }
    }
}

/// Serial link state as shown to the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected(String),
    Failed,
    Unsupported,
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "Disconnected",
            ConnectionState::Connected(_) => "Connected",
            ConnectionState::Failed => "Connection Failed",
            ConnectionState::Unsupported => "Serial API not supported",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Connected(_))
    }
}

/// What a connect request does while a session is already open.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectMode {
    #[default]
    Toggle,
    ConnectOnce,
}

// GUI -> engine
#[derive(Clone, Debug)]
pub enum GuiCommand {
    Connect(Option<String>),
    Disconnect,
    RefreshPorts,
    KeyDown(String),
    KeyUp(String),
    Shutdown,
}

// engine -> GUI
#[derive(Clone, Debug)]
pub enum BridgeMessage {
    Log(String),
    Connection(ConnectionState),
    Ports(Vec<String>),
    Status(GameStatus),
    CommandSent(char),
    DeviceAdded(DeviceSnapshot),
    DeviceUpdated(DeviceSnapshot),
    DeviceRemoved(usize),
}
