// src/registry.rs
use gilrs::{Axis, Button, Event, EventType, Gamepad, Gilrs, MappingSource};
use log::info;
use std::collections::{BTreeMap, VecDeque};

use crate::error::BridgeError;
use crate::types::{ButtonState, DeviceSnapshot};

/// Button order of the standard gamepad layout (index = position).
pub const STANDARD_BUTTONS: [Button; 17] = [
    Button::South,
    Button::East,
    Button::West,
    Button::North,
    Button::LeftTrigger,
    Button::RightTrigger,
    Button::LeftTrigger2,
    Button::RightTrigger2,
    Button::Select,
    Button::Start,
    Button::LeftThumb,
    Button::RightThumb,
    Button::DPadUp,
    Button::DPadDown,
    Button::DPadLeft,
    Button::DPadRight,
    Button::Mode,
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PadNotice {
    Connected(usize),
    Disconnected(usize),
}

/// Result of one poll of the host gamepad API.
#[derive(Clone, Debug, Default)]
pub struct PadPoll {
    pub notices: Vec<PadNotice>,
    pub snapshots: Vec<DeviceSnapshot>,
}

/// Trait representing the host gamepad API.
pub trait GamepadSource {
    fn poll(&mut self) -> PadPoll;
}

/// gilrs-backed source, reporting pads in standard-gamepad layout.
pub struct GilrsSource {
    gilrs: Gilrs,
}

impl GilrsSource {
    pub fn new() -> Result<Self, BridgeError> {
        Ok(Self {
            gilrs: Gilrs::new()?,
        })
    }
}

impl GamepadSource for GilrsSource {
    fn poll(&mut self) -> PadPoll {
        let mut poll = PadPoll::default();
        // gilrs only updates pad state while events are drained
        while let Some(Event { id, event, .. }) = self.gilrs.next_event() {
            match event {
                EventType::Connected => poll.notices.push(PadNotice::Connected(id.into())),
                EventType::Disconnected => poll.notices.push(PadNotice::Disconnected(id.into())),
                _ => {}
            }
        }
        poll.snapshots = self
            .gilrs
            .gamepads()
            .map(|(id, pad)| standard_snapshot(id.into(), &pad))
            .collect();
        poll
    }
}

fn standard_snapshot(index: usize, pad: &Gamepad<'_>) -> DeviceSnapshot {
    // standard layout has up = negative on the vertical axes
    let axes = vec![
        pad.value(Axis::LeftStickX),
        -pad.value(Axis::LeftStickY),
        pad.value(Axis::RightStickX),
        -pad.value(Axis::RightStickY),
    ];
    let buttons = STANDARD_BUTTONS
        .iter()
        .map(|b| ButtonState {
            pressed: pad.is_pressed(*b),
            value: pad.button_data(*b).map(|d| d.value()).unwrap_or(0.0),
        })
        .collect();
    let mapping = match pad.mapping_source() {
        MappingSource::None => "",
        _ => "standard",
    };
    DeviceSnapshot {
        index,
        id: pad.name().to_owned(),
        mapping: mapping.to_owned(),
        axes,
        buttons,
    }
}

/// In-memory source useful for tests and as the pad-less fallback.
#[derive(Default)]
pub struct ManualSource {
    queue: VecDeque<PadPoll>,
}

impl ManualSource {
    pub fn new(polls: impl IntoIterator<Item = PadPoll>) -> Self {
        Self {
            queue: polls.into_iter().collect(),
        }
    }
}

impl GamepadSource for ManualSource {
    fn poll(&mut self) -> PadPoll {
        self.queue.pop_front().unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum RegistryChange {
    Added(DeviceSnapshot),
    Updated(DeviceSnapshot),
    Removed(usize),
}

/// Tracked pads keyed by index. Snapshots replace entries wholesale.
#[derive(Default)]
pub struct DeviceRegistry {
    devices: BTreeMap<usize, DeviceSnapshot>,
}

impl DeviceRegistry {
    pub fn upsert(&mut self, snapshot: DeviceSnapshot) -> RegistryChange {
        match self.devices.insert(snapshot.index, snapshot.clone()) {
            None => {
                info!("add: {} {}", snapshot.index, snapshot.id);
                RegistryChange::Added(snapshot)
            }
            Some(_) => RegistryChange::Updated(snapshot),
        }
    }

    pub fn remove(&mut self, index: usize) -> Option<RegistryChange> {
        let removed = self.devices.remove(&index)?;
        info!("disconnect: {} {}", index, removed.id);
        Some(RegistryChange::Removed(index))
    }

    /// Folds one poll in: disconnects first, then every current snapshot.
    pub fn apply(&mut self, poll: PadPoll) -> Vec<RegistryChange> {
        let mut changes = Vec::new();
        for notice in poll.notices {
            match notice {
                PadNotice::Connected(index) => info!("connect: {index}"),
                PadNotice::Disconnected(index) => changes.extend(self.remove(index)),
            }
        }
        for snapshot in poll.snapshots {
            changes.push(self.upsert(snapshot));
        }
        changes
    }

    pub fn snapshots(&self) -> Vec<DeviceSnapshot> {
        self.devices.values().cloned().collect()
    }

    pub fn get(&self, index: usize) -> Option<&DeviceSnapshot> {
        self.devices.get(&index)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
