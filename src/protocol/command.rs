use crate::types::Direction;

/// Outbound intent, one byte on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Move(Direction),
    Boost(bool),
    SpeedUp,
    SpeedDown,
    Restart,
}

/// Wire byte for a command. `Move(Direction::None)` has none.
pub fn encode(command: Command) -> Option<u8> {
    let byte = match command {
        Command::Move(Direction::Up) => b'U',
        Command::Move(Direction::Down) => b'D',
        Command::Move(Direction::Left) => b'L',
        Command::Move(Direction::Right) => b'R',
        Command::Move(Direction::None) => return None,
        Command::Boost(true) => b'F',
        Command::Boost(false) => b'N',
        Command::SpeedUp => b'+',
        Command::SpeedDown => b'-',
        Command::Restart => b'X',
    };
    Some(byte)
}
