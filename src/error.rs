use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("serial API not supported on this host: {0}")]
    Unsupported(String),
    #[error("serial i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("gamepad backend unavailable: {0}")]
    Gamepad(String),
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serialport::Error> for BridgeError {
    fn from(value: serialport::Error) -> Self {
        match value.kind() {
            serialport::ErrorKind::Io(kind) => {
                BridgeError::Io(std::io::Error::new(kind, value.description))
            }
            _ => BridgeError::Connection(value.to_string()),
        }
    }
}

impl From<gilrs::Error> for BridgeError {
    fn from(value: gilrs::Error) -> Self {
        BridgeError::Gamepad(value.to_string())
    }
}
