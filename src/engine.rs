// src/engine.rs
use log::{debug, error, info, warn};
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread;
use std::time::Instant;

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use crate::input::InputReducer;
use crate::protocol::{encode, parse_line, Command};
use crate::registry::{DeviceRegistry, GamepadSource, GilrsSource, ManualSource, RegistryChange};
use crate::serial::{ConnectOutcome, NativePorts, PortOpener, SerialEvent, SerialSession};
use crate::types::*;

/// GUI commands handled per loop pass before the frame runs.
const MAX_COMMANDS_PER_FRAME: usize = 32;

pub fn spawn_thread(config: BridgeConfig, tx: Sender<BridgeMessage>, rx_cmd: Receiver<GuiCommand>) {
    thread::spawn(move || {
        let pads: Box<dyn GamepadSource> = match GilrsSource::new() {
            Ok(source) => Box::new(source),
            Err(e) => {
                error!("{e}; continuing keyboard-only");
                tx.send(BridgeMessage::Log(format!("⚠️ {e}"))).ok();
                Box::new(ManualSource::default())
            }
        };
        let mut engine = Engine::new(config, Box::new(NativePorts), pads, tx);
        engine.refresh_ports();
        engine.run(rx_cmd);
    });
}

/// Single owner of the session, reducer, registry and game status.
pub struct Engine {
    config: BridgeConfig,
    session: SerialSession,
    reducer: InputReducer,
    registry: DeviceRegistry,
    status: GameStatus,
    opener: Box<dyn PortOpener>,
    pads: Box<dyn GamepadSource>,
    serial_tx: Sender<SerialEvent>,
    serial_rx: Receiver<SerialEvent>,
    tx: Sender<BridgeMessage>,
}

impl Engine {
    pub fn new(
        config: BridgeConfig,
        opener: Box<dyn PortOpener>,
        pads: Box<dyn GamepadSource>,
        tx: Sender<BridgeMessage>,
    ) -> Self {
        let (serial_tx, serial_rx) = channel();
        Self {
            session: SerialSession::new(config.baud_rate, config.connect_mode),
            reducer: InputReducer::new(&config),
            registry: DeviceRegistry::default(),
            status: GameStatus::default(),
            config,
            opener,
            pads,
            serial_tx,
            serial_rx,
            tx,
        }
    }

    pub fn run(&mut self, rx_cmd: Receiver<GuiCommand>) {
        info!("engine running, frame every {:?}", self.config.frame());
        loop {
            for _ in 0..MAX_COMMANDS_PER_FRAME {
                match rx_cmd.try_recv() {
                    Ok(cmd) => {
                        if !self.handle(cmd, Instant::now()) {
                            self.session.close();
                            return;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        self.session.close();
                        return;
                    }
                }
            }
            self.step(Instant::now());
            thread::sleep(self.config.frame());
        }
    }

    /// Applies one GUI command. Returns false on shutdown.
    pub fn handle(&mut self, cmd: GuiCommand, now: Instant) -> bool {
        match cmd {
            GuiCommand::Connect(port) => self.connect(port),
            GuiCommand::Disconnect => {
                self.session.close();
                self.send(BridgeMessage::Connection(ConnectionState::Disconnected));
            }
            GuiCommand::RefreshPorts => self.refresh_ports(),
            GuiCommand::KeyDown(key) => {
                self.reducer.key_down(&key, now, &self.status);
                self.flush_commands();
            }
            GuiCommand::KeyUp(key) => self.reducer.key_up(&key),
            GuiCommand::Shutdown => return false,
        }
        true
    }

    /// One animation frame: inbound lines, pads, reducer, outbound bytes.
    pub fn step(&mut self, now: Instant) {
        self.pump_serial();
        self.poll_pads();
        let pads = self.registry.snapshots();
        self.reducer.frame(&pads, now, &self.status);
        self.flush_commands();
    }

    pub fn status(&self) -> &GameStatus {
        &self.status
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn refresh_ports(&mut self) {
        match self.opener.available_ports() {
            Ok(ports) => self.send(BridgeMessage::Ports(ports)),
            Err(e) => {
                warn!("{e}");
                self.send(BridgeMessage::Connection(ConnectionState::Unsupported));
            }
        }
    }

    fn connect(&mut self, port: Option<String>) {
        let port = port.or_else(|| self.config.port.clone());
        let outcome =
            self.session
                .request_connect(port.as_deref(), self.opener.as_ref(), self.serial_tx.clone());
        match outcome {
            Ok(ConnectOutcome::Connected(name)) => {
                self.reducer.reset_boost();
                self.send(BridgeMessage::Log(format!("✅ Connected to {name}")));
                self.send(BridgeMessage::Connection(ConnectionState::Connected(name)));
            }
            Ok(ConnectOutcome::Disconnected) => {
                self.send(BridgeMessage::Connection(ConnectionState::Disconnected));
            }
            Ok(ConnectOutcome::AlreadyConnected) => {
                self.send(BridgeMessage::Log("Already connected".into()));
            }
            Err(BridgeError::Unsupported(e)) => {
                error!("serial unsupported: {e}");
                self.send(BridgeMessage::Connection(ConnectionState::Unsupported));
            }
            Err(e) => {
                error!("Error connecting to serial port: {e}");
                self.send(BridgeMessage::Log(format!("❌ {e}")));
                self.send(BridgeMessage::Connection(ConnectionState::Failed));
            }
        }
    }

    fn pump_serial(&mut self) {
        let was_connected = self.session.is_connected();
        let mut changed = false;
        while let Ok(event) = self.serial_rx.try_recv() {
            let Some(line) = self.session.accept(event) else {
                continue;
            };
            debug!("device says: {line}");
            for event in parse_line(&line, self.config.position_convention) {
                self.status.apply(event);
                changed = true;
            }
        }
        if changed {
            self.send(BridgeMessage::Status(self.status));
        }
        if was_connected && !self.session.is_connected() {
            self.send(BridgeMessage::Connection(ConnectionState::Disconnected));
        }
    }

    fn poll_pads(&mut self) {
        let poll = self.pads.poll();
        for change in self.registry.apply(poll) {
            let msg = match change {
                RegistryChange::Added(s) => BridgeMessage::DeviceAdded(s),
                RegistryChange::Updated(s) => BridgeMessage::DeviceUpdated(s),
                RegistryChange::Removed(index) => {
                    self.reducer.forget_device(index);
                    BridgeMessage::DeviceRemoved(index)
                }
            };
            self.send(msg);
        }
    }

    fn flush_commands(&mut self) {
        for command in self.reducer.take_commands() {
            let Some(byte) = encode(command) else {
                continue;
            };
            debug!("Sending serial command: {} ({command:?})", byte as char);
            if self.session.write(&[byte]) {
                self.send(BridgeMessage::CommandSent(byte as char));
            } else if let Command::Boost(on) = command {
                if self.session.is_connected() {
                    self.reducer.boost_undelivered(on);
                }
            }
        }
    }

    fn send(&self, msg: BridgeMessage) {
        // GUI gone means we are shutting down
        self.tx.send(msg).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{PadNotice, PadPoll};
    use crate::serial::tests::MemoryPorts;
    use std::time::Duration;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn pad(index: usize, axes: &[f32]) -> DeviceSnapshot {
        DeviceSnapshot {
            index,
            id: "pad".into(),
            mapping: "standard".into(),
            axes: axes.to_vec(),
            buttons: vec![ButtonState::default(); 17],
        }
    }

    fn engine(ports: MemoryPorts, pads: ManualSource) -> (Engine, Receiver<BridgeMessage>) {
        let (tx, rx) = channel();
        let config = BridgeConfig {
            port: Some("mem0".into()),
            ..BridgeConfig::default()
        };
        (Engine::new(config, Box::new(ports), Box::new(pads), tx), rx)
    }

    fn messages(rx: &Receiver<BridgeMessage>) -> Vec<BridgeMessage> {
        rx.try_iter().collect()
    }

    #[test]
    fn key_press_is_written_when_connected() {
        let ports = MemoryPorts::idle();
        let written = ports.written.clone();
        let (mut engine, rx) = engine(ports, ManualSource::default());
        let t0 = Instant::now();
        engine.handle(GuiCommand::Connect(None), t0);
        assert!(engine.is_connected());
        engine.handle(GuiCommand::KeyDown("ArrowUp".into()), t0);
        assert_eq!(*written.0.lock().unwrap(), b"U");
        let msgs = messages(&rx);
        assert!(msgs
            .iter()
            .any(|m| matches!(m, BridgeMessage::Connection(ConnectionState::Connected(p)) if p == "mem0")));
        assert!(msgs.iter().any(|m| matches!(m, BridgeMessage::CommandSent('U'))));
        engine.handle(GuiCommand::Disconnect, t0);
        assert!(!engine.is_connected());
    }

    #[test]
    fn nothing_written_while_disconnected() {
        let ports = MemoryPorts::idle();
        let written = ports.written.clone();
        let (mut engine, rx) = engine(ports, ManualSource::default());
        engine.handle(GuiCommand::KeyDown("w".into()), Instant::now());
        assert!(written.0.lock().unwrap().is_empty());
        assert!(!messages(&rx)
            .iter()
            .any(|m| matches!(m, BridgeMessage::CommandSent(_))));
    }

    #[test]
    fn failed_connect_reports_failure() {
        let ports = MemoryPorts {
            fail: true,
            ..MemoryPorts::idle()
        };
        let (mut engine, rx) = engine(ports, ManualSource::default());
        engine.handle(GuiCommand::Connect(None), Instant::now());
        assert!(!engine.is_connected());
        assert!(messages(&rx)
            .iter()
            .any(|m| matches!(m, BridgeMessage::Connection(ConnectionState::Failed))));
    }

    #[test]
    fn game_over_then_restart_key() {
        let ports = MemoryPorts {
            inbound: Some(b"SCORE:7\nGAME_OVER:7\n".to_vec()),
            keep_open: true,
            ..MemoryPorts::idle()
        };
        let written = ports.written.clone();
        let (mut engine, _rx) = engine(ports, ManualSource::default());
        let t0 = Instant::now();
        engine.handle(GuiCommand::Connect(None), t0);

        let deadline = Instant::now() + Duration::from_secs(2);
        while !engine.status().game_over && Instant::now() < deadline {
            engine.step(t0);
            thread::sleep(ms(5));
        }
        assert_eq!(engine.status().score, 7);
        assert!(engine.status().game_over);

        engine.handle(GuiCommand::KeyDown("Space".into()), t0);
        assert_eq!(*written.0.lock().unwrap(), b"X");
        engine.handle(GuiCommand::Shutdown, t0);
    }

    #[test]
    fn stream_end_reports_disconnect() {
        let ports = MemoryPorts {
            inbound: Some(b"GAME_RESET\n".to_vec()),
            ..MemoryPorts::idle()
        };
        let (mut engine, rx) = engine(ports, ManualSource::default());
        let t0 = Instant::now();
        engine.handle(GuiCommand::Connect(None), t0);
        let deadline = Instant::now() + Duration::from_secs(2);
        while engine.is_connected() && Instant::now() < deadline {
            engine.step(t0);
            thread::sleep(ms(5));
        }
        assert!(!engine.is_connected());
        let msgs = messages(&rx);
        assert!(matches!(
            msgs.last(),
            Some(BridgeMessage::Connection(ConnectionState::Disconnected))
        ));
    }

    #[test]
    fn held_stick_boosts_after_connect() {
        let ports = MemoryPorts::idle();
        let written = ports.written.clone();
        let pads = ManualSource::new(vec![PadPoll {
            notices: vec![PadNotice::Connected(0)],
            snapshots: vec![pad(0, &[0.0, 0.95])],
        }]);
        let (mut engine, _rx) = engine(ports, pads);
        let t0 = Instant::now();
        engine.step(t0);
        assert!(written.0.lock().unwrap().is_empty());

        engine.handle(GuiCommand::Connect(None), t0 + ms(16));
        engine.step(t0 + ms(32));
        engine.step(t0 + ms(150));
        assert_eq!(*written.0.lock().unwrap(), b"FD");
    }

    #[test]
    fn pads_flow_to_wire_and_gui() {
        let ports = MemoryPorts::idle();
        let written = ports.written.clone();
        let pads = ManualSource::new(vec![
            PadPoll {
                notices: vec![PadNotice::Connected(0)],
                snapshots: vec![pad(0, &[0.0, 0.95])],
            },
            PadPoll {
                notices: vec![],
                snapshots: vec![pad(0, &[0.0, 0.0])],
            },
            PadPoll {
                notices: vec![PadNotice::Disconnected(0)],
                snapshots: vec![],
            },
        ]);
        let (mut engine, rx) = engine(ports, pads);
        let t0 = Instant::now();
        engine.handle(GuiCommand::Connect(None), t0);
        engine.step(t0);
        engine.step(t0 + ms(16));
        engine.step(t0 + ms(32));
        assert_eq!(*written.0.lock().unwrap(), b"DFN");
        let msgs = messages(&rx);
        assert!(msgs.iter().any(|m| matches!(m, BridgeMessage::DeviceAdded(_))));
        assert!(msgs.iter().any(|m| matches!(m, BridgeMessage::DeviceUpdated(_))));
        assert!(msgs.iter().any(|m| matches!(m, BridgeMessage::DeviceRemoved(0))));
    }
}
