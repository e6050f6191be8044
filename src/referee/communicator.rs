//! Bidirectional referee-system link: framing, decode dispatch and the
//! periodic map-update send path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use tracing::{debug, trace, warn};

use crate::error::Error;
use crate::referee::crc;
use crate::referee::protocol::{
    build_frame, CommandCode, DartInfo, EventData, GameResult, GameRobotHp, GameStatus, MapRobot,
    RadarInfo, RadarMarkData, RefereeWarning, RobotInteraction, RobotStatus, SubContentId,
    SupplyProjectileAction, CRC16_LEN, FRAME_OVERHEAD, HEADER_LEN, REFEREE_SERVER_ID, SOF,
};
use crate::referee::serial::SerialDevice;
use crate::robot::{Color, Label, Robot};

/// Receive-side decoder states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeStatus {
    /// Scanning for a start-of-frame byte
    Free,
    /// Waiting for a full header to check its CRC8
    Length,
    /// Waiting for the full frame to check its CRC16
    Crc16,
}

/// Receive buffer, send sequence and the latest decoded records.
///
/// Records are immutable snapshots swapped in under the exclusive lock;
/// readers clone the `Arc` under the shared lock.
#[derive(Default)]
struct CommState {
    buffer: Vec<u8>,
    seq: u8,
    game_status: Option<Arc<GameStatus>>,
    game_result: Option<Arc<GameResult>>,
    robot_hp: Option<Arc<GameRobotHp>>,
    event_data: Option<Arc<EventData>>,
    supply_action: Option<Arc<SupplyProjectileAction>>,
    referee_warning: Option<Arc<RefereeWarning>>,
    dart_info: Option<Arc<DartInfo>>,
    robot_status: Option<Arc<RobotStatus>>,
    radar_mark: Option<Arc<RadarMarkData>>,
    radar_info: Option<Arc<RadarInfo>>,
    sentry_data: Option<Arc<RobotInteraction>>,
    map_robot: Option<Arc<MapRobot>>,
}

/// Serial protocol engine for the referee system.
///
/// All methods take `&self`; the communicator is safe to share between the
/// pipeline thread (sending map updates) and a receive-polling thread.
pub struct RefereeCommunicator<S: SerialDevice> {
    serial: Mutex<S>,
    is_connected: AtomicBool,
    comm: RwLock<CommState>,
}

impl<S: SerialDevice> RefereeCommunicator<S> {
    /// Wrap a serial device, attempting to open it. A failed open leaves the
    /// communicator disconnected but constructed; see [`Self::reconnect`].
    pub fn new(mut serial: S) -> Self {
        let connected = serial.open().is_ok();
        if !connected {
            warn!("failed to open referee serial port");
        }
        Self {
            serial: Mutex::new(serial),
            is_connected: AtomicBool::new(connected),
            comm: RwLock::new(CommState::default()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.is_connected.load(Ordering::Acquire)
    }

    /// Try to reopen the serial device; returns the new connection status.
    pub fn reconnect(&self) -> bool {
        let mut serial = self.serial.lock().unwrap();
        let connected = serial.open().is_ok();
        self.is_connected.store(connected, Ordering::Release);
        connected
    }

    /// Drain inbound serial bytes through the decode state machine.
    /// A no-op while disconnected.
    pub fn update(&self) {
        if !self.is_connected() {
            return;
        }

        let mut chunk = [0u8; 512];
        let received = {
            let mut serial = self.serial.lock().unwrap();
            match serial.read(&mut chunk) {
                Ok(n) => n,
                Err(error) => {
                    warn!(%error, "referee serial read failed");
                    self.is_connected.store(false, Ordering::Release);
                    return;
                }
            }
        };
        if received == 0 {
            return;
        }

        let mut comm = self.comm.write().unwrap();
        comm.buffer.extend_from_slice(&chunk[..received]);
        Self::decode(&mut comm);
    }

    /// Report the position of every located enemy robot to the map.
    ///
    /// Our own color comes from the latest robot status record; without one
    /// the enemy set is unknown and nothing is sent.
    pub fn send_map_robot(&self, robots: &[Robot]) -> Result<(), Error> {
        let own_color = match self.robot_status() {
            Some(status) => color_of_id(status.robot_id as u16),
            None => {
                trace!("robot status not yet received, skipping map update");
                return Ok(());
            }
        };

        for robot in robots {
            let (Some(label_index), Some(location)) = (robot.label(), robot.location()) else {
                continue;
            };
            let Some(label) = Label::from_index(label_index) else {
                continue;
            };
            if label.color() == own_color {
                continue;
            }

            let payload = MapRobot {
                target_robot_id: label.referee_id(),
                position_x_cm: meters_to_cm(location.x),
                position_y_cm: meters_to_cm(location.y),
            };
            self.encode(CommandCode::MapRobot, &payload.to_bytes())?;
        }
        Ok(())
    }

    /// Send a radar decision command (double-damage request) to the referee
    /// server through an interaction frame.
    ///
    /// Our own id comes from the latest robot status record; without one
    /// nothing is sent.
    pub fn send_radar_decision(&self, command: u8) -> Result<(), Error> {
        let radar_id = match self.robot_status() {
            Some(status) => status.robot_id as u16,
            None => {
                trace!("robot status not yet received, skipping radar decision");
                return Ok(());
            }
        };
        let data = RobotInteraction::to_bytes(
            SubContentId::RadarCmd as u16,
            radar_id,
            REFEREE_SERVER_ID,
            &[command],
        );
        self.encode(CommandCode::RobotInteraction, &data)
    }

    pub fn game_status(&self) -> Option<Arc<GameStatus>> {
        self.comm.read().unwrap().game_status.clone()
    }

    pub fn game_result(&self) -> Option<Arc<GameResult>> {
        self.comm.read().unwrap().game_result.clone()
    }

    pub fn robot_hp(&self) -> Option<Arc<GameRobotHp>> {
        self.comm.read().unwrap().robot_hp.clone()
    }

    pub fn event_data(&self) -> Option<Arc<EventData>> {
        self.comm.read().unwrap().event_data.clone()
    }

    pub fn supply_action(&self) -> Option<Arc<SupplyProjectileAction>> {
        self.comm.read().unwrap().supply_action.clone()
    }

    pub fn referee_warning(&self) -> Option<Arc<RefereeWarning>> {
        self.comm.read().unwrap().referee_warning.clone()
    }

    pub fn dart_info(&self) -> Option<Arc<DartInfo>> {
        self.comm.read().unwrap().dart_info.clone()
    }

    pub fn robot_status(&self) -> Option<Arc<RobotStatus>> {
        self.comm.read().unwrap().robot_status.clone()
    }

    pub fn radar_mark(&self) -> Option<Arc<RadarMarkData>> {
        self.comm.read().unwrap().radar_mark.clone()
    }

    pub fn radar_info(&self) -> Option<Arc<RadarInfo>> {
        self.comm.read().unwrap().radar_info.clone()
    }

    pub fn sentry_data(&self) -> Option<Arc<RobotInteraction>> {
        self.comm.read().unwrap().sentry_data.clone()
    }

    /// Last map position seen on the wire (loopback diagnostics).
    pub fn map_robot(&self) -> Option<Arc<MapRobot>> {
        self.comm.read().unwrap().map_robot.clone()
    }

    /// Frame `data` under `cmd` and push it out the serial port. Takes the
    /// comm lock exclusively so sends serialize with decode dispatch.
    fn encode(&self, cmd: CommandCode, data: &[u8]) -> Result<(), Error> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }

        let mut comm = self.comm.write().unwrap();
        let seq = comm.seq;
        comm.seq = comm.seq.wrapping_add(1);
        let frame = build_frame(cmd, seq, data);

        let mut serial = self.serial.lock().unwrap();
        match serial.write(&frame) {
            Ok(_) => Ok(()),
            Err(error) => {
                warn!(%error, "referee serial write failed");
                self.is_connected.store(false, Ordering::Release);
                Err(error.into())
            }
        }
    }

    /// Run the Free/Length/CRC16 machine over the rolling buffer, consuming
    /// complete frames and dropping corrupt bytes.
    fn decode(comm: &mut CommState) {
        let mut status = DecodeStatus::Free;
        let mut frame_len = 0;

        loop {
            match status {
                DecodeStatus::Free => match comm.buffer.iter().position(|&b| b == SOF) {
                    Some(sof) => {
                        comm.buffer.drain(..sof);
                        status = DecodeStatus::Length;
                    }
                    None => {
                        comm.buffer.clear();
                        return;
                    }
                },
                DecodeStatus::Length => {
                    if comm.buffer.len() < HEADER_LEN {
                        return;
                    }
                    if !crc::verify_crc8(&comm.buffer[..HEADER_LEN]) {
                        debug!("header CRC8 mismatch, dropping SOF");
                        comm.buffer.remove(0);
                        status = DecodeStatus::Free;
                        continue;
                    }
                    let data_len =
                        u16::from_le_bytes([comm.buffer[1], comm.buffer[2]]) as usize;
                    frame_len = FRAME_OVERHEAD + data_len;
                    status = DecodeStatus::Crc16;
                }
                DecodeStatus::Crc16 => {
                    if comm.buffer.len() < frame_len {
                        return;
                    }
                    if crc::verify_crc16(&comm.buffer[..frame_len]) {
                        let cmd = u16::from_le_bytes([comm.buffer[5], comm.buffer[6]]);
                        let data: Vec<u8> =
                            comm.buffer[HEADER_LEN + 2..frame_len - CRC16_LEN].to_vec();
                        Self::fetch_data(comm, &data, cmd);
                        comm.buffer.drain(..frame_len);
                    } else {
                        debug!("frame CRC16 mismatch, dropping a byte");
                        comm.buffer.remove(0);
                    }
                    status = DecodeStatus::Free;
                }
            }
        }
    }

    /// Swap in a freshly parsed record for the matching command code.
    fn fetch_data(comm: &mut CommState, data: &[u8], cmd: u16) {
        let Some(command) = CommandCode::from_u16(cmd) else {
            trace!(cmd, "ignoring unknown command code");
            return;
        };

        match command {
            CommandCode::GameStatus => {
                if let Some(record) = GameStatus::from_bytes(data) {
                    comm.game_status = Some(Arc::new(record));
                }
            }
            CommandCode::GameResult => {
                if let Some(record) = GameResult::from_bytes(data) {
                    comm.game_result = Some(Arc::new(record));
                }
            }
            CommandCode::GameRobotHp => {
                if let Some(record) = GameRobotHp::from_bytes(data) {
                    comm.robot_hp = Some(Arc::new(record));
                }
            }
            CommandCode::EventData => {
                if let Some(record) = EventData::from_bytes(data) {
                    comm.event_data = Some(Arc::new(record));
                }
            }
            CommandCode::SupplyProjectileAction => {
                if let Some(record) = SupplyProjectileAction::from_bytes(data) {
                    comm.supply_action = Some(Arc::new(record));
                }
            }
            CommandCode::RefereeWarning => {
                if let Some(record) = RefereeWarning::from_bytes(data) {
                    comm.referee_warning = Some(Arc::new(record));
                }
            }
            CommandCode::DartInfo => {
                if let Some(record) = DartInfo::from_bytes(data) {
                    comm.dart_info = Some(Arc::new(record));
                }
            }
            CommandCode::RobotStatus => {
                if let Some(record) = RobotStatus::from_bytes(data) {
                    comm.robot_status = Some(Arc::new(record));
                }
            }
            CommandCode::RadarMarkData => {
                if let Some(record) = RadarMarkData::from_bytes(data) {
                    comm.radar_mark = Some(Arc::new(record));
                }
            }
            CommandCode::RadarInfo => {
                if let Some(record) = RadarInfo::from_bytes(data) {
                    comm.radar_info = Some(Arc::new(record));
                }
            }
            CommandCode::RobotInteraction => {
                if let Some(record) = RobotInteraction::from_bytes(data) {
                    if is_sentry(record.sender) {
                        comm.sentry_data = Some(Arc::new(record));
                    }
                }
            }
            CommandCode::MapRobot => {
                if let Some(record) = MapRobot::from_bytes(data) {
                    comm.map_robot = Some(Arc::new(record));
                }
            }
        }
    }
}

fn meters_to_cm(meters: f32) -> u16 {
    (meters * 100.0).round().clamp(0.0, u16::MAX as f32) as u16
}

fn color_of_id(robot_id: u16) -> Color {
    if robot_id < 100 {
        Color::Red
    } else {
        Color::Blue
    }
}

fn is_sentry(robot_id: u16) -> bool {
    robot_id == 7 || robot_id == 107
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meters_to_cm_clamps() {
        assert_eq!(meters_to_cm(1.0), 100);
        assert_eq!(meters_to_cm(-3.0), 0);
        assert_eq!(meters_to_cm(1e6), u16::MAX);
    }

    #[test]
    fn test_color_of_id() {
        assert_eq!(color_of_id(9), Color::Red);
        assert_eq!(color_of_id(109), Color::Blue);
    }

    #[test]
    fn test_decode_consumes_valid_frame() {
        let mut comm = CommState::default();
        comm.buffer
            .extend_from_slice(&build_frame(CommandCode::GameResult, 0, &[0x02]));
        RefereeCommunicator::<DummyDevice>::decode(&mut comm);

        assert_eq!(comm.game_result.as_deref(), Some(&GameResult { winner: 2 }));
        assert!(comm.buffer.is_empty());
    }

    #[test]
    fn test_decode_skips_garbage_and_corrupt_frames() {
        let mut comm = CommState::default();
        comm.buffer.extend_from_slice(&[0x11, 0x22, 0x33]);
        comm.buffer
            .extend_from_slice(&build_frame(CommandCode::GameResult, 0, &[0x01]));

        let mut corrupt = build_frame(CommandCode::RadarInfo, 1, &[0x05]);
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xff;
        comm.buffer.extend_from_slice(&corrupt);

        comm.buffer
            .extend_from_slice(&build_frame(CommandCode::RadarInfo, 2, &[0x07]));
        RefereeCommunicator::<DummyDevice>::decode(&mut comm);

        assert_eq!(comm.game_result.as_deref(), Some(&GameResult { winner: 1 }));
        assert_eq!(
            comm.radar_info.as_deref(),
            Some(&RadarInfo { radar_info: 0x07 })
        );
    }

    #[test]
    fn test_partial_frame_waits_for_more_bytes() {
        let frame = build_frame(CommandCode::GameResult, 0, &[0x01]);
        let mut comm = CommState::default();
        comm.buffer.extend_from_slice(&frame[..6]);
        RefereeCommunicator::<DummyDevice>::decode(&mut comm);
        assert!(comm.game_result.is_none());
        assert_eq!(comm.buffer.len(), 6);

        comm.buffer.extend_from_slice(&frame[6..]);
        RefereeCommunicator::<DummyDevice>::decode(&mut comm);
        assert!(comm.game_result.is_some());
    }

    #[test]
    fn test_interaction_from_non_sentry_is_ignored() {
        let mut comm = CommState::default();
        let data = RobotInteraction::to_bytes(0x0200, 3, 9, &[0xaa]);
        comm.buffer
            .extend_from_slice(&build_frame(CommandCode::RobotInteraction, 0, &data));
        RefereeCommunicator::<DummyDevice>::decode(&mut comm);
        assert!(comm.sentry_data.is_none());

        let data = RobotInteraction::to_bytes(0x0200, 7, 9, &[0xaa]);
        comm.buffer
            .extend_from_slice(&build_frame(CommandCode::RobotInteraction, 1, &data));
        RefereeCommunicator::<DummyDevice>::decode(&mut comm);
        assert!(comm.sentry_data.is_some());
    }

    /// Decode tests never touch a device; this satisfies the type parameter.
    struct DummyDevice;

    impl SerialDevice for DummyDevice {
        fn open(&mut self) -> std::io::Result<()> {
            Ok(())
        }
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Ok(0)
        }
        fn write(&mut self, data: &[u8]) -> std::io::Result<usize> {
            Ok(data.len())
        }
        fn is_open(&self) -> bool {
            true
        }
    }
}
