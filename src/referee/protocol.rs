//! Referee-system frame layout and typed record parsers.
//!
//! Frame: `SOF(0xA5) | data_len(u16) | seq(u8) | crc8(u8) | cmd(u16) |
//! data(data_len) | crc16(u16)`, everything little-endian. The header CRC8
//! covers the four bytes before it; the CRC16 covers the whole frame before
//! itself.

use crate::referee::crc;

pub const SOF: u8 = 0xa5;
/// SOF + data length + sequence + CRC8.
pub const HEADER_LEN: usize = 5;
pub const CMD_LEN: usize = 2;
pub const CRC16_LEN: usize = 2;
/// Frame bytes that are not payload.
pub const FRAME_OVERHEAD: usize = HEADER_LEN + CMD_LEN + CRC16_LEN;

/// Command codes of the frames this station consumes or emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CommandCode {
    GameStatus = 0x0001,
    GameResult = 0x0002,
    GameRobotHp = 0x0003,
    EventData = 0x0101,
    SupplyProjectileAction = 0x0102,
    RefereeWarning = 0x0104,
    DartInfo = 0x0105,
    RobotStatus = 0x0201,
    RadarMarkData = 0x020c,
    RadarInfo = 0x020e,
    RobotInteraction = 0x0301,
    MapRobot = 0x0305,
}

impl CommandCode {
    pub fn from_u16(value: u16) -> Option<CommandCode> {
        use CommandCode::*;
        match value {
            0x0001 => Some(GameStatus),
            0x0002 => Some(GameResult),
            0x0003 => Some(GameRobotHp),
            0x0101 => Some(EventData),
            0x0102 => Some(SupplyProjectileAction),
            0x0104 => Some(RefereeWarning),
            0x0105 => Some(DartInfo),
            0x0201 => Some(RobotStatus),
            0x020c => Some(RadarMarkData),
            0x020e => Some(RadarInfo),
            0x0301 => Some(RobotInteraction),
            0x0305 => Some(MapRobot),
            _ => None,
        }
    }
}

/// Sub-command ids carried inside interaction frames (cmd 0x0301).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum SubContentId {
    /// Radar decision command (double-damage request)
    RadarCmd = 0x0121,
}

/// Referee server id used as the receiver of radar decision frames.
pub const REFEREE_SERVER_ID: u16 = 0x8080;

fn le_u16(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn le_u32(data: &[u8], offset: usize) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[offset..offset + 4]);
    u32::from_le_bytes(bytes)
}

fn le_u64(data: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

/// Global match phase and clock (cmd 0x0001).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameStatus {
    pub game_type: u8,
    pub game_progress: u8,
    pub stage_remain_time: u16,
    pub sync_timestamp: u64,
}

impl GameStatus {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 11 {
            return None;
        }
        Some(Self {
            game_type: data[0] & 0x0f,
            game_progress: data[0] >> 4,
            stage_remain_time: le_u16(data, 1),
            sync_timestamp: le_u64(data, 3),
        })
    }
}

/// Match outcome (cmd 0x0002).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameResult {
    pub winner: u8,
}

impl GameResult {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self { winner: *data.first()? })
    }
}

/// Hit points of every unit, red then blue (cmd 0x0003).
///
/// Index order per side: hero, engineer, infantry 3-5, sentry, outpost, base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameRobotHp {
    pub red: [u16; 8],
    pub blue: [u16; 8],
}

impl GameRobotHp {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 32 {
            return None;
        }
        let mut red = [0u16; 8];
        let mut blue = [0u16; 8];
        for i in 0..8 {
            red[i] = le_u16(data, i * 2);
            blue[i] = le_u16(data, 16 + i * 2);
        }
        Some(Self { red, blue })
    }
}

/// Site event bit field (cmd 0x0101).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventData {
    pub events: u32,
}

impl EventData {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        Some(Self {
            events: le_u32(data, 0),
        })
    }
}

/// Official projectile supplier action (cmd 0x0102).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupplyProjectileAction {
    pub supplier_id: u8,
    pub supply_robot_id: u8,
    pub projectile_step: u8,
    pub projectile_num: u8,
}

impl SupplyProjectileAction {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 4 {
            return None;
        }
        Some(Self {
            supplier_id: data[0],
            supply_robot_id: data[1],
            projectile_step: data[2],
            projectile_num: data[3],
        })
    }
}

/// Penalty broadcast (cmd 0x0104).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefereeWarning {
    pub level: u8,
    pub offending_robot_id: u8,
    pub count: u8,
}

impl RefereeWarning {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 3 {
            return None;
        }
        Some(Self {
            level: data[0],
            offending_robot_id: data[1],
            count: data[2],
        })
    }
}

/// Dart launching state (cmd 0x0105).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DartInfo {
    pub dart_remaining_time: u8,
    pub dart_state: u16,
}

impl DartInfo {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 3 {
            return None;
        }
        Some(Self {
            dart_remaining_time: data[0],
            dart_state: le_u16(data, 1),
        })
    }
}

/// Performance data of this radar station (cmd 0x0201).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotStatus {
    pub robot_id: u8,
    pub robot_level: u8,
    pub current_hp: u16,
    pub maximum_hp: u16,
    pub shooter_cooling_value: u16,
    pub shooter_heat_limit: u16,
    pub chassis_power_limit: u16,
    pub power_outputs: u8,
}

impl RobotStatus {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 13 {
            return None;
        }
        Some(Self {
            robot_id: data[0],
            robot_level: data[1],
            current_hp: le_u16(data, 2),
            maximum_hp: le_u16(data, 4),
            shooter_cooling_value: le_u16(data, 6),
            shooter_heat_limit: le_u16(data, 8),
            chassis_power_limit: le_u16(data, 10),
            power_outputs: data[12],
        })
    }
}

/// Radar mark progress per enemy unit (cmd 0x020C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadarMarkData {
    pub mark_progress: [u8; 6],
}

impl RadarMarkData {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        let bytes: [u8; 6] = data.get(..6)?.try_into().ok()?;
        Some(Self {
            mark_progress: bytes,
        })
    }
}

/// Radar decision quota and state (cmd 0x020E).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadarInfo {
    pub radar_info: u8,
}

impl RadarInfo {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            radar_info: *data.first()?,
        })
    }
}

/// Robot-to-robot interaction frame (cmd 0x0301), header plus raw payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotInteraction {
    pub sub_cmd: u16,
    pub sender: u16,
    pub receiver: u16,
    pub data: Vec<u8>,
}

impl RobotInteraction {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 6 {
            return None;
        }
        Some(Self {
            sub_cmd: le_u16(data, 0),
            sender: le_u16(data, 2),
            receiver: le_u16(data, 4),
            data: data[6..].to_vec(),
        })
    }

    /// Serialize an interaction payload for sending.
    pub fn to_bytes(sub_cmd: u16, sender: u16, receiver: u16, payload: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(6 + payload.len());
        data.extend_from_slice(&sub_cmd.to_le_bytes());
        data.extend_from_slice(&sender.to_le_bytes());
        data.extend_from_slice(&receiver.to_le_bytes());
        data.extend_from_slice(payload);
        data
    }
}

/// Outbound map position of one enemy robot (cmd 0x0305).
///
/// Coordinates are centimeters in the field frame, clamped to u16.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRobot {
    pub target_robot_id: u16,
    pub position_x_cm: u16,
    pub position_y_cm: u16,
}

impl MapRobot {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 6 {
            return None;
        }
        Some(Self {
            target_robot_id: le_u16(data, 0),
            position_x_cm: le_u16(data, 2),
            position_y_cm: le_u16(data, 4),
        })
    }

    pub fn to_bytes(&self) -> [u8; 6] {
        let mut bytes = [0u8; 6];
        bytes[0..2].copy_from_slice(&self.target_robot_id.to_le_bytes());
        bytes[2..4].copy_from_slice(&self.position_x_cm.to_le_bytes());
        bytes[4..6].copy_from_slice(&self.position_y_cm.to_le_bytes());
        bytes
    }
}

/// Assemble a complete CRC-protected frame around `data`.
pub fn build_frame(cmd: CommandCode, seq: u8, data: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(FRAME_OVERHEAD + data.len());
    frame.push(SOF);
    frame.extend_from_slice(&(data.len() as u16).to_le_bytes());
    frame.push(seq);
    crc::append_crc8(&mut frame);
    frame.extend_from_slice(&(cmd as u16).to_le_bytes());
    frame.extend_from_slice(data);
    crc::append_crc16(&mut frame);
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_frame_layout() {
        let frame = build_frame(CommandCode::GameResult, 3, &[0x01]);
        assert_eq!(frame.len(), FRAME_OVERHEAD + 1);
        assert_eq!(frame[0], SOF);
        assert_eq!(le_u16(&frame, 1), 1); // data length
        assert_eq!(frame[3], 3); // seq
        assert!(crc::verify_crc8(&frame[..HEADER_LEN]));
        assert!(crc::verify_crc16(&frame));
        assert_eq!(le_u16(&frame, 5), CommandCode::GameResult as u16);
        assert_eq!(frame[7], 0x01);
    }

    #[test]
    fn test_game_status_bitfield_split() {
        let mut data = vec![0x42]; // type 2, progress 4
        data.extend_from_slice(&120u16.to_le_bytes());
        data.extend_from_slice(&7u64.to_le_bytes());

        let status = GameStatus::from_bytes(&data).unwrap();
        assert_eq!(status.game_type, 2);
        assert_eq!(status.game_progress, 4);
        assert_eq!(status.stage_remain_time, 120);
        assert_eq!(status.sync_timestamp, 7);
    }

    #[test]
    fn test_robot_hp_layout() {
        let mut data = Vec::new();
        for hp in 1..=16u16 {
            data.extend_from_slice(&hp.to_le_bytes());
        }
        let hp = GameRobotHp::from_bytes(&data).unwrap();
        assert_eq!(hp.red[0], 1);
        assert_eq!(hp.red[7], 8);
        assert_eq!(hp.blue[0], 9);
        assert_eq!(hp.blue[7], 16);
    }

    #[test]
    fn test_map_robot_round_trip() {
        let sent = MapRobot {
            target_robot_id: 103,
            position_x_cm: 1024,
            position_y_cm: 755,
        };
        assert_eq!(MapRobot::from_bytes(&sent.to_bytes()), Some(sent));
    }

    #[test]
    fn test_interaction_round_trip() {
        let data = RobotInteraction::to_bytes(0x0121, 9, REFEREE_SERVER_ID, &[0x01]);
        let parsed = RobotInteraction::from_bytes(&data).unwrap();
        assert_eq!(parsed.sub_cmd, 0x0121);
        assert_eq!(parsed.sender, 9);
        assert_eq!(parsed.receiver, REFEREE_SERVER_ID);
        assert_eq!(parsed.data, vec![0x01]);
    }

    #[test]
    fn test_truncated_records_are_rejected() {
        assert!(GameStatus::from_bytes(&[0x00; 5]).is_none());
        assert!(GameRobotHp::from_bytes(&[0x00; 10]).is_none());
        assert!(RobotInteraction::from_bytes(&[0x00; 4]).is_none());
    }
}
