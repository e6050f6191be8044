mod communicator;
mod crc;
mod protocol;
mod serial;

pub use communicator::RefereeCommunicator;
pub use crc::{append_crc16, append_crc8, verify_crc16, verify_crc8};
pub use protocol::{
    build_frame, CommandCode, DartInfo, EventData, GameResult, GameRobotHp, GameStatus, MapRobot,
    RadarInfo, RadarMarkData, RefereeWarning, RobotInteraction, RobotStatus, SubContentId,
};
pub use serial::{SerialDevice, TtyDevice};
