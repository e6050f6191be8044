//! Perception core of a radar station: fuses camera detections with LiDAR
//! point clouds to locate opposing robots, tracks them across frames with
//! stable identities, and reports their field positions to the referee
//! system over a CRC-protected serial protocol.

pub mod error;
pub mod locator;
pub mod pipeline;
pub mod rect;
pub mod referee;
pub mod robot;
pub mod tracker;

pub use error::Error;
pub use locator::{Locator, LocatorConfig};
pub use pipeline::RadarPipeline;
pub use rect::Rect;
pub use referee::{RefereeCommunicator, SerialDevice, TtyDevice};
pub use robot::{Color, Detection, Label, Robot};
pub use tracker::{RobotTracker, TrackState, TrackerConfig};
