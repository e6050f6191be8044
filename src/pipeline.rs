//! Per-frame orchestrator bundling the locator, tracker and referee link.

use nalgebra::Point3;
use tracing::debug;

use crate::locator::Locator;
use crate::referee::{RefereeCommunicator, SerialDevice};
use crate::robot::{Detection, Robot};
use crate::tracker::RobotTracker;

/// One radar station pipeline.
///
/// The pipeline itself is single-threaded: each frame runs locate, track
/// and report in order. The subsystems parallelize internally where their
/// data allows it.
pub struct RadarPipeline<S: SerialDevice> {
    locator: Locator,
    tracker: RobotTracker,
    referee: RefereeCommunicator<S>,
}

impl<S: SerialDevice> RadarPipeline<S> {
    pub fn new(locator: Locator, tracker: RobotTracker, referee: RefereeCommunicator<S>) -> Self {
        Self {
            locator,
            tracker,
            referee,
        }
    }

    /// Process one synchronized frame.
    ///
    /// `detections` pairs each car detection with the armor detections found
    /// inside its crop; `cloud` is the matching LiDAR sweep. Returns the
    /// frame's robots with locations and track identities filled in.
    pub fn process_frame(
        &mut self,
        detections: &[(Detection, Vec<Detection>)],
        cloud: &[Point3<f32>],
        timestamp: f64,
    ) -> Vec<Robot> {
        let mut robots: Vec<Robot> = detections
            .iter()
            .map(|(car, armors)| Robot::new(car, armors))
            .collect();

        self.locator.update(cloud);
        self.locator.cluster();
        self.locator.search(&mut robots);
        self.tracker.update(&mut robots, timestamp);

        if let Err(error) = self.referee.send_map_robot(&robots) {
            debug!(%error, "map update not sent");
        }

        robots
    }

    /// Drain inbound referee frames. Call this between frames or from a
    /// dedicated polling thread.
    pub fn poll_referee(&self) {
        self.referee.update();
    }

    pub fn locator(&self) -> &Locator {
        &self.locator
    }

    pub fn tracker(&self) -> &RobotTracker {
        &self.tracker
    }

    pub fn referee(&self) -> &RefereeCommunicator<S> {
        &self.referee
    }
}
