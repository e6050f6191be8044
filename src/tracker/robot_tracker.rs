//! Multi-object tracker over located robot observations.

use nalgebra::Vector3;
use ndarray::Array2;

use crate::robot::Robot;
use crate::tracker::matching;
use crate::tracker::track::Track;
use crate::tracker::track_state::TrackState;

/// Configuration for the robot tracker.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Number of detector classes (feature vector dimension)
    pub class_num: usize,
    /// Consecutive matches needed to confirm a tentative track
    pub init_thresh: u32,
    /// Missed updates tolerated before a confirmed track dies
    pub miss_thresh: u32,
    /// Singer model: maximum maneuver acceleration (m/s^2)
    pub max_acceleration: f32,
    /// Singer model: acceleration correlation time constant (s)
    pub acceleration_correlation_time: f32,
    /// Standard deviation of the position observation per axis (m)
    pub observation_noise: Vector3<f32>,
    /// Weight of the distance score in the matching utility
    pub distance_weight: f32,
    /// Weight of the feature score in the matching utility
    pub feature_weight: f32,
    /// Iteration cap for the auction assignment
    pub max_iter: usize,
    /// Distance threshold (m) anchoring the distance score
    pub distance_thresh: f32,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            class_num: 12,
            init_thresh: 4,
            miss_thresh: 5,
            max_acceleration: 8.0,
            acceleration_correlation_time: 1.0,
            observation_noise: Vector3::new(0.1, 0.1, 0.1),
            distance_weight: 0.7,
            feature_weight: 0.3,
            max_iter: 100,
            distance_thresh: 1.0,
        }
    }
}

/// Tracks opposing robots across frames, assigning stable ids.
pub struct RobotTracker {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl RobotTracker {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 0,
        }
    }

    /// Live tracks after the last update (never contains deleted ones).
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    /// Matching utility of a (track, robot) pair; higher is better.
    fn utility(&self, track: &Track, robot: &Robot) -> f32 {
        if !robot.is_located() && !robot.is_detected() {
            return 0.0;
        }

        let distance_score = match robot.location() {
            None => 0.0,
            Some(location) => {
                let distance = (location - track.location()).norm();
                matching::distance_score(distance, self.config.distance_thresh)
            }
        };
        let feature_score =
            matching::feature_score(&robot.feature(self.config.class_num), track.feature());

        distance_score * self.config.distance_weight + feature_score * self.config.feature_weight
    }

    /// Run one tracking step over the frame's robots.
    ///
    /// Matched robots receive their track identity via [`Robot::set_track`];
    /// unmatched located-and-detected robots give birth to tentative tracks.
    pub fn update(&mut self, robots: &mut [Robot], timestamp: f64) {
        for track in &mut self.tracks {
            track.predict(timestamp);
        }

        let mut utility = Array2::zeros((self.tracks.len(), robots.len()));
        for (track_index, track) in self.tracks.iter().enumerate() {
            for (robot_index, robot) in robots.iter().enumerate() {
                utility[[track_index, robot_index]] = self.utility(track, robot);
            }
        }
        let assignment = matching::auction(&utility, self.config.max_iter);

        let mut robot_matched = vec![false; robots.len()];
        for (track_index, assigned) in assignment.iter().enumerate() {
            let track = &mut self.tracks[track_index];
            match assigned {
                None => {
                    if track.is_tentative() {
                        track.set_state(TrackState::Deleted);
                    } else if track.is_confirmed() {
                        track.miss_count += 1;
                        if track.miss_count >= self.config.miss_thresh {
                            track.set_state(TrackState::Deleted);
                        }
                    }
                }
                Some(robot_index) => {
                    let robot = &mut robots[*robot_index];
                    if let Some(location) = robot.location() {
                        track.update(location, robot.feature(self.config.class_num));
                        track.miss_count = 0;
                        if track.is_tentative() {
                            track.init_count += 1;
                            if track.init_count >= self.config.init_thresh {
                                track.set_state(TrackState::Confirmed);
                            }
                        }
                    }
                    robot.set_track(track);
                    robot_matched[*robot_index] = true;
                }
            }
        }

        // Births: every unmatched robot that is both detected and located
        // seeds a new tentative track.
        for (robot, matched) in robots.iter_mut().zip(&robot_matched) {
            if *matched {
                continue;
            }
            let Some(location) = robot.location() else {
                continue;
            };
            if !robot.is_detected() {
                continue;
            }

            let track = Track::new(
                location,
                robot.feature(self.config.class_num),
                timestamp,
                self.next_id,
                self.config.max_acceleration,
                self.config.acceleration_correlation_time,
                self.config.observation_noise,
            );
            self.next_id += 1;
            robot.set_track(&track);
            self.tracks.push(track);
        }

        self.tracks.retain(|track| !track.is_deleted());
    }
}
