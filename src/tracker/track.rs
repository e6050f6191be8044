//! Long-lived robot identity with filtered kinematic state.

use nalgebra::{DVector, Point3, Vector3};

use crate::tracker::singer_filter::SingerFilter;
use crate::tracker::track_state::TrackState;

/// One tracked robot identity.
///
/// The tracker owns the lifecycle counters; the track owns its filter state
/// and the running average of observed class-confidence features.
#[derive(Debug, Clone)]
pub struct Track {
    track_id: u64,
    state: TrackState,
    filter: SingerFilter,
    feature: DVector<f32>,
    feature_count: u32,
    pub(crate) init_count: u32,
    pub(crate) miss_count: u32,
    timestamp: f64,
}

impl Track {
    /// Create a tentative track from a first located observation.
    /// Creation counts as the first successful match.
    pub(crate) fn new(
        location: Point3<f32>,
        feature: DVector<f32>,
        timestamp: f64,
        track_id: u64,
        max_acceleration: f32,
        acceleration_correlation_time: f32,
        observation_noise: Vector3<f32>,
    ) -> Self {
        Self {
            track_id,
            state: TrackState::Tentative,
            filter: SingerFilter::new(
                location,
                max_acceleration,
                acceleration_correlation_time,
                observation_noise,
            ),
            feature,
            feature_count: 1,
            init_count: 1,
            miss_count: 0,
            timestamp,
        }
    }

    pub fn track_id(&self) -> u64 {
        self.track_id
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub(crate) fn set_state(&mut self, state: TrackState) {
        self.state = state;
    }

    pub fn is_tentative(&self) -> bool {
        self.state == TrackState::Tentative
    }

    pub fn is_confirmed(&self) -> bool {
        self.state == TrackState::Confirmed
    }

    pub fn is_deleted(&self) -> bool {
        self.state == TrackState::Deleted
    }

    /// Current filtered position in the world frame.
    pub fn location(&self) -> Point3<f32> {
        self.filter.location()
    }

    /// Running average of observed class-confidence features.
    pub fn feature(&self) -> &DVector<f32> {
        &self.feature
    }

    /// Class id the track believes in: the strongest feature entry.
    pub fn label(&self) -> i32 {
        self.feature
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(index, _)| index as i32)
            .unwrap_or(0)
    }

    /// Advance the filter to `timestamp`.
    pub(crate) fn predict(&mut self, timestamp: f64) {
        let dt = (timestamp - self.timestamp).max(0.0) as f32;
        self.filter.predict(dt);
        self.timestamp = timestamp;
    }

    /// Fold a matched observation into the filter and the feature average.
    pub(crate) fn update(&mut self, location: Point3<f32>, feature: DVector<f32>) {
        self.filter.update(location);

        debug_assert_eq!(self.feature.len(), feature.len());
        let count = self.feature_count as f32;
        self.feature = (&self.feature * count + feature) / (count + 1.0);
        self.feature_count += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn track_with_feature(feature: DVector<f32>) -> Track {
        Track::new(
            Point3::new(0.0, 0.0, 0.0),
            feature,
            0.0,
            0,
            8.0,
            1.0,
            Vector3::new(0.1, 0.1, 0.1),
        )
    }

    #[test]
    fn test_label_is_feature_argmax() {
        let track = track_with_feature(DVector::from_vec(vec![0.1, 0.7, 0.2]));
        assert_eq!(track.label(), 1);
    }

    #[test]
    fn test_new_track_is_tentative_with_one_hit() {
        let track = track_with_feature(DVector::zeros(3));
        assert_eq!(track.state(), TrackState::Tentative);
        assert_eq!(track.init_count, 1);
        assert_eq!(track.miss_count, 0);
    }

    #[test]
    fn test_feature_average_shifts_label() {
        let mut track = track_with_feature(DVector::from_vec(vec![1.0, 0.0]));
        for _ in 0..3 {
            track.update(
                Point3::new(0.0, 0.0, 0.0),
                DVector::from_vec(vec![0.0, 1.0]),
            );
        }
        // Three votes against one: the average now favors label 1.
        assert_eq!(track.label(), 1);
    }
}
