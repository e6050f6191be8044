mod matching;
mod robot_tracker;
mod singer_filter;
mod track;
mod track_state;

pub use matching::{auction, distance_score, feature_score};
pub use robot_tracker::{RobotTracker, TrackerConfig};
pub use singer_filter::SingerFilter;
pub use track::Track;
pub use track_state::TrackState;
