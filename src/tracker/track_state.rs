/// Track lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackState {
    /// Newly created track, not yet trusted
    Tentative,
    /// Track matched often enough to be trusted over raw detections
    Confirmed,
    /// Track scheduled for removal at the end of the update
    Deleted,
}
