/// Lifecycle of one ByteTrack track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackState {
    #[default]
    New,
    Tracked,
    /// Unmatched but kept for re-identification within the track buffer
    Lost,
    Removed,
}
