//! Single object track (STrack) owned by one ByteTrack instance.

use crate::error::Result;
use crate::tracker::kalman_filter::{KalmanFilter, StateCovariance, StateMean};
use crate::tracker::rect::Rect;
use crate::tracker::track_state::TrackState;

#[derive(Debug, Clone)]
pub struct STrack {
    /// Zero until the track is activated; allocated by the owning tracker
    pub track_id: u64,
    pub state: TrackState,
    /// Whether the track has been confirmed
    pub is_activated: bool,
    pub score: f64,
    /// Last frame the track was updated on
    pub frame_id: u32,
    pub start_frame: u32,
    pub tracklet_len: u32,
    kalman: Option<(StateMean, StateCovariance)>,
    /// Box of the detection that spawned or last updated the track
    detection_box: Rect,
}

impl STrack {
    pub fn new(detection_box: Rect, score: f64) -> Self {
        Self {
            track_id: 0,
            state: TrackState::New,
            is_activated: false,
            score,
            frame_id: 0,
            start_frame: 0,
            tracklet_len: 0,
            kalman: None,
            detection_box,
        }
    }

    /// Current box estimate; the raw detection box until the filter is seeded.
    pub fn rect(&self) -> Rect {
        match &self.kalman {
            Some((mean, _)) => Rect::from_xyah(mean[0], mean[1], mean[2], mean[3]),
            None => self.detection_box,
        }
    }

    pub fn end_frame(&self) -> u32 {
        self.frame_id
    }

    pub fn activate(&mut self, kalman_filter: &KalmanFilter, frame_id: u32, track_id: u64) {
        self.track_id = track_id;
        self.kalman = Some(kalman_filter.initiate(self.detection_box.to_xyah()));
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        if frame_id == 1 {
            self.is_activated = true;
        }
        self.frame_id = frame_id;
        self.start_frame = frame_id;
    }

    pub fn re_activate(
        &mut self,
        new_track: &STrack,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
    ) -> Result<()> {
        self.correct(new_track, kalman_filter)?;
        self.tracklet_len = 0;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.frame_id = frame_id;
        self.score = new_track.score;
        Ok(())
    }

    pub fn update(
        &mut self,
        new_track: &STrack,
        kalman_filter: &KalmanFilter,
        frame_id: u32,
    ) -> Result<()> {
        self.frame_id = frame_id;
        self.tracklet_len += 1;
        self.correct(new_track, kalman_filter)?;
        self.state = TrackState::Tracked;
        self.is_activated = true;
        self.score = new_track.score;
        Ok(())
    }

    fn correct(&mut self, new_track: &STrack, kalman_filter: &KalmanFilter) -> Result<()> {
        self.detection_box = new_track.detection_box;
        if let Some((mean, cov)) = &self.kalman {
            self.kalman = Some(kalman_filter.update(mean, cov, new_track.detection_box.to_xyah())?);
        }
        Ok(())
    }

    pub fn predict(&mut self, kalman_filter: &KalmanFilter) {
        if let Some((mean, cov)) = &self.kalman {
            let mut mean = *mean;
            if self.state != TrackState::Tracked {
                // height velocity
                mean[7] = 0.0;
            }
            self.kalman = Some(kalman_filter.predict(&mean, cov));
        }
    }

    pub fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
    }

    pub fn mark_removed(&mut self) {
        self.state = TrackState::Removed;
    }
}
