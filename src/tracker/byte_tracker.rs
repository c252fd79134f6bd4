//! ByteTrack: two-stage association of high- and low-confidence detections.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::catalog::Frame;
use crate::detection::Detection;
use crate::error::{BenchError, Result};
use crate::tracker::kalman_filter::KalmanFilter;
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::rect::{Rect, iou_batch};
use crate::tracker::strack::STrack;
use crate::tracker::track_state::TrackState;
use crate::tracker::{MultiObjectTracker, TrackedBox};

/// Detections below this score never enter the second association.
const LOW_SCORE_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ByteTrackConfig {
    pub track_thresh: f64,
    pub match_thresh: f64,
    pub track_buffer: u32,
    pub frame_rate: f64,
}

impl Default for ByteTrackConfig {
    fn default() -> Self {
        Self {
            track_thresh: 0.25,
            match_thresh: 0.8,
            track_buffer: 30,
            frame_rate: 30.0,
        }
    }
}

impl ByteTrackConfig {
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !(self.track_thresh > 0.0 && self.track_thresh < 1.0) {
            return Err(format!("track_thresh must be in (0, 1), got {}", self.track_thresh));
        }
        // at 1.0 every zero-overlap pair would count as a match
        if !(self.match_thresh > 0.0 && self.match_thresh < 1.0) {
            return Err(format!("match_thresh must be in (0, 1), got {}", self.match_thresh));
        }
        if !(self.frame_rate > 0.0) {
            return Err(format!("frame_rate must be positive, got {}", self.frame_rate));
        }
        Ok(())
    }
}

pub struct ByteTrack {
    tracked_stracks: Vec<STrack>,
    lost_stracks: Vec<STrack>,
    frame_id: u32,
    config: ByteTrackConfig,
    max_time_lost: u32,
    kalman_filter: KalmanFilter,
    /// Last identity handed out by this instance
    last_track_id: u64,
}

impl ByteTrack {
    pub fn new(config: ByteTrackConfig) -> Result<Self> {
        config
            .validate()
            .map_err(|reason| BenchError::InvalidConfig(format!("bytetrack: {reason}")))?;
        let max_time_lost = (config.frame_rate / 30.0 * config.track_buffer as f64) as u32;
        Ok(Self {
            tracked_stracks: Vec::new(),
            lost_stracks: Vec::new(),
            frame_id: 0,
            config,
            max_time_lost,
            kalman_filter: KalmanFilter::default(),
            last_track_id: 0,
        })
    }

    fn next_track_id(&mut self) -> u64 {
        self.last_track_id += 1;
        self.last_track_id
    }

    /// Advances one frame. On error the tracker state is left as it was
    /// before the call.
    pub fn step(&mut self, detections: &[Detection]) -> Result<Vec<STrack>> {
        let frame_id = self.frame_id + 1;

        let mut activated_stracks = Vec::new();
        let mut refind_stracks = Vec::new();
        let mut lost_stracks = Vec::new();

        // Step 1: split detections into high-score and low-score
        let mut detections_high = Vec::new();
        let mut detections_low = Vec::new();
        for det in detections {
            if det.score >= self.config.track_thresh {
                detections_high.push(STrack::new(det.bbox, det.score));
            } else if det.score > LOW_SCORE_FLOOR {
                detections_low.push(STrack::new(det.bbox, det.score));
            }
        }

        let (tracked, mut unconfirmed): (Vec<_>, Vec<_>) = self
            .tracked_stracks
            .iter()
            .cloned()
            .partition(|t| t.is_activated);

        let mut strack_pool = joint_stracks(tracked, &self.lost_stracks);

        // Step 2: first association, with high score detections
        for track in strack_pool.iter_mut() {
            track.predict(&self.kalman_filter);
        }

        let mut dists = matching::iou_distance(&rects(&strack_pool), &rects(&detections_high));
        matching::fuse_score(&mut dists, &scores(&detections_high));

        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_detections,
        } = matching::linear_assignment(&dists, self.config.match_thresh);

        for (itracked, idet) in matches {
            let mut track = strack_pool[itracked].clone();
            let det = &detections_high[idet];
            if track.state == TrackState::Tracked {
                track.update(det, &self.kalman_filter, frame_id)?;
                activated_stracks.push(track);
            } else {
                track.re_activate(det, &self.kalman_filter, frame_id)?;
                refind_stracks.push(track);
            }
        }

        // Step 3: second association, with low score detections
        let r_tracked_stracks: Vec<STrack> = unmatched_tracks
            .iter()
            .map(|&idx| &strack_pool[idx])
            .filter(|t| t.state == TrackState::Tracked)
            .cloned()
            .collect();

        let dists_second =
            matching::iou_distance(&rects(&r_tracked_stracks), &rects(&detections_low));
        let AssignmentResult {
            matches: matches_second,
            unmatched_tracks: unmatched_tracks_second,
            ..
        } = matching::linear_assignment(&dists_second, 0.5);

        for (itracked, idet) in matches_second {
            let mut track = r_tracked_stracks[itracked].clone();
            let det = &detections_low[idet];
            if track.state == TrackState::Tracked {
                track.update(det, &self.kalman_filter, frame_id)?;
                activated_stracks.push(track);
            } else {
                track.re_activate(det, &self.kalman_filter, frame_id)?;
                refind_stracks.push(track);
            }
        }

        for idx in unmatched_tracks_second {
            let mut track = r_tracked_stracks[idx].clone();
            if track.state != TrackState::Lost {
                track.mark_lost();
                lost_stracks.push(track);
            }
        }

        // Unconfirmed tracks, usually tracks with only one beginning frame
        let detections_rem: Vec<STrack> = unmatched_detections
            .into_iter()
            .map(|idx| detections_high[idx].clone())
            .collect();

        let mut dist_unconfirmed =
            matching::iou_distance(&rects(&unconfirmed), &rects(&detections_rem));
        matching::fuse_score(&mut dist_unconfirmed, &scores(&detections_rem));

        let AssignmentResult {
            matches: matches_unconfirmed,
            unmatched_detections: unmatched_new,
            ..
        } = matching::linear_assignment(&dist_unconfirmed, 0.7);

        for (itracked, idet) in matches_unconfirmed {
            unconfirmed[itracked].update(&detections_rem[idet], &self.kalman_filter, frame_id)?;
            activated_stracks.push(unconfirmed[itracked].clone());
        }

        // nothing below can fail; commit the frame
        self.frame_id = frame_id;

        // Step 4: init new stracks
        for idx in unmatched_new {
            let mut track = detections_rem[idx].clone();
            if track.score < self.config.track_thresh + 0.1 {
                continue;
            }
            let track_id = self.next_track_id();
            track.activate(&self.kalman_filter, self.frame_id, track_id);
            activated_stracks.push(track);
        }

        // Step 5: age out lost tracks
        for track in self.lost_stracks.drain(..) {
            if self.frame_id - track.end_frame() <= self.max_time_lost {
                lost_stracks.push(track);
            }
        }

        self.tracked_stracks = activated_stracks
            .into_iter()
            .chain(refind_stracks)
            .filter(|t| t.state == TrackState::Tracked)
            .collect();
        let lost_stracks = sub_stracks(lost_stracks, &self.tracked_stracks);

        let (tracked, lost) = remove_duplicate_stracks(&self.tracked_stracks, &lost_stracks);
        self.tracked_stracks = tracked;
        self.lost_stracks = lost;

        Ok(self
            .tracked_stracks
            .iter()
            .filter(|t| t.is_activated)
            .cloned()
            .collect())
    }
}

impl MultiObjectTracker for ByteTrack {
    fn update(&mut self, detections: &[Detection], _frame: &Frame) -> Result<Vec<TrackedBox>> {
        Ok(self
            .step(detections)?
            .into_iter()
            .map(|t| TrackedBox {
                bbox: t.rect(),
                track_id: t.track_id,
            })
            .collect())
    }
}

fn rects(tracks: &[STrack]) -> Vec<Rect> {
    tracks.iter().map(STrack::rect).collect()
}

fn scores(tracks: &[STrack]) -> Vec<f64> {
    tracks.iter().map(|t| t.score).collect()
}

fn joint_stracks(tlista: Vec<STrack>, tlistb: &[STrack]) -> Vec<STrack> {
    let mut exists: HashSet<u64> = tlista.iter().map(|t| t.track_id).collect();
    let mut res = tlista;
    for t in tlistb {
        if exists.insert(t.track_id) {
            res.push(t.clone());
        }
    }
    res
}

fn sub_stracks(tlista: Vec<STrack>, tlistb: &[STrack]) -> Vec<STrack> {
    let b_ids: HashSet<u64> = tlistb.iter().map(|t| t.track_id).collect();
    tlista
        .into_iter()
        .filter(|t| !b_ids.contains(&t.track_id))
        .collect()
}

fn remove_duplicate_stracks(
    stracksa: &[STrack],
    stracksb: &[STrack],
) -> (Vec<STrack>, Vec<STrack>) {
    if stracksa.is_empty() || stracksb.is_empty() {
        return (stracksa.to_vec(), stracksb.to_vec());
    }

    let ious = iou_batch(&rects(stracksa), &rects(stracksb));
    let mut dupa = vec![false; stracksa.len()];
    let mut dupb = vec![false; stracksb.len()];

    for ((i, j), &iou) in ious.indexed_iter() {
        if iou > 0.85 {
            let time_a = stracksa[i].frame_id - stracksa[i].start_frame;
            let time_b = stracksb[j].frame_id - stracksb[j].start_frame;
            if time_a > time_b {
                dupb[j] = true;
            } else {
                dupa[i] = true;
            }
        }
    }

    let keep = |tracks: &[STrack], dup: &[bool]| -> Vec<STrack> {
        tracks
            .iter()
            .zip(dup)
            .filter(|(_, d)| !**d)
            .map(|(t, _)| t.clone())
            .collect()
    };
    (keep(stracksa, &dupa), keep(stracksb, &dupb))
}
