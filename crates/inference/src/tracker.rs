use crate::types::{BoundingBox, Detection, TrackedObject};

pub const DEFAULT_MATCH_IOU: f32 = 0.3;
pub const DEFAULT_MAX_MISSED: u32 = 30;

#[derive(Debug, Clone)]
struct Track {
    id: u32,
    bbox: BoundingBox,
    class_id: u16,
    missed: u32,
}

/// Greedy IoU tracker.
///
/// Each detection is matched to the existing track of the same class with the
/// highest overlap (at least `match_iou`). Unmatched detections open new
/// tracks; tracks unmatched for more than `max_missed` updates are dropped.
#[derive(Debug)]
pub struct IouTracker {
    tracks: Vec<Track>,
    next_id: u32,
    match_iou: f32,
    max_missed: u32,
}

impl Default for IouTracker {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_IOU, DEFAULT_MAX_MISSED)
    }
}

impl IouTracker {
    pub fn new(match_iou: f32, max_missed: u32) -> Self {
        Self {
            tracks: Vec::new(),
            next_id: 1,
            match_iou,
            max_missed,
        }
    }

    pub fn active_tracks(&self) -> usize {
        self.tracks.len()
    }

    pub fn reset(&mut self) {
        self.tracks.clear();
    }

    pub fn update(&mut self, detections: &[Detection]) -> Vec<TrackedObject> {
        let mut pairs: Vec<(f32, usize, usize)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (di, det) in detections.iter().enumerate() {
                if track.class_id != det.class_id {
                    continue;
                }
                let iou = track.bbox.iou(&det.bbox);
                if iou >= self.match_iou {
                    pairs.push((iou, ti, di));
                }
            }
        }
        pairs.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut track_used = vec![false; self.tracks.len()];
        let mut assigned: Vec<Option<u32>> = vec![None; detections.len()];
        for (_, ti, di) in pairs {
            if track_used[ti] || assigned[di].is_some() {
                continue;
            }
            track_used[ti] = true;
            let track = &mut self.tracks[ti];
            track.bbox = detections[di].bbox;
            track.missed = 0;
            assigned[di] = Some(track.id);
        }

        for (ti, used) in track_used.iter().enumerate() {
            if !used {
                self.tracks[ti].missed += 1;
            }
        }
        let max_missed = self.max_missed;
        self.tracks.retain(|t| t.missed <= max_missed);

        detections
            .iter()
            .zip(assigned)
            .map(|(det, id)| {
                let id = id.unwrap_or_else(|| {
                    let id = self.next_id;
                    self.next_id = self.next_id.wrapping_add(1).max(1);
                    self.tracks.push(Track {
                        id,
                        bbox: det.bbox,
                        class_id: det.class_id,
                        missed: 0,
                    });
                    id
                });
                TrackedObject {
                    track_id: Some(id),
                    bbox: det.bbox,
                    class_id: det.class_id,
                    confidence: det.confidence,
                }
            })
            .collect()
    }
}
