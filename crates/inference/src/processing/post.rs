use super::LetterboxTransform;
use crate::types::{BoundingBox, Detection};
use ndarray::ArrayViewD;

pub const DEFAULT_IOU_THRESHOLD: f32 = 0.45;

pub struct PostProcessor {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

impl PostProcessor {
    pub fn new(confidence_threshold: f32, iou_threshold: f32) -> Self {
        Self {
            confidence_threshold,
            iou_threshold,
        }
    }

    /// Decodes a YOLOv8/11 head `[1, 4 + C, N]` (cxcywh in input pixels, then
    /// per-class scores), keeps `classes` (all when empty), maps boxes back to
    /// frame coordinates and applies per-class NMS.
    pub fn parse_detections(
        &self,
        output: &ArrayViewD<f32>,
        transform: &LetterboxTransform,
        classes: &[u16],
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = output.shape();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            anyhow::bail!("Unexpected detector output shape {:?}", shape);
        }
        let num_classes = shape[1] - 4;
        let num_anchors = shape[2];

        let mut candidates = Vec::new();
        for i in 0..num_anchors {
            let mut best_score = f32::NEG_INFINITY;
            let mut best_class = 0usize;
            for c in 0..num_classes {
                let score = output[[0, 4 + c, i]];
                if score > best_score {
                    best_score = score;
                    best_class = c;
                }
            }
            if best_score < self.confidence_threshold {
                continue;
            }
            let class_id = best_class as u16;
            if !classes.is_empty() && !classes.contains(&class_id) {
                continue;
            }

            let (x1, y1, x2, y2) = cxcywh_to_xyxy(
                output[[0, 0, i]],
                output[[0, 1, i]],
                output[[0, 2, i]],
                output[[0, 3, i]],
            );
            candidates.push(Detection {
                bbox: unletterbox(BoundingBox::new(x1, y1, x2, y2), transform),
                class_id,
                confidence: best_score,
            });
        }

        Ok(non_max_suppression(candidates, self.iou_threshold))
    }
}

#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> (f32, f32, f32, f32) {
    (cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
}

fn unletterbox(b: BoundingBox, t: &LetterboxTransform) -> BoundingBox {
    let fx = |x: f32| ((x - t.offset_x) / t.scale).clamp(0.0, t.orig_width as f32);
    let fy = |y: f32| ((y - t.offset_y) / t.scale).clamp(0.0, t.orig_height as f32);
    BoundingBox::new(fx(b.x1), fy(b.y1), fx(b.x2), fy(b.y2))
}

/// Greedy per-class NMS, highest confidence first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len());
    for det in detections {
        let suppressed = kept
            .iter()
            .any(|k| k.class_id == det.class_id && k.bbox.iou(&det.bbox) > iou_threshold);
        if !suppressed {
            kept.push(det);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, IxDyn};

    /// Builds a `[1, 4 + num_classes, n]` head from (cxcywh, class, score) rows.
    fn yolo_output(rows: &[([f32; 4], usize, f32)], num_classes: usize) -> Array<f32, IxDyn> {
        let n = rows.len();
        let mut out = Array::zeros(IxDyn(&[1, 4 + num_classes, n]));
        for (i, (b, class, score)) in rows.iter().enumerate() {
            for k in 0..4 {
                out[[0, k, i]] = b[k];
            }
            out[[0, 4 + class, i]] = *score;
        }
        out
    }

    fn identity(w: u32, h: u32) -> LetterboxTransform {
        LetterboxTransform {
            orig_width: w,
            orig_height: h,
            scale: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    #[test]
    fn test_cxcywh_to_xyxy() {
        assert_eq!(cxcywh_to_xyxy(50.0, 50.0, 40.0, 20.0), (30.0, 40.0, 70.0, 60.0));
    }

    #[test]
    fn test_confidence_threshold_filtering() {
        let out = yolo_output(
            &[
                ([100.0, 100.0, 20.0, 20.0], 2, 0.2),
                ([300.0, 300.0, 20.0, 20.0], 2, 0.25),
                ([500.0, 500.0, 20.0, 20.0], 7, 0.9),
            ],
            80,
        );
        let post = PostProcessor::new(0.25, DEFAULT_IOU_THRESHOLD);
        let dets = post
            .parse_detections(&out.view(), &identity(640, 640), &[])
            .unwrap();
        assert_eq!(dets.len(), 2, "score below threshold should be dropped");
        assert_eq!(dets[0].class_id, 7, "highest confidence first");
        assert_eq!(dets[1].class_id, 2);
    }

    #[test]
    fn test_class_filter() {
        let out = yolo_output(
            &[
                ([100.0, 100.0, 20.0, 20.0], 0, 0.9),
                ([300.0, 300.0, 20.0, 20.0], 2, 0.8),
            ],
            80,
        );
        let post = PostProcessor::new(0.25, DEFAULT_IOU_THRESHOLD);
        let dets = post
            .parse_detections(&out.view(), &identity(640, 640), &[2, 3, 5, 7])
            .unwrap();
        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].class_id, 2, "person must be filtered for vehicles");
    }

    #[test]
    fn test_coordinate_inverse_transformation() {
        // 800x600 frame into 640: scale 0.8, resized 640x480, offset_y 80
        let transform = LetterboxTransform {
            orig_width: 800,
            orig_height: 600,
            scale: 0.8,
            offset_x: 0.0,
            offset_y: 80.0,
        };
        let out = yolo_output(&[([320.0, 320.0, 64.0, 48.0], 2, 0.9)], 80);
        let dets = PostProcessor::new(0.25, 0.45)
            .parse_detections(&out.view(), &transform, &[])
            .unwrap();
        let b = dets[0].bbox;
        // input (288, 296)-(352, 344) → frame (360, 270)-(440, 330)
        assert!((b.x1 - 360.0).abs() < 1e-3, "x1 = {}", b.x1);
        assert!((b.y1 - 270.0).abs() < 1e-3, "y1 = {}", b.y1);
        assert!((b.x2 - 440.0).abs() < 1e-3, "x2 = {}", b.x2);
        assert!((b.y2 - 330.0).abs() < 1e-3, "y2 = {}", b.y2);
    }

    #[test]
    fn test_boxes_clamped_to_frame() {
        let out = yolo_output(&[([10.0, 10.0, 60.0, 60.0], 2, 0.9)], 80);
        let dets = PostProcessor::new(0.25, 0.45)
            .parse_detections(&out.view(), &identity(640, 640), &[])
            .unwrap();
        assert_eq!(dets[0].bbox.x1, 0.0);
        assert_eq!(dets[0].bbox.y1, 0.0);
    }

    #[test]
    fn test_nms_suppresses_same_class_only() {
        let out = yolo_output(
            &[
                ([100.0, 100.0, 50.0, 50.0], 2, 0.9),
                ([102.0, 101.0, 50.0, 50.0], 2, 0.8),
                ([101.0, 100.0, 50.0, 50.0], 7, 0.7),
            ],
            80,
        );
        let dets = PostProcessor::new(0.25, 0.45)
            .parse_detections(&out.view(), &identity(640, 640), &[])
            .unwrap();
        assert_eq!(dets.len(), 2, "overlapping car suppressed, truck kept");
        assert!((dets[0].confidence - 0.9).abs() < 1e-6);
        assert_eq!(dets[1].class_id, 7);
    }

    #[test]
    fn test_rejects_malformed_shape() {
        let out = Array::<f32, _>::zeros(IxDyn(&[1, 4, 10]));
        assert!(
            PostProcessor::new(0.25, 0.45)
                .parse_detections(&out.view(), &identity(640, 640), &[])
                .is_err()
        );
    }
}
