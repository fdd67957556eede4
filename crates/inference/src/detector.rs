use crate::backend::InferenceBackend;
use crate::processing::post::{DEFAULT_IOU_THRESHOLD, PostProcessor};
use crate::processing::pre::{DEFAULT_INPUT_SIZE, PreProcessor};
use crate::tracker::IouTracker;
use crate::types::TrackedObject;
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Opaque image → tracked objects function.
///
/// Implementations keep per-stream tracking state, so one detector instance
/// belongs to one capture loop.
pub trait Detector: Send {
    /// `classes` restricts output to the given COCO ids; empty means all.
    fn detect(&mut self, frame: &RgbImage, classes: &[u16]) -> anyhow::Result<Vec<TrackedObject>>;
}

/// Loads detectors by model name, as configured in the detection settings.
pub trait DetectorFactory: Send + Sync {
    fn load(&self, model: &str) -> anyhow::Result<Box<dyn Detector>>;
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub models_dir: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            confidence_threshold: 0.25,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
            input_size: DEFAULT_INPUT_SIZE,
        }
    }
}

/// Maps a configured model name to its ONNX file.
///
/// Existing `.onnx` paths are used as is; anything else (`yolo11l.pt`,
/// `yolo11l`) resolves to `<models_dir>/<stem>.onnx`.
pub fn resolve_model_path(models_dir: &Path, model: &str) -> PathBuf {
    let given = Path::new(model);
    if given.extension().is_some_and(|ext| ext == "onnx") && given.is_file() {
        return given.to_path_buf();
    }
    let stem = given
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| model.to_string());
    models_dir.join(format!("{stem}.onnx"))
}

/// YOLO head decoding and IoU tracking around any [`InferenceBackend`].
pub struct YoloDetector<B: InferenceBackend> {
    backend: B,
    preprocessor: PreProcessor,
    postprocessor: PostProcessor,
    tracker: IouTracker,
}

impl<B: InferenceBackend> YoloDetector<B> {
    pub fn new(backend: B, config: &DetectorConfig) -> Self {
        Self {
            backend,
            preprocessor: PreProcessor::new(config.input_size),
            postprocessor: PostProcessor::new(config.confidence_threshold, config.iou_threshold),
            tracker: IouTracker::default(),
        }
    }
}

impl<B: InferenceBackend> Detector for YoloDetector<B> {
    fn detect(&mut self, frame: &RgbImage, classes: &[u16]) -> anyhow::Result<Vec<TrackedObject>> {
        let started = Instant::now();
        let (input, transform) = self.preprocessor.preprocess(frame)?;
        let head = self.backend.infer(&input)?;
        let detections = self
            .postprocessor
            .parse_detections(&head.view(), &transform, classes)?;
        let tracked = self.tracker.update(&detections);
        tracing::trace!(
            detections = tracked.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Frame inferred"
        );
        Ok(tracked)
    }
}

#[cfg(feature = "ort-backend")]
pub struct OrtDetectorFactory {
    config: DetectorConfig,
    provider: crate::backend::ort::ExecutionProvider,
}

#[cfg(feature = "ort-backend")]
impl OrtDetectorFactory {
    pub fn new(config: DetectorConfig, provider: crate::backend::ort::ExecutionProvider) -> Self {
        Self { config, provider }
    }
}

#[cfg(feature = "ort-backend")]
impl DetectorFactory for OrtDetectorFactory {
    fn load(&self, model: &str) -> anyhow::Result<Box<dyn Detector>> {
        use anyhow::Context;

        let path = resolve_model_path(&self.config.models_dir, model);
        if !path.is_file() {
            anyhow::bail!("Model file {} not found for {}", path.display(), model);
        }
        let path_str = path.to_string_lossy();
        let backend =
            crate::backend::ort::OrtBackend::load_model_with_provider(&path_str, self.provider)
                .with_context(|| format!("Failed to load model {}", path.display()))?;
        Ok(Box::new(YoloDetector::new(backend, &self.config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, ArrayD, IxDyn};

    /// Backend that always reports one car in the middle of a 640 input.
    struct FixedBackend;

    impl InferenceBackend for FixedBackend {
        fn load_model(_path: &str) -> anyhow::Result<Self> {
            Ok(FixedBackend)
        }

        fn infer(&mut self, _images: &Array<f32, IxDyn>) -> anyhow::Result<ArrayD<f32>> {
            let mut head = Array::zeros(IxDyn(&[1, 84, 1]));
            head[[0, 0, 0]] = 320.0;
            head[[0, 1, 0]] = 320.0;
            head[[0, 2, 0]] = 100.0;
            head[[0, 3, 0]] = 100.0;
            head[[0, 4 + 2, 0]] = 0.9;
            Ok(head)
        }
    }

    #[test]
    fn resolves_pt_names_to_onnx_in_models_dir() {
        let path = resolve_model_path(Path::new("models"), "yolo11l.pt");
        assert_eq!(path, PathBuf::from("models/yolo11l.onnx"));
        let path = resolve_model_path(Path::new("/opt/m"), "yolov8n");
        assert_eq!(path, PathBuf::from("/opt/m/yolov8n.onnx"));
    }

    #[test]
    fn detector_tracks_across_frames() {
        let config = DetectorConfig::default();
        let mut detector = YoloDetector::new(FixedBackend::load_model("").unwrap(), &config);
        let frame = RgbImage::new(640, 640);

        let first = detector.detect(&frame, &[2]).unwrap();
        let second = detector.detect(&frame, &[2]).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].track_id, second[0].track_id, "same object, same id");
        assert_eq!(first[0].class_id, 2);
    }

    #[test]
    fn detector_applies_class_filter() {
        let mut detector = YoloDetector::new(FixedBackend, &DetectorConfig::default());
        let frame = RgbImage::new(320, 320);
        assert!(detector.detect(&frame, &[0]).unwrap().is_empty());
    }
}
