pub mod backend;
pub mod cache;
pub mod classes;
pub mod detector;
pub mod processing;
pub mod tracker;
pub mod types;

pub use backend::InferenceBackend;
pub use cache::ModelCache;
pub use classes::{DetectionTarget, class_name};
pub use detector::{Detector, DetectorConfig, DetectorFactory, YoloDetector};
pub use tracker::IouTracker;
pub use types::{BoundingBox, Detection, TrackedObject};

#[cfg(feature = "ort-backend")]
pub use detector::OrtDetectorFactory;
