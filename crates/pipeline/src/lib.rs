//! Per-camera capture loops, region presence tracking and the shared live
//! preview, all publishing through the frame bus.

pub mod error;
pub mod metrics;
pub mod region;
pub mod registry;
pub mod render;
pub mod settings;
pub mod snapshot;
pub mod stream_manager;
pub mod worker;

pub use error::PipelineError;
pub use metrics::PipelineMetrics;
pub use region::{Edge, Point, Region, RegionError, RegionSpec, RegionTracker};
pub use registry::{DEFAULT_STOP_TIMEOUT, SessionRegistry, StartOutcome};
pub use render::{Annotation, Annotator, encode_jpeg};
pub use settings::{DetectionSettings, SourceType, Widgets};
pub use snapshot::{DiskSnapshotStore, SnapshotStore};
pub use stream_manager::{PREVIEW_ID, STREAM_INTERVAL, StreamManager, ViewerGuard};
pub use worker::{CameraWorker, SessionConfig, Step, WorkerDeps, WorkerExit, WorkerHandle};
