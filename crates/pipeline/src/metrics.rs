use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};

/// Instruments shared by camera workers and the preview loop.
#[derive(Clone)]
pub struct PipelineMetrics {
    pub frames: Counter<u64>,
    pub inference_failures: Counter<u64>,
    pub capture_failures: Counter<u64>,
    pub presence_edges: Counter<u64>,
    pub inference_duration: Histogram<f64>,
}

impl PipelineMetrics {
    pub fn new(meter_name: &'static str) -> Self {
        let meter = global::meter(meter_name);
        let latency_buckets = [
            0.005, 0.01, 0.02, 0.03, 0.05, 0.075, 0.1, 0.15, 0.2, 0.3, 0.5, 1.0,
        ];
        Self {
            frames: meter
                .u64_counter("pipeline_frames_processed_total")
                .with_description("Frames that went through detection and publishing")
                .build(),
            inference_failures: meter
                .u64_counter("pipeline_inference_failures_total")
                .with_description("Frames published without annotation after a detector error")
                .build(),
            capture_failures: meter
                .u64_counter("pipeline_capture_failures_total")
                .with_description("Read failures that triggered a rewind or reconnect")
                .build(),
            presence_edges: meter
                .u64_counter("pipeline_presence_edges_total")
                .with_description("Region enter/exit transitions")
                .build(),
            inference_duration: meter
                .f64_histogram("pipeline_inference_duration_seconds")
                .with_description("Detector latency per processed frame")
                .with_unit("s")
                .with_boundaries(latency_buckets.to_vec())
                .build(),
        }
    }

    pub fn camera(camera_id: &str) -> [KeyValue; 1] {
        [KeyValue::new("camera_id", camera_id.to_string())]
    }
}
