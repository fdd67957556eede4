use crate::auth::TokenVerifier;
use crate::config::GatewayConfig;
use bus::{MemoryBus, SharedBus};
use capture::DefaultOpener;
use common::Backoff;
use controller::{
    AllowListSource, BarrierActuator, BarrierController, BusActuator, HttpPlateRecognizer, MqttActuator,
};
use inference::DetectorFactory;
use pipeline::{
    Annotator, DetectionSettings, DiskSnapshotStore, PipelineMetrics, SessionRegistry, StreamManager,
    WorkerDeps,
};
use std::sync::Arc;

pub type Barrier = BarrierController<HttpPlateRecognizer, AllowListSource>;

/// Everything the HTTP handlers share.
#[derive(Clone)]
pub struct AppState {
    pub bus: SharedBus,
    pub deps: WorkerDeps,
    pub registry: Arc<SessionRegistry>,
    pub stream: StreamManager,
    pub barrier: Arc<Barrier>,
    pub plates: HttpPlateRecognizer,
    pub auth: Arc<TokenVerifier>,
}

impl AppState {
    /// Wires the production collaborators described by `config`.
    pub fn build(config: &GatewayConfig) -> anyhow::Result<Self> {
        let bus: SharedBus = Arc::new(MemoryBus::new());
        let deps = WorkerDeps {
            bus: Arc::clone(&bus),
            opener: Arc::new(DefaultOpener::new(config.frame_width, config.frame_height)),
            detectors: detector_factory(config)?,
            annotator: Arc::new(Annotator::load(config.font_path.as_deref())?),
            snapshots: Arc::new(DiskSnapshotStore::new(&config.snapshot_dir)),
            metrics: PipelineMetrics::new("gateway"),
        };
        let settings = DetectionSettings::load(&config.settings_path);

        let plates = HttpPlateRecognizer::new(&config.plate_service_url, config.plate_service_timeout)?;
        let allow_list = allow_list(config)?;
        tracing::info!(allow_list = %allow_list.describe(), "Allow-list configured");

        let mut actuators: Vec<Arc<dyn BarrierActuator>> = vec![Arc::new(BusActuator::new(Arc::clone(&bus)))];
        if let Some(mqtt) = &config.mqtt {
            match MqttActuator::new(&mqtt.host, mqtt.port, mqtt.topic.clone(), mqtt.device_id.clone()) {
                Ok(actuator) => actuators.push(Arc::new(actuator)),
                Err(e) => tracing::warn!(error = %e, "MQTT disabled"),
            }
        }
        let barrier = BarrierController::new(
            Arc::clone(&bus),
            plates.clone(),
            allow_list,
            config.barrier,
            actuators,
        );

        let auth = TokenVerifier::from_config(&config.auth_tokens, config.auth_verify_url.as_deref())?;

        Ok(Self::from_parts(
            deps,
            settings,
            config.demo_dir.clone(),
            barrier,
            plates,
            auth,
        ))
    }

    pub fn from_parts(
        deps: WorkerDeps,
        settings: DetectionSettings,
        demo_dir: std::path::PathBuf,
        barrier: Barrier,
        plates: HttpPlateRecognizer,
        auth: TokenVerifier,
    ) -> Self {
        Self {
            bus: Arc::clone(&deps.bus),
            registry: Arc::new(SessionRegistry::new(deps.clone())),
            stream: StreamManager::new(deps.clone(), settings, demo_dir, Backoff::default()),
            deps,
            barrier: Arc::new(barrier),
            plates,
            auth: Arc::new(auth),
        }
    }

    /// Stops every capture loop. Blocks for at most the registry stop timeout per session.
    pub fn shutdown(&self) {
        self.stream.shutdown();
        self.registry.stop_all();
    }
}

fn allow_list(config: &GatewayConfig) -> anyhow::Result<AllowListSource> {
    if let Some(path) = &config.allow_list_path {
        return Ok(AllowListSource::File(path.clone()));
    }
    if let Some(url) = &config.allow_list_url {
        return AllowListSource::http(url, config.plate_service_timeout);
    }
    tracing::warn!("No ALLOW_LIST_PATH or ALLOW_LIST_URL configured, barrier will never open");
    Ok(AllowListSource::Static(Vec::new()))
}

#[cfg(feature = "ort-backend")]
fn detector_factory(config: &GatewayConfig) -> anyhow::Result<Arc<dyn DetectorFactory>> {
    use anyhow::Context;
    use inference::backend::ort::ExecutionProvider;
    use inference::{DetectorConfig, OrtDetectorFactory};

    let provider: ExecutionProvider = config
        .execution_provider
        .parse()
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("Invalid EXECUTION_PROVIDER")?;
    let detector_config = DetectorConfig {
        models_dir: config.models_dir.clone(),
        confidence_threshold: config.confidence_threshold,
        ..DetectorConfig::default()
    };
    tracing::info!(
        models_dir = %config.models_dir.display(),
        provider = ?provider,
        "ONNX Runtime detector configured"
    );
    Ok(Arc::new(OrtDetectorFactory::new(detector_config, provider)))
}

#[cfg(not(feature = "ort-backend"))]
fn detector_factory(_config: &GatewayConfig) -> anyhow::Result<Arc<dyn DetectorFactory>> {
    tracing::warn!("Built without an inference backend, frames are published unannotated");
    Ok(Arc::new(NoBackend))
}

#[cfg(not(feature = "ort-backend"))]
struct NoBackend;

#[cfg(not(feature = "ort-backend"))]
impl DetectorFactory for NoBackend {
    fn load(&self, model: &str) -> anyhow::Result<Box<dyn inference::Detector>> {
        anyhow::bail!("No inference backend compiled in, cannot load {model}")
    }
}
