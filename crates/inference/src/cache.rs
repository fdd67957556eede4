use crate::detector::{Detector, DetectorFactory};
use std::sync::Arc;

/// Memoizes the loaded detector for one owner.
///
/// The model is loaded on first use and kept until the requested name changes
/// or [`ModelCache::invalidate`] is called.
pub struct ModelCache {
    factory: Arc<dyn DetectorFactory>,
    loaded: Option<(String, Box<dyn Detector>)>,
}

impl ModelCache {
    pub fn new(factory: Arc<dyn DetectorFactory>) -> Self {
        Self {
            factory,
            loaded: None,
        }
    }

    pub fn get(&mut self, model: &str) -> anyhow::Result<&mut dyn Detector> {
        let stale = !matches!(&self.loaded, Some((name, _)) if name == model);
        if stale {
            self.loaded = None;
            tracing::info!(model, "Loading detection model");
            let detector = self.factory.load(model)?;
            self.loaded = Some((model.to_string(), detector));
        }
        match self.loaded.as_mut() {
            Some((_, detector)) => Ok(detector.as_mut()),
            None => anyhow::bail!("model {model} not loaded"),
        }
    }

    pub fn invalidate(&mut self) {
        if let Some((name, _)) = self.loaded.take() {
            tracing::info!(model = %name, "Detection model invalidated");
        }
    }

    pub fn loaded_model(&self) -> Option<&str> {
        self.loaded.as_ref().map(|(name, _)| name.as_str())
    }
}
