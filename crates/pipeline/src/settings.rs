use capture::SourceSpec;
use inference::DetectionTarget;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Rtsp,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Widgets {
    pub video_widget: bool,
    pub access_button: bool,
}

impl Default for Widgets {
    fn default() -> Self {
        Self {
            video_widget: true,
            access_button: true,
        }
    }
}

/// Preview configuration, owned by the external settings store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DetectionSettings {
    pub source_type: Option<SourceType>,
    pub rtsp_url: String,
    pub video_path: String,
    pub video_file_name: String,
    pub detection_target: String,
    pub detection_model: String,
    pub widgets: Widgets,
}

impl Default for DetectionSettings {
    fn default() -> Self {
        Self {
            source_type: None,
            rtsp_url: String::new(),
            video_path: String::new(),
            video_file_name: String::new(),
            detection_target: "vehicles".to_string(),
            detection_model: "yolo11l.pt".to_string(),
            widgets: Widgets::default(),
        }
    }
}

fn merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                let nested = value.is_object() && base.get(&key).is_some_and(Value::is_object);
                if nested && let Some(slot) = base.get_mut(&key) {
                    merge(slot, value);
                } else {
                    base.insert(key, value);
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

impl DetectionSettings {
    /// Reads settings from a JSON file merged over the defaults.
    /// A missing or malformed file yields the defaults.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Settings file unreadable, using defaults");
                return Self::default();
            }
        };
        match serde_json::from_str::<Value>(&raw) {
            Ok(patch) => Self::default().merged(patch).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Settings file invalid, using defaults");
                Self::default()
            }),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Settings file malformed, using defaults");
                Self::default()
            }
        }
    }

    /// Applies a partial update. Only object keys present in `patch` change.
    pub fn merged(&self, patch: Value) -> Result<Self, serde_json::Error> {
        if !patch.is_object() {
            return Err(serde::de::Error::custom("settings update must be a JSON object"));
        }
        let mut base = serde_json::to_value(self)?;
        merge(&mut base, patch);
        serde_json::from_value(base)
    }

    /// Serialized view with credentials masked.
    pub fn public_view(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()));
        if let Some(obj) = value.as_object_mut()
            && !self.rtsp_url.is_empty()
        {
            obj.insert("rtspUrl".into(), Value::String("***".into()));
        }
        value
    }

    pub fn target(&self) -> DetectionTarget {
        self.detection_target.parse().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Falling back to vehicle detection");
            DetectionTarget::Vehicles
        })
    }

    /// Source for the preview feed, if one is configured.
    pub fn preview_source(&self, demo_dir: &Path) -> Option<SourceSpec> {
        match self.source_type? {
            SourceType::Rtsp => {
                let url = self.rtsp_url.trim();
                (!url.is_empty()).then(|| SourceSpec::parse(url))
            }
            SourceType::File => {
                if !self.video_path.trim().is_empty() {
                    return Some(SourceSpec::File(self.video_path.trim().into()));
                }
                let name = self.video_file_name.trim();
                (!name.is_empty()).then(|| SourceSpec::File(demo_dir.join(name)))
            }
        }
    }
}
