use anyhow::Context;
use chrono::Utc;
use std::path::{Path, PathBuf};

/// Durable storage for vehicle crops taken on region entry.
pub trait SnapshotStore: Send + Sync {
    fn save(&self, camera_id: &str, jpeg: &[u8]) -> anyhow::Result<PathBuf>;
}

/// Writes `vehicle_<camera>_<timestamp>.jpg` files into one directory.
pub struct DiskSnapshotStore {
    dir: PathBuf,
}

impl DiskSnapshotStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn sanitize(camera_id: &str) -> String {
    camera_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

impl SnapshotStore for DiskSnapshotStore {
    fn save(&self, camera_id: &str, jpeg: &[u8]) -> anyhow::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%6f");
        let path = self
            .dir
            .join(format!("vehicle_{}_{}.jpg", sanitize(camera_id), stamp));
        std::fs::write(&path, jpeg).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_named_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskSnapshotStore::new(dir.path().join("detect_image"));
        let path = store.save("gate/1", b"jpeg").unwrap();

        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("vehicle_gate_1_"), "{name}");
        assert!(name.ends_with(".jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg");
    }
}
