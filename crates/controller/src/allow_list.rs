use anyhow::{Context, Result};
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

/// Source of plates authorized to raise the barrier.
pub trait AllowList: Send + Sync {
    fn plates(&self) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// The allow-list providers a deployment can be configured with.
#[derive(Debug, Clone)]
pub enum AllowListSource {
    Static(Vec<String>),
    /// JSON array of strings, or one plate per line. Re-read on every check.
    File(PathBuf),
    /// GET returning a JSON array of strings.
    Http { client: reqwest::Client, url: String },
}

impl AllowListSource {
    pub fn http(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build allow-list client")?;
        Ok(Self::Http {
            client,
            url: url.into(),
        })
    }

    pub fn describe(&self) -> String {
        match self {
            AllowListSource::Static(plates) => format!("static ({} plates)", plates.len()),
            AllowListSource::File(path) => format!("file {}", path.display()),
            AllowListSource::Http { url, .. } => format!("http {url}"),
        }
    }
}

/// Parses a JSON string array, falling back to one plate per line.
pub fn parse_plate_list(text: &str) -> Vec<String> {
    let plates = match serde_json::from_str::<Vec<String>>(text) {
        Ok(plates) => plates,
        Err(_) => text.lines().map(str::to_string).collect(),
    };
    plates
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty() && !p.starts_with('#'))
        .collect()
}

impl AllowList for AllowListSource {
    async fn plates(&self) -> Result<Vec<String>> {
        match self {
            AllowListSource::Static(plates) => Ok(plates.clone()),
            AllowListSource::File(path) => {
                let text = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read allow-list {}", path.display()))?;
                Ok(parse_plate_list(&text))
            }
            AllowListSource::Http { client, url } => {
                let plates = client
                    .get(url)
                    .send()
                    .await
                    .with_context(|| format!("Allow-list service unreachable at {url}"))?
                    .error_for_status()
                    .context("Allow-list service returned an error")?
                    .json::<Vec<String>>()
                    .await
                    .context("Allow-list service returned invalid JSON")?;
                Ok(plates)
            }
        }
    }
}
