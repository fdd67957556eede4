use anyhow::{Context, Result};
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// Opaque image → plate strings function.
pub trait PlateRecognizer: Send + Sync {
    fn recognize(&self, jpeg: Vec<u8>) -> impl Future<Output = Result<Vec<String>>> + Send;
}

/// Client for an HTTP plate service accepting a multipart `file` upload.
#[derive(Debug, Clone)]
pub struct HttpPlateRecognizer {
    client: reqwest::Client,
    url: String,
}

impl HttpPlateRecognizer {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build plate service client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Sends the image and returns the service's JSON response unchanged.
    pub async fn query(&self, jpeg: Vec<u8>) -> Result<Value> {
        let part = Part::bytes(jpeg)
            .file_name("vehicle.jpg")
            .mime_str("image/jpeg")
            .context("Invalid upload content type")?;
        let form = Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Plate service unreachable at {}", self.url))?
            .error_for_status()
            .context("Plate service returned an error")?;

        response
            .json::<Value>()
            .await
            .context("Plate service returned invalid JSON")
    }
}

impl PlateRecognizer for HttpPlateRecognizer {
    async fn recognize(&self, jpeg: Vec<u8>) -> Result<Vec<String>> {
        let response = self.query(jpeg).await?;
        let plates = plates_from_response(&response);
        tracing::debug!(count = plates.len(), "Plates recognized");
        Ok(plates)
    }
}

/// Candidate plates in a service response: every string under `plates`,
/// at any nesting depth, or the single `plate` field.
pub fn plates_from_response(response: &Value) -> Vec<String> {
    let mut plates = Vec::new();
    match (response.get("plates"), response.get("plate")) {
        (Some(found), _) | (None, Some(found)) => collect_strings(found, &mut plates),
        (None, None) => {}
    }
    plates
}

fn collect_strings(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            if !trimmed.is_empty() {
                out.push(trimmed.to_string());
            }
        }
        Value::Array(items) => items.iter().for_each(|item| collect_strings(item, out)),
        _ => {}
    }
}
