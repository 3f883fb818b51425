//! HTTP Image Store Implementation
//!
//! POSTs `{image, folder, filename}` as JSON to an upload endpoint that
//! answers `{success, url}` (or `{success: false, error}`).

use serde::{Deserialize, Serialize};

use crate::{CdnError, ImageStore, UploadReceipt, UploadRequest};

#[derive(Debug, Serialize)]
struct UploadBody<'a> {
    image: &'a str,
    folder: &'a str,
    filename: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    url: Option<String>,
    error: Option<String>,
}

/// Image store backed by an HTTP upload endpoint
pub struct HttpImageStore {
    http: reqwest::Client,
    upload_url: String,
    api_token: Option<String>,
}

impl HttpImageStore {
    pub fn new(upload_url: String, api_token: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            upload_url,
            api_token,
        }
    }
}

#[async_trait::async_trait]
impl ImageStore for HttpImageStore {
    async fn upload(&self, request: UploadRequest) -> Result<UploadReceipt, CdnError> {
        let body = UploadBody {
            image: &request.file,
            folder: &request.folder,
            filename: &request.filename,
        };

        let mut builder = self.http.post(&self.upload_url).json(&body);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| CdnError::Request(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read response body".to_string());
            return Err(CdnError::Response(format!(
                "Upload endpoint returned {}: {}",
                status, body
            )));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| CdnError::Response(format!("Invalid upload response: {}", e)))?;

        match parsed {
            UploadResponse {
                success: true,
                url: Some(url),
                ..
            } if !url.is_empty() => {
                tracing::debug!(filename = %request.filename, url = %url, "Image uploaded");
                Ok(UploadReceipt { url })
            }
            UploadResponse {
                success: true, ..
            } => Err(CdnError::Response(
                "Upload reported success without a URL".to_string(),
            )),
            UploadResponse { error, .. } => Err(CdnError::Response(
                error.unwrap_or_else(|| "Upload failed".to_string()),
            )),
        }
    }
}
