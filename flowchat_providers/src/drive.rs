//! Google Drive style blob store: multipart upload plus an "anyone with the
//! link" reader permission.

use async_trait::async_trait;
use flowchat_core::{BlobError, BlobErrorKind, BlobStore, StoredObject};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3";
pub const DEFAULT_API_URL: &str = "https://www.googleapis.com/drive/v3";

#[derive(Debug, Serialize)]
struct FileMetadata<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parents: Vec<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    #[serde(default)]
    web_view_link: Option<String>,
}

impl From<DriveFile> for StoredObject {
    fn from(file: DriveFile) -> Self {
        Self {
            id: file.id,
            name: file.name,
            web_link: file.web_view_link,
        }
    }
}

/// Assemble a `multipart/related` body: JSON metadata, then the media.
fn multipart_related(boundary: &str, metadata: &str, mime: &str, bytes: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(bytes.len() + metadata.len() + 256);
    body.extend_from_slice(
        format!(
            "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n\
             --{boundary}\r\nContent-Type: {mime}\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());
    body
}

pub struct DriveStore {
    client: Client,
    access_token: String,
    upload_url: String,
    api_url: String,
}

impl DriveStore {
    pub fn new(access_token: impl Into<String>) -> Self {
        info!("Creating DriveStore");
        Self {
            client: Client::new(),
            access_token: access_token.into(),
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_upload_url(mut self, upload_url: impl Into<String>) -> Self {
        self.upload_url = upload_url.into();
        self
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, BlobError> {
        let response = request
            .bearer_auth(&self.access_token)
            .send()
            .await
            .map_err(|e| BlobError::network(format!("cannot reach storage service: {e}")))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BlobError::network(format!("storage response interrupted: {e}")))?;
        if !status.is_success() {
            return Err(BlobError::from_status(status.as_u16(), text));
        }
        Ok(text)
    }
}

#[async_trait]
impl BlobStore for DriveStore {
    async fn upload(
        &self,
        name: &str,
        bytes: Vec<u8>,
        prefix: Option<&str>,
    ) -> Result<StoredObject, BlobError> {
        let mime = mime_guess::from_path(name).first_or_octet_stream();
        let metadata = FileMetadata {
            name,
            parents: prefix.into_iter().collect(),
        };
        let metadata = serde_json::to_string(&metadata)
            .map_err(|e| BlobError::new(BlobErrorKind::Other, e.to_string()))?;
        let boundary = format!("flowchat-{}", Uuid::now_v7().simple());
        debug!("Uploading {name} as {mime} ({} bytes)", bytes.len());

        let request = self
            .client
            .post(format!(
                "{}/files?uploadType=multipart&fields=id,name,webViewLink",
                self.upload_url.trim_end_matches('/')
            ))
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(multipart_related(&boundary, &metadata, mime.as_ref(), &bytes));

        let text = self.send(request).await?;
        let file: DriveFile = serde_json::from_str(&text).map_err(|e| {
            BlobError::new(
                BlobErrorKind::Other,
                format!("unexpected upload response: {e}"),
            )
        })?;
        Ok(file.into())
    }

    async fn try_set_public(&self, object_id: &str) -> Result<(), BlobError> {
        let request = self
            .client
            .post(format!(
                "{}/files/{object_id}/permissions",
                self.api_url.trim_end_matches('/')
            ))
            .json(&json!({"role": "reader", "type": "anyone"}));

        self.send(request).await?;
        info!("File {object_id} is now readable by anyone with the link");
        Ok(())
    }
}
