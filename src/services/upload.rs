use std::sync::Arc;

use base64::Engine;
use reqwest::Client;
use serde::Serialize;

use crate::models::request::UploadResponse;
use crate::services::auth::{AuthError, TokenProvider};
use crate::services::validation::{self, ImageValidationError};

/// Which side of the try-on a photo is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Person,
    Garment,
}

impl ImageKind {
    fn path(self) -> &'static str {
        match self {
            ImageKind::Person => "/upload-user-image",
            ImageKind::Garment => "/upload-apparel-image",
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadRequest<'a> {
    file_name: &'a str,
    user_email: &'a str,
    file_data_base64: String,
    content_type: &'static str,
}

/// Uploads validated photos to backend storage, yielding the URLs a
/// try-on job is submitted with.
pub struct ImageUploader {
    http: Client,
    base_url: String,
    auth: Arc<dyn TokenProvider>,
}

impl ImageUploader {
    pub fn new(base_url: &str, auth: Arc<dyn TokenProvider>) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Validate and upload one image, returning its storage URL.
    pub async fn upload(
        &self,
        kind: ImageKind,
        file_name: &str,
        bytes: &[u8],
        user_email: &str,
    ) -> Result<String, UploadError> {
        let (width, height) = validation::validate_image(bytes)?;
        tracing::debug!(?kind, file_name, width, height, "Uploading image");

        let body = UploadRequest {
            file_name,
            user_email,
            file_data_base64: base64::engine::general_purpose::STANDARD.encode(bytes),
            content_type: "image/jpeg",
        };

        let mut builder = self
            .http
            .post(format!("{}{}", self.base_url, kind.path()))
            .json(&body);
        if let Some(token) = self.auth.bearer_token().await? {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await?.error_for_status()?;
        let uploaded: UploadResponse = response.json().await?;

        uploaded.image_url.ok_or(UploadError::MissingUrl)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("Invalid image: {0}")]
    Invalid(#[from] ImageValidationError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authorization failed: {0}")]
    Auth(#[from] AuthError),

    #[error("Upload response did not contain an image URL")]
    MissingUrl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::auth::StaticToken;

    #[test]
    fn test_upload_paths() {
        assert_eq!(ImageKind::Person.path(), "/upload-user-image");
        assert_eq!(ImageKind::Garment.path(), "/upload-apparel-image");
    }

    #[tokio::test]
    async fn test_invalid_image_is_rejected_before_upload() {
        // Nothing listens here; validation must fail first.
        let uploader = ImageUploader::new("http://127.0.0.1:9", Arc::new(StaticToken::anonymous()));

        let result = uploader
            .upload(ImageKind::Person, "notes.txt", b"not an image", "jane@example.com")
            .await;

        assert!(matches!(result, Err(UploadError::Invalid(_))));
    }
}
