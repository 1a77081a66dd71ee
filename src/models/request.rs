use garde::Validate;
use serde::{Deserialize, Serialize};

/// Job-creation payload: two already-uploaded image references plus the
/// requesting user.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TryOnRequest {
    #[garde(url)]
    pub person_image_url: String,

    #[garde(url)]
    pub garment_image_url: String,

    #[serde(rename = "userEmail")]
    #[garde(email)]
    pub user_email: String,
}

impl TryOnRequest {
    pub fn new(
        person_image_url: impl Into<String>,
        garment_image_url: impl Into<String>,
        user_email: impl Into<String>,
    ) -> Self {
        Self {
            person_image_url: person_image_url.into(),
            garment_image_url: garment_image_url.into(),
            user_email: user_email.into(),
        }
    }
}

/// Response after uploading an image to the backend's storage bucket.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub image_url: Option<String>,
}
