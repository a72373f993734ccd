use crate::error::{RegistrationError, RegistrationResult};
use crate::photo_storage::get_content_type;
use crate::store::ObjectStorage;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

const DEFAULT_EXTENSION: &str = "jpg";

/// A captured image before it is stored
#[derive(Debug, Clone, PartialEq)]
pub struct RawImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl RawImage {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes,
        }
    }

    /// Decode a `data:image/<type>;base64,<payload>` capture
    pub fn from_data_url(data_url: &str) -> RegistrationResult<Self> {
        let invalid = |detail: &str| RegistrationError::InvalidRequest(format!("photo {detail}"));

        let rest = data_url
            .trim()
            .strip_prefix("data:")
            .ok_or_else(|| invalid("must be a data URL"))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| invalid("data URL has no payload"))?;
        // Parameters such as `charset=` may sit between the MIME type and `base64`.
        let (mime, params) = header.split_once(';').unwrap_or((header, ""));
        if !params
            .split(';')
            .any(|p| p.trim().eq_ignore_ascii_case("base64"))
        {
            return Err(invalid("data URL must be base64 encoded"));
        }
        let content_type = mime.trim().to_ascii_lowercase();
        if !content_type.starts_with("image/") {
            return Err(invalid("must be an image"));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| invalid(&format!("payload is not valid base64: {e}")))?;

        let extension = extension_for_mime(&content_type);
        Ok(Self::new(format!("capture.{extension}"), content_type, bytes))
    }

    /// Lowercased extension of the file name, `jpg` when absent
    pub fn extension(&self) -> String {
        Path::new(&self.file_name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    }
}

fn extension_for_mime(content_type: &str) -> &'static str {
    match content_type {
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        "image/bmp" => "bmp",
        _ => DEFAULT_EXTENSION,
    }
}

/// Where a photo ended up
#[derive(Debug, Clone, PartialEq)]
pub struct StoredPhoto {
    /// Storage path, or a synthetic id when degraded
    pub reference: String,
    /// Public URL, or the inline `data:` URI when degraded
    pub url: String,
    pub degraded: bool,
}

impl StoredPhoto {
    /// Value written to `photo_ref` on visitor and access log rows.
    ///
    /// A degraded photo only exists as its data URI, so that is what gets persisted.
    pub fn persisted_ref(&self) -> String {
        if self.degraded {
            self.url.clone()
        } else {
            self.reference.clone()
        }
    }
}

/// Resolve a stored photo reference to something a browser can display
pub fn display_url(storage: &dyn ObjectStorage, photo_ref: &str) -> String {
    if photo_ref.starts_with("data:") {
        photo_ref.to_string()
    } else {
        storage.public_url(photo_ref)
    }
}

/// Uploads captures under a generated unique filename.
///
/// When the upload fails the image is embedded as an inline `data:` URI
/// instead and the result is flagged as degraded.
pub struct PhotoPipeline {
    storage: Arc<dyn ObjectStorage>,
}

impl PhotoPipeline {
    pub fn new(storage: Arc<dyn ObjectStorage>) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &dyn ObjectStorage {
        self.storage.as_ref()
    }

    /// Upload the image, falling back to an inline data URI on failure
    #[instrument(skip(self, image), fields(file_name = %image.file_name, size_bytes = image.bytes.len()))]
    pub async fn store(&self, image: &RawImage) -> RegistrationResult<StoredPhoto> {
        if image.bytes.is_empty() {
            return Err(RegistrationError::PhotoRequired);
        }

        let extension = image.extension();
        let content_type = if image.content_type.is_empty() {
            get_content_type(&extension)
        } else {
            image.content_type.clone()
        };
        let stem = unique_stem();
        let path = format!("{stem}.{extension}");

        match self
            .storage
            .upload(&path, image.bytes.clone(), &content_type)
            .await
        {
            Ok(()) => {
                let url = self.storage.public_url(&path);
                metrics::counter!("registry.photos.uploaded").increment(1);
                info!(path = %path, "Photo stored");
                Ok(StoredPhoto {
                    reference: path,
                    url,
                    degraded: false,
                })
            }
            Err(e) => {
                warn!(error = %e, path = %path, "Photo upload failed, storing inline");
                metrics::counter!("registry.photos.degraded").increment(1);
                Ok(StoredPhoto {
                    reference: stem,
                    url: format!("data:{content_type};base64,{}", STANDARD.encode(&image.bytes)),
                    degraded: true,
                })
            }
        }
    }
}

/// `photo_<unix millis>_<8 random hex chars>`
fn unique_stem() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("photo_{}_{}", Utc::now().timestamp_millis(), &suffix[..8])
}
