use crate::config::PhotoStorageConfig;
use crate::store::{ObjectStorage, StoreError, StoreResult};
use anyhow::Result;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use aws_types::region::Region;
use tracing::{debug, info, instrument, warn};

/// Key written to check write permissions on the photo bucket
const PERMISSION_PROBE_KEY: &str = "test-permission.txt";

/// Visitor photo storage in an S3-compatible bucket
pub struct S3PhotoStorage {
    client: S3Client,
    config: PhotoStorageConfig,
}

impl S3PhotoStorage {
    /// Create a new S3 photo storage client
    pub async fn new(config: &PhotoStorageConfig) -> Result<Self> {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        // Configure custom endpoint for MinIO/LocalStack
        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        // Force path-style access for MinIO compatibility
        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(
            bucket = %config.bucket,
            region = %config.region,
            "S3 photo storage initialized"
        );

        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    fn object_key(&self, path: &str) -> String {
        match self.config.key_prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{}", prefix.trim_end_matches('/'), path)
            }
            _ => path.to_string(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3PhotoStorage {
    #[instrument(skip(self, bytes), fields(bucket = %self.config.bucket, size_bytes = bytes.len()))]
    async fn upload(&self, path: &str, bytes: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let key = self.object_key(path);

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .cache_control(&self.config.cache_control)
            .send()
            .await
            .map_err(|e| {
                StoreError::Unavailable(format!(
                    "upload of {key} failed: {}",
                    DisplayErrorContext(&e)
                ))
            })?;

        debug!(key = %key, "Photo uploaded");
        Ok(())
    }

    fn public_url(&self, path: &str) -> String {
        public_object_url(&self.config, &self.object_key(path))
    }

    async fn check_ready(&self) -> StoreResult<()> {
        self.client
            .head_bucket()
            .bucket(&self.config.bucket)
            .send()
            .await
            .map_err(|e| {
                StoreError::NotFound(format!(
                    "bucket {} is not reachable: {}",
                    self.config.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        self.client
            .put_object()
            .bucket(&self.config.bucket)
            .key(self.object_key(PERMISSION_PROBE_KEY))
            .body(ByteStream::from_static(b"test"))
            .content_type("text/plain")
            .send()
            .await
            .map_err(|e| {
                warn!(bucket = %self.config.bucket, "Photo bucket rejected a test upload");
                StoreError::Unavailable(format!(
                    "bucket {} does not accept uploads: {}",
                    self.config.bucket,
                    DisplayErrorContext(&e)
                ))
            })?;

        Ok(())
    }
}

/// Public URL for an object key, derived from configuration alone
pub fn public_object_url(config: &PhotoStorageConfig, key: &str) -> String {
    if let Some(ref base) = config.public_base_url {
        return format!("{}/{}", base.trim_end_matches('/'), key);
    }
    match config.endpoint_url {
        Some(ref endpoint) => format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            config.bucket,
            key
        ),
        None => format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            config.bucket, config.region, key
        ),
    }
}

/// Get content type for an image file extension
pub fn get_content_type(extension: &str) -> String {
    match extension.to_lowercase().as_str() {
        "jpeg" | "jpg" => "image/jpeg".to_string(),
        "png" => "image/png".to_string(),
        "webp" => "image/webp".to_string(),
        "bmp" => "image/bmp".to_string(),
        "gif" => "image/gif".to_string(),
        _ => "application/octet-stream".to_string(),
    }
}
