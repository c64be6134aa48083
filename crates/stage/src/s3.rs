//! S3 staging store

use crate::encoder::{write_parts, PartWriter, DEFAULT_PART_ROWS};
use crate::parse_s3_uri;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Credentials as SdkCredentials;
use aws_sdk_s3::primitives::ByteStream;
use load_core::{Credentials, RecordStream, StageFormat, StagedLocation, StagingStore};
use secrecy::ExposeSecret;
use tracing::{debug, info};

/// Static SDK credentials for an explicit key pair. `None` leaves the
/// default provider chain in charge.
pub(crate) fn sdk_credentials(credentials: &Credentials) -> Option<SdkCredentials> {
    match credentials {
        Credentials::RuntimeDetermined => None,
        Credentials::Explicit {
            access_key,
            secret_key,
            ..
        } => Some(SdkCredentials::new(
            access_key.clone(),
            secret_key.expose_secret().to_string(),
            None,
            None,
            "redshift-load",
        )),
    }
}

/// Stages part files under an S3 prefix.
pub struct S3Stage {
    client: aws_sdk_s3::Client,
    part_rows: usize,
}

impl S3Stage {
    /// Create a store that writes with the same key pair COPY reads with.
    /// Runtime-determined credentials use the ambient AWS configuration.
    pub async fn new(credentials: &Credentials) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(static_credentials) = sdk_credentials(credentials) {
            debug!("Staging with credentials from {:?}", credentials.source());
            loader = loader.credentials_provider(static_credentials);
        }
        let sdk_config = loader.load().await;
        Ok(Self::from_client(aws_sdk_s3::Client::new(&sdk_config)))
    }

    pub fn from_client(client: aws_sdk_s3::Client) -> Self {
        Self {
            client,
            part_rows: DEFAULT_PART_ROWS,
        }
    }

    pub fn with_part_rows(mut self, part_rows: usize) -> Self {
        self.part_rows = part_rows;
        self
    }

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Failed to delete S3 object: s3://{bucket}/{key}"))?;
        Ok(())
    }
}

/// Join a prefix and a file name with exactly one `/`.
fn object_uri(dir: &str, name: &str) -> String {
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[async_trait::async_trait]
impl PartWriter for S3Stage {
    async fn put_part(&self, dir: &str, name: &str, data: Vec<u8>) -> Result<String> {
        let uri = object_uri(dir, name);
        let (bucket, key) = parse_s3_uri(&uri)?;
        let size = data.len();

        self.client
            .put_object()
            .bucket(&bucket)
            .key(&key)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to upload staged file: {uri}"))?;

        debug!("Uploaded {} bytes to {}", size, uri);
        Ok(uri)
    }
}

#[async_trait::async_trait]
impl StagingStore for S3Stage {
    async fn write(
        &self,
        path: &str,
        format: &StageFormat,
        records: RecordStream<'_>,
    ) -> Result<StagedLocation> {
        let (files, rows) = write_parts(self, path, format, self.part_rows, records).await?;
        info!("Staged {} rows to {}", rows, path);
        Ok(StagedLocation {
            uri: path.to_string(),
            files,
            rows,
        })
    }

    async fn delete(&self, location: &StagedLocation) -> Result<()> {
        for file in &location.files {
            let (bucket, key) = parse_s3_uri(file)?;
            self.delete_object(&bucket, &key).await?;
        }
        debug!("Deleted {} staged objects under {}", location.files.len(), location.uri);
        Ok(())
    }

    async fn delete_prefix(&self, path: &str) -> Result<()> {
        let (bucket, prefix) = parse_s3_uri(path)?;
        if prefix.is_empty() {
            anyhow::bail!("Refusing to delete the whole bucket: {path}");
        }

        let mut continuation_token: Option<String> = None;
        let mut deleted = 0usize;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&bucket)
                .prefix(&prefix);
            if let Some(token) = &continuation_token {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .with_context(|| format!("Failed to list S3 prefix: {path}"))?;

            for object in response.contents.unwrap_or_default() {
                if let Some(key) = object.key {
                    self.delete_object(&bucket, &key).await?;
                    deleted += 1;
                }
            }

            if response.is_truncated == Some(true) {
                continuation_token = response.next_continuation_token;
            } else {
                break;
            }
        }

        debug!("Deleted {} objects under {}", deleted, path);
        Ok(())
    }
}
