//! Input file readers (local paths and S3 objects)

use crate::StagePath;
use anyhow::{Context, Result};
use aws_config::BehaviorVersion;
use std::io::Cursor;

/// Read an input file fully and return a sync reader over its bytes.
///
/// Files are read into memory so the caller can parse them with a sync
/// reader without bridging runtimes.
pub async fn open_input(uri: &str) -> Result<Box<dyn std::io::Read + Send>> {
    let contents = match StagePath::parse(uri)? {
        StagePath::Local(path) => tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read file: {}", path.display()))?,
        StagePath::S3 { bucket, key } => {
            let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
            let client = aws_sdk_s3::Client::new(&sdk_config);
            let response = client
                .get_object()
                .bucket(&bucket)
                .key(&key)
                .send()
                .await
                .with_context(|| format!("Failed to fetch object from S3: s3://{bucket}/{key}"))?;
            response
                .body
                .collect()
                .await
                .with_context(|| format!("Failed to read object body: s3://{bucket}/{key}"))?
                .into_bytes()
                .to_vec()
        }
    };

    tracing::debug!("Read {} bytes from {}", contents.len(), uri);
    Ok(Box::new(Cursor::new(contents)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_local_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("input.csv");
        std::fs::write(&file_path, "id,name\n1,Ann\n").unwrap();

        let mut reader = open_input(file_path.to_str().unwrap()).await.unwrap();
        let mut contents = String::new();
        reader.read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "id,name\n1,Ann\n");
    }

    #[tokio::test]
    async fn test_open_missing_file() {
        let result = open_input("/nonexistent/input.csv").await;
        assert!(result.is_err());
    }
}
