use async_trait::async_trait;
use aws_config::SdkConfig;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use eyre::WrapErr;
use plinth_common::deploy::{ObjectStore, Upload};

/// User metadata key with the hex sha256 of the object body
const CHECKSUM_METADATA: &str = "sha256";

pub(crate) struct S3 {
    client: Client,
}

impl S3 {
    pub(crate) fn new(config: &SdkConfig) -> Self {
        S3 {
            client: Client::new(config),
        }
    }
}

#[async_trait]
impl ObjectStore for S3 {
    async fn checksum(&self, bucket: &str, key: &str) -> eyre::Result<Option<String>> {
        let result = self.client.head_object().bucket(bucket).key(key).send().await;

        match result {
            Ok(output) => Ok(output
                .metadata()
                .and_then(|metadata| metadata.get(CHECKSUM_METADATA))
                .cloned()),

            Err(SdkError::ServiceError(err)) if err.err().is_not_found() => Ok(None),
            Err(e) => Err(eyre::eyre!("Failed to read {key} metadata: {e:?}")),
        }
    }

    /// Put the object without an ACL, the bucket enforces owner-only ACLs
    async fn put(&self, bucket: &str, upload: Upload) -> eyre::Result<()> {
        log::info!(
            "Uploading {} ({}, {} bytes) to {bucket}",
            upload.key,
            upload.content_type,
            upload.body.len()
        );

        self.client
            .put_object()
            .bucket(bucket)
            .key(&upload.key)
            .content_type(&upload.content_type)
            .metadata(CHECKSUM_METADATA, &upload.checksum)
            .body(ByteStream::from(upload.body))
            .send()
            .await
            .map_err(|e| eyre::eyre!("{e:?}"))
            .wrap_err("Failed to put object")?;

        Ok(())
    }

    async fn delete(&self, bucket: &str, key: &str) -> eyre::Result<()> {
        self.client
            .delete_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| eyre::eyre!("{e:?}"))
            .wrap_err("Failed to delete object")?;

        Ok(())
    }

    async fn list(&self, bucket: &str) -> eyre::Result<Vec<String>> {
        let mut keys = vec![];
        let mut token = None;

        loop {
            let output = self
                .client
                .list_objects_v2()
                .bucket(bucket)
                .set_continuation_token(token)
                .send()
                .await
                .map_err(|e| eyre::eyre!("{e:?}"))
                .wrap_err("Failed to list objects")?;

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }

        Ok(keys)
    }
}
