use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use sha2::{Digest, Sha256};

use crate::core::config::Settings;

/// What a successful write left in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StoredObject {
    pub(crate) key: String,
    pub(crate) size: i64,
    pub(crate) sha256: String,
}

/// Durable object storage used for archival snapshots.
#[async_trait]
pub(crate) trait ObjectStorage: Send + Sync {
    /// Writes `bytes` under `key`, overwriting any previous object.
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<StoredObject>;

    /// Returns `None` when no object exists under `key`.
    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[derive(Debug, Clone)]
pub(crate) struct StorageService {
    client: Client,
    bucket: String,
}

impl StorageService {
    pub(crate) async fn from_settings(settings: &Settings) -> anyhow::Result<Option<Self>> {
        if !settings.s3().is_configured() {
            return Ok(None);
        }

        let creds = Credentials::new(
            settings.s3().access_key.clone(),
            settings.s3().secret_key.clone(),
            None,
            None,
            "lms-testing-static",
        );

        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(settings.s3().endpoint.clone())
            .region(aws_config::Region::new(settings.s3().region.clone()))
            .credentials_provider(creds)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config).force_path_style(true).build();
        let client = Client::from_conf(s3_config);

        Ok(Some(Self { client, bucket: settings.s3().bucket.clone() }))
    }
}

#[async_trait]
impl ObjectStorage for StorageService {
    async fn put_object(
        &self,
        key: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> anyhow::Result<StoredObject> {
        let size = bytes.len() as i64;
        let sha256 = sha256_hex(&bytes);

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await?;

        Ok(StoredObject { key: key.to_string(), size, sha256 })
    }

    async fn get_object(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let output = match self.client.get_object().bucket(&self.bucket).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                if err.as_service_error().is_some_and(|service| service.is_no_such_key()) {
                    return Ok(None);
                }
                return Err(err.into());
            }
        };

        let body = output.body.collect().await?;
        Ok(Some(body.into_bytes().to_vec()))
    }
}
