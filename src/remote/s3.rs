//! Amazon S3 object store.

use super::{ObjectLocation, ObjectStore};
use crate::error::{Result, SeamlessError};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::Client;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;

/// S3 bucket (and optional key prefix) used as a tile store.
#[derive(Debug, Clone)]
pub struct S3ObjectStore {
    client: Client,
    location: ObjectLocation,
}

impl S3ObjectStore {
    /// Load credentials and region from the ambient environment.
    pub async fn from_env(location: ObjectLocation) -> Result<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        if sdk_config.region().is_none() {
            return Err(SeamlessError::storage(
                "no AWS region configured in the environment",
            ));
        }
        Ok(Self::from_client(Client::new(&sdk_config), location))
    }

    pub fn from_client(client: Client, location: ObjectLocation) -> Self {
        Self { client, location }
    }

    pub fn location(&self) -> &ObjectLocation {
        &self.location
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<()> {
        let key = self.location.key(key);
        self.client
            .put_object()
            .bucket(&self.location.bucket)
            .key(&key)
            .content_type(content_type)
            .content_length(body.len() as i64)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| map_s3_error(e, &key))?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<Option<Bytes>> {
        let key = self.location.key(key);
        let response = match self
            .client
            .get_object()
            .bucket(&self.location.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if is_not_found(&e) => return Ok(None),
            Err(e) => return Err(map_s3_error(e, &key)),
        };

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| SeamlessError::storage(format!("failed to read body of '{key}': {e}")))?
            .into_bytes();
        Ok(Some(body))
    }
}

fn is_not_found<E>(err: &SdkError<E>) -> bool {
    match err {
        SdkError::ServiceError(service_err) => service_err.raw().status().as_u16() == 404,
        _ => false,
    }
}

fn map_s3_error<E: std::fmt::Debug>(err: SdkError<E>, key: &str) -> SeamlessError {
    match &err {
        SdkError::ServiceError(service_err) => {
            let status = service_err.raw().status().as_u16();
            SeamlessError::storage(format!("S3 error for key '{key}' (HTTP {status}): {err:?}"))
        }
        SdkError::TimeoutError(_) => {
            SeamlessError::storage(format!("S3 timeout for key '{key}': {err:?}"))
        }
        SdkError::DispatchFailure(_) => {
            SeamlessError::storage(format!("S3 connection error for key '{key}': {err:?}"))
        }
        _ => SeamlessError::storage(format!("S3 error for key '{key}': {err:?}")),
    }
}
