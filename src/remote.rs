//! Remote object storage for tile sets.
//!
//! Tiles are stored under the same `{x}/{y}.{extension}` keys used on local
//! disk. All network work runs on a tokio runtime owned by a
//! [`RemoteContext`]; the synchronous writer and extractor talk to it through
//! blocking calls and channels, so neither must be used from inside an async
//! task.

use crate::error::{Result, SeamlessError};
use async_trait::async_trait;
use bytes::Bytes;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::{Handle, Runtime};

mod memory;
#[cfg(feature = "s3")]
mod s3;
mod upload;

pub use memory::MemoryObjectStore;
#[cfg(feature = "s3")]
pub use s3::S3ObjectStore;
pub use upload::{RemoteTileSink, UploadOptions, UploadWriter};

/// Content type recorded for uploaded tiles.
pub const TILE_CONTENT_TYPE: &str = "application/gzip";

const LOCATION_SCHEME: &str = "s3://";

/// Minimal key/value object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store `body` under `key`, replacing any existing object.
    async fn put_object(&self, key: &str, body: Bytes, content_type: &str) -> Result<()>;

    /// Fetch an object. A missing key is `Ok(None)`, not an error.
    async fn get_object(&self, key: &str) -> Result<Option<Bytes>>;
}

/// Bucket and optional key prefix parsed from `s3://bucket/prefix`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectLocation {
    pub bucket: String,
    pub prefix: Option<String>,
}

impl ObjectLocation {
    /// True if `uri` names an object store location rather than a path.
    pub fn is_remote(uri: &str) -> bool {
        uri.starts_with(LOCATION_SCHEME)
    }

    pub fn parse(uri: &str) -> Result<Self> {
        let rest = uri.strip_prefix(LOCATION_SCHEME).ok_or_else(|| {
            SeamlessError::invalid_input(format!("'{uri}' is not an {LOCATION_SCHEME} location"))
        })?;
        let (bucket, prefix) = match rest.split_once('/') {
            Some((bucket, prefix)) => (bucket, prefix.trim_matches('/')),
            None => (rest, ""),
        };
        if bucket.is_empty() {
            return Err(SeamlessError::invalid_input(format!(
                "missing bucket name in '{uri}'"
            )));
        }
        Ok(Self {
            bucket: bucket.to_string(),
            prefix: (!prefix.is_empty()).then(|| prefix.to_string()),
        })
    }

    /// Full object key for a key relative to this location.
    pub fn key(&self, relative: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{prefix}/{relative}"),
            None => relative.to_string(),
        }
    }
}

impl std::fmt::Display for ObjectLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{LOCATION_SCHEME}{}", self.bucket)?;
        if let Some(prefix) = &self.prefix {
            write!(f, "/{prefix}")?;
        }
        Ok(())
    }
}

/// An object store together with the runtime that drives it.
///
/// Cloning is cheap; clones share the runtime and the store.
#[derive(Clone)]
pub struct RemoteContext {
    runtime: Arc<Runtime>,
    store: Arc<dyn ObjectStore>,
}

impl RemoteContext {
    /// Context over `store` with a fresh multi-threaded runtime.
    pub fn new(store: Arc<dyn ObjectStore>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("seamless-io")
            .enable_all()
            .build()?;
        Ok(Self::with_runtime(store, Arc::new(runtime)))
    }

    pub fn with_runtime(store: Arc<dyn ObjectStore>, runtime: Arc<Runtime>) -> Self {
        Self { runtime, store }
    }

    /// Context over an S3 bucket, with credentials and region taken from the
    /// environment.
    #[cfg(feature = "s3")]
    pub fn s3(location: &ObjectLocation) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .thread_name("seamless-io")
            .enable_all()
            .build()?;
        let store = runtime.block_on(S3ObjectStore::from_env(location.clone()))?;
        Ok(Self::with_runtime(Arc::new(store), Arc::new(runtime)))
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    pub fn handle(&self) -> &Handle {
        self.runtime.handle()
    }

    /// Run a future to completion on the context's runtime.
    ///
    /// Blocks the calling thread; panics if called from within an async task.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

impl std::fmt::Debug for RemoteContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_location() {
        let location = ObjectLocation::parse("s3://census-tiles/2020/blocks/").unwrap();
        assert_eq!(location.bucket, "census-tiles");
        assert_eq!(location.prefix.as_deref(), Some("2020/blocks"));
        assert_eq!(location.key("1/2.smls.gz"), "2020/blocks/1/2.smls.gz");
        assert_eq!(location.to_string(), "s3://census-tiles/2020/blocks");

        let bare = ObjectLocation::parse("s3://census-tiles").unwrap();
        assert_eq!(bare.prefix, None);
        assert_eq!(bare.key("1/2.smls.gz"), "1/2.smls.gz");
    }

    #[test]
    fn test_parse_location_rejects_bad_input() {
        assert!(ObjectLocation::parse("/tmp/tiles").is_err());
        assert!(ObjectLocation::parse("s3://").is_err());
        assert!(ObjectLocation::parse("s3:///prefix").is_err());
        assert!(ObjectLocation::is_remote("s3://bucket"));
        assert!(!ObjectLocation::is_remote("tiles/s3://bucket"));
    }

    #[test]
    fn test_context_round_trip() {
        let store = Arc::new(MemoryObjectStore::new());
        let context = RemoteContext::new(store.clone()).unwrap();

        context
            .block_on(context.store().put_object("a/b", Bytes::from_static(b"x"), TILE_CONTENT_TYPE))
            .unwrap();
        let fetched = context.block_on(context.store().get_object("a/b")).unwrap();
        assert_eq!(fetched, Some(Bytes::from_static(b"x")));
        assert_eq!(context.block_on(context.store().get_object("missing")).unwrap(), None);
        assert_eq!(store.content_type("a/b").as_deref(), Some(TILE_CONTENT_TYPE));
    }
}
