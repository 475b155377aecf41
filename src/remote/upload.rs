//! Background uploads for the tile writer.
//!
//! The writer encodes each tile on its own thread into an [`UploadWriter`],
//! which forwards chunks over a bounded channel to an upload task running on
//! the context's runtime. Encoder and uploader therefore never wait on each
//! other's completion: the encoder only blocks while the channel is full, and
//! the uploader drains it independently. A semaphore caps how many uploads
//! run at once, and `finish` waits for all of them with a deadline.

use super::{ObjectStore, RemoteContext, TILE_CONTENT_TYPE};
use crate::config::Config;
use crate::error::{Result, SeamlessError};
use crate::sink::TileSink;
use crate::tile::TileCoord;
use bytes::{Bytes, BytesMut};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

const CHUNK_SIZE: usize = 64 * 1024;

/// Tuning for [`RemoteTileSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOptions {
    pub extension: String,
    pub max_concurrent_uploads: usize,
    pub buffer_chunks: usize,
    pub timeout: Duration,
}

impl UploadOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            extension: config.tile_extension.clone(),
            max_concurrent_uploads: config.max_concurrent_uploads.max(1),
            buffer_chunks: config.upload_buffer_chunks.max(1),
            timeout: config.upload_timeout(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

enum Message {
    Data(Bytes),
    End,
}

/// Synchronous writer feeding one background upload.
///
/// Must be used from a thread that is not driving an async runtime.
pub struct UploadWriter {
    key: String,
    buffer: BytesMut,
    sender: Option<mpsc::Sender<Message>>,
}

impl UploadWriter {
    fn send(&mut self, message: Message) -> io::Result<()> {
        let sender = self
            .sender
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "upload already completed"))?;
        sender.blocking_send(message).map_err(|_| {
            io::Error::new(
                io::ErrorKind::BrokenPipe,
                format!("upload task for '{}' stopped", self.key),
            )
        })
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }
        let chunk = self.buffer.split().freeze();
        self.send(Message::Data(chunk))
    }

    /// Send what is left and mark the object complete.
    ///
    /// Dropping a writer without completing it abandons the upload.
    pub fn complete(mut self) -> io::Result<()> {
        self.send_buffered()?;
        self.send(Message::End)?;
        self.sender = None;
        Ok(())
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Write for UploadWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        if self.buffer.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.send_buffered()
    }
}

struct PendingUpload {
    key: String,
    task: JoinHandle<Result<()>>,
}

/// Uploads tiles to an [`ObjectStore`] in the background.
pub struct RemoteTileSink {
    context: RemoteContext,
    options: UploadOptions,
    permits: Arc<Semaphore>,
    pending: Vec<PendingUpload>,
}

impl RemoteTileSink {
    pub fn new(context: &RemoteContext, options: UploadOptions) -> Self {
        let permits = Arc::new(Semaphore::new(options.max_concurrent_uploads.max(1)));
        Self {
            context: context.clone(),
            options,
            permits,
            pending: Vec::new(),
        }
    }

    /// Uploads started and not yet awaited by `finish`.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

async fn upload(
    store: Arc<dyn ObjectStore>,
    permits: Arc<Semaphore>,
    key: String,
    mut receiver: mpsc::Receiver<Message>,
) -> Result<()> {
    // holding the permit before draining keeps at most one body in memory per permit
    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|_| SeamlessError::storage("upload pool closed"))?;

    let mut body = BytesMut::new();
    loop {
        match receiver.recv().await {
            Some(Message::Data(chunk)) => body.extend_from_slice(&chunk),
            Some(Message::End) => break,
            None => {
                return Err(SeamlessError::storage(format!(
                    "upload of '{key}' abandoned before completion"
                )));
            }
        }
    }

    store.put_object(&key, body.freeze(), TILE_CONTENT_TYPE).await?;
    log::debug!("Uploaded {}", key);
    Ok(())
}

impl TileSink for RemoteTileSink {
    type Output = UploadWriter;

    fn open(&mut self, tile: TileCoord) -> Result<Self::Output> {
        let key = tile.relative_path(&self.options.extension);
        let (sender, receiver) = mpsc::channel(self.options.buffer_chunks.max(1));

        let task = self.context.handle().spawn(upload(
            Arc::clone(self.context.store()),
            Arc::clone(&self.permits),
            key.clone(),
            receiver,
        ));
        self.pending.push(PendingUpload {
            key: key.clone(),
            task,
        });

        Ok(UploadWriter {
            key,
            buffer: BytesMut::with_capacity(CHUNK_SIZE),
            sender: Some(sender),
        })
    }

    fn close(&mut self, _tile: TileCoord, output: Self::Output) -> Result<()> {
        output.complete()?;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(());
        }

        let total = pending.len();
        let timeout = self.options.timeout;
        let started = Instant::now();
        log::info!("Waiting for {} uploads to complete", total);

        let aborts: Vec<_> = pending.iter().map(|p| p.task.abort_handle()).collect();
        let keys: Vec<String> = pending.iter().map(|p| p.key.clone()).collect();
        let tasks = pending.into_iter().map(|p| p.task);

        let joined = self
            .context
            .block_on(async { tokio::time::timeout(timeout, futures::future::join_all(tasks)).await });

        let results = match joined {
            Ok(results) => results,
            Err(_) => {
                let unfinished = aborts.iter().filter(|a| !a.is_finished()).count();
                for abort in &aborts {
                    abort.abort();
                }
                log::error!(
                    "Timed out after {:?} with {} of {} uploads outstanding",
                    timeout,
                    unfinished,
                    total
                );
                return Err(SeamlessError::Timeout {
                    pending: unfinished,
                    waited: started.elapsed(),
                });
            }
        };

        let mut first_failure = None;
        for (key, result) in keys.into_iter().zip(results) {
            let reason = match result {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.to_string(),
                Err(join_err) => join_err.to_string(),
            };
            log::error!("Upload of {} failed: {}", key, reason);
            first_failure.get_or_insert(SeamlessError::UploadFailed { key, reason });
        }
        if let Some(err) = first_failure {
            return Err(err);
        }

        log::info!("Uploaded {} tiles in {:?}", total, started.elapsed());
        Ok(())
    }
}

impl Drop for RemoteTileSink {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            log::warn!(
                "Dropping remote sink with {} unawaited uploads",
                self.pending.len()
            );
        }
    }
}
