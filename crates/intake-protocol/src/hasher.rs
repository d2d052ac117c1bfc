//! Streaming content hasher
//!
//! Digests are computed in a single pass with a fixed-size buffer, so memory
//! use does not depend on the payload size.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, OnceLock};
use std::task::{ready, Context, Poll};

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};
use tokio_util::sync::CancellationToken;

use intake_core::models::ContentHash;
use intake_core::{AppError, AppResult, CANCELLED_REASON};

pub const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Hash `reader` to EOF.
pub async fn hash_stream<R>(reader: &mut R, cancel: &CancellationToken) -> AppResult<ContentHash>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; HASH_BUFFER_SIZE];
    let mut size: u64 = 0;

    loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(AppError::Cancelled(CANCELLED_REASON.to_string()));
            }
            res = reader.read(&mut buf) => res?,
        };
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    ContentHash::sha2_256(hasher.finalize().to_vec(), size)
}

/// Shared slot that receives the digest once a [`HashingReader`] hits EOF
#[derive(Debug, Clone, Default)]
pub struct HashOutcome(Arc<OnceLock<ContentHash>>);

impl HashOutcome {
    /// `None` until the reader has been consumed to EOF.
    pub fn get(&self) -> Option<ContentHash> {
        self.0.get().cloned()
    }
}

type ProgressFn = Box<dyn Fn(u64) + Send + Sync>;

/// `AsyncRead` adapter that hashes bytes as they pass through to the consumer.
pub struct HashingReader<R> {
    inner: R,
    hasher: Option<Sha256>,
    size: u64,
    on_progress: Option<ProgressFn>,
    outcome: HashOutcome,
}

impl<R> HashingReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            hasher: Some(Sha256::new()),
            size: 0,
            on_progress: None,
            outcome: HashOutcome::default(),
        }
    }

    /// Called with the length of every chunk read.
    pub fn with_progress(mut self, on_progress: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.on_progress = Some(Box::new(on_progress));
        self
    }

    pub fn outcome(&self) -> HashOutcome {
        self.outcome.clone()
    }

    fn finish(&mut self) {
        if let Some(hasher) = self.hasher.take() {
            if let Ok(hash) = ContentHash::sha2_256(hasher.finalize().to_vec(), self.size) {
                let _ = self.outcome.0.set(hash);
            }
        }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for HashingReader<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = &mut *self;
        if buf.remaining() == 0 {
            return Poll::Ready(Ok(()));
        }

        let before = buf.filled().len();
        ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
        let chunk = &buf.filled()[before..];

        if chunk.is_empty() {
            this.finish();
        } else if let Some(hasher) = this.hasher.as_mut() {
            hasher.update(chunk);
            this.size += chunk.len() as u64;
            if let Some(on_progress) = &this.on_progress {
                on_progress(chunk.len() as u64);
            }
        }

        Poll::Ready(Ok(()))
    }
}
