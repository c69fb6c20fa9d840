use async_trait::async_trait;
use std::io::{self, Read};
use tokio::io::{AsyncRead, AsyncReadExt};

/// A byte source of audio.
///
/// `read` returns up to `max_bytes`; fewer only at the end of the data, and an
/// empty buffer once the source is exhausted.
#[async_trait]
pub trait AudioSource: Send {
    async fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>>;
}

/// Files, stdin, sockets and in-memory cursors.
#[async_trait]
impl<T> AudioSource for T
where
    T: AsyncRead + Unpin + Send,
{
    async fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(max_bytes);
        AsyncReadExt::take(&mut *self, max_bytes as u64)
            .read_to_end(&mut chunk)
            .await?;
        Ok(chunk)
    }
}

/// Adapts a blocking [`std::io::Read`].
///
/// Reads happen on the calling task, so this suits local files and pipes that
/// return promptly.
#[derive(Debug)]
pub struct SyncSource<R> {
    inner: R,
}

impl<R: Read + Send> SyncSource<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

#[async_trait]
impl<R: Read + Send> AudioSource for SyncSource<R> {
    async fn read(&mut self, max_bytes: usize) -> io::Result<Vec<u8>> {
        let mut chunk = Vec::with_capacity(max_bytes);
        Read::take(&mut self.inner, max_bytes as u64).read_to_end(&mut chunk)?;
        Ok(chunk)
    }
}
