// SPDX-License-Identifier: AGPL-3.0-or-later
//! Byte stream handles for item content

use bytes::Bytes;
use std::io::{Cursor, SeekFrom};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt, AsyncWriteExt};

/// Transfer block size for backend reads and writes
pub const BLOCK_SIZE: usize = 32 * 1024;

/// Content kept in memory before a spool moves to a temporary file
pub const SPOOL_MEMORY_LIMIT: usize = 1024 * 1024;

/// Readable, seekable content handle
pub trait SeekableStream: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> SeekableStream for T {}

/// Content returned by `read_data`
pub type DataStream = Box<dyn SeekableStream>;

/// Content consumed by `write_data`
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

/// In-memory content as a [`DataStream`].
pub fn memory_stream(data: impl Into<Bytes>) -> DataStream {
    Box::new(Cursor::new(data.into()))
}

/// In-memory content as an [`InputStream`].
pub fn input_stream(data: impl Into<Bytes>) -> InputStream {
    Box::new(Cursor::new(data.into()))
}

/// Read a stream to its end.
pub async fn read_to_end<R: AsyncRead + Unpin + ?Sized>(stream: &mut R) -> std::io::Result<Vec<u8>> {
    let mut data = Vec::new();
    stream.read_to_end(&mut data).await?;
    Ok(data)
}

/// Write-once buffer that keeps small content in memory and spills larger
/// content to an anonymous temporary file.
pub struct SpooledBuffer {
    memory: Vec<u8>,
    file: Option<File>,
    limit: usize,
    len: u64,
}

impl SpooledBuffer {
    pub fn new() -> Self {
        Self::with_limit(SPOOL_MEMORY_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self { memory: Vec::new(), file: None, limit, len: 0 }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_spilled(&self) -> bool {
        self.file.is_some()
    }

    pub async fn write_block(&mut self, block: &[u8]) -> std::io::Result<()> {
        self.len += block.len() as u64;
        if let Some(file) = self.file.as_mut() {
            return file.write_all(block).await;
        }
        if self.memory.len() + block.len() <= self.limit {
            self.memory.extend_from_slice(block);
            return Ok(());
        }

        let mut file = File::from_std(tempfile::tempfile()?);
        file.write_all(&self.memory).await?;
        file.write_all(block).await?;
        self.memory = Vec::new();
        self.file = Some(file);
        Ok(())
    }

    /// Rewind and hand out the spooled content.
    pub async fn into_stream(self) -> std::io::Result<DataStream> {
        match self.file {
            Some(mut file) => {
                file.flush().await?;
                file.seek(SeekFrom::Start(0)).await?;
                Ok(Box::new(file))
            }
            None => Ok(memory_stream(self.memory)),
        }
    }
}

impl Default for SpooledBuffer {
    fn default() -> Self {
        Self::new()
    }
}
