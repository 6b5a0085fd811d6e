use crate::album::MovieStream;
use crate::errors::GalleryError;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::warn;

/// Size of the single cached block.
pub const BLOCK_SIZE: usize = 0x40000;

/// Reported sizes at or above this are treated as a corrupt size field.
pub const MAX_STREAM_SIZE: u64 = 0x8000_0000;

/// Sequential reader over a backend movie stream that holds at most one
/// block in memory. Reads only move forward, so one cached block is enough.
pub struct MediaStreamReader {
    stream: Box<dyn MovieStream + Send>,
    total_size: u64,
    bytes_read: u64,
    buffered_block: Option<u64>,
    block: Vec<u8>,
    block_len: usize,
}

impl MediaStreamReader {
    pub fn new(stream: Box<dyn MovieStream + Send>) -> Self {
        let reported = stream.size();
        let total_size = if reported >= MAX_STREAM_SIZE {
            warn!("stream: ignoring implausible size {}", reported);
            0
        } else {
            reported
        };

        MediaStreamReader {
            stream,
            total_size,
            bytes_read: 0,
            buffered_block: None,
            block: vec![0; BLOCK_SIZE],
            block_len: 0,
        }
    }

    pub fn size(&self) -> u64 {
        self.total_size
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Copies the next bytes of the stream into `out`, never more than what
    /// is left of the current block. Returns 0 at end of stream.
    ///
    /// A failed block fetch leaves the position untouched; there is no retry.
    pub async fn read(&mut self, out: &mut [u8]) -> Result<usize, GalleryError> {
        let remaining = self.total_size - self.bytes_read;
        if remaining == 0 {
            return Ok(0);
        }

        let block_size = BLOCK_SIZE as u64;
        let index = self.bytes_read / block_size;
        let offset = (self.bytes_read % block_size) as usize;

        if self.buffered_block != Some(index) {
            self.buffered_block = None;
            self.block_len = self.stream.read_at(index * block_size, &mut self.block).await?;
            self.buffered_block = Some(index);
        }

        let available = self.block_len.saturating_sub(offset);
        let n = out.len().min(available).min(remaining as usize);
        out[..n].copy_from_slice(&self.block[offset..offset + n]);
        self.bytes_read += n as u64;
        Ok(n)
    }

    /// Pulls the rest of the stream into `out`. A read that makes no
    /// progress before the reported size is reached ends with
    /// `StreamTruncated`.
    pub async fn copy_to<W>(&mut self, out: &mut W) -> Result<u64, GalleryError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        let start = self.bytes_read;
        let mut chunk = vec![0u8; BLOCK_SIZE];
        while self.bytes_read < self.total_size {
            let n = self.read(&mut chunk).await?;
            if n == 0 {
                return Err(GalleryError::StreamTruncated {
                    expected: self.size(),
                    read: self.bytes_read(),
                });
            }

            out.write_all(&chunk[..n])
                .await
                .map_err(|e| GalleryError::NetworkError(format!("write stream: {}", e)))?;
        }

        Ok(self.bytes_read - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::album::memory::MemoryMovieStream;

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    async fn read_in_chunks(data: &[u8], sizes: &[usize]) -> Vec<u8> {
        let mut reader = MediaStreamReader::new(Box::new(MemoryMovieStream::new(data.to_vec())));
        let mut output = Vec::new();
        let mut sizes = sizes.iter().cycle();
        loop {
            let size = *sizes.next().unwrap();
            let mut buf = vec![0u8; size];
            let n = reader.read(&mut buf).await.unwrap();
            if n == 0 && reader.bytes_read() == reader.size() {
                break;
            }
            output.extend_from_slice(&buf[..n]);
        }
        output
    }

    #[tokio::test]
    async fn chunking_does_not_change_output() {
        let data = pattern(BLOCK_SIZE * 2 + BLOCK_SIZE / 2 + 17);
        let whole = read_in_chunks(&data, &[data.len()]).await;
        assert_eq!(whole, data);

        for sizes in [
            vec![1usize, 7, 4096],
            vec![BLOCK_SIZE - 1],
            vec![BLOCK_SIZE + 3, 10],
            vec![65536],
            vec![333_333, 1],
        ] {
            let output = read_in_chunks(&data, &sizes).await;
            assert_eq!(output.len(), data.len(), "sizes {:?}", sizes);
            assert_eq!(output, whole, "sizes {:?}", sizes);
        }
    }

    #[tokio::test]
    async fn read_stops_at_block_boundary() {
        let data = pattern(BLOCK_SIZE + 10);
        let mut reader = MediaStreamReader::new(Box::new(MemoryMovieStream::new(data.clone())));
        let mut buf = vec![0u8; BLOCK_SIZE * 2];

        assert_eq!(reader.read(&mut buf).await.unwrap(), BLOCK_SIZE);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 10);
        assert_eq!(&buf[..10], &data[BLOCK_SIZE..]);
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_stream_is_end_of_stream() {
        let mut reader = MediaStreamReader::new(Box::new(MemoryMovieStream::new(Vec::new())));
        let mut buf = [0u8; 8];
        assert_eq!(reader.read(&mut buf).await.unwrap(), 0);
        let mut out = Vec::new();
        assert_eq!(reader.copy_to(&mut out).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn implausible_size_reads_as_empty() {
        let mut stream = MemoryMovieStream::new(pattern(64));
        stream.size = MAX_STREAM_SIZE;
        let reader = MediaStreamReader::new(Box::new(stream));
        assert_eq!(reader.size(), 0);

        let mut stream = MemoryMovieStream::new(pattern(64));
        stream.size = MAX_STREAM_SIZE - 1;
        let reader = MediaStreamReader::new(Box::new(stream));
        assert_eq!(reader.size(), MAX_STREAM_SIZE - 1);
    }

    #[tokio::test]
    async fn failed_fetch_does_not_advance() {
        let mut stream = MemoryMovieStream::new(pattern(BLOCK_SIZE * 2));
        stream.fail_reads_from = Some(BLOCK_SIZE as u64);
        let mut reader = MediaStreamReader::new(Box::new(stream));
        let mut buf = vec![0u8; BLOCK_SIZE];

        assert_eq!(reader.read(&mut buf).await.unwrap(), BLOCK_SIZE);
        let err = reader.read(&mut buf).await.unwrap_err();
        assert!(matches!(err, GalleryError::StreamReadFailed(_)));
        assert_eq!(reader.bytes_read(), BLOCK_SIZE as u64);
    }

    #[tokio::test]
    async fn copy_to_reports_truncation() {
        let mut stream = MemoryMovieStream::new(pattern(100));
        stream.size = 150;
        let mut reader = MediaStreamReader::new(Box::new(stream));
        let mut out = Vec::new();

        let err = reader.copy_to(&mut out).await.unwrap_err();
        assert!(matches!(
            err,
            GalleryError::StreamTruncated {
                expected: 150,
                read: 100
            }
        ));
        assert_eq!(out.len(), 100);
    }

    #[tokio::test]
    async fn copy_to_streams_everything() {
        let data = pattern(BLOCK_SIZE * 3 + 1);
        let mut reader = MediaStreamReader::new(Box::new(MemoryMovieStream::new(data.clone())));
        let mut out = Vec::new();
        assert_eq!(reader.copy_to(&mut out).await.unwrap(), data.len() as u64);
        assert_eq!(out, data);
    }
}
