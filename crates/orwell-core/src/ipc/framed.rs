//! Delimiter-framed reads over a raw byte stream
//!
//! Bytes read past a delimiter are kept in a leftover buffer and handed out,
//! in order, before the stream is read again.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of each underlying read
const CHUNK_SIZE: usize = 1024;

/// Byte stream wrapper with line framing
pub struct FramedConnection<S> {
    stream: S,
    leftover: Vec<u8>,
}

impl<S> FramedConnection<S> {
    pub fn new(stream: S) -> Self {
        Self {
            stream,
            leftover: Vec::new(),
        }
    }
}

impl<S: AsyncRead + Unpin> FramedConnection<S> {
    /// Read through the first occurrence of `delimiter`, delimiter included.
    ///
    /// At end of stream, whatever was accumulated is returned, which may be
    /// empty or lack the delimiter. An empty result therefore means EOF.
    pub async fn recv_until(&mut self, delimiter: &[u8]) -> io::Result<Vec<u8>> {
        if delimiter.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "delimiter must not be empty",
            ));
        }

        let mut buffer = std::mem::take(&mut self.leftover);
        let mut searched = 0;
        let mut chunk = [0u8; CHUNK_SIZE];

        loop {
            if let Some(pos) = find(&buffer[searched..], delimiter) {
                let end = searched + pos + delimiter.len();
                self.leftover = buffer.split_off(end);
                return Ok(buffer);
            }
            // A delimiter may straddle the boundary with the next chunk
            searched = buffer.len().saturating_sub(delimiter.len() - 1);

            let n = self.stream.read(&mut chunk).await?;
            if n == 0 {
                return Ok(buffer);
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
    }

    pub async fn recv_line(&mut self) -> io::Result<Vec<u8>> {
        self.recv_until(b"\n").await
    }

    /// Return the leftover buffer as-is when it is non-empty, otherwise the
    /// result of exactly one underlying read of at most `n` bytes.
    ///
    /// This does not guarantee `n` bytes, and never merges leftover bytes with
    /// fresh ones. The leftover may also be longer than `n`.
    pub async fn recv(&mut self, n: usize) -> io::Result<Vec<u8>> {
        if !self.leftover.is_empty() {
            return Ok(std::mem::take(&mut self.leftover));
        }
        let mut data = vec![0u8; n];
        let read = self.stream.read(&mut data).await?;
        data.truncate(read);
        Ok(data)
    }
}

impl<S: AsyncWrite + Unpin> FramedConnection<S> {
    pub async fn send(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data).await?;
        self.stream.flush().await
    }

    pub async fn shutdown(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
