//! Trait abstraction for the outbound side of the link to enable testing

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Trait for outbound command I/O
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send {
    /// Write all data to the link
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;
}

/// Adapter that lets any async writer (serial write half, file, pipe) act as
/// a [`CommandSink`]
pub struct WriterSink<W> {
    writer: W,
}

impl<W> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CommandSink for WriterSink<W> {
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.writer.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_writer_sink_forwards_bytes() {
        let mut sink = WriterSink::new(Vec::new());
        sink.write_all(b"GPS,5\n").await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(sink.into_inner(), b"GPS,5\n");
    }

    #[tokio::test]
    async fn test_writer_sink_reports_closed_pipe() {
        let (device, station) = tokio::io::duplex(16);
        drop(device);

        let mut sink = WriterSink::new(station);
        assert!(sink.write_all(b"GPS,5\n").await.is_err());
    }
}
