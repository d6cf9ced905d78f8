//! Transport boundary: one request frame out, one response frame back.
//!
//! [`StreamTransport`] carries frames over any byte stream (a serial or
//! Bluetooth bridge socket, a TCP connection, an in-memory duplex) with a
//! u16 LE length prefix in front of each frame.

use std::future::Future;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("pump link disconnected")]
    Disconnected,

    #[error("no response within {0:?}")]
    Timeout(Duration),

    #[error("frame of {0} bytes does not fit the length prefix")]
    FrameTooLarge(usize),
}

pub trait Transport: Send {
    fn exchange(&mut self, frame: Bytes) -> impl Future<Output = Result<Bytes, TransportError>> + Send;
}

pub struct StreamTransport<S> {
    stream: S,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: S) -> Self {
        Self { stream }
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn exchange(&mut self, frame: Bytes) -> Result<Bytes, TransportError> {
        write_frame(&mut self.stream, &frame).await?;
        read_frame(&mut self.stream).await
    }
}

/// Write one length-prefixed frame.
pub async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let len = u16::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge(frame.len()))?;
    writer.write_all(&len.to_le_bytes()).await?;
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. End of stream is a disconnect.
pub async fn read_frame<R>(reader: &mut R) -> Result<Bytes, TransportError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; 2];
    read_exact(reader, &mut prefix).await?;
    let mut frame = BytesMut::zeroed(usize::from(u16::from_le_bytes(prefix)));
    read_exact(reader, &mut frame).await?;
    Ok(frame.freeze())
}

async fn read_exact<R>(reader: &mut R, buf: &mut [u8]) -> Result<(), TransportError>
where
    R: AsyncRead + Unpin,
{
    match reader.read_exact(buf).await {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Err(TransportError::Disconnected),
        Err(e) => Err(TransportError::Io(e)),
    }
}
