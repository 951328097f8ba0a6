use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use super::codec::JsonCodec;
use super::{Inbox, Transport};
use crate::protocol::error::{BridgeError, Result};
use crate::protocol::Message;

/// Largest frame accepted in either direction (100 MB).
pub const MAX_MESSAGE_SIZE: usize = 100 * 1024 * 1024;

/// Length-prefixed JSON transport over an async byte stream.
///
/// # Wire Protocol
///
/// Each message is one frame: a 4-byte big-endian length followed by the
/// JSON-encoded message:
///
/// ```text
/// [4-byte length] [JSON data]
/// ```
///
/// [`StreamTransport::spawn`] splits the stream into a writer task fed by
/// [`Transport::send`] and a reader task feeding the returned [`Inbox`]. The
/// inbox closes when the peer disconnects or sends an invalid frame. Once the
/// transport and all its clones are dropped, the write side is shut down so
/// the peer's inbox closes too.
///
/// # Example
///
/// ```no_run
/// use portal_common::transport::StreamTransport;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let stream = tokio::net::TcpStream::connect("127.0.0.1:7070").await?;
/// let (transport, inbox) = StreamTransport::spawn(stream);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct StreamTransport {
    outbound: mpsc::UnboundedSender<Message>,
}

impl StreamTransport {
    /// Starts the reader and writer tasks for `stream`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S>(stream: S) -> (Self, Inbox)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (mut reader, mut writer) = tokio::io::split(stream);
        let (outbound, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound, inbox) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                let encoded = match JsonCodec::encode(&message) {
                    Ok(encoded) => encoded,
                    Err(e) => {
                        tracing::warn!("Dropping unencodable message: {}", e);
                        continue;
                    }
                };
                if let Err(e) = Self::send_frame(&mut writer, &encoded).await {
                    tracing::warn!("Stream writer stopped: {}", e);
                    break;
                }
            }
            // Every sender is gone: let the peer see end of stream
            if let Err(e) = writer.shutdown().await {
                tracing::debug!("Stream shutdown failed: {}", e);
            }
        });

        tokio::spawn(async move {
            loop {
                let frame = match Self::receive_frame(&mut reader).await {
                    Ok(Some(frame)) => frame,
                    Ok(None) => {
                        tracing::debug!("Stream closed by peer");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!("Stream reader stopped: {}", e);
                        break;
                    }
                };
                match JsonCodec::decode(&frame) {
                    Ok(message) => {
                        if inbound.send(message).is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!("Ignoring undecodable frame: {}", e),
                }
            }
        });

        (Self { outbound }, inbox)
    }

    /// Writes one frame.
    ///
    /// Wire format: `[4-byte length as u32 big-endian] + [data]`
    pub async fn send_frame<W>(writer: &mut W, data: &[u8]) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(BridgeError::MessageTooLarge(data.len()));
        }
        let len = data.len() as u32;

        writer
            .write_all(&len.to_be_bytes())
            .await
            .map_err(|e| Self::map_io_error(e, "writing length prefix"))?;

        writer
            .write_all(data)
            .await
            .map_err(|e| Self::map_io_error(e, "writing data"))?;

        writer
            .flush()
            .await
            .map_err(|e| Self::map_io_error(e, "flushing stream"))?;

        Ok(())
    }

    /// Reads one frame. Returns `None` on a clean end of stream.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The stream ends in the middle of a frame
    /// - The frame exceeds [`MAX_MESSAGE_SIZE`]
    pub async fn receive_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
    where
        R: AsyncRead + Unpin,
    {
        let mut len_buf = [0u8; 4];
        match reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(Self::map_io_error(e, "reading length prefix")),
        }

        let len = u32::from_be_bytes(len_buf) as usize;
        if len > MAX_MESSAGE_SIZE {
            return Err(BridgeError::MessageTooLarge(len));
        }

        let mut buf = vec![0u8; len];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|e| Self::map_io_error(e, "reading data"))?;

        Ok(Some(buf))
    }

    /// Map IO errors to bridge errors
    ///
    /// - Connection errors -> `Transport`
    /// - Other IO errors -> `Io`
    fn map_io_error(err: std::io::Error, context: &str) -> BridgeError {
        match err.kind() {
            std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::BrokenPipe
            | std::io::ErrorKind::UnexpectedEof
            | std::io::ErrorKind::NotConnected => {
                BridgeError::Transport(format!("{}: Connection lost", context))
            }
            _ => BridgeError::Io(err),
        }
    }
}

impl Transport for StreamTransport {
    fn send(&self, message: Message) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| BridgeError::Transport("stream writer stopped".into()))
    }
}

/// Connects to a TCP endpoint and wraps it in a [`StreamTransport`].
pub async fn connect(addr: &str, timeout: Duration) -> Result<(StreamTransport, Inbox)> {
    let stream = tokio::time::timeout(timeout, tokio::net::TcpStream::connect(addr))
        .await
        .map_err(|_| BridgeError::Transport(format!("Timed out connecting to {}", addr)))?
        .map_err(|e| BridgeError::Transport(format!("Failed to connect to {}: {}", addr, e)))?;
    Ok(StreamTransport::spawn(stream))
}
