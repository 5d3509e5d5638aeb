//! # Frame Codec
//!
//! Length-prefixed text frames over any ordered byte stream.
//!
//! ```text
//! ┌──────────────────────┬──────────────────────────────────────┐
//! │ length (u32, BE)     │ UTF-8 frame text (≤ 64 KiB)           │
//! └──────────────────────┴──────────────────────────────────────┘
//! ```
//!
//! The raw file payload that follows `READY` is not framed: exactly
//! `FILESIZE` bytes are streamed. Every read and write runs under the
//! channel's I/O deadline.

use std::future::Future;
use std::time::Duration;

use num_bigint::BigUint;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::frame::Frame;
use crate::error::{Error, Result};

/// Maximum frame size (64 KiB)
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Chunk size for streaming the raw payload
const PAYLOAD_CHUNK_SIZE: usize = 8 * 1024;

/// A framed, deadline-bounded view of a byte stream.
#[derive(Debug)]
pub struct Channel<S> {
    stream: S,
    io_timeout: Duration,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap `stream`; every read and write must finish within `io_timeout`.
    pub fn new(stream: S, io_timeout: Duration) -> Self {
        Self { stream, io_timeout }
    }

    /// The configured deadline.
    pub fn io_timeout(&self) -> Duration {
        self.io_timeout
    }

    /// Give the stream back.
    pub fn into_inner(self) -> S {
        self.stream
    }

    // ------------------------------------------------------------------------
    // Text frames
    // ------------------------------------------------------------------------

    /// Write one length-prefixed text frame.
    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        let bytes = text.as_bytes();
        if bytes.len() > MAX_FRAME_SIZE {
            return Err(Error::FrameTooLarge {
                size: bytes.len(),
                max: MAX_FRAME_SIZE,
            });
        }

        let len = (bytes.len() as u32).to_be_bytes();
        let timeout = self.io_timeout;
        let stream = &mut self.stream;
        deadline(timeout, "writing a frame", async move {
            stream.write_all(&len).await?;
            stream.write_all(bytes).await?;
            stream.flush().await?;
            Ok::<_, std::io::Error>(())
        })
        .await
    }

    /// Read one length-prefixed text frame.
    pub async fn recv_text(&mut self) -> Result<String> {
        let timeout = self.io_timeout;
        let stream = &mut self.stream;
        let buf = deadline(timeout, "reading a frame", async move {
            let mut len_buf = [0u8; 4];
            stream.read_exact(&mut len_buf).await?;
            let len = u32::from_be_bytes(len_buf) as usize;
            if len > MAX_FRAME_SIZE {
                return Ok(Err(Error::FrameTooLarge {
                    size: len,
                    max: MAX_FRAME_SIZE,
                }));
            }
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await?;
            Ok::<_, std::io::Error>(Ok(buf))
        })
        .await??;

        String::from_utf8(buf).map_err(|_| Error::MalformedFrame("frame is not UTF-8".into()))
    }

    // ------------------------------------------------------------------------
    // Typed frames
    // ------------------------------------------------------------------------

    /// Write a control frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        tracing::trace!(frame = frame.label(), "send");
        self.send_text(&frame.to_string()).await
    }

    /// Read and parse a control frame.
    pub async fn recv_frame(&mut self) -> Result<Frame> {
        let text = self.recv_text().await?;
        let frame = Frame::parse(&text)?;
        tracing::trace!(frame = frame.label(), "recv");
        Ok(frame)
    }

    /// Write an ASCII decimal integer frame.
    pub async fn send_integer(&mut self, value: &BigUint) -> Result<()> {
        self.send_frame(&Frame::Integer(value.clone())).await
    }

    /// Read an integer frame; `what` names it in errors.
    ///
    /// An `ERROR:` frame from the peer becomes [`Error::PeerError`].
    pub async fn recv_integer(&mut self, what: &'static str) -> Result<BigUint> {
        match self.recv_frame().await? {
            Frame::Integer(value) => Ok(value),
            other => Err(unexpected(what, other)),
        }
    }

    /// Read a frame and require it to be `expected`.
    pub async fn expect(&mut self, expected: Frame) -> Result<()> {
        let frame = self.recv_frame().await?;
        if frame == expected {
            Ok(())
        } else {
            Err(unexpected(expected.label(), frame))
        }
    }

    // ------------------------------------------------------------------------
    // Raw payload
    // ------------------------------------------------------------------------

    /// Stream raw bytes, unframed.
    pub async fn send_payload(&mut self, payload: &[u8]) -> Result<()> {
        let timeout = self.io_timeout;
        for chunk in payload.chunks(PAYLOAD_CHUNK_SIZE) {
            let stream = &mut self.stream;
            deadline(timeout, "sending the payload", async move {
                stream.write_all(chunk).await
            })
            .await?;
        }
        let stream = &mut self.stream;
        deadline(timeout, "sending the payload", stream.flush()).await
    }

    /// Copy exactly `size` raw bytes into `sink`.
    ///
    /// A stream that ends early is [`Error::TruncatedTransfer`], never a
    /// short success. `on_progress` sees the running byte count.
    pub async fn recv_payload<W>(
        &mut self,
        size: u64,
        sink: &mut W,
        mut on_progress: impl FnMut(u64),
    ) -> Result<u64>
    where
        W: AsyncWrite + Unpin,
    {
        let timeout = self.io_timeout;
        let mut received: u64 = 0;
        let mut buf = vec![0u8; PAYLOAD_CHUNK_SIZE];
        while received < size {
            let want = (size - received).min(PAYLOAD_CHUNK_SIZE as u64) as usize;
            let stream = &mut self.stream;
            let chunk = &mut buf[..want];
            let n = deadline(timeout, "receiving the payload", async move {
                stream.read(chunk).await
            })
            .await?;
            if n == 0 {
                return Err(Error::TruncatedTransfer {
                    expected: size,
                    received,
                });
            }
            sink.write_all(&buf[..n]).await?;
            received += n as u64;
            on_progress(received);
        }
        sink.flush().await?;
        Ok(received)
    }
}

/// Map a frame that arrived at the wrong step into an error.
pub(crate) fn unexpected(expected: &'static str, got: Frame) -> Error {
    match got {
        Frame::Error(msg) => Error::PeerError(msg),
        other => Error::UnexpectedFrame {
            expected,
            got: other.label().to_string(),
        },
    }
}

/// Run `fut` under `timeout`; expiry is [`Error::TransportTimeout`].
async fn deadline<T, F>(timeout: Duration, what: &str, fut: F) -> Result<T>
where
    F: Future<Output = std::io::Result<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(Error::from),
        Err(_) => Err(Error::TransportTimeout(what.to_string())),
    }
}
