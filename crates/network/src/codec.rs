//! Frame codec for structured messages
//!
//! Every structured message is one frame: a 4-byte big-endian body length
//! followed by the JSON body. Readers always assemble the full declared body
//! before decoding, so a frame is never split or merged by the transport.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

/// Size of the length prefix in bytes.
pub const FRAME_HEADER_LEN: usize = 4;

/// Framing errors
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("connection closed before a frame was received")]
    Closed,
    #[error("connection closed mid-frame after {received} of {expected} bytes")]
    Truncated { received: usize, expected: usize },
    #[error("frame of {len} bytes exceeds limit of {max} bytes")]
    FrameTooLarge { len: usize, max: usize },
    #[error("failed to encode frame: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[source] serde_json::Error),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl WireError {
    /// True for failures caused by the peer going away rather than by bad data.
    pub fn is_disconnect(&self) -> bool {
        match self {
            WireError::Closed | WireError::Truncated { .. } => true,
            WireError::Io(err) => matches!(
                err.kind(),
                io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Serialize `message` and write it as one frame.
pub async fn write_frame<W, T>(writer: &mut W, message: &T) -> Result<(), WireError>
where
    W: AsyncWrite + Unpin,
    T: Serialize + ?Sized,
{
    let body = serde_json::to_vec(message).map_err(WireError::Encode)?;
    let len = u32::try_from(body.len()).map_err(|_| WireError::FrameTooLarge {
        len: body.len(),
        max: u32::MAX as usize,
    })?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    trace!("wrote frame of {} bytes", body.len());
    Ok(())
}

/// Read one complete frame body, refusing bodies longer than `max_len`.
pub async fn read_frame_bytes<R>(reader: &mut R, max_len: usize) -> Result<Vec<u8>, WireError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; FRAME_HEADER_LEN];
    let mut filled = 0;
    while filled < FRAME_HEADER_LEN {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            return Err(if filled == 0 {
                WireError::Closed
            } else {
                WireError::Truncated {
                    received: filled,
                    expected: FRAME_HEADER_LEN,
                }
            });
        }
        filled += n;
    }

    let len = u32::from_be_bytes(header) as usize;
    if len > max_len {
        return Err(WireError::FrameTooLarge { len, max: max_len });
    }

    let mut body = vec![0u8; len];
    let mut received = 0;
    while received < len {
        let n = reader.read(&mut body[received..]).await?;
        if n == 0 {
            return Err(WireError::Truncated {
                received,
                expected: len,
            });
        }
        received += n;
    }

    trace!("read frame of {} bytes", len);
    Ok(body)
}

pub fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T, WireError> {
    serde_json::from_slice(body).map_err(WireError::Decode)
}

/// Read one frame and decode it as `T`.
pub async fn read_frame<R, T>(reader: &mut R, max_len: usize) -> Result<T, WireError>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let body = read_frame_bytes(reader, max_len).await?;
    decode(&body)
}
