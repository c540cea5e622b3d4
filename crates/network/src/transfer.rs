//! Declared-length transfer handshake
//!
//! ```text
//! sender                        receiver
//!   Declare { size }   ───────▶
//!                      ◀───────  Ack | Abort { fault }
//!   exactly `size` raw bytes ──▶  (accumulated until the total equals `size`)
//! ```
//!
//! A payload counts as received only once the running total equals the
//! declared size. A stream that ends earlier yields [`TransferError::Truncated`].

use bigfs_types::{Fault, FaultKind};
use std::future::Future;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::codec::{read_frame, write_frame, WireError};
use crate::messages::Handshake;

/// Limits applied on both ends of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub chunk_size: usize,
    pub max_size: u64,
    /// Bound on the handshake control frames.
    pub max_frame_len: usize,
    /// Longest wait for any single read or write on the stream.
    pub idle_timeout: Option<Duration>,
}

impl TransferLimits {
    pub fn new(chunk_size: usize, max_size: u64, max_frame_len: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_size,
            max_frame_len,
            idle_timeout: None,
        }
    }

    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = Some(idle_timeout);
        self
    }

    pub fn check(&self, declared: u64) -> Result<(), TransferError> {
        if declared > self.max_size {
            return Err(TransferError::TooLarge {
                declared,
                max: self.max_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("declared size {declared} exceeds limit of {max} bytes")]
    TooLarge { declared: u64, max: u64 },
    #[error("transfer truncated after {received} of {declared} bytes")]
    Truncated { received: u64, declared: u64 },
    #[error("transfer refused by peer: {0}")]
    Rejected(Fault),
    #[error("transfer stalled for {0:?}")]
    TimedOut(Duration),
    #[error("unexpected handshake frame, expected {expected}")]
    Unexpected { expected: &'static str },
    #[error(transparent)]
    Wire(#[from] WireError),
    #[error("I/O error during transfer: {0}")]
    Io(#[from] io::Error),
}

impl TransferError {
    /// Fault to report to the peer (or caller) for this failure.
    pub fn to_fault(&self) -> Fault {
        match self {
            TransferError::TooLarge { .. } => Fault::new(FaultKind::TooLarge, self.to_string()),
            TransferError::Rejected(fault) => fault.clone(),
            TransferError::Io(err) => Fault::from_io(err, "transfer"),
            _ => Fault::new(FaultKind::Transfer, self.to_string()),
        }
    }
}

/// Await `operation`, bounded by the idle timeout when one is configured.
async fn bounded<T, E, F>(limits: &TransferLimits, operation: F) -> Result<T, TransferError>
where
    F: Future<Output = Result<T, E>>,
    TransferError: From<E>,
{
    match limits.idle_timeout {
        Some(limit) => match tokio::time::timeout(limit, operation).await {
            Ok(result) => result.map_err(TransferError::from),
            Err(_) => Err(TransferError::TimedOut(limit)),
        },
        None => operation.await.map_err(TransferError::from),
    }
}

/// Sender side: announce `size`, wait for the acknowledgement, then stream
/// exactly `size` bytes from `source`.
///
/// A declaration above `limits.max_size` is refused locally with an `Abort`
/// frame so the peer does not wait for bytes that will never come.
pub async fn send_payload<S, R>(
    stream: &mut S,
    source: &mut R,
    size: u64,
    limits: &TransferLimits,
) -> Result<(), TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    if let Err(err) = limits.check(size) {
        bounded(limits, refuse(stream, err.to_fault())).await?;
        return Err(err);
    }

    bounded(limits, write_frame(stream, &Handshake::Declare { size })).await?;

    match bounded(limits, read_frame::<_, Handshake>(stream, limits.max_frame_len)).await? {
        Handshake::Ack => {}
        Handshake::Abort { fault } => return Err(TransferError::Rejected(fault)),
        Handshake::Declare { .. } => return Err(TransferError::Unexpected { expected: "ack" }),
    }

    let mut buffer = vec![0u8; limits.chunk_size];
    let mut sent: u64 = 0;
    while sent < size {
        let want = usize::try_from(size - sent)
            .unwrap_or(usize::MAX)
            .min(buffer.len());
        let n = source.read(&mut buffer[..want]).await?;
        if n == 0 {
            // Source shrank after the size was declared.
            return Err(TransferError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("source ended after {sent} of {size} bytes"),
            )));
        }
        bounded(limits, stream.write_all(&buffer[..n])).await?;
        sent += n as u64;
    }
    bounded(limits, stream.flush()).await?;

    debug!("sent payload of {} bytes", size);
    Ok(())
}

/// Receiver side: read the sender's opening handshake frame and return the
/// declared size. Nothing is answered yet; see [`acknowledge`] and [`refuse`].
pub async fn read_declaration<S>(stream: &mut S, max_frame_len: usize) -> Result<u64, TransferError>
where
    S: AsyncRead + Unpin,
{
    match read_frame::<_, Handshake>(stream, max_frame_len).await? {
        Handshake::Declare { size } => Ok(size),
        Handshake::Abort { fault } => Err(TransferError::Rejected(fault)),
        Handshake::Ack => Err(TransferError::Unexpected {
            expected: "declare",
        }),
    }
}

pub async fn acknowledge<S>(stream: &mut S) -> Result<(), TransferError>
where
    S: AsyncWrite + Unpin,
{
    write_frame(stream, &Handshake::Ack).await?;
    Ok(())
}

pub async fn refuse<S>(stream: &mut S, fault: Fault) -> Result<(), TransferError>
where
    S: AsyncWrite + Unpin,
{
    write_frame(stream, &Handshake::Abort { fault }).await?;
    Ok(())
}

/// Accumulate exactly `declared` bytes from `stream` into `sink`.
pub async fn receive_body<S, W>(
    stream: &mut S,
    sink: &mut W,
    declared: u64,
    limits: &TransferLimits,
) -> Result<u64, TransferError>
where
    S: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; limits.chunk_size.max(1)];
    let mut received: u64 = 0;
    while received < declared {
        let want = usize::try_from(declared - received)
            .unwrap_or(usize::MAX)
            .min(buffer.len());
        let n = bounded(limits, stream.read(&mut buffer[..want])).await?;
        if n == 0 {
            return Err(TransferError::Truncated { received, declared });
        }
        sink.write_all(&buffer[..n]).await?;
        received += n as u64;
    }
    sink.flush().await?;

    debug!("received payload of {} bytes", received);
    Ok(received)
}

/// Receiver side in one step: read the declaration, refuse it if it exceeds
/// the limit, otherwise acknowledge and accumulate the payload into `sink`.
pub async fn receive_payload<S, W>(
    stream: &mut S,
    sink: &mut W,
    limits: &TransferLimits,
) -> Result<u64, TransferError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    W: AsyncWrite + Unpin,
{
    let declared = bounded(limits, read_declaration(stream, limits.max_frame_len)).await?;
    if let Err(err) = limits.check(declared) {
        bounded(limits, refuse(stream, err.to_fault())).await?;
        return Err(err);
    }
    bounded(limits, acknowledge(stream)).await?;
    receive_body(stream, sink, declared, limits).await
}
