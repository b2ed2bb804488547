//! Wire vocabulary shared by the gateway and anything that talks to it.
//!
//! Every frame on the wire is a 4-byte big-endian unsigned length followed by
//! exactly that many payload bytes. Payloads are opaque to the gateway.

use std::io;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

/// Identifies one live connection for its whole lifetime.
pub type ConnectionId = i64;

/// Routing sentinel: the packet is discarded.
pub const DROP: ConnectionId = 0;
/// Routing sentinel: the packet goes to every live connection.
pub const BROADCAST: ConnectionId = ConnectionId::MAX;

pub const LENGTH_PREFIX_SIZE: usize = 4;
pub const MAX_INBOUND_PAYLOAD: usize = 1 << 14;
pub const MAX_OUTBOUND_PAYLOAD: usize = 1 << 20;

/// Returns true for ids that redirect routing instead of naming a connection.
pub fn is_reserved(id: ConnectionId) -> bool {
    id == DROP || id == BROADCAST
}

/// A connection id plus an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    id: ConnectionId,
    payload: Vec<u8>,
}

impl Packet {
    pub fn new(id: ConnectionId, payload: Vec<u8>) -> Self {
        Self { id, payload }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame declares zero-length payload")]
    ZeroLength,
    #[error("frame payload of {size} bytes exceeds limit of {max}")]
    TooLarge { size: usize, max: usize },
    #[error("read timed out after {0:?}")]
    ReadTimeout(Duration),
    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),
    #[error("stream ended mid-frame ({received} of {expected} bytes)")]
    UnexpectedEof { expected: usize, received: usize },
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

/// Checks a payload length against `1..=max`.
pub fn check_payload_len(size: usize, max: usize) -> Result<(), FrameError> {
    if size == 0 {
        Err(FrameError::ZeroLength)
    } else if size > max {
        Err(FrameError::TooLarge { size, max })
    } else {
        Ok(())
    }
}

/// Builds a complete frame (prefix + payload) in one buffer.
pub fn encode_frame(payload: &[u8], max: usize) -> Result<Vec<u8>, FrameError> {
    check_payload_len(payload.len(), max)?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Reads one frame.
///
/// Returns `Ok(None)` when the stream ends cleanly on a frame boundary. Each
/// individual read call is bounded by `read_timeout`, so a peer trickling
/// bytes keeps the frame alive while a silent one is cut off.
pub async fn read_frame<R>(
    reader: &mut R,
    max: usize,
    read_timeout: Duration,
) -> Result<Option<Vec<u8>>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
    let filled = read_full(reader, &mut prefix, read_timeout).await?;
    if filled == 0 {
        return Ok(None);
    }
    if filled < LENGTH_PREFIX_SIZE {
        return Err(FrameError::UnexpectedEof {
            expected: LENGTH_PREFIX_SIZE,
            received: filled,
        });
    }

    let size = u32::from_be_bytes(prefix) as usize;
    check_payload_len(size, max)?;

    let mut payload = vec![0u8; size];
    let filled = read_full(reader, &mut payload, read_timeout).await?;
    if filled < size {
        return Err(FrameError::UnexpectedEof {
            expected: size,
            received: filled,
        });
    }
    Ok(Some(payload))
}

/// Writes the length prefix and then the payload.
pub async fn write_frame<W>(
    writer: &mut W,
    payload: &[u8],
    max: usize,
    write_timeout: Duration,
) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    check_payload_len(payload.len(), max)?;
    let prefix = (payload.len() as u32).to_be_bytes();
    write_full(writer, &prefix, write_timeout).await?;
    write_full(writer, payload, write_timeout).await?;
    Ok(())
}

// Fills `buf` until full or EOF; returns the number of bytes read.
async fn read_full<R>(reader: &mut R, buf: &mut [u8], limit: Duration) -> Result<usize, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut filled = 0;
    while filled < buf.len() {
        let n = timeout(limit, reader.read(&mut buf[filled..]))
            .await
            .map_err(|_| FrameError::ReadTimeout(limit))??;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

async fn write_full<W>(writer: &mut W, buf: &[u8], limit: Duration) -> Result<(), FrameError>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0;
    while written < buf.len() {
        let n = timeout(limit, writer.write(&buf[written..]))
            .await
            .map_err(|_| FrameError::WriteTimeout(limit))??;
        if n == 0 {
            return Err(io::Error::from(io::ErrorKind::WriteZero).into());
        }
        written += n;
    }
    Ok(())
}
