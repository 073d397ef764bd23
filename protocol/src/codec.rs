//! Length-delimited framing over a byte stream.
//!
//! Each frame is a varint byte-length prefix followed by exactly that many
//! payload bytes — the protobuf delimited format the daemon speaks
//! (`writeDelimitedTo` / `parseDelimitedFrom` on its side). This module
//! provides [`FrameReader`] and [`FrameWriter`] for async reading and
//! writing of framed protocol messages.

use prost::Message;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Maximum frame size (4 MiB) to prevent unbounded allocation from a
/// corrupt or hostile length prefix.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Longest legal varint encoding of a u64.
const MAX_VARINT_BYTES: usize = 10;

/// Framing failure. Every variant is a transport-level fault: none of them
/// can be confused with a legitimate empty response, which decodes cleanly
/// from a complete zero-length frame.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The stream closed inside a frame. Distinct from a clean close on a
    /// frame boundary, which [`FrameReader::read_frame`] reports as
    /// `Ok(None)`.
    #[error("unexpected end of stream inside a frame")]
    UnexpectedEof,

    #[error("frame length {len} exceeds maximum {MAX_FRAME_BYTES}")]
    FrameTooLarge { len: u64 },

    #[error("malformed length prefix")]
    InvalidPrefix,

    #[error("frame payload does not decode: {0}")]
    Decode(#[from] prost::DecodeError),
}

/// Reads length-delimited protocol messages from an async reader.
pub struct FrameReader<R> {
    reader: BufReader<R>,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
        }
    }

    /// Read the next frame and decode it as `M`.
    ///
    /// Blocks until a complete frame (prefix plus exactly that many payload
    /// bytes) is available. Returns `Ok(None)` only when the peer closed
    /// the stream on a frame boundary; EOF anywhere inside a frame is
    /// [`FrameError::UnexpectedEof`].
    pub async fn read_frame<M: Message + Default>(&mut self) -> Result<Option<M>, FrameError> {
        let len = match self.read_prefix().await? {
            Some(len) => len,
            None => return Ok(None),
        };

        if len > MAX_FRAME_BYTES as u64 {
            return Err(FrameError::FrameTooLarge { len });
        }

        let mut payload = vec![0u8; len as usize];
        match self.reader.read_exact(&mut payload).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                return Err(FrameError::UnexpectedEof);
            }
            Err(e) => return Err(e.into()),
        }

        Ok(Some(M::decode(payload.as_slice())?))
    }

    /// Decode the varint length prefix, one byte at a time.
    ///
    /// `Ok(None)` iff EOF arrives before the first prefix byte.
    async fn read_prefix(&mut self) -> Result<Option<u64>, FrameError> {
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_BYTES {
            let mut byte = [0u8; 1];
            match self.reader.read_exact(&mut byte).await {
                Ok(_) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    if i == 0 {
                        return Ok(None);
                    }
                    return Err(FrameError::UnexpectedEof);
                }
                Err(e) => return Err(e.into()),
            }
            value |= u64::from(byte[0] & 0x7f) << (7 * i as u32);
            if byte[0] & 0x80 == 0 {
                return Ok(Some(value));
            }
        }
        Err(FrameError::InvalidPrefix)
    }
}

/// Writes length-delimited protocol messages to an async writer.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write one message as a varint-prefixed frame and flush.
    pub async fn write_frame<M: Message>(&mut self, msg: &M) -> Result<(), FrameError> {
        let buf = msg.encode_length_delimited_to_vec();
        self.writer.write_all(&buf).await?;
        self.writer.flush().await?;
        Ok(())
    }
}
