//! Wire framing between `RemoteTransport` and `JournalReceiver`
//!
//! Frame format:
//! ```text
//! +--------+--------+---------+--------+
//! | Magic  | Length | Payload | CRC32C |
//! | 4B     | 4B     | var     | 4B     |
//! +--------+--------+---------+--------+
//! ```
//! The payload is a bincode-encoded [`Request`] or [`Reply`]; the CRC covers
//! magic, length and payload.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::{self, Read, Write};

/// Frame magic number
const FRAME_MAGIC: u32 = 0x464A_524E; // "FJRN"

/// Header size (magic + length)
const FRAME_HEADER_SIZE: usize = 8;

/// Largest payload accepted; entries carry inline content
pub(crate) const MAX_PAYLOAD: usize = 256 * 1024 * 1024;

/// Sent by the transport
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Request {
    OpenFile {
        repository_hash: String,
        filename: String,
        /// Journal timestamp form
        timestamp: String,
    },
    WriteEntry {
        sequence: u64,
        xml: String,
    },
    CloseFile,
    Shutdown,
}

/// Sent back by the receiver for every request
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub(crate) enum Reply {
    Ok,
    Error(String),
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

pub(crate) fn write_frame<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let payload = bincode::serialize(message).map_err(|e| invalid(e.to_string()))?;
    if payload.len() > MAX_PAYLOAD {
        return Err(invalid(format!("frame of {} bytes too large", payload.len())));
    }
    let len = u32::try_from(payload.len()).map_err(|_| invalid("frame too large"))?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len() + 4);
    buf.extend_from_slice(&FRAME_MAGIC.to_le_bytes());
    buf.extend_from_slice(&len.to_le_bytes());
    buf.extend_from_slice(&payload);
    let crc = crc32c::crc32c(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());

    writer.write_all(&buf)?;
    writer.flush()
}

/// Read one frame; `None` on a clean end of stream before a frame starts
pub(crate) fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<Option<T>> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    let mut filled = 0;
    while filled < FRAME_HEADER_SIZE {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(io::Error::from(io::ErrorKind::UnexpectedEof)),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    let magic = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
    if magic != FRAME_MAGIC {
        return Err(invalid(format!("bad frame magic {magic:#010x}")));
    }
    let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
    if len > MAX_PAYLOAD {
        return Err(invalid(format!("frame of {len} bytes too large")));
    }

    let mut rest = vec![0u8; len + 4];
    reader.read_exact(&mut rest)?;
    let (payload, crc_bytes) = rest.split_at(len);
    let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
    let computed = crc32c::crc32c_append(crc32c::crc32c(&header), payload);
    if stored != computed {
        return Err(invalid("frame CRC mismatch"));
    }

    bincode::deserialize(payload)
        .map(Some)
        .map_err(|e| invalid(e.to_string()))
}
