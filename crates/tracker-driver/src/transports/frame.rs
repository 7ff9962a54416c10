//! Length-delimited framing for simulated streams
//!
//! Each frame is a little-endian `u32` byte count followed by the payload.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, TrackerError};

/// Largest frame accepted from the wire.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

const LEN_BYTES: usize = 4;

/// Append one frame to `dst`
///
/// # Errors
///
/// Returns `TransferFailed` if the frame exceeds [`MAX_FRAME_BYTES`].
pub fn encode(frame: &[u8], dst: &mut BytesMut) -> Result<()> {
    if frame.len() > MAX_FRAME_BYTES {
        return Err(TrackerError::transfer_failed(format!(
            "frame of {} bytes exceeds {MAX_FRAME_BYTES}",
            frame.len()
        )));
    }
    dst.reserve(LEN_BYTES + frame.len());
    #[allow(clippy::cast_possible_truncation)]
    dst.put_u32_le(frame.len() as u32);
    dst.put_slice(frame);
    Ok(())
}

/// Split one complete frame off the front of `src`, if there is one
///
/// # Errors
///
/// Returns `TransferFailed` if the declared length exceeds [`MAX_FRAME_BYTES`].
pub fn decode(src: &mut BytesMut) -> Result<Option<Bytes>> {
    if src.len() < LEN_BYTES {
        return Ok(None);
    }
    let len = u32::from_le_bytes([src[0], src[1], src[2], src[3]]) as usize;
    if len > MAX_FRAME_BYTES {
        return Err(TrackerError::transfer_failed(format!(
            "peer announced a {len}-byte frame"
        )));
    }
    if src.len() < LEN_BYTES + len {
        src.reserve(LEN_BYTES + len - src.len());
        return Ok(None);
    }
    src.advance(LEN_BYTES);
    Ok(Some(src.split_to(len).freeze()))
}
