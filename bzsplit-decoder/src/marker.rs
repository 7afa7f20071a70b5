//! Resynchronization to the next block delimiter.
//!
//! Block headers are not byte-aligned, so a reader dropped at an arbitrary
//! byte offset (the situation of every split worker but the first) must
//! slide a bit window over the stream until the 48-bit block delimiter
//! appears. On a match the reported position is set to the byte at which
//! the delimiter begins; running out of input during the scan is not an
//! error: it means the assigned range holds no further block.

use crate::position::PositionTracker;
use bzsplit_core::bitstream::BitReader;
use bzsplit_core::error::{BzError, Result};
use log::debug;
use std::io::Read;

/// Scan forward until `marker` (of `marker_bits` bits) appears in the
/// stream, one bit at a time.
///
/// Returns `true` and sets the reported position to the byte offset where
/// the matched pattern begins, or `false` (with the reported position set
/// to the bytes consumed) if the source ran out first. I/O errors during
/// the scan are treated as "no marker found" so a split reader can conclude
/// its range is exhausted.
///
/// Fails with [`BzError::InvalidArgument`] when `marker_bits` is outside
/// `1..=63`.
pub fn scan_to_marker<R: Read>(
    reader: &mut BitReader<R>,
    pos: &mut PositionTracker,
    marker: u64,
    marker_bits: u32,
) -> Result<bool> {
    if marker_bits == 0 || marker_bits > 63 {
        return Err(BzError::invalid_argument(
            "marker patterns must be 1..=63 bits long",
        ));
    }

    let mask = (1u64 << marker_bits) - 1;
    let mut window = match read_window(reader, marker_bits) {
        Ok(Some(bits)) => bits,
        Ok(None) => {
            pos.set_reported(reader.bytes_consumed());
            return Ok(false);
        }
        Err(e) => return Err(e),
    };

    loop {
        if window == marker {
            // The byte containing the first bit of the matched pattern.
            let marker_bytes = (u64::from(marker_bits) + u64::from(reader.live_bits()) + 7) / 8;
            let offset = reader.bytes_consumed() - marker_bytes;
            pos.set_reported(offset);
            debug!("block delimiter found at byte {offset}");
            return Ok(true);
        }
        match reader.read_bit() {
            Ok(bit) => window = ((window << 1) & mask) | u64::from(bit),
            Err(BzError::UnexpectedEndOfStream) | Err(BzError::Io(_)) => {
                pos.set_reported(reader.bytes_consumed());
                debug!("source exhausted while scanning for block delimiter");
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
    }
}

/// Read the initial window, in two pieces when it exceeds a single bit
/// read. `None` means the source ran out first.
fn read_window<R: Read>(reader: &mut BitReader<R>, bits: u32) -> Result<Option<u64>> {
    let (hi_bits, lo_bits) = if bits > 32 { (bits - 32, 32) } else { (bits, 0) };
    let mut window = match reader.read_bits(hi_bits) {
        Ok(value) => value,
        Err(BzError::UnexpectedEndOfStream) | Err(BzError::Io(_)) => return Ok(None),
        Err(e) => return Err(e),
    };
    if lo_bits > 0 {
        match reader.read_bits(lo_bits) {
            Ok(value) => window = (window << lo_bits) | value,
            Err(BzError::UnexpectedEndOfStream) | Err(BzError::Io(_)) => return Ok(None),
            Err(e) => return Err(e),
        }
    }
    Ok(Some(window))
}
