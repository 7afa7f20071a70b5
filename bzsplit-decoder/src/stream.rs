//! The top-level decoder state machine.
//!
//! [`BzDecoder`] sequences header parsing, per-block decoding, the
//! byte-at-a-time inverse BWT walk with run-of-4 RLE expansion, CRC
//! verification, and, in by-block mode, resynchronization to the next
//! block delimiter with position reporting.
//!
//! Reading is pipelined one byte deep: every successful data read returns
//! the byte computed by the previous call and computes the next one, so a
//! block boundary (end-of-block CRC check, next-block setup) is crossed on
//! the call that returns the block's final byte. The RLE tail emits exactly
//! one byte per call.

use crate::block::{self, BlockWorkspace};
use crate::ibwt::{self, IbwtCursor};
use crate::marker;
use crate::position::PositionTracker;
use crate::{BLOCK_DELIMITER, DELIMITER_BITS, EOS_DELIMITER};
use bzsplit_core::bitstream::BitReader;
use bzsplit_core::crc::{self, Crc32};
use bzsplit_core::error::{BzError, Result};
use log::debug;
use std::io::{self, BufReader, Read};

/// Pre-buffer size for the underlying byte source.
const SOURCE_BUFFER_SIZE: usize = 9 * 1024;

/// How a [`BzDecoder`] traverses the compressed stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    /// Decode from the stream header to the end-of-stream token, emitting
    /// one contiguous byte stream. Position reporting is not meaningful.
    Continuous,
    /// Resynchronize to the next block delimiter on construction and after
    /// every block; reads return [`ReadOutcome::EndOfBlock`] at block
    /// boundaries and the reported position advances to the byte offset of
    /// the next delimiter.
    ByBlock,
}

/// Result of a single-byte read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadOutcome {
    /// One decompressed byte.
    Byte(u8),
    /// The current block ended (by-block mode only).
    EndOfBlock,
    /// The stream ended.
    EndOfStream,
}

/// Result of a bulk read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadStatus {
    /// Number of bytes written into the destination.
    Data(usize),
    /// The current block ended before any byte could be written.
    EndOfBlock,
    /// The stream ended before any byte could be written.
    EndOfStream,
}

/// Decoder state. The `*A` states and `StartBlock` are transient within a
/// single read call; reads observe the others.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    StartBlock,
    NoProcess,
    RandA,
    RandB,
    RandC,
    NoRandA,
    NoRandB,
    NoRandC,
    Eof,
}

/// A streaming BZip2 decoder over any byte source.
///
/// The source must start at the byte after the two `BZ` magic bytes; strip
/// them before constructing the decoder and call
/// [`adjust_reported_bytes`](Self::adjust_reported_bytes) if reported
/// positions should account for them.
///
/// Instances are not safe for concurrent use. Dropping the decoder releases
/// its buffers; [`close`](Self::close) does so eagerly and is idempotent.
pub struct BzDecoder<R: Read> {
    bin: Option<BitReader<BufReader<R>>>,
    mode: ReadMode,
    state: State,
    block_size100k: usize,
    ws: Option<BlockWorkspace>,
    cursor: IbwtCursor,
    /// Bytes in the current block.
    block_len: usize,
    orig_ptr: u32,
    block_randomized: bool,
    stored_block_crc: u32,
    combined_crc: u32,
    block_crc: Crc32,
    pos: PositionTracker,
    /// The pipelined byte returned by the next read.
    current_char: u8,
    /// Whether the last delimiter scan found a block.
    scan_found_block: bool,
    /// Raw consumed-byte count preserved across `close`.
    raw_at_close: u64,
}

impl<R: Read> BzDecoder<R> {
    /// Construct a decoder in the given mode.
    ///
    /// In [`ReadMode::Continuous`] the stream header (`h` plus a block-size
    /// digit) is parsed and the first block decoded immediately; in
    /// [`ReadMode::ByBlock`] the source is scanned forward to the first
    /// block delimiter instead and the header, if present, is skipped over.
    pub fn new(source: R, mode: ReadMode) -> Result<Self> {
        let mut decoder = Self {
            bin: Some(BitReader::new(BufReader::with_capacity(
                SOURCE_BUFFER_SIZE,
                source,
            ))),
            mode,
            state: State::StartBlock,
            // By-block readers never see a stream header; size for the
            // largest level so any stream fits.
            block_size100k: 9,
            ws: None,
            cursor: IbwtCursor::default(),
            block_len: 0,
            orig_ptr: 0,
            block_randomized: false,
            stored_block_crc: 0,
            combined_crc: 0,
            block_crc: Crc32::new(),
            pos: PositionTracker::new(),
            current_char: 0,
            scan_found_block: false,
            raw_at_close: 0,
        };

        match mode {
            ReadMode::Continuous => {
                decoder.parse_stream_header()?;
                decoder.init_block()?;
                decoder.setup_block()?;
            }
            ReadMode::ByBlock => {
                decoder.state = State::NoProcess;
                decoder.scan_found_block = decoder.scan_for_block()?;
                decoder.change_state_to_process_a_block()?;
            }
        }

        Ok(decoder)
    }

    /// The mode this decoder was constructed in.
    pub fn mode(&self) -> ReadMode {
        self.mode
    }

    /// The advertised position in the compressed source, in bytes.
    ///
    /// Only updated at block boundaries (and only meaningfully in by-block
    /// mode): after a read returns [`ReadOutcome::EndOfBlock`] this is the
    /// byte offset at which the next block delimiter begins, or the total
    /// source length when no further block exists.
    pub fn reported_bytes_consumed(&self) -> u64 {
        self.pos.reported()
    }

    /// Raw number of bytes pulled off the compressed source so far.
    pub fn compressed_bytes_read(&self) -> u64 {
        self.bin
            .as_ref()
            .map_or(self.raw_at_close, BitReader::bytes_consumed)
    }

    /// Account for source bytes consumed before this decoder was given the
    /// stream, typically the two `BZ` magic bytes stripped by the caller.
    pub fn adjust_reported_bytes(&mut self, count: u64) {
        self.pos.adjust(count);
        if let Some(bin) = self.bin.as_mut() {
            bin.add_bytes_consumed(count);
        }
    }

    /// Release the decoder's buffers. Idempotent; subsequent reads fail
    /// with [`BzError::InvalidArgument`].
    pub fn close(&mut self) {
        if let Some(bin) = self.bin.take() {
            self.raw_at_close = bin.bytes_consumed();
        }
        self.ws = None;
        self.state = State::Eof;
    }

    /// Read a single decompressed byte, or a boundary event.
    pub fn read_byte(&mut self) -> Result<ReadOutcome> {
        let mut byte = [0u8; 1];
        Ok(match self.read_into(&mut byte)? {
            ReadStatus::Data(_) => ReadOutcome::Byte(byte[0]),
            ReadStatus::EndOfBlock => ReadOutcome::EndOfBlock,
            ReadStatus::EndOfStream => ReadOutcome::EndOfStream,
        })
    }

    /// Fill `buf` with up to `buf.len()` decompressed bytes.
    ///
    /// When zero bytes could be produced, the boundary that stopped the
    /// read is returned once, and the decoder lines itself up on the next
    /// block (scanning for its delimiter) so the following call continues
    /// there. Errors are fatal: the decoder parks at end of stream.
    pub fn read_into(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        match self.read_into_inner(buf) {
            Ok(status) => Ok(status),
            Err(e) => {
                self.state = State::Eof;
                Err(e)
            }
        }
    }

    fn read_into_inner(&mut self, buf: &mut [u8]) -> Result<ReadStatus> {
        if self.bin.is_none() {
            return Err(BzError::invalid_argument("decoder is closed"));
        }
        if buf.is_empty() {
            return Ok(ReadStatus::Data(0));
        }

        let mut filled = 0usize;
        loop {
            let mut boundary = ReadOutcome::EndOfStream;
            while filled < buf.len() {
                match self.next_event()? {
                    ReadOutcome::Byte(b) => {
                        buf[filled] = b;
                        filled += 1;
                    }
                    other => {
                        boundary = other;
                        break;
                    }
                }
            }

            if filled > 0 {
                return Ok(ReadStatus::Data(filled));
            }

            // Zero bytes produced: line up the next block. In continuous
            // mode an end of stream followed by a further block delimiter
            // means another stream was concatenated onto this one: splice
            // it in (with a fresh combined CRC) instead of reporting EOS.
            self.scan_found_block = self.scan_for_block()?;
            let splice = self.mode == ReadMode::Continuous
                && boundary == ReadOutcome::EndOfStream
                && self.scan_found_block;
            if splice {
                self.combined_crc = 0;
            }
            self.change_state_to_process_a_block()?;
            if splice {
                continue;
            }

            return Ok(match boundary {
                ReadOutcome::EndOfBlock => ReadStatus::EndOfBlock,
                _ => ReadStatus::EndOfStream,
            });
        }
    }

    /// Produce the next read event: the pipelined byte (advancing the state
    /// machine one step), or a boundary.
    fn next_event(&mut self) -> Result<ReadOutcome> {
        let ret = self.current_char;
        match self.state {
            State::Eof => Ok(ReadOutcome::EndOfStream),
            State::NoProcess => Ok(ReadOutcome::EndOfBlock),
            State::RandB | State::NoRandB => {
                self.setup_part_b()?;
                Ok(ReadOutcome::Byte(ret))
            }
            State::RandC | State::NoRandC => {
                self.setup_part_c()?;
                Ok(ReadOutcome::Byte(ret))
            }
            State::StartBlock | State::RandA | State::NoRandA => {
                unreachable!("transient decoder state {:?} observed by read", self.state)
            }
        }
    }

    fn bit_reader(&mut self) -> &mut BitReader<BufReader<R>> {
        self.bin
            .as_mut()
            .expect("bit reader is present while decoding")
    }

    /// Parse the stream header: `h` plus the block-size digit `1`..`9`.
    fn parse_stream_header(&mut self) -> Result<()> {
        let bin = self.bit_reader();
        let magic = bin.read_u8()?;
        if magic != b'h' {
            return Err(BzError::bad_stream_header(format!(
                "expected 'h' as first byte but got {magic:#04x}"
            )));
        }
        let digit = bin.read_u8()?;
        if !(b'1'..=b'9').contains(&digit) {
            return Err(BzError::bad_stream_header(format!(
                "illegal block size digit {digit:#04x}"
            )));
        }
        self.block_size100k = usize::from(digit - b'0');
        debug!("stream header: block size {}00k", self.block_size100k);
        Ok(())
    }

    /// Scan forward to the next block delimiter, updating the reported
    /// position. EOF or I/O trouble during the scan means "no block".
    fn scan_for_block(&mut self) -> Result<bool> {
        let Self { bin, pos, .. } = self;
        let bin = bin.as_mut().expect("bit reader is present while decoding");
        marker::scan_to_marker(bin, pos, BLOCK_DELIMITER, DELIMITER_BITS)
    }

    /// After a delimiter scan: decode the found block, or park at EOF.
    fn change_state_to_process_a_block(&mut self) -> Result<()> {
        if self.scan_found_block {
            self.init_block_body()?;
            self.setup_block()
        } else {
            self.state = State::Eof;
            Ok(())
        }
    }

    /// Continuous-mode block transition: the next six bytes are either a
    /// block delimiter or the end-of-stream token.
    fn init_block(&mut self) -> Result<()> {
        let token = self.bit_reader().read_bits(48)?;
        if token == EOS_DELIMITER {
            self.complete()
        } else if token == BLOCK_DELIMITER {
            self.init_block_body()
        } else {
            self.state = State::Eof;
            Err(BzError::bad_block_header(token))
        }
    }

    /// Decode one block, starting just after its 48-bit delimiter.
    fn init_block_body(&mut self) -> Result<()> {
        if self.ws.is_none() {
            self.ws = Some(BlockWorkspace::new(self.block_size100k));
            debug!(
                "allocated block workspace for level {}",
                self.block_size100k
            );
        }

        let (stored_crc, randomized, orig_ptr, block_len) = {
            let Self { bin, ws, .. } = self;
            let bin = bin.as_mut().expect("bit reader is present while decoding");
            let ws = ws.as_mut().expect("block workspace was just allocated");

            let stored_crc = bin.read_u32()?;
            let randomized = bin.read_bit()?;
            let orig_ptr = bin.read_bits(24)? as u32;
            let block_len = block::decode_block_body(bin, ws)?;
            (stored_crc, randomized, orig_ptr, block_len)
        };

        self.stored_block_crc = stored_crc;
        self.block_randomized = randomized;
        self.orig_ptr = orig_ptr;
        self.block_len = block_len;
        self.block_crc.reset();
        self.state = State::StartBlock;
        debug!(
            "block decoded: {} bytes, randomized={}",
            self.block_len, self.block_randomized
        );
        Ok(())
    }

    /// Build the inverse BWT tables and emit the block's first byte into
    /// the read pipeline.
    fn setup_block(&mut self) -> Result<()> {
        if self.state == State::Eof {
            return Ok(());
        }
        let Some(ws) = self.ws.as_mut() else {
            return Ok(());
        };

        let t_pos = ibwt::build_transition(ws, self.block_len, self.orig_ptr)?;
        self.cursor = IbwtCursor::new(t_pos, self.block_randomized);
        self.setup_part_a()
    }

    /// Verify the block CRC and fold it into the combined CRC.
    fn end_block(&mut self) -> Result<()> {
        let computed = self.block_crc.value();
        if computed != self.stored_block_crc {
            return Err(BzError::crc_mismatch(self.stored_block_crc, computed));
        }
        self.combined_crc = crc::combine(self.combined_crc, computed);
        debug!("block CRC ok: {computed:#010x}");
        Ok(())
    }

    /// End of stream: verify the combined CRC and release the workspace.
    fn complete(&mut self) -> Result<()> {
        let stored = self.bit_reader().read_u32()?;
        self.state = State::Eof;
        self.ws = None;
        if stored != self.combined_crc {
            return Err(BzError::crc_mismatch(stored, self.combined_crc));
        }
        debug!("end of stream, combined CRC ok");
        Ok(())
    }

    /// Advance the walk one byte, or close out the block when exhausted.
    fn setup_part_a(&mut self) -> Result<()> {
        if self.cursor.i2 < self.block_len {
            let ws = self.ws.as_ref().expect("active block workspace");
            let ch = self.cursor.pull(&ws.ll8, &ws.tt, self.block_len)?;
            self.cursor.prev = (self.cursor.i2 > 0).then_some(self.cursor.ch);
            self.cursor.ch = ch;
            self.cursor.i2 += 1;
            self.current_char = ch;
            self.block_crc.update_byte(ch);
            self.state = if self.block_randomized {
                State::RandB
            } else {
                State::NoRandB
            };
            Ok(())
        } else {
            self.state = if self.block_randomized {
                State::RandA
            } else {
                State::NoRandA
            };
            self.end_block()?;
            match self.mode {
                ReadMode::Continuous => {
                    self.init_block()?;
                    self.setup_block()
                }
                ReadMode::ByBlock => {
                    self.state = State::NoProcess;
                    Ok(())
                }
            }
        }
    }

    /// Decide whether the just-emitted byte extends a run; a fourth equal
    /// byte makes the next walk byte an RLE tail length instead of data.
    fn setup_part_b(&mut self) -> Result<()> {
        if self.cursor.prev != Some(self.cursor.ch) {
            self.cursor.count = 1;
            self.setup_part_a()
        } else {
            self.cursor.count += 1;
            if self.cursor.count >= 4 {
                let ws = self.ws.as_ref().expect("active block workspace");
                self.cursor.z = self.cursor.pull(&ws.ll8, &ws.tt, self.block_len)?;
                self.cursor.j2 = 0;
                self.state = if self.block_randomized {
                    State::RandC
                } else {
                    State::NoRandC
                };
                self.setup_part_c()
            } else {
                self.setup_part_a()
            }
        }
    }

    /// Emit the RLE tail one byte per call, then resume the walk.
    fn setup_part_c(&mut self) -> Result<()> {
        if self.cursor.j2 < u32::from(self.cursor.z) {
            self.current_char = self.cursor.ch;
            self.block_crc.update_byte(self.cursor.ch);
            self.cursor.j2 += 1;
            Ok(())
        } else {
            self.cursor.i2 += 1;
            self.cursor.count = 0;
            self.setup_part_a()
        }
    }
}

/// Continuous byte-stream adapter: block boundaries are crossed silently
/// and end of stream maps to `Ok(0)`. By-block callers that need boundary
/// events should use [`BzDecoder::read_into`] directly.
impl<R: Read> Read for BzDecoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            match self.read_into(buf) {
                Ok(ReadStatus::Data(n)) => return Ok(n),
                Ok(ReadStatus::EndOfBlock) => continue,
                Ok(ReadStatus::EndOfStream) => return Ok(0),
                Err(e) => return Err(e.into()),
            }
        }
    }
}
