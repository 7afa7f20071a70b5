//! Per-block parsing: symbol map, selectors, code lengths, and the
//! MTF+RLE symbol stream.
//!
//! A block body (everything after the stored CRC, the randomization bit and
//! the original pointer) consists of a two-level bitmap naming the byte
//! values used in the block, an MTF-coded selector list assigning one of up
//! to six Huffman tables to each run of fifty symbols, delta-coded code
//! lengths per table, and finally the Huffman-coded MTF/RLE symbol stream
//! itself. Decoding that stream produces the run-length-expanded byte array
//! `ll8` and the per-byte frequency table `unzftab` that the inverse BWT
//! walks afterwards.

use crate::huffman::DecodeTable;
use crate::{BASE_BLOCK_SIZE, G_SIZE, MAX_ALPHA_SIZE, MAX_SELECTORS, N_GROUPS, RUN_A, RUN_B};
use bzsplit_core::bitstream::BitReader;
use bzsplit_core::error::{BzError, Result};
use log::trace;
use std::io::Read;

/// Largest value the bijective run-length accumulator step may reach; runs
/// long enough to trip this cannot fit any block.
const MAX_RUN_STEP: usize = 2 * 1024 * 1024;

/// Reusable per-block buffers. Allocated once, on the first block.
pub(crate) struct BlockWorkspace {
    /// Which byte values occur in the current block.
    pub in_use: [bool; 256],
    /// Compact alphabet: index in 0..n_in_use to byte value.
    pub seq_to_unseq: [u8; 256],
    /// Number of byte values in use.
    pub n_in_use: usize,
    /// Huffman table index for each 50-symbol group.
    pub selectors: Vec<u8>,
    /// Decode tables for the current block's groups.
    pub tables: Vec<DecodeTable>,
    /// MTF work vector for the symbol stream.
    yy: [u8; 256],
    /// Frequency of each byte value in `ll8`.
    pub unzftab: [u32; 256],
    /// Cumulative frequencies; scratch for the inverse BWT setup.
    pub cftab: [u32; 257],
    /// Run-length-expanded block bytes (BWT order).
    pub ll8: Vec<u8>,
    /// Inverse BWT transition table; grown lazily to the largest block seen.
    pub tt: Vec<u32>,
}

impl BlockWorkspace {
    /// Allocate buffers for blocks of `block_size100k * 100_000` bytes.
    pub fn new(block_size100k: usize) -> Self {
        Self {
            in_use: [false; 256],
            seq_to_unseq: [0; 256],
            n_in_use: 0,
            selectors: Vec::with_capacity(MAX_SELECTORS.min(512)),
            tables: Vec::with_capacity(N_GROUPS),
            yy: [0; 256],
            unzftab: [0; 256],
            cftab: [0; 257],
            ll8: vec![0; block_size100k * BASE_BLOCK_SIZE],
            tt: Vec::new(),
        }
    }
}

/// Tracks which Huffman table the next symbol uses, advancing through the
/// selector list every `G_SIZE` symbols.
struct GroupCursor {
    consumed: usize,
    remaining: usize,
    current: usize,
}

impl GroupCursor {
    fn new() -> Self {
        Self {
            consumed: 0,
            remaining: 0,
            current: 0,
        }
    }

    #[inline]
    fn select<'t>(&mut self, selectors: &[u8], tables: &'t [DecodeTable]) -> Result<&'t DecodeTable> {
        if self.remaining == 0 {
            let Some(&sel) = selectors.get(self.consumed) else {
                return Err(BzError::stream_corrupted("selector list exhausted"));
            };
            self.consumed += 1;
            self.remaining = G_SIZE;
            self.current = sel as usize;
        }
        self.remaining -= 1;
        Ok(&tables[self.current])
    }
}

/// Read the symbol-mapping bitmap and build the compact alphabet.
fn read_symbol_map<R: Read>(reader: &mut BitReader<R>, ws: &mut BlockWorkspace) -> Result<()> {
    let in_use16 = reader.read_bits(16)? as u32;

    ws.in_use = [false; 256];
    for i in 0..16 {
        if in_use16 & (0x8000 >> i) != 0 {
            let bits = reader.read_bits(16)? as u32;
            for j in 0..16 {
                if bits & (0x8000 >> j) != 0 {
                    ws.in_use[i * 16 + j] = true;
                }
            }
        }
    }

    ws.n_in_use = 0;
    for (value, &used) in ws.in_use.iter().enumerate() {
        if used {
            ws.seq_to_unseq[ws.n_in_use] = value as u8;
            ws.n_in_use += 1;
        }
    }

    if ws.n_in_use == 0 {
        return Err(BzError::table_malformed("empty symbol map"));
    }
    Ok(())
}

/// Read the selector list: unary-coded MTF positions over the group list.
fn read_selectors<R: Read>(
    reader: &mut BitReader<R>,
    ws: &mut BlockWorkspace,
    n_groups: usize,
) -> Result<()> {
    let n_selectors = reader.read_bits(15)? as usize;
    if !(1..=MAX_SELECTORS).contains(&n_selectors) {
        return Err(BzError::table_malformed(format!(
            "{n_selectors} selectors"
        )));
    }

    let mut pos = [0u8; N_GROUPS];
    for (v, slot) in pos.iter_mut().enumerate().take(n_groups) {
        *slot = v as u8;
    }

    ws.selectors.clear();
    for _ in 0..n_selectors {
        let mut v = 0usize;
        while reader.read_bit()? {
            v += 1;
            if v >= n_groups {
                return Err(BzError::table_malformed("selector out of range"));
            }
        }
        let tmp = pos[v];
        pos.copy_within(0..v, 1);
        pos[0] = tmp;
        ws.selectors.push(tmp);
    }
    Ok(())
}

/// Read the delta-coded code lengths for one group.
fn read_code_lengths<R: Read>(
    reader: &mut BitReader<R>,
    lengths: &mut [u8],
) -> Result<()> {
    let mut curr = reader.read_bits(5)? as i32;
    for slot in lengths.iter_mut() {
        loop {
            if !(1..=20).contains(&curr) {
                return Err(BzError::table_malformed(format!("code length {curr}")));
            }
            if !reader.read_bit()? {
                break;
            }
            curr += if reader.read_bit()? { -1 } else { 1 };
        }
        *slot = curr as u8;
    }
    Ok(())
}

/// Decode a block body (symbol map onwards) into `ws.ll8` / `ws.unzftab`.
///
/// Returns the number of bytes in the block (`last + 1`).
pub(crate) fn decode_block_body<R: Read>(
    reader: &mut BitReader<R>,
    ws: &mut BlockWorkspace,
) -> Result<usize> {
    read_symbol_map(reader, ws)?;
    let alpha_size = ws.n_in_use + 2;

    let n_groups = reader.read_bits(3)? as usize;
    if !(2..=N_GROUPS).contains(&n_groups) {
        return Err(BzError::table_malformed(format!(
            "{n_groups} huffman tables"
        )));
    }

    read_selectors(reader, ws, n_groups)?;

    let mut lengths = [[0u8; MAX_ALPHA_SIZE]; N_GROUPS];
    for group in lengths.iter_mut().take(n_groups) {
        read_code_lengths(reader, &mut group[..alpha_size])?;
    }

    ws.tables.clear();
    for group in lengths.iter().take(n_groups) {
        ws.tables.push(DecodeTable::build(&group[..alpha_size])?);
    }

    trace!(
        "block tables: {} groups, {} selectors, {} symbols in use",
        n_groups,
        ws.selectors.len(),
        ws.n_in_use
    );

    decode_symbol_stream(reader, ws, alpha_size)
}

/// The MTF+RLE hot loop: Huffman symbols to run-length-expanded bytes.
fn decode_symbol_stream<R: Read>(
    reader: &mut BitReader<R>,
    ws: &mut BlockWorkspace,
    alpha_size: usize,
) -> Result<usize> {
    let BlockWorkspace {
        ref seq_to_unseq,
        ref selectors,
        ref tables,
        ref mut yy,
        ref mut unzftab,
        ref mut ll8,
        ..
    } = *ws;

    for (i, slot) in yy.iter_mut().enumerate() {
        *slot = i as u8;
    }
    unzftab.fill(0);

    let eob = (alpha_size - 1) as u16;
    let capacity = ll8.len();
    let mut group = GroupCursor::new();
    let mut len = 0usize;

    let mut next_sym = group.select(selectors, tables)?.decode_symbol(reader)?;

    while next_sym != eob {
        if next_sym == RUN_A || next_sym == RUN_B {
            // Bijective base-2 run length: consecutive run symbols k = 0,1,..
            // contribute 2^k (RUN_A) or 2 * 2^k (RUN_B).
            let mut s = 0usize;
            let mut n = 1usize;
            loop {
                match next_sym {
                    RUN_A => s += n,
                    RUN_B => s += n << 1,
                    _ => break,
                }
                if n >= MAX_RUN_STEP {
                    return Err(BzError::stream_corrupted("run length out of range"));
                }
                n <<= 1;
                next_sym = group.select(selectors, tables)?.decode_symbol(reader)?;
            }

            let run = s;
            if len + run > capacity {
                return Err(BzError::block_overrun(capacity));
            }
            let ch = seq_to_unseq[yy[0] as usize];
            unzftab[ch as usize] += run as u32;
            ll8[len..len + run].fill(ch);
            len += run;
        } else {
            if len >= capacity {
                return Err(BzError::block_overrun(capacity));
            }
            let j = next_sym as usize - 1;
            let tmp = yy[j];
            let ch = seq_to_unseq[tmp as usize];
            unzftab[ch as usize] += 1;
            ll8[len] = ch;
            len += 1;

            // This shift is hammered during decompression; the scalar loop
            // beats a block move for the short distances that dominate.
            if j <= 16 {
                let mut k = j;
                while k > 0 {
                    yy[k] = yy[k - 1];
                    k -= 1;
                }
            } else {
                yy.copy_within(0..j, 1);
            }
            yy[0] = tmp;

            next_sym = group.select(selectors, tables)?.decode_symbol(reader)?;
        }
    }

    Ok(len)
}
