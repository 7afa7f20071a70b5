//! Canonical Huffman decode tables.
//!
//! A BZip2 block carries only the per-symbol code *lengths* for each of its
//! Huffman tables; the codes themselves are canonical: codes of equal
//! length are numerically consecutive in symbol order, and the first code
//! of each length is the previous length's first-plus-count shifted left by
//! one. Decoding therefore needs just three arrays indexed by code length:
//! the largest code value (`limit`), a subtraction bias into the symbol
//! permutation (`base`), and the permutation itself (`perm`) listing
//! symbols by (length, symbol) order.
//!
//! A symbol is decoded by reading `min_len` bits and widening one bit at a
//! time until the accumulated value no longer exceeds `limit` for its
//! width. This keeps the per-table footprint at `O(alpha_size + max_len)`
//! instead of a `2^max_len` flat lookup.

use crate::{MAX_ALPHA_SIZE, MAX_CODE_LEN};
use bzsplit_core::bitstream::BitReader;
use bzsplit_core::error::{BzError, Result};
use log::trace;
use std::io::Read;

/// A canonical Huffman decode table for one selector group.
#[derive(Debug, Clone)]
pub struct DecodeTable {
    /// Largest code value at each length; `-1` where the length is unused.
    limit: [i32; MAX_CODE_LEN + 1],
    /// `first_code[len] - perm_index_of_first_symbol[len]`.
    base: [i32; MAX_CODE_LEN + 1],
    /// Symbols ordered by (code length, symbol value).
    perm: [u16; MAX_ALPHA_SIZE],
    /// Shortest code length present.
    min_len: u32,
    /// Longest code length present.
    max_len: u32,
    /// Number of symbols in the alphabet.
    alpha_size: usize,
}

impl DecodeTable {
    /// Build a decode table from per-symbol code lengths.
    ///
    /// Fails with [`BzError::TableMalformed`] if a length is outside
    /// `1..=MAX_CODE_LEN` or the lengths do not describe a canonical code
    /// (more codes of some length than that length can hold).
    pub fn build(lengths: &[u8]) -> Result<Self> {
        if lengths.is_empty() || lengths.len() > MAX_ALPHA_SIZE {
            return Err(BzError::table_malformed(format!(
                "alphabet of {} symbols",
                lengths.len()
            )));
        }

        let mut min_len = MAX_CODE_LEN as u32;
        let mut max_len = 0u32;
        for &len in lengths {
            if len == 0 || len as usize > MAX_CODE_LEN {
                return Err(BzError::table_malformed(format!("code length {len}")));
            }
            min_len = min_len.min(u32::from(len));
            max_len = max_len.max(u32::from(len));
        }

        let mut count = [0i32; MAX_CODE_LEN + 1];
        for &len in lengths {
            count[len as usize] += 1;
        }

        let mut perm = [0u16; MAX_ALPHA_SIZE];
        let mut pp = 0usize;
        for len in min_len..=max_len {
            for (sym, &l) in lengths.iter().enumerate() {
                if u32::from(l) == len {
                    perm[pp] = sym as u16;
                    pp += 1;
                }
            }
        }

        let mut limit = [-1i32; MAX_CODE_LEN + 1];
        let mut base = [0i32; MAX_CODE_LEN + 1];
        let mut first = 0i32;
        let mut perm_index = 0i32;
        for len in min_len as usize..=max_len as usize {
            if first + count[len] > (1i32 << len) {
                return Err(BzError::table_malformed(format!(
                    "{} codes of length {len} overflow the code space",
                    count[len]
                )));
            }
            limit[len] = first + count[len] - 1;
            base[len] = first - perm_index;
            perm_index += count[len];
            first = (first + count[len]) << 1;
        }

        trace!(
            "huffman table: {} symbols, lengths {}..{}",
            lengths.len(),
            min_len,
            max_len
        );

        Ok(Self {
            limit,
            base,
            perm,
            min_len,
            max_len,
            alpha_size: lengths.len(),
        })
    }

    /// Decode one symbol from the bit stream.
    #[inline]
    pub fn decode_symbol<R: Read>(&self, reader: &mut BitReader<R>) -> Result<u16> {
        let mut zn = self.min_len as usize;
        let mut zvec = reader.read_bits(self.min_len)? as i32;

        while zvec > self.limit[zn] {
            zn += 1;
            if zn > self.max_len as usize {
                return Err(BzError::stream_corrupted("no matching huffman code"));
            }
            zvec = (zvec << 1) | i32::from(reader.read_bit()?);
        }

        let index = zvec - self.base[zn];
        if index < 0 || index as usize >= self.alpha_size {
            return Err(BzError::stream_corrupted("huffman code out of range"));
        }
        Ok(self.perm[index as usize])
    }

    /// Shortest code length in the table.
    pub fn min_len(&self) -> u32 {
        self.min_len
    }

    /// Longest code length in the table.
    pub fn max_len(&self) -> u32 {
        self.max_len
    }
}
