//! Error types for BZip2 decoding.
//!
//! A single error enum covers every way a compressed stream can fail to
//! decode: I/O problems on the underlying source, truncation, malformed
//! headers and coding tables, block overruns, corruption detected during
//! the inverse transform, and checksum mismatches. Every error is fatal
//! to the decoder instance that raised it.

use std::io;
use thiserror::Error;

/// The error type for BZip2 decoding operations.
#[derive(Debug, Error)]
pub enum BzError {
    /// I/O error from the underlying byte source.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The source ran out of bytes in the middle of a bit-level field.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    /// The stream header (`h` plus a block-size digit) is missing or invalid.
    #[error("bad stream header: {message}")]
    BadStreamHeader {
        /// Description of what was wrong with the header.
        message: String,
    },

    /// The six bytes at a block boundary are neither the block-start nor
    /// the end-of-stream delimiter.
    #[error("bad block header: found {found:#014x}")]
    BadBlockHeader {
        /// The 48-bit value actually read.
        found: u64,
    },

    /// The Huffman coding tables or their framing are malformed.
    #[error("malformed coding tables: {message}")]
    TableMalformed {
        /// Description of the inconsistency.
        message: String,
    },

    /// The MTF/RLE symbol stream decodes to more bytes than the block size allows.
    #[error("block overrun: decoded data exceeds {limit} bytes")]
    BlockOverrun {
        /// The block capacity that was exceeded.
        limit: usize,
    },

    /// The block data is internally inconsistent.
    #[error("stream corrupted: {message}")]
    StreamCorrupted {
        /// Description of the corruption.
        message: String,
    },

    /// A block or combined checksum does not match the stored value.
    #[error("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    CrcMismatch {
        /// Checksum stored in the stream.
        stored: u32,
        /// Checksum computed over the decoded data.
        computed: u32,
    },

    /// The caller passed an invalid argument or used a closed decoder.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the misuse.
        message: String,
    },
}

/// Result type alias for BZip2 decoding operations.
pub type Result<T> = std::result::Result<T, BzError>;

impl BzError {
    /// Create a bad stream header error.
    pub fn bad_stream_header(message: impl Into<String>) -> Self {
        Self::BadStreamHeader {
            message: message.into(),
        }
    }

    /// Create a bad block header error from the 48-bit token that was read.
    pub fn bad_block_header(found: u64) -> Self {
        Self::BadBlockHeader { found }
    }

    /// Create a malformed table error.
    pub fn table_malformed(message: impl Into<String>) -> Self {
        Self::TableMalformed {
            message: message.into(),
        }
    }

    /// Create a block overrun error.
    pub fn block_overrun(limit: usize) -> Self {
        Self::BlockOverrun { limit }
    }

    /// Create a stream corruption error.
    pub fn stream_corrupted(message: impl Into<String>) -> Self {
        Self::StreamCorrupted {
            message: message.into(),
        }
    }

    /// Create a CRC mismatch error.
    pub fn crc_mismatch(stored: u32, computed: u32) -> Self {
        Self::CrcMismatch { stored, computed }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }
}

impl From<BzError> for io::Error {
    fn from(err: BzError) -> Self {
        match err {
            BzError::Io(e) => e,
            BzError::UnexpectedEndOfStream => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err.to_string())
            }
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}
