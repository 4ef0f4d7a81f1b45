//! Block-aligned package container.
//!
//! ```text
//! +-----------------------------------------------------------+
//! | Header (64 bytes)                                         |
//! |  magic "CPAK" | version | toc kind | session | created    |
//! |  modified | total size | crc32 | md5 | reserved           |
//! +-----------------------------------------------------------+
//! | TOC: u32 count + entries                                  |
//! |  ordinal: { block offset u32, size u32 }                  |
//! |  hashed:  object GUID u64 + { block offset u32, size u32 } |
//! +-----------------------------------------------------------+
//! | zero padding to 2048                                      |
//! | entry payload, zero padding to 2048, next payload, ...    |
//! +-----------------------------------------------------------+
//! ```
//!
//! All integers are little-endian. Block offsets count 2048-byte blocks
//! from the start of the file. The checksums cover every byte after the
//! padded header and TOC.

mod format;
mod reader;
mod writer;

pub use format::{HashedToc, OrdinalToc, PakEntry, PakHeader, TableOfContents, TocKind, HEADER_SIZE};
pub use reader::{read_header, HashedPak, OrdinalPak, PakFile};
pub use writer::PakWriter;

pub const BLOCK_SIZE: u64 = 2048;

pub const MAGIC: [u8; 4] = *b"CPAK";

pub const FORMAT_VERSION: u32 = 1;

/// Rounds `offset` up to the next multiple of [`BLOCK_SIZE`].
pub fn align_to_block(offset: u64) -> u64 {
    (offset + BLOCK_SIZE - 1) & !(BLOCK_SIZE - 1)
}

/// First payload byte for a TOC of `toc_len` encoded bytes.
pub(crate) fn data_start(toc_len: usize) -> u64 {
    align_to_block((HEADER_SIZE + toc_len) as u64)
}
