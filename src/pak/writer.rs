use std::collections::HashSet;
use std::io::{Seek, SeekFrom, Write};

use chrono::{DateTime, Utc};
use log::debug;
use md5::{Digest, Md5};

use super::format::{PakEntry, PakHeader, TableOfContents, HEADER_SIZE};
use super::{align_to_block, data_start, BLOCK_SIZE};
use crate::error::{Error, Result};

const ZEROS: [u8; BLOCK_SIZE as usize] = [0; BLOCK_SIZE as usize];

/// Streams payloads into a package.
///
/// The header and TOC area is reserved up front and rewritten in place by
/// [`PakWriter::finish`]. Every reserved key must be written exactly once.
pub struct PakWriter<W: Write + Seek, T: TableOfContents> {
    out: W,
    toc: T,
    session: u32,
    created: DateTime<Utc>,
    reserved: u64,
    position: u64,
    written: HashSet<T::Key>,
    crc: crc32fast::Hasher,
    md5: Md5,
}

impl<W: Write + Seek, T: TableOfContents> PakWriter<W, T> {
    pub fn new(mut out: W, toc: T, session: u32) -> Result<Self> {
        let reserved = data_start(toc.encoded_len());
        out.seek(SeekFrom::Start(0))?;
        write_zeros(&mut out, reserved)?;
        Ok(Self {
            out,
            toc,
            session,
            created: Utc::now(),
            reserved,
            position: reserved,
            written: HashSet::new(),
            crc: crc32fast::Hasher::new(),
            md5: Md5::new(),
        })
    }

    pub fn toc(&self) -> &T {
        &self.toc
    }

    /// Appends `bytes` at the next block boundary and records it under `key`.
    pub fn write_entry(&mut self, key: T::Key, bytes: &[u8]) -> Result<PakEntry> {
        if self.toc.entry(key).is_none() {
            return Err(Error::EntryNotFound(key.to_string()));
        }
        if self.written.contains(&key) {
            return Err(Error::InvalidValue(format!("entry {key} written twice")));
        }

        let start = align_to_block(self.position);
        self.pad(start - self.position)?;
        let entry = PakEntry {
            block_offset: u32::try_from(start / BLOCK_SIZE).map_err(|_| {
                Error::InvalidValue("package exceeds the addressable block range".into())
            })?,
            size: u32::try_from(bytes.len())
                .map_err(|_| Error::InvalidValue(format!("entry {key} exceeds 4 GiB")))?,
        };
        self.emit(bytes)?;
        self.toc.set(key, entry)?;
        self.written.insert(key);
        Ok(entry)
    }

    /// Pads the payload to a whole block, rewrites the header and TOC, and
    /// returns the sink with the final header.
    pub fn finish(mut self) -> Result<(W, PakHeader)> {
        let missing = self.toc.len() - self.written.len();
        if missing > 0 {
            return Err(Error::EntryNotFound(format!(
                "{missing} reserved entries were never written"
            )));
        }
        self.pad(align_to_block(self.position) - self.position)?;

        let header = PakHeader {
            toc_kind: T::KIND,
            session: self.session,
            created: self.created,
            modified: Utc::now(),
            total_size: self.position,
            crc32: self.crc.finalize(),
            md5: self.md5.finalize().into(),
        };

        self.out.seek(SeekFrom::Start(0))?;
        header.write_to(&mut self.out)?;
        self.toc.write_to(&mut self.out)?;
        let end = self.out.stream_position()?;
        if end != (HEADER_SIZE + self.toc.encoded_len()) as u64 || end > self.reserved {
            return Err(Error::InvalidValue(format!(
                "table of contents overran its reserved {} bytes",
                self.reserved
            )));
        }
        self.out.seek(SeekFrom::Start(header.total_size))?;
        self.out.flush()?;

        debug!(
            "wrote {} package: {} entries, {} bytes",
            header.toc_kind,
            self.toc.len(),
            header.total_size
        );
        Ok((self.out, header))
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.crc.update(bytes);
        self.md5.update(bytes);
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn pad(&mut self, mut count: u64) -> Result<()> {
        while count > 0 {
            let chunk = count.min(BLOCK_SIZE) as usize;
            self.emit(&ZEROS[..chunk])?;
            count -= chunk as u64;
        }
        Ok(())
    }
}

fn write_zeros<W: Write>(out: &mut W, mut count: u64) -> Result<()> {
    while count > 0 {
        let chunk = count.min(BLOCK_SIZE) as usize;
        out.write_all(&ZEROS[..chunk])?;
        count -= chunk as u64;
    }
    Ok(())
}
