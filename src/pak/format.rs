use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::io::{Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};

use super::{BLOCK_SIZE, FORMAT_VERSION, MAGIC};
use crate::error::{Error, Result};
use crate::guid::ObjectGuid;

pub const HEADER_SIZE: usize = 64;

fn corrupt(message: impl Into<String>) -> Error {
    Error::CorruptPackage(message.into())
}

fn read_failed(err: std::io::Error, what: &str) -> Error {
    match Error::from_read(err, what) {
        Error::TruncatedStream(what) => corrupt(format!("package ends inside the {what}")),
        other => other,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TocKind {
    Ordinal,
    Hashed,
}

impl TocKind {
    fn to_u32(self) -> u32 {
        match self {
            Self::Ordinal => 0,
            Self::Hashed => 1,
        }
    }

    fn from_u32(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ordinal),
            1 => Some(Self::Hashed),
            _ => None,
        }
    }
}

impl fmt::Display for TocKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ordinal => "ordinal",
            Self::Hashed => "hashed",
        })
    }
}

/// Fixed 64-byte package header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PakHeader {
    pub toc_kind: TocKind,
    /// Compatibility tag chosen by the writer, usually a registry schema tag.
    pub session: u32,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub total_size: u64,
    pub crc32: u32,
    pub md5: [u8; 16],
}

impl PakHeader {
    pub fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_all(&MAGIC)?;
        out.write_u32::<LittleEndian>(FORMAT_VERSION)?;
        out.write_u32::<LittleEndian>(self.toc_kind.to_u32())?;
        out.write_u32::<LittleEndian>(self.session)?;
        out.write_i64::<LittleEndian>(self.created.timestamp())?;
        out.write_i64::<LittleEndian>(self.modified.timestamp())?;
        out.write_u64::<LittleEndian>(self.total_size)?;
        out.write_u32::<LittleEndian>(self.crc32)?;
        out.write_all(&self.md5)?;
        out.write_u32::<LittleEndian>(0)?;
        Ok(())
    }

    pub fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let mut raw = [0u8; HEADER_SIZE];
        input
            .read_exact(&mut raw)
            .map_err(|err| read_failed(err, "header"))?;
        let mut cursor = &raw[..];

        let mut magic = [0u8; 4];
        cursor.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(corrupt(format!(
                "invalid magic: expected CPAK, found {magic:?}"
            )));
        }
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != FORMAT_VERSION {
            return Err(corrupt(format!(
                "unsupported format version {version} (expected {FORMAT_VERSION})"
            )));
        }
        let kind = cursor.read_u32::<LittleEndian>()?;
        let toc_kind =
            TocKind::from_u32(kind).ok_or_else(|| corrupt(format!("unknown TOC kind {kind}")))?;
        let session = cursor.read_u32::<LittleEndian>()?;
        let created = timestamp(cursor.read_i64::<LittleEndian>()?)?;
        let modified = timestamp(cursor.read_i64::<LittleEndian>()?)?;
        let total_size = cursor.read_u64::<LittleEndian>()?;
        let crc32 = cursor.read_u32::<LittleEndian>()?;
        let mut md5 = [0u8; 16];
        cursor.read_exact(&mut md5)?;

        Ok(Self {
            toc_kind,
            session,
            created,
            modified,
            total_size,
            crc32,
            md5,
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0).ok_or_else(|| corrupt(format!("bad timestamp {secs}")))
}

/// Location of one payload: a block index and a byte count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PakEntry {
    pub block_offset: u32,
    pub size: u32,
}

impl PakEntry {
    pub const SIZE: usize = 8;

    pub fn byte_offset(&self) -> u64 {
        u64::from(self.block_offset) * BLOCK_SIZE
    }

    pub fn end(&self) -> u64 {
        self.byte_offset() + u64::from(self.size)
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        out.write_u32::<LittleEndian>(self.block_offset)?;
        out.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    fn read_from<R: Read>(input: &mut R) -> Result<Self> {
        let block_offset = input
            .read_u32::<LittleEndian>()
            .map_err(|err| read_failed(err, "table of contents"))?;
        let size = input
            .read_u32::<LittleEndian>()
            .map_err(|err| read_failed(err, "table of contents"))?;
        Ok(Self { block_offset, size })
    }
}

/// Indexing strategy of a package.
///
/// A writer starts from a TOC whose keys are all reserved with placeholder
/// entries; the encoded length depends only on the key count, so the
/// final TOC overwrites the placeholder exactly.
pub trait TableOfContents: Sized {
    type Key: Copy + Eq + Hash + fmt::Debug + fmt::Display;

    const KIND: TocKind;

    /// Encoded bytes per entry, key included.
    const ENTRY_SIZE: usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entry(&self, key: Self::Key) -> Option<PakEntry>;

    /// Replaces the entry of a reserved key.
    fn set(&mut self, key: Self::Key, entry: PakEntry) -> Result<()>;

    /// Entries in wire order.
    fn entries(&self) -> Vec<(Self::Key, PakEntry)>;

    fn encoded_len(&self) -> usize {
        4 + self.len() * Self::ENTRY_SIZE
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<()>;

    /// Reads a TOC, refusing counts above `max_entries`.
    fn read_from<R: Read>(input: &mut R, max_entries: usize) -> Result<Self>;
}

fn read_count<R: Read>(input: &mut R, max_entries: usize) -> Result<usize> {
    let count = input
        .read_u32::<LittleEndian>()
        .map_err(|err| read_failed(err, "table of contents"))? as usize;
    if count > max_entries {
        return Err(corrupt(format!(
            "TOC claims {count} entries, file holds at most {max_entries}"
        )));
    }
    Ok(count)
}

fn write_count<W: Write>(out: &mut W, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| Error::InvalidValue(format!("{count} entries exceed the TOC limit")))?;
    out.write_u32::<LittleEndian>(count)?;
    Ok(())
}

/// Dense TOC addressed by ordinal, for packages built from a known list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrdinalToc {
    entries: Vec<PakEntry>,
}

impl OrdinalToc {
    /// Reserves ordinals `0..count`.
    pub fn with_len(count: usize) -> Self {
        Self {
            entries: vec![PakEntry::default(); count],
        }
    }
}

impl TableOfContents for OrdinalToc {
    type Key = u32;

    const KIND: TocKind = TocKind::Ordinal;
    const ENTRY_SIZE: usize = PakEntry::SIZE;

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, key: u32) -> Option<PakEntry> {
        self.entries.get(key as usize).copied()
    }

    fn set(&mut self, key: u32, entry: PakEntry) -> Result<()> {
        let slot = self
            .entries
            .get_mut(key as usize)
            .ok_or_else(|| Error::EntryNotFound(format!("ordinal {key}")))?;
        *slot = entry;
        Ok(())
    }

    fn entries(&self) -> Vec<(u32, PakEntry)> {
        (0u32..).zip(self.entries.iter().copied()).collect()
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        write_count(out, self.entries.len())?;
        for entry in &self.entries {
            entry.write_to(out)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(input: &mut R, max_entries: usize) -> Result<Self> {
        let count = read_count(input, max_entries)?;
        let entries = (0..count)
            .map(|_| PakEntry::read_from(input))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { entries })
    }
}

/// TOC keyed by object GUID, for packages whose contents are discovered
/// at build time. Written sorted by GUID.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HashedToc {
    entries: HashMap<ObjectGuid, PakEntry>,
}

impl HashedToc {
    /// Reserves every GUID in `keys`; duplicates and the null GUID are
    /// rejected.
    pub fn with_keys<I: IntoIterator<Item = ObjectGuid>>(keys: I) -> Result<Self> {
        let mut entries = HashMap::new();
        for key in keys {
            if key.is_null() {
                return Err(Error::InvalidValue("null GUID cannot key a package entry".into()));
            }
            if entries.insert(key, PakEntry::default()).is_some() {
                return Err(Error::InvalidValue(format!("GUID {key} reserved twice")));
            }
        }
        Ok(Self { entries })
    }
}

impl TableOfContents for HashedToc {
    type Key = ObjectGuid;

    const KIND: TocKind = TocKind::Hashed;
    const ENTRY_SIZE: usize = 8 + PakEntry::SIZE;

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn entry(&self, key: ObjectGuid) -> Option<PakEntry> {
        self.entries.get(&key).copied()
    }

    fn set(&mut self, key: ObjectGuid, entry: PakEntry) -> Result<()> {
        let slot = self
            .entries
            .get_mut(&key)
            .ok_or_else(|| Error::EntryNotFound(format!("GUID {key}")))?;
        *slot = entry;
        Ok(())
    }

    fn entries(&self) -> Vec<(ObjectGuid, PakEntry)> {
        let mut entries: Vec<_> = self.entries.iter().map(|(k, v)| (*k, *v)).collect();
        entries.sort_by_key(|(key, _)| *key);
        entries
    }

    fn write_to<W: Write>(&self, out: &mut W) -> Result<()> {
        write_count(out, self.entries.len())?;
        for (key, entry) in self.entries() {
            out.write_u64::<LittleEndian>(key.0)?;
            entry.write_to(out)?;
        }
        Ok(())
    }

    fn read_from<R: Read>(input: &mut R, max_entries: usize) -> Result<Self> {
        let count = read_count(input, max_entries)?;
        let mut entries = HashMap::with_capacity(count);
        for _ in 0..count {
            let key = ObjectGuid(
                input
                    .read_u64::<LittleEndian>()
                    .map_err(|err| read_failed(err, "table of contents"))?,
            );
            let entry = PakEntry::read_from(input)?;
            if key.is_null() || entries.insert(key, entry).is_some() {
                return Err(corrupt(format!("invalid or repeated TOC key {key}")));
            }
        }
        Ok(Self { entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> PakHeader {
        let created = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        PakHeader {
            toc_kind: TocKind::Hashed,
            session: 0xfeed_beef,
            created,
            modified: created,
            total_size: 8192,
            crc32: 0x1234_5678,
            md5: [7; 16],
        }
    }

    #[test]
    fn header_is_64_bytes_and_reads_back() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(&bytes[..4], b"CPAK");
        assert_eq!(PakHeader::read_from(&mut bytes.as_slice()).unwrap(), header());
    }

    #[test]
    fn header_rejects_bad_magic_and_version() {
        let mut bytes = Vec::new();
        header().write_to(&mut bytes).unwrap();
        let mut bad_magic = bytes.clone();
        bad_magic[0] = b'X';
        assert!(matches!(
            PakHeader::read_from(&mut bad_magic.as_slice()),
            Err(Error::CorruptPackage(_))
        ));
        bytes[4] = 9;
        assert!(matches!(
            PakHeader::read_from(&mut bytes.as_slice()),
            Err(Error::CorruptPackage(_))
        ));
        assert!(matches!(
            PakHeader::read_from(&mut &bytes[..10]),
            Err(Error::CorruptPackage(_))
        ));
    }

    #[test]
    fn hashed_toc_is_written_sorted() {
        let mut toc = HashedToc::with_keys([ObjectGuid(9), ObjectGuid(3)]).unwrap();
        toc.set(
            ObjectGuid(9),
            PakEntry {
                block_offset: 2,
                size: 10,
            },
        )
        .unwrap();
        let mut bytes = Vec::new();
        toc.write_to(&mut bytes).unwrap();
        assert_eq!(bytes.len(), toc.encoded_len());
        assert_eq!(&bytes[4..12], &3u64.to_le_bytes());

        let read = HashedToc::read_from(&mut bytes.as_slice(), 2).unwrap();
        assert_eq!(read, toc);
        assert!(HashedToc::read_from(&mut bytes.as_slice(), 1).is_err());
    }

    #[test]
    fn unreserved_keys_are_not_found() {
        let mut ordinal = OrdinalToc::with_len(2);
        assert!(matches!(
            ordinal.set(2, PakEntry::default()),
            Err(Error::EntryNotFound(_))
        ));
        let mut hashed = HashedToc::with_keys([ObjectGuid(1)]).unwrap();
        assert!(matches!(
            hashed.set(ObjectGuid(2), PakEntry::default()),
            Err(Error::EntryNotFound(_))
        ));
        assert!(HashedToc::with_keys([ObjectGuid(1), ObjectGuid(1)]).is_err());
    }
}
