use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, warn};
use md5::{Digest, Md5};

use super::format::{HashedToc, OrdinalToc, PakEntry, PakHeader, TableOfContents, HEADER_SIZE};
use super::data_start;
use crate::content::{copy_range, AssetSource, FileHandle, HandleTable};
use crate::error::{Error, Result};

/// Package indexed by ordinal.
pub type OrdinalPak = PakFile<OrdinalToc>;

/// Package indexed by object GUID.
pub type HashedPak = PakFile<HashedToc>;

/// Reads only the header of the package at `path`, e.g. to pick the TOC kind.
pub fn read_header<P: AsRef<Path>>(path: P) -> Result<PakHeader> {
    let mut file = File::open(path.as_ref())?;
    PakHeader::read_from(&mut file)
}

#[derive(Debug)]
enum PakBacking {
    File { path: PathBuf, file: File },
    Memory { label: String, data: Arc<[u8]> },
}

impl PakBacking {
    fn label(&self) -> String {
        match self {
            Self::File { path, .. } => path.display().to_string(),
            Self::Memory { label, .. } => label.clone(),
        }
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            Self::File { file, .. } => {
                file.seek(SeekFrom::Start(offset))?;
                file.read_exact(buf)
                    .map_err(|err| Error::from_read(err, "package entry"))
            }
            Self::Memory { data, .. } => {
                if copy_range(data, offset, buf) < buf.len() {
                    return Err(Error::TruncatedStream("package entry".into()));
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug)]
struct OpenPak<T> {
    backing: PakBacking,
    header: PakHeader,
    toc: T,
    data_start: u64,
}

/// Read side of a package: closed until [`PakFile::open`] succeeds.
///
/// Entries are read through the [`AssetSource`] contract. Closing the
/// package invalidates every handle it issued.
#[derive(Debug)]
pub struct PakFile<T: TableOfContents> {
    open: Option<OpenPak<T>>,
    handles: HandleTable<PakEntry>,
}

impl<T: TableOfContents> Default for PakFile<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TableOfContents> PakFile<T> {
    pub fn new() -> Self {
        Self {
            open: None,
            handles: HandleTable::new(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn open<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        self.open_checked(path.as_ref(), None)
    }

    /// Opens the package only if its session tag equals `expected`.
    pub fn open_with_session<P: AsRef<Path>>(&mut self, path: P, expected: u32) -> Result<()> {
        self.open_checked(path.as_ref(), Some(expected))
    }

    /// Opens a package image already resident in memory.
    pub fn open_bytes(&mut self, label: impl Into<String>, data: Vec<u8>) -> Result<()> {
        self.ensure_closed()?;
        let data: Arc<[u8]> = Arc::from(data.into_boxed_slice());
        let (header, toc, data_start) =
            parse_package::<T, _>(&mut Cursor::new(&data[..]), data.len() as u64)?;
        self.attach(
            PakBacking::Memory {
                label: label.into(),
                data,
            },
            header,
            toc,
            data_start,
            None,
        )
    }

    fn open_checked(&mut self, path: &Path, expected: Option<u32>) -> Result<()> {
        self.ensure_closed()?;
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        let (header, toc, data_start) =
            parse_package::<T, _>(&mut BufReader::new(&file), file_len)?;
        self.attach(
            PakBacking::File {
                path: path.to_path_buf(),
                file,
            },
            header,
            toc,
            data_start,
            expected,
        )
    }

    fn ensure_closed(&self) -> Result<()> {
        if self.open.is_some() {
            return Err(Error::PackageAlreadyOpen);
        }
        Ok(())
    }

    fn attach(
        &mut self,
        backing: PakBacking,
        header: PakHeader,
        toc: T,
        data_start: u64,
        expected: Option<u32>,
    ) -> Result<()> {
        if let Some(expected) = expected {
            if header.session != expected {
                warn!(
                    "{} was built for session {:#010x}, expected {expected:#010x}",
                    backing.label(),
                    header.session
                );
                return Err(Error::IncompatibleSession {
                    expected,
                    found: header.session,
                });
            }
        }
        debug!(
            "opened {} package {} ({} entries, {} bytes)",
            header.toc_kind,
            backing.label(),
            toc.len(),
            header.total_size
        );
        self.handles.reset();
        self.open = Some(OpenPak {
            backing,
            header,
            toc,
            data_start,
        });
        Ok(())
    }

    pub fn close(&mut self) -> Result<()> {
        self.open.take().ok_or(Error::PackageNotOpen)?;
        self.handles.reset();
        Ok(())
    }

    fn state(&self) -> Result<&OpenPak<T>> {
        self.open.as_ref().ok_or(Error::PackageNotOpen)
    }

    pub fn header(&self) -> Result<&PakHeader> {
        Ok(&self.state()?.header)
    }

    pub fn toc(&self) -> Result<&T> {
        Ok(&self.state()?.toc)
    }

    pub fn entry(&self, key: T::Key) -> Result<PakEntry> {
        self.state()?
            .toc
            .entry(key)
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))
    }

    /// Recomputes the payload checksums and compares them with the header.
    pub fn verify(&mut self) -> Result<()> {
        let open = self.open.as_mut().ok_or(Error::PackageNotOpen)?;
        let mut crc = crc32fast::Hasher::new();
        let mut md5 = Md5::new();
        let mut buf = vec![0u8; 64 * 1024];
        let mut offset = open.data_start;
        while offset < open.header.total_size {
            let chunk = (open.header.total_size - offset).min(buf.len() as u64) as usize;
            open.backing.read_at(offset, &mut buf[..chunk])?;
            crc.update(&buf[..chunk]);
            md5.update(&buf[..chunk]);
            offset += chunk as u64;
        }
        if crc.finalize() != open.header.crc32 {
            return Err(Error::CorruptPackage("CRC-32 mismatch".into()));
        }
        let digest: [u8; 16] = md5.finalize().into();
        if digest != open.header.md5 {
            return Err(Error::CorruptPackage("MD5 mismatch".into()));
        }
        Ok(())
    }
}

impl<T: TableOfContents> AssetSource for PakFile<T> {
    type Key = T::Key;

    fn open_file(&mut self, key: T::Key) -> Result<FileHandle> {
        let entry = self.entry(key)?;
        Ok(self.handles.insert(entry))
    }

    fn file_size(&self, handle: FileHandle) -> Result<u64> {
        self.state()?;
        Ok(u64::from(self.handles.get(handle)?.size))
    }

    fn read_file(&mut self, handle: FileHandle, start_offset: u64, buf: &mut [u8]) -> Result<usize> {
        let open = self.open.as_mut().ok_or(Error::PackageNotOpen)?;
        let entry = *self.handles.get(handle)?;
        let size = u64::from(entry.size);
        if start_offset >= size {
            return Ok(0);
        }
        let count = (size - start_offset).min(buf.len() as u64) as usize;
        open.backing
            .read_at(entry.byte_offset() + start_offset, &mut buf[..count])?;
        Ok(count)
    }

    fn close_file(&mut self, handle: FileHandle) -> Result<()> {
        self.state()?;
        self.handles.remove(handle).map(|_| ())
    }
}

fn parse_package<T: TableOfContents, R: Read>(
    input: &mut R,
    file_len: u64,
) -> Result<(PakHeader, T, u64)> {
    if file_len < HEADER_SIZE as u64 {
        return Err(Error::CorruptPackage(format!(
            "package too small to contain a header (len={file_len})"
        )));
    }
    let header = PakHeader::read_from(input)?;
    if header.toc_kind != T::KIND {
        return Err(Error::CorruptPackage(format!(
            "package has a {} TOC, expected {}",
            header.toc_kind,
            T::KIND
        )));
    }
    if header.total_size != file_len {
        return Err(Error::CorruptPackage(format!(
            "header records {} bytes but the file holds {file_len}",
            header.total_size
        )));
    }

    let max_entries = (file_len - HEADER_SIZE as u64) as usize / T::ENTRY_SIZE;
    let toc = T::read_from(input, max_entries)?;
    let data_start = data_start(toc.encoded_len());
    if data_start > file_len {
        return Err(Error::CorruptPackage(
            "table of contents runs past the end of the package".into(),
        ));
    }
    for (key, entry) in toc.entries() {
        if entry.byte_offset() < data_start || entry.end() > file_len {
            return Err(Error::CorruptPackage(format!(
                "entry {key} at block {} ({} bytes) lies outside the payload area",
                entry.block_offset, entry.size
            )));
        }
    }
    Ok((header, toc, data_start))
}
