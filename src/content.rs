//! Content databases and the shared read contract for asset bytes.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::RwLock;

use crate::error::{Error, Result};
use crate::guid::{normalize_path, ObjectGuid};

/// Maps asset paths to GUIDs and back.
pub trait ContentDatabase {
    fn path_to_guid(&self, path: &str) -> Option<ObjectGuid>;

    fn guid_to_path(&self, guid: ObjectGuid) -> Option<String>;

    /// Kind tag of a known asset, when the database tracks kinds.
    fn asset_kind(&self, _guid: ObjectGuid) -> Option<String> {
        None
    }

    /// Asset substituted for a null reference of `kind`.
    fn default_asset(&self, _kind: &str) -> Option<ObjectGuid> {
        None
    }
}

/// Opaque handle to an open file of an [`AssetSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle {
    source: u32,
    slot: u32,
}

/// Read contract shared by packages and content databases.
pub trait AssetSource {
    type Key: Copy + fmt::Debug;

    fn open_file(&mut self, key: Self::Key) -> Result<FileHandle>;

    fn file_size(&self, handle: FileHandle) -> Result<u64>;

    /// Copies up to `buf.len()` bytes starting at `start_offset` and returns
    /// the number copied; 0 once `start_offset` reaches the end.
    fn read_file(&mut self, handle: FileHandle, start_offset: u64, buf: &mut [u8])
        -> Result<usize>;

    fn close_file(&mut self, handle: FileHandle) -> Result<()>;

    /// Reads a whole file in one call.
    fn read_to_vec(&mut self, key: Self::Key) -> Result<Vec<u8>> {
        let handle = self.open_file(key)?;
        let result = read_whole(self, handle);
        self.close_file(handle)?;
        result
    }
}

fn read_whole<S: AssetSource + ?Sized>(source: &mut S, handle: FileHandle) -> Result<Vec<u8>> {
    let size = usize::try_from(source.file_size(handle)?)
        .map_err(|_| Error::InvalidValue("file too large for memory".into()))?;
    let mut data = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let read = source.read_file(handle, filled as u64, &mut data[filled..])?;
        if read == 0 {
            return Err(Error::TruncatedStream(format!(
                "file ended after {filled} of {size} bytes"
            )));
        }
        filled += read;
    }
    Ok(data)
}

static NEXT_SOURCE: AtomicU32 = AtomicU32::new(1);

/// Issues a process-unique source id.
fn next_source_id() -> u32 {
    NEXT_SOURCE.fetch_add(1, Ordering::Relaxed)
}

/// Open-file bookkeeping for an [`AssetSource`]. Handles carry the table's
/// source id, so a handle presented to another source, or to this one after
/// [`HandleTable::reset`], is rejected.
#[derive(Debug)]
pub struct HandleTable<T> {
    source: u32,
    next_slot: u32,
    open: HashMap<u32, T>,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            source: next_source_id(),
            next_slot: 0,
            open: HashMap::new(),
        }
    }

    pub fn insert(&mut self, value: T) -> FileHandle {
        let slot = self.next_slot;
        self.next_slot = self.next_slot.wrapping_add(1);
        self.open.insert(slot, value);
        FileHandle {
            source: self.source,
            slot,
        }
    }

    pub fn get(&self, handle: FileHandle) -> Result<&T> {
        if handle.source != self.source {
            return Err(Error::InvalidHandle);
        }
        self.open.get(&handle.slot).ok_or(Error::InvalidHandle)
    }

    pub fn get_mut(&mut self, handle: FileHandle) -> Result<&mut T> {
        if handle.source != self.source {
            return Err(Error::InvalidHandle);
        }
        self.open.get_mut(&handle.slot).ok_or(Error::InvalidHandle)
    }

    pub fn remove(&mut self, handle: FileHandle) -> Result<T> {
        if handle.source != self.source {
            return Err(Error::InvalidHandle);
        }
        self.open.remove(&handle.slot).ok_or(Error::InvalidHandle)
    }

    /// Drops every open handle and takes a fresh source id.
    pub fn reset(&mut self) {
        self.open.clear();
        self.next_slot = 0;
        self.source = next_source_id();
    }

    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

/// Copies the window `[start, start + buf.len())` of `data` into `buf`.
pub(crate) fn copy_range(data: &[u8], start: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(start) else {
        return 0;
    };
    if start >= data.len() {
        return 0;
    }
    let count = buf.len().min(data.len() - start);
    buf[..count].copy_from_slice(&data[start..start + count]);
    count
}

/// An asset held by a [`MemoryContentDatabase`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryAsset {
    pub guid: ObjectGuid,
    pub path: String,
    pub kind: String,
    pub data: Arc<[u8]>,
}

#[derive(Debug, Default)]
struct MemoryAssets {
    assets: Vec<MemoryAsset>,
    by_guid: HashMap<ObjectGuid, usize>,
    defaults: HashMap<String, ObjectGuid>,
}

impl MemoryAssets {
    fn get(&self, guid: ObjectGuid) -> Option<&MemoryAsset> {
        self.by_guid.get(&guid).map(|&index| &self.assets[index])
    }
}

/// Thread-safe in-memory content database. Clones share the stored assets
/// but keep their own open-file handles.
#[derive(Debug, Default)]
pub struct MemoryContentDatabase {
    assets: Arc<RwLock<MemoryAssets>>,
    handles: HandleTable<Arc<[u8]>>,
}

impl Clone for MemoryContentDatabase {
    fn clone(&self) -> Self {
        Self {
            assets: Arc::clone(&self.assets),
            handles: HandleTable::new(),
        }
    }
}

impl MemoryContentDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `data` under `path`, replacing any asset already there, and
    /// returns the path's GUID.
    pub fn insert(
        &self,
        path: &str,
        kind: impl Into<String>,
        data: impl Into<Vec<u8>>,
    ) -> ObjectGuid {
        let guid = ObjectGuid::from_path(path);
        let asset = MemoryAsset {
            guid,
            path: normalize_path(path),
            kind: kind.into(),
            data: Arc::from(data.into().into_boxed_slice()),
        };
        let mut guard = self.assets.write();
        match guard.by_guid.get(&guid).copied() {
            Some(index) => guard.assets[index] = asset,
            None => {
                let index = guard.assets.len();
                guard.assets.push(asset);
                guard.by_guid.insert(guid, index);
            }
        }
        guid
    }

    /// Makes `guid` the fallback for null references of `kind`.
    pub fn set_default(&self, kind: impl Into<String>, guid: ObjectGuid) {
        self.assets.write().defaults.insert(kind.into(), guid);
    }

    pub fn get(&self, guid: ObjectGuid) -> Option<MemoryAsset> {
        self.assets.read().get(guid).cloned()
    }

    /// Returns a snapshot of all assets in insertion order.
    pub fn all_assets(&self) -> Vec<MemoryAsset> {
        self.assets.read().assets.clone()
    }

    pub fn len(&self) -> usize {
        self.assets.read().assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentDatabase for MemoryContentDatabase {
    fn path_to_guid(&self, path: &str) -> Option<ObjectGuid> {
        let guid = ObjectGuid::from_path(path);
        self.assets.read().by_guid.contains_key(&guid).then_some(guid)
    }

    fn guid_to_path(&self, guid: ObjectGuid) -> Option<String> {
        self.assets.read().get(guid).map(|asset| asset.path.clone())
    }

    fn asset_kind(&self, guid: ObjectGuid) -> Option<String> {
        self.assets.read().get(guid).map(|asset| asset.kind.clone())
    }

    fn default_asset(&self, kind: &str) -> Option<ObjectGuid> {
        self.assets.read().defaults.get(kind).copied()
    }
}

impl AssetSource for MemoryContentDatabase {
    type Key = ObjectGuid;

    fn open_file(&mut self, key: ObjectGuid) -> Result<FileHandle> {
        let data = self
            .assets
            .read()
            .get(key)
            .map(|asset| Arc::clone(&asset.data))
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))?;
        Ok(self.handles.insert(data))
    }

    fn file_size(&self, handle: FileHandle) -> Result<u64> {
        Ok(self.handles.get(handle)?.len() as u64)
    }

    fn read_file(&mut self, handle: FileHandle, start_offset: u64, buf: &mut [u8]) -> Result<usize> {
        Ok(copy_range(self.handles.get(handle)?, start_offset, buf))
    }

    fn close_file(&mut self, handle: FileHandle) -> Result<()> {
        self.handles.remove(handle).map(drop)
    }
}

/// A file found by [`DirectoryContentDatabase::scan`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryAsset {
    pub guid: ObjectGuid,
    /// Normalized path relative to the scanned root.
    pub path: String,
    /// Lowercase file extension, empty when there is none.
    pub kind: String,
    pub size: u64,
    pub location: PathBuf,
}

#[derive(Debug)]
struct OpenDiskFile {
    file: File,
    size: u64,
}

/// Content database over every file below a directory.
#[derive(Debug)]
pub struct DirectoryContentDatabase {
    root: PathBuf,
    assets: Vec<DirectoryAsset>,
    by_guid: HashMap<ObjectGuid, usize>,
    handles: HandleTable<OpenDiskFile>,
}

impl DirectoryContentDatabase {
    /// Indexes `root` recursively. Assets are ordered by path.
    pub fn scan<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let mut assets = Vec::new();
        collect_files(&root, &root, &mut assets)?;
        assets.sort_by(|a, b| a.path.cmp(&b.path));

        let mut by_guid = HashMap::with_capacity(assets.len());
        for (index, asset) in assets.iter().enumerate() {
            if let Some(previous) = by_guid.insert(asset.guid, index) {
                return Err(Error::InvalidValue(format!(
                    "{} and {} map to the same asset GUID",
                    assets[previous].path, asset.path
                )));
            }
        }
        debug!("indexed {} assets under {}", assets.len(), root.display());
        Ok(Self {
            root,
            assets,
            by_guid,
            handles: HandleTable::new(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn assets(&self) -> &[DirectoryAsset] {
        &self.assets
    }

    pub fn get(&self, guid: ObjectGuid) -> Option<&DirectoryAsset> {
        self.by_guid.get(&guid).map(|&index| &self.assets[index])
    }
}

fn collect_files(root: &Path, dir: &Path, out: &mut Vec<DirectoryAsset>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let location = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            collect_files(root, &location, out)?;
        } else if file_type.is_file() {
            let relative = location.strip_prefix(root).unwrap_or(&location);
            let path = normalize_path(&relative.to_string_lossy());
            let kind = location
                .extension()
                .map(|ext| ext.to_string_lossy().to_lowercase())
                .unwrap_or_default();
            out.push(DirectoryAsset {
                guid: ObjectGuid::from_path(&path),
                path,
                kind,
                size: entry.metadata()?.len(),
                location,
            });
        }
    }
    Ok(())
}

impl ContentDatabase for DirectoryContentDatabase {
    fn path_to_guid(&self, path: &str) -> Option<ObjectGuid> {
        let guid = ObjectGuid::from_path(path);
        self.by_guid.contains_key(&guid).then_some(guid)
    }

    fn guid_to_path(&self, guid: ObjectGuid) -> Option<String> {
        self.get(guid).map(|asset| asset.path.clone())
    }

    fn asset_kind(&self, guid: ObjectGuid) -> Option<String> {
        self.get(guid).map(|asset| asset.kind.clone())
    }
}

impl AssetSource for DirectoryContentDatabase {
    type Key = ObjectGuid;

    fn open_file(&mut self, key: ObjectGuid) -> Result<FileHandle> {
        let asset = self
            .get(key)
            .ok_or_else(|| Error::EntryNotFound(key.to_string()))?;
        let file = File::open(&asset.location)?;
        let size = file.metadata()?.len();
        Ok(self.handles.insert(OpenDiskFile { file, size }))
    }

    fn file_size(&self, handle: FileHandle) -> Result<u64> {
        Ok(self.handles.get(handle)?.size)
    }

    fn read_file(&mut self, handle: FileHandle, start_offset: u64, buf: &mut [u8]) -> Result<usize> {
        let open = self.handles.get_mut(handle)?;
        if start_offset >= open.size {
            return Ok(0);
        }
        let available = usize::try_from(open.size - start_offset).unwrap_or(usize::MAX);
        let wanted = buf.len().min(available);
        open.file.seek(SeekFrom::Start(start_offset))?;
        open.file
            .read_exact(&mut buf[..wanted])
            .map_err(|err| Error::from_read(err, "asset file"))?;
        Ok(wanted)
    }

    fn close_file(&mut self, handle: FileHandle) -> Result<()> {
        self.handles.remove(handle).map(drop)
    }
}
