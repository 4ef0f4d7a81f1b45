//! Collects assets from a content database and writes them into a package.

use std::any::Any;
use std::collections::HashSet;
use std::fs;
use std::io::{Seek, Write};
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::binary;
use crate::content::{AssetSource, ContentDatabase, MemoryContentDatabase};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::guid::{normalize_path, ObjectGuid};
use crate::pak::{HashedToc, OrdinalToc, PakWriter, TableOfContents, TocKind};
use crate::registry::{Object, TypeRegistry};
use crate::types::TypeDescriptor;
use crate::visitor::AssetCollector;

/// One packaged asset as recorded next to the package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub ordinal: u32,
    pub guid: ObjectGuid,
    pub path: String,
    pub size: u64,
}

/// Human-readable listing of a built package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PakManifest {
    pub hashed: bool,
    pub session: u32,
    pub entries: Vec<ManifestEntry>,
}

impl PakManifest {
    pub fn find_by_path(&self, path: &str) -> Option<&ManifestEntry> {
        let path = normalize_path(path);
        self.entries.iter().find(|entry| entry.path == path)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|err| Error::InvalidValue(err.to_string()))
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json_pretty()?)?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        serde_json::from_str(&text).map_err(|err| Error::MalformedJson(err.to_string()))
    }
}

#[derive(Debug, Clone)]
struct Pending {
    guid: ObjectGuid,
    path: String,
}

/// Queues assets in insertion order, then writes them as an ordinal or a
/// hashed package.
///
/// Objects added with [`PackageBuilder::add_object`] are serialized into
/// an in-memory overlay and take precedence over the source.
pub struct PackageBuilder<'a, S> {
    registry: &'a TypeRegistry,
    source: &'a mut S,
    overlay: MemoryContentDatabase,
    pending: Vec<Pending>,
    queued: HashSet<ObjectGuid>,
    session: u32,
}

impl<'a, S> PackageBuilder<'a, S>
where
    S: ContentDatabase + AssetSource<Key = ObjectGuid>,
{
    /// The session tag defaults to the registry's schema tag.
    pub fn new(registry: &'a TypeRegistry, source: &'a mut S) -> Self {
        Self {
            registry,
            source,
            overlay: MemoryContentDatabase::new(),
            pending: Vec::new(),
            queued: HashSet::new(),
            session: registry.schema_tag(),
        }
    }

    pub fn with_session(mut self, session: u32) -> Self {
        self.session = session;
        self
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Queues the asset stored under `path`.
    pub fn add_path(&mut self, path: &str) -> Result<ObjectGuid> {
        let guid = self
            .overlay
            .path_to_guid(path)
            .or_else(|| self.source.path_to_guid(path))
            .ok_or_else(|| Error::UnresolvedAssetReference(format!("no asset at {path}")))?;
        self.add_asset(guid)?;
        Ok(guid)
    }

    /// Queues a known asset. Adding the same GUID twice keeps the first slot.
    pub fn add_asset(&mut self, guid: ObjectGuid) -> Result<()> {
        if self.queued.contains(&guid) {
            return Ok(());
        }
        let path = self
            .overlay
            .guid_to_path(guid)
            .or_else(|| self.source.guid_to_path(guid))
            .ok_or_else(|| Error::UnresolvedAssetReference(format!("no asset with GUID {guid}")))?;
        self.queued.insert(guid);
        self.pending.push(Pending { guid, path });
        Ok(())
    }

    /// Queues every asset referenced by `value` and returns their GUIDs.
    pub fn add_references(&mut self, ty: &TypeDescriptor, value: &dyn Any) -> Result<Vec<ObjectGuid>> {
        let mut collector = AssetCollector::new(self.registry);
        collector.collect(ty, value)?;
        let guids = collector.into_guids();
        for &guid in &guids {
            self.add_asset(guid)?;
        }
        Ok(guids)
    }

    /// Serializes `object` in binary form and queues it under `path`.
    pub fn add_object(&mut self, path: &str, object: &dyn Object) -> Result<ObjectGuid> {
        let ty = self.registry.descriptor_of(object)?;
        let mut bytes = Vec::new();
        {
            let cx = Context::new(self.registry).with_content(&*self.source);
            binary::serialize_object(&mut bytes, cx, object)?;
        }
        let guid = self.overlay.insert(path, ty.name.clone(), bytes);
        self.add_asset(guid)?;
        Ok(guid)
    }

    /// Writes the queued assets keyed by insertion order.
    pub fn write_ordinal<W: Write + Seek>(&mut self, out: W) -> Result<PakManifest> {
        let toc = OrdinalToc::with_len(self.pending.len());
        self.write(out, toc, |ordinal, _| ordinal)
    }

    /// Writes the queued assets keyed by GUID.
    pub fn write_hashed<W: Write + Seek>(&mut self, out: W) -> Result<PakManifest> {
        let toc = HashedToc::with_keys(self.pending.iter().map(|item| item.guid))?;
        self.write(out, toc, |_, guid| guid)
    }

    fn write<W, T>(
        &mut self,
        out: W,
        toc: T,
        key: impl Fn(u32, ObjectGuid) -> T::Key,
    ) -> Result<PakManifest>
    where
        W: Write + Seek,
        T: TableOfContents,
    {
        let mut writer = PakWriter::new(out, toc, self.session)?;
        let mut entries = Vec::with_capacity(self.pending.len());
        for (ordinal, item) in (0u32..).zip(&self.pending) {
            let bytes = if self.overlay.get(item.guid).is_some() {
                self.overlay.read_to_vec(item.guid)?
            } else {
                self.source.read_to_vec(item.guid)?
            };
            writer.write_entry(key(ordinal, item.guid), &bytes)?;
            entries.push(ManifestEntry {
                ordinal,
                guid: item.guid,
                path: item.path.clone(),
                size: bytes.len() as u64,
            });
        }
        let (_, header) = writer.finish()?;
        debug!(
            "packaged {} assets ({} bytes, session {:#010x})",
            entries.len(),
            header.total_size,
            header.session
        );
        Ok(PakManifest {
            hashed: T::KIND == TocKind::Hashed,
            session: header.session,
            entries,
        })
    }
}
