use log::debug;

use crate::content::ContentDatabase;
use crate::error::{Error, Result};
use crate::guid::ObjectGuid;
use crate::types::AssetRefInfo;

/// A typed reference to an external asset, persisted as its GUID.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct AssetRef {
    guid: ObjectGuid,
}

impl AssetRef {
    pub const fn new(guid: ObjectGuid) -> Self {
        Self { guid }
    }

    pub const fn null() -> Self {
        Self::new(ObjectGuid::NULL)
    }

    pub fn from_path(path: &str) -> Self {
        Self::new(ObjectGuid::from_path(path))
    }

    pub fn guid(self) -> ObjectGuid {
        self.guid
    }

    pub fn is_null(self) -> bool {
        self.guid.is_null()
    }
}

/// Applies the asset reference rules against a [`ContentDatabase`].
///
/// A non-null reference must name a known asset of the expected kind. A
/// null reference stays empty when the field opts out of default
/// initialization, and otherwise becomes the database's default asset for
/// the kind.
#[derive(Clone, Copy)]
pub struct AssetResolver<'a> {
    content: &'a dyn ContentDatabase,
}

impl<'a> AssetResolver<'a> {
    pub fn new(content: &'a dyn ContentDatabase) -> Self {
        Self { content }
    }

    pub fn content(&self) -> &'a dyn ContentDatabase {
        self.content
    }

    /// Validates a reference read from a binary stream.
    pub fn resolve(&self, info: &AssetRefInfo, reference: AssetRef) -> Result<AssetRef> {
        if reference.is_null() {
            return self.resolve_null(info);
        }
        if self.content.guid_to_path(reference.guid).is_none() {
            return Err(Error::UnresolvedAssetReference(format!(
                "no asset with GUID {}",
                reference.guid
            )));
        }
        self.check_kind(info, reference.guid)?;
        Ok(reference)
    }

    /// Resolves a path read from a text document; `None` is a null
    /// reference.
    pub fn resolve_path(&self, info: &AssetRefInfo, path: Option<&str>) -> Result<AssetRef> {
        let Some(path) = path else {
            return self.resolve_null(info);
        };
        let guid = self.content.path_to_guid(path).ok_or_else(|| {
            Error::UnresolvedAssetReference(format!("no asset at path {path:?}"))
        })?;
        self.check_kind(info, guid)?;
        Ok(AssetRef::new(guid))
    }

    /// Path to write for `reference`; `None` for a null reference.
    pub fn path_of(&self, reference: AssetRef) -> Result<Option<String>> {
        if reference.is_null() {
            return Ok(None);
        }
        self.content
            .guid_to_path(reference.guid)
            .map(Some)
            .ok_or_else(|| {
                Error::UnresolvedAssetReference(format!("no asset with GUID {}", reference.guid))
            })
    }

    fn resolve_null(&self, info: &AssetRefInfo) -> Result<AssetRef> {
        if info.no_default_init {
            return Ok(AssetRef::null());
        }
        match self.content.default_asset(&info.asset_kind) {
            Some(guid) => {
                debug!("null {} reference defaulted to {guid}", info.asset_kind);
                Ok(AssetRef::new(guid))
            }
            None => Err(Error::UnresolvedAssetReference(format!(
                "null {} reference and no default asset",
                info.asset_kind
            ))),
        }
    }

    fn check_kind(&self, info: &AssetRefInfo, guid: ObjectGuid) -> Result<()> {
        match self.content.asset_kind(guid) {
            Some(kind) if kind != info.asset_kind => Err(Error::UnresolvedAssetReference(format!(
                "asset {guid} is a {kind}, expected {}",
                info.asset_kind
            ))),
            _ => Ok(()),
        }
    }
}
