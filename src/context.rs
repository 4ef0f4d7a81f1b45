use crate::assets::{AssetRef, AssetResolver};
use crate::content::ContentDatabase;
use crate::error::{Error, Result};
use crate::registry::TypeRegistry;
use crate::types::AssetRefInfo;

/// What a codec needs besides the value itself: the registry for
/// polymorphic pointers and, optionally, a content database for asset
/// references.
///
/// Without a content database the only asset reference a decoder accepts
/// is a null one on a field that opts out of default initialization, and
/// JSON cannot translate between GUIDs and paths.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    registry: &'a TypeRegistry,
    resolver: Option<AssetResolver<'a>>,
}

impl<'a> Context<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            resolver: None,
        }
    }

    pub fn with_content(mut self, content: &'a dyn ContentDatabase) -> Self {
        self.resolver = Some(AssetResolver::new(content));
        self
    }

    pub fn registry(&self) -> &'a TypeRegistry {
        self.registry
    }

    pub fn resolver(&self) -> Option<AssetResolver<'a>> {
        self.resolver
    }

    /// Checks a reference read from a stream against the attached content
    /// database.
    pub fn resolve_asset(&self, info: &AssetRefInfo, reference: AssetRef) -> Result<AssetRef> {
        match self.resolver {
            Some(resolver) => resolver.resolve(info, reference),
            None if reference.is_null() && info.no_default_init => Ok(reference),
            None if reference.is_null() => Err(Error::UnresolvedAssetReference(format!(
                "null {} reference needs a content database for its default",
                info.asset_kind
            ))),
            None => Err(Error::UnresolvedAssetReference(format!(
                "asset {} cannot be resolved without a content database",
                reference.guid()
            ))),
        }
    }
}
