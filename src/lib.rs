//! Reflection-driven object serialization and asset packages for the
//! Crystal runtime.
//!
//! Types describe themselves once at startup through [`TypeDescriptor`]s
//! collected in an immutable [`TypeRegistry`]. The same descriptors drive
//! the binary and JSON codecs, the asset reference collector, and the
//! block-aligned package container built by [`PackageBuilder`].

pub mod assets;
pub mod binary;
pub mod content;
pub mod context;
pub mod error;
pub mod guid;
pub mod json;
pub mod package;
pub mod pak;
pub mod registry;
pub mod types;
pub mod value;
pub mod visitor;

pub use assets::{AssetRef, AssetResolver};
pub use content::{
    AssetSource, ContentDatabase, DirectoryContentDatabase, FileHandle, MemoryContentDatabase,
};
pub use context::Context;
pub use error::{Error, Result};
pub use guid::{ObjectGuid, TypeGuid};
pub use json::{EnumStyle, JsonOptions};
pub use package::{ManifestEntry, PackageBuilder, PakManifest};
pub use pak::{HashedPak, OrdinalPak, PakFile, PakWriter};
pub use registry::{Object, RegistryBuilder, TypeRegistry};
pub use types::{
    ClassBuilder, EnumMember, Field, StructBuilder, TypeDescriptor, TypeKind, TypeRef,
};
pub use value::{MathValue, Scalar};
pub use visitor::{collect_asset_refs, AssetCollector, Visitor, VisitorMut, MAX_NESTING_DEPTH};
