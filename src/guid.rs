use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Stable identifier of a registered class, persisted in place of the class
/// name in front of every polymorphic pointer payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TypeGuid(pub u32);

impl TypeGuid {
    /// Marks a null pointer in the binary stream.
    pub const NULL: TypeGuid = TypeGuid(0);

    /// Derives a GUID from a class name. Used when a class does not pick an
    /// explicit GUID; renaming such a class changes its GUID.
    pub fn from_name(name: &str) -> Self {
        let digest = Md5::digest(name.as_bytes());
        let value = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
        Self(value.max(1))
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for TypeGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Content identifier of an asset, independent of where the asset lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectGuid(pub u64);

impl ObjectGuid {
    /// "No reference".
    pub const NULL: ObjectGuid = ObjectGuid(0);

    /// Hashes an asset path. Separators and case are normalized first so
    /// `Textures\Stone.png` and `textures/stone.png` name the same asset.
    pub fn from_path(path: &str) -> Self {
        let normalized = normalize_path(path);
        let digest = Md5::digest(normalized.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self(u64::from_le_bytes(bytes).max(1))
    }

    pub fn is_null(self) -> bool {
        self == Self::NULL
    }
}

impl fmt::Display for ObjectGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl FromStr for ObjectGuid {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self> {
        let digits = text.trim().trim_start_matches("0x");
        u64::from_str_radix(digits, 16)
            .map(ObjectGuid)
            .map_err(|err| Error::InvalidValue(format!("bad object GUID {text:?}: {err}")))
    }
}

impl Serialize for ObjectGuid {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ObjectGuid {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

/// Canonical form of an asset path.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .replace('\\', "/")
        .trim_start_matches("./")
        .to_lowercase()
}
