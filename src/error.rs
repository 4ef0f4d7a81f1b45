use std::io;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure the serializer, registry and package layers can report.
///
/// Registration and descriptor errors are programmer mistakes surfaced at
/// startup; the remaining variants describe untrusted input and are always
/// recoverable by the caller.
#[derive(Debug, Error)]
pub enum Error {
    #[error("type is not registered: {0}")]
    UnregisteredType(String),

    #[error("stream names an unknown class: {0}")]
    UnknownClass(String),

    #[error("type registered twice: {0}")]
    DuplicateType(String),

    #[error("invalid type descriptor {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    #[error("value does not match descriptor {expected}")]
    TypeMismatch { expected: String },

    #[error("stream truncated while reading {0}")]
    TruncatedStream(String),

    #[error("malformed JSON: {0}")]
    MalformedJson(String),

    #[error("unresolved asset reference: {0}")]
    UnresolvedAssetReference(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("value nesting exceeds {0} levels")]
    NestingTooDeep(usize),

    #[error("package is not open")]
    PackageNotOpen,

    #[error("package is already open")]
    PackageAlreadyOpen,

    #[error("entry not found: {0}")]
    EntryNotFound(String),

    #[error("file handle does not belong to this source or was closed")]
    InvalidHandle,

    #[error("corrupt package: {0}")]
    CorruptPackage(String),

    #[error("package session tag {found:#010x} does not match expected {expected:#010x}")]
    IncompatibleSession { expected: u32, found: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub(crate) fn mismatch(expected: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: expected.into(),
        }
    }

    /// Maps an I/O failure while decoding into `TruncatedStream` when the
    /// stream simply ran dry.
    pub(crate) fn from_read(err: io::Error, what: &str) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::TruncatedStream(what.to_string())
        } else {
            Self::Io(err)
        }
    }

    /// True for failures caused by untrusted input rather than by a broken
    /// type registration.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            Self::TruncatedStream(_)
                | Self::MalformedJson(_)
                | Self::UnknownClass(_)
                | Self::UnresolvedAssetReference(_)
                | Self::InvalidValue(_)
                | Self::NestingTooDeep(_)
                | Self::CorruptPackage(_)
                | Self::IncompatibleSession { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_maps_to_truncated_stream() {
        let err = Error::from_read(io::Error::from(io::ErrorKind::UnexpectedEof), "u32");
        assert!(matches!(err, Error::TruncatedStream(ref what) if what == "u32"));
        assert!(err.is_data_error());
    }

    #[test]
    fn other_io_errors_are_kept() {
        let err = Error::from_read(io::Error::from(io::ErrorKind::PermissionDenied), "u32");
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_data_error());
    }
}
