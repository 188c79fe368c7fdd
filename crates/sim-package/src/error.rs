//! Error types for package and image handling

use thiserror::Error;

use crate::path::NameValidation;

/// Errors that can occur while decoding a package container or binary image
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The container has no "Contents/Files" collection
    #[error("container has no Contents/Files collection")]
    MissingFiles,

    /// Container bytes could not be parsed
    #[error("malformed container: {0}")]
    Malformed(String),

    /// An entry inside the container has the wrong kind
    #[error("unexpected entry at {path}: expected {expected}")]
    UnexpectedEntry { path: String, expected: &'static str },

    /// Image does not start with the expected magic bytes
    #[error("bad image magic: {0:02X?}")]
    BadMagic([u8; 4]),

    /// Image version is not understood
    #[error("unsupported image version: {0}")]
    UnsupportedVersion(u8),

    /// Image ended before a field could be read
    #[error("truncated image: need {needed} more bytes")]
    Truncated { needed: usize },

    /// Image has data past the checksum
    #[error("{0} trailing bytes after image")]
    TrailingBytes(usize),

    /// Image checksum mismatch
    #[error("checksum mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A stored path is not valid UTF-8
    #[error("path is not valid UTF-8")]
    InvalidUtf8Path,

    /// A stored path fails validation
    #[error("invalid path in image: {0}")]
    InvalidPath(#[from] PathError),

    /// The same path occurs twice
    #[error("duplicate path: {0}")]
    DuplicatePath(String),

    /// A file is too large for an image length field
    #[error("{path} is {len} bytes, more than an image can hold")]
    FileTooLarge { path: String, len: usize },

    /// More files than an image can count
    #[error("{0} files, more than an image can hold")]
    TooManyFiles(usize),
}

/// Errors for paths handed to a file set
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PathError {
    /// Empty path
    #[error("path is empty")]
    Empty,

    /// Path exceeds the maximum length
    #[error("path is {0} bytes long")]
    TooLong(usize),

    /// Path starts with a separator
    #[error("path must be relative: {0}")]
    Absolute(String),

    /// A path component is not a valid device file name
    #[error("invalid component {component:?} in {path}: {reason}")]
    BadComponent {
        path: String,
        component: String,
        reason: NameValidation,
    },

    /// Path would be both a file and a directory
    #[error("{path} conflicts with existing file {existing}")]
    Conflict { path: String, existing: String },

    /// Rename source does not exist
    #[error("no such file: {0}")]
    NotFound(String),
}

/// Errors from package I/O
#[derive(Debug, Error)]
pub enum PackageError {
    /// Format error
    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Path error
    #[error("path error: {0}")]
    Path(#[from] PathError),

    /// Package path exists but is not a directory
    #[error("{} is not a package directory", .0.display())]
    NotAPackage(std::path::PathBuf),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
