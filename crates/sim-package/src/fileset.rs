//! Virtual file set
//!
//! The in-memory image of the device filesystem: a mapping from relative
//! path to file contents. Entries are kept ordered by path so every
//! serialization of an unchanged set is byte-identical.

use std::collections::BTreeMap;

use tracing::debug;

use crate::container::{files_from_root, Entry};
use crate::error::{FormatError, PathError};
use crate::image;
use crate::path::{validate_path, SEPARATOR};

/// The device's simulated filesystem
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFileSet {
    files: BTreeMap<String, Vec<u8>>,
}

impl VirtualFileSet {
    /// Create an empty file set
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a serialized package container
    ///
    /// Returns [`FormatError::MissingFiles`] when the container lacks the
    /// "Contents/Files" collection. Callers opening a project treat that as
    /// an empty project.
    pub fn load(container: &[u8]) -> Result<Self, FormatError> {
        let root = Entry::from_bytes(container)?;
        files_from_root(&root)
    }

    /// Serialize into a fresh package container
    pub fn save(&self) -> Vec<u8> {
        Entry::package_root(self.to_entry()).to_bytes()
    }

    /// Decode a flat binary image
    pub fn import_binary(bytes: &[u8]) -> Result<Self, FormatError> {
        image::decode(bytes)
    }

    /// Encode as a flat binary image
    ///
    /// Fails only for files larger than 4 GiB.
    pub fn export_binary(&self) -> Result<Vec<u8>, FormatError> {
        image::encode(self)
    }

    /// Add a file, replacing any existing contents at the same path
    ///
    /// Returns the previous contents, if any.
    pub fn add(
        &mut self,
        path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, PathError> {
        let path = path.into();
        validate_path(&path)?;
        if !self.files.contains_key(&path) {
            self.check_conflict(&path)?;
        }
        debug!("File set: add {}", path);
        Ok(self.files.insert(path, contents.into()))
    }

    /// Replace a file's contents (same as [`add`](Self::add))
    pub fn replace(
        &mut self,
        path: impl Into<String>,
        contents: impl Into<Vec<u8>>,
    ) -> Result<Option<Vec<u8>>, PathError> {
        self.add(path, contents)
    }

    /// Remove a file. Removing a missing path does nothing.
    pub fn remove(&mut self, path: &str) -> Option<Vec<u8>> {
        let removed = self.files.remove(path);
        if removed.is_some() {
            debug!("File set: remove {}", path);
        }
        removed
    }

    /// Move a file to a new path
    pub fn rename(&mut self, from: &str, to: &str) -> Result<(), PathError> {
        if from == to {
            return if self.contains(from) {
                Ok(())
            } else {
                Err(PathError::NotFound(from.to_string()))
            };
        }
        let contents = self
            .files
            .remove(from)
            .ok_or_else(|| PathError::NotFound(from.to_string()))?;

        if let Err(e) = validate_path(to).and_then(|_| {
            if self.files.contains_key(to) {
                Ok(())
            } else {
                self.check_conflict(to)
            }
        }) {
            self.files.insert(from.to_string(), contents);
            return Err(e);
        }

        debug!("File set: rename {} -> {}", from, to);
        self.files.insert(to.to_string(), contents);
        Ok(())
    }

    /// Get a file's contents
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    /// Check whether a file exists
    pub fn contains(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }

    /// Iterate over paths in order
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Iterate over (path, contents) in path order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.files.iter().map(|(p, c)| (p.as_str(), c.as_slice()))
    }

    /// Number of files
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set has no files
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Remove every file
    pub fn clear(&mut self) {
        self.files.clear();
    }

    /// Sum of all file sizes in bytes
    pub fn total_size(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Build the "Files" directory entry, nesting paths by component
    pub fn to_entry(&self) -> Entry {
        let mut root = Entry::empty_dir();
        for (path, contents) in &self.files {
            root.insert_path(path, contents.clone());
        }
        root
    }

    /// Reject a new path that would turn a file into a directory or back
    fn check_conflict(&self, path: &str) -> Result<(), PathError> {
        for (i, _) in path.match_indices(SEPARATOR) {
            let prefix = &path[..i];
            if self.files.contains_key(prefix) {
                return Err(PathError::Conflict {
                    path: path.to_string(),
                    existing: prefix.to_string(),
                });
            }
        }

        let dir_prefix = format!("{}{}", path, SEPARATOR);
        if let Some(existing) = self
            .files
            .range(dir_prefix.clone()..)
            .next()
            .map(|(k, _)| k)
            .filter(|k| k.starts_with(&dir_prefix))
        {
            return Err(PathError::Conflict {
                path: path.to_string(),
                existing: existing.clone(),
            });
        }
        Ok(())
    }

    /// Insert without validation; used by decoders that already validated
    pub(crate) fn insert_unchecked(&mut self, path: String, contents: Vec<u8>) {
        self.files.insert(path, contents);
    }
}
