//! Package container
//!
//! A project is stored as a small directory tree:
//!
//! ```text
//! <project>/
//!   Contents/
//!     Files/
//!       main.script
//!       lib/util.script
//! ```
//!
//! The tree is modelled by [`Entry`], which can live in memory, be written to
//! a real directory, or be serialized to bytes. [`Package`] owns the tree for
//! an open document and reuses it on every save, replacing only the "Files"
//! collection so anything else stored in the container is kept. Files whose
//! names the device would reject are carried through saves untouched.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FormatError, PackageError};
use crate::fileset::VirtualFileSet;
use crate::path::{split_path, SEPARATOR};

/// Name of the inner container
pub const CONTENTS: &str = "Contents";

/// Name of the file collection inside [`CONTENTS`]
pub const FILES: &str = "Files";

/// A node in the package tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    /// File contents
    Leaf(Vec<u8>),
    /// Named children
    Dir(BTreeMap<String, Entry>),
}

impl Entry {
    /// An empty directory
    pub fn empty_dir() -> Self {
        Entry::Dir(BTreeMap::new())
    }

    /// Wrap a "Files" directory in the outer two levels of the container
    pub fn package_root(files: Entry) -> Self {
        let mut contents = BTreeMap::new();
        contents.insert(FILES.to_string(), files);
        let mut root = BTreeMap::new();
        root.insert(CONTENTS.to_string(), Entry::Dir(contents));
        Entry::Dir(root)
    }

    /// Parse a serialized tree
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, FormatError> {
        serde_json::from_slice(bytes).map_err(|e| FormatError::Malformed(e.to_string()))
    }

    /// Serialize the tree
    pub fn to_bytes(&self) -> Vec<u8> {
        // String-keyed maps of byte vectors cannot fail to serialize
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Children of a directory, or None for a leaf
    pub fn as_dir(&self) -> Option<&BTreeMap<String, Entry>> {
        match self {
            Entry::Dir(children) => Some(children),
            Entry::Leaf(_) => None,
        }
    }

    /// Whether this entry is a directory
    pub fn is_dir(&self) -> bool {
        matches!(self, Entry::Dir(_))
    }

    /// Look up a direct child
    pub fn child(&self, name: &str) -> Option<&Entry> {
        self.as_dir().and_then(|children| children.get(name))
    }

    /// Get a direct child directory, creating it (or turning a leaf into it)
    fn child_dir_mut(&mut self, name: &str) -> &mut Entry {
        if !self.is_dir() {
            *self = Entry::empty_dir();
        }
        let Entry::Dir(children) = self else {
            unreachable!("entry was just made a directory");
        };
        let child = children
            .entry(name.to_string())
            .or_insert_with(Entry::empty_dir);
        if !child.is_dir() {
            *child = Entry::empty_dir();
        }
        child
    }

    /// Store a leaf at a `/`-separated path below this directory
    pub fn insert_path(&mut self, path: &str, contents: Vec<u8>) {
        let mut node = self;
        let mut components = path.split(SEPARATOR).peekable();
        while let Some(component) = components.next() {
            if components.peek().is_none() {
                if !node.is_dir() {
                    *node = Entry::empty_dir();
                }
                if let Entry::Dir(children) = node {
                    children.insert(component.to_string(), Entry::Leaf(contents));
                }
                return;
            }
            node = node.child_dir_mut(component);
        }
    }

    /// Flatten every leaf below this directory into `(path, contents)` pairs
    fn collect_leaves(&self, prefix: &str, out: &mut Vec<(String, Vec<u8>)>) {
        let Some(children) = self.as_dir() else {
            return;
        };
        for (name, child) in children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}{}{}", prefix, SEPARATOR, name)
            };
            match child {
                Entry::Leaf(contents) => out.push((path, contents.clone())),
                Entry::Dir(_) => child.collect_leaves(&path, out),
            }
        }
    }

    /// Read a file or directory tree from disk
    pub fn read_dir(path: &Path) -> io::Result<Self> {
        let meta = fs::metadata(path)?;
        if !meta.is_dir() {
            return Ok(Entry::Leaf(fs::read(path)?));
        }

        let mut children = BTreeMap::new();
        for dir_entry in fs::read_dir(path)? {
            let dir_entry = dir_entry?;
            let Ok(name) = dir_entry.file_name().into_string() else {
                warn!("Skipping non UTF-8 name in {}", path.display());
                continue;
            };
            children.insert(name, Entry::read_dir(&dir_entry.path())?);
        }
        Ok(Entry::Dir(children))
    }

    /// Write the tree to disk, removing anything at `path` that is not in it
    pub fn write_dir(&self, path: &Path) -> io::Result<()> {
        match self {
            Entry::Leaf(contents) => {
                if path.is_dir() {
                    fs::remove_dir_all(path)?;
                }
                fs::write(path, contents)
            }
            Entry::Dir(children) => {
                if path.exists() && !path.is_dir() {
                    fs::remove_file(path)?;
                }
                fs::create_dir_all(path)?;

                for (name, child) in children {
                    child.write_dir(&path.join(name))?;
                }

                for dir_entry in fs::read_dir(path)? {
                    let dir_entry = dir_entry?;
                    // Names that are not UTF-8 were never read, so leave them be
                    let keep = dir_entry
                        .file_name()
                        .to_str()
                        .map_or(true, |name| children.contains_key(name));
                    if keep {
                        continue;
                    }
                    let stale = dir_entry.path();
                    debug!("Removing stale package entry {}", stale.display());
                    if dir_entry.file_type()?.is_dir() {
                        fs::remove_dir_all(&stale)?;
                    } else {
                        fs::remove_file(&stale)?;
                    }
                }
                Ok(())
            }
        }
    }
}

/// A leaf that could not join the file set
type Unrecognized = (String, Vec<u8>);

/// Extract the file set from a container root
///
/// Files whose names the device filesystem would reject are skipped with a
/// warning rather than failing the whole project.
pub fn files_from_root(root: &Entry) -> Result<VirtualFileSet, FormatError> {
    split_files(root).map(|(set, _)| set)
}

/// Split the "Files" collection into valid device files and the rest
fn split_files(root: &Entry) -> Result<(VirtualFileSet, Vec<Unrecognized>), FormatError> {
    if !root.is_dir() {
        return Err(FormatError::UnexpectedEntry {
            path: String::new(),
            expected: "directory",
        });
    }
    let files = root
        .child(CONTENTS)
        .and_then(|contents| contents.child(FILES))
        .ok_or(FormatError::MissingFiles)?;
    if !files.is_dir() {
        return Err(FormatError::UnexpectedEntry {
            path: format!("{}{}{}", CONTENTS, SEPARATOR, FILES),
            expected: "directory",
        });
    }

    let mut leaves = Vec::new();
    files.collect_leaves("", &mut leaves);

    let mut set = VirtualFileSet::new();
    let mut unrecognized = Vec::new();
    for (path, contents) in leaves {
        match split_path(&path) {
            Ok(_) => set.insert_unchecked(path, contents),
            Err(e) => {
                warn!("Skipping package file {}: {}", path, e);
                unrecognized.push((path, contents));
            }
        }
    }
    Ok((set, unrecognized))
}

/// A project's package container plus its decoded file set
///
/// The container root is created lazily on the first save and then reused:
/// later saves only swap the "Files" collection.
#[derive(Debug, Clone, Default)]
pub struct Package {
    root: Option<Entry>,
    files: VirtualFileSet,
    /// Leaves under "Files" with names the device rejects
    unrecognized: Vec<Unrecognized>,
    load_error: Option<FormatError>,
}

impl Package {
    /// Create a package with no container yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Adopt an existing container tree
    ///
    /// A missing or malformed "Contents/Files" collection yields an empty
    /// file set; the reason is kept in [`load_error`](Self::load_error).
    pub fn from_entry(root: Entry) -> Self {
        match split_files(&root) {
            Ok((files, unrecognized)) => {
                info!("Opened package with {} files", files.len());
                Self {
                    root: Some(root),
                    files,
                    unrecognized,
                    load_error: None,
                }
            }
            Err(e) => {
                warn!("Package has no usable files ({}); starting empty", e);
                Self {
                    root: root.is_dir().then_some(root),
                    files: VirtualFileSet::new(),
                    unrecognized: Vec::new(),
                    load_error: Some(e),
                }
            }
        }
    }

    /// Parse container bytes, degrading to an empty package on error
    pub fn from_bytes(bytes: &[u8]) -> Self {
        match Entry::from_bytes(bytes) {
            Ok(root) => Self::from_entry(root),
            Err(e) => {
                warn!("Unreadable package container ({}); starting empty", e);
                Self {
                    root: None,
                    files: VirtualFileSet::new(),
                    unrecognized: Vec::new(),
                    load_error: Some(e),
                }
            }
        }
    }

    /// Read a package directory from disk
    ///
    /// Anything at `path` other than a directory is refused.
    pub fn read_dir(path: &Path) -> Result<Self, PackageError> {
        if !fs::metadata(path)?.is_dir() {
            return Err(PackageError::NotAPackage(path.to_path_buf()));
        }
        let root = Entry::read_dir(path)?;
        Ok(Self::from_entry(root))
    }

    /// Serialize the container, committing the current files into it
    pub fn to_bytes(&mut self) -> Vec<u8> {
        self.commit().to_bytes()
    }

    /// Write the container to a package directory
    ///
    /// An existing file at `path` is never replaced.
    pub fn write_dir(&mut self, path: &Path) -> Result<(), PackageError> {
        if path.exists() && !path.is_dir() {
            return Err(PackageError::NotAPackage(path.to_path_buf()));
        }
        self.commit().write_dir(path)?;
        info!("Saved package to {} ({} files)", path.display(), self.files.len());
        Ok(())
    }

    /// Store the current files into the container, creating it if needed
    fn commit(&mut self) -> &Entry {
        let mut files = self.files.to_entry();
        for (path, contents) in &self.unrecognized {
            let shadowed = path
                .match_indices(SEPARATOR)
                .any(|(i, _)| self.files.contains(&path[..i]));
            if shadowed {
                warn!("Dropping {}: a file now sits on its directory", path);
                continue;
            }
            files.insert_path(path, contents.clone());
        }
        let root = self.root.get_or_insert_with(|| {
            debug!("Creating package container");
            Entry::package_root(Entry::empty_dir())
        });
        let contents = root.child_dir_mut(CONTENTS);
        if let Entry::Dir(children) = contents {
            children.insert(FILES.to_string(), files);
        }
        root
    }

    /// Whether a container has been established
    pub fn has_container(&self) -> bool {
        self.root.is_some()
    }

    /// Paths under "Files" that were kept out of the file set
    pub fn unrecognized_paths(&self) -> impl Iterator<Item = &str> {
        self.unrecognized.iter().map(|(path, _)| path.as_str())
    }

    /// Why the files could not be read when the package was opened
    pub fn load_error(&self) -> Option<&FormatError> {
        self.load_error.as_ref()
    }

    /// The package's files
    pub fn files(&self) -> &VirtualFileSet {
        &self.files
    }

    /// Mutable access to the package's files
    pub fn files_mut(&mut self) -> &mut VirtualFileSet {
        &mut self.files
    }

    /// Replace the file set wholesale
    ///
    /// Unrecognized files stay in the container.
    pub fn set_files(&mut self, files: VirtualFileSet) {
        self.files = files;
    }
}
