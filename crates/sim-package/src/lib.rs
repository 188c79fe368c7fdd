//! Device Package Library
//!
//! This crate defines how a device project's files are stored:
//!
//! - **VirtualFileSet**: the device filesystem as an ordered path → bytes map
//! - **Package**: the directory-shaped container ("Contents/Files") a project
//!   document is saved as, created once and reused on every save
//! - **Binary image**: a flat, checksummed blob for exchanging a file set with
//!   other tools
//!
//! # Example
//!
//! ```rust
//! use sim_package::VirtualFileSet;
//!
//! let mut files = VirtualFileSet::new();
//! files.add("main.script", b"println \"hello\"".to_vec()).unwrap();
//!
//! let image = files.export_binary().unwrap();
//! assert_eq!(VirtualFileSet::import_binary(&image).unwrap(), files);
//!
//! let container = files.save();
//! assert_eq!(VirtualFileSet::load(&container).unwrap(), files);
//! ```

pub mod container;
pub mod error;
pub mod fileset;
pub mod image;
pub mod path;

pub use container::{Entry, Package, CONTENTS, FILES};
pub use error::{FormatError, PackageError, PathError};
pub use fileset::VirtualFileSet;
pub use path::{validate_file_name, validate_path, NameValidation};
