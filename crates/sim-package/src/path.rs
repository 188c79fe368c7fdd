//! Path and file name rules for the device filesystem

use std::fmt;

use crate::error::PathError;

/// Separator between path components
pub const SEPARATOR: char = '/';

/// Longest file name the device filesystem accepts
pub const MAX_NAME_LEN: usize = 31;

/// Longest full path, separators included
pub const MAX_PATH_LEN: usize = 1024;

/// Result of checking a single file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameValidation {
    /// Name is acceptable
    Ok,
    /// Name is empty or longer than [`MAX_NAME_LEN`]
    BadLength,
    /// Name contains a character outside `[A-Za-z0-9-._+]`
    InvalidChar,
}

impl fmt::Display for NameValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::BadLength => write!(f, "name must be 1 to {} characters", MAX_NAME_LEN),
            Self::InvalidChar => write!(f, "name may only contain letters, digits and -._+"),
        }
    }
}

/// Check a single file name against the device filesystem rules
pub fn validate_file_name(name: &str) -> NameValidation {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return NameValidation::BadLength;
    }
    let valid = name
        .bytes()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, b'-' | b'.' | b'_' | b'+'));
    if valid {
        NameValidation::Ok
    } else {
        NameValidation::InvalidChar
    }
}

/// Validate a relative path and split it into components
pub fn split_path(path: &str) -> Result<Vec<&str>, PathError> {
    if path.is_empty() {
        return Err(PathError::Empty);
    }
    if path.len() > MAX_PATH_LEN {
        return Err(PathError::TooLong(path.len()));
    }
    if path.starts_with(SEPARATOR) {
        return Err(PathError::Absolute(path.to_string()));
    }

    path.split(SEPARATOR)
        .map(|component| {
            // "." and ".." pass the character check but would escape the tree
            let reason = match component {
                "." | ".." => NameValidation::InvalidChar,
                _ => validate_file_name(component),
            };
            match reason {
                NameValidation::Ok => Ok(component),
                reason => Err(PathError::BadComponent {
                    path: path.to_string(),
                    component: component.to_string(),
                    reason,
                }),
            }
        })
        .collect()
}

/// Validate a relative path
pub fn validate_path(path: &str) -> Result<(), PathError> {
    split_path(path).map(|_| ())
}
