//! Build diagnostics

use std::fmt;

use thiserror::Error;

/// A single problem found while compiling device scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// File the problem was found in
    pub file: String,
    /// 1-based line number, or 0 when the problem concerns the whole file
    pub line: usize,
    /// Human-readable description
    pub message: String,
}

impl Diagnostic {
    /// Create a diagnostic for a specific line
    pub fn new(file: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.file, self.message)
        } else {
            write!(f, "{}:{}: {}", self.file, self.line, self.message)
        }
    }
}

/// Compilation or load failure
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub struct BuildError {
    /// Every problem found, in source order
    pub diagnostics: Vec<Diagnostic>,
}

impl BuildError {
    /// Wrap a list of diagnostics
    pub fn new(diagnostics: Vec<Diagnostic>) -> Self {
        Self { diagnostics }
    }

    /// A build error with a single diagnostic
    pub fn single(diagnostic: Diagnostic) -> Self {
        Self {
            diagnostics: vec![diagnostic],
        }
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.diagnostics.len();
        write!(
            f,
            "build failed with {} error{}",
            count,
            if count == 1 { "" } else { "s" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        assert_eq!(
            Diagnostic::new("main.script", 3, "unknown statement").to_string(),
            "main.script:3: unknown statement"
        );
        assert_eq!(
            Diagnostic::new("main.script", 0, "file not found").to_string(),
            "main.script: file not found"
        );
    }

    #[test]
    fn test_build_error_display() {
        let one = BuildError::single(Diagnostic::new("a", 1, "x"));
        assert_eq!(one.to_string(), "build failed with 1 error");
        let two = BuildError::new(vec![Diagnostic::new("a", 1, "x"), Diagnostic::new("a", 2, "y")]);
        assert_eq!(two.to_string(), "build failed with 2 errors");
    }
}
