//! Source file loading for review sessions.
//!
//! This module reads a single source file into a [`CodeUnit`] and discovers
//! reviewable files in a directory tree.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::error::{Result, TutorError};

/// Maximum allowed source file size in bytes (100KB).
pub const MAX_SOURCE_SIZE: u64 = 100 * 1024;

/// Supported file extensions and the language name shown to the model.
pub const SUPPORTED_LANGUAGES: &[(&str, &str)] = &[
    ("py", "Python"),
    ("js", "JavaScript"),
    ("ts", "TypeScript"),
    ("jsx", "JavaScript (React)"),
    ("tsx", "TypeScript (React)"),
    ("java", "Java"),
    ("c", "C"),
    ("cpp", "C++"),
    ("cc", "C++"),
    ("h", "C/C++ Header"),
    ("hpp", "C++ Header"),
    ("cs", "C#"),
    ("go", "Go"),
    ("rs", "Rust"),
    ("rb", "Ruby"),
    ("php", "PHP"),
    ("swift", "Swift"),
    ("kt", "Kotlin"),
    ("scala", "Scala"),
    ("sh", "Shell Script"),
    ("bash", "Bash Script"),
    ("sql", "SQL"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("scss", "SCSS"),
    ("sass", "Sass"),
    ("json", "JSON"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
    ("xml", "XML"),
    ("md", "Markdown"),
    ("r", "R"),
];

/// Returns the language name for a path, or `None` if the extension is unsupported.
#[must_use]
pub fn language_for_path(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    SUPPORTED_LANGUAGES
        .iter()
        .find(|(candidate, _)| *candidate == ext)
        .map(|(_, language)| *language)
}

/// Text encoding a source file was decoded with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceEncoding {
    /// Valid UTF-8.
    Utf8,
    /// Not valid UTF-8; every byte mapped to the code point of the same value.
    Latin1,
}

/// A loaded source file.
///
/// Immutable once loaded; engines only read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeUnit {
    /// Path to the file.
    pub path: PathBuf,

    /// Human-readable language name (e.g. "Rust").
    pub language: String,

    /// Decoded file contents.
    pub content: String,

    /// Number of lines in the file.
    pub line_count: usize,

    /// Size of the file on disk in bytes.
    pub size_bytes: usize,

    /// Encoding used to decode the file.
    pub encoding: SourceEncoding,
}

impl CodeUnit {
    /// Loads a source file from disk.
    ///
    /// Validates that:
    /// - The path exists and is a regular file
    /// - The extension maps to a supported language
    /// - The file size is within the 100KB limit
    ///
    /// Files that are not valid UTF-8 are decoded as Latin-1.
    ///
    /// # Errors
    ///
    /// Returns `TutorError::SourceNotFound`, `TutorError::SourceNotAFile`,
    /// `TutorError::UnsupportedSource` or `TutorError::SourceTooLarge`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TutorError::source_not_found(path)
            } else {
                TutorError::Io(e)
            }
        })?;

        if !metadata.is_file() {
            return Err(TutorError::source_not_a_file(path));
        }

        let Some(language) = language_for_path(path) else {
            let extension = path
                .extension()
                .map(|ext| ext.to_string_lossy().into_owned())
                .unwrap_or_default();
            return Err(TutorError::unsupported_source(path, extension));
        };

        let file_size = metadata.len();
        if file_size > MAX_SOURCE_SIZE {
            return Err(TutorError::source_too_large(path, file_size / 1024));
        }

        let bytes = std::fs::read(path)?;
        let size_bytes = bytes.len();
        let (content, encoding) = match String::from_utf8(bytes) {
            Ok(content) => (content, SourceEncoding::Utf8),
            Err(e) => (decode_latin1(e.as_bytes()), SourceEncoding::Latin1),
        };

        Ok(Self::from_parts(path, language, content, size_bytes, encoding))
    }

    /// Builds a code unit from text already in memory.
    ///
    /// Used for code that never touched the disk, such as pasted snippets.
    #[must_use]
    pub fn from_text(path: impl Into<PathBuf>, language: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        let size_bytes = content.len();
        Self::from_parts(path, language, content, size_bytes, SourceEncoding::Utf8)
    }

    fn from_parts(
        path: impl Into<PathBuf>,
        language: impl Into<String>,
        content: String,
        size_bytes: usize,
        encoding: SourceEncoding,
    ) -> Self {
        Self {
            path: path.into(),
            language: language.into(),
            line_count: content.lines().count(),
            content,
            size_bytes,
            encoding,
        }
    }

    /// Returns the file name for display, falling back to the full path.
    #[must_use]
    pub fn display_name(&self) -> String {
        self.path.file_name().map_or_else(
            || self.path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        )
    }
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Finds all supported source files in a directory, sorted by path.
///
/// # Errors
///
/// Returns `TutorError::SourceNotFound` if the directory doesn't exist.
pub fn find_sources(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Err(TutorError::source_not_found(dir));
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::debug!(error = %e, "Skipping unreadable directory entry");
                None
            }
        })
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| language_for_path(path).is_some())
        .collect();

    files.sort();
    Ok(files)
}
