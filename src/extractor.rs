//! File metadata extraction.
//!
//! The [`MetadataExtractor`] walks a directory tree and turns every regular file
//! into a [`FileDescriptor`]: name, lowercased extension, size, timestamps, a
//! best-effort MIME type, version/draft/final markers parsed from the file name
//! and, for small text-like files, a handful of content keywords.

use crate::config::CompiledFilters;
use chrono::{DateTime, Local};
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Files larger than this are skipped entirely.
pub const MAX_FILE_SIZE: u64 = 100 * 1024 * 1024;
/// Keywords are only extracted from files smaller than this.
pub const MAX_KEYWORD_FILE_SIZE: u64 = 10 * 1024 * 1024;
/// Number of leading bytes read for keyword extraction.
pub const KEYWORD_SAMPLE_BYTES: u64 = 1000;
pub const MAX_KEYWORDS: usize = 20;
/// Bytes handed to content sniffing when the extension gives no MIME type.
const SNIFF_BYTES: u64 = 8192;

const OCTET_STREAM: &str = "application/octet-stream";

/// MIME types consulted before any library guess.
const EXTENSION_MIME_TABLE: &[(&str, &str)] = &[
    (".pdf", "application/pdf"),
    (".doc", "application/msword"),
    (
        ".docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (".txt", "text/plain"),
    (".jpg", "image/jpeg"),
    (".jpeg", "image/jpeg"),
    (".png", "image/png"),
    (".gif", "image/gif"),
    (".mp4", "video/mp4"),
    (".mp3", "audio/mpeg"),
    (".psd", "image/vnd.adobe.photoshop"),
    (".ai", "application/illustrator"),
    (".zip", "application/zip"),
    (".rar", "application/x-rar-compressed"),
    (".exe", "application/x-msdownload"),
    (".py", "text/x-python"),
    (".js", "application/javascript"),
    (".html", "text/html"),
    (".css", "text/css"),
    (
        ".xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    (
        ".pptx",
        "application/vnd.openxmlformats-officedocument.presentationml.presentation",
    ),
];

/// Non-`text/*` MIME types that still get keyword extraction.
const DOCUMENT_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "application/msword",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
];

/// Errors raised while inspecting a single file.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("failed to read metadata of {path}: {source}")]
    Metadata { path: PathBuf, source: io::Error },
    #[error("{0} has no file name")]
    NoFileName(PathBuf),
    #[error("failed to walk {path}: {source}")]
    Walk { path: PathBuf, source: walkdir::Error },
}

pub type ExtractResult<T> = Result<T, ExtractError>;

/// Version markers found in a file name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub is_version: bool,
    pub version_number: Option<String>,
    pub is_draft: bool,
    pub is_final: bool,
}

/// Metadata about one discovered file. Built once per scan, never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    /// Lowercased, with the leading dot; empty when the file has no extension.
    pub extension: String,
    pub size: u64,
    pub modified_at: DateTime<Local>,
    pub created_at: DateTime<Local>,
    /// Never empty.
    pub mime_type: String,
    pub version_info: VersionInfo,
    /// `None` for large or non-text files.
    pub keywords: Option<BTreeSet<String>>,
}

/// Builds [`FileDescriptor`]s from files on disk.
pub struct MetadataExtractor {
    version_regex: Regex,
    draft_regex: Regex,
    final_regex: Regex,
    word_regex: Regex,
    filters: Option<CompiledFilters>,
}

impl MetadataExtractor {
    /// Creates an extractor that analyzes every file it finds.
    pub fn new() -> Self {
        Self {
            version_regex: Regex::new(r"(?i)v(\d+(?:\.\d+)*)|version\s*(\d+(?:\.\d+)*)")
                .expect("version pattern is valid"),
            draft_regex: Regex::new(r"(?i)draft|taslak").expect("draft pattern is valid"),
            final_regex: Regex::new(r"(?i)final|(?:^|[^\p{L}])son(?:[^\p{L}]|$)")
                .expect("final pattern is valid"),
            word_regex: Regex::new(r"\b\w+\b").expect("word pattern is valid"),
            filters: None,
        }
    }

    /// Creates an extractor that skips files rejected by `filters`.
    pub fn with_filters(filters: CompiledFilters) -> Self {
        Self {
            filters: Some(filters),
            ..Self::new()
        }
    }

    /// Recursively scans `root` and returns a descriptor for every analyzable file.
    ///
    /// Files that vanish, are too large, are filtered out, or cannot be read are
    /// omitted; the scan itself never fails.
    pub fn scan_directory(&self, root: &Path) -> Vec<FileDescriptor> {
        tracing::info!(root = %root.display(), "scanning directory");
        let mut descriptors = Vec::new();

        for entry in WalkDir::new(root).min_depth(1) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(source) => {
                    let path = source.path().unwrap_or(root).to_path_buf();
                    tracing::warn!("{}", ExtractError::Walk { path, source });
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                continue;
            }

            let path = entry.path();
            if let Some(filters) = &self.filters {
                let relative = path.strip_prefix(root).unwrap_or(path);
                if !filters.should_include(relative) {
                    tracing::debug!(path = %path.display(), "excluded by filters");
                    continue;
                }
            }

            match self.analyze_file(path) {
                Ok(Some(descriptor)) => descriptors.push(descriptor),
                Ok(None) => tracing::debug!(path = %path.display(), "skipped"),
                Err(e) => tracing::error!("{}", e),
            }
        }

        tracing::info!(count = descriptors.len(), "scan finished");
        descriptors
    }

    /// Inspects a single file.
    ///
    /// Returns `Ok(None)` when the file no longer exists, is not a regular file,
    /// or exceeds [`MAX_FILE_SIZE`].
    pub fn analyze_file(&self, path: &Path) -> ExtractResult<Option<FileDescriptor>> {
        let metadata = match fs::metadata(path) {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ExtractError::Metadata {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        if !metadata.is_file() || metadata.len() > MAX_FILE_SIZE {
            return Ok(None);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ExtractError::NoFileName(path.to_path_buf()))?;
        let extension = extension_of(path);
        let size = metadata.len();

        let modified_at: DateTime<Local> = metadata
            .modified()
            .map(DateTime::from)
            .unwrap_or_else(|_| Local::now());
        let created_at = metadata
            .created()
            .map(DateTime::from)
            .unwrap_or(modified_at);

        let mime_type = self.mime_type(path, &extension);
        let version_info = self.version_info(&name);
        let keywords = if size < MAX_KEYWORD_FILE_SIZE && is_text_like(&mime_type) {
            Some(self.extract_keywords(path))
        } else {
            None
        };

        Ok(Some(FileDescriptor {
            path: path.to_path_buf(),
            name,
            extension,
            size,
            modified_at,
            created_at,
            mime_type,
            version_info,
            keywords,
        }))
    }

    /// Resolves a MIME type: built-in table, library guess, `application/<ext>`,
    /// then `application/octet-stream`.
    pub fn mime_type(&self, path: &Path, extension: &str) -> String {
        if let Some((_, mime)) = EXTENSION_MIME_TABLE
            .iter()
            .find(|(ext, _)| *ext == extension)
        {
            return mime.to_string();
        }

        if !extension.is_empty()
            && let Some(mime) = mime_guess::from_ext(&extension[1..]).first()
        {
            return mime.essence_str().to_string();
        }

        if let Some(mime) = sniff_mime(path) {
            return mime;
        }

        if extension.is_empty() {
            OCTET_STREAM.to_string()
        } else {
            format!("application/{}", &extension[1..])
        }
    }

    /// Parses version, draft and final markers from a file name.
    ///
    /// ```
    /// use sortmind::extractor::MetadataExtractor;
    ///
    /// let info = MetadataExtractor::new().version_info("Project_Draft_v2.docx");
    /// assert!(info.is_version && info.is_draft && !info.is_final);
    /// assert_eq!(info.version_number.as_deref(), Some("2"));
    /// ```
    pub fn version_info(&self, file_name: &str) -> VersionInfo {
        let version_number = self.version_regex.captures(file_name).and_then(|caps| {
            caps.get(1)
                .or_else(|| caps.get(2))
                .map(|m| m.as_str().to_string())
        });

        VersionInfo {
            is_version: version_number.is_some(),
            version_number,
            is_draft: self.draft_regex.is_match(file_name),
            is_final: self.final_regex.is_match(file_name),
        }
    }

    /// Collects up to [`MAX_KEYWORDS`] distinct lowercase words longer than
    /// three characters from the start of a file. Failures yield an empty set.
    pub fn extract_keywords(&self, path: &Path) -> BTreeSet<String> {
        let sample = match read_prefix(path, KEYWORD_SAMPLE_BYTES) {
            Ok(sample) => sample,
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to read keywords: {}", e);
                return BTreeSet::new();
            }
        };
        // Invalid sequences are dropped rather than replaced.
        let text = String::from_utf8_lossy(&sample).replace('\u{FFFD}', "");

        let mut seen = HashSet::new();
        self.word_regex
            .find_iter(&text)
            .map(|word| word.as_str().to_lowercase())
            .filter(|word| word.chars().count() > 3)
            .filter(|word| seen.insert(word.clone()))
            .take(MAX_KEYWORDS)
            .collect()
    }
}

impl Default for MetadataExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Lowercased extension with leading dot, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

fn is_text_like(mime_type: &str) -> bool {
    mime_type.starts_with("text/") || DOCUMENT_MIME_TYPES.contains(&mime_type)
}

fn read_prefix(path: &Path, limit: u64) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    File::open(path)?.take(limit).read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// Content sniffing via magic numbers.
fn sniff_mime(path: &Path) -> Option<String> {
    let header = read_prefix(path, SNIFF_BYTES).ok()?;
    infer::get(&header).map(|kind| kind.mime_type().to_string())
}
