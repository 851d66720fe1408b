//! Category rules and the mapping store they are persisted in.
//!
//! A [`RuleSet`] maps category keys (e.g. `"document"`) to the signatures that
//! identify files of that category: extensions, MIME prefixes and filename
//! keywords. Rule sets are stored as JSON:
//!
//! ```json
//! {
//!   "design": {
//!     "name": "Design",
//!     "extensions": [".psd", ".ai"],
//!     "mime_types": ["image/vnd.adobe.photoshop"],
//!     "keywords": ["mockup"]
//!   }
//! }
//! ```
//!
//! # Examples
//!
//! ```
//! use sortmind::rules::RuleSet;
//!
//! let rules = RuleSet::default();
//! assert!(rules.contains("design"));
//! assert!(rules.contains(RuleSet::OTHER));
//! ```

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading or writing the mapping store.
#[derive(Debug, Error)]
pub enum RulesError {
    /// The mapping store could not be read.
    #[error("failed to read category mappings {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The mapping store could not be written.
    #[error("failed to write category mappings {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    /// The mapping store is not valid JSON for a rule set.
    #[error("invalid category mappings {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// The rule set could not be serialized.
    #[error("failed to serialize category mappings: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result type for rule store operations.
pub type RulesResult<T> = Result<T, RulesError>;

/// Signatures identifying one category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    /// Human-readable category name.
    #[serde(rename = "name", default)]
    pub display_name: String,
    /// Lowercase extensions with a leading dot.
    #[serde(default)]
    pub extensions: BTreeSet<String>,
    /// A MIME entry matches any MIME type starting with it.
    #[serde(rename = "mime_types", default)]
    pub mime_prefixes: BTreeSet<String>,
    /// Case-insensitive filename substrings.
    #[serde(default)]
    pub keywords: BTreeSet<String>,
}

impl CategoryRule {
    /// Creates an empty rule with the given display name.
    pub fn named(display_name: &str) -> Self {
        Self {
            display_name: display_name.to_string(),
            ..Default::default()
        }
    }

    /// Adds extensions, normalizing them to `.ext` lowercase form.
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions
            .extend(extensions.iter().map(|ext| normalize_extension(ext)));
        self
    }

    pub fn with_mime_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.mime_prefixes
            .extend(prefixes.iter().map(|mime| mime.to_lowercase()));
        self
    }

    pub fn with_keywords(mut self, keywords: &[&str]) -> Self {
        self.keywords
            .extend(keywords.iter().map(|kw| kw.to_lowercase()));
        self
    }

    fn normalize(&mut self) {
        self.extensions = self
            .extensions
            .iter()
            .filter(|ext| !ext.trim().is_empty())
            .map(|ext| normalize_extension(ext))
            .collect();
        self.mime_prefixes = self.mime_prefixes.iter().map(|m| m.to_lowercase()).collect();
        self.keywords = self
            .keywords
            .iter()
            .filter(|kw| !kw.is_empty())
            .map(|kw| kw.to_lowercase())
            .collect();
    }
}

/// Normalizes an extension to lowercase with exactly one leading dot.
///
/// ```
/// use sortmind::rules::normalize_extension;
///
/// assert_eq!(normalize_extension("PDF"), ".pdf");
/// assert_eq!(normalize_extension(".Psd"), ".psd");
/// ```
pub fn normalize_extension(ext: &str) -> String {
    format!(".{}", ext.trim().trim_start_matches('.').to_lowercase())
}

/// The mapping from category keys to their rules.
///
/// Keys are unique and the catch-all [`RuleSet::OTHER`] category always exists
/// and is kept last. Iteration follows insertion order, which for a loaded store
/// is the order of its JSON entries. Categories are tried in this order during
/// classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    categories: IndexMap<String, CategoryRule>,
}

impl RuleSet {
    /// Key of the catch-all category.
    pub const OTHER: &'static str = "other";

    /// Builds a rule set from explicit categories, adding `other` if missing.
    pub fn new(categories: impl IntoIterator<Item = (String, CategoryRule)>) -> Self {
        let mut rules = Self {
            categories: categories.into_iter().collect(),
        };
        rules.normalize();
        rules
    }

    /// Loads a rule set from a JSON mapping store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed. Callers that
    /// want the built-in fallback should use [`RuleSet::load_or_default`].
    pub fn load(path: &Path) -> RulesResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| RulesError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let categories: IndexMap<String, CategoryRule> =
            serde_json::from_str(&content).map_err(|source| RulesError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::new(categories))
    }

    /// Loads the mapping store, falling back to the built-in defaults on any failure.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(rules) => {
                tracing::info!(path = %path.display(), categories = rules.len(), "category mappings loaded");
                rules
            }
            Err(e) => {
                tracing::warn!("{}; using built-in category mappings", e);
                Self::default()
            }
        }
    }

    /// Writes the rule set to a JSON mapping store, creating parent directories.
    pub fn save(&self, path: &Path) -> RulesResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| RulesError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        fs::write(path, json).map_err(|source| RulesError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Merges `updates` into this set. Existing keys are replaced whole and keep
    /// their position; new keys are appended.
    pub fn merge(&mut self, updates: impl IntoIterator<Item = (String, CategoryRule)>) {
        self.categories.extend(updates);
        self.normalize();
    }

    pub fn contains(&self, key: &str) -> bool {
        self.categories.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<&CategoryRule> {
        self.categories.get(key)
    }

    /// Category keys in evaluation order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.categories.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &CategoryRule)> {
        self.categories.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    fn normalize(&mut self) {
        for rule in self.categories.values_mut() {
            rule.normalize();
        }
        let other = self
            .categories
            .shift_remove(Self::OTHER)
            .unwrap_or_else(|| CategoryRule::named("Other"));
        self.categories.insert(Self::OTHER.to_string(), other);
    }
}

impl Default for RuleSet {
    /// The built-in rule set used when no mapping store is available.
    fn default() -> Self {
        let mut categories = IndexMap::new();
        categories.insert(
            "document".to_string(),
            CategoryRule::named("Documents")
                .with_extensions(&[
                    ".pdf", ".doc", ".docx", ".txt", ".rtf", ".xls", ".xlsx", ".ppt", ".pptx",
                ])
                .with_mime_prefixes(&["application/pdf", "application/msword", "text/plain"])
                .with_keywords(&["invoice", "report", "resume", "contract", "receipt"]),
        );
        categories.insert(
            "media".to_string(),
            CategoryRule::named("Media")
                .with_extensions(&[".jpg", ".jpeg", ".png", ".gif", ".mp4", ".mp3", ".wav"])
                .with_mime_prefixes(&["image/", "video/", "audio/"])
                .with_keywords(&["photo", "screenshot", "recording"]),
        );
        categories.insert(
            "code".to_string(),
            CategoryRule::named("Code")
                .with_extensions(&[
                    ".py", ".js", ".html", ".css", ".java", ".cpp", ".c", ".php",
                ])
                .with_mime_prefixes(&["text/x-python", "application/javascript", "text/html"])
                .with_keywords(&["script", "source"]),
        );
        categories.insert(
            "design".to_string(),
            CategoryRule::named("Design")
                .with_extensions(&[".psd", ".ai", ".svg", ".sketch", ".fig", ".xd"])
                .with_mime_prefixes(&[
                    "image/vnd.adobe.photoshop",
                    "application/postscript",
                    "image/svg+xml",
                ])
                .with_keywords(&["mockup", "logo", "wireframe"]),
        );
        categories.insert(
            "archive".to_string(),
            CategoryRule::named("Archives")
                .with_extensions(&[".zip", ".rar", ".7z", ".tar", ".gz"])
                .with_mime_prefixes(&[
                    "application/zip",
                    "application/x-rar-compressed",
                    "application/x-7z-compressed",
                ])
                .with_keywords(&["backup"]),
        );
        categories.insert(RuleSet::OTHER.to_string(), CategoryRule::named("Other"));
        Self::new(categories)
    }
}
