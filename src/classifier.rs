//! Rule-based file classification.
//!
//! The [`Classifier`] maps a [`FileDescriptor`] to exactly one category key of
//! its [`RuleSet`]. Three sub-classifiers are tried in a fixed priority order:
//!
//! 1. extension (exact match against a category's extension set)
//! 2. MIME type (a category's MIME entry is a prefix of the file's MIME type)
//! 3. filename keyword (a category keyword is a case-insensitive substring)
//!
//! The first one to produce a category other than `other` wins. Within a
//! sub-classifier, categories are tried in the rule set's insertion order.
//!
//! # Examples
//!
//! ```
//! use sortmind::classifier::Classifier;
//! use sortmind::rules::RuleSet;
//!
//! let classifier = Classifier::new(RuleSet::default());
//! assert_eq!(classifier.classify_parts("art.psd", ".psd", "image/vnd.adobe.photoshop"), "design");
//! assert_eq!(classifier.classify_parts("notes.xyz", ".xyz", "application/xyz"), "other");
//! ```

use crate::extractor::FileDescriptor;
use crate::rules::{CategoryRule, RuleSet, RulesError};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Descriptors grouped by category key, in scan order within each bucket.
pub type CategorizedBuckets = BTreeMap<String, Vec<FileDescriptor>>;

/// Assigns files to categories using a [`RuleSet`].
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: RuleSet,
    store: Option<PathBuf>,
}

impl Classifier {
    /// Creates a classifier that keeps rule updates in memory only.
    pub fn new(rules: RuleSet) -> Self {
        Self { rules, store: None }
    }

    /// Creates a classifier whose rule updates are persisted to `store`.
    pub fn with_store(rules: RuleSet, store: PathBuf) -> Self {
        Self {
            rules,
            store: Some(store),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Returns the category key for a descriptor. Never fails; unknown files are `other`.
    pub fn classify(&self, descriptor: &FileDescriptor) -> &str {
        let category =
            self.classify_parts(&descriptor.name, &descriptor.extension, &descriptor.mime_type);
        tracing::debug!(file = %descriptor.name, category, "file classified");
        category
    }

    /// Classifies from the raw name, extension and MIME type of a file.
    pub fn classify_parts(&self, name: &str, extension: &str, mime_type: &str) -> &str {
        self.by_extension(extension)
            .or_else(|| self.by_mime(mime_type))
            .or_else(|| self.by_name(name))
            .unwrap_or(RuleSet::OTHER)
    }

    /// Groups descriptors into one bucket per known category.
    ///
    /// Every category of the rule set is present in the result, even when empty,
    /// and every descriptor lands in exactly one bucket.
    pub fn batch_classify<I>(&self, descriptors: I) -> CategorizedBuckets
    where
        I: IntoIterator<Item = FileDescriptor>,
    {
        let mut buckets: CategorizedBuckets = self
            .rules
            .keys()
            .map(|key| (key.to_string(), Vec::new()))
            .collect();

        for descriptor in descriptors {
            let category = self.classify(&descriptor).to_string();
            buckets.entry(category).or_default().push(descriptor);
        }

        buckets
    }

    /// Merges new category rules into the live set and persists the result.
    ///
    /// The in-memory merge always takes effect. If writing the mapping store
    /// fails, the error is logged and returned; the merged rules stay active.
    pub fn update_rules(
        &mut self,
        new_rules: impl IntoIterator<Item = (String, CategoryRule)>,
    ) -> Result<(), RulesError> {
        let new_rules: Vec<(String, CategoryRule)> = new_rules.into_iter().collect();
        let keys: Vec<String> = new_rules.iter().map(|(key, _)| key.clone()).collect();
        self.rules.merge(new_rules);
        tracing::info!(?keys, "category rules updated");

        if let Some(store) = &self.store
            && let Err(e) = self.rules.save(store)
        {
            tracing::error!("{}", e);
            return Err(e);
        }
        Ok(())
    }

    fn by_extension(&self, extension: &str) -> Option<&str> {
        if extension.is_empty() {
            return None;
        }
        let extension = extension.to_lowercase();
        self.first_match(|rule| rule.extensions.contains(&extension))
    }

    fn by_mime(&self, mime_type: &str) -> Option<&str> {
        let mime_type = mime_type.to_lowercase();
        self.first_match(|rule| {
            rule.mime_prefixes
                .iter()
                .any(|prefix| !prefix.is_empty() && mime_type.starts_with(prefix.as_str()))
        })
    }

    fn by_name(&self, name: &str) -> Option<&str> {
        let name = name.to_lowercase();
        self.first_match(|rule| rule.keywords.iter().any(|kw| name.contains(kw.as_str())))
    }

    /// First non-`other` category, in rule order, whose rule satisfies `matches`.
    fn first_match<F>(&self, matches: F) -> Option<&str>
    where
        F: Fn(&CategoryRule) -> bool,
    {
        self.rules
            .iter()
            .filter(|(key, _)| *key != RuleSet::OTHER)
            .find(|(_, rule)| matches(rule))
            .map(|(key, _)| key)
    }
}
