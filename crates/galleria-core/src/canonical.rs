//! Path canonicalization across historical extension rewrites.
//!
//! The downloader once recorded animated works with one extension and later
//! wrote them with another, without always updating the catalog. A recorded
//! path therefore names a *set* of physically plausible files, and a file on
//! disk may be referenced under any of its older names. Every existence check
//! and every orphan match must consider the whole set.
//!
//! The rewrite history is a versioned rule table so a future format change is
//! one more row, not new code.

use std::path::{Path, PathBuf};

/// One historical extension rewrite: files once recorded as `legacy` are
/// written as `current` from `version` on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    pub version: u32,
    pub legacy: String,
    pub current: String,
}

impl RewriteRule {
    pub fn new(version: u32, legacy: impl Into<String>, current: impl Into<String>) -> Self {
        Self {
            version,
            legacy: legacy.into(),
            current: current.into(),
        }
    }
}

/// Ordered set of rewrite rules, oldest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteTable {
    rules: Vec<RewriteRule>,
}

impl RewriteTable {
    pub fn new(mut rules: Vec<RewriteRule>) -> Self {
        rules.sort_by_key(|r| r.version);
        Self { rules }
    }

    /// A table with no rewrites; every path canonicalizes to itself.
    pub fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }
}

impl Default for RewriteTable {
    fn default() -> Self {
        Self::new(vec![RewriteRule::new(1, "zip", "gif")])
    }
}

/// Maps recorded paths to physical candidates and back.
#[derive(Debug, Clone, Default)]
pub struct PathCanonicalizer {
    table: RewriteTable,
}

impl PathCanonicalizer {
    pub fn new(table: RewriteTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RewriteTable {
        &self.table
    }

    /// Every physical path a recorded path may denote, current convention
    /// first and the recorded form last.
    ///
    /// A path without a legacy extension yields only itself.
    pub fn candidates(&self, recorded: &Path) -> Vec<PathBuf> {
        let mut chain = vec![recorded.to_path_buf()];
        // Follow rules forward: zip -> gif -> (a later rule on gif) ...
        for rule in &self.table.rules {
            let last = chain.last().cloned().unwrap_or_default();
            if has_extension(&last, &rule.legacy) {
                push_unique(&mut chain, last.with_extension(&rule.current));
            }
        }
        chain.reverse();
        chain
    }

    /// Every form under which a file on disk may have been recorded, the
    /// physical form first and older forms after it.
    pub fn recorded_forms(&self, physical: &Path) -> Vec<PathBuf> {
        let mut forms = vec![physical.to_path_buf()];
        for rule in self.table.rules.iter().rev() {
            let last = forms.last().cloned().unwrap_or_default();
            if has_extension(&last, &rule.current) {
                push_unique(&mut forms, last.with_extension(&rule.legacy));
            }
        }
        forms
    }

    /// First candidate accepted by `exists`, in priority order.
    pub fn resolve<F>(&self, recorded: &Path, exists: F) -> Option<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        self.candidates(recorded).into_iter().find(|c| exists(c))
    }

    /// The current-convention form of a recorded path, if any rule applies.
    pub fn current_form(&self, recorded: &Path) -> Option<PathBuf> {
        let candidates = self.candidates(recorded);
        if candidates.len() > 1 {
            candidates.into_iter().next()
        } else {
            None
        }
    }
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(ext))
        .unwrap_or(false)
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}
