//! Disk scan engine.
//!
//! Walks a file-system subtree and matches the compiled rule set against
//! every regular file, unwrapping Office-Open-XML compound documents in
//! memory. Traversal order follows the OS directory listing and is
//! explicitly unspecified; callers must treat the resulting record SET as
//! the contract.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use walkdir::WalkDir;
use zip::ZipArchive;

use crate::core::config::ScanContext;
use crate::core::error::{Error, Result};
use crate::core::types::{MatchRecord, ResultBatch};
use crate::rules::RuleSet;
use crate::scanner::filetype::{FileClassification, FileTypeClassifier};

/// Disk scan engine.
pub struct DiskScanEngine {
    classifier: FileTypeClassifier,
}

impl Default for DiskScanEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl DiskScanEngine {
    /// Create a new disk scan engine.
    pub fn new() -> Self {
        Self {
            classifier: FileTypeClassifier::new(),
        }
    }

    /// Scan the subtree rooted at `root` and return the accumulated batch.
    ///
    /// Every per-file failure is contained: it is logged and the walk moves
    /// on to the next file. A single bad file never aborts the traversal.
    pub fn scan(&self, root: &Path, rules: &RuleSet, ctx: &ScanContext) -> ResultBatch {
        if !ctx.silent {
            log::debug!("Scanning {} with {} rule(s)", root.display(), rules.len());
        }

        let mut batch = ResultBatch::new();

        for entry in WalkDir::new(root) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    log::debug!("Skipping unreadable directory entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            match self.scan_file(entry.path(), rules, ctx) {
                Ok(Some(record)) => {
                    if !ctx.silent {
                        log::debug!("Match: {} in {}", record.rule_name(), record.subject());
                    }
                    batch.push(record);
                }
                Ok(None) => {}
                Err(e) => {
                    log::error!("Error scanning {}: {}", entry.path().display(), e);
                }
            }
        }

        batch
    }

    /// Match the rule set against one file, classified for routing.
    ///
    /// Returns at most one record per file, naming the first rule that hit
    /// and always the outer path.
    fn scan_file(
        &self,
        path: &Path,
        rules: &RuleSet,
        ctx: &ScanContext,
    ) -> Result<Option<MatchRecord>> {
        let matched = match self.classifier.classify(path) {
            FileClassification::CompoundDocument => self.match_compound(path, rules, ctx)?,
            FileClassification::RawBinary => {
                rules.first_match_file(path)?.map(|rule| rule.name.clone())
            }
        };

        Ok(matched.map(|rule_name| MatchRecord::file(rule_name, path, &ctx.hostname)))
    }

    /// Unwrap a compound document in memory and match its inner entries.
    ///
    /// Iteration stops at the first matching entry; remaining entries are
    /// not scanned. Nothing is ever extracted to disk.
    fn match_compound(
        &self,
        path: &Path,
        rules: &RuleSet,
        ctx: &ScanContext,
    ) -> Result<Option<String>> {
        let file = File::open(path).map_err(|e| Error::file_read(path, e))?;
        let mut archive = ZipArchive::new(file).map_err(|e| Error::container(path, e))?;

        let max_entry_size = ctx.scan.max_entry_size_mb * 1024 * 1024;

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).map_err(|e| Error::container(path, e))?;

            if entry.is_dir() {
                continue;
            }

            if entry.size() > max_entry_size {
                log::debug!(
                    "Skipping oversized entry '{}' in {} ({} bytes)",
                    entry.name(),
                    path.display(),
                    entry.size()
                );
                continue;
            }

            let mut content = Vec::with_capacity(entry.size() as usize);
            entry
                .read_to_end(&mut content)
                .map_err(|e| Error::container(path, e))?;

            if let Some(rule) = rules.first_match(&content) {
                return Ok(Some(rule.name.clone()));
            }
        }

        Ok(None)
    }
}
