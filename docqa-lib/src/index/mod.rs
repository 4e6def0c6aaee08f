//! File ingestion
//!
//! Reads text files, normalizes them, cuts them into units and inserts the
//! units into a store. A failing file never stops the run: every outcome is
//! recorded in the returned [`IndexReport`].
//!
//! # Usage
//!
//! ```ignore
//! use docqa_lib::index::{collect_text_files, Indexer};
//!
//! let indexer = Indexer::new(FixedSizeChunker::default());
//! let files = collect_text_files("data/docs", "txt")?;
//! let report = indexer.index(&mut store, &files);
//! println!("{} new units, {} failures", report.units.len(), report.failures.len());
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::chunk::{Chunker, FixedSizeChunker, TextUnit, UnitMetadata};
use crate::store::DocumentStore;
use crate::{Error, Result};

/// A file that could not be indexed
#[derive(Debug)]
pub struct IndexFailure {
    pub path: PathBuf,
    pub error: Error,
}

/// Outcome of one indexing run
#[derive(Debug, Default)]
pub struct IndexReport {
    /// Units inserted by this run, in insertion order
    pub units: Vec<TextUnit>,
    /// Ids that were already in the store
    pub skipped: Vec<String>,
    /// Files that could not be read
    pub failures: Vec<IndexFailure>,
}

impl IndexReport {
    /// Returns `true` if every file was read.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    fn merge(&mut self, other: IndexReport) {
        self.units.extend(other.units);
        self.skipped.extend(other.skipped);
        self.failures.extend(other.failures);
    }
}

/// Turns files into text units
pub struct Indexer<C: Chunker = FixedSizeChunker> {
    chunker: C,
}

impl<C: Chunker> Indexer<C> {
    #[must_use]
    pub fn new(chunker: C) -> Self {
        Self { chunker }
    }

    /// Returns a reference to the chunker.
    #[must_use]
    pub fn chunker(&self) -> &C {
        &self.chunker
    }

    /// Index files into the store.
    ///
    /// Unreadable files are reported as failures; units already present are
    /// reported as skipped.
    pub fn index<S, P>(&self, store: &mut S, paths: &[P]) -> IndexReport
    where
        S: DocumentStore + ?Sized,
        P: AsRef<Path>,
    {
        let mut report = IndexReport::default();

        for path in paths {
            let path = path.as_ref();
            match fs::read_to_string(path) {
                Ok(content) => {
                    let source = path.display().to_string();
                    report.merge(self.index_text(store, Some(&source), &content));
                }
                Err(source) => {
                    warn!(path = %path.display(), error = %source, "skipping unreadable file");
                    report.failures.push(IndexFailure {
                        path: path.to_path_buf(),
                        error: Error::Io {
                            path: path.to_path_buf(),
                            source,
                        },
                    });
                }
            }
        }

        info!(
            files = paths.len(),
            units = report.units.len(),
            skipped = report.skipped.len(),
            failures = report.failures.len(),
            "indexing finished"
        );
        report
    }

    /// Index in-memory content under an optional source name.
    pub fn index_text<S>(&self, store: &mut S, source: Option<&str>, content: &str) -> IndexReport
    where
        S: DocumentStore + ?Sized,
    {
        let mut report = IndexReport::default();

        let text = normalize(content);
        let metadata = UnitMetadata {
            source: source.map(str::to_string),
            ..Default::default()
        };
        let units = self.chunker.chunk(&text, metadata);
        debug!(
            source = source.unwrap_or("<inline>"),
            units = units.len(),
            chunker = self.chunker.name(),
            "chunked"
        );

        for unit in units {
            match store.insert(unit.clone()) {
                Ok(()) => report.units.push(unit),
                Err(Error::AlreadyIndexed(id)) => {
                    debug!(%id, "already indexed");
                    report.skipped.push(id);
                }
                Err(error) => report.failures.push(IndexFailure {
                    path: PathBuf::from(source.unwrap_or_default()),
                    error,
                }),
            }
        }

        report
    }
}

impl Default for Indexer {
    fn default() -> Self {
        Self::new(FixedSizeChunker::default())
    }
}

/// Clean up raw text before chunking.
///
/// Strips a byte-order mark, unifies line endings, trims every line and
/// collapses runs of blank lines into one.
pub fn normalize(text: &str) -> String {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut out = String::with_capacity(text.len());
    let mut blank_run = false;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run = !out.is_empty();
            continue;
        }
        if !out.is_empty() {
            out.push_str(if blank_run { "\n\n" } else { "\n" });
        }
        out.push_str(line);
        blank_run = false;
    }

    out
}

/// List files with the given extension in a directory, sorted by path.
pub fn collect_text_files(dir: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let io_error = |source| Error::Io {
        path: dir.to_path_buf(),
        source,
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error)? {
        let path = entry.map_err(io_error)?.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            files.push(path);
        }
    }
    files.sort();

    Ok(files)
}
