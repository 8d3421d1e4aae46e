use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FixtureError {
    #[error("malformed GCST accession: {0}")]
    MalformedAccession(String),

    #[error("invalid pubmed id: {0}")]
    InvalidPubmedId(String),

    #[error("request to {url} failed: {message}")]
    Http { url: String, message: String },

    #[error("{url} returned status {status}: {message}")]
    UpstreamUnavailable {
        url: String,
        status: u16,
        message: String,
    },

    #[error("unexpected catalog response from {url}: {message}")]
    CatalogResponse { url: String, message: String },

    #[error("couldn't find a TSV file in the directory listing at {0}")]
    ListingParse(String),

    #[error("pubmed id {0} has no gene-based studies; the curated list or the catalog changed")]
    NoGeneBasedStudies(u64),

    #[error("sample {} has {lines} line(s), expected a header and at least one row", .path.display())]
    SampleIntegrity { path: PathBuf, lines: usize },

    #[error("failed to read tab-delimited rows from {source_path}: {message}")]
    SourceParse {
        source_path: String,
        message: String,
    },

    #[error("invalid sampling strategy: {0}")]
    InvalidStrategy(String),

    #[error("{0}")]
    RowValidation(RowViolations),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("failed to parse URL cache {}: {message}", .path.display())]
    CacheParse { path: PathBuf, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("worker pool error: {0}")]
    WorkerPool(String),
}

impl FixtureError {
    /// Errors worth another attempt against the same endpoint.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FixtureError::Http { .. } | FixtureError::UpstreamUnavailable { .. }
        )
    }
}

/// One broken constraint of a row.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub field: &'static str,
    pub constraint: String,
    pub actual: Option<String>,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actual {
            Some(value) => write!(
                f,
                "{}: expected {}, got {:?}",
                self.field, self.constraint, value
            ),
            None => write!(f, "{}: expected {}, field missing", self.field, self.constraint),
        }
    }
}

/// Every violation found in a single row, optionally tied to a file line.
#[derive(Debug, Clone, PartialEq)]
pub struct RowViolations {
    pub line: Option<usize>,
    pub violations: Vec<Violation>,
}

impl RowViolations {
    pub fn fields(&self) -> Vec<&'static str> {
        self.violations.iter().map(|v| v.field).collect()
    }
}

impl fmt::Display for RowViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "row at line {line} failed validation")?,
            None => write!(f, "row failed validation")?,
        }
        for (i, violation) in self.violations.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{violation}")?;
        }
        Ok(())
    }
}
