use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FixtureError;

static ACCESSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"GCST(\d+)").expect("accession pattern is valid"));

/// Width of one FTP bucket of accessions.
pub const BUCKET_WIDTH: u64 = 1000;

/// Largest accession number whose bucket still fits in a `u64`.
pub const MAX_ACCESSION_NUMBER: u64 = u64::MAX - BUCKET_WIDTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PubmedId(u64);

impl PubmedId {
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PubmedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PubmedId {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(Self)
            .map_err(|_| FixtureError::InvalidPubmedId(value.to_string()))
    }
}

/// A GWAS Catalog study accession such as `GCST90083565`.
///
/// Parsing searches the input for the first accession, so study links
/// (`.../studies/GCST90083565`) and padded list lines are accepted too.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Accession {
    id: String,
    number: u64,
}

impl Accession {
    pub fn extract(text: &str) -> Result<Self, FixtureError> {
        let captures = ACCESSION_RE
            .captures(text)
            .ok_or_else(|| FixtureError::MalformedAccession(text.trim().to_string()))?;
        let id = captures[0].to_string();
        let number = captures[1]
            .parse::<u64>()
            .ok()
            .filter(|n| *n > 0 && *n <= MAX_ACCESSION_NUMBER)
            .ok_or_else(|| FixtureError::MalformedAccession(text.trim().to_string()))?;
        Ok(Self { id, number })
    }

    pub fn as_str(&self) -> &str {
        &self.id
    }

    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn directory_range(&self) -> DirectoryRange {
        DirectoryRange::containing(self.number)
    }
}

impl fmt::Display for Accession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl FromStr for Accession {
    type Err = FixtureError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::extract(value)
    }
}

/// The FTP bucket holding an accession: `lower..=upper`, 1000 wide, with
/// `upper` a multiple of 1000.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirectoryRange {
    pub lower: u64,
    pub upper: u64,
}

impl DirectoryRange {
    /// Multiples of 1000 close the preceding bucket, so 90083000 lands in
    /// 90082001..=90083000.
    pub fn containing(number: u64) -> Self {
        let n = if number % BUCKET_WIDTH == 0 {
            number.saturating_sub(1)
        } else {
            number
        };
        let lower = (n / BUCKET_WIDTH) * BUCKET_WIDTH + 1;
        Self {
            lower,
            upper: lower + BUCKET_WIDTH - 1,
        }
    }

    pub fn contains(&self, number: u64) -> bool {
        (self.lower..=self.upper).contains(&number)
    }

    pub fn folder_name(&self) -> String {
        format!("GCST{:08}-GCST{:08}", self.lower, self.upper)
    }
}

/// Directory on the FTP mirror expected to contain the accession's data file.
pub fn directory_url(ftp_base_url: &str, accession: &Accession) -> String {
    format!(
        "{}/{}/{}",
        ftp_base_url.trim_end_matches('/'),
        accession.directory_range().folder_name(),
        accession.as_str()
    )
}
