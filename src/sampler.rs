//! Reproducible row sampling of (possibly remote, possibly gzipped) TSV files.
//!
//! A sample keeps the source header and a seeded random subset of its rows,
//! and is written gzip-compressed with a zeroed header timestamp so the same
//! seed and source always produce the same bytes.

use std::fs::{self, File};
use std::io::{BufRead, Read};
use std::path::Path;
use std::time::Duration;

use csv::{ByteRecord, QuoteStyle, ReaderBuilder, WriterBuilder};
use flate2::Compression;
use flate2::write::GzEncoder;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::catalog::build_client;
use crate::error::FixtureError;
use crate::fs_util;

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RESERVOIR_ROWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum SampleStrategy {
    /// Fixed-size uniform sample.
    Reservoir { rows: usize },
    /// Each row kept independently with probability `percent / 100`.
    Percentage { percent: f64 },
}

impl Default for SampleStrategy {
    fn default() -> Self {
        SampleStrategy::Reservoir {
            rows: DEFAULT_RESERVOIR_ROWS,
        }
    }
}

impl SampleStrategy {
    pub fn validate(&self) -> Result<(), FixtureError> {
        match *self {
            SampleStrategy::Reservoir { rows } if rows == 0 => Err(
                FixtureError::InvalidStrategy("reservoir needs at least one row".to_string()),
            ),
            SampleStrategy::Percentage { percent } if !(percent > 0.0 && percent <= 100.0) => {
                Err(FixtureError::InvalidStrategy(format!(
                    "percentage must be in (0, 100], got {percent}"
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Where sample sources come from.
pub trait SourceOpener: Send + Sync {
    fn open(&self, source: &str) -> Result<Box<dyn Read + Send>, FixtureError>;
}

/// Streams `http(s)://` sources with reqwest and everything else from disk.
#[derive(Clone)]
pub struct HttpSourceOpener {
    client: Client,
}

impl HttpSourceOpener {
    pub fn new() -> Result<Self, FixtureError> {
        Ok(Self {
            client: build_client(None)?,
        })
    }
}

impl SourceOpener for HttpSourceOpener {
    fn open(&self, source: &str) -> Result<Box<dyn Read + Send>, FixtureError> {
        if !(source.starts_with("http://") || source.starts_with("https://")) {
            let file = File::open(source)
                .map_err(|err| FixtureError::Filesystem(format!("open {source}: {err}")))?;
            return Ok(Box::new(file));
        }

        let response = self
            .client
            .get(source)
            .send()
            .map_err(|err| FixtureError::Http {
                url: source.to_string(),
                message: err.to_string(),
            })?;
        if !response.status().is_success() {
            return Err(FixtureError::UpstreamUnavailable {
                url: source.to_string(),
                status: response.status().as_u16(),
                message: "download failed".to_string(),
            });
        }
        Ok(Box::new(response))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum SampleOutcome {
    Skipped { lines: usize },
    Written { rows: usize },
}

#[derive(Debug)]
pub struct Sampler<S: SourceOpener> {
    opener: S,
    strategy: SampleStrategy,
    seed: u64,
}

impl<S: SourceOpener> Sampler<S> {
    pub fn new(opener: S, strategy: SampleStrategy, seed: u64) -> Result<Self, FixtureError> {
        strategy.validate()?;
        Ok(Self {
            opener,
            strategy,
            seed,
        })
    }

    pub fn opener(&self) -> &S {
        &self.opener
    }

    /// Sample `source` into `output`.
    ///
    /// An existing output is kept unless `overwrite` is set; it is still
    /// checked, and a header-only leftover is deleted and reported so the
    /// next run starts clean.
    pub fn sample(
        &self,
        source: &str,
        output: &Path,
        overwrite: bool,
    ) -> Result<SampleOutcome, FixtureError> {
        if output.exists() && !overwrite {
            info!(output = %output.display(), "sample already exists, skipping");
            let lines = ensure_sample_integrity(output)?;
            return Ok(SampleOutcome::Skipped { lines });
        }

        let started = std::time::Instant::now();
        let reader = fs_util::maybe_gzip_reader(self.opener.open(source)?).map_err(|err| {
            FixtureError::SourceParse {
                source_path: source.to_string(),
                message: err.to_string(),
            }
        })?;
        let (header, rows) = self.draw(source, reader)?;
        write_sample(output, &header, &rows)?;
        ensure_sample_integrity(output)?;

        info!(
            source,
            output = %output.display(),
            rows = rows.len(),
            elapsed_ms = duration_ms(started.elapsed()),
            "wrote sample"
        );
        Ok(SampleOutcome::Written { rows: rows.len() })
    }

    fn draw(
        &self,
        source: &str,
        reader: Box<dyn BufRead + Send>,
    ) -> Result<(ByteRecord, Vec<ByteRecord>), FixtureError> {
        let parse_err = |err: csv::Error| FixtureError::SourceParse {
            source_path: source.to_string(),
            message: err.to_string(),
        };
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .from_reader(reader);
        let header = csv_reader.byte_headers().map_err(parse_err)?.clone();
        let records = csv_reader.into_byte_records().map(|r| r.map_err(parse_err));

        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.seed);
        let rows = match self.strategy {
            SampleStrategy::Reservoir { rows } => reservoir_sample(records, rows, &mut rng)?,
            SampleStrategy::Percentage { percent } => {
                let p = percent / 100.0;
                let mut kept = Vec::new();
                for record in records {
                    let record = record?;
                    if rng.gen_bool(p) {
                        kept.push(record);
                    }
                }
                kept
            }
        };
        Ok((header, rows))
    }
}

/// Algorithm R over `items`, returned in their original order.
pub fn reservoir_sample<T, E, I, R>(items: I, k: usize, rng: &mut R) -> Result<Vec<T>, E>
where
    I: IntoIterator<Item = Result<T, E>>,
    R: Rng,
{
    if k == 0 {
        return Ok(Vec::new());
    }
    let mut reservoir: Vec<(usize, T)> = Vec::with_capacity(k.min(1 << 16));
    for (i, item) in items.into_iter().enumerate() {
        let item = item?;
        if i < k {
            reservoir.push((i, item));
        } else {
            let j = rng.gen_range(0..=i);
            if j < k {
                reservoir[j] = (i, item);
            }
        }
    }
    reservoir.sort_by_key(|(i, _)| *i);
    Ok(reservoir.into_iter().map(|(_, item)| item).collect())
}

fn write_sample(
    output: &Path,
    header: &ByteRecord,
    rows: &[ByteRecord],
) -> Result<(), FixtureError> {
    let fs_err = |err: std::io::Error| {
        FixtureError::Filesystem(format!("write {}: {err}", output.display()))
    };
    let parent = output
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs_util::ensure_dir(parent)?;

    let temp = tempfile::Builder::new()
        .prefix(".sample")
        .tempfile_in(parent)
        .map_err(fs_err)?;
    let encoder = GzEncoder::new(temp, Compression::default());
    let mut writer = WriterBuilder::new()
        .delimiter(b'\t')
        .quote_style(QuoteStyle::Never)
        .from_writer(encoder);
    writer
        .write_byte_record(header)
        .map_err(|err| FixtureError::Filesystem(err.to_string()))?;
    for row in rows {
        writer
            .write_byte_record(row)
            .map_err(|err| FixtureError::Filesystem(err.to_string()))?;
    }
    let encoder = writer
        .into_inner()
        .map_err(|err| FixtureError::Filesystem(err.error().to_string()))?;
    let temp = encoder.finish().map_err(fs_err)?;

    if output.exists() {
        fs::remove_file(output).map_err(fs_err)?;
    }
    temp.persist(output)
        .map_err(|err| FixtureError::Filesystem(err.error.to_string()))?;
    Ok(())
}

/// Line count of a written sample; header-only, empty or unreadable files
/// are deleted and reported as [`FixtureError::SampleIntegrity`].
pub fn ensure_sample_integrity(path: &Path) -> Result<usize, FixtureError> {
    let lines = match fs_util::count_gz_lines(path) {
        Ok(lines) => lines,
        Err(err) => {
            warn!(path = %path.display(), error = %err, "unreadable sample");
            0
        }
    };
    if lines >= 2 {
        return Ok(lines);
    }
    warn!(path = %path.display(), lines, "deleting bad sample");
    fs::remove_file(path)
        .map_err(|err| FixtureError::Filesystem(format!("remove {}: {err}", path.display())))?;
    Err(FixtureError::SampleIntegrity {
        path: path.to_path_buf(),
        lines,
    })
}

fn duration_ms(elapsed: Duration) -> u64 {
    elapsed.as_millis() as u64
}
