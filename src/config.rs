use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::catalog::{DEFAULT_FTP_BASE_URL, DEFAULT_SEARCH_URL};
use crate::domain::PubmedId;
use crate::error::FixtureError;
use crate::retry::RetryPolicy;
use crate::sampler::{DEFAULT_SEED, SampleStrategy};

pub const DEFAULT_CONFIG_FILE: &str = "gene-fixtures.json";

/// Publications known to carry gene-based summary statistics.
pub const CURATED_PUBMED_IDS: [u64; 10] = [
    34662886, 36088354, 36596879, 37592023, 39180217, 39362880, 40021682, 40073867, 36450978,
    37949852,
];

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pubmed_ids: Option<Vec<u64>>,
    #[serde(default)]
    pub accessions_path: Option<PathBuf>,
    #[serde(default)]
    pub accession_bucket: Option<String>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default)]
    pub url_cache_path: Option<PathBuf>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub sampling: Option<SampleStrategy>,
    #[serde(default)]
    pub discovery_workers: Option<usize>,
    #[serde(default)]
    pub sampling_workers: Option<usize>,
    #[serde(default)]
    pub parallel: Option<bool>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub ftp_base_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<usize>,
    #[serde(default)]
    pub min_delay_secs: Option<f64>,
    #[serde(default)]
    pub max_delay_secs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Endpoints {
    pub search_url: String,
    pub ftp_base_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.to_string(),
            ftp_base_url: DEFAULT_FTP_BASE_URL.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub pubmed_ids: Vec<PubmedId>,
    pub accessions_path: Option<PathBuf>,
    pub accession_bucket: String,
    pub output_dir: PathBuf,
    pub url_cache_path: PathBuf,
    pub seed: u64,
    pub sampling: SampleStrategy,
    pub discovery_workers: usize,
    pub sampling_workers: usize,
    pub parallel: bool,
    pub retry: RetryPolicy,
    pub endpoints: Endpoints,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            pubmed_ids: CURATED_PUBMED_IDS.iter().copied().map(PubmedId::new).collect(),
            accessions_path: Some(PathBuf::from("gcsts.txt")),
            accession_bucket: "gcsts".to_string(),
            output_dir: PathBuf::from("tests/data"),
            url_cache_path: PathBuf::from("urls.json"),
            seed: DEFAULT_SEED,
            sampling: SampleStrategy::default(),
            discovery_workers: 5,
            sampling_workers: 10,
            parallel: true,
            retry: RetryPolicy::catalog(),
            endpoints: Endpoints::default(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load `path`, or `gene-fixtures.json` when present, or the defaults.
    pub fn resolve(path: Option<&Path>) -> Result<ResolvedConfig, FixtureError> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FixtureError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FixtureError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FixtureError> {
        let defaults = ResolvedConfig::default();

        let pubmed_ids = config
            .pubmed_ids
            .map(|ids| ids.into_iter().map(PubmedId::new).collect())
            .unwrap_or(defaults.pubmed_ids);

        let sampling = config.sampling.unwrap_or(defaults.sampling);
        sampling.validate()?;

        let discovery_workers = config
            .discovery_workers
            .unwrap_or(defaults.discovery_workers);
        let sampling_workers = config.sampling_workers.unwrap_or(defaults.sampling_workers);
        if discovery_workers == 0 || sampling_workers == 0 {
            return Err(FixtureError::ConfigParse(
                "worker counts must be at least 1".to_string(),
            ));
        }

        let retry = match config.retry {
            Some(retry) => resolve_retry(retry, defaults.retry)?,
            None => defaults.retry,
        };

        let accession_bucket = config
            .accession_bucket
            .unwrap_or(defaults.accession_bucket);
        if accession_bucket.trim().is_empty() || accession_bucket.contains(['/', '\\']) {
            return Err(FixtureError::ConfigParse(format!(
                "invalid accession bucket name: {accession_bucket:?}"
            )));
        }

        Ok(ResolvedConfig {
            pubmed_ids,
            accessions_path: match config.accessions_path {
                // An empty path switches the curated accession list off.
                Some(path) if path.as_os_str().is_empty() => None,
                Some(path) => Some(path),
                None => defaults.accessions_path,
            },
            accession_bucket,
            output_dir: config.output_dir.unwrap_or(defaults.output_dir),
            url_cache_path: config.url_cache_path.unwrap_or(defaults.url_cache_path),
            seed: config.seed.unwrap_or(defaults.seed),
            sampling,
            discovery_workers,
            sampling_workers,
            parallel: config.parallel.unwrap_or(defaults.parallel),
            retry,
            endpoints: Endpoints {
                search_url: config.search_url.unwrap_or(defaults.endpoints.search_url),
                ftp_base_url: config
                    .ftp_base_url
                    .unwrap_or(defaults.endpoints.ftp_base_url),
            },
        })
    }
}

fn resolve_retry(retry: RetryConfig, defaults: RetryPolicy) -> Result<RetryPolicy, FixtureError> {
    let max_attempts = retry.max_attempts.unwrap_or(defaults.max_attempts);
    if max_attempts == 0 {
        return Err(FixtureError::ConfigParse(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }
    let to_duration = |secs: Option<f64>, default: Duration, field: &str| match secs {
        None => Ok(default),
        Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
            FixtureError::ConfigParse(format!(
                "retry.{field} must be a non-negative number of seconds, got {secs}"
            ))
        }),
    };
    let min_delay = to_duration(retry.min_delay_secs, defaults.min_delay, "min_delay_secs")?;
    let max_delay = to_duration(retry.max_delay_secs, defaults.max_delay, "max_delay_secs")?;
    if max_delay < min_delay {
        return Err(FixtureError::ConfigParse(
            "retry.max_delay_secs must not be below retry.min_delay_secs".to_string(),
        ));
    }
    Ok(RetryPolicy {
        max_attempts,
        min_delay,
        max_delay,
        multiplier: defaults.multiplier,
    })
}
