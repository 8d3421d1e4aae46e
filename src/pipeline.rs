use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{CachedUrls, UrlCache};
use crate::catalog::CatalogClient;
use crate::config::ResolvedConfig;
use crate::domain::{Accession, PubmedId, directory_url};
use crate::error::FixtureError;
use crate::fs_util;
use crate::listing;
use crate::locator;
use crate::pool::WorkerPool;
use crate::sampler::{SampleOutcome, Sampler, SourceOpener};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Regenerate samples that already exist.
    pub overwrite: bool,
    /// Ignore cached URLs and query the catalog again.
    pub refresh: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Discovery {
    pub targets: Vec<CachedUrls>,
    pub from_cache: usize,
    pub from_catalog: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SampleRecord {
    pub id: String,
    pub url: String,
    pub output: String,
    #[serde(flatten)]
    pub outcome: SampleOutcome,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub discovered_from_cache: usize,
    pub discovered_from_catalog: usize,
    pub written: usize,
    pub skipped: usize,
    pub outputs: Vec<SampleRecord>,
}

struct SampleJob {
    id: String,
    url: String,
    output: PathBuf,
}

pub struct Pipeline<C: CatalogClient, S: SourceOpener, K: UrlCache> {
    config: ResolvedConfig,
    catalog: C,
    sampler: Sampler<S>,
    cache: K,
}

impl<C: CatalogClient, S: SourceOpener, K: UrlCache> Pipeline<C, S, K> {
    pub fn new(config: ResolvedConfig, catalog: C, sampler: Sampler<S>, cache: K) -> Self {
        Self {
            config,
            catalog,
            sampler,
            cache,
        }
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn run(&self, options: RunOptions) -> Result<RunSummary, FixtureError> {
        let discovery = self.discover(options.refresh)?;
        let outputs = self.sample_all(&discovery.targets, options.overwrite)?;

        let written = outputs
            .iter()
            .filter(|r| matches!(r.outcome, SampleOutcome::Written { .. }))
            .count();
        let skipped = outputs.len() - written;
        info!(written, skipped, "run complete");
        Ok(RunSummary {
            discovered_from_cache: discovery.from_cache,
            discovered_from_catalog: discovery.from_catalog,
            written,
            skipped,
            outputs,
        })
    }

    /// Data file URLs for the accession bucket and every publication, from
    /// the cache where possible and from the catalog otherwise.
    pub fn discover(&self, refresh: bool) -> Result<Discovery, FixtureError> {
        let pool = self.pool("discovery", self.config.discovery_workers);
        let mut discovery = Discovery::default();

        if let Some(path) = &self.config.accessions_path {
            let key = self.config.accession_bucket.as_str();
            let urls = match self.cached(key, refresh)? {
                Some(urls) => {
                    discovery.from_cache += 1;
                    urls
                }
                None => {
                    let accessions = read_accession_list(path)?;
                    info!(count = accessions.len(), "resolving curated accessions");
                    let urls = pool.install(|| {
                        accessions
                            .par_iter()
                            .map(|acc| self.resolve_accession(acc))
                            .collect::<Result<Vec<_>, _>>()
                    })??;
                    self.cache.store(key, &urls)?;
                    discovery.from_catalog += 1;
                    urls
                }
            };
            discovery.targets.push(CachedUrls {
                id: key.to_string(),
                urls,
            });
        }

        let mut pending = Vec::new();
        let mut cached = Vec::new();
        for pubmed_id in &self.config.pubmed_ids {
            match self.cached(&pubmed_id.to_string(), refresh)? {
                Some(urls) => cached.push((*pubmed_id, urls)),
                None => pending.push(*pubmed_id),
            }
        }
        discovery.from_cache += cached.len();

        let fetched = pool.install(|| {
            pending
                .par_iter()
                .map(|id| self.discover_publication(*id).map(|urls| (*id, urls)))
                .collect::<Result<Vec<_>, _>>()
        })??;
        for (pubmed_id, urls) in &fetched {
            self.cache.store(&pubmed_id.to_string(), urls)?;
        }
        discovery.from_catalog += fetched.len();

        for pubmed_id in &self.config.pubmed_ids {
            let urls = cached
                .iter()
                .chain(fetched.iter())
                .find(|(id, _)| id == pubmed_id)
                .map(|(_, urls)| urls.clone())
                .unwrap_or_default();
            discovery.targets.push(CachedUrls {
                id: pubmed_id.to_string(),
                urls,
            });
        }

        Ok(discovery)
    }

    /// Gene-based data file URLs of one publication.
    ///
    /// A publication on the curated list with no gene-based studies means
    /// the catalog changed or the list is wrong, so it aborts the run.
    pub fn discover_publication(&self, pubmed_id: PubmedId) -> Result<Vec<String>, FixtureError> {
        let links =
            locator::locate_gene_based_studies(&self.catalog, pubmed_id, &self.config.retry)?;
        if links.is_empty() {
            return Err(FixtureError::NoGeneBasedStudies(pubmed_id.get()));
        }
        info!(%pubmed_id, studies = links.len(), "located gene-based studies");
        links
            .par_iter()
            .map(|link| {
                let accession = Accession::extract(link)?;
                self.resolve_accession(&accession)
            })
            .collect()
    }

    pub fn resolve_accession(&self, accession: &Accession) -> Result<String, FixtureError> {
        let directory = directory_url(&self.config.endpoints.ftp_base_url, accession);
        listing::resolve_data_file_url(&self.catalog, &directory, &self.config.retry)
    }

    /// Sample every discovered URL into `output_dir/<id>/`.
    pub fn sample_all(
        &self,
        targets: &[CachedUrls],
        overwrite: bool,
    ) -> Result<Vec<SampleRecord>, FixtureError> {
        let mut seen = HashSet::new();
        let mut jobs = Vec::new();
        for target in targets {
            let dir = self.config.output_dir.join(&target.id);
            fs_util::ensure_dir(&dir)?;
            for url in &target.urls {
                let output = dir.join(sample_file_name(url));
                if !seen.insert(output.clone()) {
                    warn!(url = %url, output = %output.display(), "duplicate sample output, skipping");
                    continue;
                }
                jobs.push(SampleJob {
                    id: target.id.clone(),
                    url: url.clone(),
                    output,
                });
            }
        }

        info!(jobs = jobs.len(), "sampling summary statistics");
        let pool = self.pool("sampling", self.config.sampling_workers);
        pool.install(|| {
            jobs.par_iter()
                .map(|job| {
                    let outcome = self.sampler.sample(&job.url, &job.output, overwrite)?;
                    Ok(SampleRecord {
                        id: job.id.clone(),
                        url: job.url.clone(),
                        output: job.output.display().to_string(),
                        outcome,
                    })
                })
                .collect::<Result<Vec<_>, FixtureError>>()
        })?
    }

    fn cached(&self, key: &str, refresh: bool) -> Result<Option<Vec<String>>, FixtureError> {
        if refresh {
            return Ok(None);
        }
        let urls = self.cache.load(key)?;
        if urls.is_some() {
            info!(key, "using cached urls");
        }
        Ok(urls)
    }

    fn pool(&self, name: &'static str, workers: usize) -> WorkerPool {
        if self.config.parallel {
            WorkerPool::new(name, workers)
        } else {
            WorkerPool::sequential(name)
        }
    }
}

/// Curated accession list: a header line, then one accession per line.
pub fn read_accession_list(path: &Path) -> Result<Vec<Accession>, FixtureError> {
    let content =
        fs::read_to_string(path).map_err(|_| FixtureError::ConfigRead(path.to_path_buf()))?;
    content
        .lines()
        .skip(1)
        .filter(|line| !line.trim().is_empty())
        .map(Accession::extract)
        .collect()
}

/// `<stem>.tsv.gz`, where the stem is the URL basename up to its first `.`.
pub fn sample_file_name(url: &str) -> String {
    let basename = url.rsplit('/').next().unwrap_or(url).trim();
    let stem = basename.split('.').next().unwrap_or(basename);
    format!("{stem}.tsv.gz")
}
