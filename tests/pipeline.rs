use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use assert_matches::assert_matches;

use gwas_gene_fixtures::cache::{JsonFileCache, MemoryCache, UrlCache};
use gwas_gene_fixtures::catalog::{CatalogClient, StudySearchPage};
use gwas_gene_fixtures::config::ResolvedConfig;
use gwas_gene_fixtures::domain::PubmedId;
use gwas_gene_fixtures::error::FixtureError;
use gwas_gene_fixtures::pipeline::{Pipeline, RunOptions};
use gwas_gene_fixtures::retry::RetryPolicy;
use gwas_gene_fixtures::sampler::{SampleOutcome, SampleStrategy, Sampler, SourceOpener};
use gwas_gene_fixtures::schema::validate_sumstat_file;

const FTP: &str = "http://ftp.test/summary_statistics";
const PUBMED: u64 = 34662886;

#[derive(Clone, Default)]
struct FakeCatalog {
    /// Pubmed id to (trait, accession) pairs, all on one page.
    studies: HashMap<u64, Vec<(&'static str, &'static str)>>,
    calls: Arc<AtomicUsize>,
}

impl CatalogClient for FakeCatalog {
    fn search_studies(
        &self,
        pubmed_id: PubmedId,
        _page: u32,
        _size: u32,
    ) -> Result<StudySearchPage, FixtureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let studies: Vec<String> = self
            .studies
            .get(&pubmed_id.get())
            .into_iter()
            .flatten()
            .map(|(trait_text, accession)| {
                format!(
                    r#"{{"diseaseTrait": {{"trait": "{trait_text}"}},
                        "_links": {{"self": {{"href": "https://catalog.test/studies/{accession}"}}}}}}"#
                )
            })
            .collect();
        let body = format!(
            r#"{{"_embedded": {{"studies": [{}]}}, "page": {{"totalPages": 1}}}}"#,
            studies.join(",")
        );
        Ok(serde_json::from_str(&body).unwrap())
    }

    fn fetch_listing(&self, url: &str) -> Result<String, FixtureError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let accession = url.rsplit('/').next().unwrap_or_default();
        Ok(format!(
            r#"<a href="../">Parent Directory</a>
               <a href="{accession}_buildGRCh38.tsv.gz">{accession}_buildGRCh38.tsv.gz</a>
               <a href="{accession}.yaml">{accession}.yaml</a>"#
        ))
    }
}

/// Serves every URL from `root/<basename>`.
struct DirOpener {
    root: PathBuf,
    opened: Arc<AtomicUsize>,
}

impl SourceOpener for DirOpener {
    fn open(&self, source: &str) -> Result<Box<dyn Read + Send>, FixtureError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let name = source.rsplit('/').next().unwrap_or(source);
        let file = File::open(self.root.join(name)).map_err(|err| FixtureError::Http {
            url: source.to_string(),
            message: err.to_string(),
        })?;
        Ok(Box::new(file))
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    root: PathBuf,
    catalog: FakeCatalog,
    opened: Arc<AtomicUsize>,
}

impl Fixture {
    fn new(studies: &[(u64, &'static str, &'static str)], accessions: &[&str]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let sources = root.join("sources");
        fs::create_dir_all(&sources).unwrap();

        let mut catalog = FakeCatalog::default();
        for (pubmed_id, trait_text, accession) in studies {
            catalog
                .studies
                .entry(*pubmed_id)
                .or_default()
                .push((*trait_text, *accession));
            write_source(&sources, accession);
        }
        for accession in accessions {
            write_source(&sources, accession);
        }

        let mut list = String::from("gcst\n");
        for accession in accessions {
            list.push_str(accession);
            list.push('\n');
        }
        fs::write(root.join("gcsts.txt"), list).unwrap();

        Self {
            _dir: dir,
            root,
            catalog,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn config(&self, pubmed_ids: &[u64]) -> ResolvedConfig {
        let mut config = ResolvedConfig {
            pubmed_ids: pubmed_ids.iter().copied().map(PubmedId::new).collect(),
            accessions_path: Some(self.root.join("gcsts.txt")),
            output_dir: self.root.join("data"),
            url_cache_path: self.root.join("urls.json"),
            sampling: SampleStrategy::Reservoir { rows: 10 },
            retry: RetryPolicy::immediate(2),
            discovery_workers: 2,
            sampling_workers: 3,
            ..ResolvedConfig::default()
        };
        config.endpoints.ftp_base_url = FTP.to_string();
        config
    }

    fn pipeline(
        &self,
        config: ResolvedConfig,
    ) -> Pipeline<FakeCatalog, DirOpener, JsonFileCache> {
        let cache = JsonFileCache::new(config.url_cache_path.clone());
        self.pipeline_with(config, cache)
    }

    fn pipeline_with<K: UrlCache>(
        &self,
        config: ResolvedConfig,
        cache: K,
    ) -> Pipeline<FakeCatalog, DirOpener, K> {
        let opener = DirOpener {
            root: self.root.join("sources"),
            opened: Arc::clone(&self.opened),
        };
        let sampler = Sampler::new(opener, config.sampling, config.seed).unwrap();
        Pipeline::new(config, self.catalog.clone(), sampler, cache)
    }

    fn catalog_calls(&self) -> usize {
        self.catalog.calls.load(Ordering::SeqCst)
    }
}

fn write_source(dir: &Path, accession: &str) {
    let mut body = String::from("gene_name\tchromosome\tbase_pair_location\tp_value\tbeta\n");
    for i in 1..=30 {
        body.push_str(&format!("{accession}_G{i}\t{}\t{}\t{}e-5\t0.01\n", i % 22 + 1, i * 1000, i));
    }
    let path = dir.join(format!("{accession}_buildGRCh38.tsv.gz"));
    let mut encoder = flate2::write::GzEncoder::new(
        File::create(path).unwrap(),
        flate2::Compression::default(),
    );
    std::io::Write::write_all(&mut encoder, body.as_bytes()).unwrap();
    encoder.finish().unwrap();
}

#[test]
fn generates_validated_fixtures_end_to_end() {
    let fixture = Fixture::new(
        &[
            (PUBMED, "Gene-based burden test (LDL)", "GCST90083565"),
            (PUBMED, "quantitative trait", "GCST90000001"),
            (PUBMED, "HDL cholesterol (gene burden)", "GCST90083566"),
        ],
        &["GCST90083000"],
    );
    let pipeline = fixture.pipeline(fixture.config(&[PUBMED]));
    let summary = pipeline.run(RunOptions::default()).unwrap();

    assert_eq!(summary.discovered_from_catalog, 2);
    assert_eq!(summary.discovered_from_cache, 0);
    assert_eq!(summary.written, 3);
    assert_eq!(summary.skipped, 0);

    let data = fixture.root.join("data");
    let expected = [
        data.join("gcsts").join("GCST90083000_buildGRCh38.tsv.gz"),
        data.join(PUBMED.to_string())
            .join("GCST90083565_buildGRCh38.tsv.gz"),
        data.join(PUBMED.to_string())
            .join("GCST90083566_buildGRCh38.tsv.gz"),
    ];
    for path in &expected {
        let validation = validate_sumstat_file(path).unwrap();
        assert_eq!(validation.rows, 10, "{}", path.display());
    }
    assert!(
        !data
            .join(PUBMED.to_string())
            .join("GCST90000001_buildGRCh38.tsv.gz")
            .exists()
    );

    let cache = JsonFileCache::new(fixture.root.join("urls.json"));
    let urls = cache.load("gcsts").unwrap().unwrap();
    assert_eq!(
        urls,
        vec![format!(
            "{FTP}/GCST90082001-GCST90083000/GCST90083000/GCST90083000_buildGRCh38.tsv.gz"
        )]
    );
    assert_eq!(cache.load(&PUBMED.to_string()).unwrap().unwrap().len(), 2);
}

#[test]
fn rerun_uses_cache_and_existing_samples() {
    let fixture = Fixture::new(
        &[(PUBMED, "gene-based test", "GCST90083565")],
        &["GCST90083000"],
    );
    fixture
        .pipeline(fixture.config(&[PUBMED]))
        .run(RunOptions::default())
        .unwrap();
    let calls_after_first = fixture.catalog_calls();
    let opened_after_first = fixture.opened.load(Ordering::SeqCst);
    assert!(calls_after_first > 0);
    assert_eq!(opened_after_first, 2);

    let summary = fixture
        .pipeline(fixture.config(&[PUBMED]))
        .run(RunOptions::default())
        .unwrap();
    assert_eq!(fixture.catalog_calls(), calls_after_first);
    assert_eq!(fixture.opened.load(Ordering::SeqCst), opened_after_first);
    assert_eq!(summary.discovered_from_cache, 2);
    assert_eq!(summary.skipped, 2);
    assert!(
        summary
            .outputs
            .iter()
            .all(|r| matches!(r.outcome, SampleOutcome::Skipped { lines: 11 }))
    );
}

#[test]
fn refresh_and_overwrite_redo_everything() {
    let fixture = Fixture::new(&[(PUBMED, "gene-based test", "GCST90083565")], &[]);
    let mut config = fixture.config(&[PUBMED]);
    config.accessions_path = None;
    fixture.pipeline(config.clone()).run(RunOptions::default()).unwrap();
    let calls_after_first = fixture.catalog_calls();

    let summary = fixture
        .pipeline(config)
        .run(RunOptions {
            overwrite: true,
            refresh: true,
        })
        .unwrap();
    assert!(fixture.catalog_calls() > calls_after_first);
    assert_eq!(summary.discovered_from_catalog, 1);
    assert_eq!(summary.written, 1);
}

#[test]
fn publication_without_gene_based_studies_aborts() {
    let fixture = Fixture::new(&[(PUBMED, "quantitative trait", "GCST90000001")], &[]);
    let mut config = fixture.config(&[PUBMED]);
    config.accessions_path = None;
    let err = fixture.pipeline(config).run(RunOptions::default()).unwrap_err();
    assert_matches!(err, FixtureError::NoGeneBasedStudies(PUBMED));
}

#[test]
fn duplicate_studies_sample_once() {
    let fixture = Fixture::new(
        &[
            (PUBMED, "gene-based test", "GCST90083565"),
            (PUBMED, "gene-based test (replication)", "GCST90083565"),
        ],
        &[],
    );
    let mut config = fixture.config(&[PUBMED]);
    config.accessions_path = None;
    config.parallel = false;
    let summary = fixture.pipeline(config).run(RunOptions::default()).unwrap();
    assert_eq!(summary.outputs.len(), 1);
    assert_eq!(fixture.opened.load(Ordering::SeqCst), 1);
}

#[test]
fn targets_follow_configured_order() {
    let fixture = Fixture::new(
        &[
            (1, "gene-based A", "GCST90083565"),
            (2, "gene-based B", "GCST90083566"),
            (3, "gene-based C", "GCST90083567"),
        ],
        &[],
    );
    let mut config = fixture.config(&[3, 1, 2]);
    config.accessions_path = None;
    let pipeline = fixture.pipeline_with(config, MemoryCache::new());
    let discovery = pipeline.discover(false).unwrap();
    let ids: Vec<_> = discovery.targets.iter().map(|t| t.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "1", "2"]);
    assert_eq!(discovery.from_catalog, 3);

    let calls = fixture.catalog_calls();
    let again = pipeline.discover(false).unwrap();
    assert_eq!(again.from_cache, 3);
    assert_eq!(fixture.catalog_calls(), calls);
    assert!(!pipeline.config().url_cache_path.exists());
}

#[test]
fn failing_sample_aborts_parallel_run() {
    let fixture = Fixture::new(
        &[
            (PUBMED, "gene-based A", "GCST90083565"),
            (PUBMED, "gene-based B", "GCST90083566"),
            (PUBMED, "gene-based C", "GCST90083567"),
        ],
        &["GCST90083000"],
    );
    let empty_source = fixture
        .root
        .join("sources")
        .join("GCST90083566_buildGRCh38.tsv.gz");
    let mut encoder = flate2::write::GzEncoder::new(
        File::create(&empty_source).unwrap(),
        flate2::Compression::default(),
    );
    std::io::Write::write_all(
        &mut encoder,
        b"gene_name\tchromosome\tbase_pair_location\tp_value\n",
    )
    .unwrap();
    encoder.finish().unwrap();

    let config = fixture.config(&[PUBMED]);
    assert!(config.parallel);
    let failing_output = config
        .output_dir
        .join(PUBMED.to_string())
        .join("GCST90083566_buildGRCh38.tsv.gz");

    let err = fixture
        .pipeline(config)
        .run(RunOptions::default())
        .unwrap_err();
    assert_matches!(
        &err,
        FixtureError::SampleIntegrity { path, lines: 1 } if *path == failing_output
    );
    assert!(err.to_string().contains("GCST90083566_buildGRCh38.tsv.gz"));
    assert!(!failing_output.exists());
}
