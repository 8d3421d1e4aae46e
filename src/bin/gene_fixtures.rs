use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use gwas_gene_fixtures::cache::JsonFileCache;
use gwas_gene_fixtures::catalog::CatalogHttpClient;
use gwas_gene_fixtures::config::ConfigLoader;
use gwas_gene_fixtures::error::FixtureError;
use gwas_gene_fixtures::fs_util;
use gwas_gene_fixtures::output::{JsonOutput, ValidationSummary};
use gwas_gene_fixtures::pipeline::{Pipeline, RunOptions};
use gwas_gene_fixtures::sampler::{HttpSourceOpener, Sampler};
use gwas_gene_fixtures::schema;

#[derive(Parser)]
#[command(name = "gene-fixtures")]
#[command(about = "Sample gene-based GWAS Catalog summary statistics into test fixtures")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Discover, download and sample summary statistics (default)")]
    Generate(GenerateArgs),
    #[command(about = "Validate sampled *.tsv.gz files against the gene row schema")]
    Validate(ValidateArgs),
}

#[derive(Args, Clone, Default)]
struct GenerateArgs {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Regenerate samples that already exist.
    #[arg(long)]
    overwrite: bool,

    /// Ignore the URL cache and query the catalog again.
    #[arg(long)]
    refresh: bool,

    /// Run discovery and sampling one unit at a time.
    #[arg(long)]
    sequential: bool,
}

#[derive(Args)]
struct ValidateArgs {
    #[arg(default_value = "tests/data")]
    dir: PathBuf,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(err) = report.downcast_ref::<FixtureError>() {
            return ExitCode::from(map_exit_code(err));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &FixtureError) -> u8 {
    match error {
        FixtureError::ConfigRead(_)
        | FixtureError::ConfigParse(_)
        | FixtureError::CacheParse { .. }
        | FixtureError::InvalidStrategy(_)
        | FixtureError::MalformedAccession(_)
        | FixtureError::InvalidPubmedId(_)
        | FixtureError::NoGeneBasedStudies(_) => 2,
        FixtureError::Http { .. }
        | FixtureError::UpstreamUnavailable { .. }
        | FixtureError::CatalogResponse { .. }
        | FixtureError::ListingParse(_) => 3,
        FixtureError::SampleIntegrity { .. }
        | FixtureError::SourceParse { .. }
        | FixtureError::RowValidation(_) => 4,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Some(Commands::Generate(args)) => run_generate(args),
        Some(Commands::Validate(args)) => run_validate(args),
        None => run_generate(GenerateArgs::default()),
    }
}

fn run_generate(args: GenerateArgs) -> miette::Result<()> {
    let mut config = ConfigLoader::resolve(args.config.as_deref())?;
    if args.sequential {
        config.parallel = false;
    }

    let catalog = CatalogHttpClient::new(config.endpoints.search_url.clone())?;
    let sampler = Sampler::new(HttpSourceOpener::new()?, config.sampling, config.seed)?;
    let cache = JsonFileCache::new(config.url_cache_path.clone());
    let pipeline = Pipeline::new(config, catalog, sampler, cache);

    let summary = pipeline.run(RunOptions {
        overwrite: args.overwrite,
        refresh: args.refresh,
    })?;
    JsonOutput::print_run(&summary).into_diagnostic()
}

fn run_validate(args: ValidateArgs) -> miette::Result<()> {
    let files = fs_util::find_sumstat_files(&args.dir)?;
    if files.is_empty() {
        return Err(miette::miette!(
            "no *.tsv.gz files found in {}; run `gene-fixtures generate` first",
            args.dir.display()
        ));
    }

    let mut validated = Vec::with_capacity(files.len());
    for path in &files {
        let result = schema::validate_sumstat_file(path).inspect_err(|err| {
            error!(path = %path.display(), error = %err, "invalid fixture");
        })?;
        info!(path = %path.display(), rows = result.rows, "valid");
        validated.push(result);
    }
    let rows = validated.iter().map(|f| f.rows).sum();
    JsonOutput::print_validation(&ValidationSummary {
        files: validated,
        rows,
    })
    .into_diagnostic()
}
