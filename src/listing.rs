use std::sync::LazyLock;

use regex::Regex;
use tracing::info;

use crate::catalog::CatalogClient;
use crate::error::FixtureError;
use crate::retry::RetryPolicy;

static TSV_HREF_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"href="([^"]+\.(?:tsv\.gz|tsv))""#).expect("listing pattern is valid")
});

/// First `href` in an HTML directory listing that names a `.tsv` or `.tsv.gz`
/// file. There should only ever be one per accession directory.
pub fn extract_data_file_name(html: &str) -> Option<&str> {
    TSV_HREF_RE
        .captures(html)
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

pub fn join_listing_url(directory_url: &str, file_name: &str) -> String {
    if file_name.starts_with("http://") || file_name.starts_with("https://") {
        return file_name.to_string();
    }
    format!(
        "{}/{}",
        directory_url.trim_end_matches('/'),
        file_name.trim_start_matches('/')
    )
}

/// Scrape the directory listing at `directory_url` for its data file.
pub fn resolve_data_file_url<C: CatalogClient + ?Sized>(
    client: &C,
    directory_url: &str,
    retry: &RetryPolicy,
) -> Result<String, FixtureError> {
    let html = retry.run("listing", || client.fetch_listing(directory_url))?;
    let file_name = extract_data_file_name(&html)
        .ok_or_else(|| FixtureError::ListingParse(directory_url.to_string()))?;
    let url = join_listing_url(directory_url, file_name);
    info!(directory = directory_url, url = %url, "resolved data file");
    Ok(url)
}
