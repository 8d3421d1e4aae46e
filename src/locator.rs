use tracing::{debug, info};

use crate::catalog::CatalogClient;
use crate::domain::PubmedId;
use crate::error::FixtureError;
use crate::retry::RetryPolicy;

pub const PAGE_SIZE: u32 = 50;

/// Trait text markers the catalog uses for gene-based summary statistics.
const GENE_BASED_MARKERS: [&str; 2] = ["gene-based", "gene burden"];

pub fn is_gene_based(trait_text: &str) -> bool {
    let lowered = trait_text.to_lowercase();
    GENE_BASED_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Self links of every gene-based study published under `pubmed_id`, in
/// the order the API returns them. Duplicates across pages are kept.
pub fn locate_gene_based_studies<C: CatalogClient + ?Sized>(
    client: &C,
    pubmed_id: PubmedId,
    retry: &RetryPolicy,
) -> Result<Vec<String>, FixtureError> {
    let mut links = Vec::new();
    let mut page = 0u32;

    loop {
        info!(%pubmed_id, page, "fetching studies");
        let result = retry.run("study-search", || {
            client.search_studies(pubmed_id, page, PAGE_SIZE)
        })?;

        for study in result.studies() {
            if !is_gene_based(study.trait_text()) {
                continue;
            }
            let link = study
                .self_link()
                .ok_or_else(|| FixtureError::CatalogResponse {
                    url: format!("pubmedId={pubmed_id} page={page}"),
                    message: "gene-based study without a self link".to_string(),
                })?;
            debug!(%pubmed_id, link, "gene-based study");
            links.push(link.to_string());
        }

        if page + 1 >= result.total_pages() {
            break;
        }
        page += 1;
    }

    Ok(links)
}
