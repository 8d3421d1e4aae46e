use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use tracing::debug;

use crate::domain::PubmedId;
use crate::error::FixtureError;

pub const DEFAULT_SEARCH_URL: &str =
    "https://www.ebi.ac.uk/gwas/rest/api/studies/search/findByPublicationIdPubmedId";
pub const DEFAULT_FTP_BASE_URL: &str = "http://ftp.ebi.ac.uk/pub/databases/gwas/summary_statistics";

/// One page of `findByPublicationIdPubmedId`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudySearchPage {
    #[serde(rename = "_embedded", default)]
    pub embedded: EmbeddedStudies,
    #[serde(default)]
    pub page: PageInfo,
}

impl StudySearchPage {
    pub fn studies(&self) -> &[StudyRecord] {
        &self.embedded.studies
    }

    pub fn total_pages(&self) -> u32 {
        self.page.total_pages.unwrap_or(1)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmbeddedStudies {
    #[serde(default)]
    pub studies: Vec<StudyRecord>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PageInfo {
    #[serde(rename = "totalPages", default)]
    pub total_pages: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudyRecord {
    #[serde(rename = "diseaseTrait", default)]
    pub disease_trait: Option<DiseaseTrait>,
    #[serde(rename = "_links", default)]
    pub links: Option<StudyLinks>,
}

impl StudyRecord {
    pub fn trait_text(&self) -> &str {
        self.disease_trait
            .as_ref()
            .and_then(|t| t.trait_name.as_deref())
            .unwrap_or("")
    }

    pub fn self_link(&self) -> Option<&str> {
        self.links
            .as_ref()
            .and_then(|links| links.self_link.as_ref())
            .map(|link| link.href.as_str())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiseaseTrait {
    #[serde(rename = "trait", default)]
    pub trait_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StudyLinks {
    #[serde(rename = "self", default)]
    pub self_link: Option<Link>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Link {
    pub href: String,
}

/// Access to the catalog REST API and its FTP mirror.
///
/// Each method performs exactly one request; retry policies are applied by
/// the callers.
pub trait CatalogClient: Send + Sync {
    fn search_studies(
        &self,
        pubmed_id: PubmedId,
        page: u32,
        size: u32,
    ) -> Result<StudySearchPage, FixtureError>;
    fn fetch_listing(&self, url: &str) -> Result<String, FixtureError>;
}

#[derive(Clone)]
pub struct CatalogHttpClient {
    client: Client,
    search_url: String,
}

impl CatalogHttpClient {
    pub fn new(search_url: impl Into<String>) -> Result<Self, FixtureError> {
        Ok(Self {
            client: build_client(Some(Duration::from_secs(60)))?,
            search_url: search_url.into(),
        })
    }

    /// Names the failing request in search errors.
    fn search_context(&self, pubmed_id: PubmedId, page: u32) -> String {
        format!("{} (pubmedId={pubmed_id} page={page})", self.search_url)
    }

    fn check_status(url: &str, response: Response) -> Result<Response, FixtureError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .ok()
            .map(|body| body.chars().take(200).collect::<String>())
            .filter(|body| !body.trim().is_empty())
            .unwrap_or_else(|| "catalog request failed".to_string());
        Err(FixtureError::UpstreamUnavailable {
            url: url.to_string(),
            status,
            message,
        })
    }
}

impl CatalogClient for CatalogHttpClient {
    fn search_studies(
        &self,
        pubmed_id: PubmedId,
        page: u32,
        size: u32,
    ) -> Result<StudySearchPage, FixtureError> {
        debug!(%pubmed_id, page, size, "searching studies");
        let context = self.search_context(pubmed_id, page);
        let response = self
            .client
            .get(&self.search_url)
            .header(ACCEPT, "application/json")
            .query(&[
                ("pubmedId", pubmed_id.to_string()),
                ("page", page.to_string()),
                ("size", size.to_string()),
            ])
            .send()
            .map_err(|err| FixtureError::Http {
                url: context.clone(),
                message: err.to_string(),
            })?;
        let response = Self::check_status(&context, response)?;
        response
            .json::<StudySearchPage>()
            .map_err(|err| FixtureError::CatalogResponse {
                url: context,
                message: err.to_string(),
            })
    }

    fn fetch_listing(&self, url: &str) -> Result<String, FixtureError> {
        debug!(url, "fetching directory listing");
        let response = self.client.get(url).send().map_err(|err| FixtureError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })?;
        let response = Self::check_status(url, response)?;
        response.text().map_err(|err| FixtureError::Http {
            url: url.to_string(),
            message: err.to_string(),
        })
    }
}

/// `timeout` of `None` leaves whole-body reads unbounded, which large
/// summary-statistics downloads need.
pub(crate) fn build_client(timeout: Option<Duration>) -> Result<Client, FixtureError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(&format!("gwas-gene-fixtures/{}", env!("CARGO_PKG_VERSION")))
            .map_err(|err| FixtureError::Filesystem(err.to_string()))?,
    );
    Client::builder()
        .default_headers(headers)
        .connect_timeout(Duration::from_secs(30))
        .timeout(timeout)
        .build()
        .map_err(|err| FixtureError::Http {
            url: String::new(),
            message: err.to_string(),
        })
}
