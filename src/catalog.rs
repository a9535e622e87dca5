//! # Dataset Catalogs
//!
//! A catalog turns a [`FacetQuery`] into the list of files that make up the
//! matching dataset. Two catalogs are provided:
//!
//! - [`EsgfCatalog`] queries an ESGF index node over its REST search API.
//! - [`DirectoryCatalog`] lists a local mirror laid out with CMIP6 file names.
//!
//! Results come back sorted by the start year encoded in each file name, so the
//! pipeline can stop at the first file covering the requested year.

use async_trait::async_trait;
use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::window::Frequency;

pub const DEFAULT_SEARCH_URL: &str = "https://esgf-node.llnl.gov/esg-search/search";
pub const DEFAULT_DATA_NODE: &str = "esgf.ceda.ac.uk";
pub const DEFAULT_VARIANT: &str = "r1i1p1f1";

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("search request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("search service returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed search response: {0}")]
    Malformed(String),

    #[error("cannot list catalog directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Facets identifying one CMIP6 dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetQuery {
    pub project: String,
    pub model: String,
    pub scenario: String,
    pub variable: String,
    pub frequency: Frequency,
    pub variant_label: String,
    pub data_node: Option<String>,
}

impl FacetQuery {
    pub fn new(model: &str, scenario: &str, variable: &str, frequency: Frequency) -> Self {
        FacetQuery {
            project: "CMIP6".to_string(),
            model: model.to_string(),
            scenario: scenario.to_string(),
            variable: variable.to_string(),
            frequency,
            variant_label: DEFAULT_VARIANT.to_string(),
            data_node: Some(DEFAULT_DATA_NODE.to_string()),
        }
    }

    pub fn with_variant(mut self, variant_label: &str) -> Self {
        self.variant_label = variant_label.to_string();
        self
    }

    pub fn with_data_node(mut self, data_node: Option<String>) -> Self {
        self.data_node = data_node;
        self
    }

    /// File name prefix shared by every file of the dataset.
    pub fn file_prefix(&self) -> String {
        format!(
            "{}_{}_{}_{}_{}_",
            self.variable,
            self.frequency.table_id(),
            self.model,
            self.scenario,
            self.variant_label
        )
    }
}

/// One file of a dataset as reported by a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub name: String,
    /// Path or URL from which the whole file can be fetched
    pub access: String,
    /// OPeNDAP endpoint, when the data node offers one
    pub opendap: Option<String>,
}

impl FileDescriptor {
    pub fn new(name: &str, access: &str) -> Self {
        FileDescriptor {
            name: name.to_string(),
            access: access.to_string(),
            opendap: None,
        }
    }

    /// Years covered by the file, read from its trailing date code.
    pub fn year_span(&self) -> Option<(i32, i32)> {
        year_span(&self.name)
    }
}

/// Parses `(start_year, end_year)` from a name ending in
/// `_YYYY[MM[DD]]-YYYY[MM[DD]].nc`.
pub fn year_span(name: &str) -> Option<(i32, i32)> {
    let stem = name.strip_suffix(".nc").unwrap_or(name);
    let code = stem.rsplit('_').next()?;
    let (start, end) = code.split_once('-')?;
    Some((parse_year(start)?, parse_year(end)?))
}

fn parse_year(stamp: &str) -> Option<i32> {
    if stamp.len() < 4 || !stamp.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stamp[..4].parse().ok()
}

/// Orders descriptors by start year; unparsable names go last.
pub fn sort_by_start_year(files: &mut [FileDescriptor]) {
    files.sort_by_key(|f| (f.year_span().map_or(i32::MAX, |(start, _)| start), f.name.clone()));
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search(&self, query: &FacetQuery) -> Result<Vec<FileDescriptor>, CatalogError>;
}

/// Client for the ESGF search REST API.
#[derive(Debug, Clone)]
pub struct EsgfCatalog {
    client: Client,
    search_url: String,
    distributed: bool,
}

impl EsgfCatalog {
    pub fn new(search_url: &str, distributed: bool) -> Result<Self, CatalogError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(EsgfCatalog {
            client,
            search_url: search_url.to_string(),
            distributed,
        })
    }

    fn base_params(&self, kind: &str) -> Vec<(&'static str, String)> {
        vec![
            ("type", kind.to_string()),
            ("format", "application/solr+json".to_string()),
            ("distrib", self.distributed.to_string()),
            ("limit", "100".to_string()),
        ]
    }

    async fn query(&self, params: &[(&'static str, String)]) -> Result<SolrResponse, CatalogError> {
        debug!("ESGF search {} {:?}", self.search_url, params);
        let response = self.client.get(&self.search_url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CatalogError::Status {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| CatalogError::Malformed(e.to_string()))
    }

    /// Identifier of the first dataset matching the facets.
    async fn find_dataset(&self, query: &FacetQuery) -> Result<Option<String>, CatalogError> {
        let mut params = self.base_params("Dataset");
        params.extend([
            ("project", query.project.clone()),
            ("source_id", query.model.clone()),
            ("experiment_id", query.scenario.clone()),
            ("variable_id", query.variable.clone()),
            ("frequency", query.frequency.code().to_string()),
            ("variant_label", query.variant_label.clone()),
            ("latest", "true".to_string()),
        ]);
        if let Some(node) = &query.data_node {
            params.push(("data_node", node.clone()));
        }

        let response = self.query(&params).await?;
        if response.response.num_found > 1 {
            debug!(
                "{} datasets match, using the first one",
                response.response.num_found
            );
        }
        Ok(response.response.docs.into_iter().find_map(|doc| doc.id))
    }
}

#[async_trait]
impl Catalog for EsgfCatalog {
    async fn search(&self, query: &FacetQuery) -> Result<Vec<FileDescriptor>, CatalogError> {
        let Some(dataset_id) = self.find_dataset(query).await? else {
            debug!("No dataset found for {}", query.file_prefix());
            return Ok(Vec::new());
        };
        debug!("Dataset {}", dataset_id);

        let mut params = self.base_params("File");
        params.push(("dataset_id", dataset_id));
        let response = self.query(&params).await?;

        let mut files = parse_file_docs(response.response.docs);
        sort_by_start_year(&mut files);
        Ok(files)
    }
}

#[derive(Debug, Deserialize)]
struct SolrResponse {
    response: SolrBody,
}

#[derive(Debug, Deserialize)]
struct SolrBody {
    #[serde(rename = "numFound", default)]
    num_found: u64,
    #[serde(default)]
    docs: Vec<SolrDoc>,
}

#[derive(Debug, Deserialize)]
struct SolrDoc {
    id: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Vec<String>,
}

/// Builds descriptors from `type=File` documents. Each `url` entry reads
/// `"<url>|<mime type>|<service>"`.
fn parse_file_docs(docs: Vec<SolrDoc>) -> Vec<FileDescriptor> {
    docs.into_iter()
        .filter_map(|doc| {
            let mut access = None;
            let mut opendap = None;
            for entry in &doc.url {
                let mut fields = entry.split('|');
                let (Some(url), _, Some(service)) = (fields.next(), fields.next(), fields.next())
                else {
                    continue;
                };
                match service {
                    "HTTPServer" => access = Some(url.to_string()),
                    "OPENDAP" => {
                        opendap = Some(url.strip_suffix(".html").unwrap_or(url).to_string())
                    }
                    _ => {}
                }
            }

            let access = access.or_else(|| opendap.clone())?;
            let name = doc
                .title
                .or_else(|| access.rsplit('/').next().map(str::to_string))?;
            Some(FileDescriptor {
                name,
                access,
                opendap,
            })
        })
        .collect()
}

/// Catalog over a local directory of CMIP6-named NetCDF files.
#[derive(Debug, Clone)]
pub struct DirectoryCatalog {
    root: PathBuf,
}

impl DirectoryCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        DirectoryCatalog { root: root.into() }
    }
}

#[async_trait]
impl Catalog for DirectoryCatalog {
    async fn search(&self, query: &FacetQuery) -> Result<Vec<FileDescriptor>, CatalogError> {
        let dir_error = |source| CatalogError::Directory {
            path: self.root.display().to_string(),
            source,
        };
        let prefix = query.file_prefix();
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(dir_error)?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(dir_error)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.starts_with(&prefix) || !name.ends_with(".nc") {
                continue;
            }
            if year_span(&name).is_none() {
                warn!("Ignoring {}: no date range in file name", name);
            }
            files.push(FileDescriptor::new(&name, &entry.path().to_string_lossy()));
        }

        sort_by_start_year(&mut files);
        Ok(files)
    }
}
