//! Run configuration.
//!
//! A JSON file mapping a catalog name to its connection settings:
//!
//! ```json
//! {
//!   "shop": {
//!     "host": "http://catalog.example.com",
//!     "token": "…",
//!     "requestApiPath": "@/api/request",
//!     "exclude": [12, "40"]
//!   }
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_REQUEST_API_PATH: &str = "@/api/request";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("catalog '{catalog}': category id '{value}' is not a number")]
    InvalidCategoryId { catalog: String, value: String },
}

/// Category ids may be written as numbers or numeric strings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum CategoryId {
    Number(u64),
    Text(String),
}

impl CategoryId {
    pub fn resolve(&self) -> Option<u64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSettings {
    #[serde(default)]
    pub host: Option<String>,
    pub token: String,
    #[serde(default = "default_request_api_path")]
    pub request_api_path: String,
    #[serde(default)]
    pub include: Option<Vec<CategoryId>>,
    #[serde(default)]
    pub exclude: Option<Vec<CategoryId>>,
    /// Overrides the output directory for this catalog.
    #[serde(default)]
    pub output: Option<PathBuf>,
}

fn default_request_api_path() -> String {
    DEFAULT_REQUEST_API_PATH.to_string()
}

/// Which categories of a catalog to generate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFilter {
    include: Option<HashSet<u64>>,
    exclude: Option<HashSet<u64>>,
}

impl CategoryFilter {
    pub fn new(include: Option<HashSet<u64>>, exclude: Option<HashSet<u64>>) -> Self {
        Self { include, exclude }
    }

    pub fn allows(&self, id: u64) -> bool {
        if self.exclude.as_ref().is_some_and(|ex| ex.contains(&id)) {
            return false;
        }
        self.include.as_ref().is_none_or(|inc| inc.contains(&id))
    }
}

impl CatalogSettings {
    pub fn category_filter(&self, catalog: &str) -> Result<CategoryFilter, ConfigError> {
        let resolve = |ids: &Option<Vec<CategoryId>>| -> Result<Option<HashSet<u64>>, ConfigError> {
            let Some(ids) = ids else {
                return Ok(None);
            };
            ids.iter()
                .map(|id| {
                    id.resolve().ok_or_else(|| ConfigError::InvalidCategoryId {
                        catalog: catalog.to_string(),
                        value: match id {
                            CategoryId::Number(n) => n.to_string(),
                            CategoryId::Text(s) => s.clone(),
                        },
                    })
                })
                .collect::<Result<HashSet<_>, _>>()
                .map(Some)
        };
        Ok(CategoryFilter::new(
            resolve(&self.include)?,
            resolve(&self.exclude)?,
        ))
    }
}

/// All catalogs of one run, in file order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct RunConfig {
    pub catalogs: IndexMap<String, CatalogSettings>,
}

impl RunConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
