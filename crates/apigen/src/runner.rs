//! Per-catalog driver: project → categories → pipeline, one category at a time.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use schema_canon::SchemaCompiler;
use thiserror::Error;

use crate::catalog::{CatalogClient, CatalogError, HttpCatalogClient, fetch_operations};
use crate::config::{CategoryFilter, RunConfig};
use crate::pipeline::{CategoryOutcome, CategoryPipeline};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to fetch project: {0}")]
    Project(#[source] CatalogError),

    #[error("failed to fetch category list: {0}")]
    Categories(#[source] CatalogError),

    #[error("failed to create output directory {path}: {source}")]
    OutputDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What one catalog run produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// `(category id, file name)` of every category written.
    pub written: Vec<(u64, String)>,
    pub skipped: usize,
    pub failed: usize,
}

pub struct CatalogRunner<'a> {
    client: &'a dyn CatalogClient,
    compiler: &'a dyn SchemaCompiler,
    output_dir: &'a Path,
    request_api_path: &'a str,
    filter: CategoryFilter,
}

impl<'a> CatalogRunner<'a> {
    pub fn new(
        client: &'a dyn CatalogClient,
        compiler: &'a dyn SchemaCompiler,
        output_dir: &'a Path,
        request_api_path: &'a str,
    ) -> Self {
        Self {
            client,
            compiler,
            output_dir,
            request_api_path,
            filter: CategoryFilter::default(),
        }
    }

    pub fn with_filter(mut self, filter: CategoryFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Generate every allowed category. Per-category failures are logged and
    /// counted; only project and category-list fetch failures abort the run.
    pub async fn run(&self) -> Result<RunSummary, RunError> {
        let (project, base_path) = self.client.fetch_project().await.map_err(RunError::Project)?;
        let categories = self
            .client
            .fetch_category_list(project.id)
            .await
            .map_err(RunError::Categories)?;

        tracing::info!(
            project = project.id,
            name = %project.name,
            categories = categories.len(),
            "Fetched catalog"
        );

        let pipeline = CategoryPipeline::new(self.compiler, self.output_dir, self.request_api_path);
        let mut summary = RunSummary::default();

        for category in &categories {
            if !self.filter.allows(category.id) {
                tracing::debug!(category = category.id, "Category filtered out");
                continue;
            }

            tracing::info!(category = category.id, name = %category.name, "Category started");
            let operations = fetch_operations(self.client, category).await;

            match pipeline.run(category, &operations, &base_path).await {
                Ok(CategoryOutcome::Written {
                    file_name, urls, ..
                }) => {
                    for url in &urls {
                        tracing::info!(category = category.id, file = %file_name, url = %url, "Emitted");
                    }
                    tracing::info!(
                        category = category.id,
                        file = %file_name,
                        operations = urls.len(),
                        "Category finished"
                    );
                    summary.written.push((category.id, file_name));
                }
                Ok(CategoryOutcome::Empty | CategoryOutcome::Unnamed) => summary.skipped += 1,
                Err(e) => {
                    tracing::error!(category = category.id, error = %e, "Category failed");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}

/// Run every configured catalog in file order over HTTP.
///
/// Catalogs named in `skip`, without a host, or with an unusable entry are
/// logged and passed over, as are catalogs whose own run fails. Only an
/// output directory that cannot be created stops the whole run.
pub async fn run_catalogs(
    config: &RunConfig,
    skip: &[String],
    default_output: &Path,
    compiler: &dyn SchemaCompiler,
) -> Result<IndexMap<String, RunSummary>, RunError> {
    let mut summaries = IndexMap::new();

    for (name, settings) in &config.catalogs {
        if skip.iter().any(|s| s == name) {
            tracing::info!(catalog = %name, "Catalog filtered out");
            continue;
        }
        let Some(ref host) = settings.host else {
            tracing::warn!(catalog = %name, "Catalog has no host configured, skipping");
            continue;
        };

        let filter = match settings.category_filter(name) {
            Ok(filter) => filter,
            Err(e) => {
                tracing::warn!(catalog = %name, error = %e, "Invalid category filter, skipping");
                continue;
            }
        };
        let output = settings.output.as_deref().unwrap_or(default_output);
        ensure_output_dir(output)?;

        let client = match HttpCatalogClient::new(host, settings.token.clone()) {
            Ok(client) => client,
            Err(e) => {
                tracing::warn!(catalog = %name, error = %e, "Failed to build catalog client, skipping");
                continue;
            }
        };
        let runner = CatalogRunner::new(&client, compiler, output, &settings.request_api_path)
            .with_filter(filter);

        match runner.run().await {
            Ok(summary) => {
                tracing::info!(
                    catalog = %name,
                    written = summary.written.len(),
                    skipped = summary.skipped,
                    failed = summary.failed,
                    "Catalog finished"
                );
                summaries.insert(name.clone(), summary);
            }
            Err(e) => {
                tracing::error!(catalog = %name, host = %client.host(), error = %e, "Catalog skipped")
            }
        }
    }

    Ok(summaries)
}

fn ensure_output_dir(dir: &Path) -> Result<(), RunError> {
    if !dir.exists() {
        tracing::info!(dir = %dir.display(), "Output directory does not exist, creating it");
    }
    std::fs::create_dir_all(dir).map_err(|source| RunError::OutputDir {
        path: dir.to_path_buf(),
        source,
    })
}
