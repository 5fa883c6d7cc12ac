//! Per-category pipeline.
//!
//! All operations of a category run as futures on the current task, sharing
//! one [`HoistingLedger`] and one [`StagedOutput`]. Once every operation has
//! settled, the ledger is drained and its fragments are compiled once into
//! the shared declaration block; then the staged output is finalized under
//! the category's file name, or discarded.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use futures::StreamExt;
use futures::future::join_all;
use futures::stream::FuturesUnordered;
use schema_canon::{HoistingLedger, SchemaCompiler, SchemaError, to_safe_identifier};
use thiserror::Error;

use crate::catalog::{CategorySummary, RawOperation};
use crate::classify::{NamedSchema, OperationRecord, classify};
use crate::emit::{self, DeclaredTypes};
use crate::staging::{FinalizedFiles, StagedOutput};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to stage output in {dir}: {source}")]
    Stage {
        dir: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write output for '{name}': {source}")]
    Finalize {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Why one operation was left out. Never aborts the category.
#[derive(Debug, Error)]
enum OperationError {
    #[error("failed to compile {type_name}: {source}")]
    Compile {
        type_name: String,
        #[source]
        source: SchemaError,
    },

    #[error("failed to stage generated text: {0}")]
    Write(#[from] io::Error),
}

/// How a category pass ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CategoryOutcome {
    Written {
        file_name: String,
        files: FinalizedFiles,
        /// URLs of the operations that made it into the output.
        urls: Vec<String>,
    },
    /// No operation produced a function; nothing was written.
    Empty,
    /// No file name could be derived; nothing was written.
    Unnamed,
}

pub struct CategoryPipeline<'a> {
    compiler: &'a dyn SchemaCompiler,
    output_dir: &'a Path,
    request_api_path: &'a str,
}

impl<'a> CategoryPipeline<'a> {
    pub fn new(
        compiler: &'a dyn SchemaCompiler,
        output_dir: &'a Path,
        request_api_path: &'a str,
    ) -> Self {
        Self {
            compiler,
            output_dir,
            request_api_path,
        }
    }

    pub async fn run(
        &self,
        category: &CategorySummary,
        operations: &[RawOperation],
        base_path: &str,
    ) -> Result<CategoryOutcome, PipelineError> {
        let ledger = HoistingLedger::new();
        let staged = StagedOutput::create(
            self.output_dir,
            &category.id.to_string(),
            self.request_api_path,
        )
        .map_err(|source| PipelineError::Stage {
            dir: self.output_dir.to_path_buf(),
            source,
        })?;

        let records: Vec<OperationRecord> =
            operations.iter().map(|op| classify(op, base_path)).collect();
        let prefix = common_path_prefix(operations.iter().map(|op| op.path.as_str()));

        let total = records.len();
        let mut urls = Vec::with_capacity(total);
        {
            let (ledger, staged) = (&ledger, &staged);
            let mut pending: FuturesUnordered<_> = records
                .iter()
                .map(|record| async move {
                    (record, self.process_operation(record, ledger, staged).await)
                })
                .collect();

            let mut completed = 0;
            while let Some((record, result)) = pending.next().await {
                let url = &record.common().url;
                match result {
                    Ok(()) => {
                        completed += 1;
                        urls.push(url.clone());
                        tracing::info!(
                            category = category.id,
                            progress = %format!("{completed}/{total}"),
                            url = %url,
                            "Operation generated"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            category = category.id,
                            url = %url,
                            error = %e,
                            "Operation skipped"
                        );
                    }
                }
            }
        }

        let hoisted = self.compile_hoisted(category.id, &ledger).await;

        if !staged.has_content() {
            tracing::info!(category = category.id, name = %category.name, "No operations generated");
            staged.discard();
            return Ok(CategoryOutcome::Empty);
        }

        let file_name = match category_file_name(category, prefix.as_deref()) {
            Some(name) => name,
            None => {
                tracing::warn!(
                    category = category.id,
                    name = %category.name,
                    prefix = ?prefix,
                    "Cannot derive a file name from the common path prefix, skipping category"
                );
                staged.discard();
                return Ok(CategoryOutcome::Unnamed);
            }
        };

        let hoisted = (!hoisted.is_empty()).then_some(hoisted.as_str());
        match staged.finalize(&file_name, hoisted) {
            Ok(Some(files)) => Ok(CategoryOutcome::Written {
                file_name,
                files,
                urls,
            }),
            Ok(None) => Ok(CategoryOutcome::Empty),
            Err(source) => Err(PipelineError::Finalize {
                name: file_name,
                source,
            }),
        }
    }

    async fn process_operation(
        &self,
        record: &OperationRecord,
        ledger: &HoistingLedger,
        staged: &StagedOutput,
    ) -> Result<(), OperationError> {
        let common = record.common();
        let query = self.declare(ledger, record.query().map(|g| &g.schema)).await?;
        let path = self.declare(ledger, record.path().map(|g| &g.schema)).await?;
        let request = self.declare(ledger, common.request.as_ref()).await?;
        let response = self.declare(ledger, Some(&common.response)).await?;

        let declarations: Vec<(&str, &str)> = [&query, &path, &request, &response]
            .into_iter()
            .flatten()
            .map(|(name, code)| (name.as_str(), code.as_str()))
            .collect();
        let types = DeclaredTypes {
            query: query.as_ref().map(|(name, _)| name.clone()),
            path: path.as_ref().map(|(name, _)| name.clone()),
            request: request.as_ref().map(|(name, _)| name.clone()),
            response: response.as_ref().map(|(name, _)| name.clone()),
        };
        let function = emit::render_function(record, &types);
        staged.append_operation(&common.method, declarations, &function)?;
        Ok(())
    }

    /// Canonicalize and compile one schema slot. `Ok(None)` when the slot is
    /// absent or canonicalizes to `null`.
    async fn declare(
        &self,
        ledger: &HoistingLedger,
        named: Option<&NamedSchema>,
    ) -> Result<Option<(String, String)>, OperationError> {
        let Some(named) = named else {
            return Ok(None);
        };
        let code = schema_canon::compile_root(self.compiler, ledger, &named.schema, &named.type_name)
            .await
            .map_err(|source| OperationError::Compile {
                type_name: named.type_name.clone(),
                source,
            })?;
        Ok(code.map(|code| (to_safe_identifier(&named.type_name), code)))
    }

    /// Compile every drained fragment once. Fragments that fail to compile or
    /// collide on a type name are logged and left out.
    async fn compile_hoisted(&self, category: u64, ledger: &HoistingLedger) -> String {
        let fragments = ledger.drain_all();
        if fragments.is_empty() {
            return String::new();
        }
        tracing::debug!(category, count = fragments.len(), "Compiling hoisted fragments");

        let scratch = HoistingLedger::new();
        let compiled = join_all(fragments.iter().map(|fragment| {
            schema_canon::compile_root(self.compiler, &scratch, &fragment.schema, &fragment.title)
        }))
        .await;

        let mut seen = HashSet::new();
        let mut block = Vec::new();
        for (fragment, result) in fragments.iter().zip(compiled) {
            match result {
                Ok(Some(code)) => {
                    if seen.insert(to_safe_identifier(&fragment.title)) {
                        block.push(code);
                    } else {
                        tracing::warn!(
                            category,
                            title = %fragment.title,
                            reference = %fragment.reference,
                            "Hoisted type name already declared, skipping"
                        );
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(
                        category,
                        title = %fragment.title,
                        error = %e,
                        "Failed to compile hoisted fragment"
                    );
                }
            }
        }
        block.join("\n")
    }
}

/// Category description if set, else derived from the common path prefix.
fn category_file_name(category: &CategorySummary, prefix: Option<&str>) -> Option<String> {
    if let Some(desc) = category.desc.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
        return Some(desc.to_string());
    }
    prefix.and_then(file_name_from_prefix)
}

/// Character-wise longest common prefix.
pub fn longest_common_prefix<'s>(a: &'s str, b: &str) -> &'s str {
    let end = a
        .char_indices()
        .zip(b.chars())
        .take_while(|((_, x), y)| x == y)
        .last()
        .map_or(0, |((i, c), _)| i + c.len_utf8());
    &a[..end]
}

/// Fold [`longest_common_prefix`] over all paths, stopping early at `/`.
/// `None` for no paths; a single path is its own prefix.
pub fn common_path_prefix<'p>(paths: impl IntoIterator<Item = &'p str>) -> Option<String> {
    let mut paths = paths.into_iter();
    let mut prefix = paths.next()?.to_string();
    for path in paths {
        if prefix == "/" {
            break;
        }
        prefix = longest_common_prefix(&prefix, path).to_string();
    }
    Some(prefix)
}

/// `/a/b/` → `a-b`. `None` for `/`, empty, or a prefix with no segments.
pub fn file_name_from_prefix(prefix: &str) -> Option<String> {
    let name = prefix
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    (!name.is_empty()).then_some(name)
}
