//! apigen: typed TypeScript request functions from a remote API catalog.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod emit;
pub mod pipeline;
pub mod runner;
pub mod staging;
mod version;

pub use catalog::{CatalogClient, CatalogError, CategorySummary, HttpCatalogClient, RawOperation};
pub use classify::{OperationRecord, classify};
pub use config::{CatalogSettings, CategoryFilter, ConfigError, RunConfig};
pub use pipeline::{CategoryOutcome, CategoryPipeline, PipelineError};
pub use runner::{CatalogRunner, RunError, RunSummary, run_catalogs};
pub use staging::{FinalizedFiles, StagedOutput};
pub use version::{APIGEN_VERSION, VersionInfo};
