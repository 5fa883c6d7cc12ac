//! Catalog schema canonicalization and TypeScript declaration output.
//!
//! Raw catalog schemas go through [`Canonicalizer`] (which also feeds the
//! category's [`HoistingLedger`]) and then through a [`SchemaCompiler`].

pub mod canonicalize;
pub mod compiler;
pub mod error;
pub mod ledger;
pub mod types;
pub mod typescript;

pub use canonicalize::{Canonicalizer, inject_map_key};
pub use compiler::SchemaCompiler;
pub use error::{Result, SchemaError};
pub use ledger::{HoistedFragment, HoistingLedger};
pub use types::{
    CanonicalSchema, Items, MAP_KEY_SENTINEL, MappedType, MultiShape, ObjectShape,
    REFERENCE_MARKER, Shape, map_type, map_type_name,
};
pub use typescript::{TypeScriptCompiler, to_safe_identifier};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// High-level API: canonicalize a root schema against `ledger` and compile it
/// as `type_name`.
///
/// Returns `Ok(None)` when the schema canonicalizes to `null`; no declaration
/// is produced for those.
pub async fn compile_root(
    compiler: &dyn SchemaCompiler,
    ledger: &HoistingLedger,
    schema: &serde_json::Value,
    type_name: &str,
) -> Result<Option<String>> {
    let canonical = Canonicalizer::new(ledger).canonicalize(schema, true);
    if canonical.is_null() {
        return Ok(None);
    }
    compiler.compile(&canonical, type_name, false).await.map(Some)
}
