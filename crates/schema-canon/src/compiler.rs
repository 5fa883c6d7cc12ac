//! The schema-compiler seam.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::CanonicalSchema;

/// Turns one canonical schema into source text declaring `type_name`.
///
/// Callers never hand a `null` schema to a compiler; "no type" is decided
/// before the call.
#[async_trait]
pub trait SchemaCompiler: Send + Sync {
    /// `declare_external`: also emit declarations for referenced fragments
    /// instead of only naming them.
    async fn compile(
        &self,
        schema: &CanonicalSchema,
        type_name: &str,
        declare_external: bool,
    ) -> Result<String>;
}
