use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("cannot derive a TypeScript identifier from '{0}'")]
    InvalidTypeName(String),

    #[error("schema for '{type_name}' nests deeper than {limit} levels")]
    TooDeep { type_name: String, limit: usize },
}

pub type Result<T> = std::result::Result<T, SchemaError>;
