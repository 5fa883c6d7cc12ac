//! Operation classification.
//!
//! Turns one [`RawOperation`] into an [`OperationRecord`]: the derived name,
//! the URL, the parameter groups and the body schemas, plus the structural
//! variant that fixes the generated function's arity.

use serde_json::{Map, Value, json};

use crate::catalog::{RawOperation, RawParam};

/// `(name, description)` of one path or query parameter, kept for doc comments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDoc {
    pub name: String,
    pub desc: String,
}

/// A schema together with the type name it will be declared under.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedSchema {
    pub type_name: String,
    pub schema: Value,
}

/// Path or query parameters as a JSON Schema object.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamGroup {
    pub schema: NamedSchema,
    pub docs: Vec<ParamDoc>,
}

impl ParamGroup {
    pub fn type_name(&self) -> &str {
        &self.schema.type_name
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.docs.iter().map(|d| d.name.as_str())
    }
}

/// Fields every operation has regardless of its parameter shape.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationCommon {
    /// PascalCase name derived from the path, e.g. `MockApiId`.
    pub name: String,
    /// Upper-case HTTP method.
    pub method: String,
    /// Base path + operation path, verbatim.
    pub url: String,
    pub title: String,
    pub request: Option<NamedSchema>,
    /// The response `data` schema, or `{type: null}`.
    pub response: NamedSchema,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OperationRecord {
    Normal {
        common: OperationCommon,
    },
    Query {
        common: OperationCommon,
        query: ParamGroup,
    },
    Path {
        common: OperationCommon,
        path: ParamGroup,
    },
    QueryAndPath {
        common: OperationCommon,
        query: ParamGroup,
        path: ParamGroup,
    },
}

impl OperationRecord {
    pub fn common(&self) -> &OperationCommon {
        match self {
            Self::Normal { common }
            | Self::Query { common, .. }
            | Self::Path { common, .. }
            | Self::QueryAndPath { common, .. } => common,
        }
    }

    pub fn query(&self) -> Option<&ParamGroup> {
        match self {
            Self::Query { query, .. } | Self::QueryAndPath { query, .. } => Some(query),
            Self::Normal { .. } | Self::Path { .. } => None,
        }
    }

    pub fn path(&self) -> Option<&ParamGroup> {
        match self {
            Self::Path { path, .. } | Self::QueryAndPath { path, .. } => Some(path),
            Self::Normal { .. } | Self::Query { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Normal { .. } => "normal",
            Self::Query { .. } => "query",
            Self::Path { .. } => "path",
            Self::QueryAndPath { .. } => "query&path",
        }
    }

    /// Schemas to compile, in declaration order: query, path, request, response.
    pub fn schemas(&self) -> Vec<&NamedSchema> {
        let common = self.common();
        let mut out = Vec::with_capacity(4);
        if let Some(query) = self.query() {
            out.push(&query.schema);
        }
        if let Some(path) = self.path() {
            out.push(&path.schema);
        }
        if let Some(ref request) = common.request {
            out.push(request);
        }
        out.push(&common.response);
        out
    }
}

/// Classify one operation. Total: every input yields a record.
pub fn classify(operation: &RawOperation, base_url: &str) -> OperationRecord {
    let name = derive_operation_name(&operation.path);
    let method = operation.method.trim().to_ascii_uppercase();
    let label = method_label(&method);
    let named = |kind: &str| type_name(&label, &name, kind);

    let query = param_group(&operation.req_query, false).map(|(schema, docs)| ParamGroup {
        schema: NamedSchema {
            type_name: named("Query"),
            schema,
        },
        docs,
    });
    let path = param_group(&operation.req_params, true).map(|(schema, docs)| ParamGroup {
        schema: NamedSchema {
            type_name: named("Path"),
            schema,
        },
        docs,
    });

    let common = OperationCommon {
        url: format!("{base_url}{}", operation.path),
        title: operation.title.clone(),
        request: request_schema(operation, &method).map(|schema| NamedSchema {
            type_name: named("RequestParams"),
            schema,
        }),
        response: NamedSchema {
            type_name: named("ResponseType"),
            schema: response_schema(operation),
        },
        name,
        method,
    };

    match (query, path) {
        (Some(query), Some(path)) => OperationRecord::QueryAndPath {
            common,
            query,
            path,
        },
        (Some(query), None) => OperationRecord::Query { common, query },
        (None, Some(path)) => OperationRecord::Path { common, path },
        (None, None) => OperationRecord::Normal { common },
    }
}

/// `/mock/api/{id}` → `MockApiId`, `/user-info/get_list` → `UserInfoGetList`.
///
/// Per segment: braces are removed and the first character is upper-cased
/// as is. After that `-`/`_` are dropped with the next character
/// upper-cased, and everything else is lower-cased (`/_id` → `_id`).
pub fn derive_operation_name(path: &str) -> String {
    let mut name = String::with_capacity(path.len());
    for segment in path.split('/') {
        let mut chars = segment.chars().filter(|c| !matches!(c, '{' | '}'));
        let Some(first) = chars.next() else {
            continue;
        };
        name.extend(first.to_uppercase());

        let mut upper_next = false;
        for c in chars {
            if matches!(c, '-' | '_') {
                upper_next = true;
            } else if upper_next {
                name.extend(c.to_uppercase());
                upper_next = false;
            } else {
                name.extend(c.to_lowercase());
            }
        }
    }
    name
}

/// `GET` → `Get`.
pub fn method_label(method: &str) -> String {
    let lower = method.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// `<Method><Name><Kind>`, e.g. `GetMockApiIdPath`.
pub fn type_name(method_label: &str, name: &str, kind: &str) -> String {
    format!(
        "{method_label}{}{kind}",
        schema_canon::to_safe_identifier(name)
    )
}

fn param_group(params: &[RawParam], all_required: bool) -> Option<(Value, Vec<ParamDoc>)> {
    if params.is_empty() {
        return None;
    }

    let mut properties = Map::new();
    let mut required = Vec::new();
    let mut docs = Vec::with_capacity(params.len());
    for param in params {
        let desc = param.desc.clone().unwrap_or_default();
        properties.insert(
            param.name.clone(),
            json!({"type": "string", "description": desc}),
        );
        if all_required || param.is_flagged_required() {
            required.push(param.name.clone());
        }
        docs.push(ParamDoc {
            name: param.name.clone(),
            desc,
        });
    }

    let schema = json!({
        "type": "object",
        "properties": properties,
        "required": required,
    });
    Some((schema, docs))
}

fn request_schema(operation: &RawOperation, method: &str) -> Option<Value> {
    if operation.req_body_type.as_deref() != Some("json") || method == "GET" {
        return None;
    }
    let body = operation
        .req_body_other
        .as_deref()
        .filter(|b| !b.trim().is_empty())?;
    match serde_json::from_str(body) {
        Ok(schema) => Some(schema),
        Err(e) => {
            tracing::warn!(
                path = %operation.path,
                error = %e,
                "Request body is not valid JSON, no request type generated"
            );
            None
        }
    }
}

fn response_schema(operation: &RawOperation) -> Value {
    let null = json!({"type": "null"});
    if operation.res_body_type.as_deref() != Some("json") || !operation.res_body_is_json_schema {
        return null;
    }
    let Some(body) = operation.res_body.as_deref().filter(|b| !b.trim().is_empty()) else {
        return null;
    };
    let envelope: Value = match serde_json::from_str(body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!(
                path = %operation.path,
                error = %e,
                "Response body is not valid JSON, no response type generated"
            );
            return null;
        }
    };
    match envelope.pointer("/properties/data") {
        Some(data) => data.clone(),
        None => null,
    }
}
