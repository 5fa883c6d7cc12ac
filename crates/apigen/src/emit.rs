//! Request-function source text.

use crate::classify::OperationRecord;

const CONFIG_ARG: &str = "config?: AxiosRequestConfig";

/// Type names actually declared for one operation. A `None` slot means no
/// type was produced (absent or `null` schema).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeclaredTypes {
    pub query: Option<String>,
    pub path: Option<String>,
    pub request: Option<String>,
    pub response: Option<String>,
}

impl DeclaredTypes {
    /// Declared names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        [&self.query, &self.path, &self.request, &self.response]
            .into_iter()
            .filter_map(|name| name.as_deref())
    }
}

/// `get` + `MockApiId` → `getMockApiId`.
pub fn function_name(record: &OperationRecord) -> String {
    let common = record.common();
    format!("{}{}", common.method.to_ascii_lowercase(), common.name)
}

/// The request helper a function calls, e.g. `getRequest`.
pub fn helper_name(method: &str) -> String {
    format!("{}Request", method.to_ascii_lowercase())
}

fn sends_data(record: &OperationRecord, types: &DeclaredTypes) -> bool {
    types.request.is_some() || record.common().method != "GET"
}

/// Parameter list: path, query, body, config, in that order.
pub fn parameters(record: &OperationRecord, types: &DeclaredTypes) -> String {
    let mut params = Vec::with_capacity(4);
    if let (Some(_), Some(name)) = (record.path(), types.path.as_deref()) {
        params.push(format!("path: {name}"));
    }
    if let (Some(_), Some(name)) = (record.query(), types.query.as_deref()) {
        params.push(format!("query: {name}"));
    }
    match types.request.as_deref() {
        Some(name) => params.push(format!("data: {name}")),
        None if sends_data(record, types) => {
            params.push("data?: Record<string, unknown>".to_string())
        }
        None => {}
    }
    params.push(CONFIG_ARG.to_string());
    params.join(", ")
}

/// URL expression: a template literal substituting path parameters, or a
/// plain string when there are none.
pub fn url_expression(record: &OperationRecord) -> String {
    let url = &record.common().url;
    let Some(path) = record.path() else {
        return format!("\"{}\"", url.replace('\\', "\\\\").replace('"', "\\\""));
    };

    let mut url = url.replace('`', "\\`");
    for key in path.names() {
        let accessor = if is_identifier(key) {
            format!("path.{key}")
        } else {
            format!("path['{}']", key.replace('\'', "\\'"))
        };
        url = url.replace(&format!("{{{key}}}"), &format!("${{{accessor}}}"));
    }
    format!("`{url}`")
}

fn call_options(record: &OperationRecord, types: &DeclaredTypes) -> String {
    let mut fields = Vec::with_capacity(3);
    if record.query().is_some() {
        fields.push("query");
    }
    if sends_data(record, types) {
        fields.push("data");
    }
    fields.push("config");
    format!("{{ {} }}", fields.join(", "))
}

fn doc_block(record: &OperationRecord) -> String {
    let title = record.common().title.trim();
    let mut lines = Vec::new();
    if !title.is_empty() {
        lines.push(" * @remarks".to_string());
        lines.extend(title.lines().map(|line| format!(" * {}", line.trim_end())));
    }
    for (prefix, group) in [("path", record.path()), ("query", record.query())] {
        let Some(group) = group else { continue };
        for doc in &group.docs {
            let desc = doc.desc.trim();
            if desc.is_empty() {
                lines.push(format!(" * @param {prefix}.{}", doc.name));
            } else {
                lines.push(format!(" * @param {prefix}.{} - {desc}", doc.name));
            }
        }
    }
    if lines.is_empty() {
        return String::new();
    }
    format!("/**\n{}\n */\n", lines.join("\n").replace("*/", "*\\/"))
}

/// One exported request function, preceded by a blank line.
pub fn render_function(record: &OperationRecord, types: &DeclaredTypes) -> String {
    let method = &record.common().method;
    let response = types.response.as_deref().unwrap_or("never");
    format!(
        "\n{doc}export const {name} = ({params}) => {{\n  return {helper}<{response}>({url}, {options});\n}};\n",
        doc = doc_block(record),
        name = function_name(record),
        params = parameters(record, types),
        helper = helper_name(method),
        url = url_expression(record),
        options = call_options(record, types),
    )
}

/// Request-helper import header for the methods used in a file.
pub fn import_header<S: AsRef<str>>(methods: &[S], request_api_path: &str) -> String {
    let helpers: Vec<String> = methods.iter().map(|m| helper_name(m.as_ref())).collect();
    let body = match helpers.as_slice() {
        [single] => format!("\t{single}\n"),
        many => many.iter().map(|h| format!("\t{h},\n")).collect(),
    };
    format!(
        "import {{\n{body}}} from '{request_api_path}';\nimport type {{ AxiosRequestConfig }} from 'axios';\n"
    )
}

pub const TYPE_IMPORT_OPENER: &str = "import type {\n";

/// One entry of the type import list.
pub fn type_import_entry(type_name: &str) -> String {
    format!("\t{type_name},\n")
}

pub fn type_import_closer(file_name: &str) -> String {
    format!("}} from './{file_name}.type';\n")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
