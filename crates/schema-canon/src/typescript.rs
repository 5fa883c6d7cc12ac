//! Built-in TypeScript declaration compiler.
//!
//! Lowers a [`CanonicalSchema`] to a small TypeScript type IR, then prints it.
//! Referenced fragments (non-root nodes that kept their title) become type
//! references; their declarations come from the category's hoisted block.

use std::collections::{HashSet, VecDeque};

use async_trait::async_trait;
use serde_json::Value;

use crate::compiler::SchemaCompiler;
use crate::error::{Result, SchemaError};
use crate::types::*;

const MAX_DEPTH: usize = 64;
const INDENT: usize = 2;

#[derive(Debug, Clone, PartialEq)]
enum TsType {
    Keyword(&'static str),
    Literal(String),
    Ref(String),
    Array(Box<TsType>),
    Tuple(Vec<TsType>),
    Union(Vec<TsType>),
    Object(Vec<TsProp>),
    /// `{ [key: string]: V }`
    Index(Box<TsType>),
}

#[derive(Debug, Clone, PartialEq)]
struct TsProp {
    name: String,
    ty: TsType,
    optional: bool,
    doc: Option<String>,
}

/// Compiles canonical schemas to `export interface` / `export type` text.
#[derive(Debug, Clone, Default)]
pub struct TypeScriptCompiler;

impl TypeScriptCompiler {
    pub fn new() -> Self {
        Self
    }

    /// Synchronous body of [`SchemaCompiler::compile`].
    pub fn compile_to_string(
        &self,
        schema: &CanonicalSchema,
        type_name: &str,
        declare_external: bool,
    ) -> Result<String> {
        let name = to_safe_identifier(type_name);
        if name.is_empty() {
            return Err(SchemaError::InvalidTypeName(type_name.to_string()));
        }

        let mut lowering = Lowering {
            type_name,
            externals: VecDeque::new(),
        };
        let mut out = self.declaration(&name, schema, &mut lowering)?;

        if declare_external {
            let mut declared = HashSet::from([name]);
            while let Some(fragment) = lowering.externals.pop_front() {
                let ext_name = fragment
                    .title
                    .as_deref()
                    .map(to_safe_identifier)
                    .unwrap_or_default();
                if !declared.insert(ext_name.clone()) {
                    continue;
                }
                out.push('\n');
                out.push_str(&self.declaration(&ext_name, &fragment, &mut lowering)?);
            }
        }

        Ok(out)
    }

    fn declaration(
        &self,
        name: &str,
        schema: &CanonicalSchema,
        lowering: &mut Lowering<'_>,
    ) -> Result<String> {
        let ty = lowering.lower(schema, true, 0)?;
        let mut out = doc_comment(schema.description.as_deref(), "");
        match ty {
            TsType::Object(ref props) => {
                out.push_str(&format!("export interface {name} "));
                out.push_str(&self.render_object(props, 0));
                out.push('\n');
            }
            other => {
                out.push_str(&format!("export type {name} = {};\n", self.render(&other, 0)));
            }
        }
        Ok(out)
    }

    fn pad(&self, level: usize) -> String {
        " ".repeat(INDENT * level)
    }

    fn render(&self, ty: &TsType, level: usize) -> String {
        match ty {
            TsType::Keyword(k) => (*k).to_string(),
            TsType::Literal(lit) => lit.clone(),
            TsType::Ref(name) => name.clone(),
            TsType::Array(inner) => {
                let inner_str = self.render(inner, level);
                if matches!(**inner, TsType::Union(ref members) if members.len() > 1) {
                    format!("({inner_str})[]")
                } else {
                    format!("{inner_str}[]")
                }
            }
            TsType::Tuple(items) => format!(
                "[{}]",
                items
                    .iter()
                    .map(|t| self.render(t, level))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            TsType::Union(members) => match members.as_slice() {
                [] => "unknown".to_string(),
                members => members
                    .iter()
                    .map(|t| self.render(t, level))
                    .collect::<Vec<_>>()
                    .join(" | "),
            },
            TsType::Object(props) => self.render_object(props, level),
            TsType::Index(value) => format!(
                "{{\n{}[key: string]: {};\n{}}}",
                self.pad(level + 1),
                self.render(value, level + 1),
                self.pad(level)
            ),
        }
    }

    fn render_object(&self, props: &[TsProp], level: usize) -> String {
        if props.is_empty() {
            return "{}".to_string();
        }
        let inner = self.pad(level + 1);
        let mut out = String::from("{\n");
        for prop in props {
            out.push_str(&doc_comment(prop.doc.as_deref(), &inner));
            out.push_str(&format!(
                "{inner}{}{}: {};\n",
                property_key(&prop.name),
                if prop.optional { "?" } else { "" },
                self.render(&prop.ty, level + 1)
            ));
        }
        out.push_str(&self.pad(level));
        out.push('}');
        out
    }
}

#[async_trait]
impl SchemaCompiler for TypeScriptCompiler {
    async fn compile(
        &self,
        schema: &CanonicalSchema,
        type_name: &str,
        declare_external: bool,
    ) -> Result<String> {
        self.compile_to_string(schema, type_name, declare_external)
    }
}

struct Lowering<'a> {
    type_name: &'a str,
    externals: VecDeque<CanonicalSchema>,
}

impl Lowering<'_> {
    fn lower(&mut self, schema: &CanonicalSchema, root: bool, depth: usize) -> Result<TsType> {
        if depth > MAX_DEPTH {
            return Err(SchemaError::TooDeep {
                type_name: self.type_name.to_string(),
                limit: MAX_DEPTH,
            });
        }

        if !root && schema.is_named_fragment() {
            let name = schema
                .title
                .as_deref()
                .map(to_safe_identifier)
                .unwrap_or_default();
            if !name.is_empty() {
                self.externals.push_back(schema.clone());
                return Ok(TsType::Ref(name));
            }
        }

        let ty = match &schema.shape {
            Shape::Null => TsType::Keyword("null"),
            Shape::Primitive(name) => {
                enum_union(schema).unwrap_or_else(|| TsType::Keyword(primitive_keyword(name)))
            }
            Shape::Array(items) => self.array(items.as_ref(), depth)?,
            Shape::Object(object) => TsType::Object(self.properties(object, depth)?),
            Shape::OneOf(branches) => {
                let mut members = Vec::new();
                for branch in branches {
                    push_unique(&mut members, self.lower(branch, false, depth + 1)?);
                }
                TsType::Union(members)
            }
            Shape::Map(value) => TsType::Index(Box::new(self.lower(value, false, depth + 1)?)),
            Shape::Multi(multi) => {
                if let Some(literals) = enum_union(schema) {
                    return Ok(literals);
                }
                let mut members = Vec::new();
                for name in &multi.types {
                    let member = match name.as_str() {
                        "array" => self.array(multi.items.as_ref(), depth)?,
                        "object" => match multi.object {
                            Some(ref object) => TsType::Object(self.properties(object, depth)?),
                            None => TsType::Index(Box::new(TsType::Keyword("unknown"))),
                        },
                        other => TsType::Keyword(primitive_keyword(other)),
                    };
                    push_unique(&mut members, member);
                }
                match members.len() {
                    1 => members.remove(0),
                    _ => TsType::Union(members),
                }
            }
        };
        Ok(ty)
    }

    fn array(&mut self, items: Option<&Items>, depth: usize) -> Result<TsType> {
        Ok(match items {
            None => TsType::Array(Box::new(TsType::Keyword("unknown"))),
            Some(Items::Single(item)) => {
                TsType::Array(Box::new(self.lower(item, false, depth + 1)?))
            }
            Some(Items::Tuple(items)) => {
                let mut members = Vec::with_capacity(items.len());
                for item in items {
                    members.push(self.lower(item, false, depth + 1)?);
                }
                TsType::Tuple(members)
            }
        })
    }

    fn properties(&mut self, object: &ObjectShape, depth: usize) -> Result<Vec<TsProp>> {
        let mut props = Vec::with_capacity(object.properties.len());
        for (name, schema) in &object.properties {
            props.push(TsProp {
                name: name.clone(),
                ty: self.lower(schema, false, depth + 1)?,
                optional: !object.is_required(name),
                doc: schema.description.clone(),
            });
        }
        Ok(props)
    }
}

fn primitive_keyword(name: &str) -> &'static str {
    match name {
        "string" => "string",
        "number" | "integer" => "number",
        "boolean" => "boolean",
        "null" => "null",
        _ => "unknown",
    }
}

fn enum_union(schema: &CanonicalSchema) -> Option<TsType> {
    let Some(Value::Array(values)) = schema.extra.get("enum") else {
        return None;
    };
    let mut members = Vec::new();
    for value in values {
        let member = match value {
            Value::String(s) => TsType::Literal(format!(
                "'{}'",
                s.replace('\\', "\\\\").replace('\'', "\\'")
            )),
            Value::Number(n) => TsType::Literal(n.to_string()),
            Value::Bool(b) => TsType::Literal(b.to_string()),
            Value::Null => TsType::Keyword("null"),
            _ => TsType::Keyword("unknown"),
        };
        push_unique(&mut members, member);
    }
    Some(TsType::Union(members))
}

fn push_unique(members: &mut Vec<TsType>, ty: TsType) {
    if !members.contains(&ty) {
        members.push(ty);
    }
}

fn doc_comment(text: Option<&str>, indent: &str) -> String {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return String::new();
    };
    let mut out = format!("{indent}/**\n");
    for line in text.lines() {
        let line = line.trim_end().replace("*/", "*\\/");
        if line.is_empty() {
            out.push_str(&format!("{indent} *\n"));
        } else {
            out.push_str(&format!("{indent} * {line}\n"));
        }
    }
    out.push_str(&format!("{indent} */\n"));
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_' || c == '$')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn property_key(name: &str) -> String {
    if is_identifier(name) {
        name.to_string()
    } else {
        format!("'{}'", name.replace('\\', "\\\\").replace('\'', "\\'"))
    }
}

/// PascalCase identifier from arbitrary text: `user_info` → `UserInfo`,
/// `Page«User»` → `PageUser`. Characters that cannot appear in an identifier
/// are dropped and start a new word; leading digits are dropped.
pub fn to_safe_identifier(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut upper_next = true;
    for c in text.chars() {
        if c.is_ascii_alphanumeric() || c == '$' {
            if out.is_empty() && c.is_ascii_digit() {
                continue;
            }
            if upper_next {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
            upper_next = c.is_ascii_digit() || c == '$';
        } else {
            upper_next = true;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalize::Canonicalizer;
    use crate::ledger::HoistingLedger;
    use serde_json::json;

    fn compile(schema: Value, name: &str, external: bool) -> String {
        let ledger = HoistingLedger::new();
        let canonical = Canonicalizer::new(&ledger).canonicalize(&schema, true);
        TypeScriptCompiler::new()
            .compile_to_string(&canonical, name, external)
            .unwrap()
    }

    #[test]
    fn safe_identifiers() {
        assert_eq!(to_safe_identifier("GetMockApiIdPath"), "GetMockApiIdPath");
        assert_eq!(to_safe_identifier("user_info"), "UserInfo");
        assert_eq!(to_safe_identifier("Page«User»"), "PageUser");
        assert_eq!(to_safe_identifier("2fa code"), "FaCode");
        assert_eq!(to_safe_identifier("用户"), "");
    }

    #[test]
    fn object_root_becomes_interface() {
        let out = compile(
            json!({
                "type": "object",
                "properties": {
                    "id": {"type": "string", "description": "Identifier"},
                    "count": {"type": "int"},
                    "dash-key": {"type": "boolean"}
                },
                "required": ["id"]
            }),
            "GetUserPath",
            false,
        );
        insta::assert_snapshot!(out, @r"
        export interface GetUserPath {
          /**
           * Identifier
           */
          id: string;
          count?: number;
          'dash-key'?: boolean;
        }
        ");
    }

    #[test]
    fn non_object_root_becomes_alias() {
        let out = compile(
            json!({"type": "array", "items": {"type": ["string", "int"]}}),
            "Tags",
            false,
        );
        assert_eq!(out, "export type Tags = (string | number)[];\n");
    }

    #[test]
    fn enums_become_literal_unions() {
        let out = compile(json!({"type": "string", "enum": ["on", "it's"]}), "Mode", false);
        assert_eq!(out, "export type Mode = 'on' | 'it\\'s';\n");
    }

    #[test]
    fn map_becomes_index_signature() {
        let out = compile(
            json!({
                "type": "object",
                "properties": {"a": {"type": "string"}, "b": {"type": "int"}},
                "required": ["@@MAP_KEY@@"]
            }),
            "Lookup",
            false,
        );
        assert_eq!(
            out,
            "export type Lookup = {\n  [key: string]: string | number;\n};\n"
        );
    }

    #[test]
    fn referenced_fragments_are_named_not_inlined() {
        let schema = json!({
            "type": "object",
            "properties": {
                "owner": {
                    "type": "object",
                    "title": "User Info",
                    "$$ref": "#/UserInfo",
                    "properties": {"name": {"type": "string"}}
                }
            }
        });

        let out = compile(schema.clone(), "Resp", false);
        assert!(out.contains("owner?: UserInfo;"));
        assert!(!out.contains("export interface UserInfo"));

        let out = compile(schema, "Resp", true);
        assert!(out.contains("export interface UserInfo {"));
        assert!(out.contains("name?: string;"));
    }

    #[test]
    fn untitled_identifier_fragment_is_inlined() {
        let out = compile(
            json!({
                "type": "object",
                "properties": {
                    "owner": {"type": "object", "title": "用户", "$$ref": "#/u", "properties": {}}
                }
            }),
            "Resp",
            false,
        );
        assert!(out.contains("owner?: {};"));
    }

    #[test]
    fn empty_type_name_is_rejected() {
        let err = TypeScriptCompiler::new()
            .compile_to_string(&CanonicalSchema::with_shape(Shape::Primitive("string".into())), "用户", false)
            .unwrap_err();
        assert!(matches!(err, SchemaError::InvalidTypeName(_)));
    }

    #[test]
    fn nesting_past_the_limit_is_rejected() {
        let mut schema = CanonicalSchema::with_shape(Shape::Primitive("string".into()));
        for _ in 0..=MAX_DEPTH {
            schema = CanonicalSchema::with_shape(Shape::Array(Some(Items::Single(Box::new(schema)))));
        }
        let err = TypeScriptCompiler::new()
            .compile_to_string(&schema, "Deep", false)
            .unwrap_err();
        assert!(matches!(err, SchemaError::TooDeep { limit: MAX_DEPTH, .. }));
    }

    #[tokio::test]
    async fn trait_object_compiles() {
        let compiler: Box<dyn SchemaCompiler> = Box::new(TypeScriptCompiler::new());
        let schema = CanonicalSchema::with_shape(Shape::Primitive("char".into()));
        let out = compiler.compile(&schema, "Letter", false).await.unwrap();
        assert_eq!(out, "export type Letter = unknown;\n");
    }
}
