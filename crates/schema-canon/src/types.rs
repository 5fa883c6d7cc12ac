//! Canonical schema model.
//!
//! The catalog speaks a loose JSON Schema dialect: Java-flavoured type aliases,
//! missing types meaning "null", whitespace in `required`, and a sentinel
//! property that encodes `{ [key: string]: V }`. [`CanonicalSchema`] is the
//! strict subset the compiler accepts.

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

/// Reserved name in `required` marking an object as a string-keyed map.
pub const MAP_KEY_SENTINEL: &str = "@@MAP_KEY@@";

/// Reference-identity marker the catalog attaches to fragments that came from
/// one named definition. Only used to deduplicate, never resolved.
pub const REFERENCE_MARKER: &str = "$$ref";

// ---------------------------------------------------------------------------
// Type mapping
// ---------------------------------------------------------------------------

/// Map one catalog type name (case-insensitive) to its canonical name.
/// Unrecognized names pass through unchanged.
pub fn map_type_name(name: &str) -> String {
    match name.to_ascii_lowercase().as_str() {
        "byte" | "short" | "int" | "long" => "integer".to_string(),
        "float" | "double" | "bigdecimal" => "number".to_string(),
        "char" => "string".to_string(),
        "void" => "null".to_string(),
        _ => name.to_string(),
    }
}

/// Result of mapping a raw `type` keyword.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappedType {
    Single(String),
    /// `type` was an array; order and duplicates are kept.
    Union(Vec<String>),
}

impl MappedType {
    pub fn includes(&self, name: &str) -> bool {
        match self {
            Self::Single(t) => t == name,
            Self::Union(types) => types.iter().any(|t| t == name),
        }
    }
}

/// Map a raw `type` keyword. An absent (or non-string) type is the catalog's
/// way of saying "null".
pub fn map_type(ty: Option<&Value>) -> MappedType {
    match ty {
        Some(Value::String(name)) => MappedType::Single(map_type_name(name)),
        Some(Value::Array(names)) => MappedType::Union(
            names
                .iter()
                .filter_map(Value::as_str)
                .map(map_type_name)
                .collect(),
        ),
        _ => MappedType::Single("null".to_string()),
    }
}

// ---------------------------------------------------------------------------
// Canonical schema
// ---------------------------------------------------------------------------

/// One node of a canonicalized schema.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalSchema {
    pub shape: Shape,
    /// Only kept on referenced fragments; those compile to named types.
    pub title: Option<String>,
    pub description: Option<String>,
    pub reference: Option<String>,
    /// Sibling keywords the canonicalizer does not interpret (`enum`, `format`, ...).
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Null,
    /// Any non-container type name, canonical or passed through.
    Primitive(String),
    Array(Option<Items>),
    Object(ObjectShape),
    /// `type: object` whose value is exactly one of the branches.
    OneOf(Vec<CanonicalSchema>),
    /// String-keyed map; the payload is the value schema.
    Map(Box<CanonicalSchema>),
    /// `type` was an array of names; container parts present when applicable.
    Multi(MultiShape),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectShape {
    pub properties: IndexMap<String, CanonicalSchema>,
    pub required: Vec<String>,
}

impl ObjectShape {
    pub fn is_required(&self, name: &str) -> bool {
        self.required.iter().any(|r| r == name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Items {
    Single(Box<CanonicalSchema>),
    Tuple(Vec<CanonicalSchema>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MultiShape {
    pub types: Vec<String>,
    pub items: Option<Items>,
    pub object: Option<ObjectShape>,
}

impl CanonicalSchema {
    pub fn null() -> Self {
        Self::with_shape(Shape::Null)
    }

    pub fn with_shape(shape: Shape) -> Self {
        Self {
            shape,
            title: None,
            description: None,
            reference: None,
            extra: Map::new(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.shape, Shape::Null)
    }

    /// Referenced fragments keep their title and compile to a named type.
    pub fn is_named_fragment(&self) -> bool {
        self.reference.is_some() && self.title.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Render back to JSON Schema. Canonicalizing the result again yields an
    /// equal node.
    pub fn to_value(&self) -> Value {
        let mut map = self.extra.clone();
        if let Some(ref title) = self.title {
            map.insert("title".into(), json!(title));
        }
        if let Some(ref description) = self.description {
            map.insert("description".into(), json!(description));
        }
        if let Some(ref reference) = self.reference {
            map.insert(REFERENCE_MARKER.into(), json!(reference));
        }

        match &self.shape {
            Shape::Null => return json!({"type": "null"}),
            Shape::Primitive(ty) => {
                map.insert("type".into(), json!(ty));
            }
            Shape::Array(items) => {
                map.insert("type".into(), json!("array"));
                if let Some(items) = items {
                    map.insert("items".into(), items.to_value());
                }
            }
            Shape::Object(object) => {
                map.insert("type".into(), json!("object"));
                object.write_into(&mut map);
            }
            Shape::OneOf(branches) => {
                map.insert("type".into(), json!("object"));
                map.insert(
                    "oneOf".into(),
                    Value::Array(branches.iter().map(Self::to_value).collect()),
                );
            }
            Shape::Map(value) => {
                map.insert("type".into(), json!("object"));
                map.insert("additionalProperties".into(), value.to_value());
                return Value::Object(map);
            }
            Shape::Multi(multi) => {
                map.insert("type".into(), json!(multi.types));
                if let Some(ref items) = multi.items {
                    map.insert("items".into(), items.to_value());
                }
                if let Some(ref object) = multi.object {
                    object.write_into(&mut map);
                }
            }
        }

        map.insert("additionalProperties".into(), json!(false));
        Value::Object(map)
    }
}

impl ObjectShape {
    fn write_into(&self, map: &mut Map<String, Value>) {
        let properties: Map<String, Value> = self
            .properties
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect();
        map.insert("properties".into(), Value::Object(properties));
        if !self.required.is_empty() {
            map.insert("required".into(), json!(self.required));
        }
    }
}

impl Items {
    pub fn to_value(&self) -> Value {
        match self {
            Self::Single(item) => item.to_value(),
            Self::Tuple(items) => Value::Array(items.iter().map(CanonicalSchema::to_value).collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_integer_width_aliases() {
        for alias in ["byte", "Short", "INT", "long"] {
            assert_eq!(map_type_name(alias), "integer");
        }
        for alias in ["float", "Double", "BigDecimal"] {
            assert_eq!(map_type_name(alias), "number");
        }
        assert_eq!(map_type_name("char"), "string");
        assert_eq!(map_type_name("Void"), "null");
    }

    #[test]
    fn unknown_names_pass_through_unchanged() {
        assert_eq!(map_type_name("string"), "string");
        assert_eq!(map_type_name("Object"), "Object");
        assert_eq!(map_type_name("LocalDateTime"), "LocalDateTime");
    }

    #[test]
    fn absent_type_is_null() {
        assert_eq!(map_type(None), MappedType::Single("null".into()));
        assert_eq!(map_type(Some(&json!(42))), MappedType::Single("null".into()));
    }

    #[test]
    fn type_arrays_map_element_wise_keeping_duplicates() {
        let mapped = map_type(Some(&json!(["int", "long", "string", "int"])));
        assert_eq!(
            mapped,
            MappedType::Union(vec![
                "integer".into(),
                "integer".into(),
                "string".into(),
                "integer".into()
            ])
        );
        assert!(mapped.includes("string"));
        assert!(!mapped.includes("array"));
    }

    #[test]
    fn null_renders_without_other_fields() {
        let mut schema = CanonicalSchema::null();
        schema.description = Some("ignored".into());
        assert_eq!(schema.to_value(), json!({"type": "null"}));
    }

    #[test]
    fn map_renders_value_schema_as_additional_properties() {
        let value = CanonicalSchema::with_shape(Shape::Primitive("string".into()));
        let schema = CanonicalSchema::with_shape(Shape::Map(Box::new(value)));
        assert_eq!(
            schema.to_value(),
            json!({
                "type": "object",
                "additionalProperties": {"type": "string", "additionalProperties": false}
            })
        );
    }
}
