//! Schema canonicalization.
//!
//! Rewrites one raw catalog schema into a [`CanonicalSchema`], depth first.
//! Every node passes through the [`HoistingLedger`] before its type is folded,
//! so a whole category's worth of referenced fragments accumulates as a side
//! effect of canonicalizing its operations.

use std::borrow::Cow;

use indexmap::IndexMap;
use serde_json::{Map, Value, json};

use crate::ledger::HoistingLedger;
use crate::types::*;

/// Keywords interpreted by the canonicalizer; never copied into `extra`.
const INTERPRETED: &[&str] = &[
    "type",
    "title",
    "description",
    "additionalProperties",
    "required",
    REFERENCE_MARKER,
];

/// Canonicalizes schemas against one category's ledger.
pub struct Canonicalizer<'a> {
    ledger: &'a HoistingLedger,
}

impl<'a> Canonicalizer<'a> {
    pub fn new(ledger: &'a HoistingLedger) -> Self {
        Self { ledger }
    }

    /// Canonicalize `schema`. Root schemas are named by the caller, so their
    /// title is always dropped.
    pub fn canonicalize(&self, schema: &Value, is_root: bool) -> CanonicalSchema {
        let mut node = match schema {
            Value::Object(map) => map.clone(),
            _ => Map::new(),
        };

        strip_title(&mut node, is_root);
        let (node, keyed) = inject_map_key(node);
        self.ledger.consider(&node);

        let mapped = map_type(node.get("type"));
        let mut out = CanonicalSchema::with_shape(Shape::Null);
        out.title = node.get("title").and_then(Value::as_str).map(str::to_owned);
        out.description = node
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_owned);
        out.reference = reference_id(&node);

        match mapped {
            MappedType::Single(ty) => match ty.as_str() {
                "null" => return CanonicalSchema::null(),
                "array" => {
                    out.shape = Shape::Array(self.items(&node));
                    out.extra = extras(&node, &["items"]);
                }
                "object" => {
                    if let Some(Value::Array(branches)) = node.get("oneOf") {
                        out.shape = Shape::OneOf(
                            branches
                                .iter()
                                .map(|branch| self.canonicalize(branch, false))
                                .collect(),
                        );
                        out.extra = extras(&node, &["oneOf"]);
                    } else if let Some(value) = map_value(&node, keyed) {
                        out.shape = Shape::Map(Box::new(self.canonicalize(value, false)));
                        out.extra = extras(&node, &["properties"]);
                    } else {
                        out.shape = Shape::Object(self.object(&node));
                        out.extra = extras(&node, &["properties"]);
                    }
                }
                _ => {
                    out.shape = Shape::Primitive(ty);
                    out.extra = extras(&node, &[]);
                }
            },
            MappedType::Union(types) => {
                let items = if types.iter().any(|t| t == "array") {
                    self.items(&node)
                } else {
                    None
                };
                let object = if types.iter().any(|t| t == "object") {
                    Some(self.object(&node))
                } else {
                    None
                };
                let mut consumed = Vec::new();
                if items.is_some() {
                    consumed.push("items");
                }
                if object.is_some() {
                    consumed.push("properties");
                }
                out.extra = extras(&node, &consumed);
                out.shape = Shape::Multi(MultiShape {
                    types,
                    items,
                    object,
                });
            }
        }

        out
    }

    fn items(&self, node: &Map<String, Value>) -> Option<Items> {
        match node.get("items")? {
            Value::Array(items) => Some(Items::Tuple(
                items
                    .iter()
                    .map(|item| self.canonicalize(item, false))
                    .collect(),
            )),
            item => Some(Items::Single(Box::new(self.canonicalize(item, false)))),
        }
    }

    fn object(&self, node: &Map<String, Value>) -> ObjectShape {
        let mut properties = IndexMap::new();
        if let Some(Value::Object(props)) = node.get("properties") {
            for (name, value) in props {
                let value = fold_property_docs(value);
                properties.insert(name.clone(), self.canonicalize(&value, false));
            }
        }

        ObjectShape {
            properties,
            required: trimmed_required(node),
        }
    }
}

/// Drop `title` from roots, and from any other node that is not a referenced
/// fragment.
fn strip_title(node: &mut Map<String, Value>, is_root: bool) {
    if is_root || !node.contains_key(REFERENCE_MARKER) {
        node.remove("title");
    }
}

/// Rewrite the dialect's map encoding into a map node.
///
/// `{ properties: {a: A, b: B}, required: ["@@MAP_KEY@@"] }` becomes
/// `{ type: object, additionalProperties: { type: object, oneOf: [A, B] } }`.
/// The flag reports whether the rewrite happened.
pub fn inject_map_key(mut node: Map<String, Value>) -> (Map<String, Value>, bool) {
    let is_map = node
        .get("required")
        .and_then(Value::as_array)
        .is_some_and(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .any(|name| name.trim() == MAP_KEY_SENTINEL)
        });
    if !is_map {
        return (node, false);
    }
    let Some(Value::Object(properties)) = node.remove("properties") else {
        return (node, false);
    };

    node.remove("required");
    let branches: Vec<Value> = properties.into_iter().map(|(_, v)| v).collect();
    node.insert("type".into(), json!("object"));
    node.insert(
        "additionalProperties".into(),
        json!({"type": "object", "oneOf": branches}),
    );
    (node, true)
}

/// Value schema of a map node: one just rewritten from the sentinel, or an
/// already canonical map (object-valued `additionalProperties` and no
/// `properties`). Anything else with declared properties stays an object.
fn map_value(node: &Map<String, Value>, keyed: bool) -> Option<&Value> {
    let value @ Value::Object(_) = node.get("additionalProperties")? else {
        return None;
    };
    (keyed || !node.contains_key("properties")).then_some(value)
}

/// Property-level documentation fixes: inherit `description` from `title`,
/// fold `enumDesc` into `description`.
fn fold_property_docs(value: &Value) -> Cow<'_, Value> {
    let Value::Object(map) = value else {
        return Cow::Borrowed(value);
    };
    let has_description = map
        .get("description")
        .and_then(Value::as_str)
        .is_some_and(|d| !d.is_empty());
    if has_description && !map.contains_key("enumDesc") {
        return Cow::Borrowed(value);
    }

    let mut map = map.clone();
    if !has_description {
        match map.get("title").cloned() {
            Some(title @ Value::String(_)) => {
                map.insert("description".into(), title);
            }
            _ => {
                map.remove("description");
            }
        }
    }
    if let Some(enum_desc) = map.remove("enumDesc") {
        let enum_desc = match enum_desc {
            Value::String(s) => s,
            other => other.to_string(),
        };
        let description = match map.get("description").and_then(Value::as_str) {
            Some(existing) if !existing.is_empty() => format!("{existing} ({enum_desc})"),
            _ => enum_desc,
        };
        map.insert("description".into(), json!(description));
    }
    Cow::Owned(Value::Object(map))
}

fn trimmed_required(node: &Map<String, Value>) -> Vec<String> {
    node.get("required")
        .and_then(Value::as_array)
        .map(|required| {
            required
                .iter()
                .filter_map(Value::as_str)
                .map(|name| name.trim().to_string())
                .collect()
        })
        .unwrap_or_default()
}

/// Reference ids are usually strings; tolerate numbers.
pub(crate) fn reference_id(node: &Map<String, Value>) -> Option<String> {
    match node.get(REFERENCE_MARKER)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn extras(node: &Map<String, Value>, consumed: &[&str]) -> Map<String, Value> {
    node.iter()
        .filter(|(k, _)| !INTERPRETED.contains(&k.as_str()) && !consumed.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
