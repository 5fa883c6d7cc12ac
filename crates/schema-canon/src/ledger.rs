//! Per-category record of referenced schema fragments.
//!
//! A fragment qualifies when it has both a non-empty `title` and a `$$ref`
//! marker. The first fragment seen under a given marker wins; later ones are
//! duplicates. At the end of a category pass the surviving fragments are
//! drained and compiled once as shared declarations.

use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::canonicalize::reference_id;

/// A fragment promoted to a shared named type.
#[derive(Debug, Clone, PartialEq)]
pub struct HoistedFragment {
    pub reference: String,
    pub title: String,
    pub schema: Value,
}

/// Insertion-ordered, first-writer-wins table keyed by reference id.
///
/// Inserts are a single critical section, so concurrent operation tasks of
/// one category can share a ledger by reference.
#[derive(Debug, Default)]
pub struct HoistingLedger {
    entries: Mutex<IndexMap<String, HoistedFragment>>,
}

impl HoistingLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<String, HoistedFragment>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Offer a node to the ledger.
    ///
    /// Returns `true` iff a fragment with the same reference id was already
    /// recorded, in which case this node is not stored.
    pub fn consider(&self, node: &Map<String, Value>) -> bool {
        let Some(title) = node
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
        else {
            return false;
        };
        let Some(reference) = reference_id(node) else {
            return false;
        };

        let mut entries = self.lock();
        if let Some(existing) = entries.get(&reference) {
            if !existing
                .schema
                .as_object()
                .is_some_and(|kept| same_fragment(kept, node))
            {
                tracing::warn!(
                    reference = %reference,
                    kept = %existing.title,
                    dropped = %title,
                    "Conflicting fragment shapes share one reference id; keeping the first"
                );
            }
            return true;
        }

        tracing::trace!(reference = %reference, title = %title, "Recorded hoisting candidate");
        entries.insert(
            reference.clone(),
            HoistedFragment {
                reference,
                title: title.to_string(),
                schema: Value::Object(node.clone()),
            },
        );
        false
    }

    /// Take every recorded fragment in first-seen order and reset the ledger.
    pub fn drain_all(&self) -> Vec<HoistedFragment> {
        self.lock().drain(..).map(|(_, fragment)| fragment).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Documentation keys that vary with where a fragment is used: a fragment
/// reached as a property inherits `description` from its title, one reached
/// as array items does not.
const USE_SITE_KEYS: &[&str] = &["description", "enumDesc"];

/// Whether two nodes carry the same fragment, ignoring use-site docs.
fn same_fragment(a: &Map<String, Value>, b: &Map<String, Value>) -> bool {
    fn shape(m: &Map<String, Value>) -> Vec<(&String, &Value)> {
        let mut fields: Vec<_> = m
            .iter()
            .filter(|(k, _)| !USE_SITE_KEYS.contains(&k.as_str()))
            .collect();
        fields.sort_by(|x, y| x.0.cmp(y.0));
        fields
    }
    shape(a) == shape(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test nodes are objects"),
        }
    }

    #[test]
    fn requires_title_and_reference() {
        let ledger = HoistingLedger::new();
        assert!(!ledger.consider(&node(json!({"title": "A"}))));
        assert!(!ledger.consider(&node(json!({"$$ref": "#/A"}))));
        assert!(!ledger.consider(&node(json!({"title": "", "$$ref": "#/A"}))));
        assert!(ledger.is_empty());
    }

    #[test]
    fn first_writer_wins() {
        let ledger = HoistingLedger::new();
        let first = node(json!({"title": "User", "$$ref": "#/User", "type": "object"}));
        let second = node(json!({"title": "User2", "$$ref": "#/User", "type": "string"}));
        let third = node(json!({"title": "User", "$$ref": "#/User", "type": "object"}));

        assert!(!ledger.consider(&first));
        assert!(ledger.consider(&second));
        assert!(ledger.consider(&third));

        let drained = ledger.drain_all();
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].title, "User");
        assert_eq!(drained[0].schema, Value::Object(first));
    }

    #[test]
    fn drain_preserves_first_seen_order_and_clears() {
        let ledger = HoistingLedger::new();
        for name in ["C", "A", "B"] {
            ledger.consider(&node(json!({"title": name, "$$ref": format!("#/{name}")})));
        }
        ledger.consider(&node(json!({"title": "A", "$$ref": "#/A"})));
        assert_eq!(ledger.len(), 3);

        let titles: Vec<_> = ledger.drain_all().into_iter().map(|f| f.title).collect();
        assert_eq!(titles, vec!["C", "A", "B"]);
        assert!(ledger.is_empty());
        assert!(ledger.drain_all().is_empty());
    }

    #[test]
    fn use_site_docs_do_not_make_fragments_differ() {
        let as_items = node(json!({"title": "Item", "$$ref": "#/Item", "type": "object"}));
        let as_property = node(json!({
            "title": "Item",
            "$$ref": "#/Item",
            "type": "object",
            "description": "Item"
        }));
        assert!(same_fragment(&as_items, &as_property));

        let other = node(json!({"title": "Item", "$$ref": "#/Item", "type": "string"}));
        assert!(!same_fragment(&as_items, &other));

        let ledger = HoistingLedger::new();
        assert!(!ledger.consider(&as_items));
        assert!(ledger.consider(&as_property));
        assert_eq!(ledger.drain_all()[0].schema, Value::Object(as_items));
    }

    #[test]
    fn numeric_reference_ids_are_accepted() {
        let ledger = HoistingLedger::new();
        assert!(!ledger.consider(&node(json!({"title": "N", "$$ref": 7}))));
        assert!(ledger.consider(&node(json!({"title": "N", "$$ref": "7"}))));
    }
}
