//! Merge pass
//!
//! Splices cached documents into the objects that reference them. The pass
//! owns a private copy of the cache and removes each id as it is used, so
//! only the first reference to an id (in depth-first order) receives its
//! fields. Later references, including cyclic ones, are left as they are.

use super::cache::ResolutionCache;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub struct MergePass {
    remaining: HashMap<String, Map<String, Value>>,
}

impl MergePass {
    pub fn new(cache: &ResolutionCache) -> Self {
        Self {
            remaining: cache.working_copy(),
        }
    }

    /// Ids not yet merged anywhere
    pub fn remaining(&self) -> usize {
        self.remaining.len()
    }

    /// Walk `doc` and merge every referenced object. Returns the number of
    /// references that received fields.
    pub fn apply(&mut self, doc: &mut Value) -> usize {
        match doc {
            Value::Array(items) => items.iter_mut().map(|item| self.apply(item)).sum(),
            Value::Object(map) => self.apply_object(map),
            other => {
                tracing::warn!("Item: {} was passed but not handled", other);
                0
            }
        }
    }

    fn apply_object(&mut self, map: &mut Map<String, Value>) -> usize {
        let mut merged = 0;

        let fields = match map.get("id") {
            Some(Value::String(id)) => self.remaining.remove(id.as_str()),
            Some(other) => {
                tracing::debug!("Ignoring non-string id: {}", other);
                None
            }
            None => None,
        };
        if let Some(fields) = fields {
            // Referenced values win on collision
            map.extend(fields);
            merged += 1;
        }

        for value in map.values_mut() {
            match value {
                Value::Array(items) => {
                    for item in items.iter_mut().filter(|item| item.is_object()) {
                        merged += self.apply(item);
                    }
                }
                Value::Object(_) => merged += self.apply(value),
                _ => {}
            }
        }

        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache_with(docs: &[(&str, Value)]) -> ResolutionCache {
        let mut cache = ResolutionCache::new();
        for (id, doc) in docs {
            let slot = cache.claim(id).unwrap();
            cache.fulfil(slot, doc.clone());
        }
        cache
    }

    #[test]
    fn test_reference_receives_cached_fields() {
        let cache = cache_with(&[("b", json!({"id": "b", "name": "bee"}))]);
        let mut doc = json!({"id": "a", "child": {"id": "b"}});

        let merged = MergePass::new(&cache).apply(&mut doc);
        assert_eq!(merged, 1);
        assert_eq!(doc, json!({"id": "a", "child": {"id": "b", "name": "bee"}}));
    }

    #[test]
    fn test_cached_value_wins_collision() {
        let cache = cache_with(&[("b", json!({"id": "b", "kind": "real"}))]);
        let mut doc = json!({"child": {"id": "b", "kind": "stale", "extra": true}});

        MergePass::new(&cache).apply(&mut doc);
        assert_eq!(doc["child"]["kind"], "real");
        assert_eq!(doc["child"]["extra"], true);
    }

    #[test]
    fn test_only_first_reference_is_merged() {
        let cache = cache_with(&[("b", json!({"id": "b", "name": "bee"}))]);
        let mut doc = json!({"refs": [{"id": "b"}, {"id": "b"}]});

        let merged = MergePass::new(&cache).apply(&mut doc);
        assert_eq!(merged, 1);
        assert_eq!(doc["refs"][0]["name"], "bee");
        assert!(doc["refs"][1].get("name").is_none());
    }

    #[test]
    fn test_first_reference_follows_document_order() {
        let cache = cache_with(&[("B", json!({"id": "B", "name": "bee"}))]);
        let mut doc: Value =
            serde_json::from_str(r#"{"id": "A", "zeta": {"id": "B"}, "alpha": {"id": "B"}}"#)
                .unwrap();

        assert_eq!(MergePass::new(&cache).apply(&mut doc), 1);
        assert_eq!(doc["zeta"]["name"], "bee");
        assert!(doc["alpha"].get("name").is_none());
    }

    #[test]
    fn test_merge_keeps_existing_key_positions() {
        let cache = cache_with(&[("B", json!({"id": "B", "kind": "full", "extra": 1}))]);
        let mut doc: Value =
            serde_json::from_str(r#"{"child": {"kind": "stub", "id": "B"}}"#).unwrap();

        MergePass::new(&cache).apply(&mut doc);
        let keys: Vec<&str> = doc["child"]
            .as_object()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["kind", "id", "extra"]);
    }

    #[test]
    fn test_unknown_and_non_string_ids_are_skipped() {
        let cache = cache_with(&[]);
        let mut doc = json!({"a": {"id": "missing"}, "b": {"id": 7}});
        let before = doc.clone();

        assert_eq!(MergePass::new(&cache).apply(&mut doc), 0);
        assert_eq!(doc, before);
    }

    #[test]
    fn test_scalars_in_arrays_are_ignored() {
        let cache = cache_with(&[("b", json!({"id": "b", "n": 1}))]);
        let mut doc = json!({"list": [1, "two", null, {"id": "b"}]});

        MergePass::new(&cache).apply(&mut doc);
        assert_eq!(doc["list"], json!([1, "two", null, {"id": "b", "n": 1}]));
    }

    #[test]
    fn test_second_run_is_a_no_op() {
        let cache = cache_with(&[
            ("b", json!({"id": "b", "next": {"id": "c"}})),
            ("c", json!({"id": "c", "leaf": true})),
        ]);
        let mut doc = json!({"id": "a", "child": {"id": "b"}});

        let mut pass = MergePass::new(&cache);
        assert_eq!(pass.apply(&mut doc), 2);
        assert_eq!(pass.remaining(), 0);

        let snapshot = doc.clone();
        assert_eq!(pass.apply(&mut doc), 0);
        assert_eq!(doc, snapshot);
    }
}
