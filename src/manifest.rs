//! Declarative bundle parsing.
//!
//! A bundle file holds one or more resource definitions. Build pipelines
//! emit either multi-document YAML or a single `v1 List` wrapping the
//! resources as `items`; both shapes parse to the same flat document list.

use serde::Deserialize;
use serde_json::Value;

/// Splits a bundle into its resource documents. Blank documents are
/// skipped and a top-level `List` contributes its items in place.
pub fn parse_bundle(source: &str) -> Result<Vec<Value>, serde_yaml::Error> {
    let mut docs = Vec::new();
    for document in serde_yaml::Deserializer::from_str(source) {
        let mut value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        if value.get("kind").and_then(Value::as_str) == Some("List") {
            if let Some(Value::Array(items)) = value.get_mut("items").map(Value::take) {
                docs.extend(items);
            }
        } else {
            docs.push(value);
        }
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_multi_document_bundles() {
        let docs = parse_bundle(
            "apiVersion: v1\nkind: Service\nmetadata:\n  name: one\n---\napiVersion: v1\nkind: Secret\nmetadata:\n  name: two\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Service");
        assert_eq!(docs[1]["metadata"]["name"], "two");
    }

    #[test]
    fn expands_list_items_in_place() {
        let docs = parse_bundle(
            "apiVersion: v1\nkind: List\nitems:\n  - kind: Service\n    metadata:\n      name: svc\n  - kind: Route\n    metadata:\n      name: rt\n",
        )
        .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0]["kind"], "Service");
        assert_eq!(docs[1]["kind"], "Route");
    }

    #[test]
    fn skips_blank_documents() {
        let docs = parse_bundle("---\n\n---\nkind: Service\nmetadata:\n  name: only\n---\n").unwrap();
        assert_eq!(docs.len(), 1);
    }

    #[test]
    fn rejects_unparseable_yaml() {
        assert!(parse_bundle("kind: [unclosed").is_err());
    }

    #[test]
    fn a_list_without_items_is_empty() {
        assert_eq!(parse_bundle("kind: List\n").unwrap().len(), 0);
    }
}
