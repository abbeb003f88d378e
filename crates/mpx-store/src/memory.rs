use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::{EntityStore, Precondition, StoreError, Versioned, WriteOp};

type Key = (String, String);

/// In-process store. A single lock serializes commits, so a batch is
/// validated and applied without interleaving.
#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<Key, Versioned>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in `collection`.
    pub async fn count(&self, collection: &str) -> usize {
        self.docs
            .read()
            .await
            .keys()
            .filter(|(c, _)| c == collection)
            .count()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .get(&(collection.to_string(), id.to_string()))
            .cloned())
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Versioned)>, StoreError> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .filter(|((c, _), d)| {
                c == collection && d.body.get(field).and_then(Value::as_str) == Some(value)
            })
            .map(|((_, id), d)| (id.clone(), d.clone()))
            .collect())
    }

    async fn commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut docs = self.docs.write().await;

        // Validate every precondition before touching anything.
        for w in &writes {
            let current = docs.get(&(w.collection.clone(), w.id.clone()));
            let ok = match (w.precondition, current) {
                (Precondition::MustNotExist, None) => true,
                (Precondition::Version(v), Some(d)) => d.version == v,
                _ => false,
            };
            if !ok {
                return Err(StoreError::Conflict {
                    collection: w.collection.clone(),
                    id: w.id.clone(),
                });
            }
        }

        for w in writes {
            let version = match w.precondition {
                Precondition::MustNotExist => 1,
                Precondition::Version(v) => v + 1,
            };
            docs.insert(
                (w.collection, w.id),
                Versioned {
                    version,
                    body: w.body,
                },
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(id: &str, body: Value) -> WriteOp {
        WriteOp {
            collection: "things".to_string(),
            id: id.to_string(),
            precondition: Precondition::MustNotExist,
            body,
        }
    }

    #[tokio::test]
    async fn create_then_update_bumps_version() {
        let store = MemoryStore::new();
        store.commit(vec![create("a", json!({"n": 1}))]).await.unwrap();
        assert_eq!(store.get("things", "a").await.unwrap().unwrap().version, 1);

        store
            .commit(vec![WriteOp {
                collection: "things".to_string(),
                id: "a".to_string(),
                precondition: Precondition::Version(1),
                body: json!({"n": 2}),
            }])
            .await
            .unwrap();
        let d = store.get("things", "a").await.unwrap().unwrap();
        assert_eq!(d.version, 2);
        assert_eq!(d.body["n"], 2);
    }

    #[tokio::test]
    async fn failed_precondition_writes_nothing() {
        let store = MemoryStore::new();
        store.commit(vec![create("a", json!({}))]).await.unwrap();

        let err = store
            .commit(vec![create("b", json!({})), create("a", json!({}))])
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.get("things", "b").await.unwrap().is_none());
        assert_eq!(store.count("things").await, 1);
    }

    #[tokio::test]
    async fn stale_version_conflicts() {
        let store = MemoryStore::new();
        store.commit(vec![create("a", json!({}))]).await.unwrap();
        let stale = WriteOp {
            collection: "things".to_string(),
            id: "a".to_string(),
            precondition: Precondition::Version(1),
            body: json!({"x": 1}),
        };
        store.commit(vec![stale.clone()]).await.unwrap();
        assert!(store.commit(vec![stale]).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn query_matches_string_fields_only_in_collection() {
        let store = MemoryStore::new();
        store
            .commit(vec![
                create("q1", json!({"rfqId": "R1"})),
                create("q2", json!({"rfqId": "R2"})),
                create("q3", json!({"rfqId": "R1"})),
                WriteOp {
                    collection: "others".to_string(),
                    id: "x".to_string(),
                    precondition: Precondition::MustNotExist,
                    body: json!({"rfqId": "R1"}),
                },
            ])
            .await
            .unwrap();

        let hits = store.query_eq("things", "rfqId", "R1").await.unwrap();
        let ids: Vec<_> = hits.iter().map(|(id, _)| id.as_str()).collect();
        assert_eq!(ids, vec!["q1", "q3"]);
    }
}
