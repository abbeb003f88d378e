use std::collections::HashMap;
use std::sync::Arc;

use mpx_schemas::Document;
use serde_json::Value;

use crate::{EntityStore, Precondition, StoreError, WriteOp};

type Key = (String, String);

/// Optimistic transaction over an [`EntityStore`].
///
/// Reads go straight to the store and remember the version they saw. Writes
/// are staged locally and sent as one batch by [`Transaction::commit`]:
/// creates carry `MustNotExist`, updates carry the version observed at
/// read time. A concurrent writer therefore turns this commit into
/// [`StoreError::Conflict`] instead of a lost update.
///
/// Reads of a document already staged in this transaction return the staged
/// body (read-your-writes).
pub struct Transaction {
    store: Arc<dyn EntityStore>,
    read_versions: HashMap<Key, Option<u64>>,
    staged: HashMap<Key, usize>,
    writes: Vec<WriteOp>,
}

impl Transaction {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            read_versions: HashMap::new(),
            staged: HashMap::new(),
            writes: Vec::new(),
        }
    }

    pub async fn get<D: Document>(&mut self, id: &str) -> Result<Option<D>, StoreError> {
        let key = (D::COLLECTION.to_string(), id.to_string());
        if let Some(&idx) = self.staged.get(&key) {
            return decode(&key, &self.writes[idx].body).map(Some);
        }

        let found = self.store.get(D::COLLECTION, id).await?;
        let seen = found.as_ref().map(|v| v.version);
        let first = *self.read_versions.entry(key.clone()).or_insert(seen);
        if first != seen {
            // The document moved between two reads of the same transaction.
            return Err(conflict(&key));
        }

        match found {
            Some(v) => decode(&key, &v.body).map(Some),
            None => Ok(None),
        }
    }

    /// Documents of `D`'s collection whose string field `field` equals
    /// `value`. Each result is recorded as read so it can be updated.
    pub async fn query<D: Document>(
        &mut self,
        field: &str,
        value: &str,
    ) -> Result<Vec<D>, StoreError> {
        let hits = self.store.query_eq(D::COLLECTION, field, value).await?;
        let mut out = Vec::with_capacity(hits.len());
        for (id, doc) in hits {
            let key = (D::COLLECTION.to_string(), id);
            if let Some(&idx) = self.staged.get(&key) {
                out.push(decode(&key, &self.writes[idx].body)?);
                continue;
            }
            let first = *self
                .read_versions
                .entry(key.clone())
                .or_insert(Some(doc.version));
            if first != Some(doc.version) {
                return Err(conflict(&key));
            }
            out.push(decode(&key, &doc.body)?);
        }
        Ok(out)
    }

    /// Stage creation of a new document. Fails at commit if the id is taken.
    pub fn create<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let key = (D::COLLECTION.to_string(), doc.id().to_string());
        if self.staged.contains_key(&key) {
            return Err(StoreError::Usage(format!(
                "{}/{} staged twice",
                key.0, key.1
            )));
        }
        if let Some(Some(_)) = self.read_versions.get(&key) {
            return Err(conflict(&key));
        }
        let body = encode(&key, doc)?;
        self.stage(key, Precondition::MustNotExist, body);
        Ok(())
    }

    /// Stage an update of a document previously read in this transaction.
    pub fn update<D: Document>(&mut self, doc: &D) -> Result<(), StoreError> {
        let key = (D::COLLECTION.to_string(), doc.id().to_string());
        let body = encode(&key, doc)?;

        if let Some(&idx) = self.staged.get(&key) {
            self.writes[idx].body = body;
            return Ok(());
        }

        let version = match self.read_versions.get(&key) {
            Some(Some(version)) => *version,
            _ => {
                return Err(StoreError::Usage(format!(
                    "update of {}/{} without a prior read",
                    key.0, key.1
                )))
            }
        };
        self.stage(key, Precondition::Version(version), body);
        Ok(())
    }

    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    /// Send all staged writes as one atomic batch. A transaction without
    /// writes commits trivially.
    pub async fn commit(self) -> Result<(), StoreError> {
        if self.writes.is_empty() {
            return Ok(());
        }
        self.store.commit(self.writes).await
    }

    fn stage(&mut self, key: Key, precondition: Precondition, body: Value) {
        self.staged.insert(key.clone(), self.writes.len());
        self.writes.push(WriteOp {
            collection: key.0,
            id: key.1,
            precondition,
            body,
        });
    }
}

fn conflict(key: &Key) -> StoreError {
    StoreError::Conflict {
        collection: key.0.clone(),
        id: key.1.clone(),
    }
}

fn encode<D: Document>(key: &Key, doc: &D) -> Result<Value, StoreError> {
    serde_json::to_value(doc).map_err(|source| StoreError::Codec {
        collection: key.0.clone(),
        id: key.1.clone(),
        source,
    })
}

fn decode<D: Document>(key: &Key, body: &Value) -> Result<D, StoreError> {
    serde_json::from_value(body.clone()).map_err(|source| StoreError::Codec {
        collection: key.0.clone(),
        id: key.1.clone(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryStore;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        id: String,
        n: u64,
    }

    impl Document for Counter {
        const COLLECTION: &'static str = "counters";
        const ENTITY: &'static str = "counter";

        fn id(&self) -> &str {
            &self.id
        }
    }

    fn counter(n: u64) -> Counter {
        Counter {
            id: "c".to_string(),
            n,
        }
    }

    #[tokio::test]
    async fn read_your_writes() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let mut tx = Transaction::new(Arc::clone(&store));
        tx.create(&counter(0)).unwrap();
        let staged: Counter = tx.get("c").await.unwrap().unwrap();
        assert_eq!(staged.n, 0);
        tx.update(&counter(1)).unwrap();
        assert_eq!(tx.pending_writes(), 1);
        tx.commit().await.unwrap();

        let mut tx = Transaction::new(store);
        let c: Counter = tx.get("c").await.unwrap().unwrap();
        assert_eq!(c.n, 1);
    }

    #[tokio::test]
    async fn interleaved_updates_conflict() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let mut seed = Transaction::new(Arc::clone(&store));
        seed.create(&counter(0)).unwrap();
        seed.commit().await.unwrap();

        let mut a = Transaction::new(Arc::clone(&store));
        let mut b = Transaction::new(Arc::clone(&store));
        let ca: Counter = a.get("c").await.unwrap().unwrap();
        let cb: Counter = b.get("c").await.unwrap().unwrap();
        a.update(&counter(ca.n + 1)).unwrap();
        b.update(&counter(cb.n + 1)).unwrap();

        a.commit().await.unwrap();
        assert!(b.commit().await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn update_without_read_is_rejected() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let mut tx = Transaction::new(store);
        assert!(matches!(
            tx.update(&counter(3)),
            Err(StoreError::Usage(_))
        ));
    }

    #[tokio::test]
    async fn create_over_existing_read_conflicts() {
        let store: Arc<dyn EntityStore> = Arc::new(MemoryStore::new());
        let mut seed = Transaction::new(Arc::clone(&store));
        seed.create(&counter(0)).unwrap();
        seed.commit().await.unwrap();

        let mut tx = Transaction::new(store);
        let _: Option<Counter> = tx.get("c").await.unwrap();
        assert!(tx.create(&counter(9)).unwrap_err().is_conflict());
    }
}
