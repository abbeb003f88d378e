use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use mpx_store::{EntityStore, StoreError, Versioned, WriteOp};

/// Wraps a real store and injects failures into `commit`.
///
/// Injected failures reject the whole batch before it reaches the inner
/// store, so nothing is written.
pub struct FaultyStore {
    inner: Arc<dyn EntityStore>,
    fail_next: AtomicU32,
    conflict_next: AtomicU32,
    commits: AtomicU32,
}

impl FaultyStore {
    pub fn new(inner: Arc<dyn EntityStore>) -> Self {
        Self {
            inner,
            fail_next: AtomicU32::new(0),
            conflict_next: AtomicU32::new(0),
            commits: AtomicU32::new(0),
        }
    }

    /// Fail the next `n` commits with a backend error.
    pub fn fail_next_commits(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Fail the next `n` commits with a write conflict.
    pub fn conflict_next_commits(&self, n: u32) {
        self.conflict_next.store(n, Ordering::SeqCst);
    }

    /// Commit calls seen so far, including injected failures.
    pub fn commit_calls(&self) -> u32 {
        self.commits.load(Ordering::SeqCst)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl EntityStore for FaultyStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError> {
        self.inner.get(collection, id).await
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Versioned)>, StoreError> {
        self.inner.query_eq(collection, field, value).await
    }

    async fn commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError> {
        self.commits.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.fail_next) {
            return Err(StoreError::Backend("injected commit failure".to_string()));
        }
        if take_one(&self.conflict_next) {
            let (collection, id) = writes
                .first()
                .map(|w| (w.collection.clone(), w.id.clone()))
                .unwrap_or_default();
            return Err(StoreError::Conflict { collection, id });
        }
        self.inner.commit(writes).await
    }
}
