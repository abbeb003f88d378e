//! mpx-store
//!
//! Keyed document storage with per-document optimistic concurrency and
//! multi-document atomic commits.
//!
//! The workflow engine talks to storage only through [`EntityStore`]:
//!
//! - `get` returns a document body together with its version.
//! - `query_eq` returns every document of a collection whose top-level
//!   string field equals a value.
//! - `commit` applies a batch of writes atomically. Each write carries a
//!   [`Precondition`]; if any precondition fails, nothing is written and
//!   [`StoreError::Conflict`] is returned.
//!
//! [`Transaction`] builds such a batch from typed reads and writes.
//! Backends: [`MemoryStore`] (in-process) and [`PgStore`] (Postgres, sqlx).

mod memory;
mod pg;
mod tx;

pub use memory::MemoryStore;
pub use pg::{connect, connect_from_env, status, DbStatus, PgStore, ENV_DB_URL};
pub use tx::Transaction;

use async_trait::async_trait;
use serde_json::Value;

/// A stored document body plus its version. Versions start at 1 on create
/// and increase by one on every successful update.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub version: u64,
    pub body: Value,
}

/// Condition a write requires of the currently stored document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    /// The document must not exist yet (create).
    MustNotExist,
    /// The stored version must still equal this value (update).
    Version(u64),
}

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOp {
    pub collection: String,
    pub id: String,
    pub precondition: Precondition,
    pub body: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A precondition failed: someone else wrote the document first.
    #[error("write conflict on {collection}/{id}")]
    Conflict { collection: String, id: String },
    /// Transaction misuse, e.g. updating a document that was never read.
    #[error("invalid transaction usage: {0}")]
    Usage(String),
    #[error("document codec error on {collection}/{id}: {source}")]
    Codec {
        collection: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }
}

#[async_trait]
pub trait EntityStore: Send + Sync {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError>;

    /// Documents whose top-level field `field` is the JSON string `value`,
    /// as `(id, document)` pairs ordered by id.
    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Versioned)>, StoreError>;

    /// Apply all writes or none of them.
    async fn commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError>;
}
