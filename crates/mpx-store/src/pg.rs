use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use tracing::debug;

use crate::{EntityStore, Precondition, StoreError, Versioned, WriteOp};

pub const ENV_DB_URL: &str = "MPX_DATABASE_URL";

/// Connect to Postgres using MPX_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;
    connect(&url, 10).await
}

pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;
    Ok(pool)
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name='documents'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_documents_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_documents_table: bool,
}

/// Postgres-backed [`EntityStore`]: one `documents` table, one SQL
/// transaction per commit.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect_from_env() -> Result<Self> {
        Ok(Self::new(connect_from_env().await?))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run embedded SQLx migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("db migrate failed")?;
        Ok(())
    }
}

#[async_trait]
impl EntityStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> Result<Option<Versioned>, StoreError> {
        let row = sqlx::query(
            r#"
            select version, body
            from documents
            where collection = $1 and id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(|r| versioned_from_row(&r)).transpose()
    }

    async fn query_eq(
        &self,
        collection: &str,
        field: &str,
        value: &str,
    ) -> Result<Vec<(String, Versioned)>, StoreError> {
        let rows = sqlx::query(
            r#"
            select id, version, body
            from documents
            where collection = $1 and body->>$2 = $3
            order by id
            "#,
        )
        .bind(collection)
        .bind(field)
        .bind(value)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.iter()
            .map(|r| {
                let id: String = r.try_get("id").map_err(backend)?;
                Ok((id, versioned_from_row(r)?))
            })
            .collect()
    }

    async fn commit(&self, writes: Vec<WriteOp>) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        for w in &writes {
            let res = match w.precondition {
                Precondition::MustNotExist => {
                    sqlx::query(
                        r#"
                        insert into documents (collection, id, version, body)
                        values ($1, $2, 1, $3)
                        on conflict (collection, id) do nothing
                        "#,
                    )
                    .bind(&w.collection)
                    .bind(&w.id)
                    .bind(&w.body)
                    .execute(&mut *tx)
                    .await
                }
                Precondition::Version(v) => {
                    sqlx::query(
                        r#"
                        update documents
                        set body = $3,
                            version = version + 1,
                            updated_at = now()
                        where collection = $1 and id = $2 and version = $4
                        "#,
                    )
                    .bind(&w.collection)
                    .bind(&w.id)
                    .bind(&w.body)
                    .bind(v as i64)
                    .execute(&mut *tx)
                    .await
                }
            };

            let affected = match res {
                Ok(done) => done.rows_affected(),
                Err(e) if is_conflict_error(&e) => 0,
                Err(e) => return Err(backend(e)),
            };

            if affected == 0 {
                // Dropping `tx` rolls back everything staged so far.
                debug!(collection = %w.collection, id = %w.id, "commit precondition failed");
                return Err(StoreError::Conflict {
                    collection: w.collection.clone(),
                    id: w.id.clone(),
                });
            }
        }

        tx.commit().await.map_err(|e| {
            if is_conflict_error(&e) {
                StoreError::Conflict {
                    collection: "documents".to_string(),
                    id: "<commit>".to_string(),
                }
            } else {
                backend(e)
            }
        })
    }
}

fn versioned_from_row(row: &sqlx::postgres::PgRow) -> Result<Versioned, StoreError> {
    let version: i64 = row.try_get("version").map_err(backend)?;
    let body: Value = row.try_get("body").map_err(backend)?;
    Ok(Versioned {
        version: version as u64,
        body,
    })
}

fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Unique violations (23505) and serialization failures (40001) mean another
/// writer won the race; both surface as conflicts so callers can retry.
fn is_conflict_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            matches!(db_err.code().as_deref(), Some("23505") | Some("40001"))
        }
        _ => false,
    }
}
