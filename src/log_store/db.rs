// SPDX-License-Identifier: PMPL-1.0-or-later
//! SurrealDB persistence for download log rows

use super::{DownloadLogRow, StoreError, TimeRange};
use serde::{Deserialize, Serialize};
use surrealdb::{
    engine::local::{Db, Mem},
    Surreal,
};

const TABLE: &str = "download_log";

/// Row body as stored; the id lives in the record key.
#[derive(Debug, Serialize, Deserialize)]
struct StoredRow {
    ts: i64,
    email: String,
    path: String,
    title: Option<String>,
    ua: Option<String>,
    ip: Option<String>,
    referer: Option<String>,
}

/// Row as selected, with the record key flattened to a string.
#[derive(Debug, Deserialize)]
struct SelectedRow {
    row_id: String,
    ts: i64,
    email: String,
    path: String,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ua: Option<String>,
    #[serde(default)]
    ip: Option<String>,
    #[serde(default)]
    referer: Option<String>,
}

impl From<SelectedRow> for DownloadLogRow {
    fn from(row: SelectedRow) -> Self {
        Self {
            id: row.row_id,
            ts: row.ts,
            email: row.email,
            path: row.path,
            title: row.title,
            ua: row.ua,
            ip: row.ip,
            referer: row.referer,
        }
    }
}

/// Database connection wrapper
#[derive(Clone)]
pub struct Database {
    db: Surreal<Db>,
}

impl Database {
    /// Connect to SurrealDB. `"memory"` is in-process; anything else is a RocksDB path.
    pub async fn connect(storage: &str) -> Result<Self, StoreError> {
        let db = if storage == "memory" {
            Surreal::new::<Mem>(()).await?
        } else {
            Self::open_file(storage).await?
        };

        db.use_ns("portfolio").use_db("downloads").await?;
        Self::init_schema(&db).await?;

        Ok(Self { db })
    }

    #[cfg(feature = "rocksdb")]
    async fn open_file(path: &str) -> Result<Surreal<Db>, StoreError> {
        Ok(Surreal::new::<surrealdb::engine::local::RocksDb>(path).await?)
    }

    #[cfg(not(feature = "rocksdb"))]
    async fn open_file(path: &str) -> Result<Surreal<Db>, StoreError> {
        Err(StoreError::Unsupported(format!(
            "{path} (build with the `rocksdb` feature for on-disk storage)"
        )))
    }

    async fn init_schema(db: &Surreal<Db>) -> Result<(), StoreError> {
        db.query(
            r#"
            DEFINE TABLE IF NOT EXISTS download_log SCHEMALESS;
            DEFINE INDEX IF NOT EXISTS ts_idx ON download_log COLUMNS ts;
        "#,
        )
        .await?
        .check()?;

        Ok(())
    }

    /// Create the row under its id. An existing record with the same id is
    /// reported as [`StoreError::DuplicateId`]; `CREATE` never overwrites.
    pub async fn insert(&self, row: &DownloadLogRow) -> Result<(), StoreError> {
        let body = StoredRow {
            ts: row.ts,
            email: row.email.clone(),
            path: row.path.clone(),
            title: row.title.clone(),
            ua: row.ua.clone(),
            ip: row.ip.clone(),
            referer: row.referer.clone(),
        };
        let created: Result<Option<StoredRow>, surrealdb::Error> =
            self.db.create((TABLE, row.id.as_str())).content(body).await;
        match created {
            Ok(_) => Ok(()),
            Err(surrealdb::Error::Db(surrealdb::error::Db::RecordExists { .. })) => {
                Err(StoreError::DuplicateId(row.id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Rows with `from <= ts <= to`, newest first, at most `limit`.
    pub async fn range(
        &self,
        range: TimeRange,
        limit: usize,
    ) -> Result<Vec<DownloadLogRow>, StoreError> {
        let mut conditions = Vec::new();
        if range.from.is_some() {
            conditions.push("ts >= $from");
        }
        if range.to.is_some() {
            conditions.push("ts <= $to");
        }

        let mut sql = String::from(
            "SELECT meta::id(id) AS row_id, ts, email, path, title, ua, ip, referer FROM download_log",
        );
        if !conditions.is_empty() {
            sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        }
        sql.push_str(&format!(" ORDER BY ts DESC LIMIT {limit}"));

        let mut query = self.db.query(sql);
        if let Some(from) = range.from {
            query = query.bind(("from", from));
        }
        if let Some(to) = range.to {
            query = query.bind(("to", to));
        }

        let mut result = query.await?;
        let rows: Vec<SelectedRow> = result.take(0)?;
        Ok(rows.into_iter().map(DownloadLogRow::from).collect())
    }
}
