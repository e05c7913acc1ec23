//! SQLite schema introspection backend.
//!
//! Everything goes through PRAGMA calls. PRAGMAs cannot take bound
//! parameters, so identifiers are double-quote escaped before
//! interpolation; arbitrary SQL runs only through `execute`, which is the
//! point of the NL-to-SQL path.

use std::path::Path;
use std::str::FromStr;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, SqlitePool};

use crate::schema::{ColumnInfo, ForeignKey, IndexInfo, QueryRows, SchemaSource};

#[derive(Debug)]
pub struct SqliteSchema {
    pool: SqlitePool,
    name: String,
}

impl SqliteSchema {
    /// Connect to an existing database file. Missing files are an error;
    /// schema indexing an empty, implicitly created database would just
    /// produce an empty overview.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))
            .with_context(|| format!("Invalid database path: {}", path))?
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to open database {}", path))?;

        let name = Path::new(path)
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "sqlite".to_string());

        Ok(Self { pool, name })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn render_value(row: &SqliteRow, i: usize) -> String {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.unwrap_or_else(|| "NULL".to_string());
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |b| format!("<{} bytes>", b.len()));
    }
    format!("<{}>", row.column(i).type_info().to_string())
}

fn rows_to_query_rows(rows: &[SqliteRow]) -> QueryRows {
    let mut out = QueryRows::default();
    if let Some(first) = rows.first() {
        out.columns = first.columns().iter().map(|c| c.name().to_string()).collect();
    }
    for row in rows {
        out.rows
            .push((0..row.len()).map(|i| render_value(row, i)).collect());
    }
    out
}

#[async_trait]
impl SchemaSource for SqliteSchema {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = sqlx::query(&format!("PRAGMA table_info({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;
        if rows.is_empty() {
            bail!("No such table: {}", table);
        }

        let mut columns = Vec::new();
        for row in rows {
            columns.push(ColumnInfo {
                name: row.try_get("name")?,
                data_type: row.try_get("type")?,
                nullable: row.try_get::<i64, _>("notnull")? == 0,
                default: row.try_get("dflt_value")?,
                primary_key: row.try_get::<i64, _>("pk")? > 0,
            });
        }
        Ok(columns)
    }

    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows = sqlx::query(&format!("PRAGMA index_list({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;

        let mut indexes = Vec::new();
        for row in rows {
            let name: String = row.try_get("name")?;
            if name.starts_with("sqlite_autoindex") {
                continue;
            }
            let unique = row.try_get::<i64, _>("unique")? != 0;

            let info_rows = sqlx::query(&format!("PRAGMA index_info({})", quote_ident(&name)))
                .fetch_all(&self.pool)
                .await?;
            let mut columns = Vec::new();
            for info in info_rows {
                if let Some(column) = info.try_get::<Option<String>, _>("name")? {
                    columns.push(column);
                }
            }

            indexes.push(IndexInfo {
                name,
                unique,
                columns,
                definition: None,
            });
        }
        Ok(indexes)
    }

    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = sqlx::query(&format!("PRAGMA foreign_key_list({})", quote_ident(table)))
            .fetch_all(&self.pool)
            .await?;

        let mut fks = Vec::new();
        for row in rows {
            fks.push(ForeignKey {
                column: row.try_get("from")?,
                ref_table: row.try_get("table")?,
                // NULL when the reference targets the implicit primary key.
                ref_column: row
                    .try_get::<Option<String>, _>("to")?
                    .unwrap_or_else(|| "(primary key)".to_string()),
            });
        }
        Ok(fks)
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryRows> {
        let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT ?", quote_ident(table)))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows_to_query_rows(&rows))
    }

    async fn execute(&self, sql: &str) -> Result<QueryRows> {
        let head = sql.trim_start().to_uppercase();
        if head.starts_with("SELECT") || head.starts_with("WITH") {
            let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
            Ok(rows_to_query_rows(&rows))
        } else {
            let result = sqlx::query(sql).execute(&self.pool).await?;
            Ok(QueryRows {
                columns: vec!["rows_affected".to_string()],
                rows: vec![vec![result.rows_affected().to_string()]],
            })
        }
    }
}
