//! PostgreSQL schema introspection backend.
//!
//! Reads `information_schema` for tables, columns, and foreign keys, and
//! `pg_indexes` for index definitions. Only the `public` schema is
//! inspected. Text columns are cast with `::text` so every introspection
//! value decodes as a plain string.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{Column, PgPool, Row};

use crate::schema::{ColumnInfo, ForeignKey, IndexInfo, QueryRows, SchemaSource};

#[derive(Debug)]
pub struct PostgresSchema {
    pool: PgPool,
    name: String,
}

impl PostgresSchema {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        let (name,): (String,) = sqlx::query_as("SELECT current_database()::text")
            .fetch_one(&pool)
            .await?;

        Ok(Self { pool, name })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn indexdef_is_unique(definition: &str) -> bool {
    definition.trim_start().to_uppercase().starts_with("CREATE UNIQUE INDEX")
}

fn render_value(row: &PgRow, i: usize) -> String {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i16>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |b| b.to_string());
    }
    if let Ok(v) = row.try_get::<Option<String>, _>(i) {
        return v.unwrap_or_else(|| "NULL".to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDate>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |d| d.to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::NaiveDateTime>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |t| t.to_string());
    }
    if let Ok(v) = row.try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |t| t.to_rfc3339());
    }
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |b| format!("<{} bytes>", b.len()));
    }
    format!("<{}>", row.column(i).type_info().to_string())
}

fn rows_to_query_rows(rows: &[PgRow]) -> QueryRows {
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
impl SchemaSource for PostgresSchema {
    fn kind(&self) -> &'static str {
        "postgres"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = 'public' AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, Option<String>)> = sqlx::query_as(
            "SELECT column_name::text, data_type::text, is_nullable::text, column_default::text
             FROM information_schema.columns
             WHERE table_schema = 'public' AND table_name = $1
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            bail!("No such table: {}", table);
        }

        let pk_rows: Vec<(String,)> = sqlx::query_as(
            "SELECT kcu.column_name::text
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
             WHERE tc.table_schema = 'public'
               AND tc.table_name = $1
               AND tc.constraint_type = 'PRIMARY KEY'",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        let pk_columns: Vec<String> = pk_rows.into_iter().map(|(name,)| name).collect();

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default)| ColumnInfo {
                primary_key: pk_columns.contains(&name),
                nullable: is_nullable == "YES",
                name,
                data_type,
                default,
            })
            .collect())
    }

    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT indexname::text, indexdef::text FROM pg_indexes
             WHERE schemaname = 'public' AND tablename = $1
             ORDER BY indexname",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(name, definition)| IndexInfo {
                name,
                unique: indexdef_is_unique(&definition),
                columns: Vec::new(),
                definition: Some(definition),
            })
            .collect())
    }

    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT kcu.column_name::text, ccu.table_name::text, ccu.column_name::text
             FROM information_schema.table_constraints tc
             JOIN information_schema.key_column_usage kcu
               ON tc.constraint_name = kcu.constraint_name
              AND tc.table_schema = kcu.table_schema
             JOIN information_schema.constraint_column_usage ccu
               ON tc.constraint_name = ccu.constraint_name
              AND tc.table_schema = ccu.table_schema
             WHERE tc.table_schema = 'public'
               AND tc.table_name = $1
               AND tc.constraint_type = 'FOREIGN KEY'",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(column, ref_table, ref_column)| ForeignKey {
                column,
                ref_table,
                ref_column,
            })
            .collect())
    }

    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryRows> {
        let rows = sqlx::query(&format!("SELECT * FROM {} LIMIT $1", quote_ident(table)))
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indexdef_unique_detection() {
        assert!(indexdef_is_unique(
            "CREATE UNIQUE INDEX users_email_key ON public.users USING btree (email)"
        ));
        assert!(!indexdef_is_unique(
            "CREATE INDEX idx_orders_customer ON public.orders USING btree (customer_id)"
        ));
    }

    #[test]
    fn test_quote_ident_escapes_quotes() {
        assert_eq!(quote_ident("orders"), "\"orders\"");
        assert_eq!(quote_ident("odd\"name"), "\"odd\"\"name\"");
    }
}
