//! MySQL / MariaDB schema introspection backend.
//!
//! All metadata comes out of `information_schema`, scoped to the database
//! named in the connection URL via `DATABASE()`. Index rows arrive one per
//! column and are regrouped into one entry per index name.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::{Column, MySqlPool, Row};

use crate::schema::{ColumnInfo, ForeignKey, IndexInfo, QueryRows, SchemaSource};

#[derive(Debug)]
pub struct MySqlSchema {
    pool: MySqlPool,
    name: String,
}

impl MySqlSchema {
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .context("Failed to connect to MySQL")?;

        let (name,): (Option<String>,) = sqlx::query_as("SELECT DATABASE()")
            .fetch_one(&pool)
            .await?;
        let name = name.context("Connection URL does not select a database")?;

        Ok(Self { pool, name })
    }
}

fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// information_schema.statistics yields one row per indexed column,
/// ordered by (index_name, seq_in_index).
fn group_statistics(rows: Vec<(String, i64, String)>) -> Vec<IndexInfo> {
    let mut indexes: Vec<IndexInfo> = Vec::new();
    for (name, non_unique, column) in rows {
        match indexes.last_mut() {
            Some(last) if last.name == name => last.columns.push(column),
            _ => indexes.push(IndexInfo {
                name,
                unique: non_unique == 0,
                columns: vec![column],
                definition: None,
            }),
        }
    }
    indexes
}

fn render_value(row: &MySqlRow, i: usize) -> String {
    if let Ok(v) = row.try_get::<Option<i64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<u64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |n| n.to_string());
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
    if let Ok(v) = row.try_get::<Option<Vec<u8>>, _>(i) {
        return v.map_or_else(|| "NULL".to_string(), |b| format!("<{} bytes>", b.len()));
    }
    format!("<{}>", row.column(i).type_info().to_string())
}

fn rows_to_query_rows(rows: &[MySqlRow]) -> QueryRows {
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
impl SchemaSource for MySqlSchema {
    fn kind(&self) -> &'static str {
        "mysql"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn list_tables(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT table_name FROM information_schema.tables
             WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
             ORDER BY table_name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows: Vec<(String, String, String, Option<String>, String)> = sqlx::query_as(
            "SELECT column_name, column_type, is_nullable, column_default, column_key
             FROM information_schema.columns
             WHERE table_schema = DATABASE() AND table_name = ?
             ORDER BY ordinal_position",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        if rows.is_empty() {
            bail!("No such table: {}", table);
        }

        Ok(rows
            .into_iter()
            .map(|(name, data_type, is_nullable, default, key)| ColumnInfo {
                name,
                data_type,
                nullable: is_nullable == "YES",
                default,
                primary_key: key == "PRI",
            })
            .collect())
    }

    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>> {
        let rows: Vec<(String, i64, String)> = sqlx::query_as(
            "SELECT index_name, non_unique, column_name
             FROM information_schema.statistics
             WHERE table_schema = DATABASE() AND table_name = ?
             ORDER BY index_name, seq_in_index",
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;
        Ok(group_statistics(rows))
    }

    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            "SELECT column_name, referenced_table_name, referenced_column_name
             FROM information_schema.key_column_usage
             WHERE table_schema = DATABASE()
               AND table_name = ?
               AND referenced_table_name IS NOT NULL
             ORDER BY ordinal_position",
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_statistics() {
        let rows = vec![
            ("PRIMARY".to_string(), 0, "id".to_string()),
            ("idx_name_city".to_string(), 1, "name".to_string()),
            ("idx_name_city".to_string(), 1, "city".to_string()),
        ];
        let indexes = group_statistics(rows);
        assert_eq!(indexes.len(), 2);
        assert!(indexes[0].unique);
        assert_eq!(indexes[1].name, "idx_name_city");
        assert!(!indexes[1].unique);
        assert_eq!(indexes[1].columns, vec!["name".to_string(), "city".to_string()]);
    }

    #[test]
    fn test_quote_ident_escapes_backticks() {
        assert_eq!(quote_ident("orders"), "`orders`");
        assert_eq!(quote_ident("odd`name"), "`odd``name`");
    }
}
