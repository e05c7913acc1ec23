//! Database schema introspection and schema-to-documents indexing.
//!
//! One indexing algorithm runs against a small capability trait
//! ([`SchemaSource`]) implemented once per backend, instead of a separate
//! pipeline per database engine. Each table yields a schema document and
//! (optionally) a sample-data document; each database yields one overview
//! document. Document ids are derived from database identity, table name
//! and document kind, so re-indexing updates in place.

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::db_mysql::MySqlSchema;
use crate::db_postgres::PostgresSchema;
use crate::db_sqlite::SqliteSchema;
use crate::indexer::{IndexOutcome, Indexer};
use crate::models::DocMeta;

#[derive(Debug, Clone)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    /// Indexed columns when the backend reports them directly.
    pub columns: Vec<String>,
    /// Full index definition when the backend only exposes DDL.
    pub definition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ForeignKey {
    pub column: String,
    pub ref_table: String,
    pub ref_column: String,
}

/// Rows plus column names, everything stringified for display.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Capability interface one relational backend must provide.
#[async_trait]
pub trait SchemaSource: Send + Sync {
    /// Backend kind tag: `"sqlite"`, `"postgres"`, `"mysql"`.
    fn kind(&self) -> &'static str;
    /// Database identity (file stem or database name).
    fn name(&self) -> &str;
    async fn list_tables(&self) -> Result<Vec<String>>;
    async fn table_columns(&self, table: &str) -> Result<Vec<ColumnInfo>>;
    async fn table_indexes(&self, table: &str) -> Result<Vec<IndexInfo>>;
    async fn table_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKey>>;
    async fn sample_rows(&self, table: &str, limit: usize) -> Result<QueryRows>;
    async fn execute(&self, sql: &str) -> Result<QueryRows>;
}

/// A connected database of any supported engine.
#[derive(Debug)]
pub enum AnyDatabase {
    Sqlite(SqliteSchema),
    Postgres(PostgresSchema),
    MySql(MySqlSchema),
}

impl AnyDatabase {
    /// Connect by URL. `postgres://`, `postgresql://` and `mysql://` go to
    /// the network backends; `sqlite:` URLs and bare filesystem paths open
    /// a SQLite file.
    pub async fn connect(url: &str) -> Result<Self> {
        if let Some(path) = url.strip_prefix("sqlite://") {
            return Ok(Self::Sqlite(SqliteSchema::connect(path).await?));
        }
        if let Some(path) = url.strip_prefix("sqlite:") {
            return Ok(Self::Sqlite(SqliteSchema::connect(path).await?));
        }
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            return Ok(Self::Postgres(PostgresSchema::connect(url).await?));
        }
        if url.starts_with("mysql://") {
            return Ok(Self::MySql(MySqlSchema::connect(url).await?));
        }
        if url.contains("://") {
            bail!(
                "Unsupported database URL: {} (expected sqlite:, postgres:// or mysql://)",
                url
            );
        }
        Ok(Self::Sqlite(SqliteSchema::connect(url).await?))
    }

    pub fn source(&self) -> &dyn SchemaSource {
        match self {
            Self::Sqlite(db) => db,
            Self::Postgres(db) => db,
            Self::MySql(db) => db,
        }
    }
}

// ============ Document rendering ============

/// Render a table's schema as retrieval-friendly text.
///
/// The trailing hint sentences are deliberate: they put likely query
/// phrasings ("count records", "sample data") into the embedding space
/// next to the table name.
pub fn render_schema_doc(
    kind: &str,
    database: &str,
    table: &str,
    columns: &[ColumnInfo],
    indexes: &[IndexInfo],
    foreign_keys: &[ForeignKey],
) -> String {
    let mut out = String::new();
    out.push_str(&format!("Table: {}\n", table));
    out.push_str(&format!("Database: {} ({})\n", database, kind));

    out.push_str("\nColumns:\n");
    for column in columns {
        let mut line = format!("  - {} {}", column.name, column.data_type);
        if column.primary_key {
            line.push_str(" PRIMARY KEY");
        }
        if !column.nullable {
            line.push_str(" NOT NULL");
        }
        if let Some(default) = &column.default {
            line.push_str(&format!(" DEFAULT {}", default));
        }
        out.push_str(&line);
        out.push('\n');
    }

    if !indexes.is_empty() {
        out.push_str("\nIndexes:\n");
        for index in indexes {
            let unique = if index.unique { " (UNIQUE)" } else { "" };
            if !index.columns.is_empty() {
                out.push_str(&format!(
                    "  - {}{}: ({})\n",
                    index.name,
                    unique,
                    index.columns.join(", ")
                ));
            } else if let Some(definition) = &index.definition {
                out.push_str(&format!("  - {}{}: {}\n", index.name, unique, definition));
            } else {
                out.push_str(&format!("  - {}{}\n", index.name, unique));
            }
        }
    }

    if !foreign_keys.is_empty() {
        out.push_str("\nForeign keys:\n");
        for fk in foreign_keys {
            out.push_str(&format!(
                "  - {} references {}.{}\n",
                fk.column, fk.ref_table, fk.ref_column
            ));
        }
    }

    out.push_str(&format!(
        "\nTo count records in {}, use: SELECT COUNT(*) FROM {}\n",
        table, table
    ));
    out.push_str(&format!(
        "To see sample data from {}, use: SELECT * FROM {} LIMIT 5\n",
        table, table
    ));
    out
}

/// Render the one-per-database overview document.
pub fn render_overview_doc(kind: &str, database: &str, tables: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("Database: {} ({})\n", database, kind));
    out.push_str(&format!("Tables ({}):\n", tables.len()));
    for table in tables {
        out.push_str(&format!("  - {}\n", table));
    }
    out.push_str("\nEach table has a schema document describing its columns, indexes and foreign keys.\n");
    out
}

/// Render up to `rows.rows.len()` literal rows as a sample-data document.
pub fn render_sample_doc(database: &str, table: &str, rows: &QueryRows) -> String {
    let mut out = String::new();
    out.push_str(&format!("Sample data from {} ({}):\n\n", table, database));
    for (i, row) in rows.rows.iter().enumerate() {
        let pairs: Vec<String> = rows
            .columns
            .iter()
            .zip(row.iter())
            .map(|(col, val)| format!("{}: {}", col, val))
            .collect();
        out.push_str(&format!("Row {}: {}\n", i + 1, pairs.join(", ")));
    }
    out
}

// ============ Schema indexing ============

#[derive(Debug)]
pub struct SchemaIndexOptions {
    /// Explicit table list; `None` enumerates all base tables.
    pub tables: Option<Vec<String>>,
    /// Rows per sample-data document; 0 disables sample documents.
    pub sample_rows: usize,
    pub collection: String,
}

impl Default for SchemaIndexOptions {
    fn default() -> Self {
        Self {
            tables: None,
            sample_rows: 5,
            collection: "database".to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct SchemaIndexReport {
    pub database: String,
    /// Tables whose schema document was indexed.
    pub tables: Vec<String>,
    /// Documents written (overview + schema + samples).
    pub documents: usize,
    /// (table, error) pairs; a failing table never aborts the rest.
    pub failed: Vec<(String, String)>,
}

/// Index `source` into the given collection: one overview document, then
/// per table a schema document and an optional sample-data document.
pub async fn index_database(
    indexer: &Indexer<'_>,
    source: &dyn SchemaSource,
    opts: &SchemaIndexOptions,
) -> Result<SchemaIndexReport> {
    let tables = match &opts.tables {
        Some(list) if !list.is_empty() => list.clone(),
        _ => source.list_tables().await?,
    };

    let mut report = SchemaIndexReport {
        database: source.name().to_string(),
        ..Default::default()
    };

    let overview = render_overview_doc(source.kind(), source.name(), &tables);
    let meta = DocMeta::new(format!("{} (overview)", source.name()))
        .with("type", "database_overview")
        .with("database", source.name())
        .with("db_kind", source.kind());
    let doc_id = format!("overview_{}_{}", source.kind(), source.name());
    match indexer
        .index_document(&opts.collection, &overview, meta, Some(doc_id), true)
        .await
    {
        IndexOutcome::Failed { error } => report.failed.push(("(overview)".to_string(), error)),
        _ => report.documents += 1,
    }

    for table in &tables {
        match index_table_schema(indexer, source, &opts.collection, table).await {
            Ok(()) => {
                report.tables.push(table.clone());
                report.documents += 1;
            }
            Err(e) => {
                report.failed.push((table.clone(), format!("{:#}", e)));
                continue;
            }
        }

        if opts.sample_rows > 0 {
            match index_table_sample(indexer, source, &opts.collection, table, opts.sample_rows)
                .await
            {
                Ok(true) => report.documents += 1,
                Ok(false) => {}
                Err(e) => report
                    .failed
                    .push((format!("{} (sample)", table), format!("{:#}", e))),
            }
        }
    }

    Ok(report)
}

async fn index_table_schema(
    indexer: &Indexer<'_>,
    source: &dyn SchemaSource,
    collection: &str,
    table: &str,
) -> Result<()> {
    let columns = source.table_columns(table).await?;
    let indexes = source.table_indexes(table).await?;
    let foreign_keys = source.table_foreign_keys(table).await?;

    let doc = render_schema_doc(
        source.kind(),
        source.name(),
        table,
        &columns,
        &indexes,
        &foreign_keys,
    );
    let meta = DocMeta::new(format!("{}.{}", source.name(), table))
        .with("type", "database_schema")
        .with("database", source.name())
        .with("db_kind", source.kind())
        .with("table", table);
    let doc_id = format!("schema_{}_{}", source.name(), table);

    match indexer
        .index_document(collection, &doc, meta, Some(doc_id), true)
        .await
    {
        IndexOutcome::Failed { error } => bail!("{}", error),
        _ => Ok(()),
    }
}

async fn index_table_sample(
    indexer: &Indexer<'_>,
    source: &dyn SchemaSource,
    collection: &str,
    table: &str,
    limit: usize,
) -> Result<bool> {
    let rows = source.sample_rows(table, limit).await?;
    if rows.rows.is_empty() {
        return Ok(false);
    }

    let doc = render_sample_doc(source.name(), table, &rows);
    let meta = DocMeta::new(format!("{}.{} (sample)", source.name(), table))
        .with("type", "database_sample")
        .with("database", source.name())
        .with("table", table);
    let doc_id = format!("data_{}_{}", source.name(), table);

    match indexer
        .index_document(collection, &doc, meta, Some(doc_id), true)
        .await
    {
        IndexOutcome::Failed { error } => bail!("{}", error),
        _ => Ok(true),
    }
}
