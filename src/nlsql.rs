//! Natural-language-to-SQL pipeline.
//!
//! Three stages per question: generate SQL from retrieved schema context,
//! execute it against the database, then ask the model to read the result
//! rows back as an answer. A failure in either of the first two stages
//! terminates the query with the error recorded on the outcome; a failed
//! insight call only costs the prose, the rows are already in hand.

use anyhow::Result;

use crate::config::{EmbeddingConfig, RagConfig};
use crate::context::build_context;
use crate::llm::{ChatMessage, LlmClient};
use crate::models::SourceRef;
use crate::schema::{QueryRows, SchemaSource};
use crate::store::VectorStore;

/// Token budget for the schema context fed to SQL generation.
const SCHEMA_CONTEXT_TOKENS: usize = 4000;

const SQL_KEYWORDS: [&str; 8] = [
    "SELECT", "INSERT", "UPDATE", "DELETE", "CREATE", "ALTER", "DROP", "WITH",
];

const SQL_SYSTEM_PROMPT: &str = "You are a SQL expert. Given database schema information and a \
     question, output ONLY the SQL query. No explanations, no commentary, \
     no markdown fences. Start directly with a SQL keyword such as SELECT. \
     Add a LIMIT clause when listing all records.";

const INSIGHTS_SYSTEM_PROMPT: &str = "You are a data analyst. Answer the original question from the SQL \
     query and its results. Highlight key findings and keep the answer \
     concise; use bullet points when there are several.";

// ============ SQL extraction ============

/// Pull a bare SQL statement out of a model reply.
///
/// Strips code-fence markers, then scans for the first word-boundary
/// occurrence of a SQL keyword (models like to prepend "Here is the
/// query:" despite instructions) and keeps everything from there to the
/// first statement terminator, or to the end when there is none.
pub fn extract_sql(reply: &str) -> Option<String> {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```sql") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    let text = text.trim();

    let lines: Vec<&str> = text.lines().collect();
    let mut sql = None;
    for (i, line) in lines.iter().enumerate() {
        if let Some(at) = keyword_start(line) {
            let mut kept = vec![&line[at..]];
            kept.extend(lines[i + 1..].iter().copied());
            sql = Some(kept.join("\n"));
            break;
        }
    }

    let mut sql = sql?;
    if let Some(end) = sql.find(';') {
        sql.truncate(end + 1);
    }
    let sql = sql.trim().to_string();
    if sql.is_empty() {
        None
    } else {
        Some(sql)
    }
}

/// Byte offset of the first SQL keyword in `line` that stands on word
/// boundaries, or `None`. ASCII-only uppercasing keeps offsets valid in
/// the original line.
fn keyword_start(line: &str) -> Option<usize> {
    let upper = line.to_ascii_uppercase();
    let bytes = upper.as_bytes();
    let is_word = |b: u8| b.is_ascii_alphanumeric() || b == b'_';

    let mut best: Option<usize> = None;
    for keyword in SQL_KEYWORDS {
        let mut from = 0;
        while let Some(pos) = upper[from..].find(keyword) {
            let at = from + pos;
            let end = at + keyword.len();
            let before_ok = at == 0 || !is_word(bytes[at - 1]);
            let after_ok = end >= bytes.len() || !is_word(bytes[end]);
            if before_ok && after_ok {
                best = Some(best.map_or(at, |b| b.min(at)));
                break;
            }
            from = at + 1;
        }
    }
    best
}

// ============ Query pipeline ============

#[derive(Debug)]
pub struct QueryOptions {
    /// Collection holding the schema documents.
    pub collection: String,
    /// Row cap for the text handed to insight generation.
    pub max_rows: usize,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            collection: "database".to_string(),
            max_rows: 100,
        }
    }
}

/// Everything one query produced. `error` is set exactly when the
/// pipeline stopped early; `sql` survives an execution failure so the
/// caller can show what was attempted.
#[derive(Debug, Default)]
pub struct QueryOutcome {
    pub question: String,
    pub sql: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub insights: Option<String>,
    pub sources: Vec<SourceRef>,
    pub error: Option<String>,
}

/// Run the full question-to-insights pipeline against `db`.
pub async fn run_query(
    store: &dyn VectorStore,
    embedding: &EmbeddingConfig,
    rag: &RagConfig,
    llm: &dyn LlmClient,
    db: &dyn SchemaSource,
    question: &str,
    opts: &QueryOptions,
) -> Result<QueryOutcome> {
    let mut outcome = QueryOutcome {
        question: question.to_string(),
        ..Default::default()
    };

    let built = build_context(
        store,
        embedding,
        rag,
        question,
        Some(vec![opts.collection.clone()]),
        Some(SCHEMA_CONTEXT_TOKENS),
    )
    .await?;
    if built.is_empty() {
        outcome.error =
            Some("Could not generate SQL query. Make sure the database is indexed.".to_string());
        return Ok(outcome);
    }
    outcome.sources = built.sources;

    let prompt = format!(
        "Database schema:\n{}\n\nQuestion: {}\n\nGenerate the SQL query to answer this question:",
        built.context, question
    );
    let reply = llm
        .complete(Some(SQL_SYSTEM_PROMPT), &[ChatMessage::user(prompt)])
        .await?;

    let sql = match extract_sql(&reply) {
        Some(sql) => sql,
        None => {
            outcome.error = Some("Model reply contained no SQL statement".to_string());
            return Ok(outcome);
        }
    };
    outcome.sql = Some(sql.clone());

    let rows = match db.execute(&sql).await {
        Ok(rows) => rows,
        Err(e) => {
            outcome.error = Some(format!("{:#}", e));
            return Ok(outcome);
        }
    };
    outcome.columns = rows.columns.clone();
    outcome.rows = rows.rows.clone();

    let insight_prompt = format!(
        "Question: {}\n\nSQL Query: {}\n\nResults:\n{}\n\nProvide insights and analysis:",
        question,
        sql,
        format_rows(&rows, opts.max_rows)
    );
    match llm
        .complete(Some(INSIGHTS_SYSTEM_PROMPT), &[ChatMessage::user(insight_prompt)])
        .await
    {
        Ok(text) => outcome.insights = Some(text),
        Err(e) => eprintln!("Warning: Insight generation failed: {:#}", e),
    }

    Ok(outcome)
}

fn format_rows(rows: &QueryRows, max_rows: usize) -> String {
    if rows.rows.is_empty() {
        return "No results found.".to_string();
    }

    let mut out = format!("Total rows: {}\n", rows.rows.len());
    if rows.rows.len() > max_rows {
        out.push_str(&format!("(Showing first {} rows)\n", max_rows));
    }
    out.push('\n');
    for (i, row) in rows.rows.iter().take(max_rows).enumerate() {
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

/// Print the successful parts of an outcome. Error handling is the
/// caller's job so the process exit code can reflect it.
pub fn print_outcome(outcome: &QueryOutcome) {
    if let Some(sql) = &outcome.sql {
        println!("SQL: {}", sql);
    }
    if outcome.error.is_some() {
        return;
    }

    println!();
    if outcome.rows.is_empty() {
        println!("No rows returned.");
    } else {
        println!("{}", outcome.columns.join(" | "));
        for row in outcome.rows.iter().take(20) {
            println!("{}", row.join(" | "));
        }
        if outcome.rows.len() > 20 {
            println!("... ({} rows total)", outcome.rows.len());
        }
    }

    if let Some(insights) = &outcome.insights {
        println!();
        println!("Insights:");
        println!("{}", insights);
    }
}
