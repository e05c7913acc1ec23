//! File loading and directory collection for document indexing.
//!
//! `process_file` turns one file into (content, metadata) with
//! per-extension handling; `collect_files` walks a directory in sorted
//! order, skipping VCS and dependency trees. Binary formats (PDF, DOCX)
//! are reduced to plain text here so everything downstream sees strings.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;

use crate::models::DocMeta;

/// Extensions handled by [`process_file`].
pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    "txt", "md", "pdf", "docx", "json", "py", "js", "ts", "java", "cpp", "c", "h", "cs", "go",
    "rs", "rb", "php", "swift", "kt",
];

/// Maximum decompressed bytes read from a DOCX zip entry.
const MAX_XML_ENTRY_BYTES: u64 = 50 * 1024 * 1024;

fn language_for(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "py" => "python",
        "js" => "javascript",
        "ts" => "typescript",
        "java" => "java",
        "cpp" => "cpp",
        "c" | "h" => "c",
        "cs" => "csharp",
        "go" => "go",
        "rs" => "rust",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "kt" => "kotlin",
        _ => return None,
    })
}

/// Load one file as (content, metadata).
///
/// Metadata always carries `type`, `filename`, and `file_modified`;
/// markdown adds `title` when a top-level heading exists and code files
/// add `language`. Unsupported extensions are an error, not a skip.
pub fn process_file(path: &Path) -> Result<(String, DocMeta)> {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    let mut meta = DocMeta::new(path.to_string_lossy());
    if let Some(name) = path.file_name() {
        meta = meta.with("filename", name.to_string_lossy().as_ref());
    }
    meta = meta.with("file_modified", file_modified_secs(path));

    let content = match ext.as_str() {
        "txt" => {
            meta = meta.with("type", "text");
            read_text(path)?
        }
        "md" => {
            meta = meta.with("type", "markdown");
            let content = read_text(path)?;
            if let Some(heading) = content.lines().find(|line| line.starts_with("# ")) {
                meta = meta.with("title", heading[2..].trim());
            }
            content
        }
        "pdf" => {
            meta = meta.with("type", "pdf");
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            pdf_extract::extract_text_from_mem(&bytes)
                .map_err(|e| anyhow::anyhow!("PDF extraction failed: {}", e))?
        }
        "docx" => {
            meta = meta.with("type", "docx");
            let bytes = std::fs::read(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            extract_docx(&bytes)?
        }
        "json" => {
            meta = meta.with("type", "json");
            let raw = read_text(path)?;
            let value: serde_json::Value = serde_json::from_str(&raw)
                .with_context(|| format!("Invalid JSON in {}", path.display()))?;
            serde_json::to_string_pretty(&value)?
        }
        other => match language_for(other) {
            Some(language) => {
                meta = meta.with("type", "code").with("language", language);
                read_text(path)?
            }
            None => {
                if other.is_empty() {
                    bail!("Unsupported file type: {}", path.display());
                }
                bail!("Unsupported file type: .{}", other);
            }
        },
    };

    Ok((content, meta))
}

fn read_text(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}

fn file_modified_secs(path: &Path) -> i64 {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(std::time::SystemTime::UNIX_EPOCH)
        .duration_since(std::time::SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Pull the text runs out of `word/document.xml`, one line per paragraph.
fn extract_docx(bytes: &[u8]) -> Result<String> {
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(bytes))
        .map_err(|e| anyhow::anyhow!("Invalid DOCX archive: {}", e))?;

    let mut doc_xml = Vec::new();
    {
        let entry = archive
            .by_name("word/document.xml")
            .map_err(|_| anyhow::anyhow!("word/document.xml not found"))?;
        entry
            .take(MAX_XML_ENTRY_BYTES)
            .read_to_end(&mut doc_xml)
            .map_err(|e| anyhow::anyhow!("Failed to read word/document.xml: {}", e))?;
        if doc_xml.len() as u64 >= MAX_XML_ENTRY_BYTES {
            bail!("word/document.xml exceeds size limit");
        }
    }

    let mut out = String::new();
    let mut reader = quick_xml::Reader::from_reader(doc_xml.as_slice());
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(quick_xml::events::Event::Start(e)) => {
                if e.local_name().as_ref() == b"t" {
                    if let Ok(quick_xml::events::Event::Text(te)) = reader.read_event_into(&mut buf)
                    {
                        out.push_str(te.unescape().unwrap_or_default().as_ref());
                    }
                }
            }
            Ok(quick_xml::events::Event::End(e)) => {
                if e.local_name().as_ref() == b"p" {
                    out.push('\n');
                }
            }
            Ok(quick_xml::events::Event::Eof) => break,
            Err(e) => bail!("DOCX parse error: {}", e),
            _ => {}
        }
        buf.clear();
    }

    Ok(out.trim_end().to_string())
}

/// Recursively collect supported files under `dir` in sorted order.
///
/// `types`, when given, restricts to those extensions (with or without a
/// leading dot). `.git`, `target`, `node_modules`, `__pycache__` and
/// `.venv` trees are always skipped. Unreadable entries are warned about
/// and skipped; they never abort the walk.
pub fn collect_files(dir: &Path, types: Option<&[String]>) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        bail!("Directory does not exist: {}", dir.display());
    }

    let exclude_set = build_globset(&[
        "**/.git/**",
        "**/target/**",
        "**/node_modules/**",
        "**/__pycache__/**",
        "**/.venv/**",
    ])?;

    let wanted: Option<Vec<String>> = types.map(|list| {
        list.iter()
            .map(|t| t.trim_start_matches('.').to_lowercase())
            .collect()
    });

    let mut files = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                eprintln!("Warning: Skipping unreadable entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(dir).unwrap_or(path);
        if exclude_set.is_match(relative.to_string_lossy().as_ref()) {
            continue;
        }

        let Some(ext) = path.extension().map(|e| e.to_string_lossy().to_lowercase()) else {
            continue;
        };
        if !SUPPORTED_EXTENSIONS.contains(&ext.as_str()) {
            continue;
        }
        if let Some(wanted) = &wanted {
            if !wanted.contains(&ext) {
                continue;
            }
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    Ok(files)
}

fn build_globset(patterns: &[&str]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
