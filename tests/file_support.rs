//! Multi-format ingestion: PDF, DOCX, JSON and source files go through
//! the same index/search pipeline as plain text, and corrupt inputs fail
//! per file without aborting a directory walk.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn alcove_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop();
    path.pop();
    path.push("alcove");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let data_dir = tmp.path().join("data");
    fs::create_dir_all(&data_dir).unwrap();
    fs::write(
        data_dir.join("config.toml"),
        "[embedding]\nprovider = \"hash\"\n",
    )
    .unwrap();
    fs::create_dir_all(tmp.path().join("files")).unwrap();
    (tmp, data_dir)
}

fn run_alcove(data_dir: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = alcove_binary();
    let output = Command::new(&binary)
        .arg("--data-dir")
        .arg(data_dir.to_str().unwrap())
        .env_remove("ANTHROPIC_API_KEY")
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run alcove: {}", e));
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// One-page PDF with `text` drawn in Courier, built with lopdf so the
/// xref and stream lengths are correct and pdf-extract can read it back.
fn pdf_with_text(text: &str) -> Vec<u8> {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });
    let content = Content {
        operations: vec![
            Operation::new("BT", vec![]),
            Operation::new("Tf", vec!["F1".into(), 12.into()]),
            Operation::new("Td", vec![72.into(), 720.into()]),
            Operation::new("Tj", vec![Object::string_literal(text)]),
            Operation::new("ET", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(
        dictionary! {},
        content.encode().unwrap(),
    ));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
    });
    let pages = dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    doc.objects.insert(pages_id, Object::Dictionary(pages));
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut buf = Vec::new();
    doc.save_to(&mut buf).unwrap();
    buf
}

/// Minimal DOCX: a zip holding word/document.xml with one `<w:t>` run
/// per paragraph.
fn docx_with_paragraphs(paragraphs: &[&str]) -> Vec<u8> {
    use std::io::Write;

    let body: String = paragraphs
        .iter()
        .map(|p| format!("<w:p><w:r><w:t>{}</w:t></w:r></w:p>", p))
        .collect();
    let xml = format!(
        "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body>{}</w:body></w:document>",
        body
    );

    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file("word/document.xml", zip::write::SimpleFileOptions::default())
            .unwrap();
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

#[test]
fn file_support_pdf_ingest_and_search() {
    let (tmp, data_dir) = setup_test_env();
    let pdf = tmp.path().join("files/archive.pdf");
    fs::write(&pdf, pdf_with_text("stellar archive retrieval notes")).unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, stderr, success) = run_alcove(&data_dir, &["index", pdf.to_str().unwrap()]);
    assert!(
        success,
        "pdf index failed: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(stdout.contains("Indexed:") && stdout.contains("(1 chunks)"));

    let (stdout, _, success) = run_alcove(&data_dir, &["search", "stellar archive retrieval"]);
    assert!(success, "search failed");
    assert!(
        stdout.contains("archive.pdf") || stdout.contains("stellar archive retrieval"),
        "search should surface the PDF, got: {}",
        stdout
    );
}

#[test]
fn file_support_corrupt_pdf_counted_failed_in_walk() {
    let (tmp, data_dir) = setup_test_env();
    let files = tmp.path().join("files");
    fs::write(files.join("bad.pdf"), b"not a valid pdf").unwrap();
    fs::write(files.join("good.md"), "# Good\n\nReadable markdown body here").unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, stderr, success) = run_alcove(&data_dir, &["index", files.to_str().unwrap()]);
    assert!(
        success,
        "walk must survive one bad file: stdout={}, stderr={}",
        stdout, stderr
    );
    assert!(
        stdout.contains("Indexed 1 files (0 skipped, 1 failed)"),
        "good.md indexed, bad.pdf failed, got: {}",
        stdout
    );
    assert!(
        stderr.contains("Warning:") && stderr.contains("bad.pdf"),
        "failure should be reported per file, got: {}",
        stderr
    );
}

#[test]
fn file_support_docx_ingest_and_search() {
    let (tmp, data_dir) = setup_test_env();
    let docx = tmp.path().join("files/memo.docx");
    fs::write(&docx, docx_with_paragraphs(&["office memo retrieval phrase"])).unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, stderr, success) = run_alcove(&data_dir, &["index", docx.to_str().unwrap()]);
    assert!(
        success,
        "docx index failed: stdout={}, stderr={}",
        stdout, stderr
    );

    let (stdout, _, success) = run_alcove(&data_dir, &["search", "office memo retrieval"]);
    assert!(success);
    assert!(
        stdout.contains("memo.docx") || stdout.contains("office memo retrieval"),
        "search should surface the DOCX, got: {}",
        stdout
    );
}

#[test]
fn file_support_docx_later_paragraphs_are_kept() {
    let (tmp, data_dir) = setup_test_env();
    let docx = tmp.path().join("files/runbook.docx");
    fs::write(
        &docx,
        docx_with_paragraphs(&[
            "first paragraph about onboarding",
            "second paragraph about decommissioning hardware",
        ]),
    )
    .unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, _, success) = run_alcove(&data_dir, &["index", docx.to_str().unwrap()]);
    assert!(success, "index failed: {}", stdout);
    assert!(stdout.contains("(1 chunks)"));

    let (stdout, _, _) = run_alcove(&data_dir, &["search", "decommissioning hardware"]);
    assert!(
        stdout.contains("runbook.docx"),
        "text past the first paragraph must be searchable, got: {}",
        stdout
    );
}

#[test]
fn file_support_corrupt_docx_fails_cleanly() {
    let (tmp, data_dir) = setup_test_env();
    let docx = tmp.path().join("files/broken.docx");
    fs::write(&docx, b"PK but not really a zip").unwrap();

    run_alcove(&data_dir, &["init"]);
    let (_, stderr, success) = run_alcove(&data_dir, &["index", docx.to_str().unwrap()]);
    assert!(!success, "corrupt docx must fail");
    assert!(
        stderr.contains("Invalid DOCX archive"),
        "got: {}",
        stderr
    );
}

#[test]
fn file_support_json_ingest_and_search() {
    let (tmp, data_dir) = setup_test_env();
    let json = tmp.path().join("files/policy.json");
    fs::write(
        &json,
        r#"{"policy": "rotate postgres credentials quarterly audit", "owner": "platform"}"#,
    )
    .unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, stderr, success) = run_alcove(&data_dir, &["index", json.to_str().unwrap()]);
    assert!(
        success,
        "json index failed: stdout={}, stderr={}",
        stdout, stderr
    );

    let (stdout, _, _) = run_alcove(&data_dir, &["search", "postgres credentials quarterly"]);
    assert!(
        stdout.contains("policy.json"),
        "search should surface the JSON document, got: {}",
        stdout
    );
}

#[test]
fn file_support_invalid_json_fails() {
    let (tmp, data_dir) = setup_test_env();
    let json = tmp.path().join("files/bad.json");
    fs::write(&json, "{not json").unwrap();

    run_alcove(&data_dir, &["init"]);
    let (_, stderr, success) = run_alcove(&data_dir, &["index", json.to_str().unwrap()]);
    assert!(!success, "invalid json must fail");
    assert!(stderr.contains("Invalid JSON"), "got: {}", stderr);
}

#[test]
fn file_support_code_file_language_filter() {
    let (tmp, data_dir) = setup_test_env();
    let py = tmp.path().join("files/inventory.py");
    fs::write(
        &py,
        "\"\"\" sync station inventory records nightly \"\"\"\n\ndef main():\n    pass\n",
    )
    .unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, stderr, success) = run_alcove(&data_dir, &["index", py.to_str().unwrap()]);
    assert!(
        success,
        "code index failed: stdout={}, stderr={}",
        stdout, stderr
    );

    // Code files carry a language tag usable as a search filter.
    let (stdout, _, _) = run_alcove(
        &data_dir,
        &[
            "search",
            "station inventory records",
            "--filter",
            "language=python",
        ],
    );
    assert!(stdout.contains("inventory.py"), "got: {}", stdout);

    let (stdout, _, _) = run_alcove(
        &data_dir,
        &[
            "search",
            "station inventory records",
            "--filter",
            "language=go",
        ],
    );
    assert!(stdout.contains("No results found."), "got: {}", stdout);
}

#[test]
fn file_support_markdown_title_filter() {
    let (tmp, data_dir) = setup_test_env();
    let md = tmp.path().join("files/guide.md");
    fs::write(
        &md,
        "# Rotation Guide\n\nRotate signing keys before expiry windows",
    )
    .unwrap();

    run_alcove(&data_dir, &["init"]);
    run_alcove(&data_dir, &["index", md.to_str().unwrap()]);

    let (stdout, _, _) = run_alcove(
        &data_dir,
        &[
            "search",
            "rotate signing keys",
            "--filter",
            "title=Rotation Guide",
        ],
    );
    assert!(stdout.contains("guide.md"), "got: {}", stdout);

    let (stdout, _, _) = run_alcove(
        &data_dir,
        &["search", "rotate signing keys", "--filter", "title=Wrong"],
    );
    assert!(stdout.contains("No results found."), "got: {}", stdout);
}

#[test]
fn file_support_empty_file_counted_failed_in_walk() {
    let (tmp, data_dir) = setup_test_env();
    let files = tmp.path().join("files");
    fs::write(files.join("empty.txt"), "").unwrap();
    fs::write(files.join("good.md"), "# Good\n\nReadable markdown body here").unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, stderr, success) = run_alcove(&data_dir, &["index", files.to_str().unwrap()]);
    assert!(success, "walk must survive the empty file");
    assert!(
        stdout.contains("Indexed 1 files (0 skipped, 1 failed)"),
        "got: {}",
        stdout
    );
    assert!(
        stderr.contains("no content"),
        "empty file should be reported, got: {}",
        stderr
    );
}

#[test]
fn file_support_type_filter_restricts_walk() {
    let (tmp, data_dir) = setup_test_env();
    let files = tmp.path().join("files");
    fs::write(files.join("a.md"), "# A\n\nmarkdown body").unwrap();
    fs::write(files.join("b.py"), "print('hi')\n").unwrap();
    fs::write(files.join("c.txt"), "plain text body").unwrap();

    run_alcove(&data_dir, &["init"]);
    let (stdout, _, success) = run_alcove(
        &data_dir,
        &["index", files.to_str().unwrap(), "--types", "md"],
    );
    assert!(success);
    assert!(
        stdout.contains("Indexed 1 files (0 skipped, 0 failed)"),
        "only a.md matches the type filter, got: {}",
        stdout
    );
}
