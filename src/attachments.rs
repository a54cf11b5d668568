//! Extracts plain text from files a user attaches to the next message.

use quick_xml::Reader;
use quick_xml::events::Event;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::ChatError;

const PLAIN_TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "json", "log"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub text: String,
}

/// Runs [`extract_text`] on the blocking pool. A panic inside a parser is
/// reported as an unsupported attachment instead of unwinding the caller.
pub async fn load(path: PathBuf, max_bytes: u64) -> Result<Attachment, ChatError> {
    off_executor(move || extract_text(&path, max_bytes)).await
}

async fn off_executor<T, F>(task: F) -> Result<T, ChatError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
{
    match tokio::task::spawn_blocking(task).await {
        Ok(result) => result,
        Err(err) => {
            warn!(error = %err, "attachment extraction task failed");
            Err(ChatError::UnsupportedAttachment(format!(
                "text extraction panicked: {err}"
            )))
        }
    }
}

/// Reads `path` and returns its text, refusing files over `max_bytes`.
pub fn extract_text(path: &Path, max_bytes: u64) -> Result<Attachment, ChatError> {
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("attachment")
        .to_string();
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();

    let meta = fs::metadata(path).map_err(|err| {
        ChatError::UnsupportedAttachment(format!("cannot read '{}': {err}", path.display()))
    })?;
    if !meta.is_file() {
        return Err(ChatError::UnsupportedAttachment(format!(
            "'{}' is not a regular file",
            path.display()
        )));
    }
    if meta.len() > max_bytes {
        return Err(ChatError::UnsupportedAttachment(format!(
            "'{}' is too large: {:.2} MB (limit {:.2} MB)",
            name,
            meta.len() as f64 / (1024.0 * 1024.0),
            max_bytes as f64 / (1024.0 * 1024.0)
        )));
    }

    let bytes = fs::read(path).map_err(|err| {
        ChatError::UnsupportedAttachment(format!("cannot read '{}': {err}", path.display()))
    })?;

    let text = match extension.as_str() {
        ext if PLAIN_TEXT_EXTENSIONS.contains(&ext) => String::from_utf8(bytes).map_err(|_| {
            ChatError::UnsupportedAttachment(format!("'{name}' is not valid UTF-8 text"))
        })?,
        "docx" => docx_text(&bytes, max_bytes)
            .map_err(|err| ChatError::UnsupportedAttachment(format!("'{name}': {err}")))?,
        "pdf" => pdf_text(&name, bytes)?,
        "" => {
            return Err(ChatError::UnsupportedAttachment(format!(
                "'{name}' has no file extension; supported: {}, docx, pdf",
                PLAIN_TEXT_EXTENSIONS.join(", ")
            )));
        }
        other => {
            return Err(ChatError::UnsupportedAttachment(format!(
                "'.{other}' files are not supported; supported: {}, docx, pdf",
                PLAIN_TEXT_EXTENSIONS.join(", ")
            )));
        }
    };

    if text.trim().is_empty() {
        return Err(ChatError::UnsupportedAttachment(format!(
            "'{name}' contains no extractable text"
        )));
    }

    debug!(attachment = %name, text_len = text.len(), "extracted attachment text");
    Ok(Attachment { name, text })
}

/// Joins attachments into the text carried by a message.
pub fn render(attachments: &[Attachment]) -> String {
    attachments
        .iter()
        .map(|attachment| format!("--- {} ---\n{}", attachment.name, attachment.text.trim_end()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Text of `word/document.xml`; the body may expand to at most `max_bytes`.
fn docx_text(bytes: &[u8], max_bytes: u64) -> Result<String, String> {
    let mut archive =
        zip::ZipArchive::new(Cursor::new(bytes)).map_err(|err| format!("not a docx archive: {err}"))?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|err| format!("missing document body: {err}"))?
        .take(max_bytes.saturating_add(1))
        .read_to_string(&mut xml)
        .map_err(|err| format!("unreadable document body: {err}"))?;
    if xml.len() as u64 > max_bytes {
        return Err(format!(
            "document body expands beyond the {:.2} MB limit",
            max_bytes as f64 / (1024.0 * 1024.0)
        ));
    }

    let mut reader = Reader::from_str(&xml);
    let mut out = String::new();
    let mut in_text = false;

    loop {
        match reader
            .read_event()
            .map_err(|err| format!("malformed document xml: {err}"))?
        {
            Event::Start(tag) if tag.name().as_ref() == b"w:t" => in_text = true,
            Event::End(tag) => match tag.name().as_ref() {
                b"w:t" => in_text = false,
                b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Empty(tag) => match tag.name().as_ref() {
                b"w:tab" => out.push('\t'),
                b"w:br" | b"w:p" => out.push('\n'),
                _ => {}
            },
            Event::Text(text) if in_text => {
                let decoded = text
                    .decode()
                    .map_err(|err| format!("undecodable text: {err}"))?;
                out.push_str(&decoded);
            }
            Event::GeneralRef(reference) if in_text => {
                if let Ok(Some(ch)) = reference.resolve_char_ref() {
                    out.push(ch);
                } else if let Ok(name) = reference.decode()
                    && let Some(resolved) = quick_xml::escape::resolve_predefined_entity(&name)
                {
                    out.push_str(resolved);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(out)
}

#[cfg(feature = "pdf")]
fn pdf_text(name: &str, bytes: Vec<u8>) -> Result<String, ChatError> {
    pdf_extract::extract_text_from_mem(&bytes).map_err(|err| {
        ChatError::UnsupportedAttachment(format!("'{name}': PDF extraction failed: {err}"))
    })
}

#[cfg(not(feature = "pdf"))]
fn pdf_text(name: &str, _bytes: Vec<u8>) -> Result<String, ChatError> {
    Err(ChatError::UnsupportedAttachment(format!(
        "'{name}': PDF support is not compiled in; rebuild with `--features pdf`"
    )))
}

#[cfg(test)]
mod tests {
    use super::{Attachment, docx_text, extract_text, load, off_executor, render};
    use crate::error::ChatError;
    use std::fs;
    use std::io::{Cursor, Write};
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(suffix: &str) -> PathBuf {
        let stamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock should be after unix epoch")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!(
            "parley-attachments-{suffix}-{stamp}-{}",
            std::process::id()
        ));
        fs::create_dir_all(&dir).expect("failed to create temp directory");
        dir
    }

    fn docx_bytes(document_xml: &str) -> Vec<u8> {
        docx_bytes_with(document_xml, zip::CompressionMethod::Stored)
    }

    fn docx_bytes_with(document_xml: &str, method: zip::CompressionMethod) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default().compression_method(method);
        writer
            .start_file("word/document.xml", options)
            .expect("start docx entry");
        writer
            .write_all(document_xml.as_bytes())
            .expect("write docx entry");
        writer.finish().expect("finish docx").into_inner()
    }

    #[test]
    fn reads_plain_text_files() {
        let dir = unique_temp_dir("text");
        let path = dir.join("notes.md");
        fs::write(&path, "# Notes\nremember the milk\n").expect("write file");

        let attachment = extract_text(&path, 1024).expect("markdown should load");
        assert_eq!(attachment.name, "notes.md");
        assert!(attachment.text.contains("remember the milk"));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_unknown_extensions_and_missing_files() {
        let dir = unique_temp_dir("unsupported");
        let path = dir.join("image.png");
        fs::write(&path, [0x89, 0x50, 0x4e, 0x47]).expect("write file");

        let err = extract_text(&path, 1024).expect_err("png should be rejected");
        assert!(matches!(err, ChatError::UnsupportedAttachment(msg) if msg.contains(".png")));

        let missing = dir.join("missing.txt");
        assert!(matches!(
            extract_text(&missing, 1024),
            Err(ChatError::UnsupportedAttachment(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_files_over_the_size_limit() {
        let dir = unique_temp_dir("large");
        let path = dir.join("big.txt");
        fs::write(&path, "x".repeat(2048)).expect("write file");

        let err = extract_text(&path, 1024).expect_err("oversized file should be rejected");
        assert!(matches!(err, ChatError::UnsupportedAttachment(msg) if msg.contains("too large")));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn rejects_empty_text() {
        let dir = unique_temp_dir("empty");
        let path = dir.join("blank.txt");
        fs::write(&path, "  \n").expect("write file");

        assert!(matches!(
            extract_text(&path, 1024),
            Err(ChatError::UnsupportedAttachment(_))
        ));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn docx_paragraphs_become_lines() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main">
  <w:body>
    <w:p><w:r><w:t>First</w:t></w:r><w:r><w:t xml:space="preserve"> paragraph</w:t></w:r></w:p>
    <w:p><w:r><w:t>Fish &amp; chips</w:t></w:r></w:p>
  </w:body>
</w:document>"#;
        let text = docx_text(&docx_bytes(xml), 1024 * 1024).expect("docx should parse");
        assert_eq!(text, "First paragraph\nFish & chips\n");
    }

    #[test]
    fn docx_file_goes_through_extract_text() {
        let dir = unique_temp_dir("docx");
        let path = dir.join("report.docx");
        fs::write(
            &path,
            docx_bytes(r#"<w:document><w:body><w:p><w:r><w:t>Quarterly</w:t></w:r></w:p></w:body></w:document>"#),
        )
        .expect("write file");

        let attachment = extract_text(&path, 1024 * 1024).expect("docx should load");
        assert_eq!(attachment.text.trim(), "Quarterly");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn docx_body_expanding_past_the_limit_is_rejected() {
        let dir = unique_temp_dir("docx-bomb");
        let path = dir.join("bomb.docx");
        let xml = format!(
            "<w:document><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            "a".repeat(200_000)
        );
        let bytes = docx_bytes_with(&xml, zip::CompressionMethod::Deflated);
        assert!(bytes.len() < 16 * 1024, "fixture should compress well");
        fs::write(&path, bytes).expect("write file");

        let err = extract_text(&path, 16 * 1024).expect_err("expanded body should be rejected");
        assert!(matches!(err, ChatError::UnsupportedAttachment(msg) if msg.contains("expands beyond")));

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn load_reads_files_on_the_blocking_pool() {
        let dir = unique_temp_dir("load");
        let path = dir.join("notes.txt");
        fs::write(&path, "meeting at noon").expect("write file");

        let attachment = load(path, 1024).await.expect("text should load");
        assert_eq!(attachment.text, "meeting at noon");

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn parser_panic_becomes_an_attachment_error() {
        let result = off_executor(|| -> Result<Attachment, ChatError> {
            panic!("malformed xref table")
        })
        .await;
        assert!(matches!(result, Err(ChatError::UnsupportedAttachment(msg)) if msg.contains("panicked")));
    }

    #[test]
    fn broken_docx_is_unsupported() {
        assert!(docx_text(b"definitely not a zip", 1024).is_err());
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn pdf_requires_the_pdf_feature() {
        let dir = unique_temp_dir("pdf");
        let path = dir.join("paper.pdf");
        fs::write(&path, b"%PDF-1.4").expect("write file");

        let err = extract_text(&path, 1024).expect_err("pdf should need the feature");
        assert!(matches!(err, ChatError::UnsupportedAttachment(msg) if msg.contains("--features pdf")));

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn render_labels_each_attachment() {
        let rendered = render(&[
            Attachment {
                name: "a.txt".to_string(),
                text: "alpha\n".to_string(),
            },
            Attachment {
                name: "b.md".to_string(),
                text: "beta".to_string(),
            },
        ]);
        assert_eq!(rendered, "--- a.txt ---\nalpha\n\n--- b.md ---\nbeta");
    }
}
