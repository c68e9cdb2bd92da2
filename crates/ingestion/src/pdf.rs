//! PDF text extraction module
//!
//! Loads a PDF with lopdf and produces one document per page.

use crate::errors::IngestionError;
use lopdf::content::Content;
use lopdf::{Document, Object};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

/// Text of a single PDF page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageDocument {
    /// Cleaned page text (may be empty for image-only pages)
    pub text: String,

    /// Zero-based page number
    pub page: u32,

    /// Page count of the whole file
    pub total_pages: u32,

    /// Source document name
    pub source: String,
}

/// Load every page of an in-memory PDF
pub fn load_pages(bytes: &[u8], source: &str) -> Result<Vec<PageDocument>, IngestionError> {
    load_pages_with(bytes, source, |doc, page_number| doc.extract_text(&[page_number]))
}

/// Page loop behind [`load_pages`]. When `extract` fails for a page its
/// content stream is scanned for text operators instead.
fn load_pages_with<F, E>(
    bytes: &[u8],
    source: &str,
    extract: F,
) -> Result<Vec<PageDocument>, IngestionError>
where
    F: Fn(&Document, u32) -> Result<String, E>,
    E: std::fmt::Display,
{
    let doc = Document::load_mem(bytes).map_err(|e| IngestionError::PdfParse {
        document: source.to_string(),
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    let total_pages = pages.len() as u32;

    debug!(source, page_count = total_pages, "Extracting text from PDF");

    let mut documents = Vec::with_capacity(pages.len());
    for (index, (page_number, page_id)) in pages.into_iter().enumerate() {
        let raw = match extract(&doc, page_number) {
            Ok(text) => text,
            Err(e) => {
                debug!(
                    page = page_number,
                    error = %e,
                    "lopdf extractor failed, scanning content stream"
                );
                match doc.get_page_content(page_id) {
                    Ok(content) => extract_text_from_content(&content),
                    Err(e) => {
                        warn!(
                            source,
                            page = page_number,
                            error = %e,
                            "Failed to extract text from page, skipping"
                        );
                        continue;
                    }
                }
            }
        };

        documents.push(PageDocument {
            text: clean_text(&raw),
            page: index as u32,
            total_pages,
            source: source.to_string(),
        });
    }

    debug!(
        source,
        pages = documents.len(),
        chars = documents.iter().map(|d| d.text.len()).sum::<usize>(),
        "Text extraction complete"
    );

    Ok(documents)
}

/// Load a PDF from disk, naming it after the file
pub fn load_pages_from_path(path: &Path) -> Result<Vec<PageDocument>, IngestionError> {
    if !path.exists() {
        return Err(IngestionError::FileNotFound(path.display().to_string()));
    }

    let bytes = std::fs::read(path)?;
    let source = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());

    load_pages(&bytes, &source)
}

/// Collect the strings shown by text operators in a content stream
fn extract_text_from_content(content: &[u8]) -> String {
    let Ok(content) = Content::decode(content) else {
        return String::new();
    };

    let mut text = String::new();
    for operation in &content.operations {
        match operation.operator.as_str() {
            "Tj" | "'" | "\"" => {
                // The string is always the last operand
                if let Some(Object::String(bytes, _)) = operation.operands.last() {
                    text.push_str(&decode_pdf_string(bytes));
                }
            }
            "TJ" => {
                if let Some(Object::Array(items)) = operation.operands.first() {
                    for item in items {
                        if let Object::String(bytes, _) = item {
                            text.push_str(&decode_pdf_string(bytes));
                        }
                    }
                }
            }
            "ET" => {
                if !text.ends_with('\n') && !text.is_empty() {
                    text.push('\n');
                }
            }
            _ => {}
        }
    }

    text
}

/// Decode a text string without font information.
///
/// Strings with a UTF-16BE byte order mark are decoded as such, anything else
/// is read as Latin-1, which matches the standard 14 fonts for ASCII and most
/// accented letters.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
            char::decode_utf16(units)
                .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
                .collect()
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Normalize extracted text.
///
/// Drops NUL and BOM characters, trims trailing whitespace on every line and
/// keeps at most one blank line between paragraphs.
pub fn clean_text(text: &str) -> String {
    let stripped: String = text
        .chars()
        .filter(|c| *c != '\0' && *c != '\u{FEFF}')
        .collect();

    let mut cleaned = String::with_capacity(stripped.len());
    let mut blank_run = 0;
    for line in stripped.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        cleaned.push_str(line);
        cleaned.push('\n');
    }

    cleaned.trim().to_string()
}

/// Builders for in-memory PDFs used by tests
#[cfg(any(test, feature = "test-util"))]
pub mod testing {
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Document, Object, Stream};

    /// Build an uncompressed PDF with one page per entry of `pages`.
    /// Each page shows its text with a single `Tj` operator per line.
    pub fn sample_pdf(pages: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids = Vec::with_capacity(pages.len());
        for text in pages {
            let mut operations = vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 12.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
            ];
            for line in text.lines() {
                operations.push(Operation::new("Tj", vec![Object::string_literal(line)]));
                operations.push(Operation::new("Td", vec![0.into(), (-14).into()]));
            }
            operations.push(Operation::new("ET", vec![]));

            let content = Content { operations };
            let content_id = doc.add_object(Stream::new(
                dictionary! {},
                content.encode().expect("encode content stream"),
            ));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
            });
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        let pages_dict = dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages_dict));

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("write PDF to memory");
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::testing::sample_pdf;
    use super::*;

    #[test]
    fn test_clean_text() {
        let input = "Hello World   \n\n\n\nSecond\u{0} paragraph\u{FEFF}\t\nend";
        let cleaned = clean_text(input);
        assert_eq!(cleaned, "Hello World\n\nSecond paragraph\nend");
    }

    #[test]
    fn test_clean_text_keeps_single_blank_line() {
        assert_eq!(clean_text("a\n\nb"), "a\n\nb");
        assert_eq!(clean_text("  \n\n"), "");
    }

    #[test]
    fn test_load_pages_one_document_per_page() {
        let pdf = sample_pdf(&["Alpha page text", "Beta page text", "Gamma page text"]);
        let pages = load_pages(&pdf, "greek.pdf").unwrap();

        assert_eq!(pages.len(), 3);
        for (i, page) in pages.iter().enumerate() {
            assert_eq!(page.page, i as u32);
            assert_eq!(page.total_pages, 3);
            assert_eq!(page.source, "greek.pdf");
        }
        assert!(pages[0].text.contains("Alpha"));
        assert!(pages[2].text.contains("Gamma"));
    }

    #[test]
    fn test_load_pages_rejects_garbage() {
        let result = load_pages(b"definitely not a pdf", "notes.txt");
        assert!(matches!(result, Err(IngestionError::PdfParse { .. })));
    }

    #[test]
    fn test_content_stream_scan() {
        let content = b"BT /F1 12 Tf 72 720 Td (Hello) Tj [(Wor) -20 (ld)] TJ ET";
        let text = extract_text_from_content(content);
        assert_eq!(text, "HelloWorld\n");
    }

    #[test]
    fn test_failed_extractor_falls_back_to_content_scan() {
        let pdf = sample_pdf(&["Fallback page one", "Fallback page two"]);
        let pages = load_pages_with(&pdf, "fallback.pdf", |_, _| {
            Err::<String, _>("unsupported font encoding")
        })
        .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].text, "Fallback page one");
        assert_eq!(pages[1].text, "Fallback page two");
        assert_eq!(pages[1].page, 1);
        assert_eq!(pages[1].total_pages, 2);
    }

    #[test]
    fn test_decode_pdf_string() {
        assert_eq!(decode_pdf_string(b"plain"), "plain");
        assert_eq!(decode_pdf_string(&[0x43, 0x61, 0x66, 0xE9]), "Caf\u{e9}");
        assert_eq!(decode_pdf_string(&[0xFE, 0xFF, 0x00, 0x52, 0x00, 0xFC]), "R\u{fc}");
    }

    #[test]
    fn test_missing_file() {
        let result = load_pages_from_path(Path::new("/nonexistent/file.pdf"));
        assert!(matches!(result, Err(IngestionError::FileNotFound(_))));
    }
}
