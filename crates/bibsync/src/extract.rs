//! Content and metadata extraction from retrieved binaries.
//!
//! Extractors are pure functions from the orchestrator's point of view:
//! bytes in, text or metadata out, any failure recorded against the record
//! being migrated.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ExtractError;

static RE_DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,9}/[-._;()/:a-zA-Z0-9]+").unwrap());
static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap());
static RE_ABSTRACT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\babstract\b").unwrap());

/// Minimum number of characters before the alphanumeric ratio check applies.
const MIN_TOTAL_CHARS: usize = 50;

/// Minimum percentage of alphanumeric characters for text to count as usable.
const MIN_ALPHANUMERIC_PERCENT: usize = 10;

/// Maximum abstract length captured from body text.
const MAX_ABSTRACT_CHARS: usize = 1200;

/// Bibliographic metadata extracted from a document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abstract_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
}

/// Extracts text and bibliographic metadata from record content.
pub trait ContentExtractor: Send + Sync {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError>;
    fn extract_metadata(&self, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError>;
}

/// Determines whether extracted text is usable or garbled font soup.
/// Empty text, or text dominated by non-alphanumeric characters, is
/// rejected so the record fails loudly instead of persisting junk.
fn has_usable_text(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return false;
    }

    let total_chars = trimmed.chars().count();
    let alphanumeric_chars = trimmed.chars().filter(|c| c.is_alphanumeric()).count();

    !(total_chars > MIN_TOTAL_CHARS
        && alphanumeric_chars * 100 < total_chars * MIN_ALPHANUMERIC_PERCENT)
}

/// Scans body text for an abstract section, a DOI and a publication year.
fn scan_text_metadata(text: &str, metadata: &mut DocumentMetadata) {
    if metadata.doi.is_none() {
        metadata.doi = RE_DOI.find(text).map(|m| m.as_str().to_string());
    }
    if metadata.year.is_none() {
        metadata.year = RE_YEAR
            .find(text)
            .and_then(|m| m.as_str().parse::<i32>().ok());
    }
    if metadata.abstract_text.is_none() {
        if let Some(m) = RE_ABSTRACT.find(text) {
            let body = text[m.end()..].trim_start_matches([':', '-', ' ', '\n']);
            let excerpt: String = body.chars().take(MAX_ABSTRACT_CHARS).collect();
            let excerpt = excerpt.trim();
            if !excerpt.is_empty() {
                metadata.abstract_text = Some(excerpt.to_string());
            }
        }
    }
}

// ─── PDF ────────────────────────────────────────────────────────────────────

/// PDF extractor over embedded text. Documents without usable embedded
/// text (scans, broken font encodings) fail extraction; OCR is a concern
/// of the upstream archive, not of this engine.
pub struct PdfExtractor;

impl PdfExtractor {
    pub fn new() -> Self {
        Self
    }

    fn load(bytes: &[u8]) -> Result<lopdf::Document, ExtractError> {
        lopdf::Document::load_mem(bytes).map_err(|e| ExtractError::PdfParsing(e.to_string()))
    }

    fn info_string(doc: &lopdf::Document, key: &[u8]) -> Option<String> {
        let info = doc.trailer.get(b"Info").ok()?;
        let dict = match info {
            lopdf::Object::Reference(id) => doc.get_object(*id).ok()?.as_dict().ok()?,
            lopdf::Object::Dictionary(dict) => dict,
            _ => return None,
        };
        let raw = match dict.get(key).ok()? {
            lopdf::Object::String(bytes, _) => bytes,
            _ => return None,
        };
        let value = String::from_utf8_lossy(raw).trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for PdfExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let doc = Self::load(bytes)?;

        let mut text = String::new();
        for (page_num, _) in doc.get_pages() {
            if let Ok(page_text) = doc.extract_text(&[page_num]) {
                text.push_str(&page_text);
                text.push('\n');
            }
        }

        if !has_usable_text(&text) {
            return Err(ExtractError::TextExtraction(
                "no usable embedded text".to_string(),
            ));
        }
        Ok(text)
    }

    fn extract_metadata(&self, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError> {
        let doc = Self::load(bytes)?;

        let mut metadata = DocumentMetadata {
            title: Self::info_string(&doc, b"Title"),
            authors: Self::info_string(&doc, b"Author")
                .map(|a| {
                    a.split(&[';', ','][..])
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
            ..Default::default()
        };

        // First pages usually carry the DOI, year and abstract.
        let pages: Vec<u32> = doc.get_pages().keys().take(2).copied().collect();
        if let Ok(text) = doc.extract_text(&pages) {
            scan_text_metadata(&text, &mut metadata);
        }
        Ok(metadata)
    }
}

// ─── Plain text ─────────────────────────────────────────────────────────────

/// Extractor for plain-text content; also the test-suite workhorse.
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Default for PlainTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentExtractor for PlainTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String, ExtractError> {
        let text = String::from_utf8_lossy(bytes).to_string();
        if text.trim().is_empty() {
            return Err(ExtractError::TextExtraction("empty document".to_string()));
        }
        Ok(text)
    }

    fn extract_metadata(&self, bytes: &[u8]) -> Result<DocumentMetadata, ExtractError> {
        let text = self.extract_text(bytes)?;
        let mut metadata = DocumentMetadata {
            title: text
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(|l| l.to_string()),
            ..Default::default()
        };
        scan_text_metadata(&text, &mut metadata);
        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_usable_text_gate() {
        assert!(!has_usable_text(""));
        assert!(!has_usable_text("   \n\n  "));
        assert!(has_usable_text("A Study of Quark-Gluon Plasma"));
        // short junk passes (below the ratio-check threshold)
        assert!(has_usable_text("!@#$%"));
        // long junk is rejected
        let garbled = "!@#$%^&*()".repeat(10);
        assert!(!has_usable_text(&garbled));
    }

    #[test]
    fn test_plain_text_metadata() {
        let text = b"Deep Learning for Citation Parsing\n\nAbstract: We present a parser.\n\
                     Published 2021. doi 10.1234/example.5678\n";
        let extractor = PlainTextExtractor::new();
        let metadata = extractor.extract_metadata(text).unwrap();

        assert_eq!(
            metadata.title.as_deref(),
            Some("Deep Learning for Citation Parsing")
        );
        assert_eq!(metadata.year, Some(2021));
        assert_eq!(metadata.doi.as_deref(), Some("10.1234/example.5678"));
        assert!(metadata
            .abstract_text
            .as_deref()
            .unwrap()
            .starts_with("We present a parser."));
    }

    #[test]
    fn test_plain_text_rejects_empty() {
        let extractor = PlainTextExtractor::new();
        assert!(extractor.extract_text(b"   ").is_err());
    }

    #[test]
    fn test_pdf_rejects_invalid_bytes() {
        let extractor = PdfExtractor::new();
        let err = extractor.extract_text(b"not a pdf").unwrap_err();
        assert!(matches!(err, ExtractError::PdfParsing(_)));
    }

    #[test]
    fn test_pdf_info_dictionary_metadata() {
        use lopdf::{dictionary, Document, Object, Stream};

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let content_id = doc.new_object_id();
        let page_id = doc.new_object_id();

        let content = "BT /F1 12 Tf 50 700 Td (Abstract: We measure things. 10.5555/jhep.2020) Tj ET";
        doc.objects.insert(
            content_id,
            Object::Stream(Stream::new(dictionary! {}, content.as_bytes().to_vec())),
        );
        doc.objects.insert(
            page_id,
            Object::Dictionary(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
                "Contents" => content_id,
            }),
        );
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(dictionary! {
            "Title" => Object::string_literal("Measuring Things"),
            "Author" => Object::string_literal("Ada Lovelace; Grace Hopper"),
        });
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);

        let mut pdf_bytes = Vec::new();
        doc.save_to(&mut pdf_bytes).unwrap();

        let extractor = PdfExtractor::new();
        let metadata = extractor.extract_metadata(&pdf_bytes).unwrap();
        assert_eq!(metadata.title.as_deref(), Some("Measuring Things"));
        assert_eq!(metadata.authors, vec!["Ada Lovelace", "Grace Hopper"]);
    }
}
