//! extractor.rs
//!
//! Turns a raw corpus file into plain text.
//!
//! Supported formats:
//! - plain text (`txt`, `md`, `text`), read as lossy UTF-8
//! - PDF (`pdf`) via `pdf-extract`, pages in order
//! - Word (`docx`), paragraphs of `word/document.xml` in order
//!
//! PDF and Word failures degrade to an empty string so that one corrupt file
//! never blocks the rest of a rebuild. An unknown extension is an
//! `ExtractionFailure`, which the caller skips.
//!
//! This module performs blocking I/O; call it from `spawn_blocking`.

use std::fs;
use std::io::{Cursor, Read};
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};
use xmltree::{Element, XMLNode};

#[derive(Debug, Error)]
pub enum ExtractionFailure {
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("no text could be extracted")]
    Empty,

    #[error("extractor panicked: {0}")]
    Panicked(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    PlainText,
    Pdf,
    Word,
}

impl DocumentFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "txt" | "md" | "text" => Some(Self::PlainText),
            "pdf" => Some(Self::Pdf),
            "docx" => Some(Self::Word),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "text",
            Self::Pdf => "pdf",
            Self::Word => "docx",
        }
    }
}

/// Detects the format from the extension and extracts.
pub fn extract_path(path: &Path) -> Result<String, ExtractionFailure> {
    let format = DocumentFormat::from_path(path).ok_or_else(|| {
        ExtractionFailure::UnsupportedFormat(
            path.extension()
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "<none>".to_string()),
        )
    })?;
    extract(path, format)
}

pub fn extract(path: &Path, format: DocumentFormat) -> Result<String, ExtractionFailure> {
    debug!("extracting {} as {}", path.display(), format.as_str());
    let bytes = fs::read(path)?;
    let text = match format {
        DocumentFormat::PlainText => String::from_utf8_lossy(&bytes).into_owned(),
        DocumentFormat::Pdf => pdf_text(&bytes).unwrap_or_else(|e| {
            warn!("PDF extraction failed for {}: {e}", path.display());
            String::new()
        }),
        DocumentFormat::Word => docx_text(&bytes).unwrap_or_else(|e| {
            warn!("DOCX extraction failed for {}: {e}", path.display());
            String::new()
        }),
    };
    Ok(text.trim().to_string())
}

// -------- PDF --------

fn pdf_text(bytes: &[u8]) -> Result<String, String> {
    let raw = pdf_extract::extract_text_from_mem(bytes).map_err(|e| e.to_string())?;
    // pdf-extract separates pages with form feeds.
    let pages: Vec<&str> = raw
        .split('\u{c}')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    Ok(pages.join("\n"))
}

// -------- DOCX --------

const DOCX_BODY: &str = "word/document.xml";

fn docx_text(bytes: &[u8]) -> Result<String, String> {
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| e.to_string())?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .map_err(|e| format!("{DOCX_BODY}: {e}"))?
        .read_to_string(&mut xml)
        .map_err(|e| e.to_string())?;
    docx_xml_text(&xml)
}

/// Paragraph text of a WordprocessingML body, one paragraph per line.
fn docx_xml_text(xml: &str) -> Result<String, String> {
    let root = Element::parse(Cursor::new(xml.as_bytes())).map_err(|e| e.to_string())?;
    let mut paragraphs = Vec::new();
    collect_paragraphs(&root, &mut paragraphs);
    Ok(paragraphs
        .into_iter()
        .filter(|p| !p.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n"))
}

fn collect_paragraphs(el: &Element, out: &mut Vec<String>) {
    if el.name == "p" {
        let mut text = String::new();
        collect_runs(el, &mut text);
        out.push(text);
        return;
    }
    for child in &el.children {
        if let XMLNode::Element(child) = child {
            collect_paragraphs(child, out);
        }
    }
}

fn collect_runs(el: &Element, out: &mut String) {
    for child in &el.children {
        let XMLNode::Element(child) = child else {
            continue;
        };
        match child.name.as_str() {
            "t" => {
                if let Some(text) = child.get_text() {
                    out.push_str(&text);
                }
            }
            "tab" => out.push('\t'),
            "br" | "cr" => out.push('\n'),
            // nested paragraphs live in text boxes; keep their text inline
            _ => collect_runs(child, out),
        }
    }
}
