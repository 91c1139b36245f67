// Text extraction
// Turns uploaded document bytes into raw text ready for fragmenting


use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;

/// An uploaded document: raw bytes plus the name it was uploaded under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub filename: String,
    pub content: Vec<u8>,
}

impl Document {
    #[inline]
    pub fn new(filename: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            content: content.into(),
        }
    }

    /// Read a document from disk, naming it after the file name component of `path`
    #[inline]
    pub fn from_path(path: &Path) -> Result<Self> {
        let content =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(Self {
            filename: document_name(path),
            content,
        })
    }

    /// Lowercased file extension, if the filename has one
    #[inline]
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.filename)
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
    }
}

/// Name a document read from `path` is uploaded under: its file name component
#[inline]
pub fn document_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |name| name.to_string_lossy().into_owned())
}

/// Produces the raw text of a document
pub trait TextExtractor: Send + Sync {
    fn extract(&self, document: &Document) -> Result<String>;
}

/// Extracts PDF text with poppler's `pdftotext` binary
#[derive(Debug, Clone)]
pub struct PdftotextExtractor {
    binary: PathBuf,
}

impl PdftotextExtractor {
    #[inline]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

impl Default for PdftotextExtractor {
    #[inline]
    fn default() -> Self {
        Self::new("pdftotext")
    }
}

impl TextExtractor for PdftotextExtractor {
    #[inline]
    fn extract(&self, document: &Document) -> Result<String> {
        debug!(
            "Extracting {} ({} bytes) with {}",
            document.filename,
            document.content.len(),
            self.binary.display()
        );

        let mut input = tempfile::Builder::new()
            .prefix("pdf-rag-")
            .suffix(".pdf")
            .tempfile()
            .context("Failed to create temporary PDF file")?;
        input
            .write_all(&document.content)
            .context("Failed to write temporary PDF file")?;
        input.flush().context("Failed to flush temporary PDF file")?;

        let output = Command::new(&self.binary)
            .arg(input.path())
            .arg("-")
            .output()
            .with_context(|| {
                format!(
                    "Failed to run {} (is poppler installed?)",
                    self.binary.display()
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("pdftotext failed for {}: {}", document.filename, stderr.trim());
            return Err(anyhow!("pdftotext failed: {}", stderr.trim()));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        info!(
            "Extracted {} characters from {}",
            text.chars().count(),
            document.filename
        );
        Ok(text)
    }
}

/// Treats document bytes as UTF-8 text
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    #[inline]
    fn extract(&self, document: &Document) -> Result<String> {
        String::from_utf8(document.content.clone())
            .with_context(|| format!("{} is not valid UTF-8", document.filename))
    }
}

/// Picks an extractor by file extension: text files are read directly, everything else
/// goes through `pdftotext`
#[derive(Debug, Clone)]
pub struct ExtractorSet {
    pdf: PdftotextExtractor,
    plain: PlainTextExtractor,
}

impl ExtractorSet {
    #[inline]
    pub fn new(config: &ExtractionConfig) -> Self {
        Self {
            pdf: PdftotextExtractor::new(&config.pdftotext_path),
            plain: PlainTextExtractor,
        }
    }
}

impl TextExtractor for ExtractorSet {
    #[inline]
    fn extract(&self, document: &Document) -> Result<String> {
        match document.extension().as_deref() {
            Some("txt" | "md") => self.plain.extract(document),
            _ => self.pdf.extract(document),
        }
    }
}
