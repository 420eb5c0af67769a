//! Public PDF library
//!
//! PDFs dropped into the public `pdfs` directory are listed so the viewer can
//! offer them without typing a URL.

use std::io;
use std::path::Path;

use serde::Serialize;

use crate::source::PUBLIC_PDF_PREFIX;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PdfEntry {
    pub name: String,
    pub url: String,
}

impl PdfEntry {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let url = format!("{}{}", PUBLIC_PDF_PREFIX, urlencoding::encode(&name));
        Self { name, url }
    }
}

fn is_pdf_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

/// Regular `.pdf` files in `dir`, sorted by name.
///
/// A missing directory is an empty library.
pub async fn list_public_pdfs(dir: &Path) -> io::Result<Vec<PdfEntry>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!("PDF directory {} does not exist", dir.display());
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        // Names that are not valid UTF-8 cannot be linked
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if is_pdf_name(&name) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names.into_iter().map(PdfEntry::new).collect())
}
