use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use inkwell_sync::providers::{FetchedDocument, PageRenderer};
use inkwell_sync::ProviderError;

/// Pages are already rendered by the export; this only orders them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PageDirRenderer;

impl PageRenderer for PageDirRenderer {
    fn render(
        &self,
        doc: &FetchedDocument,
        _work_dir: &Path,
    ) -> Result<Vec<PathBuf>, ProviderError> {
        let entries = fs::read_dir(&doc.path)
            .map_err(|e| ProviderError::Unavailable(format!("{}: {e}", doc.path.display())))?;
        let mut pages: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.is_file())
            .collect();
        pages.sort_by(|a, b| page_order(a, b));
        Ok(pages)
    }
}

/// Last run of digits in the file stem: `Notes.page-12` is page 12.
fn page_number(path: &Path) -> Option<u64> {
    let stem = path.file_stem()?.to_str()?;
    let end = stem.rfind(|c: char| c.is_ascii_digit())? + 1;
    let start = stem[..end]
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |i| i + 1);
    stem[start..end].parse().ok()
}

fn page_order(a: &Path, b: &Path) -> Ordering {
    match (page_number(a), page_number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
