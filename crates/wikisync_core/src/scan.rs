use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use walkdir::WalkDir;

use crate::document::DEFAULT_CATEGORY;

const EXCLUDED_NAME_PARTS: [&str; 2] = ["index", "test"];

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ScannedDocument {
    #[serde(skip)]
    pub full_path: PathBuf,
    pub relative_path: String,
    pub file_name: String,
    /// First directory segment under the wiki root, or `General`.
    pub category_key: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanStats {
    pub total_files: usize,
    pub categories: usize,
    pub by_category: BTreeMap<String, usize>,
}

pub fn scan_wiki(root: &Path) -> Result<Vec<ScannedDocument>> {
    if !root.is_dir() {
        bail!("wiki directory does not exist: {}", normalize_path(root));
    }

    let mut out = Vec::new();
    for entry in WalkDir::new(root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("html") {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if EXCLUDED_NAME_PARTS
            .iter()
            .any(|part| file_name.contains(part))
        {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .with_context(|| format!("{} is outside {}", path.display(), root.display()))?;
        let relative_path = normalize_path(relative);
        out.push(ScannedDocument {
            full_path: path.to_path_buf(),
            category_key: category_key(&relative_path),
            relative_path,
            file_name,
        });
    }
    out.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(out)
}

pub fn group_by_category(
    documents: Vec<ScannedDocument>,
) -> BTreeMap<String, Vec<ScannedDocument>> {
    let mut grouped: BTreeMap<String, Vec<ScannedDocument>> = BTreeMap::new();
    for document in documents {
        grouped
            .entry(document.category_key.clone())
            .or_default()
            .push(document);
    }
    grouped
}

pub fn scan_stats(documents: &[ScannedDocument]) -> ScanStats {
    let mut by_category = BTreeMap::new();
    for document in documents {
        *by_category.entry(document.category_key.clone()).or_insert(0) += 1;
    }
    ScanStats {
        total_files: documents.len(),
        categories: by_category.len(),
        by_category,
    }
}

/// `dev-ops` becomes `Dev Ops`.
pub fn format_category_name(key: &str) -> String {
    key.split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn category_key(relative_path: &str) -> String {
    let mut segments = relative_path.split('/');
    match (segments.next(), segments.next()) {
        (Some(first), Some(_)) if !first.is_empty() => first.to_string(),
        _ => DEFAULT_CATEGORY.to_string(),
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}
