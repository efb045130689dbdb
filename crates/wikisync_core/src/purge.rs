use std::collections::BTreeSet;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::config::ResolvedSettings;
use crate::index_page::find_index_page;
use crate::notion::{NotionApi, find_page_by_title};
use crate::scan::{format_category_name, group_by_category, scan_wiki};

#[derive(Debug, Clone)]
pub struct PurgeOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
}

impl PurgeOptions {
    pub fn from_settings(settings: &ResolvedSettings) -> Self {
        Self {
            batch_size: settings.batch_size,
            batch_delay: settings.batch_delay(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchivedPage {
    pub title: String,
    pub page_id: String,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PurgeReport {
    pub categories_found: usize,
    pub categories_missing: Vec<String>,
    pub archived: usize,
    pub failed: usize,
    pub pages: Vec<ArchivedPage>,
}

#[derive(Debug, Clone)]
struct Target {
    title: String,
    page_id: String,
}

/// Archive every page a sync of `wiki_root` would have produced: document
/// pages first, then their category pages, then the index page.
pub fn purge_wiki(
    api: &dyn NotionApi,
    wiki_root: &Path,
    options: &PurgeOptions,
) -> Result<PurgeReport> {
    let documents = scan_wiki(wiki_root)?;
    let names = group_by_category(documents)
        .keys()
        .map(|key| format_category_name(key))
        .collect::<BTreeSet<_>>();

    let mut report = PurgeReport::default();
    let mut children = Vec::new();
    let mut parents = Vec::new();
    for name in names {
        let Some(page) = find_page_by_title(api, &name, None)
            .with_context(|| format!("failed to look up category {name}"))?
        else {
            info!("category {name} has no remote page");
            report.categories_missing.push(name);
            continue;
        };
        let blocks = api
            .list_children(&page.id)
            .with_context(|| format!("failed to list pages under {name}"))?;
        children.extend(
            blocks
                .into_iter()
                .filter(|block| block.is_child_page())
                .map(|block| Target {
                    title: block.child_title.unwrap_or_default(),
                    page_id: block.id,
                }),
        );
        report.categories_found += 1;
        parents.push(Target {
            title: page.title,
            page_id: page.id,
        });
    }
    if let Some(index) = find_index_page(api)? {
        parents.push(Target {
            title: index.title,
            page_id: index.id,
        });
    }

    info!(
        "archiving {} page(s) and {} parent page(s)",
        children.len(),
        parents.len()
    );
    for phase in [children, parents] {
        for page in archive_in_batches(api, &phase, options) {
            if page.error.is_some() {
                report.failed += 1;
            } else {
                report.archived += 1;
            }
            report.pages.push(page);
        }
    }
    Ok(report)
}

fn archive_in_batches(
    api: &dyn NotionApi,
    targets: &[Target],
    options: &PurgeOptions,
) -> Vec<ArchivedPage> {
    let batches = targets.chunks(options.batch_size.max(1)).collect::<Vec<_>>();
    let mut out = Vec::with_capacity(targets.len());
    for (index, batch) in batches.iter().enumerate() {
        let results = thread::scope(|scope| {
            let handles = batch
                .iter()
                .map(|target| (target, scope.spawn(move || api.archive_page(&target.page_id))))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|(target, handle)| {
                    let error = match handle.join() {
                        Ok(Ok(())) => None,
                        Ok(Err(error)) => Some(format!("{error:#}")),
                        Err(_) => Some("worker panicked".to_string()),
                    };
                    match &error {
                        Some(error) => warn!("could not archive {}: {error}", target.title),
                        None => info!("archived {}", target.title),
                    }
                    ArchivedPage {
                        title: target.title.clone(),
                        page_id: target.page_id.clone(),
                        error,
                    }
                })
                .collect::<Vec<_>>()
        });
        out.extend(results);
        if index + 1 < batches.len() && !options.batch_delay.is_zero() {
            thread::sleep(options.batch_delay);
        }
    }
    out
}
