use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use log::{info, warn};
use serde::Serialize;

use crate::blocks::RemoteBlock;
use crate::error::SyncError;
use crate::notion::{NewPage, NotionApi, find_page_by_title};
use crate::scan::format_category_name;

pub const DEFAULT_CATEGORY_ICON: &str = "📄";

const CATEGORY_ICONS: [(&str, &str); 17] = [
    ("backend", "⚙️"),
    ("frontend", "🎨"),
    ("database", "💾"),
    ("devops", "🚀"),
    ("docker", "🐳"),
    ("kubernetes", "☸️"),
    ("nodejs", "💚"),
    ("python", "🐍"),
    ("dotnet", "💎"),
    ("go", "🔷"),
    ("microservices", "🔧"),
    ("architecture", "🏗️"),
    ("patterns", "🎯"),
    ("authentication", "🔐"),
    ("caching", "⚡"),
    ("api", "🔌"),
    ("graphql", "📊"),
];

/// Icon for a category name; the lookup ignores case and whitespace.
pub fn category_icon(name: &str) -> &'static str {
    let key = name
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect::<String>();
    CATEGORY_ICONS
        .iter()
        .find(|(category, _)| *category == key)
        .map(|(_, icon)| *icon)
        .unwrap_or(DEFAULT_CATEGORY_ICON)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedCategory {
    pub name: String,
    pub page_id: String,
    pub created: bool,
}

/// Category key to its remote parent page. Built once per run.
pub type CategoryMap = BTreeMap<String, ResolvedCategory>;

pub struct CategoryResolver<'a> {
    api: &'a dyn NotionApi,
    root_page_id: &'a str,
}

impl<'a> CategoryResolver<'a> {
    pub fn new(api: &'a dyn NotionApi, root_page_id: &'a str) -> Self {
        Self { api, root_page_id }
    }

    /// Reuse a page whose title matches `name` ignoring case, or create one
    /// under the root.
    pub fn resolve(&self, name: &str) -> Result<ResolvedCategory, SyncError> {
        let failure = |error: anyhow::Error| SyncError::CategoryResolution {
            category: name.to_string(),
            message: format!("{error:#}"),
        };

        if let Some(existing) = find_page_by_title(self.api, name, None).map_err(failure)? {
            info!("reusing category page {name} ({})", existing.id);
            return Ok(ResolvedCategory {
                name: name.to_string(),
                page_id: existing.id,
                created: false,
            });
        }

        let description = [RemoteBlock::Paragraph {
            text: format!("📚 {name} documentation and learning resources"),
        }];
        let page = self
            .api
            .create_page(&NewPage {
                parent_id: self.root_page_id,
                title: name,
                icon: category_icon(name),
                children: &description,
            })
            .map_err(failure)?;
        info!("created category page {name} ({})", page.id);
        Ok(ResolvedCategory {
            name: name.to_string(),
            page_id: page.id,
            created: true,
        })
    }

    /// Resolve every distinct key in batches of `batch_size`, one thread per
    /// key, sleeping `delay` between batches. The first failure aborts.
    pub fn resolve_all<I, S>(
        &self,
        keys: I,
        batch_size: usize,
        delay: Duration,
    ) -> Result<CategoryMap, SyncError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut names = BTreeMap::new();
        for key in keys {
            let key = key.as_ref();
            names
                .entry(key.to_string())
                .or_insert_with(|| format_category_name(key));
        }
        // Keys that format to the same title share one page.
        let mut distinct = names.values().cloned().collect::<Vec<_>>();
        distinct.sort_by_key(|name| name.to_lowercase());
        distinct.dedup_by(|left, right| left.to_lowercase() == right.to_lowercase());

        let mut by_name: BTreeMap<String, ResolvedCategory> = BTreeMap::new();
        let batches = distinct.chunks(batch_size.max(1)).collect::<Vec<_>>();
        for (index, batch) in batches.iter().enumerate() {
            let results = thread::scope(|scope| {
                let handles = batch
                    .iter()
                    .map(|name| (name, scope.spawn(move || self.resolve(name))))
                    .collect::<Vec<_>>();
                handles
                    .into_iter()
                    .map(|(name, handle)| {
                        handle.join().unwrap_or_else(|_| {
                            Err(SyncError::CategoryResolution {
                                category: name.clone(),
                                message: "worker panicked".to_string(),
                            })
                        })
                    })
                    .collect::<Vec<_>>()
            });
            for result in results {
                let resolved = result?;
                by_name.insert(resolved.name.to_lowercase(), resolved);
            }
            if index + 1 < batches.len() && !delay.is_zero() {
                thread::sleep(delay);
            }
        }

        let mut map = CategoryMap::new();
        for (key, name) in names {
            match by_name.get(&name.to_lowercase()) {
                Some(resolved) => {
                    map.insert(key, resolved.clone());
                }
                None => {
                    warn!("category {key} was not resolved");
                    return Err(SyncError::CategoryResolution {
                        category: name,
                        message: "no page resolved".to_string(),
                    });
                }
            }
        }
        Ok(map)
    }
}
