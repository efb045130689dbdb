use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::info;
use serde::Serialize;

use crate::blocks::RemoteBlock;
use crate::category::{CategoryMap, category_icon};
use crate::notion::{
    MAX_BLOCKS_PER_CALL, NewPage, NotionApi, RemotePage, TITLE_SEARCH_LIMIT, append_in_batches,
    replace_children,
};

pub const INDEX_TITLE: &str = "Wiki Index";
pub const INDEX_ICON: &str = "📖";
const INDEX_HEADING: &str = "Development Wiki";
const INDEX_DESCRIPTION: &str =
    "📚 Comprehensive documentation for modern development practices and technologies.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexReport {
    pub page_id: String,
    pub created: bool,
    pub categories: usize,
    pub undeleted_blocks: usize,
}

/// Blocks of the index page: heading, description, divider, then one link
/// per category page ordered by name.
pub fn index_blocks(categories: &CategoryMap) -> Vec<RemoteBlock> {
    let mut blocks = vec![
        RemoteBlock::Heading {
            level: 1,
            text: INDEX_HEADING.to_string(),
        },
        RemoteBlock::Paragraph {
            text: INDEX_DESCRIPTION.to_string(),
        },
        RemoteBlock::Divider,
        RemoteBlock::Heading {
            level: 2,
            text: "Categories".to_string(),
        },
    ];
    let mut seen = BTreeSet::new();
    let mut entries = categories.values().collect::<Vec<_>>();
    entries.sort_by(|left, right| left.name.cmp(&right.name));
    for category in entries {
        if !seen.insert(category.page_id.as_str()) {
            continue;
        }
        blocks.push(RemoteBlock::PageLink {
            emoji: category_icon(&category.name).to_string(),
            page_id: category.page_id.clone(),
        });
    }
    blocks
}

/// Find the page titled exactly `Wiki Index`.
pub fn find_index_page(api: &dyn NotionApi) -> Result<Option<RemotePage>> {
    let results = api
        .search_pages(Some(INDEX_TITLE), TITLE_SEARCH_LIMIT)
        .context("failed to search for the index page")?;
    Ok(results.into_iter().find(|page| page.title == INDEX_TITLE))
}

/// Replace the content of the index page, or create it under the root.
pub fn publish_index(
    api: &dyn NotionApi,
    categories: &CategoryMap,
    root_page_id: &str,
) -> Result<IndexReport> {
    let blocks = index_blocks(categories);
    let category_count = blocks.len() - 4;

    if let Some(existing) = find_index_page(api)? {
        let outcome = replace_children(api, &existing.id, &blocks, MAX_BLOCKS_PER_CALL)
            .context("failed to refresh the index page")?;
        info!("updated {INDEX_TITLE} ({category_count} categories)");
        return Ok(IndexReport {
            page_id: existing.id,
            created: false,
            categories: category_count,
            undeleted_blocks: outcome.undeleted,
        });
    }

    let (first, rest) = blocks.split_at(blocks.len().min(MAX_BLOCKS_PER_CALL));
    let page = api
        .create_page(&NewPage {
            parent_id: root_page_id,
            title: INDEX_TITLE,
            icon: INDEX_ICON,
            children: first,
        })
        .context("failed to create the index page")?;
    append_in_batches(api, &page.id, rest, MAX_BLOCKS_PER_CALL)?;
    info!("created {INDEX_TITLE} ({category_count} categories)");
    Ok(IndexReport {
        page_id: page.id,
        created: true,
        categories: category_count,
        undeleted_blocks: 0,
    })
}
