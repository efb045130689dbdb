use log::{debug, info};
use serde::Serialize;

use crate::blocks::RemoteBlock;
use crate::config::SyncMode;
use crate::deferred::DeferredAppend;
use crate::error::SyncError;
use crate::notion::{
    FAST_MODE_MAX_BLOCKS, MAX_BLOCKS_PER_CALL, NewPage, NotionApi, append_in_batches,
    find_child_page, replace_children,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertMode {
    /// Replace the content of existing pages.
    Full,
    /// Leave existing pages untouched.
    CreateOnly,
}

impl UpsertMode {
    pub fn for_sync_mode(mode: SyncMode) -> Option<Self> {
        match mode {
            SyncMode::Full => Some(Self::Full),
            SyncMode::Fast => Some(Self::CreateOnly),
            SyncMode::Purge => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created,
    Updated,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpsertReport {
    pub outcome: UpsertOutcome,
    pub page_id: String,
    /// Blocks written before `upsert` returned.
    pub written_blocks: usize,
    /// Blocks handed to the background appender.
    pub deferred_blocks: usize,
    /// Blocks beyond the create-only ceiling that were never sent.
    pub dropped_blocks: usize,
    pub undeleted_blocks: usize,
    #[serde(skip)]
    pub deferred: Option<DeferredAppend>,
}

pub struct Reconciler<'a> {
    api: &'a dyn NotionApi,
    mode: UpsertMode,
}

impl<'a> Reconciler<'a> {
    pub fn new(api: &'a dyn NotionApi, mode: UpsertMode) -> Self {
        Self { api, mode }
    }

    /// Make the page titled `title` under `parent_id` hold `blocks`.
    pub fn upsert(
        &self,
        title: &str,
        blocks: &[RemoteBlock],
        parent_id: &str,
        icon: &str,
    ) -> Result<UpsertReport, SyncError> {
        let remote = |error: anyhow::Error| SyncError::remote(title, &error);
        let existing = find_child_page(self.api, title, parent_id).map_err(remote)?;

        match (existing, self.mode) {
            (Some(page), UpsertMode::CreateOnly) => {
                debug!("skipping existing page {title} ({})", page.id);
                Ok(UpsertReport {
                    outcome: UpsertOutcome::Skipped,
                    page_id: page.id,
                    written_blocks: 0,
                    deferred_blocks: 0,
                    dropped_blocks: 0,
                    undeleted_blocks: 0,
                    deferred: None,
                })
            }
            (Some(page), UpsertMode::Full) => {
                let outcome = replace_children(self.api, &page.id, blocks, MAX_BLOCKS_PER_CALL)
                    .map_err(remote)?;
                info!("updated {title} ({} blocks)", outcome.appended);
                Ok(UpsertReport {
                    outcome: UpsertOutcome::Updated,
                    page_id: page.id,
                    written_blocks: outcome.appended,
                    deferred_blocks: 0,
                    dropped_blocks: 0,
                    undeleted_blocks: outcome.undeleted,
                    deferred: None,
                })
            }
            (None, UpsertMode::Full) => {
                let (first, rest) = blocks.split_at(blocks.len().min(MAX_BLOCKS_PER_CALL));
                let page = self.create(title, first, parent_id, icon).map_err(remote)?;
                let appended =
                    append_in_batches(self.api, &page, rest, MAX_BLOCKS_PER_CALL).map_err(remote)?;
                info!("created {title} ({} blocks)", first.len() + appended);
                Ok(UpsertReport {
                    outcome: UpsertOutcome::Created,
                    page_id: page,
                    written_blocks: first.len() + appended,
                    deferred_blocks: 0,
                    dropped_blocks: 0,
                    undeleted_blocks: 0,
                    deferred: None,
                })
            }
            (None, UpsertMode::CreateOnly) => {
                let kept = blocks.len().min(FAST_MODE_MAX_BLOCKS);
                let (first, overflow) = blocks[..kept].split_at(kept.min(MAX_BLOCKS_PER_CALL));
                let dropped = blocks.len() - kept;
                let page = self.create(title, first, parent_id, icon).map_err(remote)?;
                if dropped > 0 {
                    info!("created {title}; {dropped} blocks over the page ceiling were dropped");
                } else {
                    info!("created {title}");
                }
                let deferred = (!overflow.is_empty()).then(|| DeferredAppend {
                    title: title.to_string(),
                    page_id: page.clone(),
                    blocks: overflow.to_vec(),
                });
                Ok(UpsertReport {
                    outcome: UpsertOutcome::Created,
                    page_id: page,
                    written_blocks: first.len(),
                    deferred_blocks: overflow.len(),
                    dropped_blocks: dropped,
                    undeleted_blocks: 0,
                    deferred,
                })
            }
        }
    }

    fn create(
        &self,
        title: &str,
        children: &[RemoteBlock],
        parent_id: &str,
        icon: &str,
    ) -> anyhow::Result<String> {
        let page = self.api.create_page(&NewPage {
            parent_id,
            title,
            icon,
            children,
        })?;
        Ok(page.id)
    }
}
