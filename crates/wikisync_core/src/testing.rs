//! In-memory `NotionApi` used by unit tests across the crate.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{Result, bail};

use crate::blocks::RemoteBlock;
use crate::notion::{NewPage, NotionApi, RemoteBlockRef, RemotePage, RemoteUser};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockPage {
    pub id: String,
    pub title: String,
    pub parent_id: Option<String>,
    pub icon: String,
    pub archived: bool,
}

#[derive(Debug, Clone)]
enum MockContent {
    Block(RemoteBlock),
    ChildPage(String),
}

#[derive(Debug, Clone)]
struct MockBlock {
    id: String,
    content: MockContent,
}

#[derive(Debug, Default)]
struct MockState {
    pages: Vec<MockPage>,
    children: BTreeMap<String, Vec<MockBlock>>,
    next_id: usize,
    calls: Vec<String>,
    undeletable: BTreeSet<String>,
    failing_creates: BTreeSet<String>,
    failing_appends: BTreeSet<String>,
    panicking_creates: BTreeSet<String>,
    append_sizes: BTreeMap<String, Vec<usize>>,
    created_at: Vec<(String, Instant)>,
}

impl MockState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{:04}", self.next_id)
    }

    fn insert_page(&mut self, title: &str, parent_id: Option<&str>, icon: &str) -> String {
        let id = self.next_id("page");
        self.pages.push(MockPage {
            id: id.clone(),
            title: title.to_string(),
            parent_id: parent_id.map(str::to_string),
            icon: icon.to_string(),
            archived: false,
        });
        self.children.insert(id.clone(), Vec::new());
        if let Some(parent) = parent_id {
            self.children
                .entry(parent.to_string())
                .or_default()
                .push(MockBlock {
                    id: id.clone(),
                    content: MockContent::ChildPage(title.to_string()),
                });
        }
        id
    }

    fn push_blocks(&mut self, page_id: &str, blocks: &[RemoteBlock]) {
        let mut created = Vec::with_capacity(blocks.len());
        for block in blocks {
            created.push(MockBlock {
                id: self.next_id("block"),
                content: MockContent::Block(block.clone()),
            });
        }
        self.children
            .entry(page_id.to_string())
            .or_default()
            .extend(created);
    }

    fn live_page(&self, id: &str) -> Option<&MockPage> {
        self.pages.iter().find(|page| page.id == id && !page.archived)
    }

    fn to_remote(page: &MockPage) -> RemotePage {
        RemotePage {
            id: page.id.clone(),
            url: format!("https://notion.test/{}", page.id),
            title: page.title.clone(),
            parent_id: page.parent_id.clone(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MockNotion {
    state: Mutex<MockState>,
    requests: AtomicUsize,
}

impl MockNotion {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: String) -> MutexGuard<'_, MockState> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.calls.push(call);
        state
    }

    /// Insert a page without counting a request.
    pub fn seed_page(&self, title: &str, parent_id: Option<&str>) -> String {
        self.lock().insert_page(title, parent_id, "")
    }

    pub fn fail_create(&self, title: &str) {
        self.lock().failing_creates.insert(title.to_string());
    }

    pub fn fail_appends_to(&self, title: &str) {
        self.lock().failing_appends.insert(title.to_string());
    }

    pub fn panic_on_create(&self, title: &str) {
        self.lock().panicking_creates.insert(title.to_string());
    }

    /// Make the content block at `index` of `page_id` refuse deletion.
    pub fn mark_undeletable(&self, page_id: &str, index: usize) {
        let mut state = self.lock();
        let id = state
            .children
            .get(page_id)
            .and_then(|blocks| blocks.get(index))
            .map(|block| block.id.clone());
        if let Some(id) = id {
            state.undeletable.insert(id);
        }
    }

    pub fn page(&self, id: &str) -> Option<MockPage> {
        self.lock().pages.iter().find(|page| page.id == id).cloned()
    }

    /// Live pages with this exact title.
    pub fn pages_titled(&self, title: &str) -> Vec<MockPage> {
        self.lock()
            .pages
            .iter()
            .filter(|page| page.title == title && !page.archived)
            .cloned()
            .collect()
    }

    pub fn live_page_count(&self) -> usize {
        self.lock().pages.iter().filter(|page| !page.archived).count()
    }

    /// Content blocks of a page, without sub-page entries.
    pub fn blocks_of(&self, page_id: &str) -> Vec<RemoteBlock> {
        self.lock()
            .children
            .get(page_id)
            .map(|blocks| {
                blocks
                    .iter()
                    .filter_map(|block| match &block.content {
                        MockContent::Block(block) => Some(block.clone()),
                        MockContent::ChildPage(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn append_sizes(&self, page_id: &str) -> Vec<usize> {
        self.lock()
            .append_sizes
            .get(page_id)
            .cloned()
            .unwrap_or_default()
    }

    /// Titles of successfully created pages with the moment each landed.
    pub fn creation_times(&self) -> Vec<(String, Instant)> {
        self.lock().created_at.clone()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    /// Calls that change remote state.
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| {
                ["create:", "archive:", "append:", "delete:"]
                    .iter()
                    .any(|prefix| call.starts_with(prefix))
            })
            .collect()
    }
}

impl NotionApi for MockNotion {
    fn search_pages(&self, query: Option<&str>, limit: usize) -> Result<Vec<RemotePage>> {
        let state = self.record(format!("search:{}", query.unwrap_or("")));
        let needle = query.map(str::to_lowercase);
        Ok(state
            .pages
            .iter()
            .filter(|page| !page.archived)
            .filter(|page| match &needle {
                Some(needle) => page.title.to_lowercase().contains(needle.as_str()),
                None => true,
            })
            .take(limit)
            .map(MockState::to_remote)
            .collect())
    }

    fn create_page(&self, page: &NewPage<'_>) -> Result<RemotePage> {
        let mut state = self.record(format!("create:{}", page.title));
        if state.panicking_creates.contains(page.title) {
            drop(state);
            panic!("mock panic while creating {}", page.title);
        }
        if state.failing_creates.contains(page.title) {
            bail!("Notion API error [validation_error] (HTTP 400 Bad Request): rejected");
        }
        if state.live_page(page.parent_id).is_none() {
            bail!("Notion API error [object_not_found] (HTTP 404 Not Found): parent");
        }
        let id = state.insert_page(page.title, Some(page.parent_id), page.icon);
        state.push_blocks(&id, page.children);
        state.created_at.push((page.title.to_string(), Instant::now()));
        let created = state
            .live_page(&id)
            .map(MockState::to_remote)
            .ok_or_else(|| anyhow::anyhow!("created page vanished"))?;
        Ok(created)
    }

    fn archive_page(&self, page_id: &str) -> Result<()> {
        let mut state = self.record(format!("archive:{page_id}"));
        let Some(page) = state
            .pages
            .iter_mut()
            .find(|page| page.id == page_id && !page.archived)
        else {
            bail!("Notion API error [object_not_found] (HTTP 404 Not Found): {page_id}");
        };
        page.archived = true;
        let parent = page.parent_id.clone();
        if let Some(parent) = parent
            && let Some(siblings) = state.children.get_mut(&parent)
        {
            siblings.retain(|block| block.id != page_id);
        }
        Ok(())
    }

    fn list_children(&self, block_id: &str) -> Result<Vec<RemoteBlockRef>> {
        let state = self.record(format!("list:{block_id}"));
        let Some(blocks) = state.children.get(block_id) else {
            bail!("Notion API error [object_not_found] (HTTP 404 Not Found): {block_id}");
        };
        Ok(blocks
            .iter()
            .map(|block| match &block.content {
                MockContent::Block(content) => RemoteBlockRef {
                    id: block.id.clone(),
                    kind: content.kind().to_string(),
                    child_title: None,
                },
                MockContent::ChildPage(title) => RemoteBlockRef {
                    id: block.id.clone(),
                    kind: "child_page".to_string(),
                    child_title: Some(title.clone()),
                },
            })
            .collect())
    }

    fn append_children(&self, block_id: &str, blocks: &[RemoteBlock]) -> Result<()> {
        let mut state = self.record(format!("append:{block_id}:{}", blocks.len()));
        let Some(page) = state.live_page(block_id) else {
            bail!("Notion API error [object_not_found] (HTTP 404 Not Found): {block_id}");
        };
        if state.failing_appends.contains(&page.title) {
            bail!("Notion API error [rate_limited] (HTTP 429 Too Many Requests): slow down");
        }
        state
            .append_sizes
            .entry(block_id.to_string())
            .or_default()
            .push(blocks.len());
        state.push_blocks(block_id, blocks);
        Ok(())
    }

    fn delete_block(&self, block_id: &str) -> Result<()> {
        let mut state = self.record(format!("delete:{block_id}"));
        if state.undeletable.contains(block_id) {
            bail!("Notion API error [validation_error] (HTTP 400 Bad Request): cannot delete");
        }
        for blocks in state.children.values_mut() {
            if let Some(position) = blocks.iter().position(|block| block.id == block_id) {
                blocks.remove(position);
                return Ok(());
            }
        }
        bail!("Notion API error [object_not_found] (HTTP 404 Not Found): {block_id}")
    }

    fn list_users(&self) -> Result<Vec<RemoteUser>> {
        let _state = self.record("users".to_string());
        Ok(vec![
            RemoteUser {
                id: "user-1".to_string(),
                name: Some("Writer".to_string()),
                kind: "person".to_string(),
            },
            RemoteUser {
                id: "bot-1".to_string(),
                name: Some("Wiki Sync".to_string()),
                kind: "bot".to_string(),
            },
        ])
    }

    fn me(&self) -> Result<RemoteUser> {
        let _state = self.record("users/me".to_string());
        Ok(RemoteUser {
            id: "bot-1".to_string(),
            name: Some("Wiki Sync".to_string()),
            kind: "bot".to_string(),
        })
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}
