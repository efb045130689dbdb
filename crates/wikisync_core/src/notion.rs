use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::debug;
use reqwest::blocking::Client;
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::blocks::{RemoteBlock, blocks_to_json};
use crate::config::ResolvedSettings;
use crate::error::SyncError;

pub const DEFAULT_API_URL: &str = "https://api.notion.com/v1";
pub const DEFAULT_NOTION_VERSION: &str = "2022-06-28";
/// Children accepted by a single create or append call.
pub const MAX_BLOCKS_PER_CALL: usize = 100;
/// Blocks kept per page in create-only mode.
pub const FAST_MODE_MAX_BLOCKS: usize = 200;
const SEARCH_PAGE_SIZE: usize = 100;
/// Search hits scanned by a title lookup. Short titles match many pages by
/// substring, so this spans several result pages.
pub const TITLE_SEARCH_LIMIT: usize = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemotePage {
    pub id: String,
    pub url: String,
    pub title: String,
    pub parent_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteBlockRef {
    pub id: String,
    pub kind: String,
    /// Title of the sub-page when `kind` is `child_page`.
    pub child_title: Option<String>,
}

impl RemoteBlockRef {
    pub fn is_child_page(&self) -> bool {
        self.kind == "child_page"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RemoteUser {
    pub id: String,
    pub name: Option<String>,
    pub kind: String,
}

#[derive(Debug, Clone, Copy)]
pub struct NewPage<'a> {
    pub parent_id: &'a str,
    pub title: &'a str,
    pub icon: &'a str,
    pub children: &'a [RemoteBlock],
}

/// Remote document store operations. Implementations must tolerate calls
/// from several worker threads at once.
pub trait NotionApi: Send + Sync {
    /// Up to `limit` pages matching `query`, most relevant first, following
    /// pagination as needed.
    fn search_pages(&self, query: Option<&str>, limit: usize) -> Result<Vec<RemotePage>>;
    fn create_page(&self, page: &NewPage<'_>) -> Result<RemotePage>;
    fn archive_page(&self, page_id: &str) -> Result<()>;
    /// Every direct child block, following pagination.
    fn list_children(&self, block_id: &str) -> Result<Vec<RemoteBlockRef>>;
    fn append_children(&self, block_id: &str, blocks: &[RemoteBlock]) -> Result<()>;
    fn delete_block(&self, block_id: &str) -> Result<()>;
    fn list_users(&self) -> Result<Vec<RemoteUser>>;
    fn me(&self) -> Result<RemoteUser>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct NotionClientConfig {
    pub api_url: String,
    pub api_key: String,
    pub notion_version: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl NotionClientConfig {
    pub fn from_settings(settings: &ResolvedSettings) -> Result<Self> {
        Ok(Self {
            api_url: settings.api_url.clone(),
            api_key: settings.require_api_key()?.to_string(),
            notion_version: settings.notion_version.clone(),
            user_agent: settings.user_agent.clone(),
            timeout_ms: settings.timeout_ms,
        })
    }
}

pub struct NotionClient {
    client: Client,
    config: NotionClientConfig,
    base_url: Url,
    request_count: AtomicUsize,
}

impl NotionClient {
    pub fn new(config: NotionClientConfig) -> Result<Self> {
        let base_url = Url::parse(&format!("{}/", config.api_url.trim_end_matches('/')))
            .with_context(|| format!("invalid NOTION_API_URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build Notion HTTP client")?;
        Ok(Self {
            client,
            config,
            base_url,
            request_count: AtomicUsize::new(0),
        })
    }

    fn request_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value> {
        let url = self
            .base_url
            .join(path)
            .with_context(|| format!("invalid Notion API path: {path}"))?;
        self.request_count.fetch_add(1, Ordering::Relaxed);
        debug!("{method} {path}");

        let mut request = self
            .client
            .request(method.clone(), url)
            .bearer_auth(&self.config.api_key)
            .header("Notion-Version", &self.config.notion_version)
            .header("User-Agent", &self.config.user_agent);
        if !query.is_empty() {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request
            .send()
            .with_context(|| format!("failed to call Notion API {method} {path}"))?;
        let status = response.status();
        let text = response
            .text()
            .with_context(|| format!("failed to read Notion API response for {path}"))?;
        if !status.is_success() {
            let error: ErrorResponse = serde_json::from_str(&text).unwrap_or_default();
            bail!(
                "Notion API error [{}] (HTTP {status}): {}",
                error.code.as_deref().unwrap_or("unknown_error"),
                error.message.as_deref().unwrap_or("no message"),
            );
        }
        serde_json::from_str(&text)
            .with_context(|| format!("failed to decode Notion API response for {path}"))
    }
}

impl NotionApi for NotionClient {
    fn search_pages(&self, query: Option<&str>, limit: usize) -> Result<Vec<RemotePage>> {
        let limit = limit.max(1);
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        while out.len() < limit {
            let mut body = json!({
                "filter": {"property": "object", "value": "page"},
                "page_size": (limit - out.len()).min(SEARCH_PAGE_SIZE),
            });
            if let Some(query) = query {
                body["query"] = Value::String(query.to_string());
            }
            if let Some(cursor) = &cursor {
                body["start_cursor"] = Value::String(cursor.clone());
            }
            let payload = self.request_json(Method::POST, "search", &[], Some(&body))?;
            let parsed: ListResponse<PageObject> =
                serde_json::from_value(payload).context("failed to decode search response")?;
            out.extend(parsed.results.into_iter().map(PageObject::into_remote));
            match parsed.next_cursor {
                Some(next) if parsed.has_more => cursor = Some(next),
                _ => break,
            }
        }
        out.truncate(limit);
        Ok(out)
    }

    fn create_page(&self, page: &NewPage<'_>) -> Result<RemotePage> {
        let body = json!({
            "parent": {"page_id": page.parent_id},
            "icon": {"type": "emoji", "emoji": page.icon},
            "properties": {
                "title": {"title": [{"type": "text", "text": {"content": page.title}}]}
            },
            "children": blocks_to_json(page.children),
        });
        let payload = self.request_json(Method::POST, "pages", &[], Some(&body))?;
        let parsed: PageObject =
            serde_json::from_value(payload).context("failed to decode created page")?;
        Ok(parsed.into_remote())
    }

    fn archive_page(&self, page_id: &str) -> Result<()> {
        let body = json!({"archived": true});
        self.request_json(
            Method::PATCH,
            &format!("pages/{page_id}"),
            &[],
            Some(&body),
        )?;
        Ok(())
    }

    fn list_children(&self, block_id: &str) -> Result<Vec<RemoteBlockRef>> {
        let path = format!("blocks/{block_id}/children");
        let mut out = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![("page_size", SEARCH_PAGE_SIZE.to_string())];
            if let Some(cursor) = &cursor {
                query.push(("start_cursor", cursor.clone()));
            }
            let payload = self.request_json(Method::GET, &path, &query, None)?;
            let parsed: ListResponse<BlockObject> =
                serde_json::from_value(payload).context("failed to decode block children")?;
            out.extend(parsed.results.into_iter().map(|block| RemoteBlockRef {
                id: block.id,
                child_title: block.child_page.map(|page| page.title),
                kind: block.kind,
            }));
            match parsed.next_cursor {
                Some(next) if parsed.has_more => cursor = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    fn append_children(&self, block_id: &str, blocks: &[RemoteBlock]) -> Result<()> {
        if blocks.len() > MAX_BLOCKS_PER_CALL {
            bail!(
                "cannot append {} blocks in one call (limit {MAX_BLOCKS_PER_CALL})",
                blocks.len()
            );
        }
        let body = json!({"children": blocks_to_json(blocks)});
        self.request_json(
            Method::PATCH,
            &format!("blocks/{block_id}/children"),
            &[],
            Some(&body),
        )?;
        Ok(())
    }

    fn delete_block(&self, block_id: &str) -> Result<()> {
        self.request_json(Method::DELETE, &format!("blocks/{block_id}"), &[], None)?;
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<RemoteUser>> {
        let payload = self.request_json(Method::GET, "users", &[], None)?;
        let parsed: ListResponse<UserObject> =
            serde_json::from_value(payload).context("failed to decode users")?;
        Ok(parsed.results.into_iter().map(UserObject::into_remote).collect())
    }

    fn me(&self) -> Result<RemoteUser> {
        let payload = self.request_json(Method::GET, "users/me", &[], None)?;
        let parsed: UserObject =
            serde_json::from_value(payload).context("failed to decode bot user")?;
        Ok(parsed.into_remote())
    }

    fn request_count(&self) -> usize {
        self.request_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    results: Vec<T>,
    #[serde(default)]
    has_more: bool,
    #[serde(default)]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageObject {
    id: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    parent: Option<ParentObject>,
    #[serde(default)]
    properties: BTreeMap<String, PropertyObject>,
}

impl PageObject {
    fn into_remote(self) -> RemotePage {
        let title = self
            .properties
            .values()
            .find_map(|property| property.title.as_ref())
            .map(|runs| {
                runs.iter()
                    .map(|run| run.plain_text.as_str())
                    .collect::<String>()
            })
            .unwrap_or_default();
        RemotePage {
            id: self.id,
            url: self.url,
            title,
            parent_id: self.parent.and_then(|parent| parent.page_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ParentObject {
    #[serde(default)]
    page_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PropertyObject {
    #[serde(default)]
    title: Option<Vec<RichTextObject>>,
}

#[derive(Debug, Deserialize)]
struct RichTextObject {
    #[serde(default)]
    plain_text: String,
}

#[derive(Debug, Deserialize)]
struct BlockObject {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    child_page: Option<ChildPageObject>,
}

#[derive(Debug, Deserialize)]
struct ChildPageObject {
    title: String,
}

#[derive(Debug, Deserialize)]
struct UserObject {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

impl UserObject {
    fn into_remote(self) -> RemoteUser {
        RemoteUser {
            id: self.id,
            name: self.name,
            kind: self.kind.unwrap_or_else(|| "unknown".to_string()),
        }
    }
}

/// Store ids are compared without dashes and case-insensitively.
pub fn same_id(left: &str, right: &str) -> bool {
    let normalize = |id: &str| {
        id.chars()
            .filter(|ch| *ch != '-')
            .flat_map(char::to_lowercase)
            .collect::<String>()
    };
    normalize(left) == normalize(right)
}

/// Find a page by title. With a parent, only a direct child of that parent
/// matches and the comparison is exact; without one, any page matches and
/// the comparison ignores case. Only the first `TITLE_SEARCH_LIMIT` search
/// hits are examined.
pub fn find_page_by_title(
    api: &dyn NotionApi,
    title: &str,
    parent_id: Option<&str>,
) -> Result<Option<RemotePage>> {
    let results = api.search_pages(Some(title), TITLE_SEARCH_LIMIT)?;
    let found = results.into_iter().find(|page| match parent_id {
        Some(parent) => {
            page.title == title
                && page
                    .parent_id
                    .as_deref()
                    .is_some_and(|page_parent| same_id(page_parent, parent))
        }
        None => page.title.to_lowercase() == title.to_lowercase(),
    });
    Ok(found)
}

pub fn find_child_page(
    api: &dyn NotionApi,
    title: &str,
    parent_id: &str,
) -> Result<Option<RemotePage>> {
    find_page_by_title(api, title, Some(parent_id))
}

/// Use the configured root page, or the first page shared with the
/// integration.
pub fn discover_root_page(
    api: &dyn NotionApi,
    configured: Option<&str>,
) -> Result<String, SyncError> {
    if let Some(id) = configured.map(str::trim).filter(|id| !id.is_empty()) {
        return Ok(id.to_string());
    }
    let pages = api
        .search_pages(None, 1)
        .map_err(|error| SyncError::RootDiscovery(format!("{error:#}")))?;
    pages.into_iter().next().map(|page| page.id).ok_or_else(|| {
        SyncError::RootDiscovery(
            "no accessible pages found; share a page with the integration first".to_string(),
        )
    })
}

/// Append blocks in calls of at most `ceiling` children. Returns the number
/// of blocks appended.
pub fn append_in_batches(
    api: &dyn NotionApi,
    block_id: &str,
    blocks: &[RemoteBlock],
    ceiling: usize,
) -> Result<usize> {
    let ceiling = ceiling.clamp(1, MAX_BLOCKS_PER_CALL);
    let mut appended = 0;
    for chunk in blocks.chunks(ceiling) {
        api.append_children(block_id, chunk)
            .with_context(|| format!("failed to append blocks {appended}.. to {block_id}"))?;
        appended += chunk.len();
    }
    Ok(appended)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReplaceOutcome {
    pub deleted: usize,
    /// Blocks the store refused to delete; they stay above the new content.
    pub undeleted: usize,
    pub appended: usize,
}

/// Clear a page's content blocks (best effort) and append `blocks`.
/// Sub-page blocks are never touched.
pub fn replace_children(
    api: &dyn NotionApi,
    page_id: &str,
    blocks: &[RemoteBlock],
    ceiling: usize,
) -> Result<ReplaceOutcome> {
    let existing = api
        .list_children(page_id)
        .with_context(|| format!("failed to list children of {page_id}"))?;
    let mut outcome = ReplaceOutcome::default();
    for block in existing.iter().filter(|block| !block.is_child_page()) {
        match api.delete_block(&block.id) {
            Ok(()) => outcome.deleted += 1,
            Err(error) => {
                debug!("could not delete block {}: {error:#}", block.id);
                outcome.undeleted += 1;
            }
        }
    }
    outcome.appended = append_in_batches(api, page_id, blocks, ceiling)?;
    Ok(outcome)
}
