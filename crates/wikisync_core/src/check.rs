use anyhow::{Context, Result};
use serde::Serialize;

use crate::notion::{NotionApi, RemotePage, RemoteUser};

#[derive(Debug, Clone, Serialize)]
pub struct ConnectionReport {
    pub users: usize,
    pub bot: RemoteUser,
    pub visible_pages: Vec<RemotePage>,
    pub request_count: usize,
}

/// Verify the token by listing users, searching for shared pages, and
/// reading the integration's own user.
pub fn check_connection(api: &dyn NotionApi, limit: usize) -> Result<ConnectionReport> {
    let users = api.list_users().context("failed to list workspace users")?;
    let visible_pages = api
        .search_pages(None, limit.max(1))
        .context("failed to search shared pages")?;
    let bot = api.me().context("failed to read the integration user")?;
    Ok(ConnectionReport {
        users: users.len(),
        bot,
        visible_pages,
        request_count: api.request_count(),
    })
}
