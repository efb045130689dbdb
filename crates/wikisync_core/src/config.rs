use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::notion::{DEFAULT_API_URL, DEFAULT_NOTION_VERSION};
use crate::parser::DEFAULT_TITLE_SUFFIX;
use crate::runtime::{DEFAULT_WIKI_DIR, ResolvedPaths, ValueSource};

pub const DEFAULT_USER_AGENT: &str = "wikisync/0.1";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSyncConfig {
    #[serde(default)]
    pub notion: NotionSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct NotionSection {
    pub api_url: Option<String>,
    pub notion_version: Option<String>,
    pub root_page_id: Option<String>,
    pub timeout_ms: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncSection {
    pub wiki_path: Option<String>,
    pub mode: Option<String>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
    pub title_suffix: Option<String>,
    pub checklist_checked: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Create missing pages and replace the content of existing ones.
    Full,
    /// Create missing pages only; existing pages are skipped.
    Fast,
    /// Archive every page the sync created.
    Purge,
}

impl SyncMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Fast => "fast",
            Self::Purge => "purge",
        }
    }

    pub fn default_batch_size(self) -> usize {
        match self {
            Self::Full => 3,
            Self::Fast | Self::Purge => 5,
        }
    }

    pub fn default_batch_delay_ms(self) -> u64 {
        match self {
            Self::Full => 1_000,
            Self::Fast => 200,
            Self::Purge => 500,
        }
    }
}

impl FromStr for SyncMode {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "fast" | "create-only" | "super-fast" => Ok(Self::Fast),
            "purge" | "delete-all" => Ok(Self::Purge),
            other => bail!("unknown sync mode `{other}` (expected full, fast, or purge)"),
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Load and parse a WikiSyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<WikiSyncConfig> {
    if !config_path.exists() {
        return Ok(WikiSyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: WikiSyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Values given on the command line; they win over env and config.
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub wiki_path: Option<PathBuf>,
    pub mode: Option<SyncMode>,
    pub batch_size: Option<usize>,
    pub batch_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedSettings {
    #[serde(skip)]
    pub api_key: Option<String>,
    pub api_url: String,
    pub notion_version: String,
    pub timeout_ms: u64,
    pub user_agent: String,
    pub root_page_id: Option<String>,
    pub wiki_path: PathBuf,
    pub mode: SyncMode,
    pub batch_size: usize,
    pub batch_delay_ms: u64,
    pub title_suffix: String,
    pub checklist_checked: bool,
    #[serde(skip)]
    pub mode_source: ValueSource,
}

impl ResolvedSettings {
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("NOTION_API_KEY is required for remote commands"))
    }

    pub fn diagnostics(&self) -> String {
        format!(
            "api_url={}\nnotion_version={}\napi_key={}\nroot_page_id={}\nwiki_path={}\nmode={} ({})\nbatch_size={}\nbatch_delay_ms={}\nchecklist_checked={}",
            self.api_url,
            self.notion_version,
            if self.api_key.is_some() { "<set>" } else { "<missing>" },
            self.root_page_id.as_deref().unwrap_or("<discover>"),
            self.wiki_path.to_string_lossy().replace('\\', "/"),
            self.mode,
            self.mode_source.as_str(),
            self.batch_size,
            self.batch_delay_ms,
            self.checklist_checked,
        )
    }
}

pub fn resolve_settings(
    paths: &ResolvedPaths,
    config: &WikiSyncConfig,
    overrides: &SettingsOverrides,
) -> Result<ResolvedSettings> {
    resolve_settings_with_lookup(paths, config, overrides, |key| env::var(key).ok())
}

/// Precedence for every key: flag > env > config > default. Batch size and
/// delay defaults depend on the resolved mode.
pub fn resolve_settings_with_lookup<F>(
    paths: &ResolvedPaths,
    config: &WikiSyncConfig,
    overrides: &SettingsOverrides,
    lookup_env: F,
) -> Result<ResolvedSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let env_value = |key: &str| {
        lookup_env(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let (mode, mode_source) = if let Some(mode) = overrides.mode {
        (mode, ValueSource::Flag)
    } else if let Some(value) = env_value("SYNC_MODE") {
        (value.parse::<SyncMode>()?, ValueSource::Env)
    } else if let Some(value) = config.sync.mode.as_deref() {
        (value.parse::<SyncMode>()?, ValueSource::Config)
    } else {
        (SyncMode::Full, ValueSource::Default)
    };

    let batch_size = match overrides.batch_size {
        Some(size) => size,
        None => match env_value("SYNC_BATCH_SIZE") {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("SYNC_BATCH_SIZE is not a number: {value}"))?,
            None => config
                .sync
                .batch_size
                .unwrap_or_else(|| mode.default_batch_size()),
        },
    };
    if batch_size == 0 {
        bail!("batch size must be at least 1");
    }

    let batch_delay_ms = match overrides.batch_delay_ms {
        Some(delay) => delay,
        None => match env_value("SYNC_BATCH_DELAY_MS") {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("SYNC_BATCH_DELAY_MS is not a number: {value}"))?,
            None => config
                .sync
                .batch_delay_ms
                .unwrap_or_else(|| mode.default_batch_delay_ms()),
        },
    };

    let timeout_ms = match env_value("NOTION_HTTP_TIMEOUT_MS") {
        Some(value) => value
            .parse::<u64>()
            .with_context(|| format!("NOTION_HTTP_TIMEOUT_MS is not a number: {value}"))?,
        None => config.notion.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
    };

    let wiki_path = match &overrides.wiki_path {
        Some(path) => paths.absolutize(path),
        None => {
            let configured = env_value("WIKI_PATH")
                .or_else(|| config.sync.wiki_path.clone())
                .unwrap_or_else(|| DEFAULT_WIKI_DIR.to_string());
            paths.absolutize(Path::new(&configured))
        }
    };

    Ok(ResolvedSettings {
        api_key: env_value("NOTION_API_KEY"),
        api_url: env_value("NOTION_API_URL")
            .or_else(|| config.notion.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
        notion_version: env_value("NOTION_VERSION")
            .or_else(|| config.notion.notion_version.clone())
            .unwrap_or_else(|| DEFAULT_NOTION_VERSION.to_string()),
        timeout_ms,
        user_agent: config
            .notion
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
        root_page_id: env_value("NOTION_ROOT_PAGE_ID")
            .or_else(|| config.notion.root_page_id.clone()),
        wiki_path,
        mode,
        batch_size,
        batch_delay_ms,
        title_suffix: config
            .sync
            .title_suffix
            .clone()
            .unwrap_or_else(|| DEFAULT_TITLE_SUFFIX.to_string()),
        checklist_checked: config.sync.checklist_checked.unwrap_or(true),
        mode_source,
    })
}
