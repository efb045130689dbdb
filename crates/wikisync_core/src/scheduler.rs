use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use log::{info, warn};
use serde::Serialize;

use crate::blocks::{TranslateOptions, translate};
use crate::category::{CategoryMap, CategoryResolver, ResolvedCategory, category_icon};
use crate::config::{ResolvedSettings, SyncMode};
use crate::deferred::{DeferredAppend, DeferredAppender, OverflowReport};
use crate::error::SyncError;
use crate::index_page::{IndexReport, publish_index};
use crate::notion::{NotionApi, discover_root_page};
use crate::parser::{DocumentParser, ParserOptions};
use crate::reconcile::{Reconciler, UpsertMode, UpsertOutcome};
use crate::scan::{ScannedDocument, group_by_category, scan_wiki};

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: SyncMode,
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub root_page_id: Option<String>,
    pub parser: ParserOptions,
    pub translate: TranslateOptions,
}

impl SyncOptions {
    pub fn from_settings(settings: &ResolvedSettings) -> Self {
        Self {
            mode: settings.mode,
            batch_size: settings.batch_size,
            batch_delay: settings.batch_delay(),
            root_page_id: settings.root_page_id.clone(),
            parser: ParserOptions {
                title_suffix: settings.title_suffix.clone(),
            },
            translate: TranslateOptions {
                checklist_checked: settings.checklist_checked,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemOutcome {
    Created,
    Updated,
    Skipped,
    Failed,
}

impl From<UpsertOutcome> for ItemOutcome {
    fn from(value: UpsertOutcome) -> Self {
        match value {
            UpsertOutcome::Created => Self::Created,
            UpsertOutcome::Updated => Self::Updated,
            UpsertOutcome::Skipped => Self::Skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemReport {
    pub relative_path: String,
    pub category: String,
    pub title: Option<String>,
    pub outcome: ItemOutcome,
    pub page_id: Option<String>,
    pub blocks: usize,
    pub deferred_blocks: usize,
    pub dropped_blocks: usize,
    pub undeleted_blocks: usize,
    pub error_kind: Option<&'static str>,
    pub error: Option<String>,
}

impl ItemReport {
    fn new(document: &ScannedDocument) -> Self {
        Self {
            relative_path: document.relative_path.clone(),
            category: document.category_key.clone(),
            title: None,
            outcome: ItemOutcome::Failed,
            page_id: None,
            blocks: 0,
            deferred_blocks: 0,
            dropped_blocks: 0,
            undeleted_blocks: 0,
            error_kind: None,
            error: None,
        }
    }

    fn with_error(mut self, error: &SyncError) -> Self {
        self.outcome = match error {
            SyncError::TranslationEmpty { .. } => ItemOutcome::Skipped,
            _ => ItemOutcome::Failed,
        };
        self.error_kind = Some(error.kind());
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub mode: SyncMode,
    pub root_page_id: String,
    pub total_files: usize,
    pub batches: usize,
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dropped_blocks: usize,
    pub categories: CategoryMap,
    pub overflow: Vec<OverflowReport>,
    pub index: Option<IndexReport>,
    pub index_error: Option<String>,
    pub items: Vec<ItemReport>,
    pub request_count: usize,
    pub elapsed_ms: u64,
}

impl SyncReport {
    /// Overflow appends that did not land completely.
    pub fn incomplete_overflow(&self) -> usize {
        self.overflow
            .iter()
            .filter(|report| !report.is_complete())
            .count()
    }
}

/// Mirror the wiki tree under `wiki_root` into the store.
///
/// Root discovery, scanning, and category resolution failures abort the run.
/// After that every document is processed independently and the report is
/// always returned.
pub fn run_sync(api: &dyn NotionApi, wiki_root: &Path, options: &SyncOptions) -> Result<SyncReport> {
    let Some(upsert_mode) = UpsertMode::for_sync_mode(options.mode) else {
        bail!("sync cannot run in {} mode", options.mode);
    };
    let started = Instant::now();
    let batch_size = options.batch_size.max(1);

    let root_page_id = discover_root_page(api, options.root_page_id.as_deref())?;
    info!("using root page {root_page_id}");

    let documents = scan_wiki(wiki_root)?;
    info!("found {} wiki page(s)", documents.len());
    let grouped = group_by_category(documents);

    let categories = if grouped.is_empty() {
        CategoryMap::new()
    } else {
        CategoryResolver::new(api, &root_page_id).resolve_all(
            grouped.keys(),
            batch_size,
            options.batch_delay,
        )?
    };

    let work = grouped
        .into_iter()
        .flat_map(|(key, documents)| {
            let category = categories.get(&key).cloned();
            documents
                .into_iter()
                .map(move |document| (document, category.clone()))
        })
        .collect::<Vec<_>>();

    let parser = DocumentParser::new(options.parser.clone())?;
    let reconciler = Reconciler::new(api, upsert_mode);
    let pipeline = ItemPipeline {
        parser: &parser,
        reconciler: &reconciler,
        translate: &options.translate,
    };

    let batches = work.chunks(batch_size).collect::<Vec<_>>();
    let (items, overflow) = thread::scope(|outer| {
        let appender = DeferredAppender::spawn(outer, api);
        let mut items = Vec::with_capacity(work.len());
        for (index, batch) in batches.iter().enumerate() {
            info!(
                "batch {}/{} ({} page(s))",
                index + 1,
                batches.len(),
                batch.len()
            );
            for (item, deferred) in pipeline.run_batch(batch) {
                if let Some(job) = deferred {
                    appender.submit(job);
                }
                log_item(&item);
                items.push(item);
            }
            if index + 1 < batches.len() && !options.batch_delay.is_zero() {
                thread::sleep(options.batch_delay);
            }
        }
        (items, appender.finish())
    });

    let (index, index_error) = if categories.is_empty() {
        (None, None)
    } else {
        match publish_index(api, &categories, &root_page_id) {
            Ok(report) => (Some(report), None),
            Err(error) => {
                warn!("index page was not published: {error:#}");
                (None, Some(format!("{error:#}")))
            }
        }
    };

    let count = |outcome: ItemOutcome| items.iter().filter(|item| item.outcome == outcome).count();
    let report = SyncReport {
        mode: options.mode,
        root_page_id,
        total_files: items.len(),
        batches: batches.len(),
        created: count(ItemOutcome::Created),
        updated: count(ItemOutcome::Updated),
        skipped: count(ItemOutcome::Skipped),
        failed: count(ItemOutcome::Failed),
        dropped_blocks: items.iter().map(|item| item.dropped_blocks).sum(),
        categories,
        overflow,
        index,
        index_error,
        request_count: api.request_count(),
        elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        items,
    };
    info!(
        "sync finished: created={} updated={} skipped={} failed={}",
        report.created, report.updated, report.skipped, report.failed
    );
    Ok(report)
}

type WorkItem = (ScannedDocument, Option<ResolvedCategory>);

struct ItemPipeline<'a> {
    parser: &'a DocumentParser,
    reconciler: &'a Reconciler<'a>,
    translate: &'a TranslateOptions,
}

impl ItemPipeline<'_> {
    /// Process every item of a batch on its own thread and return results
    /// in batch order. A panicking item becomes a failed item.
    fn run_batch(&self, batch: &[WorkItem]) -> Vec<(ItemReport, Option<DeferredAppend>)> {
        thread::scope(|scope| {
            let handles = batch
                .iter()
                .map(|(document, category)| {
                    let handle = scope.spawn(move || self.process(document, category.as_ref()));
                    (document, handle)
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|(document, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        let mut item = ItemReport::new(document);
                        item.error_kind = Some("worker_panic");
                        item.error = Some("worker panicked".to_string());
                        (item, None)
                    })
                })
                .collect()
        })
    }

    fn process(
        &self,
        document: &ScannedDocument,
        category: Option<&ResolvedCategory>,
    ) -> (ItemReport, Option<DeferredAppend>) {
        let item = ItemReport::new(document);
        let Some(category) = category else {
            let error = SyncError::CategoryResolution {
                category: document.category_key.clone(),
                message: "category page missing from map".to_string(),
            };
            return (item.with_error(&error), None);
        };

        let record = match self
            .parser
            .parse_file(&document.full_path, Some(&category.name))
        {
            Ok(record) => record,
            Err(error) => return (item.with_error(&error), None),
        };
        let mut item = ItemReport {
            title: Some(record.title.clone()),
            ..item
        };

        let blocks = match translate(&record, self.translate) {
            Ok(blocks) => blocks,
            Err(error) => return (item.with_error(&error), None),
        };
        item.blocks = blocks.len();

        match self.reconciler.upsert(
            &record.title,
            &blocks,
            &category.page_id,
            category_icon(&record.category),
        ) {
            Ok(mut report) => {
                item.outcome = report.outcome.into();
                item.page_id = Some(report.page_id.clone());
                item.deferred_blocks = report.deferred_blocks;
                item.dropped_blocks = report.dropped_blocks;
                item.undeleted_blocks = report.undeleted_blocks;
                (item, report.deferred.take())
            }
            Err(error) => (item.with_error(&error), None),
        }
    }
}

fn log_item(item: &ItemReport) {
    let label = item.title.as_deref().unwrap_or(item.relative_path.as_str());
    match (&item.outcome, &item.error) {
        (ItemOutcome::Failed, Some(error)) => warn!("failed {label}: {error}"),
        (ItemOutcome::Skipped, Some(error)) => warn!("skipped {label}: {error}"),
        (outcome, _) => info!("{label}: {outcome:?}"),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::Path;
    use std::time::Duration;

    use tempfile::tempdir;

    use super::{ItemOutcome, SyncOptions, run_sync};
    use crate::blocks::{CodeLanguage, RemoteBlock, TranslateOptions};
    use crate::config::SyncMode;
    use crate::parser::ParserOptions;
    use crate::testing::MockNotion;

    fn options(mode: SyncMode, root: &str) -> SyncOptions {
        SyncOptions {
            mode,
            batch_size: 2,
            batch_delay: Duration::ZERO,
            root_page_id: Some(root.to_string()),
            parser: ParserOptions::default(),
            translate: TranslateOptions::default(),
        }
    }

    fn write_file(path: &Path, content: &str) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        fs::write(path, content).expect("write");
    }

    fn page(title: &str, body: &str) -> String {
        format!(
            "<html><head><title>{title} - Hanung's Dev Wiki</title></head><body><article>\
             <h1>{title}</h1><div class=\"doc-section\"><h2>Overview</h2>{body}</div>\
             </article></body></html>"
        )
    }

    fn backend_fixture(root: &Path) {
        write_file(
            &root.join("backend").join("auth.html"),
            &page(
                "Auth Guide",
                "<p>Tokens and sessions.</p>\
                 <pre><code class=\"language-csharp\">var token = Issue();</code></pre>",
            ),
        );
        write_file(
            &root.join("backend").join("cache.html"),
            &page(
                "Cache Guide",
                "<ul class=\"checklist\"><li class=\"checklist-item\"><span>Rotate keys</span></li></ul>",
            ),
        );
    }

    #[test]
    fn backend_scenario_creates_pages_under_one_category() {
        let temp = tempdir().expect("tempdir");
        backend_fixture(temp.path());
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);

        let report = run_sync(&api, temp.path(), &options(SyncMode::Full, &root)).expect("sync");
        assert_eq!(
            (report.created, report.updated, report.skipped, report.failed),
            (2, 0, 0, 0)
        );
        assert_eq!(api.pages_titled("Backend").len(), 1);
        let backend = &report.categories["backend"];
        assert_eq!(backend.name, "Backend");

        let auth = api.pages_titled("Auth Guide");
        assert_eq!(auth.len(), 1);
        assert_eq!(auth[0].parent_id.as_deref(), Some(backend.page_id.as_str()));
        assert!(api.blocks_of(&auth[0].id).contains(&RemoteBlock::Code {
            code: "var token = Issue();".to_string(),
            language: CodeLanguage::from_tag("c#"),
        }));
        let cache = api.pages_titled("Cache Guide");
        assert_eq!(cache.len(), 1);
        assert_eq!(cache[0].parent_id.as_deref(), Some(backend.page_id.as_str()));
        assert!(api.blocks_of(&cache[0].id).contains(&RemoteBlock::ToDo {
            text: "Rotate keys".to_string(),
            checked: true,
        }));
        assert!(report.index.is_some());
        assert_eq!(api.pages_titled("Wiki Index").len(), 1);
    }

    #[test]
    fn rerunning_full_sync_updates_without_duplicates() {
        let temp = tempdir().expect("tempdir");
        backend_fixture(temp.path());
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);

        run_sync(&api, temp.path(), &options(SyncMode::Full, &root)).expect("first sync");
        let pages_after_first = api.live_page_count();
        let auth_id = api.pages_titled("Auth Guide")[0].id.clone();
        let auth_blocks = api.blocks_of(&auth_id);

        let second = run_sync(&api, temp.path(), &options(SyncMode::Full, &root)).expect("resync");
        assert_eq!((second.created, second.updated), (0, 2));
        assert_eq!(api.live_page_count(), pages_after_first);
        assert_eq!(api.blocks_of(&auth_id), auth_blocks);
    }

    #[test]
    fn fast_mode_skips_existing_pages_without_mutation() {
        let temp = tempdir().expect("tempdir");
        backend_fixture(temp.path());
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);
        let backend = api.seed_page("Backend", Some(&root));
        let cache = api.seed_page("Cache Guide", Some(&backend));

        let report = run_sync(&api, temp.path(), &options(SyncMode::Fast, &root)).expect("sync");
        assert_eq!((report.created, report.skipped), (1, 1));
        let skipped = report
            .items
            .iter()
            .find(|item| item.outcome == ItemOutcome::Skipped)
            .expect("skipped item");
        assert_eq!(skipped.page_id.as_deref(), Some(cache.as_str()));
        assert!(
            !api.mutating_calls()
                .iter()
                .any(|call| call.contains(cache.as_str()))
        );
    }

    #[test]
    fn failures_stay_inside_their_item() {
        let temp = tempdir().expect("tempdir");
        let root_dir = temp.path();
        for name in ["a", "b", "c", "d", "e"] {
            write_file(
                &root_dir.join("backend").join(format!("{name}.html")),
                &page(&format!("Page {name}"), "<p>text</p>"),
            );
        }
        write_file(&root_dir.join("backend").join("empty.html"), "<html></html>");
        write_file(
            &root_dir.join("backend").join("hollow.html"),
            "<html><body><article><h1>Hollow</h1></article></body></html>",
        );
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);
        api.fail_create("Page b");
        api.panic_on_create("Page d");

        let report = run_sync(&api, root_dir, &options(SyncMode::Full, &root)).expect("sync");
        assert_eq!(report.total_files, 7);
        assert_eq!(report.batches, 4);
        assert_eq!(report.created, 3);
        assert_eq!(report.failed, 3);
        assert_eq!(report.skipped, 1);
        for name in ["a", "c", "e"] {
            assert_eq!(api.pages_titled(&format!("Page {name}")).len(), 1);
        }
        let kinds = report
            .items
            .iter()
            .filter_map(|item| item.error_kind)
            .collect::<Vec<_>>();
        assert!(kinds.contains(&"parse_failure"));
        assert!(kinds.contains(&"remote_call_failure"));
        assert!(kinds.contains(&"worker_panic"));
        assert!(kinds.contains(&"translation_empty"));
        assert!(report.index.is_some());
    }

    #[test]
    fn fast_mode_reports_overflow_appends() {
        let temp = tempdir().expect("tempdir");
        let paragraphs = (0..240)
            .map(|index| format!("<p>line {index}</p>"))
            .collect::<String>();
        write_file(
            &temp.path().join("guides").join("long.html"),
            &page("Long Guide", &paragraphs),
        );
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);

        let report = run_sync(&api, temp.path(), &options(SyncMode::Fast, &root)).expect("sync");
        assert_eq!(report.created, 1);
        assert_eq!(report.overflow.len(), 1);
        assert_eq!(report.overflow[0].appended, 100);
        assert_eq!(report.incomplete_overflow(), 0);
        // Category callout and heading bring the page to 242 blocks.
        assert_eq!(report.dropped_blocks, 42);
        let page_id = report.items[0].page_id.clone().expect("page id");
        assert_eq!(api.blocks_of(&page_id).len(), 200);
    }

    #[test]
    fn batches_run_in_order_with_delay_only_between_them() {
        let temp = tempdir().expect("tempdir");
        for name in ["a", "b", "c"] {
            write_file(
                &temp.path().join("guides").join(format!("{name}.html")),
                &page(&format!("Page {name}"), "<p>text</p>"),
            );
        }
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);
        let delay = Duration::from_millis(80);
        let mut opts = options(SyncMode::Full, &root);
        opts.batch_size = 1;
        opts.batch_delay = delay;

        let report = run_sync(&api, temp.path(), &opts).expect("sync");
        assert_eq!(report.batches, 3);
        assert_eq!(report.created, 3);
        assert!(report.elapsed_ms >= 2 * 80);

        let created = api.creation_times();
        let documents = created
            .iter()
            .filter(|(title, _)| title.starts_with("Page "))
            .collect::<Vec<_>>();
        let titles = documents
            .iter()
            .map(|(title, _)| title.as_str())
            .collect::<Vec<_>>();
        assert_eq!(titles, vec!["Page a", "Page b", "Page c"]);
        for pair in documents.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= delay);
        }

        let (_, last_document) = documents[2];
        let (_, index_created) = created
            .iter()
            .find(|(title, _)| title == "Wiki Index")
            .expect("index created");
        assert!(index_created.duration_since(*last_document) < delay);
    }

    #[test]
    fn index_failure_does_not_abort_the_run() {
        let temp = tempdir().expect("tempdir");
        backend_fixture(temp.path());
        let api = MockNotion::new();
        let root = api.seed_page("Root", None);
        api.fail_create("Wiki Index");

        let report = run_sync(&api, temp.path(), &options(SyncMode::Full, &root)).expect("sync");
        assert_eq!(report.created, 2);
        assert!(report.index.is_none());
        assert!(
            report
                .index_error
                .as_deref()
                .is_some_and(|error| error.contains("index page"))
        );
    }

    #[test]
    fn purge_mode_is_rejected() {
        let temp = tempdir().expect("tempdir");
        let api = MockNotion::new();
        let error = run_sync(&api, temp.path(), &options(SyncMode::Purge, "root"))
            .expect_err("must fail");
        assert!(error.to_string().contains("purge"));
    }

    #[test]
    fn missing_root_is_fatal() {
        let temp = tempdir().expect("tempdir");
        backend_fixture(temp.path());
        let api = MockNotion::new();
        let mut opts = options(SyncMode::Full, "unused");
        opts.root_page_id = None;
        let error = run_sync(&api, temp.path(), &opts).expect_err("must fail");
        assert!(error.to_string().contains("root page discovery failed"));
    }
}
