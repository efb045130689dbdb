mod logging;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use wikisync_core::blocks::{TranslateOptions, translate};
use wikisync_core::check::check_connection;
use wikisync_core::config::{
    ResolvedSettings, SettingsOverrides, SyncMode, load_config, resolve_settings,
};
use wikisync_core::notion::{NotionClient, NotionClientConfig};
use wikisync_core::parser::{DocumentParser, ParserOptions};
use wikisync_core::purge::{PurgeOptions, purge_wiki};
use wikisync_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, init_layout, normalize_for_display,
    resolve_paths,
};
use wikisync_core::scan::{scan_stats, scan_wiki};
use wikisync_core::scheduler::{SyncOptions, run_sync};

use crate::logging::setup_logging;

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Mirror a directory of HTML wiki pages into a Notion workspace"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, help = "Debug logging for wikisync crates")]
    verbose: bool,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .wikisync/config.toml")]
    Init(InitArgs),
    #[command(about = "Sync wiki pages into the workspace")]
    Sync(SyncArgs),
    #[command(about = "Archive every page created by sync")]
    Purge(PurgeArgs),
    #[command(about = "Verify the integration token and list shared pages")]
    Check(CheckArgs),
    #[command(about = "Parse one HTML page offline and print the result")]
    Parse(ParseArgs),
    #[command(about = "Print the resolved configuration")]
    Config,
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Full,
    Fast,
}

impl From<ModeArg> for SyncMode {
    fn from(value: ModeArg) -> Self {
        match value {
            ModeArg::Full => SyncMode::Full,
            ModeArg::Fast => SyncMode::Fast,
        }
    }
}

#[derive(Debug, Args)]
struct SyncArgs {
    #[arg(long, value_enum, help = "full replaces existing pages; fast only creates")]
    mode: Option<ModeArg>,
    #[arg(long, value_name = "PATH")]
    wiki_path: Option<PathBuf>,
    #[arg(long, value_name = "N")]
    batch_size: Option<usize>,
    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct PurgeArgs {
    #[arg(long, value_name = "PATH")]
    wiki_path: Option<PathBuf>,
    #[arg(long, help = "Confirm archiving")]
    yes: bool,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct CheckArgs {
    #[arg(long, default_value_t = 10, value_name = "N")]
    limit: usize,
    #[arg(long, help = "Print the report as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ParseArgs {
    file: PathBuf,
    #[arg(long, help = "Print the record and blocks as JSON")]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Sync(args)) => run_sync_command(&runtime, args),
        Some(Commands::Purge(args)) => run_purge(&runtime, args),
        Some(Commands::Check(args)) => run_check(&runtime, args),
        Some(Commands::Parse(args)) => run_parse(&runtime, args),
        Some(Commands::Config) => run_config(&runtime),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, args.force)?;

    println!("Initialized wikisync layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths, None, false);
    Ok(())
}

fn run_sync_command(runtime: &RuntimeOptions, args: SyncArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = resolve_runtime_settings(
        &paths,
        SettingsOverrides {
            wiki_path: args.wiki_path,
            mode: args.mode.map(SyncMode::from),
            batch_size: args.batch_size,
            batch_delay_ms: args.delay_ms,
        },
    )?;
    if settings.mode == SyncMode::Purge {
        bail!("configured mode is purge; run `wikisync purge --yes` instead");
    }
    let client = build_client(&settings)?;
    let report = run_sync(
        &client,
        &settings.wiki_path,
        &SyncOptions::from_settings(&settings),
    )?;

    if args.json {
        print_json(&report)?;
    } else {
        println!("sync complete");
        println!("mode: {}", report.mode);
        println!("wiki_path: {}", normalize_path(&settings.wiki_path));
        println!("root_page_id: {}", report.root_page_id);
        println!("total_files: {}", report.total_files);
        println!("categories: {}", report.categories.len());
        println!("batches: {}", report.batches);
        println!("created: {}", report.created);
        println!("updated: {}", report.updated);
        println!("skipped: {}", report.skipped);
        println!("errors: {}", report.failed);
        if report.dropped_blocks > 0 {
            println!("dropped_blocks: {}", report.dropped_blocks);
        }
        if !report.overflow.is_empty() {
            println!("overflow_appends: {}", report.overflow.len());
            println!("overflow_incomplete: {}", report.incomplete_overflow());
        }
        match (&report.index, &report.index_error) {
            (Some(index), _) => println!("index_page_id: {}", index.page_id),
            (None, Some(error)) => println!("index_error: {error}"),
            (None, None) => println!("index_page_id: <none>"),
        }
        for item in report.items.iter().filter(|item| item.error.is_some()) {
            println!(
                "issue: {} [{}] {}",
                item.relative_path,
                item.error_kind.unwrap_or("unknown"),
                item.error.as_deref().unwrap_or("")
            );
        }
        println!("requests: {}", report.request_count);
        println!("elapsed_ms: {}", report.elapsed_ms);
    }
    print_diagnostics(runtime, &paths, Some(&settings), args.json);
    Ok(())
}

fn run_purge(runtime: &RuntimeOptions, args: PurgeArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = resolve_runtime_settings(
        &paths,
        SettingsOverrides {
            wiki_path: args.wiki_path,
            mode: Some(SyncMode::Purge),
            ..SettingsOverrides::default()
        },
    )?;
    if !args.yes {
        let documents = scan_wiki(&settings.wiki_path)?;
        let stats = scan_stats(&documents);
        println!("purge preview");
        println!("wiki_path: {}", normalize_path(&settings.wiki_path));
        println!("local_files: {}", stats.total_files);
        println!("categories: {}", stats.categories);
        bail!("purge archives remote pages; re-run with --yes to confirm");
    }
    let client = build_client(&settings)?;
    let report = purge_wiki(
        &client,
        &settings.wiki_path,
        &PurgeOptions::from_settings(&settings),
    )?;

    if args.json {
        print_json(&report)?;
    } else {
        println!("purge complete");
        println!("categories_found: {}", report.categories_found);
        for missing in &report.categories_missing {
            println!("category_missing: {missing}");
        }
        println!("archived: {}", report.archived);
        println!("errors: {}", report.failed);
        for page in report.pages.iter().filter(|page| page.error.is_some()) {
            println!(
                "issue: {} {}",
                page.title,
                page.error.as_deref().unwrap_or("")
            );
        }
    }
    print_diagnostics(runtime, &paths, Some(&settings), args.json);
    Ok(())
}

fn run_check(runtime: &RuntimeOptions, args: CheckArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = resolve_runtime_settings(&paths, SettingsOverrides::default())?;
    let client = build_client(&settings)?;
    let report = check_connection(&client, args.limit)?;

    if args.json {
        print_json(&report)?;
    } else {
        println!("connection ok");
        println!("users: {}", report.users);
        println!(
            "bot: {} ({})",
            report.bot.name.as_deref().unwrap_or("<unnamed>"),
            report.bot.kind
        );
        println!("visible_pages: {}", report.visible_pages.len());
        for page in &report.visible_pages {
            let title = if page.title.is_empty() {
                "<untitled>"
            } else {
                page.title.as_str()
            };
            println!("page: {title} {}", page.id);
        }
    }
    print_diagnostics(runtime, &paths, Some(&settings), args.json);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ParseOutput<'a> {
    record: &'a wikisync_core::document::DocumentRecord,
    blocks: Vec<serde_json::Value>,
}

fn run_parse(runtime: &RuntimeOptions, args: ParseArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = resolve_runtime_settings(&paths, SettingsOverrides::default())?;
    let parser = DocumentParser::new(ParserOptions {
        title_suffix: settings.title_suffix.clone(),
    })?;
    let file = paths.absolutize(&args.file);
    let record = parser.parse_file(&file, None)?;
    let blocks = translate(
        &record,
        &TranslateOptions {
            checklist_checked: settings.checklist_checked,
        },
    )?;

    if args.json {
        return print_json(&ParseOutput {
            record: &record,
            blocks: blocks.iter().map(|block| block.to_json()).collect(),
        });
    }

    println!("title: {}", record.title);
    println!("category: {}", record.category);
    println!("breadcrumbs: {}", record.breadcrumbs.join(" / "));
    println!("sections: {}", record.sections.len());
    for section in &record.sections {
        println!(
            "section: {} (paragraphs={} list_items={} checklist={} code={} callouts={})",
            section.title,
            section.paragraphs.len(),
            section.list_items.len(),
            section.checklist_items.len(),
            section.code_blocks.len(),
            section.callouts.len()
        );
    }
    println!("blocks: {}", blocks.len());
    let mut kinds = BTreeMap::new();
    for block in &blocks {
        *kinds.entry(block.kind()).or_insert(0usize) += 1;
    }
    for (kind, count) in kinds {
        println!("blocks.{kind}: {count}");
    }
    Ok(())
}

fn run_config(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let settings = resolve_runtime_settings(&paths, SettingsOverrides::default())?;
    println!(
        "config_file: {} ({})",
        normalize_path(&paths.config_path),
        if paths.config_path.exists() {
            "found"
        } else {
            "missing"
        }
    );
    println!("{}", settings.diagnostics());
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn resolve_runtime_settings(
    paths: &ResolvedPaths,
    overrides: SettingsOverrides,
) -> Result<ResolvedSettings> {
    let config = load_config(&paths.config_path)?;
    resolve_settings(paths, &config, &overrides)
}

fn build_client(settings: &ResolvedSettings) -> Result<NotionClient> {
    let config = NotionClientConfig::from_settings(settings)
        .context("set NOTION_API_KEY in the environment or a .env file")?;
    NotionClient::new(config)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DiagnosticsSink {
    Stdout,
    Stderr,
}

impl DiagnosticsSink {
    /// `--json` owns stdout, so diagnostics go to stderr there.
    fn for_output(json: bool) -> Self {
        if json { Self::Stderr } else { Self::Stdout }
    }
}

fn print_diagnostics(
    runtime: &RuntimeOptions,
    paths: &ResolvedPaths,
    settings: Option<&ResolvedSettings>,
    json: bool,
) {
    if !runtime.diagnostics {
        return;
    }
    let mut text = format!("\n[diagnostics]\n{}", paths.diagnostics());
    if let Some(settings) = settings {
        text.push('\n');
        text.push_str(&settings.diagnostics());
    }
    match DiagnosticsSink::for_output(json) {
        DiagnosticsSink::Stdout => println!("{text}"),
        DiagnosticsSink::Stderr => eprintln!("{text}"),
    }
}

fn normalize_path(path: &Path) -> String {
    normalize_for_display(path)
}
