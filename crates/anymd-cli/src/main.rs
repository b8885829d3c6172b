//! anymd: remote markdown object browser and sync client
//!
//! Commands:
//!   spaces              - list spaces visible to the token
//!   use <space-id>      - switch the active space
//!   tree                - render types → objects for the active space
//!   open <object-id>    - materialize an object into the local cache
//!   new <type-id> <name> - create an object under a type
//!   rm <object-id>      - delete an object remotely
//!   status              - active space, cache dir, cache size
//!   watch               - sync local edits back on save (daemon mode)
//!   config show         - display current configuration

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use anymd_client::http::{HttpConfig, HttpRemoteStore};
use anymd_core::config::AnymdConfig;
use anymd_core::types::Space;
use anymd_engine::{Engine, SaveOutcome, SpacePicker, Validity};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "anymd",
    version,
    about = "Remote markdown object browser and sync client",
    long_about = "anymd: mirror a remote object store (spaces → types → objects) \
                  into a local markdown cache and sync edits back on save"
)]
struct Cli {
    /// Path to anymd.toml configuration file
    #[arg(long, short = 'c', env = "ANYMD_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "ANYMD_LOG", default_value = "warn")]
    log: String,

    /// Log format (json, text)
    #[arg(long, env = "ANYMD_LOG_FORMAT", default_value = "text")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List spaces visible to the API token
    Spaces,

    /// Switch the active space
    Use {
        /// Space id to activate
        space_id: String,
    },

    /// Render the object tree for the active space
    Tree,

    /// Fetch an object into the local markdown cache and print its path
    Open {
        /// Object id
        object_id: String,
    },

    /// Create a new object under a type
    New {
        /// Type id (a root entry from `anymd tree`)
        type_id: String,
        /// Object name
        name: String,
    },

    /// Delete an object remotely
    Rm {
        /// Object id
        object_id: String,
    },

    /// Show the active space and local cache state
    Status,

    /// Watch the local cache and push edits back on save
    Watch,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log, &cli.log_format);

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = load_config(&config_path).await?;

    if let Commands::Config { action: ConfigAction::Show } = cli.command {
        return cmd_config_show(&config, &config_path);
    }

    config
        .validate()
        .context("invalid configuration; run `anymd config show` to inspect it")?;

    let remote = HttpRemoteStore::new(HttpConfig::from(&config.api))
        .context("building API client")?;
    let engine = Arc::new(Engine::new(&config, Arc::new(remote)));
    engine.restore_context();

    match cli.command {
        Commands::Spaces => cmd_spaces(&engine).await,
        Commands::Use { space_id } => cmd_use(&engine, &space_id).await,
        Commands::Tree => cmd_tree(&engine).await,
        Commands::Open { object_id } => cmd_open(&engine, &object_id).await,
        Commands::New { type_id, name } => cmd_new(&engine, &type_id, &name).await,
        Commands::Rm { object_id } => cmd_rm(&engine, &object_id).await,
        Commands::Status => cmd_status(&engine, &config, &config_path).await,
        Commands::Watch => cmd_watch(engine, &config).await,
        Commands::Config { .. } => unreachable!("handled before engine construction"),
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn resolve_config_path(flag: Option<&Path>) -> PathBuf {
    if let Some(p) = flag {
        return p.to_path_buf();
    }
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("anymd")
        .join("config.toml")
}

async fn load_config(path: &Path) -> Result<AnymdConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        warn!("config file not found: {}  (using defaults)", path.display());
        Ok(AnymdConfig::default())
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json())
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer())
                .init();
        }
    }
}

// ── `anymd spaces` ────────────────────────────────────────────────────────────

async fn cmd_spaces(engine: &Engine) -> Result<()> {
    let spaces = engine.list_spaces().await;
    if spaces.is_empty() {
        println!("No spaces available (is the API reachable and the token valid?)");
        return Ok(());
    }

    let active = engine.active_space().map(|s| s.id);
    for space in &spaces {
        let marker = if active.as_deref() == Some(space.id.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{marker} {}  {}", space.id, space.label());
    }
    Ok(())
}

// ── `anymd use` ───────────────────────────────────────────────────────────────

async fn cmd_use(engine: &Engine, space_id: &str) -> Result<()> {
    let spaces = engine.list_spaces().await;
    let space = spaces
        .into_iter()
        .find(|s| s.id == space_id)
        .with_context(|| format!("no space with id '{space_id}'; run `anymd spaces`"))?;

    let label = space.label().to_string();
    engine.switch_space(space)?;
    println!("Active space: {label} ({space_id})");
    Ok(())
}

// ── `anymd tree` ──────────────────────────────────────────────────────────────

async fn cmd_tree(engine: &Engine) -> Result<()> {
    render_tree(engine).await;
    // A listing that found the space gone returns empty rather than
    // erroring; offer a re-selection instead of exiting silently.
    if recover_if_invalid(engine).await? {
        println!();
        render_tree(engine).await;
    }
    Ok(())
}

async fn render_tree(engine: &Engine) {
    let Some(active) = engine.active_space() else {
        println!("No active space. Run `anymd spaces` then `anymd use <space-id>`.");
        return;
    };
    println!("{} ({})", active.label(), active.id);

    let roots = engine.root_entries().await;
    for root in &roots {
        println!("├── {}  [{}]", root.name, root.id);
        let entries = engine.category_entries(&root.id).await;
        for entry in &entries {
            println!("│   ├── {}  [{}]", entry.label(), entry.id);
        }
    }

    let trash = engine.trash_entries().await;
    if !trash.is_empty() {
        println!("└── trash");
        for entry in &trash {
            println!("    ├── {}  [{}]", entry.label(), entry.id);
        }
    }
}

/// When the last operation invalidated the context, run the
/// re-selection prompt. Returns whether a new space was selected.
async fn recover_if_invalid(engine: &Engine) -> Result<bool> {
    if engine.active_validity() != Some(Validity::Invalid) {
        return Ok(false);
    }
    match engine.recover(&PromptPicker).await? {
        Some(space) => {
            println!("Switched to: {} ({})", space.label(), space.id);
            Ok(true)
        }
        None => {
            println!("No space selected; run `anymd use <space-id>` when ready.");
            Ok(false)
        }
    }
}

// ── `anymd open` ──────────────────────────────────────────────────────────────

async fn cmd_open(engine: &Engine, object_id: &str) -> Result<()> {
    match engine.open_object(object_id).await {
        Ok(path) => {
            println!("{}", path.display());
            Ok(())
        }
        Err(err) => {
            if recover_if_invalid(engine).await? {
                anyhow::bail!("opening object '{object_id}': {err} — re-run under the new space");
            }
            Err(err).with_context(|| format!("opening object '{object_id}'"))
        }
    }
}

// ── `anymd new` / `anymd rm` ──────────────────────────────────────────────────

async fn cmd_new(engine: &Engine, type_id: &str, name: &str) -> Result<()> {
    let body = format!("# {}\n", name.trim());
    match engine.create_object(type_id, name, &body).await {
        Ok(detail) => {
            println!("Created: {} ({})", detail.label(), detail.id);
            Ok(())
        }
        Err(err) => {
            if recover_if_invalid(engine).await? {
                anyhow::bail!("creating '{name}': {err} — re-run under the new space");
            }
            Err(err).with_context(|| format!("creating '{name}' under type '{type_id}'"))
        }
    }
}

async fn cmd_rm(engine: &Engine, object_id: &str) -> Result<()> {
    match engine.delete_object(object_id).await {
        Ok(()) => {
            println!("Deleted: {object_id}");
            Ok(())
        }
        Err(err) => {
            if recover_if_invalid(engine).await? {
                anyhow::bail!("deleting object '{object_id}': {err} — re-run under the new space");
            }
            Err(err).with_context(|| format!("deleting object '{object_id}'"))
        }
    }
}

// ── `anymd status` ────────────────────────────────────────────────────────────

async fn cmd_status(engine: &Engine, config: &AnymdConfig, config_path: &Path) -> Result<()> {
    println!("anymd v{}", env!("CARGO_PKG_VERSION"));
    println!("  config:     {}", config_path.display());
    println!("  api:        {}", config.api.base_url);

    match engine.active_space() {
        Some(space) => {
            let reachable = match engine.validate_active().await {
                Ok(true) => "ok",
                Ok(false) => "INVALID (run a command to re-select)",
                Err(_) => "unreachable",
            };
            println!("  space:      {} ({}) [{}]", space.label(), space.id, reachable);
        }
        None => println!("  space:      none selected"),
    }

    println!("  cache dir:  {}", engine.files().root().display());
    match engine.files().cache_size() {
        Ok(bytes) => println!("  cache size: {}", fmt_bytes(bytes)),
        Err(e) => println!("  cache size: unavailable ({e})"),
    }
    println!("  mappings:   {}", engine.mappings().len());
    println!(
        "  listings:   cached for {}ms{}",
        config.cache.ttl_ms,
        if config.cache.enabled { "" } else { " (disabled)" }
    );
    Ok(())
}

// ── `anymd watch` ─────────────────────────────────────────────────────────────

/// Interactive space selection on stdin.
struct PromptPicker;

#[async_trait]
impl SpacePicker for PromptPicker {
    async fn pick(&self, spaces: &[Space], current: Option<&str>) -> Option<Space> {
        println!();
        if let Some(id) = current {
            println!("The active space ({id}) is no longer available.");
        }
        println!("Select a space:");
        for (i, space) in spaces.iter().enumerate() {
            println!("  {}. {}  ({})", i + 1, space.label(), space.id);
        }
        print!("Choice [1-{}], or empty to skip: ", spaces.len());
        use std::io::Write;
        let _ = std::io::stdout().flush();

        let line = tokio::task::spawn_blocking(|| {
            let mut buf = String::new();
            std::io::stdin().read_line(&mut buf).map(|_| buf)
        })
        .await
        .ok()?
        .ok()?;

        let choice: usize = line.trim().parse().ok()?;
        spaces.get(choice.checked_sub(1)?).cloned()
    }
}

async fn cmd_watch(engine: Arc<Engine>, config: &AnymdConfig) -> Result<()> {
    use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};

    if !engine.has_active_space() {
        let chosen = engine.recover(&PromptPicker).await?;
        if chosen.is_none() {
            anyhow::bail!("no space selected; nothing to watch");
        }
    }

    let cache_dir = engine.files().root().to_path_buf();
    tokio::fs::create_dir_all(&cache_dir)
        .await
        .with_context(|| format!("creating cache dir: {}", cache_dir.display()))?;

    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    )
    .context("creating file watcher")?;
    watcher
        .watch(&cache_dir, RecursiveMode::Recursive)
        .with_context(|| format!("watching {}", cache_dir.display()))?;

    // Mappings do not survive restarts; re-associate whatever is
    // already in the cache so edits from earlier sessions sync too.
    adopt_existing(&engine, &cache_dir).await;

    info!(dir = %cache_dir.display(), "watching for saved edits");
    println!("Watching {} — press Ctrl-C to stop.", cache_dir.display());

    let debounce = Duration::from_millis(config.sync.debounce_ms.max(1));
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
    let mut tick = tokio::time::interval(debounce);
    let mut events = engine.subscribe();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("watch stopped");
                break;
            }
            Some(event) = rx.recv() => {
                use notify::EventKind;
                if matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    for path in event.paths {
                        if path.extension().is_some_and(|e| e == "md") {
                            pending.insert(path, Instant::now());
                        }
                    }
                }
            }
            _ = tick.tick() => {
                let now = Instant::now();
                let ready: Vec<PathBuf> = pending
                    .iter()
                    .filter(|(_, seen)| now.duration_since(**seen) >= debounce)
                    .map(|(path, _)| path.clone())
                    .collect();
                for path in ready {
                    pending.remove(&path);
                    push_save(&engine, &path).await;
                }
            }
            Ok(event) = events.recv() => {
                if let anymd_engine::EngineEvent::ContextInvalidated { space_id } = event {
                    warn!(space_id = %space_id, "active space invalidated; starting recovery");
                    match engine.recover(&PromptPicker).await {
                        Ok(Some(space)) => println!("Recovered to: {}", space.label()),
                        Ok(None) => println!("No space selected; edits stay local until one is."),
                        Err(e) => warn!("recovery failed: {e}"),
                    }
                }
            }
        }
    }

    Ok(())
}

/// Register mappings for cache files left over from earlier sessions.
async fn adopt_existing(engine: &Engine, cache_dir: &Path) {
    let entries = match std::fs::read_dir(cache_dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(dir = %cache_dir.display(), "scanning cache dir failed: {e}");
            return;
        }
    };
    let mut adopted = 0usize;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|e| e == "md")
            && engine.adopt_file(&path).await.is_some()
        {
            adopted += 1;
        }
    }
    if adopted > 0 {
        println!("Tracking {adopted} file(s) from earlier sessions.");
    }
}

/// Read a changed file and hand it to the engine. Failures are logged
/// and never stop the watch loop.
async fn push_save(engine: &Engine, path: &Path) {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), "reading changed file failed: {e}");
            return;
        }
    };

    let mut outcome = engine.on_save(path, &content).await;
    if outcome == SaveOutcome::NotManaged && engine.adopt_file(path).await.is_some() {
        outcome = engine.on_save(path, &content).await;
    }

    match outcome {
        SaveOutcome::NotManaged => {}
        SaveOutcome::Synced => println!("synced: {}", path.display()),
        SaveOutcome::ContextLost => {
            // Recovery runs off the ContextInvalidated event.
        }
        SaveOutcome::Failed(reason) => {
            warn!(path = %path.display(), "sync failed: {reason}");
        }
    }
}

// ── `anymd config show` ───────────────────────────────────────────────────────

fn cmd_config_show(config: &AnymdConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Utilities ─────────────────────────────────────────────────────────────────

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
