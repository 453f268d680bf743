//! Top-level CLI definition and dispatch.

use std::io::{self, BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use crossbeam_channel::{Sender, bounded};
use serde_json::{Value, json};
use thiserror::Error;

use dataset_tree::core::config::Config;
use dataset_tree::core::errors::DstError;
use dataset_tree::core::qualifier;
use dataset_tree::logger::activity::{ActivityEvent, ActivityLoggerConfig, spawn_logger};
use dataset_tree::tree::catalog::{Catalog, DatasetSource, ReloadableCatalog};
use dataset_tree::tree::dispatcher::{JOB_QUEUE_CAPACITY, ThreadDispatcher};
use dataset_tree::tree::model::TreeState;
use dataset_tree::tree::render::{LineKind, TreeView, lines, render};
use dataset_tree::tree::runtime::{RenderSink, Session, SessionEvent, UserInput};
use dataset_tree::tree::store::{StoreAction, TreeStore};

/// Inbox capacity for the interactive session.
const SESSION_INBOX_CAPACITY: usize = 256;

/// Dataset tree browser with a debounced, path-scoped refresh.
#[derive(Debug, Parser)]
#[command(
    name = "dstree",
    author,
    version,
    about = "Dataset Tree - browse datasets under a qualifier",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Print diagnostics to stderr.
    #[arg(short, long, global = true)]
    verbose: bool,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Interactive session driven by commands on stdin.
    Browse(BrowseArgs),
    /// Fetch and print the datasets under a qualifier once.
    List(ListArgs),
    /// View and check configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args)]
struct BrowseArgs {
    /// Catalog file (overrides `catalog.file`).
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,
    /// Initial path (overrides `controller.default_path`).
    #[arg(long, value_name = "QUALIFIER")]
    path: Option<String>,
    /// Session user (overrides `session.username`).
    #[arg(long, value_name = "NAME")]
    user: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ListArgs {
    /// Catalog file (overrides `catalog.file`).
    #[arg(long, value_name = "PATH")]
    catalog: Option<PathBuf>,
    /// Expand partitioned datasets and list their members.
    #[arg(long)]
    members: bool,
    /// Qualifier to list; defaults to the configured path.
    qualifier: Option<String>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print effective merged configuration.
    Show,
    /// Load and validate configuration.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input at runtime.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure.
    #[error("{0}")]
    Runtime(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Json(_) => 3,
        }
    }
}

impl From<DstError> for CliError {
    fn from(err: DstError) -> Self {
        match err {
            DstError::InvalidConfig { .. }
            | DstError::MissingConfig { .. }
            | DstError::ConfigParse { .. }
            | DstError::InvalidQualifier { .. }
            | DstError::CatalogParse { .. }
            | DstError::DatasetNotFound { .. }
            | DstError::NotPartitioned { .. } => Self::User(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Browse(args) => run_browse(cli, args),
        Command::List(args) => run_list(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// browse
// ---------------------------------------------------------------------------

/// Parsed stdin command for `browse`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum BrowseLine {
    Input(UserInput),
    /// Re-read the catalog file, then refresh.
    Reload,
    Help,
}

fn parse_browse_line(line: &str) -> Result<Option<BrowseLine>, String> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return Ok(None);
    }
    let (verb, rest) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(v, r)| (v, r.trim()));

    let parsed = match verb.to_ascii_lowercase().as_str() {
        // `path` with no argument clears the field.
        "path" | "p" => BrowseLine::Input(UserInput::EditPath(rest.to_string())),
        "refresh" | "r" => BrowseLine::Input(UserInput::Refresh),
        "submit" | "s" => BrowseLine::Input(UserInput::Submit),
        "toggle" | "t" => {
            if rest.is_empty() {
                return Err("toggle needs a dataset name".to_string());
            }
            BrowseLine::Input(UserInput::Toggle(rest.to_uppercase()))
        }
        "show" => BrowseLine::Input(UserInput::Show),
        "quit" | "q" | "exit" => BrowseLine::Input(UserInput::Quit),
        "reload" => BrowseLine::Reload,
        "help" | "?" => BrowseLine::Help,
        other => return Err(format!("unknown command {other:?} (try `help`)")),
    };
    Ok(Some(parsed))
}

const BROWSE_HELP: &str = "commands: path <Q> | refresh | submit | toggle <NAME> | show | reload | quit";

/// Prints each presented view to stdout.
struct StdoutSink {
    mode: OutputMode,
}

impl RenderSink for StdoutSink {
    fn present(&mut self, view: &TreeView) {
        let result = match self.mode {
            OutputMode::Human => print_view_human(view),
            OutputMode::Json => serde_json::to_value(view)
                .map_err(CliError::from)
                .and_then(|value| write_json_line(&json!({ "command": "browse", "view": value }))),
        };
        if let Err(e) = result {
            eprintln!("[DST-CLI] failed to present view: {e}");
        }
    }
}

fn run_browse(cli: &Cli, args: &BrowseArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(user) = &args.user {
        config.session.username = user.trim().to_string();
    }
    if let Some(path) = &args.path {
        config.controller.default_path = path.clone();
    }
    config.validate()?;

    let catalog_path = args.catalog.clone().unwrap_or_else(|| config.catalog.file.clone());
    let catalog = Arc::new(ReloadableCatalog::open(&catalog_path)?);
    if cli.verbose {
        eprintln!(
            "[DST-CLI] config={} catalog={} datasets={}",
            config.source.display(),
            catalog_path.display(),
            catalog.len()
        );
    }

    let logger = if config.logging.enabled {
        Some(spawn_logger(ActivityLoggerConfig {
            jsonl_config: config.jsonl_config(),
            ..ActivityLoggerConfig::default()
        })?)
    } else {
        None
    };

    let (tx, rx) = bounded::<SessionEvent>(SESSION_INBOX_CAPACITY);
    let dispatcher = ThreadDispatcher::spawn(
        Arc::clone(&catalog) as Arc<dyn DatasetSource>,
        JOB_QUEUE_CAPACITY,
        tx.clone(),
    )?;

    let mut initial = TreeState::for_user(config.session.username.clone());
    initial.validated = config.session.validated;
    let mut session = Session::new(
        initial,
        config.controller_settings(),
        dispatcher,
        StdoutSink {
            mode: output_mode(cli),
        },
    );
    if let Some((handle, _)) = &logger {
        handle.send(ActivityEvent::SessionStarted {
            version: env!("CARGO_PKG_VERSION").to_string(),
            config_hash: config.stable_hash()?,
            username: config.session.username.clone(),
        });
        session = session.with_logger(handle.clone());
    }

    // Reader thread: stdin lines -> session inbox. EOF quits.
    let reader_catalog = Arc::clone(&catalog);
    let verbose = cli.verbose;
    thread::Builder::new()
        .name("dstree-stdin".to_string())
        .spawn(move || read_stdin_commands(&tx, &reader_catalog, verbose))
        .map_err(|e| CliError::Runtime(format!("failed to spawn stdin reader: {e}")))?;

    let outcome = session.run(&rx);

    if let Some((handle, join)) = logger {
        handle.shutdown();
        let _ = join.join();
    }
    outcome.map(|_| ()).map_err(CliError::from)
}

fn read_stdin_commands(tx: &Sender<SessionEvent>, catalog: &ReloadableCatalog, verbose: bool) {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let Ok(line) = line else {
            break;
        };
        let event = match parse_browse_line(&line) {
            Ok(None) => continue,
            Ok(Some(BrowseLine::Input(input))) => input,
            Ok(Some(BrowseLine::Help)) => {
                eprintln!("{BROWSE_HELP}");
                continue;
            }
            Ok(Some(BrowseLine::Reload)) => {
                match catalog.reload() {
                    Ok(count) if verbose => {
                        eprintln!("[DST-CLI] reloaded {count} datasets from {}", catalog.path().display());
                    }
                    Ok(_) => {}
                    Err(e) => eprintln!("dstree: {e}"),
                }
                UserInput::Refresh
            }
            Err(message) => {
                eprintln!("dstree: {message}");
                continue;
            }
        };
        let quitting = event == UserInput::Quit;
        if tx.send(SessionEvent::Input(event)).is_err() || quitting {
            return;
        }
    }
    let _ = tx.send(SessionEvent::Input(UserInput::Quit));
}

// ---------------------------------------------------------------------------
// list
// ---------------------------------------------------------------------------

fn run_list(cli: &Cli, args: &ListArgs) -> Result<(), CliError> {
    let config = Config::load(cli.config.as_deref())?;
    let catalog_path = args.catalog.clone().unwrap_or_else(|| config.catalog.file.clone());
    let catalog = Catalog::load(&catalog_path)?;

    let path = args.qualifier.as_deref().map_or_else(
        || config.resolved_default_path(),
        |raw| qualifier::normalize(raw, config.controller.uppercase_paths),
    );
    if cli.verbose {
        eprintln!(
            "[DST-CLI] listing {path:?} from {} ({} datasets)",
            catalog_path.display(),
            catalog.len()
        );
    }

    let (view, failure) = list_view(&catalog, &config, &path, args.members);
    match output_mode(cli) {
        OutputMode::Human => print_view_human(&view)?,
        OutputMode::Json => {
            let mut payload = json!({
                "command": "list",
                "path": path,
                "view": serde_json::to_value(&view)?,
            });
            if let Some(err) = &failure {
                payload["error"] = json!({ "code": err.code(), "message": err.to_string() });
            }
            write_json_line(&payload)?;
        }
    }
    failure.map_or(Ok(()), |err| Err(CliError::from(err)))
}

/// One synchronous fetch through the store, so `list` renders exactly what a
/// settled session would.
fn list_view(
    source: &dyn DatasetSource,
    config: &Config,
    path: &str,
    with_members: bool,
) -> (TreeView, Option<DstError>) {
    let mut initial = TreeState::for_user(config.session.username.clone());
    initial.validated = config.session.validated;
    let mut store = TreeStore::new(initial);
    store.apply(StoreAction::SetPath(path.to_string()));
    store.apply(StoreAction::FetchStarted(path.to_string()));

    let failure = match source.list_children(path) {
        Ok(children) => {
            store.apply(StoreAction::ChildrenLoaded {
                path: path.to_string(),
                children,
            });
            None
        }
        Err(err) => {
            store.apply(StoreAction::FetchFailed {
                path: path.to_string(),
                message: err.to_string(),
            });
            Some(err)
        }
    };

    if with_members {
        let partitioned: Vec<String> = store
            .state()
            .children
            .iter()
            .filter(|(_, child)| child.organization.has_members())
            .map(|(id, _)| id.clone())
            .collect();
        for child in partitioned {
            store.apply(StoreAction::ToggleChild(child.clone()));
            let action = match source.list_members(&child) {
                Ok(members) => StoreAction::MembersLoaded { child, members },
                Err(err) => StoreAction::MembersFailed {
                    child,
                    message: err.to_string(),
                },
            };
            store.apply(action);
        }
    }

    (render(store.state()), failure)
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Runtime(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    write_json_line(&json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                        "resolved_default_path": config.resolved_default_path(),
                    }))?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.source.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.source.to_string_lossy(),
                            "hash": hash,
                        }))?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => eprintln!("Configuration is INVALID: {e}"),
                    OutputMode::Json => {
                        write_json_line(&json!({
                            "command": "config validate",
                            "valid": false,
                            "error": e.to_string(),
                        }))?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// output helpers
// ---------------------------------------------------------------------------

fn print_view_human(view: &TreeView) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    for line in lines(view) {
        let styled = match line.kind {
            LineKind::Header => line.text.bold(),
            LineKind::Node => line.text.normal(),
            LineKind::Member => line.text.cyan(),
            LineKind::Placeholder => line.text.dimmed(),
            LineKind::NotFound => line.text.yellow(),
            LineKind::Status => line.text.red(),
        };
        writeln!(stdout, "{styled}")?;
    }
    stdout.flush()?;
    Ok(())
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    stdout.flush()?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DSTREE_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
