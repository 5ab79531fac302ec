use std::io::{IsTerminal, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hunkwise_core::{ChangeSet, HunkwiseConfig, HunkwiseError, OutputFormat, Provider, ScorePolicy};
use hunkwise_diff::git::{ingest, resolve_default_base_ref, DiffRequest, DiffTarget};
use hunkwise_diff::parser::parse_diff;
use hunkwise_diff::report::Report;
use hunkwise_diff::risk::analyze;
use hunkwise_diff::stats::DiffStats;
use hunkwise_enrich::background::spawn_background_analysis;
use hunkwise_enrich::holder::SnapshotHolder;
use hunkwise_enrich::llm::LlmClient;
use hunkwise_enrich::pipeline::EnrichOptions;
use hunkwise_enrich::scorer::{LlmScorer, RiskScorer};
use hunkwise_enrich::summary::{describe_all, Describe};
use indicatif::{ProgressBar, ProgressStyle};
use miette::{miette, Context, IntoDiagnostic, Result};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const CONFIG_FILE: &str = ".hunkwise.toml";

#[derive(Parser)]
#[command(
    name = "hunkwise",
    version,
    about = "Triage a diff: structured hunks, risk scores, optional AI re-scoring",
    long_about = "hunkwise turns a git comparison or a unified diff into per-file change\n\
                   records, scores each file's review risk with deterministic heuristics,\n\
                   and can re-score them through an AI backend.\n\n\
                   Examples:\n  \
                     hunkwise analyze                      Diff main...HEAD in the current repo\n  \
                     hunkwise analyze --staged --ai        Score staged changes with AI\n  \
                     git diff | hunkwise analyze           Analyze a diff from stdin\n  \
                     hunkwise stats --file changes.patch   Aggregate statistics only\n  \
                     hunkwise doctor                       Check setup and AI backend"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (default: .hunkwise.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(
        long,
        global = true,
        default_value = "text",
        long_help = "Output format for command results.\n\n\
                       Formats:\n  \
                         text      Human-readable tables and summaries (default)\n  \
                         json      Machine-readable JSON with camelCase keys\n  \
                         markdown  GitHub-flavored Markdown"
    )]
    format: OutputFormat,

    /// Enable debug logging on stderr (RUST_LOG overrides)
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Analyze changes and rank files by review risk
    #[command(long_about = "Analyze changes and rank files by review risk.\n\n\
        Reads a unified diff from --file or stdin, or diffs the repository\n\
        (base...head, --staged, or --unstaged). Every file gets a heuristic risk\n\
        score and semantic group; --ai re-scores them through the configured\n\
        backend. AI failures are reported, and heuristic scores are kept.\n\n\
        Examples:\n  hunkwise analyze --base develop\n  hunkwise analyze --unstaged --ai --provider ollama")]
    Analyze {
        #[command(flatten)]
        source: SourceArgs,

        /// Re-score files with the configured AI backend
        #[arg(long)]
        ai: bool,

        /// Also ask the AI backend for a short summary of each file and hunk
        #[arg(long, requires = "ai")]
        summarize: bool,

        /// Also ask the AI backend for a review checklist per file
        #[arg(long, requires = "ai")]
        checklist: bool,

        /// AI provider (overrides config and HUNKWISE_AI_PROVIDER)
        #[arg(long)]
        provider: Option<Provider>,

        /// Model name (overrides config and environment)
        #[arg(long)]
        model: Option<String>,

        /// Parallel AI requests (default: per provider)
        #[arg(long)]
        concurrency: Option<usize>,

        /// Blend AI and heuristic scores instead of replacing
        #[arg(long)]
        blend: bool,
    },
    /// Print aggregate statistics for a set of changes
    Stats {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Create a default .hunkwise.toml in the current directory
    Init,
    /// Check repository, configuration, and AI backend availability
    Doctor,
}

#[derive(Args)]
struct SourceArgs {
    /// Repository to diff (default: current directory)
    #[arg(long)]
    repo: Option<PathBuf>,

    /// Base ref of a range diff (default: [diff].base)
    #[arg(long, conflicts_with_all = ["staged", "unstaged"])]
    base: Option<String>,

    /// Head ref of a range diff (default: [diff].head)
    #[arg(long, conflicts_with_all = ["staged", "unstaged"])]
    head: Option<String>,

    /// Diff HEAD against the index
    #[arg(long, conflicts_with = "unstaged")]
    staged: bool,

    /// Diff the index against the working tree
    #[arg(long)]
    unstaged: bool,

    /// Read a unified diff from this file instead of git
    #[arg(long, conflicts_with_all = ["repo", "staged", "unstaged"])]
    file: Option<PathBuf>,

    /// Unchanged context lines around each hunk (default: [diff].context_lines)
    #[arg(long)]
    context_lines: Option<u32>,
}

impl SourceArgs {
    fn wants_git(&self) -> bool {
        self.repo.is_some()
            || self.staged
            || self.unstaged
            || self.base.is_some()
            || self.head.is_some()
            || std::io::stdin().is_terminal()
    }
}

fn load_config(path: Option<&Path>) -> Result<HunkwiseConfig> {
    let mut config = match path {
        Some(path) => HunkwiseConfig::from_file(path)
            .into_diagnostic()
            .wrap_err_with(|| format!("loading {}", path.display()))?,
        None => {
            let default_path = Path::new(CONFIG_FILE);
            if default_path.exists() {
                HunkwiseConfig::from_file(default_path)
                    .into_diagnostic()
                    .wrap_err_with(|| format!("loading {CONFIG_FILE}"))?
            } else {
                HunkwiseConfig::default()
            }
        }
    };
    config.apply_env();
    Ok(config)
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn load_change_set(source: &SourceArgs, config: &HunkwiseConfig) -> Result<ChangeSet> {
    if let Some(path) = &source.file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => HunkwiseError::FileNotFound(path.clone()),
                _ => HunkwiseError::Io(e),
            })
            .into_diagnostic()
            .wrap_err("reading diff input")?;
        return Ok(change_set_from_text(&text, source, &path.display().to_string()));
    }

    if !source.wants_git() {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .into_diagnostic()
            .wrap_err("reading stdin")?;
        return Ok(change_set_from_text(&text, source, "stdin"));
    }

    let target = if source.staged {
        DiffTarget::Staged
    } else if source.unstaged {
        DiffTarget::Unstaged
    } else {
        DiffTarget::Range {
            base: source.base.clone().unwrap_or_else(|| config.diff.base.clone()),
            head: source.head.clone().unwrap_or_else(|| config.diff.head.clone()),
        }
    };
    let repo = source.repo.clone().unwrap_or_else(|| PathBuf::from("."));
    let request = DiffRequest::new(repo, target)
        .with_context_lines(source.context_lines.unwrap_or(config.diff.context_lines));
    ingest(&request)
        .into_diagnostic()
        .wrap_err("reading changes from git")
}

fn change_set_from_text(text: &str, source: &SourceArgs, label: &str) -> ChangeSet {
    let base = source.base.clone().unwrap_or_else(|| "patch".into());
    let head = source.head.clone().unwrap_or_else(|| label.to_string());
    let mut change_set = ChangeSet::new(base, head, parse_diff(text));
    analyze(&mut change_set);
    change_set
}

fn spinner(message: String) -> Option<ProgressBar> {
    if !std::io::stderr().is_terminal() {
        return None;
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg} ({elapsed})") {
        pb.set_style(style);
    }
    pb.set_message(message);
    pb.enable_steady_tick(Duration::from_millis(120));
    Some(pb)
}

/// Run the AI pass over a published snapshot and collect what it produced.
async fn run_ai(change_set: ChangeSet, config: &HunkwiseConfig, describe: Describe) -> Result<Report> {
    if !config.llm.is_enabled() {
        return Err(miette!(
            help = "set provider under [llm] in .hunkwise.toml, HUNKWISE_AI_PROVIDER, or --provider",
            "--ai needs an AI provider"
        ));
    }

    let client = LlmClient::new(&config.llm).into_diagnostic()?;
    let scorer: Arc<dyn RiskScorer> = Arc::new(LlmScorer::new(client.clone(), &config.analysis));
    let options = EnrichOptions::from(&config.analysis);
    let spinner = spinner(format!(
        "Scoring {} files with {} ({})...",
        change_set.files.len(),
        client.provider(),
        client.model()
    ));

    let holder = Arc::new(SnapshotHolder::new());
    let snapshot = holder.publish(change_set);
    let task = spawn_background_analysis(Arc::clone(&holder), scorer, snapshot, options);
    task.await.into_diagnostic().wrap_err("AI analysis task failed")?;

    let ai_error = holder.last_error();
    let mut change_set = holder
        .get()
        .map(|snapshot| (*snapshot).clone())
        .ok_or_else(|| miette!("AI analysis produced no snapshot"))?;

    if describe != Describe::default() && ai_error.is_none() {
        if let Some(pb) = &spinner {
            pb.set_message("Summarizing changes...");
        }
        let concurrency = config
            .analysis
            .concurrency
            .unwrap_or_else(|| client.concurrency());
        let failures = describe_all(Arc::new(client), &mut change_set.files, concurrency, describe).await;
        debug!(failed = failures.len(), "summaries finished");
    }

    if let Some(pb) = spinner {
        match &ai_error {
            Some(_) => pb.finish_with_message("AI analysis failed; heuristic scores kept"),
            None => pb.finish_with_message("Done"),
        }
    }

    Ok(Report::new(change_set).with_ai_error(ai_error))
}

fn print_report(report: &Report, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(report).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", report.to_markdown()),
        OutputFormat::Text => print!("{report}"),
    }
    Ok(())
}

fn print_stats(stats: &DiffStats, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(stats).into_diagnostic()?);
        }
        OutputFormat::Markdown => print!("{}", stats.to_markdown()),
        OutputFormat::Text => println!("{stats}"),
    }
    Ok(())
}

#[derive(serde::Serialize)]
struct CheckResult {
    name: &'static str,
    status: &'static str,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    hint: Option<String>,
}

impl CheckResult {
    fn pass(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.into(),
            hint: None,
        }
    }

    fn fail(name: &'static str, detail: impl Into<String>, hint: impl Into<String>) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.into(),
            hint: Some(hint.into()),
        }
    }

    fn info(name: &'static str, detail: impl Into<String>) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.into(),
            hint: None,
        }
    }

    fn symbol(&self, use_color: bool) -> &'static str {
        match (self.status, use_color) {
            ("pass", true) => "\x1b[32m\u{2713}\x1b[0m",
            ("pass", false) => "\u{2713}",
            ("fail", true) => "\x1b[31m\u{2717}\x1b[0m",
            ("fail", false) => "\u{2717}",
            (_, true) => "\x1b[33m~\x1b[0m",
            (_, false) => "~",
        }
    }
}

async fn run_doctor(config: &HunkwiseConfig, config_path: Option<&Path>, format: OutputFormat) -> Result<()> {
    let mut checks: Vec<CheckResult> = Vec::new();

    // 1. Git repository
    match git2::Repository::discover(".") {
        Ok(repo) => {
            let root = repo
                .workdir()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| repo.path().display().to_string());
            checks.push(CheckResult::pass("git_repository", format!("detected at {root}")));
            checks.push(CheckResult::info(
                "default_base",
                format!(
                    "{} (fallback when [diff].base is missing)",
                    resolve_default_base_ref(&repo)
                ),
            ));
        }
        Err(_) => checks.push(CheckResult::fail(
            "git_repository",
            "not a git repository",
            "run hunkwise from inside a git repository, or pass --file",
        )),
    }

    // 2. Config file
    let path = config_path.unwrap_or(Path::new(CONFIG_FILE));
    if path.exists() {
        checks.push(CheckResult::pass("config_file", format!("{} found", path.display())));
    } else {
        checks.push(CheckResult::fail(
            "config_file",
            format!("{} not found", path.display()),
            "run 'hunkwise init' to create a default config",
        ));
    }

    // 3. AI provider, key, and reachability
    let llm = &config.llm;
    if !llm.is_enabled() {
        checks.push(CheckResult::info(
            "ai_provider",
            "none (heuristic scoring only)",
        ));
    } else {
        let concurrency = config
            .analysis
            .concurrency
            .unwrap_or_else(|| llm.provider.default_concurrency());
        checks.push(CheckResult::pass(
            "ai_provider",
            format!(
                "{} (model: {}, {} parallel)",
                llm.provider,
                llm.model(),
                concurrency
            ),
        ));

        let key_var = match llm.provider {
            Provider::Anthropic => Some("ANTHROPIC_API_KEY"),
            Provider::OpenAi => Some("OPENAI_API_KEY"),
            _ => None,
        };
        if let Some(var) = key_var {
            if llm.api_key.is_some() {
                checks.push(CheckResult::pass("ai_api_key", "configured"));
            } else {
                checks.push(CheckResult::fail(
                    "ai_api_key",
                    "no API key",
                    format!("set {var} or api_key under [llm]"),
                ));
            }
        }

        let budget = config.analysis.preflight_timeout();
        let outcome = match LlmClient::new(llm) {
            Ok(client) => tokio::time::timeout(budget, client.preflight())
                .await
                .unwrap_or_else(|_| {
                    Err(HunkwiseError::Timeout {
                        what: "availability check".into(),
                        after: budget,
                    })
                }),
            Err(err) => Err(err),
        };
        match outcome {
            Ok(()) => checks.push(CheckResult::pass(
                "ai_preflight",
                format!("{} ready at {}", llm.provider, llm.base_url()),
            )),
            Err(err) => checks.push(CheckResult::fail(
                "ai_preflight",
                err.to_string(),
                "start the backend or check base_url and model under [llm]",
            )),
        }
    }

    // 4. Scoring policy
    let policy = match config.analysis.score_policy {
        ScorePolicy::Replace => "replace",
        ScorePolicy::Blend => "blend",
    };
    checks.push(CheckResult::info(
        "score_policy",
        format!(
            "{policy} (preflight {}s, per file {}s)",
            config.analysis.preflight_timeout_secs, config.analysis.per_file_timeout_secs
        ),
    ));

    match format {
        OutputFormat::Json => {
            let json = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "checks": checks,
            });
            println!("{}", serde_json::to_string_pretty(&json).into_diagnostic()?);
        }
        _ => {
            let use_color = std::io::stdout().is_terminal() && std::env::var("NO_COLOR").is_err();
            println!("hunkwise v{} environment check\n", env!("CARGO_PKG_VERSION"));

            for check in &checks {
                let label = check.name.replace('_', " ");
                println!("  {} {label:<16} {}", check.symbol(use_color), check.detail);
                if let Some(hint) = &check.hint {
                    println!("    hint: {hint}");
                }
            }

            let passed = checks.iter().filter(|c| c.status == "pass").count();
            let failed = checks.iter().filter(|c| c.status == "fail").count();
            let info = checks.iter().filter(|c| c.status == "info").count();
            println!("\n{passed} checks passed, {failed} failed, {info} info");
        }
    }

    Ok(())
}

const DEFAULT_CONFIG: &str = r#"# hunkwise configuration

[llm]
# AI backend for --ai: none | anthropic | openai | ollama | lmstudio
provider = "none"
# model = "qwen2.5-coder-7b-instruct"
# base_url = "http://localhost:1234/v1"
# API keys are read from ANTHROPIC_API_KEY, OPENAI_API_KEY, or LMSTUDIO_API_KEY

[analysis]
# concurrency = 3
preflight_timeout_secs = 4
per_file_timeout_secs = 25
# replace: AI score wins; blend: confidence-weighted mix with the heuristic score
score_policy = "replace"
max_prompt_chars = 2200

[diff]
base = "main"
head = "HEAD"
context_lines = 3
"#;

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let Some(command) = cli.command else {
        println!("hunkwise {}: diff triage", env!("CARGO_PKG_VERSION"));
        println!("Run 'hunkwise --help' for commands.");
        return Ok(());
    };

    match command {
        Command::Init => {
            let path = Path::new(CONFIG_FILE);
            if path.exists() {
                miette::bail!("{CONFIG_FILE} already exists");
            }
            std::fs::write(path, DEFAULT_CONFIG).into_diagnostic()?;
            println!("Created {CONFIG_FILE} with default configuration");
        }
        Command::Analyze {
            source,
            ai,
            summarize,
            checklist,
            provider,
            model,
            concurrency,
            blend,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(provider) = provider {
                config.llm.provider = provider;
            }
            if model.is_some() {
                config.llm.model = model;
            }
            if concurrency.is_some() {
                config.analysis.concurrency = concurrency;
            }
            if blend {
                config.analysis.score_policy = ScorePolicy::Blend;
            }

            let change_set = load_change_set(&source, &config)?;
            debug!(files = change_set.files.len(), "heuristic analysis complete");

            let report = if ai && !change_set.files.is_empty() {
                let describe = Describe {
                    file_summaries: summarize,
                    hunk_summaries: summarize,
                    checklists: checklist,
                };
                run_ai(change_set, &config, describe).await?
            } else {
                Report::new(change_set)
            };
            print_report(&report, cli.format)?;
        }
        Command::Stats { source } => {
            let config = load_config(cli.config.as_deref())?;
            let change_set = load_change_set(&source, &config)?;
            print_stats(&DiffStats::from_change_set(&change_set), cli.format)?;
        }
        Command::Doctor => {
            let config = load_config(cli.config.as_deref())?;
            run_doctor(&config, cli.config.as_deref(), cli.format).await?;
        }
    }

    Ok(())
}
