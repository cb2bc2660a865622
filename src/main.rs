//! CLI entry point for `mailsift`.

use std::path::PathBuf;
use std::time::Instant;

use clap::error::{ContextKind, ContextValue, ErrorKind};
use clap::{Args, CommandFactory, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use mailsift::config::{self, Config};
use mailsift::prefs::{LayeredPreferences, PreferenceResolver};
use mailsift::render::{self, RenderOptions, View};
use mailsift::search::parser::{QueryFlags, QueryParser};
use mailsift::search::query::{GroupBy, OutputFormat, Query, SortBy};
use mailsift::source::{self, RecordSource};
use mailsift::{fuzzy, search, time_range, unsubscribe};

#[derive(Parser)]
#[command(
    name = "mailsift",
    version,
    about = "Query, filter and summarize email from the terminal",
    after_help = "Positional tokens may be key=value pairs (from=alice min-size=5MB \
                  range=\"last week\") or free text with AND / OR / NOT."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// JSON / JSON Lines record file, or a directory of .eml files
    #[arg(short, long, global = true, env = "MAILSIFT_INPUT", value_name = "PATH")]
    input: Option<PathBuf>,

    /// Only records in this folder (inbox, sent, drafts, ...)
    #[arg(long, global = true, value_name = "NAME")]
    folder: Option<String>,

    /// Maximum records to fetch from the source (0 = no limit)
    #[arg(long, global = true, value_name = "N")]
    limit: Option<usize>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// List matching emails
    Search {
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        aggregation: AggregationArgs,
    },
    /// Grouped statistics and activity charts for matching emails
    Stats {
        #[command(flatten)]
        query: QueryArgs,
        #[command(flatten)]
        aggregation: AggregationArgs,
    },
    /// Period report: summary, top senders and every email in a time range
    Report {
        #[command(flatten)]
        query: QueryArgs,
        /// Number of top senders to show
        #[arg(long, value_name = "N")]
        top_n: Option<usize>,
    },
    /// Collect unsubscribe links from matching emails, grouped by sender
    Unsubscribe {
        #[command(flatten)]
        query: QueryArgs,
    },
    /// List the named time ranges and what they resolve to right now
    Ranges,
    /// Write a default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

/// Record filters shared by every query command.
#[derive(Args, Debug, Default)]
struct QueryArgs {
    /// Sender address or name (fuzzy)
    #[arg(long)]
    from: Option<String>,

    /// Recipient address or name (fuzzy)
    #[arg(long)]
    to: Option<String>,

    /// Subject text (fuzzy)
    #[arg(long)]
    subject: Option<String>,

    /// Only the last N days
    #[arg(long, value_name = "N")]
    days: Option<u64>,

    /// Named range ("yesterday", "last week") or YYYY-MM-DD,YYYY-MM-DD
    #[arg(long, value_name = "RANGE")]
    range: Option<String>,

    /// Only unread emails
    #[arg(long)]
    unread: bool,

    /// Minimum size (e.g. 500k, 5MB)
    #[arg(long, value_name = "SIZE")]
    min_size: Option<String>,

    /// Maximum size (e.g. 500k, 5MB)
    #[arg(long, value_name = "SIZE")]
    max_size: Option<String>,

    /// Require (or with =false, forbid) attachments
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_name = "BOOL")]
    has_attachments: Option<bool>,

    /// Sender domains to include (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "DOMAINS")]
    domains: Vec<String>,

    /// Sender domains to exclude (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "DOMAINS")]
    exclude_domains: Vec<String>,

    /// Words that must appear in subject or body (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "WORDS")]
    keywords: Vec<String>,

    /// Words that must not appear in subject or body (comma separated)
    #[arg(long, value_delimiter = ',', value_name = "WORDS")]
    exclude_words: Vec<String>,

    /// Boolean free-text query, e.g. "urgent OR (invoice AND NOT paid)"
    #[arg(short, long, value_name = "QUERY")]
    query: Option<String>,

    /// Minimum similarity for fuzzy matches, 0.0 to 1.0
    #[arg(long, value_name = "T")]
    fuzzy_threshold: Option<f64>,

    /// Exact substring matching only
    #[arg(long)]
    no_fuzzy: bool,

    /// Case-sensitive matching (implies --no-fuzzy)
    #[arg(long)]
    case_sensitive: bool,

    /// Output format
    #[arg(long, value_enum)]
    format: Option<OutputFormat>,

    /// key=value options and free-text words
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "TOKENS")]
    tokens: Vec<String>,
}

/// Grouping and ordering options.
#[derive(Args, Debug, Default)]
struct AggregationArgs {
    /// Group statistics by this key
    #[arg(long, value_enum)]
    group_by: Option<GroupBy>,

    /// Order of listed emails
    #[arg(long, value_enum)]
    sort_by: Option<SortBy>,

    /// Length of ranked lists
    #[arg(long, value_name = "N")]
    top_n: Option<usize>,
}

impl QueryArgs {
    fn to_flags(&self, cli: &Cli) -> QueryFlags {
        QueryFlags {
            from: self.from.clone(),
            to: self.to.clone(),
            subject: self.subject.clone(),
            days: self.days,
            range: self.range.clone(),
            unread: self.unread.then_some(true),
            min_size: self.min_size.clone(),
            max_size: self.max_size.clone(),
            has_attachments: self.has_attachments,
            folder: cli.folder.clone(),
            domains: self.domains.clone(),
            exclude_domains: self.exclude_domains.clone(),
            keywords: self.keywords.clone(),
            exclude_words: self.exclude_words.clone(),
            format: self.format,
            fuzzy_threshold: self.fuzzy_threshold,
            no_fuzzy: self.no_fuzzy.then_some(true),
            case_sensitive: self.case_sensitive.then_some(true),
            limit: cli.limit,
            query: self.query.clone(),
            ..QueryFlags::default()
        }
    }
}

impl AggregationArgs {
    fn apply(&self, flags: &mut QueryFlags) {
        flags.group_by = self.group_by;
        flags.sort_by = self.sort_by;
        flags.top_n = self.top_n;
    }
}

fn main() -> anyhow::Result<()> {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.kind() == ErrorKind::InvalidSubcommand => {
            report_unknown_command(&e);
            std::process::exit(2);
        }
        Err(e) => e.exit(),
    };

    // Load configuration
    let config = config::load_config();

    // Configure logging: stderr + optional log file
    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    setup_logging(log_level, &config);

    match &cli.command {
        Commands::Search { query, aggregation } => {
            let mut flags = query.to_flags(&cli);
            aggregation.apply(&mut flags);
            cmd_search(&cli, &config, &query.tokens, flags)
        }
        Commands::Stats { query, aggregation } => {
            let mut flags = query.to_flags(&cli);
            aggregation.apply(&mut flags);
            cmd_stats(&cli, &config, &query.tokens, flags)
        }
        Commands::Report { query, top_n } => {
            let mut flags = query.to_flags(&cli);
            flags.top_n = *top_n;
            cmd_report(&cli, &config, &query.tokens, flags)
        }
        Commands::Unsubscribe { query } => {
            cmd_unsubscribe(&cli, &config, &query.tokens, query.to_flags(&cli))
        }
        Commands::Ranges => cmd_ranges(),
        Commands::InitConfig { force } => cmd_init_config(&config, *force),
        Commands::Completions { shell } => cmd_completions(*shell),
        Commands::Manpage => cmd_manpage(),
    }
}

/// Print clap's error line followed by close command names, if any.
fn report_unknown_command(err: &clap::Error) {
    let input = match err.get(ContextKind::InvalidSubcommand) {
        Some(ContextValue::String(s)) => s.clone(),
        _ => String::new(),
    };
    let cmd = Cli::command();
    let names: Vec<&str> = cmd
        .get_subcommands()
        .map(|c| c.get_name())
        .filter(|n| *n != "help")
        .collect();

    eprintln!("error: unknown command '{input}'");
    let suggestions = fuzzy::suggest(&input, &names, 3);
    if !suggestions.is_empty() {
        eprintln!();
        eprintln!("  Did you mean:");
        for name in suggestions {
            eprintln!("    mailsift {name}");
        }
    }
    eprintln!();
    eprintln!("For more information, try 'mailsift --help'.");
}

/// Set up tracing with stderr output and optional file logging.
fn setup_logging(level: &str, config: &Config) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    // Try to set up file logging
    let log_dir = config::cache_dir(config);
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::never(&log_dir, config::LOG_FILE);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        // Fall back to stderr only
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Parse the query, failing before any record is read.
fn parse_query(config: &Config, tokens: &[String], flags: &QueryFlags) -> anyhow::Result<Query> {
    let now = chrono::Local::now().fixed_offset();
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let prefs = LayeredPreferences::discover(config, &cwd);

    let mut parser = QueryParser::new(now).with_defaults(config.query.to_defaults());
    if config.query.restrict_to_account {
        tracing::debug!(
            layer = prefs.source().unwrap_or("none"),
            address = %prefs.default_to_address().unwrap_or_default(),
            "Restricting to account"
        );
        parser = parser.with_preferences(&prefs);
    }

    match parser.parse(tokens, flags) {
        Ok(query) => Ok(query),
        Err(e) if e.is_parse_error() => {
            eprintln!("error: {}: {e}", e.kind());
            std::process::exit(2);
        }
        Err(e) => Err(e.into()),
    }
}

/// Open the record source named by `--input` or `general.input`.
fn open_source(cli: &Cli, config: &Config) -> anyhow::Result<Box<dyn RecordSource>> {
    let Some(path) = cli.input.as_ref().or(config.general.input.as_ref()) else {
        anyhow::bail!(
            "No record source given. Pass --input <PATH> or set general.input in {}",
            config::config_file_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "the config file".to_string())
        );
    };

    let start = Instant::now();
    let source = if path.is_dir() {
        let pb = ProgressBar::new(0);
        pb.set_style(
            ProgressStyle::with_template(
                "{spinner:.green} Loading [{bar:40.cyan/blue}] {pos}/{len} files ({eta})",
            )?
            .progress_chars("#>-"),
        );
        let source = source::open(
            path,
            Some(&|loaded, total| {
                pb.set_length(total);
                pb.set_position(loaded);
            }),
        );
        pb.finish_and_clear();
        source?
    } else {
        source::open(path, None)?
    };
    tracing::info!(
        source = %source.name(),
        elapsed = ?start.elapsed(),
        "Record source opened"
    );
    Ok(source)
}

fn emit(out: &str) {
    if out.ends_with('\n') {
        print!("{out}");
    } else {
        println!("{out}");
    }
}

/// List matching emails.
fn cmd_search(cli: &Cli, config: &Config, tokens: &[String], flags: QueryFlags) -> anyhow::Result<()> {
    let query = parse_query(config, tokens, &flags)?;
    let source = open_source(cli, config)?;
    let outcome = search::execute(&query, source.as_ref())?;

    let view = View::List {
        query: &query,
        records: &outcome.matched,
    };
    emit(&render::render(&view, query.format, &RenderOptions::from(&config.display))?);
    Ok(())
}

/// Grouped statistics for matching emails.
fn cmd_stats(cli: &Cli, config: &Config, tokens: &[String], flags: QueryFlags) -> anyhow::Result<()> {
    let query = parse_query(config, tokens, &flags)?;
    let source = open_source(cli, config)?;
    let outcome = search::execute(&query, source.as_ref())?;

    let view = View::Stats {
        query: &query,
        report: &outcome.report,
    };
    emit(&render::render(&view, query.format, &RenderOptions::from(&config.display))?);
    Ok(())
}

/// Period report over one time range (default `today`).
fn cmd_report(
    cli: &Cli,
    config: &Config,
    tokens: &[String],
    mut flags: QueryFlags,
) -> anyhow::Result<()> {
    if flags.range.is_none() && flags.days.is_none() && !tokens_set_time(tokens) {
        flags.range = Some("today".to_string());
    }
    flags.group_by = Some(GroupBy::Sender);
    flags.sort_by = Some(SortBy::Date);

    let query = parse_query(config, tokens, &flags)?;
    let Some(range) = query.filters.time_range.clone() else {
        anyhow::bail!("report needs a time range");
    };
    let source = open_source(cli, config)?;
    let outcome = search::execute(&query, source.as_ref())?;

    let view = View::Period {
        range: &range,
        report: &outcome.report,
        records: &outcome.matched,
        generated_at: chrono::Local::now().fixed_offset(),
    };
    emit(&render::render(&view, query.format, &RenderOptions::from(&config.display))?);
    Ok(())
}

/// Whether a positional `range=` / `days=` token will supply the time range.
fn tokens_set_time(tokens: &[String]) -> bool {
    tokens.iter().any(|t| {
        t.split_once('=').is_some_and(|(k, _)| {
            matches!(
                k.to_ascii_lowercase().replace('_', "-").as_str(),
                "range" | "time-range" | "date-range" | "days"
            )
        })
    })
}

/// Unsubscribe links among matching emails.
fn cmd_unsubscribe(
    cli: &Cli,
    config: &Config,
    tokens: &[String],
    flags: QueryFlags,
) -> anyhow::Result<()> {
    let query = parse_query(config, tokens, &flags)?;
    let source = open_source(cli, config)?;
    let outcome = search::execute(&query, source.as_ref())?;

    let senders = unsubscribe::find_links(&outcome.matched);
    tracing::info!(senders = senders.len(), "Unsubscribe scan finished");
    let view = View::Unsubscribe {
        query: &query,
        scanned: outcome.matched.len(),
        senders: &senders,
    };
    emit(&render::render(&view, query.format, &RenderOptions::from(&config.display))?);
    Ok(())
}

/// Print every named range resolved against the current time.
fn cmd_ranges() -> anyhow::Result<()> {
    let now = chrono::Local::now().fixed_offset();
    println!();
    for range in time_range::presets(now) {
        println!(
            "  {:<20} {} to {}",
            range.name,
            range.since.format("%Y-%m-%d %H:%M"),
            range.until.format("%Y-%m-%d %H:%M")
        );
    }
    println!();
    println!("  Also accepted: a day count (7), \"last N days\", YYYY-MM-DD,");
    println!("  and YYYY-MM-DD,YYYY-MM-DD (or \"to\" / \"..\" between the dates).");
    println!();
    Ok(())
}

/// Write the current configuration (defaults if none was found).
fn cmd_init_config(config: &Config, force: bool) -> anyhow::Result<()> {
    let Some(path) = config::config_file_path() else {
        anyhow::bail!("Could not determine a configuration directory");
    };
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    config::save_config(config)?;
    println!("  Wrote {}", path.display());
    Ok(())
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mailsift", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}
