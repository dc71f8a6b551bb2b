//! CLI entry point for `email-to-epub`.

use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use email_to_epub::attachments::DiskExtractor;
use email_to_epub::config::{self, Config};
use email_to_epub::error::ConvertError;
use email_to_epub::fetch::HttpFetcher;
use email_to_epub::pipeline::{ConvertOptions, Converter};

/// Convert .eml files into an EPUB book, embedding remote and inline images.
#[derive(Parser)]
#[command(name = "email-to-epub", version, about)]
struct Cli {
    /// Email files to convert. Defaults to every *.eml in the current directory.
    #[arg(value_name = "EML")]
    emails: Vec<PathBuf>,

    /// Cover image (defaults to a built-in placeholder)
    #[arg(long, value_name = "PATH")]
    cover: Option<PathBuf>,

    /// Book title
    #[arg(long)]
    title: Option<String>,

    /// Book author
    #[arg(long)]
    author: Option<String>,

    /// Output file; must not exist
    #[arg(short, long, value_name = "PATH", default_value = "output.epub")]
    output: PathBuf,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print shell completions and exit
    #[arg(long, value_enum, value_name = "SHELL", exclusive = true)]
    completions: Option<clap_complete::Shell>,

    /// Print a man page and exit
    #[arg(long, exclusive = true)]
    manpage: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(shell) = cli.completions {
        return cmd_completions(shell);
    }
    if cli.manpage {
        return cmd_manpage();
    }

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

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(cmd_convert(cli, &config))
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
        let file_appender = tracing_appender::rolling::never(&log_dir, "email-to-epub.log");
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

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "email-to-epub", &mut std::io::stdout());
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

/// Convert the selected emails, stopping cleanly on Ctrl-C.
async fn cmd_convert(cli: Cli, config: &Config) -> anyhow::Result<()> {
    let emails = expand_inputs(&cli.emails, Path::new("."))?;
    if emails.is_empty() {
        return Err(ConvertError::NoInput.into());
    }

    let mut options = ConvertOptions::from_config(config, cli.output);
    if let Some(title) = cli.title {
        options.title = title;
    }
    if let Some(author) = cli.author {
        options.author = author;
    }
    if cli.cover.is_some() {
        options.cover = cli.cover;
    }

    let extractor = DiskExtractor::new(&options.attachments_dir);
    let mut fetcher = HttpFetcher::new(&options.fetch, &options.images_dir)?;
    let verbose = cli.verbose > 0;
    let bar = if verbose {
        fetcher = fetcher.with_progress(MultiProgress::new());
        ProgressBar::hidden()
    } else {
        email_bar(emails.len() as u64)
    };
    let mut converter = Converter::with_parts(options, fetcher, extractor);
    let report = |done: usize, _total: usize| bar.set_position(done as u64);

    let summary = tokio::select! {
        result = converter.run(&emails, Some(&report)) => result,
        _ = tokio::signal::ctrl_c() => Err(ConvertError::Cancelled),
    };
    bar.finish_and_clear();

    let summary = summary?;
    println!("{summary}");
    Ok(())
}

/// Resolve the positional arguments to a list of email files.
///
/// No arguments, or a literal `*.eml` the shell did not expand, means every
/// `.eml` file in `dir`, sorted by name.
fn expand_inputs(args: &[PathBuf], dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let wants_glob = args.is_empty() || (args.len() == 1 && args[0] == Path::new("*.eml"));
    if !wants_glob {
        return Ok(args.to_vec());
    }

    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_eml = path
            .extension()
            .is_some_and(|e| e.eq_ignore_ascii_case("eml"));
        if is_eml && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

fn email_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Converting [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
            .expect("valid template")
            .progress_chars("#>-"),
    );
    pb
}
