//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tracing::info;
use url::Url;

use prodscout_ai::{OpenRouterClient, PromptContext};
use prodscout_core::{ScrapeOutput, discover_site, run_job};
use prodscout_shared::{
    AppConfig, JobConfig, JobSpec, ProgressDetail, ProgressEvent, ProgressSink, init_config,
    load_config, load_config_from,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// prodscout: find a manufacturer's products and extract them as JSON.
#[derive(Parser)]
#[command(
    name = "prodscout",
    version,
    about = "Discover product catalogues on manufacturer websites and extract structured product records.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Application config file (defaults to ~/.prodscout/prodscout.toml).
    #[arg(long, global = true, env = "PRODSCOUT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Hide the progress spinner.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run a job file (TOML or JSON) and print the records as JSON.
    Scrape {
        /// Job configuration file.
        #[arg(short, long)]
        job: PathBuf,

        /// Write the JSON array here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Override the configured content model.
        #[arg(long)]
        model: Option<String>,
    },

    /// Discover product URLs for a site without extracting them.
    Discover {
        /// Site homepage.
        url: String,

        /// Manufacturer name given to the content model.
        #[arg(short, long)]
        manufacturer: String,

        /// What to look for.
        #[arg(short, long, default_value = "Find every product this manufacturer sells.")]
        goal: String,

        /// Override the configured content model.
        #[arg(long)]
        model: Option<String>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags. Logs always go to stderr.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "warn,prodscout=info",
        1 => "warn,prodscout=debug",
        _ => "info,prodscout=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    let quiet = cli.quiet;
    match cli.command {
        Command::Scrape { job, out, model } => {
            let config = app_config(config_path.as_deref())?;
            cmd_scrape(&config, &job, out.as_deref(), model, quiet).await
        }
        Command::Discover {
            url,
            manufacturer,
            goal,
            model,
        } => {
            let config = app_config(config_path.as_deref())?;
            cmd_discover(&config, &url, manufacturer, goal, model, quiet).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path.as_deref()).await,
        },
    }
}

fn app_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

fn content_model(config: &AppConfig, model: Option<String>) -> Result<OpenRouterClient> {
    let mut config = config.clone();
    if let Some(model) = model {
        config.openrouter.default_model = model;
    }
    let client = OpenRouterClient::from_app_config(&config)?;
    info!(model = client.model(), "content model ready");
    Ok(client)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_scrape(
    config: &AppConfig,
    job_path: &Path,
    out: Option<&Path>,
    model: Option<String>,
    quiet: bool,
) -> Result<()> {
    let spec = JobSpec::load(job_path)?;
    let job = spec.compile(&config.defaults)?;

    // Only `ai` jobs talk to the content model; the key is not required otherwise.
    let client = match &job {
        JobConfig::Ai(_) => Some(Arc::new(content_model(config, model)?)),
        _ => None,
    };

    info!(job = %job_path.display(), kind = job.kind(), "running job");
    let (sink, rx) = ProgressSink::channel();
    let reporter = CliProgress::spawn(rx, quiet)?;
    let result = run_job(&job, client, &sink).await;
    drop(sink);
    reporter.finish().await;

    let output: ScrapeOutput = result?;
    let json = output.to_json_pretty()?;
    match out {
        Some(path) => {
            std::fs::write(path, format!("{json}\n"))
                .wrap_err_with(|| format!("failed to write {}", path.display()))?;
            eprintln!("Wrote {} records to {}", output.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn cmd_discover(
    config: &AppConfig,
    url: &str,
    manufacturer: String,
    goal: String,
    model: Option<String>,
    quiet: bool,
) -> Result<()> {
    let site_url = Url::parse(url).map_err(|e| eyre!("invalid URL '{url}': {e}"))?;
    let client = content_model(config, model)?;
    let ctx = PromptContext { manufacturer, goal };

    let (sink, rx) = ProgressSink::channel();
    let reporter = CliProgress::spawn(rx, quiet)?;
    let result = discover_site(&site_url, &ctx, &client, &config.defaults, &sink).await;
    drop(sink);
    reporter.finish().await;

    let discovery = result?;
    println!("{}", serde_json::to_string_pretty(&discovery)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(path: Option<&Path>) -> Result<()> {
    let config = app_config(path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Drains the progress channel into an indicatif spinner on stderr.
struct CliProgress {
    task: JoinHandle<()>,
}

impl CliProgress {
    fn spawn(mut rx: UnboundedReceiver<ProgressEvent>, quiet: bool) -> Result<Self> {
        let spinner = if quiet {
            ProgressBar::hidden()
        } else {
            let spinner = ProgressBar::new_spinner();
            spinner.set_style(
                ProgressStyle::with_template("{spinner:.cyan} [{elapsed}] {msg}")?
                    .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
            spinner.enable_steady_tick(Duration::from_millis(80));
            spinner
        };

        let task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                spinner.set_message(describe(&event));
            }
            spinner.finish_and_clear();
        });
        Ok(Self { task })
    }

    /// Wait for the channel to close and the spinner to clear.
    async fn finish(self) {
        let _ = self.task.await;
    }
}

fn describe(event: &ProgressEvent) -> String {
    match &event.detail {
        ProgressDetail::Message { message } => format!("{}: {message}", event.stage),
        ProgressDetail::Counts {
            current,
            total,
            found,
        } => format!("{}: [{current}/{total}] {found} found", event.stage),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_args_parse() {
        let cli = Cli::try_parse_from(["prodscout", "-vv", "scrape", "--job", "jobs/acme.toml", "--quiet"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(cli.quiet);
        match cli.command {
            Command::Scrape { job, out, model } => {
                assert_eq!(job, PathBuf::from("jobs/acme.toml"));
                assert!(out.is_none());
                assert!(model.is_none());
            }
            _ => panic!("expected scrape"),
        }
    }

    #[test]
    fn discover_requires_manufacturer() {
        assert!(Cli::try_parse_from(["prodscout", "discover", "https://acme.test"]).is_err());
        let cli = Cli::try_parse_from([
            "prodscout",
            "discover",
            "https://acme.test",
            "--manufacturer",
            "Acme",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::Discover { .. }));
    }

    #[test]
    fn progress_lines() {
        let counts = ProgressEvent {
            stage: "detail".into(),
            detail: ProgressDetail::Counts {
                current: 3,
                total: 10,
                found: 2,
            },
        };
        assert_eq!(describe(&counts), "detail: [3/10] 2 found");
    }
}
