use clap::{Parser, Subcommand};
use metrosite::audit::{AuditLog, FileStore};
use metrosite::config::{self, SiteConfig};
use metrosite::dispatch::{Dispatcher, Message};
use metrosite::fetch::HttpFetcher;
use metrosite::output;
use metrosite::preload::{PreloadOptions, Preloader};
use metrosite::provider::EmailJsProvider;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

fn version_string() -> &'static str {
    if env!("BUILD_ON_TAG") == "true" {
        return env!("CARGO_PKG_VERSION");
    }
    match env!("BUILD_GIT_HASH") {
        "" => "dev@unknown",
        // Leaked once at startup
        hash => &*Box::leak(format!("dev@{hash}").into_boxed_str()),
    }
}

#[derive(Parser)]
#[command(name = "metrosite")]
#[command(about = "Image preloading and contact-form delivery for the metrology site")]
#[command(long_about = "\
Image preloading and contact-form delivery for the metrology site

Commands share one config.toml (see 'metrosite gen-config'). Delivery
credentials are usually supplied through the environment:

  METROSITE_SERVICE_ID    provider service id
  METROSITE_TEMPLATE_ID   provider template id
  METROSITE_ACCOUNT_ID    provider account / public key

Every send attempt is recorded in the audit log (last 50 kept).
Set RUST_LOG=debug for detailed diagnostics on stderr.")]
#[command(version = version_string())]
struct Cli {
    /// Directory containing config.toml
    #[arg(long, default_value = ".", global = true)]
    config_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Preload resources concurrently and report which ones failed
    Preload {
        /// Resource locators (absolute URLs, or paths relative to preload.base_url)
        locators: Vec<String>,
        /// File with one locator per line ('#' starts a comment)
        #[arg(long)]
        list: Option<PathBuf>,
    },
    /// Send a contact-form message
    Send {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        body: String,
    },
    /// Show the audit log of send attempts
    Log {
        /// Remove every entry
        #[arg(long)]
        clear: bool,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = cli.config_dir;

    match cli.command {
        Command::Preload { locators, list } => {
            let site_config = config::load_config(&config_dir)?;
            let mut locators = locators;
            if let Some(list) = list {
                locators.extend(read_locator_list(&list)?);
            }
            run_preload(&site_config, locators).await
        }
        Command::Send {
            name,
            email,
            phone,
            subject,
            body,
        } => {
            let site_config = config::load_config(&config_dir)?;
            let message = Message {
                sender_name: name,
                sender_email: email,
                sender_phone: phone,
                subject,
                body,
            };
            let provider = EmailJsProvider::new(
                reqwest::Client::new(),
                Url::parse(&site_config.delivery.endpoint)?,
            );
            let audit = Arc::new(open_audit_log(&config_dir, &site_config));
            let dispatcher = Dispatcher::new(site_config.delivery.clone(), provider, audit);
            let response = dispatcher.send(&message).await?;
            output::print_send_result(&response);
            Ok(ExitCode::SUCCESS)
        }
        Command::Log { clear } => {
            let site_config = config::load_config(&config_dir)?;
            let audit = open_audit_log(&config_dir, &site_config);
            if clear {
                audit.clear()?;
                println!("Audit log cleared");
            } else {
                output::print_audit_log(&audit.entries());
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run_preload(
    site_config: &SiteConfig,
    locators: Vec<String>,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let client = reqwest::Client::builder()
        .user_agent(site_config.preload.user_agent.as_str())
        .build()?;
    let mut fetcher = HttpFetcher::new(client);
    if let Some(base) = &site_config.preload.base_url {
        fetcher = fetcher.with_base_url(Url::parse(base)?);
    }
    let preloader = Preloader::new(fetcher);

    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_preload_event(&event) {
                println!("{}", line);
            }
        }
    });

    let state = preloader
        .preload(locators, PreloadOptions::new().events(tx))
        .finished()
        .await?;
    printer.join().map_err(|_| "output thread panicked")?;
    output::print_preload_report(&state);

    if state.failed().is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

/// The audit store lives relative to the config directory.
fn open_audit_log(config_dir: &Path, site_config: &SiteConfig) -> AuditLog {
    AuditLog::new(FileStore::new(config_dir.join(&site_config.audit.store_dir)))
}

/// Read one locator per line, skipping blanks and `#` comments.
fn read_locator_list(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}
