//! causewatch CLI
//!
//! Runs the cause-list polling pipeline and the captcha-gated document
//! retriever from the command line.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::stream::{self, StreamExt};

use causewatch::{
    captcha::{CaptchaSolver, CookieStrategy, DocumentRetriever, RetrievalStrategy, TesseractCli},
    error::{AppError, Result},
    models::Config,
    pipeline::PollingWorker,
    storage::{LocalStore, SnapshotStore},
};

/// causewatch - Court Schedule Watcher
#[derive(Parser, Debug)]
#[command(name = "causewatch", version, about = "Court cause-list watcher and order retriever")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Storage root directory (overrides the configured one)
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the polling loop on the configured cadence
    Watch,

    /// Run exactly one poll-and-diff cycle and print the summary
    Poll,

    /// Retrieve captcha-gated documents
    Retrieve {
        /// Document identifiers to fetch
        document_ids: Vec<String>,

        /// Caller-supplied captcha code (manual fallback, single document)
        #[arg(long)]
        code: Option<String>,

        /// Output directory for downloaded documents
        #[arg(long, default_value = "downloads")]
        out: PathBuf,

        /// Use the browser-automated strategy instead of the cookie one
        #[arg(long)]
        browser: bool,

        /// Concurrent retrievals for batch mode
        #[arg(long, default_value_t = 2)]
        concurrency: usize,
    },

    /// List stored notifications
    Notifications {
        /// Only show unread notifications
        #[arg(long)]
        unread: bool,

        /// Mark one notification read by id
        #[arg(long)]
        mark_read: Option<String>,
    },

    /// Validate the configuration file
    Validate,

    /// Show current snapshot info
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn build_strategy(config: &Config, browser: bool) -> Result<Arc<dyn RetrievalStrategy>> {
    if browser {
        #[cfg(feature = "browser")]
        {
            return Ok(Arc::new(causewatch::captcha::BrowserStrategy::new(
                config.source.clone(),
                config.captcha.clone(),
            )));
        }
        #[cfg(not(feature = "browser"))]
        return Err(AppError::config(
            "built without the `browser` feature; rebuild with --features browser",
        ));
    }
    Ok(Arc::new(CookieStrategy::new(
        config.source.clone(),
        config.captcha.clone(),
    )))
}

fn output_path(out: &std::path::Path, document_id: &str) -> PathBuf {
    let name = document_id.replace(['/', '\\'], "_");
    out.join(format!("{name}.pdf"))
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = Arc::new(Config::load_or_default(&cli.config));
    config.validate()?;

    let root_dir = cli
        .storage_dir
        .unwrap_or_else(|| PathBuf::from(&config.storage.root_dir));
    let store = Arc::new(LocalStore::new(root_dir));

    match cli.command {
        Command::Watch => {
            log::info!(
                "watching {} every {}s",
                config.source.schedule_url,
                config.poller.interval_secs
            );
            let worker = PollingWorker::new(Arc::clone(&config), store)?;
            worker.run().await;
        }

        Command::Poll => {
            let worker = PollingWorker::new(Arc::clone(&config), store)?;
            let summary = worker.poll_once().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }

        Command::Retrieve {
            document_ids,
            code,
            out,
            browser,
            concurrency,
        } => {
            if document_ids.is_empty() {
                return Err(AppError::invalid_input("no document ids given"));
            }
            tokio::fs::create_dir_all(&out).await?;

            let strategy = build_strategy(&config, browser)?;
            let solver = CaptchaSolver::new(
                Arc::new(TesseractCli::new(&config.captcha.tesseract_cmd)),
                config.captcha.clone(),
            );
            let retriever =
                Arc::new(DocumentRetriever::new(strategy, solver, config.captcha.clone()));

            if let Some(code) = code {
                let [document_id] = document_ids.as_slice() else {
                    return Err(AppError::invalid_input(
                        "--code applies to exactly one document id",
                    ));
                };
                let document = retriever.retrieve_with_code(document_id, &code).await?;
                let path = output_path(&out, document_id);
                tokio::fs::write(&path, &document.bytes).await?;
                log::info!("saved {} ({} bytes)", path.display(), document.bytes.len());
                return Ok(());
            }

            let mut results = stream::iter(document_ids)
                .map(|id| {
                    let retriever = Arc::clone(&retriever);
                    async move {
                        let result = retriever.retrieve(&id).await;
                        (id, result)
                    }
                })
                .buffer_unordered(concurrency.max(1));

            let mut failures = 0usize;
            while let Some((id, result)) = results.next().await {
                match result {
                    Ok(document) => {
                        let path = output_path(&out, &id);
                        tokio::fs::write(&path, &document.bytes).await?;
                        log::info!("saved {} ({} bytes)", path.display(), document.bytes.len());
                    }
                    Err(error) => {
                        failures += 1;
                        log::error!("retrieval of {id} failed: {error}");
                    }
                }
            }
            if failures > 0 {
                return Err(AppError::fetch(
                    "retrieve",
                    format!("{failures} document(s) could not be retrieved"),
                ));
            }
        }

        Command::Notifications { unread, mark_read } => {
            if let Some(id) = mark_read {
                if store.mark_notification_read(&id).await? {
                    log::info!("notification {id} marked read");
                } else {
                    log::warn!("no notification with id {id}");
                }
                return Ok(());
            }
            let notifications = store.notifications(unread).await?;
            if notifications.is_empty() {
                println!("No notifications.");
            }
            for n in notifications {
                let flag = if n.read { " " } else { "*" };
                println!(
                    "{flag} [{}] {}: {} ({})",
                    n.event_timestamp.format("%Y-%m-%d %H:%M:%S"),
                    n.title,
                    n.message,
                    n.id
                );
            }
        }

        Command::Validate => {
            // load_or_default above already fell back; reload strictly here.
            let config = Config::load(&cli.config)?;
            config.validate()?;
            println!("Configuration OK: {}", cli.config.display());
        }

        Command::Info => match store.latest_snapshot().await? {
            Some(snapshot) => {
                let in_session = snapshot.records.iter().filter(|r| r.is_in_session).count();
                println!("Captured at: {}", snapshot.captured_at.to_rfc3339());
                println!("Courts:      {}", snapshot.count);
                println!("In session:  {in_session}");
            }
            None => println!("No snapshot recorded yet."),
        },
    }

    Ok(())
}
