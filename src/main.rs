use anyhow::{Context, Result};
use clap::Parser;
use journal_relay::browser::WebDriverLauncher;
use journal_relay::lock::InstanceLock;
use journal_relay::Config;

#[derive(Parser, Debug)]
#[command(
    name = "journal-relay",
    about = "Repost new srad.jp journal entries as quoted replies through a rotating proxy pool"
)]
struct Args {
    /// JSON config sources, merged in order; `-` reads stdin
    #[arg(required = true, value_name = "CONFIG")]
    sources: Vec<String>,

    /// Go through the whole flow without saving any post
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut config = Config::load(&args.sources).context("Failed to load configuration")?;
    if args.dry_run {
        config.dry_run = true;
    }
    tracing::debug!(config = ?config, "Configuration loaded");

    let Some(lock) = InstanceLock::try_acquire(&config.lock_file).with_context(|| {
        format!("Failed to open lock file '{}'", config.lock_file.display())
    })?
    else {
        tracing::info!(
            lock = %config.lock_file.display(),
            "Another instance is running; exiting"
        );
        return Ok(());
    };
    tracing::debug!(lock = %lock.path().display(), "Run lock acquired");

    let launcher = WebDriverLauncher::new(&config);
    let summary = journal_relay::run(&config, &launcher)
        .await
        .context("Run failed")?;

    tracing::info!(
        selected = summary.selected,
        posted = summary.posted,
        remaining = summary.remaining,
        resume_point = %summary.resume_point,
        "Done"
    );
    Ok(())
}
