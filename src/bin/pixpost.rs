//! pixpost CLI — folder watcher daemon plus queue inspection commands.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use pixpost::client::PixelfedClient;
use pixpost::config::Config;
use pixpost::queue::UploadQueue;
use pixpost::runner::{Runner, RunnerConfig};
use pixpost::watcher::{FolderWatcher, scan_existing};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser)]
#[command(name = "pixpost", about = "Watches a folder and posts new images to Pixelfed")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Watch the folder and upload new images until interrupted
    Run,
    /// Durable queue operations
    Queue {
        #[command(subcommand)]
        action: QueueAction,
    },
}

#[derive(Subcommand)]
enum QueueAction {
    /// Show aggregate queue counters
    Stats,
    /// List pending items
    List,
    /// Enqueue a file by hand
    Add {
        /// Path of the image to upload
        file: PathBuf,
        /// Caption for the post
        #[arg(long, default_value = "")]
        caption: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let config = Config::from_env()?;
    init_tracing(&config.log_level)?;

    match cli.command {
        Command::Run => cmd_run(config).await,
        Command::Queue { action } => {
            let queue = UploadQueue::load(config.queue_path());
            match action {
                QueueAction::Stats => cmd_queue_stats(&queue),
                QueueAction::List => cmd_queue_list(&queue),
                QueueAction::Add { file, caption } => cmd_queue_add(queue, file, caption),
            }
        }
    }
}

fn init_tracing(default_level: &str) -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::layer::SubscriberExt as _;
    use tracing_subscriber::util::SubscriberInitExt as _;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to init tracing subscriber: {e}"))?;
    Ok(())
}

async fn cmd_run(config: Config) -> anyhow::Result<()> {
    std::fs::create_dir_all(&config.watch_dir)?;

    info!("starting pixpost");
    info!("instance: {}", config.instance_url);
    info!("watching folder: {}", config.watch_dir.display());

    let client = PixelfedClient::new(
        config.instance_url.clone(),
        config.access_token.clone(),
        config.default_post_text.clone(),
        config.cc_license.clone(),
    );

    let queue = UploadQueue::load(config.queue_path());
    let known = scan_existing(&config.watch_dir)?;

    let (candidate_tx, candidate_rx) = mpsc::channel(64);
    let _watcher = FolderWatcher::spawn(
        &config.watch_dir,
        known,
        config.settle_delay,
        candidate_tx,
    )?;

    let runner = Runner::new(RunnerConfig {
        poll_interval: config.poll_interval,
    });

    let shutdown = runner.shutdown_handle();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("stopping...");
        shutdown.notify_one();
    });

    runner.run(queue, &client, candidate_rx).await;
    Ok(())
}

fn cmd_queue_stats(queue: &UploadQueue) -> anyhow::Result<()> {
    let stats = queue.stats();
    println!("Store:            {}", queue.store_path().display());
    println!("Total:            {}", stats.total);
    println!("Never attempted:  {}", stats.never_attempted);
    println!("Retrying:         {}", stats.retrying);
    println!("Max retry count:  {}", stats.max_retry_count);
    Ok(())
}

fn cmd_queue_list(queue: &UploadQueue) -> anyhow::Result<()> {
    if queue.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!(
        "{:<5}  {:<7}  {:<19}  {:<40}  LAST ERROR",
        "ID", "RETRIES", "ENQUEUED", "SUBJECT"
    );
    println!("{}", "-".repeat(100));

    for item in queue.items() {
        let subject = subject_tail(&item.subject, 40);
        println!(
            "{:<5}  {:<7}  {:<19}  {:<40}  {}",
            item.id.0,
            item.retry_count,
            item.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            subject,
            item.last_error.as_deref().unwrap_or("-")
        );
    }

    println!("\n{} item(s)", queue.len());
    Ok(())
}

fn cmd_queue_add(mut queue: UploadQueue, file: PathBuf, caption: String) -> anyhow::Result<()> {
    let id = queue.add(file.to_string_lossy(), caption);
    println!("Enqueued {} as {}", file.display(), id);
    Ok(())
}

/// Last `max_chars` characters of a subject, for table display. Truncates
/// on a char boundary — paths are lossy UTF-8 and may hold multi-byte
/// characters.
fn subject_tail(subject: &str, max_chars: usize) -> &str {
    match subject.char_indices().rev().nth(max_chars.saturating_sub(1)) {
        Some((idx, _)) => &subject[idx..],
        None => subject,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subject_tail_keeps_short_subjects_whole() {
        assert_eq!(subject_tail("/watch/a.jpg", 40), "/watch/a.jpg");
        assert_eq!(subject_tail("", 40), "");
    }

    #[test]
    fn subject_tail_truncates_long_ascii_subjects() {
        let subject = "/watch/a-very-long-directory-name/some-deeply-nested-file.jpg";
        let tail = subject_tail(subject, 40);
        assert_eq!(tail.chars().count(), 40);
        assert!(subject.ends_with(tail));
    }

    #[test]
    fn subject_tail_respects_char_boundaries() {
        // Multi-byte filename where a byte-offset cut would land inside
        // a character.
        let subject = "/watch/фотографии_с_отпуска_лето_2026_год.jpg";
        assert!(subject.len() > 40);

        let tail = subject_tail(subject, 40);
        assert_eq!(tail.chars().count(), 40);
        assert!(subject.ends_with(tail));
    }
}
