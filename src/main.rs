mod app;
mod cache;
mod config;
mod net;
mod queue;
mod sync;
mod worker;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use tracing_subscriber::EnvFilter;

use app::App;
use config::Config;
use worker::push::{self, ClickAction, Notification};

#[derive(Parser)]
#[command(name = "tripsync", about = "Offline-first caching and sync layer for TripTracker")]
struct Cli {
  /// Path to config file (default: ./tripsync.yaml, then XDG config dir)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Precache, then watch connectivity and sync queued mutations (default)
  Run,
  /// Replay the offline queue once and exit
  Sync,
  /// Fetch one URL through the caching strategies and print the result
  Fetch {
    /// Absolute URL, or a path resolved against the server base URL
    url: String,
    /// Treat the request as a top-level navigation
    #[arg(long)]
    navigation: bool,
  },
  /// Queue a mutation for replay once connectivity returns
  Queue {
    #[command(subcommand)]
    mutation: QueueCommand,
  },
  /// Show connectivity and queue depth
  Status,
  /// Resolve a push payload against the notification defaults
  Notify {
    /// JSON payload; omit to show the defaults
    payload: Option<String>,
    /// URL of an already-open app window; repeatable
    #[arg(long = "window")]
    windows: Vec<String>,
  },
}

#[derive(Subcommand)]
enum QueueCommand {
  /// Toggle a todo's completion state
  ToggleTodo { id: i64 },
  /// Record a new vehicle event from a JSON payload
  CreateEvent { payload: String },
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tripsync=info")),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();
  let config = Config::load(cli.config.as_deref())?;
  let app = App::new(config)?;

  match cli.command.unwrap_or(Command::Run) {
    Command::Run => app.run().await?,
    Command::Sync => {
      let report = app.sync_once().await?;
      println!(
        "Replayed {}/{} queued mutations ({} failed)",
        report.synced, report.attempted, report.failed
      );
    }
    Command::Fetch { url, navigation } => {
      let served = app.fetch(&url, navigation).await?;
      eprintln!(
        "{} {} (served from {:?})",
        served.snapshot.status,
        served.snapshot.header("content-type").unwrap_or("-"),
        served.source
      );
      println!("{}", String::from_utf8_lossy(&served.snapshot.body));
    }
    Command::Queue { mutation } => {
      let id = match mutation {
        QueueCommand::ToggleTodo { id } => app.queue_toggle_todo(id)?,
        QueueCommand::CreateEvent { payload } => app.queue_create_event(&payload)?,
      };
      println!("Queued mutation {}", id);
    }
    Command::Status => {
      let (online, pending) = app.status().await?;
      println!(
        "{}, {} queued mutations",
        if online { "online" } else { "offline" },
        pending
      );
    }
    Command::Notify { payload, windows } => {
      let notification = Notification::from_push_payload(payload.as_deref().map(str::as_bytes));
      println!("{}", serde_json::to_string_pretty(&notification)?);
      match push::click_action(&notification.data.url, &windows) {
        ClickAction::Focus(index) => println!("click: focus window {}", index),
        ClickAction::Open(url) => println!("click: open {}", url),
      }
    }
  }

  Ok(())
}
