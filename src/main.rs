mod api;
mod config;
mod event;
mod format;
mod gateway;
mod poll;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;
use url::Url;

use api::client::Model3dClient;
use api::types::{JobState, SubmittedJob};
use config::Config;
use event::StatusEvent;
use gateway::{CacheGateway, CacheStore, GatewayCommand, NoopStore, ReqwestFetcher, SqliteStore};
use poll::PollSession;

#[derive(Parser, Debug)]
#[command(name = "m3d")]
#[command(about = "A command-line client for a 3D model generation service")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/m3d/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Server base URL (overrides the config file)
  #[arg(short, long)]
  server: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Generate a model from a text prompt and watch it to completion
  Text {
    prompt: String,
    /// Output format (e.g. OBJ, GLB)
    #[arg(short, long)]
    format: Option<String>,
  },
  /// Generate a model from an image and watch it to completion
  Image {
    path: PathBuf,
    /// Output format (e.g. OBJ, GLB)
    #[arg(short, long)]
    format: Option<String>,
    /// Enable PBR materials
    #[arg(long)]
    pbr: bool,
  },
  /// Query the status of a job once
  Status { job_id: String },
  /// Poll a job until it reaches a terminal state
  Watch { job_id: String },
  /// List past jobs
  History {
    /// Page number (1-based)
    #[arg(short, long, default_value_t = 1)]
    page: u32,
    /// Page size
    #[arg(short, long, default_value_t = 10)]
    size: u32,
    /// Filter by state: pending, processing, completed, failed
    #[arg(long)]
    status: Option<JobState>,
  },
  /// Download the model for a completed job
  Download {
    job_id: String,
    /// Output path (default: model_<job-id>)
    #[arg(short, long)]
    output: Option<PathBuf>,
  },
  /// Manage the offline cache
  Cache {
    #[command(subcommand)]
    command: CacheCommand,
  },
}

#[derive(Subcommand, Debug)]
enum CacheCommand {
  /// Drop every cache partition
  Clear,
  /// Re-populate the static cache from the asset manifest
  Refresh,
  /// Evict expired API responses now
  Sweep,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging()?;

  // --server bypasses config files entirely
  let config = match &args.server {
    Some(url) => Config::from_server_url(url),
    None => Config::load(args.config.as_deref())?,
  };

  let gateway = build_gateway(&config).await?;
  let client = Model3dClient::new(&config, gateway.clone())?;
  let _maintenance = gateway.spawn_maintenance();

  match args.command {
    Command::Text { prompt, format } => {
      let format = format.or_else(|| config.default_format.clone());
      let job = client.submit_text(&prompt, format.as_deref()).await?;
      announce_job(&job);
      watch_job(&client, job.job_id).await
    }
    Command::Image { path, format, pbr } => {
      let image = std::fs::read(&path)
        .map_err(|e| eyre!("Failed to read image {}: {}", path.display(), e))?;
      let format = format.or_else(|| config.default_format.clone());
      let job = client.submit_image(&image, format.as_deref(), pbr).await?;
      announce_job(&job);
      watch_job(&client, job.job_id).await
    }
    Command::Status { job_id } => {
      let status = client.query_status(&job_id).await?;
      let state = status
        .state
        .map(|s| s.as_str().to_string())
        .unwrap_or_else(|| status.raw_status.clone());
      println!("{}  [{:>3}%]  {}", state, status.progress(), status.message());
      if let Some(file) = status.first_result() {
        print_result_file(file);
      }
      Ok(())
    }
    Command::Watch { job_id } => watch_job(&client, job_id).await,
    Command::History { page, size, status } => {
      let listing = client.history(page.saturating_sub(1), size, status).await?;
      if listing.items.is_empty() {
        println!("No jobs found.");
        return Ok(());
      }
      for item in &listing.items {
        let state = item
          .state
          .map(|s| s.as_str().to_string())
          .unwrap_or_else(|| item.raw_status.clone());
        println!("{}  {:<10}  {}", item.task_id, state, item.prompt.as_deref().unwrap_or("-"));
        if let Some(created) = &item.created_at {
          println!("    created:   {}", created);
        }
        if let Some(completed) = &item.completed_at {
          println!("    completed: {}", completed);
        }
        if item.model_url.is_some() || item.preview_url.is_some() {
          println!(
            "    model: {}  preview: {}",
            if item.model_url.is_some() { "available" } else { "-" },
            if item.preview_url.is_some() { "available" } else { "-" }
          );
        }
      }
      println!(
        "Page {} of {} ({} jobs total)",
        listing.page, listing.total_pages, listing.total
      );
      Ok(())
    }
    Command::Download { job_id, output } => {
      let dest = output.unwrap_or_else(|| PathBuf::from(format!("model_{}", job_id)));
      client.download(&job_id, &dest).await?;
      println!("Saved {}", dest.display());
      Ok(())
    }
    Command::Cache { command } => match command {
      CacheCommand::Clear => {
        gateway.handle_message(GatewayCommand::ClearCache).await?;
        println!("All cache partitions cleared.");
        Ok(())
      }
      CacheCommand::Refresh => {
        gateway.handle_message(GatewayCommand::RefreshStatic).await?;
        println!("Static cache updated.");
        Ok(())
      }
      CacheCommand::Sweep => {
        let evicted = gateway.sweep()?;
        println!("Evicted {} expired entries.", evicted);
        Ok(())
      }
    },
  }
}

/// Route log lines to a file so they never interleave with CLI output.
fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
  let log_dir = dirs::data_dir()
    .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
    .ok_or_else(|| eyre!("Could not determine data directory"))?
    .join("m3d");
  std::fs::create_dir_all(&log_dir)
    .map_err(|e| eyre!("Failed to create log directory: {}", e))?;

  let appender = tracing_appender::rolling::never(&log_dir, "m3d.log");
  let (writer, guard) = tracing_appender::non_blocking(appender);

  tracing_subscriber::fmt()
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_writer(writer)
    .with_ansi(false)
    .init();

  Ok(guard)
}

async fn build_gateway(config: &Config) -> Result<CacheGateway> {
  let store: Arc<dyn CacheStore> = if config.cache.enabled {
    match &config.cache.path {
      Some(path) => Arc::new(SqliteStore::open_at(path)?),
      None => Arc::new(SqliteStore::open()?),
    }
  } else {
    Arc::new(NoopStore)
  };

  let fetcher = Arc::new(ReqwestFetcher::new()?);
  let base = Url::parse(&config.server.url)
    .map_err(|e| eyre!("Invalid server URL {}: {}", config.server.url, e))?;

  let gateway = CacheGateway::new(store, fetcher, base);
  gateway.activate()?;

  // First run: seed the static cache. Best effort here; `m3d cache
  // refresh` surfaces failures explicitly.
  if config.cache.enabled && gateway.needs_install()? {
    if let Err(err) = gateway.install().await {
      warn!(error = %err, "static cache install failed");
    }
  }

  Ok(gateway)
}

fn announce_job(job: &SubmittedJob) {
  println!("Job submitted: {}", job.job_id);
  if let Some(request_id) = &job.request_id {
    println!("  request id: {}", request_id);
  }
  if let Some(estimate) = job.estimated_time {
    println!("  estimated time: {}", format::format_duration(estimate));
  }
}

fn print_result_file(file: &api::types::ResultFile) {
  println!("  format:  {}", file.format.as_deref().unwrap_or("N/A"));
  println!(
    "  size:    {}",
    file
      .file_size
      .map(format::format_file_size)
      .unwrap_or_else(|| "N/A".to_string())
  );
  println!(
    "  model:   {}",
    if file.model_url.is_some() { "available" } else { "unavailable" }
  );
  println!(
    "  preview: {}",
    if file.preview_image_url.is_some() { "available" } else { "unavailable" }
  );
}

/// Consume poll events until the job reaches a terminal state.
async fn watch_job(client: &Model3dClient, job_id: String) -> Result<()> {
  let (tx, mut rx) = mpsc::unbounded_channel();
  let session = PollSession::start(client.clone(), job_id, tx, None);

  while let Some(event) = rx.recv().await {
    match event {
      StatusEvent::Progress {
        state,
        progress,
        message,
        ..
      } => {
        let state = state.map(JobState::as_str).unwrap_or("UNKNOWN");
        println!("[{:>3}%] {:<10} {}", progress, state, message);
      }
      StatusEvent::Completed { job_id, result } => {
        println!("Job {} completed.", job_id);
        match result {
          Some(file) => print_result_file(&file),
          None => println!("  no model file information returned"),
        }
        break;
      }
      StatusEvent::Failed { job_id, message } => {
        println!("Job {} failed: {}", job_id, message);
        break;
      }
    }
  }

  session.stop();
  Ok(())
}
