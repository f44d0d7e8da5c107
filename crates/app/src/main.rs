use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::FixedOffset;
use clap::{Parser, Subcommand};
use services::{Clock, QuizServices, SettingsService};
use storage::repository::Storage;
use tokio::sync::watch;

mod delivery;
mod seed;

use delivery::LogDelivery;

#[derive(Parser)]
#[command(name = "quiz", version, about = "Spaced-repetition quiz dispatcher")]
struct Cli {
    /// SQLite database URL or file path
    #[arg(
        long = "db",
        env = "QUIZ_DB_URL",
        default_value = "sqlite://quiz.sqlite3",
        global = true
    )]
    db_url: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the dispatch loop until interrupted
    Run {
        /// Offset from UTC, in minutes, for the time window and weekday gates
        #[arg(
            long,
            env = "QUIZ_UTC_OFFSET_MINUTES",
            default_value_t = 0,
            allow_hyphen_values = true
        )]
        utc_offset_minutes: i32,

        /// Seconds between re-reads of the stored schedule settings
        #[arg(
            long,
            env = "QUIZ_SETTINGS_RELOAD_SECS",
            default_value_t = 60,
            value_parser = clap::value_parser!(u64).range(1..)
        )]
        reload_secs: u64,
    },
    /// Write recommended settings and a demo learner with questions
    Seed,
}

#[derive(Debug)]
enum CliError {
    InvalidDbUrl { raw: String },
    InvalidUtcOffset { minutes: i32 },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            CliError::InvalidUtcOffset { minutes } => {
                write!(f, "invalid --utc-offset-minutes value: {minutes}")
            }
        }
    }
}

impl std::error::Error for CliError {}

fn normalize_sqlite_url(raw: &str) -> Result<String, CliError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CliError::InvalidDbUrl { raw: raw.to_string() });
    }
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite://") {
        return Ok(trimmed.to_string());
    }

    let path_str = trimmed.strip_prefix("sqlite:").unwrap_or(trimmed);
    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    Ok(format!("sqlite://{}", absolute.display()))
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| CliError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(CliError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("quiz=info,services=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Wait for ctrl-c. On unix a SIGHUP re-reads the stored settings at once.
#[cfg(unix)]
async fn wait_for_shutdown(settings: &SettingsService) -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut hangup = signal(SignalKind::hangup())?;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            result = &mut ctrl_c => return result,
            Some(()) = hangup.recv() => {
                tracing::info!("SIGHUP received, reloading settings");
                if let Err(error) = settings.reload().await {
                    tracing::warn!(%error, "settings reload failed, keeping current settings");
                }
            }
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_settings: &SettingsService) -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

async fn run_dispatcher(
    db_url: &str,
    utc_offset_minutes: i32,
    reload_secs: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let offset = utc_offset_minutes
        .checked_mul(60)
        .and_then(FixedOffset::east_opt)
        .ok_or(CliError::InvalidUtcOffset {
            minutes: utc_offset_minutes,
        })?;

    let services = QuizServices::new_sqlite(db_url, Clock::system()).await?;
    let handle = services
        .dispatcher(Arc::new(LogDelivery))
        .with_utc_offset(offset)
        .spawn();

    let settings = services.settings();
    let (stop_reload, stop_rx) = watch::channel(false);
    let reloader = tokio::spawn({
        let settings = Arc::clone(&settings);
        async move {
            settings
                .reload_every(Duration::from_secs(reload_secs), stop_rx)
                .await;
        }
    });
    tracing::info!(
        db = %db_url,
        %offset,
        reload_secs,
        "dispatcher running, press ctrl-c to stop"
    );

    wait_for_shutdown(&settings).await?;
    tracing::info!("shutdown requested");
    let _ = stop_reload.send(true);
    reloader.await?;
    handle.shutdown().await?;
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    // Open + migrate SQLite at startup. Keep this in the binary glue so core/services stay pure.
    let db_url = normalize_sqlite_url(&cli.db_url)?;
    prepare_sqlite_file(&db_url)?;

    match cli.command {
        Command::Run {
            utc_offset_minutes,
            reload_secs,
        } => run_dispatcher(&db_url, utc_offset_minutes, reload_secs).await,
        Command::Seed => {
            let storage = Storage::sqlite(&db_url).await?;
            let summary = seed::seed_demo(&storage).await?;
            tracing::info!(
                db = %db_url,
                learner_id = %summary.learner,
                questions = summary.questions,
                "demo data written"
            );
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        // At this layer (binary glue), printing once is fine.
        eprintln!("{err}");
        std::process::exit(2);
    }
}
