//! Backup monitor replay tool.
//!
//! Reads newline-delimited JSON notifications, one per line:
//!
//! ```text
//! {"name": "com.apple.backupd.thinningbackupended", "user_info": {"BackupPath": "/b", "Error": 0}}
//! ```
//!
//! posts each onto an in-process bus watched by a started monitor, and
//! writes every translated event to stdout as one JSON line.

use backup_monitor::monitor::FnObserver;
use backup_monitor::types::MalformedPayloadPolicy;
use backup_monitor::{BackupEvent, BackupMonitor, Config, LocalNotificationBus, Notification};
use clap::Parser;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Parser)]
#[command(name = "backup-monitor", version, about = "Replay backup daemon notifications")]
struct Args {
    /// Read notifications from this file instead of stdin.
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, env = "BACKUP_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Abort on the first malformed payload.
    #[arg(long)]
    strict: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    }
    .apply_env()?;
    if args.strict {
        config.monitor.malformed_payload = MalformedPayloadPolicy::Panic;
    }

    backup_monitor::observability::init_tracing_with(&config.observability);

    let bus = Arc::new(LocalNotificationBus::new());
    let observer = Arc::new(FnObserver::new(|event: BackupEvent| {
        match serde_json::to_string(&event) {
            Ok(line) => {
                let mut stdout = io::stdout().lock();
                if let Err(err) = writeln!(stdout, "{line}") {
                    tracing::error!(error = %err, "failed to write event");
                }
            }
            Err(err) => tracing::error!(error = %err, "failed to encode event"),
        }
    }));

    let monitor = BackupMonitor::with_config(bus.clone(), config.monitor.clone());
    monitor.attach(&observer);
    monitor.start();

    let reader: Box<dyn BufRead> = match &args.input {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(io::stdin().lock()),
    };

    let mut skipped = 0usize;
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Notification>(&line) {
            Ok(notification) => {
                bus.post_notification(&notification);
            }
            Err(err) => {
                skipped += 1;
                tracing::warn!(line = index + 1, error = %err, "unparseable input line");
            }
        }
    }

    monitor.stop();

    let stats = monitor.stats();
    tracing::info!(
        delivered = stats.delivered,
        malformed = stats.malformed,
        unparseable = skipped,
        "replay finished"
    );

    Ok(())
}
