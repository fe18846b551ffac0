//! Observer capability and the stock observers shipped with the crate.

use crate::events::BackupEvent;
use std::fmt;
use tokio::sync::broadcast;

/// Receiver of typed backup events.
///
/// The monitor may call these from whichever thread the notification bus
/// delivers on, possibly several at once, unless delivery is serialized via
/// `MonitorConfig::serialize_delivery`.
#[cfg_attr(test, mockall::automock)]
pub trait BackupObserver: Send + Sync {
    /// A backup run started writing to `destination_mount_point`.
    fn backup_started(&self, destination_mount_point: &str);

    /// A backup run finished; `latest_backup_path` is the newest backup.
    fn backup_ended(&self, latest_backup_path: &str);

    /// Thinning of `backup_path` started.
    fn backup_cleanup_started(&self, backup_path: &str);

    /// Thinning of `backup_path` finished with `error_code` (0 on success).
    fn backup_cleanup_ended(&self, backup_path: &str, error_code: i64);
}

/// Invoke the observer method matching `event`.
pub fn dispatch(observer: &dyn BackupObserver, event: &BackupEvent) {
    match event {
        BackupEvent::BackupStarted {
            destination_mount_point,
        } => observer.backup_started(destination_mount_point),
        BackupEvent::BackupEnded { latest_backup_path } => {
            observer.backup_ended(latest_backup_path)
        }
        BackupEvent::BackupCleanupStarted { backup_path } => {
            observer.backup_cleanup_started(backup_path)
        }
        BackupEvent::BackupCleanupEnded {
            backup_path,
            error_code,
        } => observer.backup_cleanup_ended(backup_path, *error_code),
    }
}

// =============================================================================
// FnObserver
// =============================================================================

/// Observer backed by a single closure receiving the whole event.
pub struct FnObserver<F> {
    f: F,
}

impl<F> FnObserver<F>
where
    F: Fn(BackupEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> fmt::Debug for FnObserver<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnObserver").finish_non_exhaustive()
    }
}

impl<F> BackupObserver for FnObserver<F>
where
    F: Fn(BackupEvent) + Send + Sync,
{
    fn backup_started(&self, destination_mount_point: &str) {
        (self.f)(BackupEvent::BackupStarted {
            destination_mount_point: destination_mount_point.to_string(),
        });
    }

    fn backup_ended(&self, latest_backup_path: &str) {
        (self.f)(BackupEvent::BackupEnded {
            latest_backup_path: latest_backup_path.to_string(),
        });
    }

    fn backup_cleanup_started(&self, backup_path: &str) {
        (self.f)(BackupEvent::BackupCleanupStarted {
            backup_path: backup_path.to_string(),
        });
    }

    fn backup_cleanup_ended(&self, backup_path: &str, error_code: i64) {
        (self.f)(BackupEvent::BackupCleanupEnded {
            backup_path: backup_path.to_string(),
            error_code,
        });
    }
}

// =============================================================================
// ChannelObserver
// =============================================================================

/// Observer that forwards events into a broadcast channel for async consumers.
///
/// Events sent while nobody is subscribed are discarded. Slow receivers see
/// `RecvError::Lagged` once they fall `capacity` events behind.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: broadcast::Sender<BackupEvent>,
}

impl ChannelObserver {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackupEvent> {
        self.tx.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, event: BackupEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!("no channel receivers; event discarded");
        }
    }
}

impl Default for ChannelObserver {
    fn default() -> Self {
        Self::new(64)
    }
}

impl BackupObserver for ChannelObserver {
    fn backup_started(&self, destination_mount_point: &str) {
        self.send(BackupEvent::BackupStarted {
            destination_mount_point: destination_mount_point.to_string(),
        });
    }

    fn backup_ended(&self, latest_backup_path: &str) {
        self.send(BackupEvent::BackupEnded {
            latest_backup_path: latest_backup_path.to_string(),
        });
    }

    fn backup_cleanup_started(&self, backup_path: &str) {
        self.send(BackupEvent::BackupCleanupStarted {
            backup_path: backup_path.to_string(),
        });
    }

    fn backup_cleanup_ended(&self, backup_path: &str, error_code: i64) {
        self.send(BackupEvent::BackupCleanupEnded {
            backup_path: backup_path.to_string(),
            error_code,
        });
    }
}
