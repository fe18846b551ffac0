//! Re-broadcast of typed events onto a notification bus.
//!
//! [`NotificationRelay`] is an observer that posts each event under its
//! internal name (`backupStarted`, `backupEnded`, `backupCleaningUpStarted`,
//! `backupCleaningUpEnded`) with the daemon's payload keys as metadata. It
//! lets any number of in-process listeners follow backup activity through
//! plain bus subscriptions instead of the single observer slot.

use std::fmt;
use std::sync::Arc;

use super::observer::BackupObserver;
use crate::bus::{Notification, NotificationCenter, NotificationHandler};
use crate::events::{to_user_info, translate, BackupEvent, BackupEventKind};
use crate::types::SubscriptionToken;

/// Observer posting every event onto a notification bus.
pub struct NotificationRelay {
    center: Arc<dyn NotificationCenter>,
}

impl NotificationRelay {
    pub fn new(center: Arc<dyn NotificationCenter>) -> Self {
        Self { center }
    }

    /// Post one event under its internal name.
    pub fn publish(&self, event: &BackupEvent) -> usize {
        let name = event.kind().internal_name();
        let delivered = self.center.post(name, to_user_info(event));
        tracing::debug!(name, delivered, "relayed backup event");
        delivered
    }
}

impl fmt::Debug for NotificationRelay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationRelay").finish_non_exhaustive()
    }
}

impl BackupObserver for NotificationRelay {
    fn backup_started(&self, destination_mount_point: &str) {
        self.publish(&BackupEvent::BackupStarted {
            destination_mount_point: destination_mount_point.to_string(),
        });
    }

    fn backup_ended(&self, latest_backup_path: &str) {
        self.publish(&BackupEvent::BackupEnded {
            latest_backup_path: latest_backup_path.to_string(),
        });
    }

    fn backup_cleanup_started(&self, backup_path: &str) {
        self.publish(&BackupEvent::BackupCleanupStarted {
            backup_path: backup_path.to_string(),
        });
    }

    fn backup_cleanup_ended(&self, backup_path: &str, error_code: i64) {
        self.publish(&BackupEvent::BackupCleanupEnded {
            backup_path: backup_path.to_string(),
            error_code,
        });
    }
}

/// Listen for relayed events of one kind.
///
/// Relayed payloads are produced by [`NotificationRelay`], so anything that
/// fails to translate was posted by someone else and is ignored.
pub fn subscribe_relayed<F>(
    center: &dyn NotificationCenter,
    kind: BackupEventKind,
    f: F,
) -> SubscriptionToken
where
    F: Fn(BackupEvent) + Send + Sync + 'static,
{
    let handler: NotificationHandler = Arc::new(move |n: &Notification| {
        match translate(kind, &n.user_info) {
            Ok(event) => f(event),
            Err(err) => tracing::debug!(name = %n.name, error = %err, "ignoring foreign post"),
        }
    });
    center.subscribe(kind.internal_name(), handler)
}
