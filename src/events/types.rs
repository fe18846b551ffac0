//! Typed backup lifecycle events and the fixed name tables they map to.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload key carrying the mount point a backup run writes to.
pub const DESTINATION_MOUNT_POINT_KEY: &str = "DestinationMountPoint";
/// Payload key carrying the path of the newest backup.
pub const LATEST_BACKUP_PATH_KEY: &str = "LatestBackupPath";
/// Payload key carrying the backup being thinned.
pub const BACKUP_PATH_KEY: &str = "BackupPath";
/// Payload key carrying the cleanup result code.
pub const ERROR_KEY: &str = "Error";

/// The four kinds of backup lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupEventKind {
    BackupStarted,
    BackupEnded,
    BackupCleanupStarted,
    BackupCleanupEnded,
}

impl BackupEventKind {
    /// Every kind, in subscription order.
    pub const ALL: [BackupEventKind; 4] = [
        BackupEventKind::BackupStarted,
        BackupEventKind::BackupEnded,
        BackupEventKind::BackupCleanupStarted,
        BackupEventKind::BackupCleanupEnded,
    ];

    /// Name the backup daemon posts this event under.
    pub fn external_name(self) -> &'static str {
        match self {
            BackupEventKind::BackupStarted => "com.apple.backupd.DestinationMountNotification",
            BackupEventKind::BackupEnded => {
                "com.apple.backupd.NewSystemBackupAvailableNotification"
            }
            BackupEventKind::BackupCleanupStarted => "com.apple.backupd.thinningbackup",
            BackupEventKind::BackupCleanupEnded => "com.apple.backupd.thinningbackupended",
        }
    }

    /// Name the event is re-broadcast under inside the process.
    pub fn internal_name(self) -> &'static str {
        match self {
            BackupEventKind::BackupStarted => "backupStarted",
            BackupEventKind::BackupEnded => "backupEnded",
            BackupEventKind::BackupCleanupStarted => "backupCleaningUpStarted",
            BackupEventKind::BackupCleanupEnded => "backupCleaningUpEnded",
        }
    }

    /// Payload keys that must be present for this kind.
    pub fn required_keys(self) -> &'static [&'static str] {
        match self {
            BackupEventKind::BackupStarted => &[DESTINATION_MOUNT_POINT_KEY],
            BackupEventKind::BackupEnded => &[LATEST_BACKUP_PATH_KEY],
            BackupEventKind::BackupCleanupStarted => &[BACKUP_PATH_KEY],
            BackupEventKind::BackupCleanupEnded => &[BACKUP_PATH_KEY, ERROR_KEY],
        }
    }

    pub fn from_external_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.external_name() == name)
    }

    pub fn from_internal_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.internal_name() == name)
    }
}

impl fmt::Display for BackupEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.internal_name())
    }
}

/// A validated backup lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackupEvent {
    /// A backup run has begun writing to `destination_mount_point`.
    BackupStarted { destination_mount_point: String },

    /// A backup run completed; `latest_backup_path` is the newest backup.
    BackupEnded { latest_backup_path: String },

    /// Thinning of old backups began on `backup_path`.
    BackupCleanupStarted { backup_path: String },

    /// Thinning finished. `error_code` is 0 on success.
    BackupCleanupEnded { backup_path: String, error_code: i64 },
}

impl BackupEvent {
    pub fn kind(&self) -> BackupEventKind {
        match self {
            BackupEvent::BackupStarted { .. } => BackupEventKind::BackupStarted,
            BackupEvent::BackupEnded { .. } => BackupEventKind::BackupEnded,
            BackupEvent::BackupCleanupStarted { .. } => BackupEventKind::BackupCleanupStarted,
            BackupEvent::BackupCleanupEnded { .. } => BackupEventKind::BackupCleanupEnded,
        }
    }

    /// True for a cleanup that finished with a nonzero code.
    pub fn is_failure(&self) -> bool {
        matches!(self, BackupEvent::BackupCleanupEnded { error_code, .. } if *error_code != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashSet;

    #[test]
    fn test_names_are_distinct() {
        let external: HashSet<_> = BackupEventKind::ALL.iter().map(|k| k.external_name()).collect();
        let internal: HashSet<_> = BackupEventKind::ALL.iter().map(|k| k.internal_name()).collect();
        assert_eq!(external.len(), 4);
        assert_eq!(internal.len(), 4);
    }

    #[test]
    fn test_name_lookup() {
        for kind in BackupEventKind::ALL {
            assert_eq!(BackupEventKind::from_external_name(kind.external_name()), Some(kind));
            assert_eq!(BackupEventKind::from_internal_name(kind.internal_name()), Some(kind));
        }
        assert_eq!(BackupEventKind::from_external_name("com.apple.backupd.other"), None);
        assert_eq!(BackupEventKind::from_internal_name("backupStarted "), None);
    }

    #[test]
    fn test_cleanup_ended_requires_two_keys() {
        assert_eq!(
            BackupEventKind::BackupCleanupEnded.required_keys(),
            &["BackupPath", "Error"]
        );
    }

    #[test]
    fn test_event_serialization_shape() {
        let event = BackupEvent::BackupCleanupEnded {
            backup_path: "/Backups/2024-01-01".to_string(),
            error_code: 3,
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "kind": "backup_cleanup_ended",
                "backup_path": "/Backups/2024-01-01",
                "error_code": 3,
            })
        );
        assert!(event.is_failure());
        assert_eq!(event.kind(), BackupEventKind::BackupCleanupEnded);
    }
}
