//! Event translation — raw backup daemon notifications → [`BackupEvent`].
//!
//! Every required key is checked for presence and type. A payload that fails
//! either check produces a [`TranslationError`]; no partially-filled event is
//! ever built.
//!
//! Translation rules:
//!   DestinationMountNotification         → BackupStarted        (DestinationMountPoint: string)
//!   NewSystemBackupAvailableNotification → BackupEnded          (LatestBackupPath: string)
//!   thinningbackup                       → BackupCleanupStarted (BackupPath: string)
//!   thinningbackupended                  → BackupCleanupEnded   (BackupPath: string, Error: integer)

use serde_json::Value;
use thiserror::Error;

use super::types::{
    BackupEvent, BackupEventKind, BACKUP_PATH_KEY, DESTINATION_MOUNT_POINT_KEY, ERROR_KEY,
    LATEST_BACKUP_PATH_KEY,
};
use crate::bus::UserInfo;

/// A payload that does not match the documented shape for its event kind.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TranslationError {
    #[error("{kind}: missing required key {key:?}")]
    MissingField {
        kind: BackupEventKind,
        key: &'static str,
    },

    #[error("{kind}: key {key:?} must be {expected}, found {found}")]
    InvalidType {
        kind: BackupEventKind,
        key: &'static str,
        expected: &'static str,
        found: &'static str,
    },
}

/// Translate the payload of a `kind` notification into a typed event.
pub fn translate(
    kind: BackupEventKind,
    user_info: &UserInfo,
) -> Result<BackupEvent, TranslationError> {
    let event = match kind {
        BackupEventKind::BackupStarted => BackupEvent::BackupStarted {
            destination_mount_point: string_field(kind, user_info, DESTINATION_MOUNT_POINT_KEY)?,
        },
        BackupEventKind::BackupEnded => BackupEvent::BackupEnded {
            latest_backup_path: string_field(kind, user_info, LATEST_BACKUP_PATH_KEY)?,
        },
        BackupEventKind::BackupCleanupStarted => BackupEvent::BackupCleanupStarted {
            backup_path: string_field(kind, user_info, BACKUP_PATH_KEY)?,
        },
        BackupEventKind::BackupCleanupEnded => BackupEvent::BackupCleanupEnded {
            backup_path: string_field(kind, user_info, BACKUP_PATH_KEY)?,
            error_code: integer_field(kind, user_info, ERROR_KEY)?,
        },
    };
    Ok(event)
}

/// Translate a notification by its external name.
///
/// Returns `None` for names that are not backup daemon events.
pub fn translate_external(
    name: &str,
    user_info: &UserInfo,
) -> Option<Result<BackupEvent, TranslationError>> {
    BackupEventKind::from_external_name(name).map(|kind| translate(kind, user_info))
}

/// Build the metadata payload an event is re-broadcast with.
///
/// Uses the same keys as the daemon's own payloads, so `translate` accepts it.
pub fn to_user_info(event: &BackupEvent) -> UserInfo {
    let mut info = UserInfo::new();
    match event {
        BackupEvent::BackupStarted {
            destination_mount_point,
        } => {
            info.insert(
                DESTINATION_MOUNT_POINT_KEY.to_string(),
                Value::from(destination_mount_point.as_str()),
            );
        }
        BackupEvent::BackupEnded { latest_backup_path } => {
            info.insert(
                LATEST_BACKUP_PATH_KEY.to_string(),
                Value::from(latest_backup_path.as_str()),
            );
        }
        BackupEvent::BackupCleanupStarted { backup_path } => {
            info.insert(BACKUP_PATH_KEY.to_string(), Value::from(backup_path.as_str()));
        }
        BackupEvent::BackupCleanupEnded {
            backup_path,
            error_code,
        } => {
            info.insert(BACKUP_PATH_KEY.to_string(), Value::from(backup_path.as_str()));
            info.insert(ERROR_KEY.to_string(), Value::from(*error_code));
        }
    }
    info
}

fn field<'a>(
    kind: BackupEventKind,
    user_info: &'a UserInfo,
    key: &'static str,
) -> Result<&'a Value, TranslationError> {
    user_info
        .get(key)
        .ok_or(TranslationError::MissingField { kind, key })
}

fn string_field(
    kind: BackupEventKind,
    user_info: &UserInfo,
    key: &'static str,
) -> Result<String, TranslationError> {
    let value = field(kind, user_info, key)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| TranslationError::InvalidType {
            kind,
            key,
            expected: "a string",
            found: type_name(value),
        })
}

fn integer_field(
    kind: BackupEventKind,
    user_info: &UserInfo,
    key: &'static str,
) -> Result<i64, TranslationError> {
    let value = field(kind, user_info, key)?;
    value.as_i64().ok_or_else(|| TranslationError::InvalidType {
        kind,
        key,
        expected: "an integer",
        found: type_name(value),
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(n) if n.is_f64() => "a float",
        Value::Number(n) if n.is_i64() => "an integer",
        Value::Number(_) => "an integer outside the i64 range",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
