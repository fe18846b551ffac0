//! Backup lifecycle events — typed values and translation from raw payloads.

pub mod translation;
pub mod types;

pub use translation::{to_user_info, translate, translate_external, TranslationError};
pub use types::{BackupEvent, BackupEventKind};
