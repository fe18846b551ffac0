//! # Backup Monitor - typed relay for backup daemon notifications
//!
//! The backup daemon announces its progress as string-named notifications
//! with untyped key/value payloads. This crate turns those into:
//! - A typed [`BackupEvent`] per notification, with every payload key validated
//! - Calls on a single [`BackupObserver`] registered with a [`BackupMonitor`]
//! - Optionally, a re-broadcast under stable in-process names ([`NotificationRelay`])
//!
//! ## Architecture
//!
//! ```text
//!   daemon notification ──▶ NotificationCenter ──▶ BackupMonitor handler
//!                                                     │ translate()
//!                                                     ▼
//!                                               BackupEvent ──▶ BackupObserver
//! ```
//!
//! The monitor never owns its observer and releases every subscription on
//! `stop()` or when dropped.

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used, clippy::panic))]

pub mod bus;
pub mod events;
pub mod monitor;
pub mod types;

// Internal utilities
pub mod observability;

pub use bus::{LocalNotificationBus, Notification, NotificationCenter, UserInfo};
pub use events::{BackupEvent, BackupEventKind, TranslationError};
pub use monitor::{BackupMonitor, BackupObserver, MonitorStats, NotificationRelay};
pub use types::{Config, Error, Result};
