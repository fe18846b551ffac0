//! Notification bus for string-named, untyped notifications.
//!
//! [`NotificationCenter`] is the seam between this crate and whatever
//! system-wide notification mechanism delivers backup daemon events. The
//! monitor only ever talks to the trait; [`LocalNotificationBus`] is the
//! in-process implementation used by the replay CLI and the tests.
//!
//! Delivery is synchronous: `post` invokes every matching handler on the
//! calling thread before returning.

use crate::types::SubscriptionToken;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

// =============================================================================
// Message Types
// =============================================================================

/// Untyped key/value payload attached to a notification.
pub type UserInfo = Map<String, Value>;

/// A posted notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub name: String,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default)]
    pub timestamp_ms: i64,
}

impl Notification {
    pub fn new(name: impl Into<String>, user_info: UserInfo) -> Self {
        Self {
            name: name.into(),
            user_info,
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Callback registered for a notification name.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

// =============================================================================
// NotificationCenter
// =============================================================================

/// Publish/subscribe capability over string-named notifications.
pub trait NotificationCenter: Send + Sync {
    /// Register `handler` for every future notification called `name`.
    fn subscribe(&self, name: &str, handler: NotificationHandler) -> SubscriptionToken;

    /// Remove the registration behind `token`. Unknown tokens are ignored.
    fn unsubscribe(&self, token: &SubscriptionToken);

    /// Deliver a notification to every handler registered for `name`.
    ///
    /// Returns the number of handlers invoked.
    fn post(&self, name: &str, user_info: UserInfo) -> usize;
}

// =============================================================================
// LocalNotificationBus
// =============================================================================

struct Registration {
    token: SubscriptionToken,
    handler: NotificationHandler,
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Default)]
struct Registry {
    /// name -> registrations in subscription order
    by_name: HashMap<String, Vec<Registration>>,
    /// token -> name, for O(1) unsubscribe lookups
    names: HashMap<SubscriptionToken, String>,
}

/// Statistics about bus usage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    pub notifications_posted: u64,
    pub active_registrations: usize,
}

/// In-process notification bus.
///
/// Handlers are invoked outside the registry lock, so a handler may itself
/// subscribe or unsubscribe without deadlocking. A registration removed while
/// a post is in flight may still receive that one notification.
#[derive(Debug, Default)]
pub struct LocalNotificationBus {
    registry: RwLock<Registry>,
    posted: AtomicU64,
}

impl LocalNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of live registrations across all names.
    pub fn registration_count(&self) -> usize {
        self.registry.read().names.len()
    }

    /// Number of live registrations for one notification name.
    pub fn registration_count_for(&self, name: &str) -> usize {
        self.registry
            .read()
            .by_name
            .get(name)
            .map_or(0, |regs| regs.len())
    }

    /// Current bus statistics.
    pub fn stats(&self) -> BusStats {
        BusStats {
            notifications_posted: self.posted.load(Ordering::Relaxed),
            active_registrations: self.registration_count(),
        }
    }

    /// Deliver an already-built notification.
    pub fn post_notification(&self, notification: &Notification) -> usize {
        let handlers: Vec<NotificationHandler> = {
            let registry = self.registry.read();
            registry
                .by_name
                .get(&notification.name)
                .map(|regs| regs.iter().map(|r| Arc::clone(&r.handler)).collect())
                .unwrap_or_default()
        };

        self.posted.fetch_add(1, Ordering::Relaxed);

        for handler in &handlers {
            handler(notification);
        }

        tracing::debug!(
            name = %notification.name,
            delivered = handlers.len(),
            "posted notification"
        );

        handlers.len()
    }
}

impl NotificationCenter for LocalNotificationBus {
    fn subscribe(&self, name: &str, handler: NotificationHandler) -> SubscriptionToken {
        let token = SubscriptionToken::new();

        let mut registry = self.registry.write();
        registry
            .by_name
            .entry(name.to_string())
            .or_default()
            .push(Registration {
                token: token.clone(),
                handler,
            });
        registry.names.insert(token.clone(), name.to_string());

        tracing::debug!(name, %token, "subscribed");

        token
    }

    fn unsubscribe(&self, token: &SubscriptionToken) {
        let mut registry = self.registry.write();

        let Some(name) = registry.names.remove(token) else {
            tracing::debug!(%token, "unsubscribe of unknown token ignored");
            return;
        };

        if let Some(regs) = registry.by_name.get_mut(&name) {
            regs.retain(|r| &r.token != token);
            if regs.is_empty() {
                registry.by_name.remove(&name);
            }
        }

        tracing::debug!(name = %name, %token, "unsubscribed");
    }

    fn post(&self, name: &str, user_info: UserInfo) -> usize {
        self.post_notification(&Notification::new(name, user_info))
    }
}

// =============================================================================
// Tests
// =============================================================================
