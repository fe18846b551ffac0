//! Backup event monitor.
//!
//! [`BackupMonitor`] subscribes one handler per [`BackupEventKind`] on a
//! [`NotificationCenter`], translates each raw notification into a
//! [`BackupEvent`] and hands it to the single registered observer.
//!
//! Lifecycle:
//! ```text
//!              start()                     start()
//!   ┌─────────┐ ──────▶ ┌─────────┐ ──▶ stop(); subscribe all four
//!   │ stopped │         │ started │ ◀──┘
//!   └─────────┘ ◀────── └─────────┘
//!        ▲  │    stop() / drop
//!        └──┘ stop() is a no-op
//! ```
//!
//! The subscription set holds either zero or exactly four tokens. `start()`
//! and `stop()` hold the subscription lock for their whole run, so callers
//! never see anything in between.

mod observer;
mod relay;

pub use observer::{dispatch, BackupObserver, ChannelObserver, FnObserver};
pub use relay::{subscribe_relayed, NotificationRelay};

use crate::bus::{Notification, NotificationCenter, NotificationHandler};
use crate::events::{translate, BackupEvent, BackupEventKind};
use crate::types::{MalformedPayloadPolicy, MonitorConfig, SubscriptionToken};
use parking_lot::{Mutex, ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Delivery counters.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorStats {
    /// Events handed to an observer.
    pub delivered: u64,
    /// Valid events dropped because no observer was set (or it was gone).
    pub dropped_no_observer: u64,
    /// Notifications whose payload failed translation.
    pub malformed: u64,
}

/// State shared between the monitor and the handlers it registers.
///
/// Handlers hold an `Arc` to this, never to the monitor, so the bus keeps
/// nothing of the monitor alive except what delivery needs.
struct Dispatcher {
    observer: RwLock<Option<Weak<dyn BackupObserver>>>,
    relay: RwLock<Option<Arc<NotificationRelay>>>,
    config: MonitorConfig,
    /// Held around observer calls when `serialize_delivery` is set. Reentrant
    /// so an observer may post onto the bus from inside its callback.
    dispatch_lock: ReentrantMutex<()>,
    delivered: AtomicU64,
    dropped_no_observer: AtomicU64,
    malformed: AtomicU64,
}

impl Dispatcher {
    fn new(config: MonitorConfig) -> Self {
        Self {
            observer: RwLock::new(None),
            relay: RwLock::new(None),
            config,
            dispatch_lock: ReentrantMutex::new(()),
            delivered: AtomicU64::new(0),
            dropped_no_observer: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
        }
    }

    #[allow(clippy::panic)]
    fn handle(&self, kind: BackupEventKind, notification: &Notification) {
        match translate(kind, &notification.user_info) {
            Ok(event) => self.deliver(&event),
            Err(err) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                match self.config.malformed_payload {
                    MalformedPayloadPolicy::Skip => {
                        tracing::warn!(
                            name = %notification.name,
                            error = %err,
                            "skipping malformed backup notification"
                        );
                    }
                    MalformedPayloadPolicy::Panic => {
                        tracing::error!(
                            name = %notification.name,
                            error = %err,
                            "malformed backup notification"
                        );
                        panic!("malformed backup notification {}: {}", notification.name, err);
                    }
                }
            }
        }
    }

    fn deliver(&self, event: &BackupEvent) {
        let relay = self.relay.read().clone();
        if let Some(relay) = relay {
            relay.publish(event);
        }

        // Upgrade outside the slot lock so observers may swap the slot re-entrantly.
        let observer = self.observer.read().as_ref().and_then(Weak::upgrade);
        let Some(observer) = observer else {
            self.dropped_no_observer.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(kind = %event.kind(), "no observer; event dropped");
            return;
        };

        let _serialized = self
            .config
            .serialize_delivery
            .then(|| self.dispatch_lock.lock());

        let started = Instant::now();
        dispatch(observer.as_ref(), event);
        let elapsed = started.elapsed();

        self.delivered.fetch_add(1, Ordering::Relaxed);

        if elapsed > self.config.slow_delivery_threshold {
            tracing::warn!(
                kind = %event.kind(),
                elapsed_ms = elapsed.as_millis() as u64,
                "slow observer callback"
            );
        } else {
            tracing::trace!(kind = %event.kind(), "delivered");
        }
    }

    fn stats(&self) -> MonitorStats {
        MonitorStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped_no_observer: self.dropped_no_observer.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
        }
    }
}

/// Relays backup daemon notifications to a single typed observer.
pub struct BackupMonitor {
    center: Arc<dyn NotificationCenter>,
    subscriptions: Mutex<Vec<SubscriptionToken>>,
    dispatcher: Arc<Dispatcher>,
}

impl BackupMonitor {
    /// Create a stopped monitor with default delivery settings.
    pub fn new(center: Arc<dyn NotificationCenter>) -> Self {
        Self::with_config(center, MonitorConfig::default())
    }

    /// Create a stopped monitor.
    pub fn with_config(center: Arc<dyn NotificationCenter>, config: MonitorConfig) -> Self {
        Self {
            center,
            subscriptions: Mutex::new(Vec::new()),
            dispatcher: Arc::new(Dispatcher::new(config)),
        }
    }

    /// Create a stopped monitor already pointing at `observer`.
    pub fn with_observer<O>(center: Arc<dyn NotificationCenter>, observer: &Arc<O>) -> Self
    where
        O: BackupObserver + 'static,
    {
        let monitor = Self::new(center);
        monitor.attach(observer);
        monitor
    }

    /// Replace the observer. `None` clears it.
    ///
    /// The monitor never keeps the observer alive; once its last `Arc` is
    /// dropped deliveries become no-ops. Calls already in progress on the
    /// previous observer run to completion.
    pub fn set_observer(&self, observer: Option<Weak<dyn BackupObserver>>) {
        *self.dispatcher.observer.write() = observer;
    }

    /// Point the monitor at `observer` without taking ownership.
    pub fn attach<O>(&self, observer: &Arc<O>)
    where
        O: BackupObserver + 'static,
    {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn BackupObserver> = weak;
        self.set_observer(Some(weak));
    }

    /// Clear the observer.
    pub fn detach(&self) {
        self.set_observer(None);
    }

    /// Also re-post every translated event on `center` under its internal
    /// name (`backupStarted`, `backupEnded`, ...), independent of the observer.
    /// `None` turns the re-broadcast off.
    pub fn set_relay(&self, center: Option<Arc<dyn NotificationCenter>>) {
        *self.dispatcher.relay.write() = center.map(|c| Arc::new(NotificationRelay::new(c)));
    }

    /// Create a stopped monitor that re-posts every event on `center`.
    pub fn with_relay(center: Arc<dyn NotificationCenter>) -> Self {
        let monitor = Self::new(Arc::clone(&center));
        monitor.set_relay(Some(center));
        monitor
    }

    /// True if an observer is set and still alive.
    pub fn has_observer(&self) -> bool {
        self.dispatcher
            .observer
            .read()
            .as_ref()
            .is_some_and(|w| w.strong_count() > 0)
    }

    /// Subscribe to all four backup notifications.
    ///
    /// Calling this while started drops the existing subscriptions first, so
    /// repeated calls never stack up duplicate handlers.
    pub fn start(&self) {
        let mut subscriptions = self.subscriptions.lock();
        self.release(&mut subscriptions);

        for kind in BackupEventKind::ALL {
            let dispatcher = Arc::clone(&self.dispatcher);
            let handler: NotificationHandler =
                Arc::new(move |n: &Notification| dispatcher.handle(kind, n));
            let token = self.center.subscribe(kind.external_name(), handler);
            subscriptions.push(token);
        }

        tracing::info!(subscriptions = subscriptions.len(), "backup monitor started");
    }

    /// Drop every subscription. A no-op when already stopped.
    pub fn stop(&self) {
        let mut subscriptions = self.subscriptions.lock();
        if self.release(&mut subscriptions) {
            tracing::info!("backup monitor stopped");
        }
    }

    /// Whether the monitor currently holds its subscriptions.
    pub fn is_started(&self) -> bool {
        !self.subscriptions.lock().is_empty()
    }

    /// Number of live subscriptions: 0 when stopped, 4 when started.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    pub fn stats(&self) -> MonitorStats {
        self.dispatcher.stats()
    }

    fn release(&self, subscriptions: &mut Vec<SubscriptionToken>) -> bool {
        if subscriptions.is_empty() {
            return false;
        }
        for token in subscriptions.drain(..) {
            self.center.unsubscribe(&token);
        }
        true
    }
}

impl Drop for BackupMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

impl fmt::Debug for BackupMonitor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupMonitor")
            .field("subscriptions", &*self.subscriptions.lock())
            .field("config", &self.dispatcher.config)
            .field("stats", &self.dispatcher.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::observer::MockBackupObserver;
    use super::*;
    use crate::bus::{LocalNotificationBus, UserInfo};
    use serde_json::{json, Value};

    fn info(value: Value) -> UserInfo {
        value.as_object().cloned().unwrap()
    }

    fn started_monitor(bus: &Arc<LocalNotificationBus>) -> BackupMonitor {
        let monitor = BackupMonitor::new(bus.clone());
        monitor.start();
        monitor
    }

    #[test]
    fn test_start_subscribes_each_kind_once() {
        let bus = Arc::new(LocalNotificationBus::new());
        let monitor = started_monitor(&bus);

        assert!(monitor.is_started());
        assert_eq!(monitor.subscription_count(), 4);
        for kind in BackupEventKind::ALL {
            assert_eq!(bus.registration_count_for(kind.external_name()), 1);
        }
    }

    #[test]
    fn test_restart_does_not_duplicate() {
        let bus = Arc::new(LocalNotificationBus::new());
        let monitor = started_monitor(&bus);
        monitor.start();
        monitor.start();

        assert_eq!(monitor.subscription_count(), 4);
        assert_eq!(bus.registration_count(), 4);
    }

    #[test]
    fn test_stop_twice() {
        let bus = Arc::new(LocalNotificationBus::new());
        let monitor = started_monitor(&bus);

        monitor.stop();
        monitor.stop();

        assert!(!monitor.is_started());
        assert_eq!(bus.registration_count(), 0);
    }

    #[test]
    fn test_stop_before_start() {
        let bus = Arc::new(LocalNotificationBus::new());
        let monitor = BackupMonitor::new(bus.clone());
        monitor.stop();
        assert_eq!(monitor.subscription_count(), 0);
    }

    #[test]
    fn test_drop_releases_subscriptions() {
        let bus = Arc::new(LocalNotificationBus::new());
        {
            let _monitor = started_monitor(&bus);
            assert_eq!(bus.registration_count(), 4);
        }
        assert_eq!(bus.registration_count(), 0);
    }

    #[test]
    fn test_delivers_to_mock_observer() {
        let bus = Arc::new(LocalNotificationBus::new());

        let mut mock = MockBackupObserver::new();
        mock.expect_backup_started()
            .withf(|mount: &str| mount == "/Volumes/TimeMachine")
            .times(1)
            .return_const(());
        let observer = Arc::new(mock);

        let monitor = BackupMonitor::with_observer(bus.clone(), &observer);
        monitor.start();

        let delivered = bus.post(
            "com.apple.backupd.DestinationMountNotification",
            info(json!({"DestinationMountPoint": "/Volumes/TimeMachine"})),
        );

        assert_eq!(delivered, 1);
        assert_eq!(monitor.stats().delivered, 1);
    }

    #[test]
    fn test_malformed_payload_skipped() {
        let bus = Arc::new(LocalNotificationBus::new());

        let mut mock = MockBackupObserver::new();
        mock.expect_backup_ended().times(0);
        let observer = Arc::new(mock);

        let monitor = BackupMonitor::with_observer(bus.clone(), &observer);
        monitor.start();

        bus.post(
            "com.apple.backupd.NewSystemBackupAvailableNotification",
            info(json!({"SomethingElse": "/x"})),
        );

        let stats = monitor.stats();
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.delivered, 0);
        assert!(monitor.is_started());
    }

    #[test]
    #[should_panic(expected = "malformed backup notification")]
    fn test_malformed_payload_panics_when_strict() {
        let bus = Arc::new(LocalNotificationBus::new());
        let config = MonitorConfig {
            malformed_payload: MalformedPayloadPolicy::Panic,
            ..MonitorConfig::default()
        };
        let monitor = BackupMonitor::with_config(bus.clone(), config);
        monitor.start();

        bus.post(
            "com.apple.backupd.thinningbackupended",
            info(json!({"BackupPath": "/b", "Error": "oops"})),
        );
    }

    #[test]
    fn test_observer_dropped_is_noop() {
        let bus = Arc::new(LocalNotificationBus::new());
        let monitor = started_monitor(&bus);

        {
            let observer = Arc::new(MockBackupObserver::new());
            monitor.attach(&observer);
            assert!(monitor.has_observer());
        }
        assert!(!monitor.has_observer());

        bus.post(
            "com.apple.backupd.thinningbackup",
            info(json!({"BackupPath": "/b"})),
        );

        let stats = monitor.stats();
        assert_eq!(stats.delivered, 0);
        assert_eq!(stats.dropped_no_observer, 1);
    }

    #[test]
    fn test_detach_stops_delivery() {
        let bus = Arc::new(LocalNotificationBus::new());

        let mut mock = MockBackupObserver::new();
        mock.expect_backup_cleanup_started().times(1).return_const(());
        let observer = Arc::new(mock);

        let monitor = BackupMonitor::with_observer(bus.clone(), &observer);
        monitor.start();

        let payload = info(json!({"BackupPath": "/b"}));
        bus.post("com.apple.backupd.thinningbackup", payload.clone());
        monitor.detach();
        bus.post("com.apple.backupd.thinningbackup", payload);

        assert_eq!(monitor.stats().delivered, 1);
    }

    #[test]
    fn test_serialized_delivery_config() {
        let bus = Arc::new(LocalNotificationBus::new());
        let config = MonitorConfig {
            serialize_delivery: true,
            ..MonitorConfig::default()
        };

        let mut mock = MockBackupObserver::new();
        mock.expect_backup_cleanup_ended()
            .withf(|path: &str, code: &i64| path == "/b" && *code == 2)
            .times(1)
            .return_const(());
        let observer = Arc::new(mock);

        let monitor = BackupMonitor::with_config(bus.clone(), config);
        monitor.attach(&observer);
        monitor.start();

        bus.post(
            "com.apple.backupd.thinningbackupended",
            info(json!({"BackupPath": "/b", "Error": 2})),
        );
        assert_eq!(monitor.stats().delivered, 1);
    }

    #[test]
    fn test_serialized_observer_may_post_reentrantly() {
        let bus = Arc::new(LocalNotificationBus::new());
        let config = MonitorConfig {
            serialize_delivery: true,
            ..MonitorConfig::default()
        };

        let mut mock = MockBackupObserver::new();
        let reposter = Arc::clone(&bus);
        mock.expect_backup_started().times(1).returning(move |_| {
            reposter.post(
                "com.apple.backupd.thinningbackup",
                info(json!({"BackupPath": "/b"})),
            );
        });
        mock.expect_backup_cleanup_started()
            .withf(|path: &str| path == "/b")
            .times(1)
            .return_const(());
        let observer = Arc::new(mock);

        let monitor = BackupMonitor::with_config(bus.clone(), config);
        monitor.attach(&observer);
        monitor.start();

        bus.post(
            "com.apple.backupd.DestinationMountNotification",
            info(json!({"DestinationMountPoint": "/Volumes/TM"})),
        );

        assert_eq!(monitor.stats().delivered, 2);
        monitor.stop();
    }

    #[test]
    fn test_relay_runs_alongside_observer() {
        let bus = Arc::new(LocalNotificationBus::new());

        let mut mock = MockBackupObserver::new();
        mock.expect_backup_ended().times(1).return_const(());
        let observer = Arc::new(mock);

        let monitor = BackupMonitor::with_relay(bus.clone());
        monitor.attach(&observer);
        monitor.start();

        let relayed = Arc::new(Mutex::new(Vec::new()));
        let _token = {
            let relayed = Arc::clone(&relayed);
            subscribe_relayed(bus.as_ref(), BackupEventKind::BackupEnded, move |e| {
                relayed.lock().push(e)
            })
        };

        bus.post(
            "com.apple.backupd.NewSystemBackupAvailableNotification",
            info(json!({"LatestBackupPath": "/Backups/latest"})),
        );

        assert_eq!(
            *relayed.lock(),
            vec![BackupEvent::BackupEnded {
                latest_backup_path: "/Backups/latest".to_string()
            }]
        );
        assert_eq!(monitor.stats().delivered, 1);

        monitor.set_relay(None);
        monitor.detach();
        bus.post(
            "com.apple.backupd.NewSystemBackupAvailableNotification",
            info(json!({"LatestBackupPath": "/Backups/next"})),
        );
        assert_eq!(relayed.lock().len(), 1);
    }
}
