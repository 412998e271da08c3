//! Online/offline tracking.
//!
//! The monitor never polls. Whatever owns the platform connection (a network
//! reachability callback, a socket reader noticing EOF, a test) reports the
//! state through [`ConnectivityMonitor::set_online`]; listeners and watchers are
//! only woken on an actual transition.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::watch;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectivityStatus {
    pub online: bool,
}

struct Inner {
    online: AtomicBool,
    listeners: Mutex<Vec<Listener>>,
    watch_tx: watch::Sender<bool>,
}

#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<Inner>,
}

impl ConnectivityMonitor {
    pub fn new(initially_online: bool) -> Self {
        let (watch_tx, _) = watch::channel(initially_online);
        Self {
            inner: Arc::new(Inner {
                online: AtomicBool::new(initially_online),
                listeners: Mutex::new(Vec::new()),
                watch_tx,
            }),
        }
    }

    pub fn current_status(&self) -> ConnectivityStatus {
        ConnectivityStatus {
            online: self.is_online(),
        }
    }

    pub fn is_online(&self) -> bool {
        self.inner.online.load(Ordering::SeqCst)
    }

    /// Records a platform signal. Returns whether the state actually changed.
    pub fn set_online(&self, online: bool) -> bool {
        let previous = self.inner.online.swap(online, Ordering::SeqCst);
        if previous == online {
            return false;
        }

        tracing::info!(
            "Connectivity changed: {}",
            if online { "online" } else { "offline" }
        );
        self.inner.watch_tx.send_replace(online);

        // Listeners may register more listeners; call them outside the lock.
        let listeners: Vec<Listener> = match self.inner.listeners.lock() {
            Ok(listeners) => listeners.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        for listener in listeners {
            listener(online);
        }
        true
    }

    pub fn on_change<F>(&self, listener: F)
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let mut listeners = match self.inner.listeners.lock() {
            Ok(listeners) => listeners,
            Err(poisoned) => poisoned.into_inner(),
        };
        listeners.push(Arc::new(listener));
    }

    /// Receiver that observes every transition after this call.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.inner.watch_tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    /// Online: a missing platform signal is treated as connected.
    fn default() -> Self {
        Self::new(true)
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_defaults_to_online() {
        let monitor = ConnectivityMonitor::default();
        assert!(monitor.is_online());
        assert_eq!(monitor.current_status(), ConnectivityStatus { online: true });
    }

    #[test]
    fn test_listeners_fire_only_on_transitions() {
        let monitor = ConnectivityMonitor::new(true);
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        monitor.on_change(move |online| calls_clone.lock().unwrap().push(online));

        assert!(!monitor.set_online(true));
        assert!(monitor.set_online(false));
        assert!(!monitor.set_online(false));
        assert!(monitor.set_online(true));

        assert_eq!(*calls.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn test_multiple_listeners() {
        let monitor = ConnectivityMonitor::new(false);
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let count = count.clone();
            monitor.on_change(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        monitor.set_online(true);
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let monitor = ConnectivityMonitor::new(true);
        let mut rx = monitor.subscribe();

        monitor.set_online(false);
        rx.changed().await.unwrap();
        assert!(!*rx.borrow_and_update());

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
