//! Observable single-value cell
//!
//! An [`Atom`] holds one value, hands out synchronous snapshots and calls its
//! listeners synchronously, in subscription order, on every [`Atom::next`].
//! There is no queue and no batching: the last published value wins.
//!
//! # Thread Safety
//!
//! The value and the listener list sit behind `RwLock`s. Listeners are called
//! outside of both locks, so a listener may read the atom, subscribe or
//! unsubscribe. Concurrent publishers are serialized, which keeps the
//! notification order equal to the call order. Lock poisoning is recovered
//! from, never propagated.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::ThreadId;

/// Callback invoked with every published value.
pub type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    value: RwLock<T>,
    listeners: RwLock<Vec<(u64, Listener<T>)>>,
    next_listener_id: AtomicU64,
    // Serializes publishers so listeners observe values in call order.
    publish_lock: Mutex<()>,
    publisher: Mutex<Option<ThreadId>>,
}

/// Synchronous observable value.
///
/// Cloning an `Atom` gives another handle to the same cell.
///
/// # Example
///
/// ```rust
/// use premium_subscriptions::Atom;
/// use std::sync::{Arc, Mutex};
///
/// let atom = Atom::new(1);
/// let seen = Arc::new(Mutex::new(Vec::new()));
/// let sink = seen.clone();
/// let handle = atom.subscribe(move |v| sink.lock().unwrap().push(*v));
///
/// atom.next(2);
/// handle.unsubscribe();
/// atom.next(3);
///
/// assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
/// assert_eq!(atom.value(), 3);
/// ```
pub struct Atom<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Atom<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Atom<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: RwLock::new(value),
                listeners: RwLock::new(Vec::new()),
                next_listener_id: AtomicU64::new(0),
                publish_lock: Mutex::new(()),
                publisher: Mutex::new(None),
            }),
        }
    }

    /// Current value snapshot.
    pub fn value(&self) -> T {
        self.inner
            .value
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish a new value.
    ///
    /// The value is stored first, then every listener runs in subscription
    /// order. A listener publishing into the atom that is currently notifying
    /// it would recurse; that nested publish is dropped and logged.
    pub fn next(&self, value: T) {
        let me = std::thread::current().id();
        if *self.inner.publisher.lock().unwrap_or_else(|e| e.into_inner()) == Some(me) {
            tracing::warn!("re-entrant Atom::next from a listener dropped");
            return;
        }

        let _serial = self
            .inner
            .publish_lock
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        let _publishing = PublishGuard::enter(&self.inner.publisher, me);

        {
            let mut current = self.inner.value.write().unwrap_or_else(|e| e.into_inner());
            *current = value.clone();
        }

        // Snapshot so listeners can (un)subscribe while being notified.
        let listeners: Vec<Listener<T>> = self
            .inner
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();

        for listener in listeners {
            listener(&value);
        }
    }

    /// Read-modify-write: publish `f(current)`.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let updated = f(&self.value());
        self.next(updated);
    }

    /// Register a listener.
    ///
    /// The listener runs once immediately with the current value, then with
    /// every future value until the returned handle is used to unsubscribe.
    pub fn subscribe<F>(&self, listener: F) -> Unsubscribe
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let listener: Listener<T> = Arc::new(listener);
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut listeners = self
                .inner
                .listeners
                .write()
                .unwrap_or_else(|e| e.into_inner());
            listeners.push((id, Arc::clone(&listener)));
        }

        listener(&self.value());

        let weak = Arc::downgrade(&self.inner);
        Unsubscribe {
            remove: Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    let mut listeners = inner.listeners.write().unwrap_or_else(|e| e.into_inner());
                    listeners.retain(|(lid, _)| *lid != id);
                }
            }),
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .read()
            .map(|l| l.len())
            .unwrap_or(0)
    }
}

impl<T: Clone + Send + Sync + Default + 'static> Default for Atom<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Clone + Send + Sync + std::fmt::Debug + 'static> std::fmt::Debug for Atom<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Atom").field("value", &self.value()).finish()
    }
}

/// Marks the publishing thread; cleared on drop, also when a listener panics.
struct PublishGuard<'a> {
    slot: &'a Mutex<Option<ThreadId>>,
}

impl<'a> PublishGuard<'a> {
    fn enter(slot: &'a Mutex<Option<ThreadId>>, thread: ThreadId) -> Self {
        *slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(thread);
        Self { slot }
    }
}

impl Drop for PublishGuard<'_> {
    fn drop(&mut self) {
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

/// Handle returned by [`Atom::subscribe`].
///
/// Dropping the handle keeps the listener registered.
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Unsubscribe {
    remove: Box<dyn FnOnce() + Send + Sync>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        (self.remove)();
    }
}
