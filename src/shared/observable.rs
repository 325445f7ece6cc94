use {
    serde::{Serialize, Serializer},
    std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
    tokio::sync::watch,
};

/// State that counts its own mutations.
pub trait Revisioned {
    fn revision(&self) -> u64;
}

/// Shared, subscribable state container.
///
/// Readers borrow through `read`, the single writer goes through `update`. Subscribers
/// get a `watch` receiver carrying the container's revision and are only woken when an
/// update actually bumped it, so each container notifies independently of the others.
#[derive(Debug)]
pub struct Observable<T> {
    // Shared by every clone; one writer at a time.
    inner: Arc<RwLock<T>>,
    notify: Arc<watch::Sender<u64>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            notify: self.notify.clone(),
        }
    }
}

impl<T: Revisioned + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Revisioned> Observable<T> {
    pub fn new(value: T) -> Self {
        let (notify, _) = watch::channel(value.revision());
        Self {
            inner: Arc::new(RwLock::new(value)),
            notify: Arc::new(notify),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.read_guard())
    }

    /// Runs `f` under the write lock, then notifies subscribers if the revision moved.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let (result, changed) = {
            let mut guard = self.write_guard();
            let before = guard.revision();
            let result = f(&mut guard);
            let after = guard.revision();
            (result, (after != before).then_some(after))
        }; // Lock is dropped here

        if let Some(rev) = changed {
            self.notify.send_replace(rev);
        }
        result
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.notify.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.read_guard().revision()
    }

    // A panicking writer leaves the data as it was mid-update; keep serving it.
    fn read_guard(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, T> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// Serializes as the plain inner value, so snapshots don't see the lock.
impl<T: Serialize> Serialize for Observable<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default, Serialize)]
    struct Counter {
        value: i32,
        revision: u64,
    }

    impl Revisioned for Counter {
        fn revision(&self) -> u64 {
            self.revision
        }
    }

    #[test]
    fn only_real_mutations_notify() {
        let shared = Observable::new(Counter::default());
        let mut rx = shared.subscribe();

        shared.update(|c| c.value);
        assert!(!rx.has_changed().expect("sender alive"));

        shared.update(|c| {
            c.value = 5;
            c.revision += 1;
        });
        assert!(rx.has_changed().expect("sender alive"));
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(shared.read(|c| c.value), 5);
        assert_eq!(
            serde_json::to_string(&shared).expect("serializable"),
            r#"{"value":5,"revision":1}"#
        );
    }
}
