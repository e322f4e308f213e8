use std::sync::Arc;

use arc_swap::ArcSwap;

/// Snapshot of the providers registered at one point in time.
pub type Snapshot<T> = Arc<Vec<Arc<T>>>;

/// Append-only set of providers with lock-free snapshot reads.
///
/// Readers load the current list with [`Registry::snapshot`] and keep it
/// for the whole request, so a registration that lands mid-request is not
/// observed by that request. Registration publishes a new list with a
/// read-copy-update; no reader ever sees a half-built list.
pub struct Registry<T: ?Sized> {
    providers: ArcSwap<Vec<Arc<T>>>,
}

impl<T: ?Sized> Registry<T> {
    #[must_use]
    pub fn new() -> Self {
        Self {
            providers: ArcSwap::from_pointee(Vec::new()),
        }
    }

    /// Add `provider` unless this exact instance is already registered.
    ///
    /// Returns `true` if the provider was added.
    pub fn register(&self, provider: Arc<T>) -> bool {
        let mut added = false;
        self.providers.rcu(|current| {
            if current.iter().any(|existing| Arc::ptr_eq(existing, &provider)) {
                added = false;
                return Arc::clone(current);
            }
            added = true;
            let mut next = Vec::with_capacity(current.len() + 1);
            next.extend(current.iter().cloned());
            next.push(Arc::clone(&provider));
            Arc::new(next)
        });
        added
    }

    /// The providers registered right now.
    #[must_use]
    pub fn snapshot(&self) -> Snapshot<T> {
        self.providers.load_full()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.load().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}
